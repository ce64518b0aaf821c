//! 客户端地址提取
//!
//! 按配置的请求头优先级读取第一个转发地址，全部缺失时回退到连接地址，
//! 最后回退到 `"unknown"`。该地址只用于指纹计算和限流键，不会落库。

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;

use crate::config::get_config;

/// 无法确定地址时使用的哨兵值
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// 从请求头提取客户端地址（纯函数，不会失败）
///
/// `x-forwarded-for` 这类逗号分隔的头取第一个条目，即原始客户端。
pub fn client_address<S: AsRef<str>>(headers: &HeaderMap, header_names: &[S]) -> String {
    forwarded_address(headers, header_names).unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}

fn forwarded_address<S: AsRef<str>>(headers: &HeaderMap, header_names: &[S]) -> Option<String> {
    header_names.iter().find_map(|name| {
        headers
            .get(name.as_ref())
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

/// 从 HttpRequest 提取客户端地址
///
/// 优先使用 `privacy.address_headers`，其次是 TCP 对端地址。
pub fn client_address_from_request(req: &HttpRequest) -> String {
    let config = get_config();
    forwarded_address(req.headers(), &config.privacy.address_headers)
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string())
}
