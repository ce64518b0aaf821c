use async_trait::async_trait;

use crate::errors::Result;

/// 滑动窗口一次判定所需的参数
#[derive(Debug, Clone)]
pub struct WindowRequest {
    /// 当前窗口计数器键
    pub current_key: String,
    /// 上一个窗口计数器键
    pub previous_key: String,
    pub limit: u64,
    /// 上一个窗口仍落在滑动区间内的比例，取值 [0, 1]
    pub previous_weight: f64,
    /// 当前窗口计数器的过期时间
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowDecision {
    pub allowed: bool,
    /// 本次判定后的加权请求数
    pub estimate: u64,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 一次读取多个键，结果与输入顺序一致
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn incr(&self, key: &str) -> Result<i64>;

    /// 原子地估算滑动窗口请求数，未超限时递增当前窗口计数
    async fn sliding_window(&self, request: &WindowRequest) -> Result<WindowDecision>;

    async fn ping(&self) -> Result<()>;
}

/// 加权估算：`floor(previous * weight) + current`
pub fn window_estimate(previous: u64, current: u64, previous_weight: f64) -> u64 {
    let weight = previous_weight.clamp(0.0, 1.0);
    (previous as f64 * weight).floor() as u64 + current
}
