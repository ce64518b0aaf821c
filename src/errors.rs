use std::fmt;

#[derive(Debug, Clone)]
pub enum PrivalyticsError {
    Validation(String),
    Unauthorized(String),
    Forbidden(String),
    RateLimited { message: String, retry_after: u64 },
    NotFound(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    StoreConnection(String),
    StoreOperation(String),
    DependencyTransient(String),
    DependencyPermanent(String),
    Generation(String),
    Serialization(String),
    Config(String),
}

impl PrivalyticsError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            PrivalyticsError::Validation(_) => "E001",
            PrivalyticsError::Unauthorized(_) => "E002",
            PrivalyticsError::Forbidden(_) => "E003",
            PrivalyticsError::RateLimited { .. } => "E004",
            PrivalyticsError::NotFound(_) => "E005",
            PrivalyticsError::DatabaseConfig(_) => "E006",
            PrivalyticsError::DatabaseConnection(_) => "E007",
            PrivalyticsError::DatabaseOperation(_) => "E008",
            PrivalyticsError::StoreConnection(_) => "E009",
            PrivalyticsError::StoreOperation(_) => "E010",
            PrivalyticsError::DependencyTransient(_) => "E011",
            PrivalyticsError::DependencyPermanent(_) => "E012",
            PrivalyticsError::Generation(_) => "E013",
            PrivalyticsError::Serialization(_) => "E014",
            PrivalyticsError::Config(_) => "E015",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            PrivalyticsError::Validation(_) => "Validation Error",
            PrivalyticsError::Unauthorized(_) => "Unauthorized",
            PrivalyticsError::Forbidden(_) => "Forbidden",
            PrivalyticsError::RateLimited { .. } => "Rate Limited",
            PrivalyticsError::NotFound(_) => "Resource Not Found",
            PrivalyticsError::DatabaseConfig(_) => "Database Configuration Error",
            PrivalyticsError::DatabaseConnection(_) => "Database Connection Error",
            PrivalyticsError::DatabaseOperation(_) => "Database Operation Error",
            PrivalyticsError::StoreConnection(_) => "Shared Store Connection Error",
            PrivalyticsError::StoreOperation(_) => "Shared Store Operation Error",
            PrivalyticsError::DependencyTransient(_) => "Dependency Unavailable",
            PrivalyticsError::DependencyPermanent(_) => "Dependency Error",
            PrivalyticsError::Generation(_) => "Answer Generation Error",
            PrivalyticsError::Serialization(_) => "Serialization Error",
            PrivalyticsError::Config(_) => "Configuration Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            PrivalyticsError::Validation(msg) => msg,
            PrivalyticsError::Unauthorized(msg) => msg,
            PrivalyticsError::Forbidden(msg) => msg,
            PrivalyticsError::RateLimited { message, .. } => message,
            PrivalyticsError::NotFound(msg) => msg,
            PrivalyticsError::DatabaseConfig(msg) => msg,
            PrivalyticsError::DatabaseConnection(msg) => msg,
            PrivalyticsError::DatabaseOperation(msg) => msg,
            PrivalyticsError::StoreConnection(msg) => msg,
            PrivalyticsError::StoreOperation(msg) => msg,
            PrivalyticsError::DependencyTransient(msg) => msg,
            PrivalyticsError::DependencyPermanent(msg) => msg,
            PrivalyticsError::Generation(msg) => msg,
            PrivalyticsError::Serialization(msg) => msg,
            PrivalyticsError::Config(msg) => msg,
        }
    }

    /// 对应的 HTTP 状态码
    pub fn http_status(&self) -> u16 {
        match self {
            PrivalyticsError::Validation(_) => 400,
            PrivalyticsError::Unauthorized(_) => 401,
            PrivalyticsError::Forbidden(_) => 403,
            PrivalyticsError::NotFound(_) => 404,
            PrivalyticsError::RateLimited { .. } => 429,
            PrivalyticsError::Generation(_) => 502,
            PrivalyticsError::DependencyTransient(_)
            | PrivalyticsError::DatabaseConnection(_)
            | PrivalyticsError::StoreConnection(_) => 503,
            _ => 500,
        }
    }

    /// 是否值得重试（仅对幂等操作有意义）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PrivalyticsError::DependencyTransient(_)
                | PrivalyticsError::DatabaseConnection(_)
                | PrivalyticsError::StoreConnection(_)
        )
    }

    /// 格式化为彩色输出（用于 Server 模式）
    #[cfg(feature = "server")]
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for PrivalyticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for PrivalyticsError {}

// 便捷的构造函数
impl PrivalyticsError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::Validation(msg.into())
    }

    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::Unauthorized(msg.into())
    }

    pub fn forbidden<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::Forbidden(msg.into())
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        PrivalyticsError::RateLimited {
            message: "Rate limit exceeded".to_string(),
            retry_after,
        }
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::NotFound(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::DatabaseOperation(msg.into())
    }

    pub fn store_connection<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::StoreConnection(msg.into())
    }

    pub fn store_operation<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::StoreOperation(msg.into())
    }

    pub fn dependency_transient<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::DependencyTransient(msg.into())
    }

    pub fn dependency_permanent<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::DependencyPermanent(msg.into())
    }

    pub fn generation<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::Generation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::Serialization(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        PrivalyticsError::Config(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for PrivalyticsError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::ConnectionAcquire(_) | sea_orm::DbErr::Conn(_) => {
                PrivalyticsError::DatabaseConnection(err.to_string())
            }
            _ => PrivalyticsError::DatabaseOperation(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for PrivalyticsError {
    fn from(err: serde_json::Error) -> Self {
        PrivalyticsError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for PrivalyticsError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            PrivalyticsError::StoreConnection(err.to_string())
        } else {
            PrivalyticsError::StoreOperation(err.to_string())
        }
    }
}

impl From<reqwest::Error> for PrivalyticsError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .is_some_and(|s| s.as_u16() == 429 || s.is_server_error());
        if transient {
            PrivalyticsError::DependencyTransient(err.to_string())
        } else {
            PrivalyticsError::DependencyPermanent(err.to_string())
        }
    }
}

impl From<std::io::Error> for PrivalyticsError {
    fn from(err: std::io::Error) -> Self {
        PrivalyticsError::DependencyPermanent(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PrivalyticsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(PrivalyticsError::validation("x").http_status(), 400);
        assert_eq!(PrivalyticsError::unauthorized("x").http_status(), 401);
        assert_eq!(PrivalyticsError::forbidden("x").http_status(), 403);
        assert_eq!(PrivalyticsError::rate_limited(3).http_status(), 429);
        assert_eq!(PrivalyticsError::generation("x").http_status(), 502);
        assert_eq!(PrivalyticsError::dependency_transient("x").http_status(), 503);
        assert_eq!(PrivalyticsError::dependency_permanent("x").http_status(), 500);
        assert_eq!(PrivalyticsError::database_operation("x").http_status(), 500);
    }

    #[test]
    fn test_rate_limited_carries_retry_hint() {
        match PrivalyticsError::rate_limited(17) {
            PrivalyticsError::RateLimited { retry_after, message } => {
                assert_eq!(retry_after, 17);
                assert_eq!(message, "Rate limit exceeded");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_format_simple() {
        let err = PrivalyticsError::validation("question too long");
        assert_eq!(err.format_simple(), "Validation Error: question too long");
        assert_eq!(err.to_string(), err.format_simple());
    }

    #[test]
    fn test_transient_classification() {
        assert!(PrivalyticsError::dependency_transient("timeout").is_transient());
        assert!(PrivalyticsError::store_connection("refused").is_transient());
        assert!(!PrivalyticsError::generation("empty").is_transient());
        assert!(!PrivalyticsError::validation("bad").is_transient());
    }
}
