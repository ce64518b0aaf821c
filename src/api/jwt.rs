use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::warn;

/// 未声明 roles 的调用方的默认角色
pub const DEFAULT_ROLE: &str = "viewer";

/// Global cached JwtService instance
static JWT_SERVICE: OnceLock<Arc<JwtService>> = OnceLock::new();

/// Get the cached JwtService instance
///
/// The service is initialized once from the static config on first use.
pub fn get_jwt_service() -> Arc<JwtService> {
    JWT_SERVICE
        .get_or_init(|| Arc::new(JwtService::from_config()))
        .clone()
}

fn default_roles() -> Vec<String> {
    vec![DEFAULT_ROLE.to_string()]
}

/// 外部登录系统签发的 token 内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerClaims {
    pub sub: String,
    #[serde(default = "default_roles")]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// JWT Service for issuing and validating HS256 caller tokens
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_minutes: u64,
}

impl JwtService {
    pub fn new(secret: &str, token_minutes: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_minutes,
        }
    }

    /// Create JwtService from config
    pub fn from_config() -> Self {
        let config = crate::config::get_config();

        // 获取 JWT secret，如果为空则生成一个随机值
        let secret = if config.auth.jwt_secret.is_empty() {
            warn!("JWT secret not configured, generating a random one; issued tokens will not survive a restart");
            generate_secret()
        } else {
            config.auth.jwt_secret.clone()
        };

        Self::new(&secret, config.auth.token_minutes)
    }

    pub fn issue(
        &self,
        subject: &str,
        roles: &[String],
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = CallerClaims {
            sub: subject.to_string(),
            roles: if roles.is_empty() {
                default_roles()
            } else {
                roles.to_vec()
            },
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.token_minutes as i64)).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
    }

    pub fn validate(&self, token: &str) -> Result<CallerClaims, jsonwebtoken::errors::Error> {
        let token_data = decode::<CallerClaims>(token, &self.decoding_key, &Validation::default())?;
        Ok(token_data.claims)
    }
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
