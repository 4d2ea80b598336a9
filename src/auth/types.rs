use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// 签发方标识
pub const TOKEN_ISSUER: &str = "vibe-storm";

// access 与 refresh 共用密钥，靠这个字段区分；缺省视为 access
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    #[default]
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionClaims {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub iss: String,
    pub jti: String, // 每次签发唯一，不做重放校验
    #[serde(default)]
    pub token_use: TokenUse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl SessionClaims {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(from_timestamp)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.nbf.and_then(from_timestamp)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(from_timestamp)
    }

    // 存在但超出可表示范围的时间戳不能当作缺失
    pub fn timestamps_in_range(&self) -> bool {
        [self.iat, self.nbf, self.exp]
            .into_iter()
            .flatten()
            .all(|secs| from_timestamp(secs).is_some())
    }
}

fn from_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token 签名失败: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("token 签名无效: {0}")]
    SignatureInvalid(#[source] jsonwebtoken::errors::Error),

    #[error("token 已过期")]
    Expired,

    #[error("token 尚未生效")]
    NotYetValid,

    #[error("token 签发时间在未来")]
    IssuedInFuture,

    #[error("token 类型不符: 需要 {expected:?}，实际为 {actual:?}")]
    WrongTokenUse { expected: TokenUse, actual: TokenUse },

    #[error("token 缺少过期时间")]
    NoExpirationClaim,

    #[error("JWT 密钥不能为空")]
    EmptySecret,
}
