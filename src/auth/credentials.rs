use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerifiedUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("凭据服务不可用: {0}")]
    Unavailable(String),
}

// 校验登录凭据；Ok(None) 表示凭据错误
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<VerifiedUser>, CredentialError>;
}

// 尚无用户存储，所有凭据一律拒绝
pub struct DenyAllVerifier;

#[async_trait]
impl CredentialVerifier for DenyAllVerifier {
    async fn verify(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<Option<VerifiedUser>, CredentialError> {
        Ok(None)
    }
}
