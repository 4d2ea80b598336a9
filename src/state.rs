use std::net::IpAddr;
use std::sync::Arc;

use crate::auth::{CredentialVerifier, LoginAttemptGuard, TokenError, TokenService, TokenUse};
use crate::config::{AppConfig, AppInfo};

pub struct AppState {
    pub app: AppInfo,
    pub access_tokens: Arc<TokenService>,
    // 与 access token 共用密钥，有效期更长，靠 token_use 区分
    pub refresh_tokens: TokenService,
    pub signin_guard: LoginAttemptGuard,
    // 只有来自该地址的请求才采信转发头
    pub trusted_proxy: Option<IpAddr>,
    pub verifier: Box<dyn CredentialVerifier>,
}

impl AppState {
    pub fn from_config(
        config: &AppConfig,
        verifier: Box<dyn CredentialVerifier>,
    ) -> Result<Self, TokenError> {
        Ok(Self {
            app: config.app.clone(),
            access_tokens: Arc::new(TokenService::new(
                &config.jwt.secret,
                config.jwt.token_duration,
            )?),
            refresh_tokens: TokenService::new(&config.jwt.secret, config.jwt.refresh_duration)?
                .with_token_use(TokenUse::Refresh),
            signin_guard: LoginAttemptGuard::new(
                config.signin_limit.max_attempts,
                config.signin_limit.window,
            ),
            trusted_proxy: config.server.trusted_proxy,
            verifier,
        })
    }
}
