use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::{debug, warn};
use std::sync::Arc;

use crate::auth::TokenService;
use crate::error::{ApiError, ErrorCode};

#[derive(Clone)]
pub struct AuthMiddleware {
    tokens: Arc<TokenService>,
}

impl AuthMiddleware {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Arc::new(service),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    tokens: Arc<TokenService>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let tokens = self.tokens.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let path = req.path().to_string();

            // 缺少 header 或前缀不对时不进入 token 校验
            let token = match bearer_token(&req) {
                Some(token) => token,
                None => {
                    warn!("请求 {} 未提供有效的 Bearer token", path);
                    return Err(ApiError::new(ErrorCode::Unauthorized, &path).into());
                }
            };

            match tokens.validate_token(&token) {
                Ok(claims) => {
                    if let Ok(left) = tokens.get_time_until_expiration(&token) {
                        debug!(
                            "用户 {} 认证成功，token 剩余 {} 秒",
                            claims.username,
                            left.num_seconds()
                        );
                    }
                    req.extensions_mut().insert(claims);
                    service.call(req).await
                }
                Err(e) => {
                    // 具体原因只写日志，响应统一为未认证
                    warn!("Token 验证失败: {}", e);
                    Err(ApiError::new(ErrorCode::Unauthorized, &path).into())
                }
            }
        })
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
