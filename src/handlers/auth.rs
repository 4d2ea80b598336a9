use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, info, warn};
use std::net::IpAddr;
use validator::Validate;

use crate::auth::SessionClaims;
use crate::dto::{AuthResponse, MeResponse, RefreshTokenRequest, SigninRequest, TokenResponse};
use crate::error::{ApiError, ErrorCode};
use crate::state::AppState;

const TOKEN_TYPE: &str = "Bearer";

// 限流按连接对端地址计；只有对端是受信代理时才采信 X-Forwarded-For / Forwarded
fn client_ip(req: &HttpRequest, trusted_proxy: Option<IpAddr>) -> String {
    match req.peer_addr().map(|addr| addr.ip()) {
        Some(peer) if Some(peer) == trusted_proxy => req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string(),
        Some(peer) => peer.to_string(),
        None => "unknown".to_string(),
    }
}

// 先查拦截状态再解析请求体，被拦截的请求不计入失败次数
pub async fn signin(
    req: HttpRequest,
    body: Result<web::Json<SigninRequest>, actix_web::Error>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let path = req.path().to_string();
    let client = client_ip(&req, data.trusted_proxy);

    if data.signin_guard.is_blocked(&client) {
        warn!("客户端 {} 登录失败次数过多，已拦截", client);
        return Err(ApiError::new(ErrorCode::TooManyRequests, &path));
    }

    let body = body
        .map_err(|e| {
            warn!("登录请求体解析失败: {}", e);
            ApiError::new(ErrorCode::InvalidRequest, &path)
        })?
        .into_inner();
    body.validate()
        .map_err(|e| ApiError::validation(&path, &e))?;

    debug!("客户端 {} 尝试登录: {}", client, body.email);

    let user = match data.verifier.verify(&body.email, &body.password).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            data.signin_guard.record_failed_attempt(&client);
            warn!(
                "客户端 {} 登录失败，窗口内失败次数: {}",
                client,
                data.signin_guard.attempt_count(&client)
            );
            return Err(ApiError::new(ErrorCode::InvalidCredentials, &path));
        }
        Err(e) => return Err(ApiError::internal(&path, e)),
    };

    data.signin_guard.reset(&client);

    let access_token = data
        .access_tokens
        .generate_token(&user.id, &user.username, &user.email)
        .map_err(|e| ApiError::internal(&path, e))?;
    let refresh_token = data
        .refresh_tokens
        .generate_token(&user.id, &user.username, &user.email)
        .map_err(|e| ApiError::internal(&path, e))?;
    let expires_at = data
        .access_tokens
        .get_token_expiration(&access_token)
        .map_err(|e| ApiError::internal(&path, e))?;

    info!("用户 {} 登录成功", user.username);
    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        refresh_token,
        token_type: TOKEN_TYPE,
        expires_at,
        user,
    }))
}

pub async fn refresh(
    req: HttpRequest,
    body: web::Json<RefreshTokenRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let path = req.path().to_string();
    body.validate()
        .map_err(|e| ApiError::validation(&path, &e))?;

    let claims = data
        .refresh_tokens
        .validate_token(&body.refresh_token)
        .map_err(|e| {
            if data.refresh_tokens.is_token_expired(&body.refresh_token) {
                info!("刷新 token 已过期或无法解析: {}", e);
            } else {
                warn!("刷新 token 无效: {}", e);
            }
            ApiError::new(ErrorCode::Unauthorized, &path)
        })?;

    let access_token = data
        .access_tokens
        .refresh_token(&claims)
        .map_err(|e| ApiError::internal(&path, e))?;
    let expires_at = data
        .access_tokens
        .get_token_expiration(&access_token)
        .map_err(|e| ApiError::internal(&path, e))?;

    info!("用户 {} 刷新了 access token", claims.username);
    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token,
        token_type: TOKEN_TYPE,
        expires_at,
    }))
}

pub async fn me(claims: web::ReqData<SessionClaims>) -> HttpResponse {
    let claims = claims.into_inner();
    HttpResponse::Ok().json(MeResponse {
        expires_at: claims.expires_at(),
        user_id: claims.user_id,
        username: claims.username,
        email: claims.email,
        token_id: claims.jti,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialError, MockCredentialVerifier, VerifiedUser};
    use crate::config::AppConfig;
    use crate::error::not_found;
    use crate::handlers::configure;
    use actix_web::{
        dev::{Service, ServiceResponse},
        http::StatusCode,
        test, App, Error,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::net::SocketAddr;

    const CLIENT: &str = "1.2.3.4";
    const PROXY: &str = "10.0.0.1";

    fn state_with(
        verifier: MockCredentialVerifier,
        extra: &[(&str, &str)],
    ) -> web::Data<AppState> {
        let mut vars = HashMap::from([
            ("JWT_SECRET".to_string(), "handler-secret".to_string()),
            ("SIGNIN_MAX_ATTEMPTS".to_string(), "5".to_string()),
        ]);
        for (key, value) in extra {
            vars.insert(key.to_string(), value.to_string());
        }
        let config = AppConfig::from_vars(&vars).unwrap();
        web::Data::new(AppState::from_config(&config, Box::new(verifier)).unwrap())
    }

    fn state(verifier: MockCredentialVerifier) -> web::Data<AppState> {
        state_with(verifier, &[])
    }

    fn peer(ip: &str) -> SocketAddr {
        SocketAddr::new(ip.parse().unwrap(), 40000)
    }

    fn alice() -> VerifiedUser {
        VerifiedUser {
            id: "42".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
        }
    }

    fn signin_request(client: &str, body: Value) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/v1/auth/signin")
            .peer_addr(peer(client))
            .set_json(body)
    }

    fn credentials() -> Value {
        json!({ "email": "alice@example.com", "password": "Secret123!" })
    }

    fn status_of<B>(result: Result<ServiceResponse<B>, Error>) -> StatusCode {
        match result {
            Ok(resp) => resp.status(),
            Err(e) => e.as_response_error().status_code(),
        }
    }

    #[actix_web::test]
    async fn test_signin_success_issues_tokens_and_resets_guard() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().returning(|_, _| Ok(Some(alice())));
        let state = state(verifier);
        state.signin_guard.record_failed_attempt(CLIENT);
        state.signin_guard.record_failed_attempt(CLIENT);

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = signin_request(CLIENT, credentials()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["user"]["username"], "alice");

        let access = body["access_token"].as_str().unwrap();
        let claims = state.access_tokens.validate_token(access).unwrap();
        assert_eq!(claims.user_id, "42");
        let refresh = body["refresh_token"].as_str().unwrap();
        assert!(state.refresh_tokens.validate_token(refresh).is_ok());

        assert_eq!(state.signin_guard.attempt_count(CLIENT), 0);
    }

    #[actix_web::test]
    async fn test_signin_blocks_after_repeated_failures() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().times(5).returning(|_, _| Ok(None));
        let state = state(verifier);

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        for _ in 0..5 {
            let req = signin_request(CLIENT, credentials()).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["code"], "INVALID_CREDENTIALS");
        }

        // 被拦截时不再调用校验器，也不增加计数
        for _ in 0..3 {
            let req = signin_request(CLIENT, credentials()).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        }
        assert_eq!(state.signin_guard.attempt_count(CLIENT), 5);
    }

    #[actix_web::test]
    async fn test_signin_ignores_forwarded_header_from_untrusted_peer() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().times(5).returning(|_, _| Ok(None));
        let state = state(verifier);

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let mut statuses = Vec::new();
        for i in 0..8 {
            let req = signin_request("9.9.9.9", credentials())
                .insert_header(("X-Forwarded-For", format!("10.0.0.{}", i)))
                .to_request();
            statuses.push(test::call_service(&app, req).await.status());
        }

        assert!(statuses[..5].iter().all(|s| *s == StatusCode::UNAUTHORIZED));
        assert!(statuses[5..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(state.signin_guard.attempt_count("9.9.9.9"), 5);
        assert_eq!(state.signin_guard.attempt_count("10.0.0.0"), 0);
    }

    #[actix_web::test]
    async fn test_signin_uses_forwarded_header_from_trusted_proxy() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().returning(|_, _| Ok(None));
        let state = state_with(verifier, &[("TRUSTED_PROXY", PROXY)]);

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = signin_request(PROXY, credentials())
            .insert_header(("X-Forwarded-For", CLIENT))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(state.signin_guard.attempt_count(CLIENT), 1);
        assert_eq!(state.signin_guard.attempt_count(PROXY), 0);
    }

    #[actix_web::test]
    async fn test_signin_verifier_failure_is_internal_error() {
        let mut verifier = MockCredentialVerifier::new();
        verifier
            .expect_verify()
            .times(1)
            .returning(|_, _| Err(CredentialError::Unavailable("用户存储不可达".to_string())));
        let state = state(verifier);

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = signin_request(CLIENT, credentials()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert_eq!(state.signin_guard.attempt_count(CLIENT), 0);
    }

    #[actix_web::test]
    async fn test_signin_limits_are_per_client() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().returning(|_, _| Ok(None));
        let state = state(verifier);
        for _ in 0..5 {
            state.signin_guard.record_failed_attempt(CLIENT);
        }

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = signin_request("5.6.7.8", credentials()).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_signin_validation_error_not_counted() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().never();
        let state = state(verifier);

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = signin_request(CLIENT, json!({ "email": "not-an-email", "password": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["validation"]["email"].is_array());
        assert!(body["validation"]["password"].is_array());
        assert_eq!(state.signin_guard.attempt_count(CLIENT), 0);
    }

    #[actix_web::test]
    async fn test_signin_malformed_body() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().never();
        let state = state(verifier);

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/signin")
            .insert_header(("Content-Type", "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[actix_web::test]
    async fn test_refresh_reissues_access_token() {
        let state = state(MockCredentialVerifier::new());
        let refresh_token = state
            .refresh_tokens
            .generate_token("42", "alice", "alice@example.com")
            .unwrap();

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/refresh")
            .set_json(json!({ "refresh_token": refresh_token }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        let access = body["access_token"].as_str().unwrap();
        let claims = state.access_tokens.validate_token(access).unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(body["token_type"], "Bearer");
    }

    #[actix_web::test]
    async fn test_refresh_rejects_bad_token() {
        let state = state(MockCredentialVerifier::new());
        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/refresh")
            .set_json(json!({ "refresh_token": "garbage" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/refresh")
            .set_json(json!({ "refresh_token": "" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_refresh_rejects_access_token() {
        let state = state(MockCredentialVerifier::new());
        let access_token = state
            .access_tokens
            .generate_token("42", "alice", "alice@example.com")
            .unwrap();

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/auth/refresh")
            .set_json(json!({ "refresh_token": access_token }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[actix_web::test]
    async fn test_me_rejects_refresh_token() {
        let state = state(MockCredentialVerifier::new());
        let refresh_token = state
            .refresh_tokens
            .generate_token("42", "alice", "alice@example.com")
            .unwrap();

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", format!("Bearer {}", refresh_token)))
            .to_request();
        assert_eq!(status_of(app.call(req).await), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_me_returns_token_identity() {
        let state = state(MockCredentialVerifier::new());
        let token = state
            .access_tokens
            .generate_token("42", "alice", "alice@example.com")
            .unwrap();

        let app =
            test::init_service(App::new().configure(|cfg| configure(cfg, state.clone(), None)))
                .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/auth/me")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["user_id"], "42");
        assert_eq!(body["email"], "alice@example.com");
        assert!(body["expires_at"].is_string());

        let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
        assert_eq!(status_of(app.call(req).await), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_health_home_and_unknown_route() {
        let state = state(MockCredentialVerifier::new());
        let app = test::init_service(
            App::new()
                .configure(|cfg| configure(cfg, state.clone(), None))
                .default_service(web::to(not_found)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "VibeStorm");

        let req = test::TestRequest::get().uri("/").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "running");

        let req = test::TestRequest::get().uri("/api/v1/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["path"], "/api/v1/nope");
    }
}
