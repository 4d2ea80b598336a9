use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::collections::HashSet;
use uuid::Uuid;

use crate::auth::types::{SessionClaims, TokenError, TokenUse, TOKEN_ISSUER};

// 无状态会话 token 的签发与校验，配置在构造后不可变，可跨线程共享
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_duration: Duration,
    token_use: TokenUse,
}

impl TokenService {
    pub fn new(secret: &str, token_duration: Duration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        // 只接受 HMAC 系列算法；exp/nbf 由 check_timing 按固定顺序校验
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            token_duration,
            token_use: TokenUse::Access,
        })
    }

    // 签发和校验都只针对这一种 token
    pub fn with_token_use(mut self, token_use: TokenUse) -> Self {
        self.token_use = token_use;
        self
    }

    pub fn generate_token(
        &self,
        user_id: &str,
        username: &str,
        email: &str,
    ) -> Result<String, TokenError> {
        let claims = self.new_claims(user_id, username, email);
        self.sign(&claims)
    }

    pub fn validate_token(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let claims = self.decode_claims(token)?;
        if claims.token_use != self.token_use {
            return Err(TokenError::WrongTokenUse {
                expected: self.token_use,
                actual: claims.token_use,
            });
        }
        check_timing(&claims, Utc::now())?;
        Ok(claims)
    }

    // 检查方法只看 exp，不校验 nbf/iat；与 validate_token 的严格路径不要合并
    pub fn is_token_expired(&self, token: &str) -> bool {
        match self.decode_claims(token) {
            // 无法解析或签名不符同样返回 true，“无效”和“过期”在这里不作区分
            Err(_) => true,
            Ok(claims) => match claims.expires_at() {
                Some(exp) => exp < Utc::now(),
                None => false,
            },
        }
    }

    pub fn get_token_expiration(&self, token: &str) -> Result<DateTime<Utc>, TokenError> {
        let claims = self.decode_claims(token)?;
        claims.expires_at().ok_or(TokenError::NoExpirationClaim)
    }

    // 可能为负数
    pub fn get_time_until_expiration(&self, token: &str) -> Result<Duration, TokenError> {
        let expires_at = self.get_token_expiration(token)?;
        Ok(expires_at - Utc::now())
    }

    // 调用方需已校验过原 token；这里只复制身份字段并重新签发
    pub fn refresh_token(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let renewed = self.new_claims(&claims.user_id, &claims.username, &claims.email);
        self.sign(&renewed)
    }

    fn new_claims(&self, user_id: &str, username: &str, email: &str) -> SessionClaims {
        let now = Utc::now().timestamp();
        SessionClaims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            jti: Uuid::new_v4().to_string(),
            token_use: self.token_use,
            iat: Some(now),
            nbf: Some(now),
            exp: Some(now + self.token_duration.num_seconds()),
        }
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    // 结构与签名校验，不含时间校验
    fn decode_claims(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let claims = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::SignatureInvalid)?;
        if !claims.timestamps_in_range() {
            return Err(TokenError::SignatureInvalid(ErrorKind::InvalidToken.into()));
        }
        Ok(claims)
    }
}

// 依次检查 exp、nbf、iat，返回第一个不满足的条件
fn check_timing(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenError> {
    if let Some(exp) = claims.expires_at() {
        if exp < now {
            return Err(TokenError::Expired);
        }
    }

    if let Some(nbf) = claims.not_before() {
        if nbf > now {
            return Err(TokenError::NotYetValid);
        }
    }

    if let Some(iat) = claims.issued_at() {
        if iat > now {
            return Err(TokenError::IssuedInFuture);
        }
    }

    Ok(())
}
