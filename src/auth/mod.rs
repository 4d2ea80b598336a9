mod credentials;
mod guard;
mod jwt;
mod middleware;
mod types;

pub use credentials::{CredentialVerifier, DenyAllVerifier, VerifiedUser};
pub use guard::LoginAttemptGuard;
pub use jwt::TokenService;
pub use middleware::AuthMiddleware;
pub use types::{SessionClaims, TokenError, TokenUse};

#[cfg(test)]
pub use credentials::{CredentialError, MockCredentialVerifier};
