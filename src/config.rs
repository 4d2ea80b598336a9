use chrono::Duration;
use log::LevelFilter;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

// 仅用于本地开发的占位密钥，生产环境拒绝启动
pub const PLACEHOLDER_SECRET: &str = "your-super-secret-jwt-key-change-this-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置项 {key} 无效: {reason}")]
    Invalid { key: String, reason: String },

    #[error("生产环境必须设置 JWT_SECRET")]
    InsecureSecret,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub trusted_proxy: Option<IpAddr>,
}

#[derive(Debug, Clone)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub env: String,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub token_duration: Duration,
    pub refresh_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct SigninLimitConfig {
    pub max_attempts: usize,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub level: LevelFilter,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub app: AppInfo,
    pub jwt: JwtConfig,
    pub signin_limit: SigninLimitConfig,
    pub log: LogConfig,
}

impl AppConfig {
    // 先加载 .env，再读取进程环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| -> String {
            vars.get(key)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        let env = get("APP_ENV", "development");
        let secret = get("JWT_SECRET", PLACEHOLDER_SECRET);
        if secret == PLACEHOLDER_SECRET && env == "production" {
            return Err(ConfigError::InsecureSecret);
        }

        let duration = |key: &str, default: &str| parse_duration(key, &get(key, default));

        let max_attempts: usize =
            parse_value("SIGNIN_MAX_ATTEMPTS", &get("SIGNIN_MAX_ATTEMPTS", "5"))?;
        if max_attempts == 0 {
            return Err(invalid("SIGNIN_MAX_ATTEMPTS", "必须大于 0"));
        }

        let trusted_proxy = match vars.get("TRUSTED_PROXY").map(|v| v.trim()) {
            Some(raw) if !raw.is_empty() => Some(parse_value("TRUSTED_PROXY", raw)?),
            _ => None,
        };

        Ok(Self {
            server: ServerConfig {
                host: get("SERVER_HOST", "0.0.0.0"),
                port: parse_value("SERVER_PORT", &get("SERVER_PORT", "8080"))?,
                static_dir: PathBuf::from(get("STATIC_DIR", "web/static")),
                trusted_proxy,
            },
            app: AppInfo {
                name: get("APP_NAME", "VibeStorm"),
                version: get("APP_VERSION", "1.0.0"),
                env,
            },
            jwt: JwtConfig {
                secret,
                token_duration: duration("JWT_TOKEN_DURATION", "24h")?,
                refresh_duration: duration("JWT_REFRESH_DURATION", "168h")?,
            },
            signin_limit: SigninLimitConfig {
                max_attempts,
                window: duration("SIGNIN_WINDOW", "15m")?,
            },
            log: LogConfig {
                dir: PathBuf::from(get("LOG_DIR", "logs")),
                level: get("LOG_LEVEL", "info")
                    .parse()
                    .map_err(|_| invalid("LOG_LEVEL", "未知的日志级别"))?,
            },
        })
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| invalid(key, e.to_string()))
}

// 支持 "24h"、"15m"、"1h 30m" 等写法
fn parse_duration(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let std_duration =
        humantime::parse_duration(raw.trim()).map_err(|e| invalid(key, e.to_string()))?;
    if std_duration.is_zero() {
        return Err(invalid(key, "必须大于 0"));
    }
    Duration::from_std(std_duration).map_err(|e| invalid(key, e.to_string()))
}
