use actix_web::{
    error::JsonPayloadError, http::StatusCode, HttpRequest, HttpResponse, ResponseError,
};
use log::{error, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use validator::{ValidationError, ValidationErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    InvalidRequest,
    Unauthorized,
    InvalidCredentials,
    NotFound,
    TooManyRequests,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError | ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized | ErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "请求参数校验失败",
            ErrorCode::InvalidRequest => "请求格式无效",
            ErrorCode::Unauthorized => "需要认证",
            ErrorCode::InvalidCredentials => "邮箱或密码错误",
            ErrorCode::NotFound => "资源不存在",
            ErrorCode::TooManyRequests => "请求过于频繁，请稍后再试",
            ErrorCode::InternalError => "服务器内部错误",
        }
    }
}

// 统一的错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: bool,
    pub code: &'static str,
    pub message: &'static str,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    path: String,
    validation: Option<BTreeMap<String, Vec<String>>>,
}

impl ApiError {
    pub fn new(code: ErrorCode, path: &str) -> Self {
        Self {
            code,
            path: path.to_string(),
            validation: None,
        }
    }

    pub fn internal(path: &str, cause: impl fmt::Display) -> Self {
        error!("请求 {} 内部错误: {}", path, cause);
        Self::new(ErrorCode::InternalError, path)
    }

    pub fn validation(path: &str, errors: &ValidationErrors) -> Self {
        let mut details: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (field, field_errors) in errors.field_errors() {
            let messages = details.entry(field.to_lowercase()).or_default();
            messages.extend(field_errors.iter().map(validation_message));
        }

        Self {
            code: ErrorCode::ValidationError,
            path: path.to_string(),
            validation: Some(details),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code.message(), self.code.as_str())
    }
}

impl std::error::Error for ApiError {}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.code.status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: true,
            code: self.code.as_str(),
            message: self.code.message(),
            path: self.path.clone(),
            validation: self.validation.clone(),
        })
    }
}

fn validation_message(err: &ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }

    match err.code.as_ref() {
        "required" => "该字段为必填项".to_string(),
        "email" => "邮箱格式无效".to_string(),
        "length" => match (err.params.get("min"), err.params.get("max")) {
            (Some(min), _) if min.as_u64() == Some(1) => "该字段为必填项".to_string(),
            (Some(min), _) => format!("长度不能少于 {} 个字符", min),
            (None, Some(max)) => format!("长度不能超过 {} 个字符", max),
            (None, None) => "长度无效".to_string(),
        },
        _ => "值无效".to_string(),
    }
}

// JSON 请求体解析失败
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    warn!("请求 {} 的 JSON 解析失败: {}", req.path(), err);
    ApiError::new(ErrorCode::InvalidRequest, req.path()).into()
}

pub async fn not_found(req: HttpRequest) -> HttpResponse {
    warn!("未找到路由: {} {}", req.method(), req.path());
    ApiError::new(ErrorCode::NotFound, req.path()).error_response()
}
