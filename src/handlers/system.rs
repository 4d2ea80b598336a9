use actix_web::{web, HttpResponse};
use log::debug;

use crate::dto::{HealthResponse, HomeResponse};
use crate::state::AppState;

pub async fn health(data: web::Data<AppState>) -> HttpResponse {
    debug!("处理健康检查请求");
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        service: data.app.name.clone(),
        version: data.app.version.clone(),
        env: data.app.env.clone(),
    })
}

pub async fn home(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HomeResponse {
        message: format!("欢迎使用 {}", data.app.name),
        version: data.app.version.clone(),
        status: "running",
    })
}
