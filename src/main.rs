mod auth;
mod config;
mod dto;
mod error;
mod handlers;
mod logger;
mod state;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};
use log::{debug, error, info, warn};
use std::io;

use auth::DenyAllVerifier;
use config::{AppConfig, PLACEHOLDER_SECRET};
use state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("加载配置失败: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    logger::init(&config.log.dir, config.log.level);
    info!("{} {} 启动 ({})", config.app.name, config.app.version, config.app.env);
    if config.jwt.secret == PLACEHOLDER_SECRET {
        warn!("JWT_SECRET 未设置，正在使用不安全的占位密钥");
    }

    let app_state = web::Data::new(
        AppState::from_config(&config, Box::new(DenyAllVerifier)).map_err(|e| {
            error!("初始化 token 服务失败: {}", e);
            io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
        })?,
    );

    // 定期清理登录失败记录
    let cleanup_state = app_state.clone();
    let cleanup_every = config
        .signin_limit
        .window
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_every);
        loop {
            ticker.tick().await;
            let removed = cleanup_state.signin_guard.cleanup();
            debug!(
                "清理了 {} 个过期的登录失败记录，剩余 {} 个",
                removed,
                cleanup_state.signin_guard.tracked_clients()
            );
        }
    });

    let static_dir = Some(config.server.static_dir.clone()).filter(|dir| dir.is_dir());
    if static_dir.is_none() {
        info!("静态目录 {} 不存在，跳过挂载", config.server.static_dir.display());
    }

    let bind = (config.server.host.clone(), config.server.port);
    info!("服务器启动在 http://{}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION])
                    .max_age(3600),
            )
            .configure(|cfg| {
                handlers::configure(cfg, app_state.clone(), static_dir.as_deref())
            })
            .default_service(web::to(error::not_found))
    })
    .bind(bind)?
    .run()
    .await
}
