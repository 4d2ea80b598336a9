use actix_files::Files;
use actix_web::web;
use std::path::Path;

use crate::auth::AuthMiddleware;
use crate::error::json_error_handler;
use crate::state::AppState;

mod auth;
mod system;

pub fn configure(
    cfg: &mut web::ServiceConfig,
    state: web::Data<AppState>,
    static_dir: Option<&Path>,
) {
    let require_auth = AuthMiddleware::new(state.access_tokens.clone());

    cfg.app_data(state)
        .app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .route("/", web::get().to(system::home))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(system::health))
                .route("/auth/signin", web::post().to(auth::signin))
                .route("/auth/refresh", web::post().to(auth::refresh))
                .service(
                    web::resource("/auth/me")
                        .wrap(require_auth)
                        .route(web::get().to(auth::me)),
                ),
        );

    if let Some(dir) = static_dir {
        cfg.service(Files::new("/static", dir));
    }
}
