use actix_files as fs;
use actix_web::{web, HttpResponse};
use log::warn;
use std::path::Path;

use crate::websocket::{peer_index, ws_index, AppState};

/// HTTP handler for the index page
pub async fn index(app_state: web::Data<AppState>) -> HttpResponse {
    let path = app_state.config.static_dir.join("index.html");
    match std::fs::read_to_string(&path) {
        Ok(page) => HttpResponse::Ok().content_type("text/html; charset=utf-8").body(page),
        Err(e) => {
            warn!("Cannot serve {}: {}", path.display(), e);
            HttpResponse::Ok().body("Chess Sync")
        }
    }
}

/// Configure the HTTP routes
pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: &Path) {
    cfg.service(web::resource("/ws").route(web::get().to(ws_index)))
        .service(web::resource("/peer/{room}").route(web::get().to(peer_index)))
        .service(web::resource("/").route(web::get().to(index)))
        .service(fs::Files::new("/static", static_dir));
}
