use actix_web::{web, App, HttpServer};
use log::info;
use std::io;

mod routes;
mod websocket;

use chess_sync::config::SyncConfig;
use websocket::AppState;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = SyncConfig::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    info!("Starting chess sync server at http://{}", config.bind);
    info!(
        "Peers reach this host at {}, snapshots live in {}",
        config.public_ws,
        config.storage.dir.display()
    );

    let bind = config.bind;
    let static_dir = config.static_dir.clone();
    let app_state = web::Data::new(AppState::new(config));

    HttpServer::new(move || {
        let static_dir = static_dir.clone();
        App::new()
            .app_data(app_state.clone())
            .configure(move |cfg| routes::configure_routes(cfg, &static_dir))
    })
    .bind(bind)?
    .run()
    .await
}
