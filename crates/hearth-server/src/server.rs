use actix_cors::Cors;
use actix_web::{web, App, HttpServer};

use hearth_store::MAX_UPLOAD_BYTES;

use crate::config::ServerConfig;
use crate::handlers;
use crate::state::AppState;

/// Route table, shared by the binary and the integration tests.
pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES)).service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health::handler))
            .route("/models", web::get().to(handlers::models::handler))
            .route("/chat", web::post().to(handlers::chat::handler))
            .route(
                "/chat/{message_id}/stop",
                web::post().to(handlers::stop::handler),
            )
            .route(
                "/conversations",
                web::get().to(handlers::conversations::list),
            )
            .route(
                "/conversations",
                web::post().to(handlers::conversations::create),
            )
            .route(
                "/conversations/{conversation_id}",
                web::get().to(handlers::conversations::get),
            )
            .route(
                "/conversations/{conversation_id}",
                web::put().to(handlers::conversations::rename),
            )
            .route(
                "/conversations/{conversation_id}",
                web::delete().to(handlers::conversations::delete),
            )
            .route(
                "/conversations/{conversation_id}/files",
                web::post().to(handlers::files::upload),
            )
            .route(
                "/conversations/{conversation_id}/files",
                web::get().to(handlers::files::list),
            )
            .route(
                "/files/deactivate",
                web::post().to(handlers::files::deactivate),
            ),
    );
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = web::Data::new(AppState::from_config(&config).await?);

    log::info!("Listening on {}:{}", config.host, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
