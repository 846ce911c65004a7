use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use log::*;
use service::config::Config;
use tower_http::cors::{Any, CorsLayer};

pub(crate) mod controller;
mod error;
pub mod router;

pub use error::{Error, Result};
pub use service::AppState;

/// Bind the listener and serve the router until the process terminates.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let host = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = app_state.config.port;
    let listen_address = format!("{host}:{port}");

    let cors_layer = build_cors_layer(&app_state.config);
    let routes = router::define_routes(app_state).layer(cors_layer);

    let listener = tokio::net::TcpListener::bind(&listen_address).await?;

    info!("Server starting... listening for requests on http://{listen_address}");
    info!("Current counter value: {}", domain::counter::current_value());

    axum::serve(listener, routes).await
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.is_production() {
        let allowed_origins = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Ignoring invalid allowed origin {origin}: {e:?}");
                    None
                }
            })
            .collect::<Vec<_>>();

        info!("Starting with CORS origins: {:?}", config.allowed_origins);

        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([CONTENT_TYPE])
    } else {
        // Outside production the browser demo client may be served from anywhere
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers([CONTENT_TYPE])
    }
}
