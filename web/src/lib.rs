use axum::http::{header, HeaderValue, Method};
use log::*;
use service::AppState;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};

mod controller;
mod error;
mod extractors;
mod middleware;
mod response;
pub mod router;
mod websocket;

pub use self::error::{Error, Result};

/// Serves the API until SIGINT/SIGTERM, then tears down every live WebSocket
/// connection so the registry is empty by the time this returns.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let host = format!("{interface}:{}", app_state.config.port);

    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_credentials(true)
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
        .allow_origin(AllowOrigin::list(allowed_origins(
            &app_state.config.allowed_origins,
        )));

    let manager = app_state.ws_manager.clone();
    let shutdown_manager = manager.clone();
    let drain_timeout = manager.settings().write_timeout;
    let app = router::define_routes(app_state).layer(cors_layer);

    let listener = TcpListener::bind(&host).await?;
    info!("Server starting... listening for connections on http://{host}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Upgraded sockets are not tracked by the HTTP server's own drain
            if tokio::time::timeout(drain_timeout, shutdown_manager.shutdown())
                .await
                .is_err()
            {
                warn!("Message writes still pending after {drain_timeout:?}");
            }
        })
        .await?;

    let drained = tokio::time::timeout(drain_timeout, async {
        while manager.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    match drained {
        Ok(()) => info!("All WebSocket connections closed"),
        Err(_) => warn!(
            "{} WebSocket connection(s) still open after {drain_timeout:?}",
            manager.connection_count()
        ),
    }

    Ok(())
}

fn allowed_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin:?}: {e}");
                None
            }
        })
        .collect()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully..."),
        _ = terminate => info!("Received terminate signal, shutting down gracefully..."),
    }
}
