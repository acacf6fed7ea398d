//! Speech server: router construction, binding and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use runtime::SpeechService;
use tts_core::{ServerConfig, TtsError, TtsResult};

use crate::handlers;

/// Build the HTTP router around a shared service.
pub fn create_router(service: Arc<SpeechService>, max_body_size: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/tts", post(handlers::tts))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// The speech synthesis server.
pub struct TtsServer {
    config: ServerConfig,
    service: Arc<SpeechService>,
}

impl TtsServer {
    /// Create a server for `service`. The service may still be loading.
    pub fn new(config: ServerConfig, service: Arc<SpeechService>) -> Self {
        Self { config, service }
    }

    /// Router for this server's service.
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.service), self.config.max_body_size)
    }

    /// Bind and serve until SIGINT/SIGTERM.
    pub async fn run(self) -> TtsResult<()> {
        let addr = self.config.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let app = self.router();

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_rx.changed().await.ok();
                })
                .await
        });

        info!(addr = %addr, "Speech server listening");

        tokio::select! {
            _ = shutdown_signal() => {}
            result = &mut server => {
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(TtsError::Io(e)),
                    Err(e) => Err(TtsError::internal(format!("server task failed: {e}"))),
                };
            }
        }

        info!("Shutdown signal received, draining connections...");
        let _ = shutdown_tx.send(true);

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        match tokio::time::timeout(timeout, server).await {
            Ok(Ok(Ok(()))) => info!("Server stopped gracefully"),
            Ok(Ok(Err(e))) => return Err(TtsError::Io(e)),
            Ok(Err(e)) => return Err(TtsError::internal(format!("server task failed: {e}"))),
            Err(_) => warn!("Shutdown timeout, forcing exit"),
        }

        Ok(())
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{DevicePreference, ReferenceLoader};

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap().port(), 5050);
    }

    #[tokio::test]
    async fn test_run_rejects_bad_host() {
        let config = ServerConfig {
            host: "localhost:abc".to_string(),
            ..Default::default()
        };
        let service = Arc::new(SpeechService::new(config.clone_temperature));
        service
            .load(&ReferenceLoader, DevicePreference::Cpu)
            .unwrap();

        let err = TtsServer::new(config, service).run().await.unwrap_err();
        assert!(matches!(err, TtsError::Config(_)));
    }
}
