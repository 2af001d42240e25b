pub mod client;
pub mod config;
pub mod eliza;
pub mod error;
pub mod session;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use client::ElizaClient;
pub use eliza::{ElizaResponder, Reply, Responder};
pub use websocket::{SessionDriver, SessionPool, WebSocketServer};

/// Health check endpoint handler
/// Returns a JSON response with server status, timestamp and live session count
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let active_sessions = state.ws_server.pool().session_count().await;

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "active_sessions": active_sessions,
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub ws_server: Arc<WebSocketServer>,
}

impl AppState {
    pub fn new(config: Settings) -> Result<Self> {
        Self::with_responder(config, Arc::new(ElizaResponder::new()))
    }

    pub fn with_responder(config: Settings, responder: Arc<dyn Responder>) -> Result<Self> {
        config.validate()?;

        let ws_server = WebSocketServer::new(
            responder,
            config.server.path.clone(),
            config.session.clone(),
        );

        Ok(Self {
            config: Arc::new(config),
            ws_server: Arc::new(ws_server),
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.ws_server.shutdown().await;
        Ok(())
    }
}
