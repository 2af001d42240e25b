use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::WebSocketError(WebSocketError::ConnectionError(err.to_string()))
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::SessionError(SessionError::MalformedMessage(_)) => StatusCode::BAD_REQUEST,
            AppError::SessionError(SessionError::TransportClosed) => StatusCode::GONE,
            AppError::WebSocketError(WebSocketError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Message sending failed: {0}")]
    SendError(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Timed out waiting for {expected} utterances, received {received}")]
    Timeout { expected: usize, received: usize },
}

/// Failures scoped to a single session. None of these are fatal to the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Transport closed")]
    TransportClosed,

    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}
