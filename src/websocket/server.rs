use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{error, info, warn};

use crate::config::SessionConfig;
use crate::eliza::Responder;
use crate::session::Session;
use crate::websocket::{SessionDriver, SessionPool};

/// How long queued replies may take to reach the client once a session ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before retrying `accept` after `failures` consecutive errors. Errors
/// such as EMFILE return immediately, so retrying without a pause spins.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1u32 << failures.min(16))
        .min(ACCEPT_BACKOFF_MAX)
}

pub struct WebSocketServer {
    pool: Arc<SessionPool>,
    responder: Arc<dyn Responder>,
    path: String,
    session: SessionConfig,
}

impl WebSocketServer {
    pub fn new(responder: Arc<dyn Responder>, path: impl Into<String>, session: SessionConfig) -> Self {
        Self {
            pool: Arc::new(SessionPool::new()),
            responder,
            path: path.into(),
            session,
        }
    }

    /// Accepts connections forever, backing off while `accept` keeps failing.
    /// Each connection runs on its own task.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("Eliza listening at ws://{}{}", addr, self.path),
            Err(e) => warn!("Eliza listening on unknown address: {}", e),
        }

        let mut failures: u32 = 0;
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    failures = 0;
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, addr).await;
                    });
                }
                Err(e) => {
                    let pause = accept_backoff(failures);
                    failures = failures.saturating_add(1);
                    error!("Failed to accept connection, retrying in {:?}: {}", pause, e);
                    sleep(pause).await;
                }
            }
        }
    }

    pub async fn handle_connection(
        self: Arc<Self>,
        raw_stream: TcpStream,
        addr: SocketAddr,
    ) {
        info!("New WebSocket connection from: {}", addr);

        let expected_path = self.path.clone();
        let check_path = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            if req.uri().path() == expected_path {
                Ok(response)
            } else {
                let mut rejection = ErrorResponse::new(Some(format!("No endpoint at {}", req.uri().path())));
                *rejection.status_mut() = StatusCode::NOT_FOUND;
                Err(rejection)
            }
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(raw_stream, check_path).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("Error during WebSocket handshake with {}: {}", addr, e);
                return;
            }
        };

        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(self.session.outbound_buffer);

        let mut driver = SessionDriver::new(
            Session::new(addr.to_string(), self.session.transcript_limit),
            self.responder.clone(),
            tx,
            self.session.malformed_policy,
        );
        let session_id = driver.id();

        self.pool.add(session_id, driver.sender()).await;
        let heartbeat = driver.start_heartbeat(
            self.session.heartbeat_interval(),
            self.session.heartbeat_timeout(),
        );

        // Forward queued frames to the socket, stopping after a Close frame
        let mut send_task = tokio::spawn(async move {
            let mut ws_sink = ws_sink;
            let mut rx = rx;
            let mut close_sent = false;

            while let Some(message) = rx.recv().await {
                close_sent = message.is_close();
                if let Err(e) = ws_sink.send(message).await {
                    error!("Error sending WebSocket message: {}", e);
                    return;
                }
                if close_sent {
                    break;
                }
            }

            if !close_sent {
                if let Err(e) = ws_sink.close().await {
                    error!("Error closing WebSocket connection: {}", e);
                }
            }
        });

        // Greet, then feed inbound frames to the driver one at a time
        let mut receive_task = tokio::spawn(async move {
            let mut ws_stream = ws_stream;

            if let Err(e) = driver.on_open().await {
                error!("Failed to greet session {}: {}", driver.id(), e);
                return;
            }

            while driver.is_open() {
                match ws_stream.next().await {
                    Some(Ok(msg)) => {
                        if let Err(e) = driver.handle_frame(msg).await {
                            error!("Error handling message on session {}: {}", driver.id(), e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("Error receiving WebSocket message on session {}: {}", driver.id(), e);
                        break;
                    }
                    None => break,
                }
            }

            driver.on_close();
        });

        let send_finished = tokio::select! {
            _ = &mut send_task => {
                info!("Send task completed for session {}", session_id);
                true
            }
            _ = &mut receive_task => {
                info!("Receive task completed for session {}", session_id);
                false
            }
        };

        heartbeat.abort();
        self.pool.remove(&session_id).await;

        if send_finished {
            receive_task.abort();
        } else if tokio::time::timeout(DRAIN_TIMEOUT, &mut send_task).await.is_err() {
            warn!("Dropping undelivered frames for session {}", session_id);
            send_task.abort();
        }

        info!("Session {} closed", session_id);
    }

    pub fn pool(&self) -> Arc<SessionPool> {
        self.pool.clone()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Sends a Close frame to every live session.
    pub async fn shutdown(&self) {
        let notified = self.pool.close_all().await;
        info!("Asked {} session(s) to close", notified);
    }
}
