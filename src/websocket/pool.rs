use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;
use tracing::{error, info};

/// Live sessions by id. Only used for bookkeeping and shutdown; sessions never
/// reach each other through it.
#[derive(Debug, Default)]
pub struct SessionPool {
    sessions: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Message>>>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn add(&self, id: Uuid, sender: mpsc::Sender<Message>) {
        self.sessions.write().await.insert(id, sender);
        info!("Added session {} to pool", id);
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!("Removed session {} from pool", id);
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Asks every live session to close. Sessions clean themselves up as their
    /// connection tasks finish.
    pub async fn close_all(&self) -> usize {
        let senders: Vec<(Uuid, mpsc::Sender<Message>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut notified = 0;
        for (id, sender) in senders {
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: Cow::Borrowed("server shutting down"),
            };
            match sender.send(Message::Close(Some(frame))).await {
                Ok(()) => notified += 1,
                Err(e) => error!("Failed to close session {}: {}", id, e),
            }
        }
        notified
    }
}
