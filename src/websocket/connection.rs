use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MalformedPolicy;
use crate::eliza::Responder;
use crate::error::SessionError;
use crate::session::{Direction, Session};

/// Sent on every new session before any client input is read.
pub const GREETING: [&str; 2] = ["The doctor is in.", "What's on your mind?"];

/// Drives one session: greeting, reply turns and close. All sends go through
/// the session's outbound channel, in call order.
pub struct SessionDriver {
    session: Session,
    responder: Arc<dyn Responder>,
    tx: mpsc::Sender<Message>,
    malformed_policy: MalformedPolicy,
    last_heartbeat: Arc<RwLock<Instant>>,
}

impl SessionDriver {
    pub fn new(
        session: Session,
        responder: Arc<dyn Responder>,
        tx: mpsc::Sender<Message>,
        malformed_policy: MalformedPolicy,
    ) -> Self {
        Self {
            session,
            responder,
            tx,
            malformed_policy,
            last_heartbeat: Arc::new(RwLock::new(Instant::now())),
        }
    }

    pub async fn on_open(&mut self) -> Result<(), SessionError> {
        info!("Session {} opened for {}", self.session.id(), self.session.peer());
        for line in GREETING {
            self.send_text(line).await?;
        }
        Ok(())
    }

    pub async fn on_message(&mut self, text: &str) -> Result<(), SessionError> {
        if !self.session.is_open() {
            return Err(SessionError::TransportClosed);
        }
        self.session.record(Direction::Inbound, text);

        let reply = self.responder.respond(text);
        for utterance in reply.utterances {
            self.send_text(utterance).await?;
        }

        if reply.farewell {
            info!("Session {} said goodbye", self.session.id());
            self.close(CloseCode::Normal, "goodbye").await;
        }
        Ok(())
    }

    pub fn on_close(&mut self) {
        if self.session.is_open() {
            self.session.close();
            info!(
                "Session {} closed by {} after {}s",
                self.session.id(),
                self.session.peer(),
                self.session.age().num_seconds()
            );
        }
    }

    /// Dispatches one inbound transport frame.
    pub async fn handle_frame(&mut self, msg: Message) -> Result<(), SessionError> {
        *self.last_heartbeat.write().await = Instant::now();

        match msg {
            Message::Text(text) => self.on_message(&text).await,
            Message::Binary(bin) => {
                self.on_malformed(format!("binary frame of {} bytes", bin.len())).await
            }
            Message::Close(frame) => {
                info!("Client initiated close for session {}: {:?}", self.session.id(), frame);
                self.on_close();
                Ok(())
            }
            Message::Ping(data) => self.send_frame(Message::Pong(data)).await,
            Message::Pong(_) | Message::Frame(_) => Ok(()),
        }
    }

    async fn on_malformed(&mut self, detail: String) -> Result<(), SessionError> {
        match self.malformed_policy {
            MalformedPolicy::Ignore => {
                warn!("Ignoring malformed message on session {}: {}", self.session.id(), detail);
                Ok(())
            }
            MalformedPolicy::Drop => {
                warn!("Dropping session {} after malformed message: {}", self.session.id(), detail);
                self.close(CloseCode::Unsupported, "text frames only").await;
                Err(SessionError::MalformedMessage(detail))
            }
        }
    }

    async fn send_text(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        if !self.session.is_open() {
            return Err(SessionError::TransportClosed);
        }
        let text = text.into();
        self.send_frame(Message::Text(text.clone())).await?;
        self.session.record(Direction::Outbound, text);
        Ok(())
    }

    async fn send_frame(&mut self, msg: Message) -> Result<(), SessionError> {
        if self.tx.send(msg).await.is_err() {
            error!("Transport closed while sending on session {}", self.session.id());
            self.session.close();
            return Err(SessionError::TransportClosed);
        }
        Ok(())
    }

    /// Sends a Close frame and marks the session closed. Best effort: the
    /// transport may already be gone.
    async fn close(&mut self, code: CloseCode, reason: &'static str) {
        if !self.session.is_open() {
            return;
        }
        let frame = CloseFrame {
            code,
            reason: Cow::Borrowed(reason),
        };
        if let Err(e) = self.tx.send(Message::Close(Some(frame))).await {
            debug!("Close frame for session {} not delivered: {}", self.session.id(), e);
        }
        self.session.close();
    }

    /// Pings the client every `interval`. The task ends, after sending a Close
    /// frame, once no inbound frame has been seen for `timeout`.
    pub fn start_heartbeat(&self, interval: Duration, timeout: Duration) -> JoinHandle<()> {
        let last_heartbeat = self.last_heartbeat.clone();
        let tx = self.tx.clone();
        let id = self.session.id();

        tokio::spawn(async move {
            loop {
                sleep(interval).await;

                let elapsed = Instant::now().duration_since(*last_heartbeat.read().await);

                if elapsed > timeout {
                    error!("Heartbeat timeout for session {}", id);
                    let frame = CloseFrame {
                        code: CloseCode::Away,
                        reason: Cow::Borrowed("heartbeat timeout"),
                    };
                    if let Err(e) = tx.send(Message::Close(Some(frame))).await {
                        debug!("Close frame for session {} not delivered: {}", id, e);
                    }
                    break;
                }

                if let Err(e) = tx.send(Message::Ping(Vec::new())).await {
                    error!("Failed to send heartbeat for session {}: {}", id, e);
                    break;
                }
            }
        })
    }

    pub fn id(&self) -> Uuid {
        self.session.id()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sender(&self) -> mpsc::Sender<Message> {
        self.tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eliza::{MockResponder, Reply};

    fn driver_with(
        responder: MockResponder,
        policy: MalformedPolicy,
    ) -> (SessionDriver, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        let driver = SessionDriver::new(Session::new("test-peer", 64), Arc::new(responder), tx, policy);
        (driver, rx)
    }

    fn texts(rx: &mut mpsc::Receiver<Message>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                out.push(text);
            }
        }
        out
    }

    #[tokio::test]
    async fn test_greeting_sent_in_order() {
        let (mut driver, mut rx) = driver_with(MockResponder::new(), MalformedPolicy::Ignore);
        driver.on_open().await.unwrap();

        assert_eq!(texts(&mut rx), vec!["The doctor is in.", "What's on your mind?"]);
        assert_eq!(driver.session().sent(), GREETING.to_vec());
    }

    #[tokio::test]
    async fn test_reply_utterances_sent_in_order() {
        let mut responder = MockResponder::new();
        responder
            .expect_respond()
            .withf(|input: &str| input == "hello")
            .times(1)
            .returning(|_| Reply::new(vec!["a".into(), "b".into(), "c".into()]));

        let (mut driver, mut rx) = driver_with(responder, MalformedPolicy::Ignore);
        driver.on_open().await.unwrap();
        driver.handle_frame(Message::Text("hello".into())).await.unwrap();

        let received = texts(&mut rx);
        assert_eq!(received.len(), 5);
        assert_eq!(&received[2..], ["a", "b", "c"]);
        assert!(driver.is_open());

        let inbound: Vec<&str> = driver
            .session()
            .transcript()
            .filter(|u| u.direction == Direction::Inbound)
            .map(|u| u.text.as_str())
            .collect();
        assert_eq!(inbound, vec!["hello"]);
    }

    #[tokio::test]
    async fn test_farewell_closes_session() {
        let mut responder = MockResponder::new();
        responder
            .expect_respond()
            .times(1)
            .returning(|_| Reply::farewell(vec!["Alright then, goodbye!".into()]));

        let (mut driver, mut rx) = driver_with(responder, MalformedPolicy::Ignore);
        driver.on_message("bye").await.unwrap();

        assert!(matches!(rx.try_recv(), Ok(Message::Text(t)) if t == "Alright then, goodbye!"));
        assert!(matches!(rx.try_recv(), Ok(Message::Close(Some(f))) if f.code == CloseCode::Normal));
        assert!(!driver.is_open());

        // No further sends once closed; the mock would panic on a second call
        assert_eq!(driver.on_message("hello?").await, Err(SessionError::TransportClosed));
    }

    #[tokio::test]
    async fn test_send_on_dropped_transport() {
        let (mut driver, rx) = driver_with(MockResponder::new(), MalformedPolicy::Ignore);
        drop(rx);

        assert_eq!(driver.on_open().await, Err(SessionError::TransportClosed));
        assert!(!driver.is_open());
        assert!(driver.session().sent().is_empty());
    }

    #[tokio::test]
    async fn test_binary_ignored_by_default() {
        let (mut driver, mut rx) = driver_with(MockResponder::new(), MalformedPolicy::Ignore);
        driver.handle_frame(Message::Binary(vec![1, 2, 3])).await.unwrap();

        assert!(driver.is_open());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_binary_drops_session_under_drop_policy() {
        let (mut driver, mut rx) = driver_with(MockResponder::new(), MalformedPolicy::Drop);
        let result = driver.handle_frame(Message::Binary(vec![0xff])).await;

        assert!(matches!(result, Err(SessionError::MalformedMessage(_))));
        assert!(!driver.is_open());
        assert!(matches!(rx.try_recv(), Ok(Message::Close(Some(f))) if f.code == CloseCode::Unsupported));
    }

    #[tokio::test]
    async fn test_close_on_dropped_transport_still_closes_session() {
        let (mut driver, rx) = driver_with(MockResponder::new(), MalformedPolicy::Drop);
        drop(rx);

        let result = driver.handle_frame(Message::Binary(vec![0xff])).await;
        assert!(matches!(result, Err(SessionError::MalformedMessage(_))));
        assert!(!driver.is_open());
        assert_eq!(driver.on_message("hello").await, Err(SessionError::TransportClosed));
    }

    #[tokio::test]
    async fn test_client_close_and_ping() {
        let (mut driver, mut rx) = driver_with(MockResponder::new(), MalformedPolicy::Ignore);

        driver.handle_frame(Message::Ping(vec![7])).await.unwrap();
        assert!(matches!(rx.try_recv(), Ok(Message::Pong(data)) if data == vec![7]));

        driver.handle_frame(Message::Close(None)).await.unwrap();
        assert!(!driver.is_open());
    }

    #[tokio::test]
    async fn test_heartbeat_times_out_silent_client() {
        let (driver, mut rx) = driver_with(MockResponder::new(), MalformedPolicy::Ignore);
        let handle = driver.start_heartbeat(Duration::from_millis(20), Duration::from_millis(50));

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("heartbeat should stop")
            .unwrap();

        let mut pings = 0;
        let mut closed = false;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                Message::Ping(_) => pings += 1,
                Message::Close(Some(f)) => closed = f.code == CloseCode::Away,
                other => panic!("unexpected frame {:?}", other),
            }
        }
        assert!(pings >= 1);
        assert!(closed);
    }
}
