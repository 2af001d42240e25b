//! Scripted WebSocket client for driving an Eliza server from tests and tools.
//!
//! Instead of counting down a latch, callers ask for a number of utterances
//! and get an error if they do not all arrive before the timeout.

use std::time::Duration;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::error::WebSocketError;
use crate::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ElizaClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    received: Vec<String>,
    closed: bool,
}

impl ElizaClient {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| WebSocketError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(WebSocketError::InvalidEndpoint(format!(
                "expected a ws:// or wss:// url, got {}",
                endpoint
            ))
            .into());
        }

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();
        debug!("Connected to {}", url);

        Ok(Self {
            write,
            read,
            received: Vec::new(),
            closed: false,
        })
    }

    pub async fn say(&mut self, text: &str) -> Result<()> {
        self.write
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| WebSocketError::SendError(e.to_string()))?;
        Ok(())
    }

    /// Waits until `count` utterances have been received in total since
    /// connecting, then returns all of them in arrival order.
    pub async fn expect_utterances(&mut self, count: usize, wait: Duration) -> Result<Vec<String>> {
        let deadline = Instant::now() + wait;

        while self.received.len() < count {
            if self.closed {
                return Err(WebSocketError::ConnectionError(format!(
                    "connection closed after {} of {} utterances",
                    self.received.len(),
                    count
                ))
                .into());
            }
            match timeout_at(deadline, self.next_utterance()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(WebSocketError::Timeout {
                        expected: count,
                        received: self.received.len(),
                    }
                    .into())
                }
            }
        }

        Ok(self.received.clone())
    }

    /// Collects whatever else arrives within `wait`. Used to check that no
    /// utterances beyond the expected ones are sent.
    pub async fn quiet_for(&mut self, wait: Duration) -> Result<Vec<String>> {
        let deadline = Instant::now() + wait;
        let before = self.received.len();

        while !self.closed {
            match timeout_at(deadline, self.next_utterance()).await {
                Ok(result) => result?,
                Err(_) => break,
            }
        }

        Ok(self.received[before..].to_vec())
    }

    /// Reads frames until one utterance arrives or the server closes.
    async fn next_utterance(&mut self) -> Result<()> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    debug!("Received {:?}", text);
                    self.received.push(text);
                    return Ok(());
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Ok(());
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(e.into());
                }
            }
        }
    }

    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Whether the server has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn close(mut self) -> Result<()> {
        if !self.closed {
            self.write.close().await?;
        }
        Ok(())
    }
}
