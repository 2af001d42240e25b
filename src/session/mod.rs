//! Session data model
//!
//! One [`Session`] per connected client, holding its open/closed state and the
//! ordered log of utterances exchanged on it.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client to server.
    Inbound,
    /// Server to client.
    Outbound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    pub direction: Direction,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    peer: String,
    state: SessionState,
    opened_at: DateTime<Utc>,
    transcript: VecDeque<Utterance>,
    transcript_limit: usize,
}

impl Session {
    pub fn new(peer: impl Into<String>, transcript_limit: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer: peer.into(),
            state: SessionState::Open,
            opened_at: Utc::now(),
            transcript: VecDeque::new(),
            transcript_limit,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Time since the session was opened.
    pub fn age(&self) -> Duration {
        Utc::now() - self.opened_at
    }

    /// CLOSED is terminal.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    pub fn record(&mut self, direction: Direction, text: impl Into<String>) {
        if self.transcript_limit == 0 {
            return;
        }
        while self.transcript.len() >= self.transcript_limit {
            self.transcript.pop_front();
        }
        self.transcript.push_back(Utterance {
            direction,
            text: text.into(),
            at: Utc::now(),
        });
    }

    pub fn transcript(&self) -> impl Iterator<Item = &Utterance> {
        self.transcript.iter()
    }

    /// Texts sent to the client, oldest first.
    pub fn sent(&self) -> Vec<&str> {
        self.transcript
            .iter()
            .filter(|u| u.direction == Direction::Outbound)
            .map(|u| u.text.as_str())
            .collect()
    }
}
