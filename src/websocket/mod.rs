//! WebSocket transport for the Eliza server
//!
//! Accepts connections on the configured path, runs one [`SessionDriver`]
//! per client and keeps the live sessions in a [`SessionPool`].

mod connection;
mod pool;
mod server;

pub use connection::{SessionDriver, GREETING};
pub use pool::SessionPool;
pub use server::WebSocketServer;
