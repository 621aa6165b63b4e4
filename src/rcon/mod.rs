//! Remote command channel to the game server.

pub mod client;
pub mod packet;

use anyhow::Result;
use async_trait::async_trait;

pub use client::RconClient;

/// Fire-and-forget server commands. Success only means the server accepted
/// the command; any effect is confirmed later through the log.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn execute(&self, command: &str) -> Result<String>;
}

/// Live server facts consulted when deciding to start a capture and when
/// naming artifacts.
#[async_trait]
pub trait ServerStatus: Send + Sync {
    async fn player_count(&self) -> Result<usize>;

    /// `None` when the layer cannot be determined.
    async fn current_layer(&self) -> Option<String>;
}
