//! In-process stand-ins for the server and the delivery sink.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::delivery::{DeliverySink, Upload};
use crate::rcon::{CommandChannel, ServerStatus};

/// Records every command attempt, including failed ones.
#[derive(Default)]
pub struct FakeCommands {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl FakeCommands {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.sent().iter().filter(|c| c.as_str() == command).count()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandChannel for FakeCommands {
    async fn execute(&self, command: &str) -> Result<String> {
        self.sent.lock().unwrap().push(command.to_string());
        if self.failing.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(format!("Executed {command}"))
    }
}

pub struct FakeStatus {
    players: AtomicUsize,
    layer: Option<String>,
}

impl FakeStatus {
    pub fn new(players: usize, layer: Option<&str>) -> Self {
        Self {
            players: AtomicUsize::new(players),
            layer: layer.map(String::from),
        }
    }

    pub fn set_players(&self, players: usize) {
        self.players.store(players, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServerStatus for FakeStatus {
    async fn player_count(&self) -> Result<usize> {
        Ok(self.players.load(Ordering::SeqCst))
    }

    async fn current_layer(&self) -> Option<String> {
        self.layer.clone()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    uploads: Mutex<Vec<Upload>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            failing: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, upload: Upload) -> Result<()> {
        self.uploads.lock().unwrap().push(upload);
        if self.failing.load(Ordering::SeqCst) {
            bail!("sink unreachable");
        }
        Ok(())
    }
}
