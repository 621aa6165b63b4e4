use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use regex::Regex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time;

use crate::settings::RconSettings;

use super::packet::{
    Packet, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND,
    SERVERDATA_RESPONSE_VALUE,
};
use super::{CommandChannel, ServerStatus};

const EXCHANGE_TIMEOUT_SECS: u64 = 10;

static PLAYER_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ID: \d+ \|").expect("player row regex"));

static CURRENT_LAYER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"layer is (?P<layer>[^,\s]+)").expect("current layer regex"));

/// Source RCON client. One exchange at a time; the connection is opened
/// lazily and dropped after any failure so the next call reconnects.
pub struct RconClient {
    address: String,
    password: String,
    connection: Mutex<Option<TcpStream>>,
    next_id: AtomicI32,
    timeout: Duration,
}

impl RconClient {
    pub fn new(settings: &RconSettings) -> Self {
        Self {
            address: format!("{}:{}", settings.host, settings.port),
            password: settings.password.clone(),
            connection: Mutex::new(None),
            next_id: AtomicI32::new(1),
            timeout: Duration::from_secs(EXCHANGE_TIMEOUT_SECS),
        }
    }

    fn allocate_id(&self) -> i32 {
        // Wraps well before overflow; ids only need to differ between
        // consecutive exchanges.
        let id = self.next_id.fetch_add(2, Ordering::Relaxed);
        if id > i32::MAX - 4 {
            self.next_id.store(1, Ordering::Relaxed);
        }
        id
    }

    async fn connect(&self) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(&self.address)
            .await
            .with_context(|| format!("Failed to connect to RCON at {}", self.address))?;

        let id = self.allocate_id();
        stream
            .write_all(&Packet::new(id, SERVERDATA_AUTH, self.password.as_str()).encode())
            .await
            .context("Failed to send RCON auth")?;

        loop {
            let packet = Packet::read_from(&mut stream).await?;
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            if packet.id == -1 {
                bail!("RCON authentication rejected by {}", self.address);
            }
            info!("RCON connected to {}", self.address);
            return Ok(stream);
        }
    }

    /// Sends `command` and collects the (possibly multi-packet) response.
    pub async fn exchange(&self, command: &str) -> Result<String> {
        let mut slot = self.connection.lock().await;
        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => time::timeout(self.timeout, self.connect())
                .await
                .map_err(|_| anyhow!("RCON connect to {} timed out", self.address))??,
        };

        let id = self.allocate_id();
        let result = time::timeout(self.timeout, exchange_on(&mut stream, id, command)).await;
        match result {
            Ok(Ok(body)) => {
                *slot = Some(stream);
                Ok(body)
            }
            Ok(Err(err)) => {
                warn!("RCON exchange failed, dropping connection: {err:#}");
                Err(err)
            }
            Err(_) => bail!("RCON command '{command}' timed out"),
        }
    }
}

/// The command is followed by an empty response-value packet with `id + 1`;
/// the server answers it only after the full command response, which marks
/// the end of a multi-packet reply.
async fn exchange_on(stream: &mut TcpStream, id: i32, command: &str) -> Result<String> {
    let sentinel = id + 1;
    let mut wire = Packet::new(id, SERVERDATA_EXECCOMMAND, command).encode();
    wire.extend(Packet::new(sentinel, SERVERDATA_RESPONSE_VALUE, "").encode());
    stream
        .write_all(&wire)
        .await
        .context("Failed to send RCON command")?;

    let mut body = String::new();
    loop {
        let packet = Packet::read_from(stream).await?;
        if packet.id == sentinel {
            return Ok(body);
        }
        if packet.id == id && packet.kind == SERVERDATA_RESPONSE_VALUE {
            body.push_str(&packet.body);
        }
        // Anything else (chat broadcasts, leftovers from an earlier
        // exchange) is skipped.
    }
}

pub fn count_players(list_players: &str) -> usize {
    list_players
        .lines()
        .take_while(|line| !line.contains("Recently Disconnected"))
        .filter(|line| PLAYER_ROW.is_match(line.trim_start()))
        .count()
}

pub fn parse_layer(show_current_map: &str) -> Option<String> {
    CURRENT_LAYER
        .captures(show_current_map)
        .map(|caps| caps["layer"].to_string())
}

#[async_trait]
impl CommandChannel for RconClient {
    async fn execute(&self, command: &str) -> Result<String> {
        self.exchange(command).await
    }
}

#[async_trait]
impl ServerStatus for RconClient {
    async fn player_count(&self) -> Result<usize> {
        let response = self.exchange("ListPlayers").await?;
        Ok(count_players(&response))
    }

    async fn current_layer(&self) -> Option<String> {
        match self.exchange("ShowCurrentMap").await {
            Ok(response) => parse_layer(&response),
            Err(err) => {
                warn!("Could not read current layer: {err:#}");
                None
            }
        }
    }
}
