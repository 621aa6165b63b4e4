use anyhow::{Context, Result};
use log::{info, warn};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::verbose;

const POLL_INTERVAL_MS: u64 = 250;

/// Read position in a growing log file. Only complete lines are returned;
/// a trailing fragment waits for its newline.
#[derive(Debug)]
pub struct LogCursor {
    path: PathBuf,
    /// `None` until the first poll pins the starting position.
    offset: Option<u64>,
    partial: Vec<u8>,
}

impl LogCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: None,
            partial: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn poll(&mut self) -> Result<Vec<String>> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // Read a file that appears later from its beginning.
                self.offset.get_or_insert(0);
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to stat {}", self.path.display()))
            }
        };

        let offset = match self.offset {
            Some(offset) => offset,
            None => {
                verbose!(1, "Tailing {} from byte {len}", self.path.display());
                self.offset = Some(len);
                return Ok(Vec::new());
            }
        };

        let offset = if len < offset {
            info!("{} shrank, reading from the start", self.path.display());
            self.partial.clear();
            0
        } else {
            offset
        };
        if len == offset {
            self.offset = Some(offset);
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut chunk = Vec::with_capacity((len - offset) as usize);
        let read = file.read_to_end(&mut chunk).await?;
        self.offset = Some(offset + read as u64);

        self.partial.extend_from_slice(&chunk);
        Ok(self.drain_lines())
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let Some(last_newline) = self.partial.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);

        complete
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }
}

/// Forwards new lines of `path` until cancelled or the receiver goes away.
pub async fn tail_lines(path: PathBuf, lines: mpsc::Sender<String>, cancel_token: CancellationToken) {
    let mut cursor = LogCursor::new(path);
    let mut ticker = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let batch = match cursor.poll().await {
                    Ok(batch) => batch,
                    Err(err) => {
                        warn!("log poll failed for {}: {err:#}", cursor.path().display());
                        continue;
                    }
                };
                for line in batch {
                    if lines.send(line).await.is_err() {
                        info!("log consumer closed, stopping tailer");
                        return;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("log tailer shutting down");
                break;
            }
        }
    }
}
