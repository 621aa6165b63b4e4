pub mod artifact;
pub mod capture;
pub mod delivery;
pub mod logs;
pub mod rcon;
pub mod settings;
pub mod supervisor;
pub mod tickrate;
pub mod utils;

#[cfg(test)]
mod test_support;

use anyhow::Context;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use delivery::{DeliverySink, DiscordSink};
use rcon::RconClient;
use settings::Settings;
use supervisor::Supervisor;

/// Lines buffered between the tailer and the supervisor.
const LINE_BUFFER: usize = 1024;

pub async fn run() -> anyhow::Result<()> {
    utils::logging::init(1);

    let config_path = Settings::locate();
    let settings = Settings::load(&config_path)?;
    utils::logging::set_verbosity(settings.verbosity);

    let base_dir = settings.capture_base_dir()?;
    let sink = DiscordSink::new(settings.delivery_target()?)?;
    let rcon = Arc::new(RconClient::new(&settings.rcon));

    info!(
        "Squad profiler starting: log {}, captures under {}, delivery via {}",
        settings.log_path().display(),
        base_dir.display(),
        sink.name()
    );

    let cancel_token = CancellationToken::new();
    let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
    let tailer = tokio::spawn(logs::tail_lines(
        settings.log_path(),
        line_tx,
        cancel_token.clone(),
    ));

    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, shutting down");
                    cancel_token.cancel();
                }
                Err(err) => error!("Failed to listen for Ctrl-C: {err}"),
            }
        });
    }

    let supervisor = Supervisor::new(
        &settings,
        base_dir,
        rcon.clone(),
        rcon,
        Arc::new(sink),
    );
    supervisor.run(line_rx, cancel_token.clone()).await;

    cancel_token.cancel();
    tailer.await.context("log tailer panicked")?;
    info!("Squad profiler stopped");
    Ok(())
}
