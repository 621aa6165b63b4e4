use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    artifact::{ArtifactPipeline, DeletionGuard},
    capture::{classify, ControlEvent, ProfilerController, StartTrigger},
    delivery::DeliverySink,
    logs::{parse_signal, ServerSignal},
    rcon::{CommandChannel, ServerStatus},
    settings::Settings,
    tickrate::{CaptureDuration, TickRateMonitor},
    verbose,
};

pub const END_MATCH_COMMAND: &str = "AdminEndMatch";

/// Single owner of the session state and tick-rate history. Log lines and
/// control events are handled one at a time, in arrival order.
pub struct Supervisor {
    controller: ProfilerController,
    monitor: TickRateMonitor,
    commands: Arc<dyn CommandChannel>,
    end_match_tick_rate: Option<f64>,
    end_match_sent: bool,
    control_rx: mpsc::UnboundedReceiver<ControlEvent>,
}

impl Supervisor {
    pub fn new(
        settings: &Settings,
        base_dir: PathBuf,
        commands: Arc<dyn CommandChannel>,
        status: Arc<dyn ServerStatus>,
        sink: Arc<dyn DeliverySink>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let pipeline = ArtifactPipeline::new(
            base_dir,
            settings.compress_artifacts,
            settings.retain_only_on_drop,
            sink,
            status.clone(),
            DeletionGuard::new(),
        );
        let controller = ProfilerController::new(
            commands.clone(),
            status,
            pipeline,
            settings.min_players,
            control_tx,
        );
        let monitor = TickRateMonitor::new(
            settings.tick_rate.clone(),
            CaptureDuration::new(
                settings.capture_duration(),
                settings.drop_capture_duration(),
                settings.drop_duration_window(),
            ),
            settings.simulate_drops,
        );

        Self {
            controller,
            monitor,
            commands,
            end_match_tick_rate: settings.end_match_tick_rate,
            end_match_sent: false,
            control_rx,
        }
    }

    pub async fn run(mut self, mut lines: mpsc::Receiver<String>, cancel_token: CancellationToken) {
        self.controller.start(StartTrigger::Startup).await;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("supervisor shutting down");
                    break;
                }
                line = lines.recv() => match line {
                    Some(line) => self.on_line(&line).await,
                    None => {
                        warn!("log source closed");
                        break;
                    }
                },
                Some(event) = self.control_rx.recv() => self.on_control(event).await,
            }
        }

        self.controller.shutdown().await;
    }

    pub async fn on_line(&mut self, line: &str) {
        if let Some(event) = classify(line) {
            let restart_after = self.monitor.capture_duration(Instant::now());
            self.controller.on_capture_event(event, restart_after).await;
            return;
        }

        match parse_signal(line) {
            Some(ServerSignal::TickRate(tick_rate)) => self.on_tick_rate(tick_rate).await,
            Some(ServerSignal::RoundEnded) => {
                verbose!(1, "Round ended");
                self.end_match_sent = false;
                self.controller.on_round_ended().await;
            }
            Some(ServerSignal::PlayerConnected(player)) => {
                verbose!(2, "Player connected: {player}");
                self.controller.start(StartTrigger::PlayerConnected).await;
            }
            None => {}
        }
    }

    async fn on_tick_rate(&mut self, tick_rate: f64) {
        let observation = self.monitor.observe(tick_rate);
        if let Some(drop) = observation.drop {
            self.controller.on_drop_detected(drop).await;
        }

        let Some(threshold) = self.end_match_tick_rate else {
            return;
        };
        if self.end_match_sent || !self.monitor.below_end_match(threshold) {
            return;
        }
        self.end_match_sent = true;
        warn!(
            "Tick rate {:.2} below {threshold}, ending the match",
            observation.short_average
        );
        if let Err(err) = self.commands.execute(END_MATCH_COMMAND).await {
            error!("Failed to end match: {err:#}");
        }
    }

    pub async fn on_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::RestartDue { generation } => {
                self.controller.on_restart_due(generation).await
            }
            ControlEvent::DropArtifactFinished {
                sample_id,
                capture_path,
            } => {
                if let Some(path) = &capture_path {
                    if !self.monitor.attach_capture_path(sample_id, path) {
                        verbose!(2, "Sample {sample_id} already left the history");
                    }
                }
                self.controller
                    .on_drop_artifact_finished(capture_path.as_deref())
                    .await;
            }
        }
    }
}
