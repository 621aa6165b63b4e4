use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::task::TaskTracker;

use crate::{
    artifact::{ArtifactJob, ArtifactPipeline},
    rcon::{CommandChannel, ServerStatus},
    tickrate::DropContext,
    verbose,
};

use super::classifier::{CaptureEvent, CaptureEventKind};
use super::state::{ProfilerStatus, SessionState};

pub const START_COMMAND: &str = "AdminProfileServerCSV start";
pub const STOP_COMMAND: &str = "AdminProfileServerCSV stop";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTrigger {
    PlayerConnected,
    /// Automatic restart after a capture ended or a stop hit nothing.
    Rearm,
    Startup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Duration,
    RoundEnded,
    Drop,
}

/// Results of spawned work, fed back into the supervisor loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    RestartDue {
        generation: u64,
    },
    DropArtifactFinished {
        sample_id: u64,
        capture_path: Option<PathBuf>,
    },
}

/// Owns the capture lifecycle. Every method runs on the supervisor task;
/// only the restart timer and artifact pipelines run elsewhere and report
/// back through [`ControlEvent`].
pub struct ProfilerController {
    state: SessionState,
    commands: Arc<dyn CommandChannel>,
    status: Arc<dyn ServerStatus>,
    pipeline: ArtifactPipeline,
    min_players: usize,
    events: mpsc::UnboundedSender<ControlEvent>,
    restart_timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    drop_pipelines: usize,
    pipelines: TaskTracker,
}

impl ProfilerController {
    pub fn new(
        commands: Arc<dyn CommandChannel>,
        status: Arc<dyn ServerStatus>,
        pipeline: ArtifactPipeline,
        min_players: usize,
        events: mpsc::UnboundedSender<ControlEvent>,
    ) -> Self {
        Self {
            state: SessionState::new(),
            commands,
            status,
            pipeline,
            min_players,
            events,
            restart_timer: None,
            timer_generation: 0,
            drop_pipelines: 0,
            pipelines: TaskTracker::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn restart_armed(&self) -> bool {
        self.restart_timer.is_some()
    }

    /// Returns whether a start command was accepted.
    pub async fn start(&mut self, trigger: StartTrigger) -> bool {
        let now = Instant::now();
        if self.state.shutting_down {
            return false;
        }
        if self.state.running {
            verbose!(1, "Profiler already running, ignoring {trigger:?} start");
            return false;
        }
        if self.state.start_in_flight(now) {
            verbose!(1, "Profiler start already requested, ignoring {trigger:?} start");
            return false;
        }
        // The ending that answers the stop re-arms on its own.
        if self.state.stop_in_flight(now) {
            verbose!(1, "Profiler stop in flight, ignoring {trigger:?} start");
            return false;
        }

        if !self.state.skip_player_gate {
            match self.status.player_count().await {
                Ok(count) if count < self.min_players => {
                    verbose!(
                        1,
                        "Not enough players to start profiler ({count}/{})",
                        self.min_players
                    );
                    return false;
                }
                Ok(count) => verbose!(2, "Player count: {count}"),
                Err(err) => {
                    warn!("Could not read player count, not starting profiler: {err:#}");
                    return false;
                }
            }
        }

        self.state.begin_start(now);
        match self.commands.execute(START_COMMAND).await {
            Ok(response) => {
                verbose!(1, "Profiler start requested ({trigger:?}): {}", response.trim());
                self.state.skip_player_gate = false;
                true
            }
            Err(err) => {
                error!("Failed to start profiler: {err:#}");
                self.state.start_failed();
                false
            }
        }
    }

    /// Returns whether a stop command was accepted.
    pub async fn stop(&mut self, reason: StopReason) -> bool {
        let now = Instant::now();
        if self.state.stop_in_flight(now) {
            verbose!(1, "Profiler stop already requested, ignoring {reason:?} stop");
            return false;
        }

        self.state.begin_stop(now);
        match self.commands.execute(STOP_COMMAND).await {
            Ok(response) => {
                verbose!(1, "Profiler stop requested ({reason:?}): {}", response.trim());
                true
            }
            Err(err) => {
                error!("Failed to stop profiler: {err:#}");
                self.state.stop_failed();
                false
            }
        }
    }

    /// Duration and round-end restarts stop the running capture; with
    /// nothing running they start one directly.
    async fn restart(&mut self, reason: StopReason) {
        if !self.state.running && self.state.status == ProfilerStatus::Idle {
            self.start(StartTrigger::Rearm).await;
        } else {
            self.stop(reason).await;
        }
    }

    pub async fn on_round_ended(&mut self) {
        // The post-match lobby drains players; do not let that block the
        // next capture.
        self.state.skip_player_gate = true;
        self.restart(StopReason::RoundEnded).await;
    }

    pub async fn on_restart_due(&mut self, generation: u64) {
        if generation != self.timer_generation {
            verbose!(2, "Ignoring stale restart timer {generation}");
            return;
        }
        self.restart_timer = None;
        self.restart(StopReason::Duration).await;
    }

    pub async fn on_drop_detected(&mut self, drop: DropContext) {
        if !self.state.running {
            verbose!(1, "Tick rate drop with no capture running");
            return;
        }
        if self.state.pending_drop.is_some() {
            verbose!(1, "Tick rate drop already being handled");
            return;
        }

        info!(
            "Tick rate drop detected: {:.2} (recent {:.2} vs {:.2}), stopping capture",
            drop.tick_rate, drop.short_average, drop.long_average
        );
        self.pipeline.guard().protect();
        self.state.pending_drop = Some(drop);

        if self.state.stop_in_flight(Instant::now()) {
            verbose!(1, "Stop already in flight, tagging it with the drop");
            return;
        }
        if !self.stop(StopReason::Drop).await {
            self.state.pending_drop = None;
            self.release_protection().await;
        }
    }

    pub async fn on_capture_event(&mut self, event: CaptureEvent, restart_after: Duration) {
        match event.kind {
            CaptureEventKind::Started => {
                info!(
                    "CSV profiler started{}",
                    event
                        .capture_id
                        .as_deref()
                        .map(|id| format!(" ({id})"))
                        .unwrap_or_default()
                );
                self.state.mark_running();
                self.arm_restart_timer(restart_after);
            }
            CaptureEventKind::Ending => {
                self.state.mark_ended();
                self.cancel_restart_timer();
                let drop = self.state.pending_drop.take();
                match event.raw_file_path {
                    Some(raw_file_path) => self.spawn_pipeline(ArtifactJob {
                        raw_file_path,
                        drop,
                    }),
                    None => {
                        warn!("Capture ended without a file path");
                        if drop.is_some() {
                            self.release_protection().await;
                        }
                    }
                }
                self.start(StartTrigger::Rearm).await;
            }
            CaptureEventKind::AlreadyStopped => {
                verbose!(1, "Stop requested but no capture was running");
                self.state.mark_ended();
                self.cancel_restart_timer();
                if self.state.pending_drop.take().is_some() {
                    self.release_protection().await;
                }
                self.start(StartTrigger::Rearm).await;
            }
            CaptureEventKind::AlreadyRunning => {
                verbose!(1, "Start requested but a capture was already running");
                self.state.resync_running();
                if self.restart_timer.is_none() {
                    self.arm_restart_timer(restart_after);
                }
            }
        }
    }

    pub async fn on_drop_artifact_finished(&mut self, capture_path: Option<&Path>) {
        self.drop_pipelines = self.drop_pipelines.saturating_sub(1);
        if let Some(path) = capture_path {
            verbose!(1, "Drop capture handled: {}", path.display());
        }
        self.release_protection().await;
    }

    /// Protection stays while any drop is still waiting for its capture or
    /// its pipeline.
    async fn release_protection(&mut self) {
        if self.state.pending_drop.is_some() || self.drop_pipelines > 0 {
            return;
        }
        let removed = self.pipeline.guard().release().await;
        if removed > 0 {
            verbose!(1, "Removed {removed} capture(s) held during drop handling");
        }
    }

    fn spawn_pipeline(&mut self, job: ArtifactJob) {
        let drop_sample = job.drop.as_ref().map(|drop| drop.sample_id);
        if drop_sample.is_some() {
            self.drop_pipelines += 1;
        }

        let pipeline = self.pipeline.clone();
        let events = self.events.clone();
        self.pipelines.spawn(async move {
            let outcome = pipeline.handle_ended(job).await;
            if let Some(sample_id) = drop_sample {
                let _ = events.send(ControlEvent::DropArtifactFinished {
                    sample_id,
                    capture_path: outcome.capture_path().map(Path::to_path_buf),
                });
            }
        });
    }

    fn arm_restart_timer(&mut self, after: Duration) {
        self.cancel_restart_timer();
        self.timer_generation += 1;
        let generation = self.timer_generation;
        let events = self.events.clone();
        let deadline = Instant::now() + after;

        verbose!(1, "Restarting capture in {}s", after.as_secs());
        self.restart_timer = Some(tokio::spawn(async move {
            time::sleep_until(deadline).await;
            let _ = events.send(ControlEvent::RestartDue { generation });
        }));
    }

    fn cancel_restart_timer(&mut self) {
        if let Some(handle) = self.restart_timer.take() {
            handle.abort();
        }
    }

    /// Stops re-arming, waits for in-flight pipelines, then clears any
    /// protection they left behind.
    pub async fn shutdown(&mut self) {
        self.state.shutting_down = true;
        self.cancel_restart_timer();
        self.pipelines.close();
        if !self.pipelines.is_empty() {
            info!("Waiting for {} artifact pipeline(s)", self.pipelines.len());
        }
        self.pipelines.wait().await;

        self.drop_pipelines = 0;
        self.state.pending_drop = None;
        self.release_protection().await;
    }
}
