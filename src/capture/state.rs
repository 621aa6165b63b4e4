use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::tickrate::DropContext;

/// A start or stop whose log confirmation never arrived stops blocking new
/// commands after this long.
pub const IN_FLIGHT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProfilerStatus {
    Idle,
    /// Start command accepted, waiting for the `Started` log line.
    Starting,
    Running,
    /// Stop command accepted, waiting for the `Ending` log line.
    Stopping,
}

impl Default for ProfilerStatus {
    fn default() -> Self {
        ProfilerStatus::Idle
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: ProfilerStatus,
    /// Belief about whether the server is capturing. Resynchronised from
    /// log events, so it can disagree with `status` for a moment.
    pub running: bool,
    /// One-shot bypass of the minimum player count.
    pub skip_player_gate: bool,
    pub shutting_down: bool,
    /// Drop waiting for the capture it stopped to end.
    pub pending_drop: Option<DropContext>,
    in_flight_since: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn in_flight(&self, status: ProfilerStatus, now: Instant) -> bool {
        self.status == status
            && matches!(self.in_flight_since, Some(since) if now.duration_since(since) < IN_FLIGHT_TIMEOUT)
    }

    pub fn start_in_flight(&self, now: Instant) -> bool {
        self.in_flight(ProfilerStatus::Starting, now)
    }

    pub fn stop_in_flight(&self, now: Instant) -> bool {
        self.in_flight(ProfilerStatus::Stopping, now)
    }

    pub fn begin_start(&mut self, now: Instant) {
        self.status = ProfilerStatus::Starting;
        self.in_flight_since = Some(now);
    }

    pub fn start_failed(&mut self) {
        self.status = if self.running {
            ProfilerStatus::Running
        } else {
            ProfilerStatus::Idle
        };
        self.in_flight_since = None;
    }

    pub fn begin_stop(&mut self, now: Instant) {
        self.status = ProfilerStatus::Stopping;
        self.in_flight_since = Some(now);
    }

    pub fn stop_failed(&mut self) {
        self.start_failed();
    }

    pub fn mark_running(&mut self) {
        self.running = true;
        self.status = ProfilerStatus::Running;
        self.in_flight_since = None;
    }

    /// `AlreadyRunning`: the server is capturing no matter what we thought.
    /// A stop in flight stays in flight.
    pub fn resync_running(&mut self) {
        self.running = true;
        if self.status != ProfilerStatus::Stopping {
            self.status = ProfilerStatus::Running;
            self.in_flight_since = None;
        }
    }

    pub fn mark_ended(&mut self) {
        self.running = false;
        self.status = ProfilerStatus::Idle;
        self.in_flight_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_start_goes_stale() {
        let now = Instant::now();
        let mut state = SessionState::new();
        state.begin_start(now);

        assert!(state.start_in_flight(now + Duration::from_secs(59)));
        assert!(!state.start_in_flight(now + IN_FLIGHT_TIMEOUT));
        assert!(!state.stop_in_flight(now));
    }

    #[test]
    fn failed_stop_returns_to_running() {
        let now = Instant::now();
        let mut state = SessionState::new();
        state.mark_running();
        state.begin_stop(now);
        state.stop_failed();

        assert_eq!(state.status, ProfilerStatus::Running);
        assert!(state.running);
        assert!(!state.stop_in_flight(now));
    }

    #[test]
    fn resync_keeps_pending_stop() {
        let now = Instant::now();
        let mut state = SessionState::new();
        state.begin_stop(now);
        state.resync_running();

        assert!(state.running);
        assert!(state.stop_in_flight(now));

        state.mark_ended();
        state.begin_start(now);
        state.resync_running();
        assert_eq!(state.status, ProfilerStatus::Running);
    }
}
