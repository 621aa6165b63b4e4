use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

use crate::verbose;

use super::{TickHistory, TickRateConfig, TickSample};

/// Fraction of the long average a simulated sample is clamped to.
const SIMULATED_DROP_RATIO: f64 = 0.8;
/// Samples averaged for the emergency end-match check.
const END_MATCH_WINDOW: usize = 3;

/// Details of one raised drop, carried through to the capture it ends.
#[derive(Debug, Clone, PartialEq)]
pub struct DropContext {
    /// `session_id` of the sample that raised the drop.
    pub sample_id: u64,
    pub tick_rate: f64,
    pub long_average: f64,
    pub short_average: f64,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Observation {
    pub sample: TickSample,
    pub long_average: f64,
    pub short_average: f64,
    pub is_drop: bool,
    /// Set only when this observation raised a new drop (outside cooldown).
    pub drop: Option<DropContext>,
}

/// Restart interval with a transient, self-expiring override.
#[derive(Debug, Clone)]
pub struct CaptureDuration {
    baseline: Duration,
    during_drop: Duration,
    window: Duration,
    override_until: Option<Instant>,
}

impl CaptureDuration {
    pub fn new(baseline: Duration, during_drop: Duration, window: Duration) -> Self {
        Self {
            baseline,
            during_drop,
            window,
            override_until: None,
        }
    }

    fn shorten_from(&mut self, now: Instant) {
        self.override_until = Some(now + self.window);
    }

    pub fn at(&self, now: Instant) -> Duration {
        match self.override_until {
            Some(until) if now < until => self.during_drop,
            _ => self.baseline,
        }
    }
}

pub struct TickRateMonitor {
    config: TickRateConfig,
    history: TickHistory,
    simulate_drops: bool,
    cooldown_until: Option<Instant>,
    duration: CaptureDuration,
}

impl TickRateMonitor {
    pub fn new(config: TickRateConfig, duration: CaptureDuration, simulate_drops: bool) -> Self {
        Self {
            history: TickHistory::new(config.history_capacity),
            config,
            simulate_drops,
            cooldown_until: None,
            duration,
        }
    }

    pub fn observe(&mut self, tick_rate: f64) -> Observation {
        self.observe_at(tick_rate, Instant::now(), Utc::now())
    }

    pub fn observe_at(
        &mut self,
        tick_rate: f64,
        now: Instant,
        timestamp: DateTime<Utc>,
    ) -> Observation {
        let handled = self.simulated(tick_rate);
        let sample = self
            .history
            .push(handled, timestamp, self.config.default_window);

        let long_average = self.average(self.config.long_window);
        let short_average = self.average(self.config.short_window);
        let is_drop = self.is_drop();

        verbose!(
            2,
            "TPS update: handled {:.2} real {:.2} avg{} {:.2} avg{} {:.2} drop {} history {}",
            handled,
            tick_rate,
            self.config.long_window,
            long_average,
            self.config.short_window,
            short_average,
            if is_drop { "YES" } else { "NO" },
            self.history.len()
        );

        let drop = if is_drop && !self.during_drop(now) {
            self.cooldown_until = Some(now + Duration::from_secs(self.config.drop_cooldown_secs));
            self.duration.shorten_from(now);
            Some(DropContext {
                sample_id: sample.session_id,
                tick_rate: handled,
                long_average,
                short_average,
                detected_at: timestamp,
            })
        } else {
            None
        };

        Observation {
            sample,
            long_average,
            short_average,
            is_drop,
            drop,
        }
    }

    pub fn average(&self, window: usize) -> f64 {
        self.history.average(window)
    }

    pub fn default_average(&self) -> f64 {
        self.history.average(self.config.default_window)
    }

    /// Pure check against the current history; no timers are touched.
    pub fn is_drop(&self) -> bool {
        self.average(self.config.long_window) * self.config.drop_ratio
            > self.average(self.config.short_window)
    }

    pub fn during_drop(&self, now: Instant) -> bool {
        matches!(self.cooldown_until, Some(until) if now < until)
    }

    pub fn capture_duration(&self, now: Instant) -> Duration {
        self.duration.at(now)
    }

    pub fn below_end_match(&self, threshold: f64) -> bool {
        self.history.len() >= END_MATCH_WINDOW && self.average(END_MATCH_WINDOW) < threshold
    }

    pub fn attach_capture_path(&mut self, sample_id: u64, path: &Path) -> bool {
        self.history.attach_capture_path(sample_id, path)
    }

    pub fn history(&self) -> &TickHistory {
        &self.history
    }

    fn simulated(&self, tick_rate: f64) -> f64 {
        if !self.simulate_drops || self.history.len() <= self.config.long_window {
            return tick_rate;
        }
        let previous = self.history.latest().map(|s| s.value).unwrap_or(0.0);
        let ceiling = self.average(self.config.long_window) * SIMULATED_DROP_RATIO;
        if previous > ceiling {
            ceiling
        } else {
            tick_rate
        }
    }
}
