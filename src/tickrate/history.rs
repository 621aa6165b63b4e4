use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// One tick-rate observation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TickSample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Assigned at insertion, never reused.
    pub session_id: u64,
    /// Average over the default window, including this sample.
    pub running_average: f64,
    /// Capture linked to the drop this sample raised, filled in later.
    pub capture_path: Option<PathBuf>,
}

/// Fixed-capacity sliding window of samples; the oldest is evicted first.
#[derive(Debug)]
pub struct TickHistory {
    samples: VecDeque<TickSample>,
    capacity: usize,
    next_id: u64,
}

impl TickHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    pub fn push(&mut self, value: f64, timestamp: DateTime<Utc>, average_window: usize) -> TickSample {
        let session_id = self.next_id;
        self.next_id += 1;

        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }

        let count = average_window.min(self.samples.len() + 1);
        let running_average = if count == 0 {
            0.0
        } else {
            let prior: f64 = self.samples.iter().rev().take(count - 1).map(|s| s.value).sum();
            (prior + value) / count as f64
        };

        let sample = TickSample {
            value,
            timestamp,
            session_id,
            running_average,
            capture_path: None,
        };
        self.samples.push_back(sample.clone());
        sample
    }

    /// Mean of the last `min(window, len)` samples, `0.0` when empty.
    pub fn average(&self, window: usize) -> f64 {
        let count = window.min(self.samples.len());
        if count == 0 {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().rev().take(count).map(|s| s.value).sum();
        sum / count as f64
    }

    pub fn latest(&self) -> Option<&TickSample> {
        self.samples.back()
    }

    pub fn get(&self, session_id: u64) -> Option<&TickSample> {
        self.samples.iter().find(|s| s.session_id == session_id)
    }

    /// Returns false when the sample has already been evicted.
    pub fn attach_capture_path(&mut self, session_id: u64, path: &Path) -> bool {
        match self.samples.iter_mut().find(|s| s.session_id == session_id) {
            Some(sample) => {
                sample.capture_path = Some(path.to_path_buf());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
