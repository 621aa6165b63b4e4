//! Capture lifecycle: recognising profiler log lines and driving the
//! start/stop state machine from them.

pub mod classifier;
pub mod controller;
pub mod state;

pub use classifier::{classify, CaptureEvent, CaptureEventKind};
pub use controller::{ControlEvent, ProfilerController, StartTrigger, StopReason};
pub use state::{ProfilerStatus, SessionState};
