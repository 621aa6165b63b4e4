pub mod config;
pub mod history;
pub mod monitor;

pub use config::TickRateConfig;
pub use history::{TickHistory, TickSample};
pub use monitor::{CaptureDuration, DropContext, Observation, TickRateMonitor};
