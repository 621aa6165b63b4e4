//! Server log input: tailing the live file and recognising lifecycle lines.

pub mod signals;
pub mod tailer;

pub use signals::{parse_signal, ServerSignal};
pub use tailer::{tail_lines, LogCursor};
