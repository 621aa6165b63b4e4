use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static CAPTURE_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"LogCsvProfiler: Display: Capture (?P<state>\w+)(?:[.,] CSV ID: (?P<csv_id>\w+))?(?:[.,] Writing CSV to file ?: (?P<csv_file_path>.+))?",
    )
    .expect("capture state regex")
});

static ALREADY_STOPPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)LogCsvProfiler: Warning: Capture stop requested, but no capture was running")
        .expect("already stopped regex")
});

static ALREADY_RUNNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)LogCsvProfiler: Warning: Capture start requested, but a capture was already running",
    )
    .expect("already running regex")
});

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureEventKind {
    Started,
    Ending,
    AlreadyStopped,
    AlreadyRunning,
}

/// Capture lifecycle announcement parsed from one log line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    pub kind: CaptureEventKind,
    pub capture_id: Option<String>,
    /// Only present on `Ending`.
    pub raw_file_path: Option<String>,
}

impl CaptureEvent {
    fn bare(kind: CaptureEventKind) -> Self {
        Self {
            kind,
            capture_id: None,
            raw_file_path: None,
        }
    }
}

/// Maps a raw server log line to at most one capture event.
pub fn classify(line: &str) -> Option<CaptureEvent> {
    if let Some(caps) = CAPTURE_STATE.captures(line) {
        let kind = match caps["state"].to_ascii_lowercase().as_str() {
            "started" | "starting" => Some(CaptureEventKind::Started),
            "ending" | "ended" => Some(CaptureEventKind::Ending),
            _ => None,
        };
        if let Some(kind) = kind {
            let capture_id = caps.name("csv_id").map(|m| m.as_str().to_string());
            let raw_file_path = match kind {
                CaptureEventKind::Ending => caps
                    .name("csv_file_path")
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|p| !p.is_empty()),
                _ => None,
            };
            return Some(CaptureEvent {
                kind,
                capture_id,
                raw_file_path,
            });
        }
    }

    if ALREADY_STOPPED.is_match(line) {
        return Some(CaptureEvent::bare(CaptureEventKind::AlreadyStopped));
    }

    if ALREADY_RUNNING.is_match(line) {
        return Some(CaptureEvent::bare(CaptureEventKind::AlreadyRunning));
    }

    None
}
