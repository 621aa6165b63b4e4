use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use crate::tickrate::TickRateConfig;

static SQUAD_GAME_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)/SquadGame(?:/.*)?$").expect("squad game root regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RconSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl Default for RconSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 21114,
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the server log (`.../SquadGame/Saved/Logs`).
    pub log_dir: PathBuf,
    pub log_file: String,
    pub rcon: RconSettings,

    pub channel_id: Option<String>,
    pub bot_token: Option<String>,
    /// Takes precedence over the channel when both are configured.
    pub webhook_url: Option<String>,

    pub compress_artifacts: bool,
    pub min_players: usize,
    pub capture_duration_minutes: u64,
    pub retain_only_on_drop: bool,
    /// Overrides the directory the capture base is derived from.
    pub game_dir: Option<PathBuf>,
    pub simulate_drops: bool,

    pub drop_capture_duration_minutes: u64,
    pub drop_duration_window_minutes: u64,
    pub end_match_tick_rate: Option<f64>,

    pub tick_rate: TickRateConfig,
    pub verbosity: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::new(),
            log_file: "SquadGame.log".into(),
            rcon: RconSettings::default(),
            channel_id: None,
            bot_token: None,
            webhook_url: None,
            compress_artifacts: true,
            min_players: 5,
            capture_duration_minutes: 10,
            retain_only_on_drop: false,
            game_dir: None,
            simulate_drops: false,
            drop_capture_duration_minutes: 5,
            drop_duration_window_minutes: 15,
            end_match_tick_rate: None,
            tick_rate: TickRateConfig::default(),
            verbosity: 1,
        }
    }
}

/// Where finished captures are delivered. Exactly one is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryTarget {
    Webhook { url: String },
    Channel { channel_id: String, bot_token: String },
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let mut settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        settings.apply_env();
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Rejects tunables that would make every sample a drop or restart
    /// captures back to back.
    pub fn validate(&self) -> Result<()> {
        let tick_rate = &self.tick_rate;
        if tick_rate.history_capacity == 0
            || tick_rate.default_window == 0
            || tick_rate.long_window == 0
            || tick_rate.short_window == 0
        {
            bail!("tick_rate history_capacity and windows must be at least 1");
        }
        if !(tick_rate.drop_ratio > 0.0) {
            bail!("tick_rate.drop_ratio must be positive, got {}", tick_rate.drop_ratio);
        }
        if self.capture_duration_minutes == 0 || self.drop_capture_duration_minutes == 0 {
            bail!("capture durations must be at least one minute");
        }
        Ok(())
    }

    /// Config path from the first CLI argument, `SQUAD_PROFILER_CONFIG`, or the
    /// working directory.
    pub fn locate() -> PathBuf {
        std::env::args_os()
            .nth(1)
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("SQUAD_PROFILER_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("squad-profiler.json"))
    }

    fn apply_env(&mut self) {
        let debug_mode = std::env::var("SQUAD_PROFILER_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.verbosity = self.verbosity.max(2);
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }

    pub fn capture_duration(&self) -> Duration {
        Duration::from_secs(self.capture_duration_minutes * 60)
    }

    pub fn drop_capture_duration(&self) -> Duration {
        Duration::from_secs(self.drop_capture_duration_minutes * 60)
    }

    pub fn drop_duration_window(&self) -> Duration {
        Duration::from_secs(self.drop_duration_window_minutes * 60)
    }

    pub fn delivery_target(&self) -> Result<DeliveryTarget> {
        if let Some(url) = non_empty(&self.webhook_url) {
            return Ok(DeliveryTarget::Webhook { url: url.to_string() });
        }

        match (non_empty(&self.channel_id), non_empty(&self.bot_token)) {
            (Some(channel_id), Some(bot_token)) => Ok(DeliveryTarget::Channel {
                channel_id: channel_id.to_string(),
                bot_token: bot_token.to_string(),
            }),
            (Some(_), None) => bail!("channel_id is set but bot_token is missing"),
            _ => bail!("either webhook_url or channel_id + bot_token must be configured"),
        }
    }

    /// Directory that contains `SquadGame/`, against which capture paths from
    /// the log are resolved.
    pub fn capture_base_dir(&self) -> Result<PathBuf> {
        let source = self.game_dir.as_deref().unwrap_or(&self.log_dir);
        squad_game_root(source).ok_or_else(|| {
            anyhow!(
                "cannot derive the SquadGame base directory from {}",
                source.display()
            )
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn squad_game_root(path: &Path) -> Option<PathBuf> {
    let normalized = path.to_string_lossy().replace('\\', "/");
    SQUAD_GAME_ROOT
        .captures(&normalized)
        .map(|caps| PathBuf::from(&caps[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings: Settings =
            serde_json::from_str(r#"{ "log_dir": "/srv/squad/SquadGame/Saved/Logs" }"#).unwrap();
        assert!(settings.compress_artifacts);
        assert_eq!(settings.min_players, 5);
        assert_eq!(settings.capture_duration(), Duration::from_secs(600));
        assert!(!settings.retain_only_on_drop);
        assert!(!settings.simulate_drops);
        assert_eq!(settings.tick_rate.long_window, 20);
        assert_eq!(settings.rcon.port, 21114);
    }

    #[test]
    fn webhook_takes_precedence_over_channel() {
        let settings = Settings {
            channel_id: Some("667741905228136459".into()),
            bot_token: Some("token".into()),
            webhook_url: Some("https://discord.com/api/webhooks/1/abc".into()),
            ..Settings::default()
        };
        assert_eq!(
            settings.delivery_target().unwrap(),
            DeliveryTarget::Webhook {
                url: "https://discord.com/api/webhooks/1/abc".into()
            }
        );
    }

    #[test]
    fn channel_requires_token() {
        let settings = Settings {
            channel_id: Some("667741905228136459".into()),
            ..Settings::default()
        };
        assert!(settings.delivery_target().is_err());

        let settings = Settings::default();
        assert!(settings.delivery_target().is_err());
    }

    #[test]
    fn base_dir_from_log_dir() {
        let settings = Settings {
            log_dir: PathBuf::from("/srv/squad/SquadGame/Saved/Logs"),
            ..Settings::default()
        };
        assert_eq!(settings.capture_base_dir().unwrap(), PathBuf::from("/srv/squad"));
    }

    #[test]
    fn base_dir_override_with_windows_separators() {
        let settings = Settings {
            log_dir: PathBuf::from("/unrelated"),
            game_dir: Some(PathBuf::from(r"C:\servers\squad\SquadGame\Saved\Profiling")),
            ..Settings::default()
        };
        assert_eq!(
            settings.capture_base_dir().unwrap(),
            PathBuf::from("C:/servers/squad")
        );
    }

    #[test]
    fn base_dir_without_squad_game_fails() {
        let settings = Settings {
            log_dir: PathBuf::from("/var/log"),
            ..Settings::default()
        };
        assert!(settings.capture_base_dir().is_err());
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "log_dir": "/srv/squad/SquadGame/Saved/Logs", "min_players": 2, "tick_rate": { "drop_ratio": 0.9 } }"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.min_players, 2);
        assert_eq!(settings.tick_rate.drop_ratio, 0.9);
        assert_eq!(settings.tick_rate.short_window, 3);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_windows_and_durations_are_rejected() {
        let zero_short = Settings {
            tick_rate: TickRateConfig {
                short_window: 0,
                ..TickRateConfig::default()
            },
            ..Settings::default()
        };
        assert!(zero_short.validate().is_err());

        let bad_ratio = Settings {
            tick_rate: TickRateConfig {
                drop_ratio: 0.0,
                ..TickRateConfig::default()
            },
            ..Settings::default()
        };
        assert!(bad_ratio.validate().is_err());

        let zero_duration = Settings {
            capture_duration_minutes: 0,
            ..Settings::default()
        };
        assert!(zero_duration.validate().is_err());
    }

    #[test]
    fn load_rejects_zero_short_window() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "log_dir": "/srv/squad/SquadGame/Saved/Logs", "tick_rate": { "short_window": 0 } }"#,
        )
        .unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("windows"));
    }
}
