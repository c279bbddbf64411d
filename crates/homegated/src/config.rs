use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use homegate_client::api::{ApiConfig, DEFAULT_API_URL};
use homegate_core::frame::DEFAULT_JPEG_QUALITY;
use homegate_core::ScanTimings;

/// Kiosk configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the face and device services.
    pub api_url: String,
    /// Bearer token for the services.
    pub auth_token: Option<String>,
    /// Directory of still frames replayed as the camera feed.
    pub frames_dir: PathBuf,
    /// Room whose doors this kiosk opens.
    pub room: String,
    pub tick_ms: u64,
    pub no_match_retry_ms: u64,
    /// How long a finished session stays on screen.
    pub close_grace_ms: u64,
    pub door_delay_ms: u64,
    pub jpeg_quality: u8,
    pub http_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `HOMEGATE_*` environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let Some(room) = var("HOMEGATE_ROOM").filter(|r| !r.trim().is_empty()) else {
            bail!("HOMEGATE_ROOM must name the room this kiosk guards");
        };

        Ok(Self {
            api_url: var("HOMEGATE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            auth_token: var("HOMEGATE_AUTH_TOKEN").filter(|t| !t.is_empty()),
            frames_dir: var("HOMEGATE_FRAMES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/var/lib/homegate/frames")),
            room,
            tick_ms: parsed(&var, "HOMEGATE_TICK_MS", 1000),
            no_match_retry_ms: parsed(&var, "HOMEGATE_NO_MATCH_RETRY_MS", 3000),
            close_grace_ms: parsed(&var, "HOMEGATE_CLOSE_GRACE_MS", 3000),
            door_delay_ms: parsed(&var, "HOMEGATE_DOOR_DELAY_MS", 500),
            jpeg_quality: parsed(&var, "HOMEGATE_JPEG_QUALITY", DEFAULT_JPEG_QUALITY).clamp(1, 100),
            http_timeout_secs: parsed(&var, "HOMEGATE_HTTP_TIMEOUT_SECS", 10),
        })
    }

    pub fn timings(&self) -> ScanTimings {
        ScanTimings {
            tick: Duration::from_millis(self.tick_ms),
            no_match_retry: Duration::from_millis(self.no_match_retry_ms),
            close_grace: Duration::from_millis(self.close_grace_ms),
            door_control_delay: Duration::from_millis(self.door_delay_ms),
        }
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn api(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api_url.clone(),
            auth_token: self.auth_token.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_room_is_required() {
        assert!(load(&[]).is_err());
        assert!(load(&[("HOMEGATE_ROOM", "  ")]).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("HOMEGATE_ROOM", "hall")]).unwrap();
        assert_eq!(config.api_url, "http://localhost:4000/api");
        assert_eq!(config.auth_token, None);
        assert_eq!(config.frames_dir, PathBuf::from("/var/lib/homegate/frames"));
        assert_eq!(config.timings(), ScanTimings::default());
        assert_eq!(config.jpeg_quality, 80);
        assert_eq!(config.api().timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = load(&[
            ("HOMEGATE_ROOM", "garage"),
            ("HOMEGATE_AUTH_TOKEN", "secret"),
            ("HOMEGATE_TICK_MS", "250"),
            ("HOMEGATE_CLOSE_GRACE_MS", "soon"),
            ("HOMEGATE_JPEG_QUALITY", "0"),
        ])
        .unwrap();
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.timings().tick, Duration::from_millis(250));
        assert_eq!(config.close_grace(), Duration::from_secs(3));
        assert_eq!(config.jpeg_quality, 1);
    }
}
