use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppCore;
use crate::typing::{DEFAULT_DECAY, DEFAULT_THROTTLE};

const CONFIG_FILE: &str = "chatsync_config.json";
const DEFAULT_LOAD_OLDER_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) typing_throttle_ms: Option<u64>,
    pub(crate) typing_decay_ms: Option<u64>,
    // Distance from the top (host units) below which older history is fetched.
    pub(crate) load_older_threshold: Option<f64>,
    pub(crate) mark_read_on_open: Option<bool>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "invalid config, using defaults");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let defaults = AppConfig {
        typing_throttle_ms: Some(DEFAULT_THROTTLE.as_millis() as u64),
        typing_decay_ms: Some(DEFAULT_DECAY.as_millis() as u64),
        load_older_threshold: Some(DEFAULT_LOAD_OLDER_THRESHOLD),
        mark_read_on_open: Some(true),
    };
    serde_json::to_string_pretty(&defaults).unwrap_or_else(|_| "{}".to_string())
}

impl AppCore {
    pub(super) fn typing_throttle(&self) -> Duration {
        self.config
            .typing_throttle_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_THROTTLE)
    }

    pub(super) fn typing_decay(&self) -> Duration {
        self.config
            .typing_decay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DECAY)
    }

    pub(super) fn load_older_threshold(&self) -> f64 {
        self.config
            .load_older_threshold
            .filter(|t| t.is_finite() && *t >= 0.0)
            .unwrap_or(DEFAULT_LOAD_OLDER_THRESHOLD)
    }

    pub(super) fn mark_read_on_open(&self) -> bool {
        self.config.mark_read_on_open.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert!(config.typing_decay_ms.is_none());
        assert!(config.mark_read_on_open.is_none());
    }

    #[test]
    fn partial_file_is_merged_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "typing_decay_ms": 250 }"#,
        )
        .unwrap();
        let config = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(config.typing_decay_ms, Some(250));
        assert!(config.typing_throttle_ms.is_none());
    }

    #[test]
    fn default_json_round_trips() {
        let parsed: AppConfig = serde_json::from_str(&default_app_config_json()).unwrap();
        assert_eq!(parsed.typing_throttle_ms, Some(1500));
        assert_eq!(parsed.typing_decay_ms, Some(3000));
        assert_eq!(parsed.mark_read_on_open, Some(true));
    }
}
