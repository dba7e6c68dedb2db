use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::credential::{self, ApiKey, CoalescingGate, EnvCredentialGate};
use crate::poller::PollerConfig;
use crate::provider::gemini::{DEFAULT_BASE_URL, GeminiClient, GeminiModels};

/// Config file looked up in the working directory when
/// `MEDIAGEN_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "mediagen.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub struct Config {
    pub base_url: String,
    pub models: GeminiModels,
    pub poller: PollerConfig,
    pub api_key: Option<ApiKey>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            models: GeminiModels::default(),
            poller: PollerConfig::default(),
            api_key: None,
        }
    }
}

/// On-disk shape of `mediagen.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    models: Option<GeminiModels>,
    poll: PollSection,
    resolution: Option<String>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PollSection {
    interval_ms: Option<u64>,
    backoff_factor: Option<f64>,
    max_interval_ms: Option<u64>,
    max_failures: Option<u32>,
    max_duration_secs: Option<u64>,
    max_polls: Option<u32>,
}

impl Config {
    /// Defaults, then the TOML file (if any), then env overrides.
    pub fn load() -> Self {
        let path = env::var("MEDIAGEN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = match Self::from_file(&path) {
            Ok(Some(config)) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring invalid config file: {e}");
                Self::default()
            }
        };

        config.apply_overrides(|var| env::var(var).ok());
        config.api_key = credential::read_key_from_env();
        if config.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set, provider calls will fail until a key is selected");
        }
        config
    }

    /// `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(Self::from_toml_str(&raw)?))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        let file: FileConfig = toml::from_str(raw)?;
        let mut config = Self::default();

        if let Some(url) = file.base_url {
            config.base_url = url;
        }
        if let Some(models) = file.models {
            config.models = models;
        }
        if let Some(res) = file.resolution {
            config.poller.resolution = res;
        }
        if let Some(dir) = file.output_dir {
            config.poller.output_dir = dir;
        }

        let poll = file.poll;
        if let Some(ms) = poll.interval_ms {
            config.poller.poll_interval = Duration::from_millis(ms);
        }
        if let Some(factor) = poll.backoff_factor {
            config.poller.backoff_factor = factor;
        }
        if let Some(ms) = poll.max_interval_ms {
            config.poller.max_poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = poll.max_failures {
            config.poller.max_poll_failures = n.max(1);
        }
        config.poller.max_poll_duration = poll.max_duration_secs.map(Duration::from_secs);
        config.poller.max_polls = poll.max_polls;

        Ok(config)
    }

    /// Apply `MEDIAGEN_*` overrides. Unparseable values are logged and skipped.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MEDIAGEN_BASE_URL").filter(|s| !s.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(dir) = lookup("MEDIAGEN_OUTPUT_DIR").filter(|s| !s.trim().is_empty()) {
            self.poller.output_dir = PathBuf::from(dir);
        }
        if let Some(ms) = parse_var(&lookup, "MEDIAGEN_POLL_INTERVAL_MS") {
            self.poller.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var(&lookup, "MEDIAGEN_MAX_POLL_SECS") {
            self.poller.max_poll_duration = Some(Duration::from_secs(secs));
        }
    }

    pub fn gemini_client(&self) -> GeminiClient {
        GeminiClient::new(self.base_url.clone(), self.models.clone())
    }

    pub fn credential_gate(&self) -> CoalescingGate<EnvCredentialGate> {
        CoalescingGate::new(EnvCredentialGate::new(self.api_key.clone()))
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<u64> {
    let raw = lookup(var)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("ignoring {var}={raw}: {e}");
            None
        }
    }
}
