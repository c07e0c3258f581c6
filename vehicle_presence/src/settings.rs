//! Host settings, read from settings.toml with environment overrides.
//! Persisting changes made at runtime is somebody else's problem.

use crate::engine::EngineConfig;
use anyhow::{anyhow, Result};
use config::{Config, Environment, File, FileFormat};
use serde_derive::Deserialize;

/// Environment variables starting with this override the file, e.g.
/// PRESENCE__ENGINE__THRESHOLD_CM=150
const ENV_PREFIX: &str = "PRESENCE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,

    /// Where the sensor driver writes its readings and door events
    pub input_path: String,

    /// How often to tick the engine when no input arrives, in ms
    pub poll_interval_ms: u64,

    /// Endpoint notifications are POSTed to, if any
    pub report_url: Option<String>,

    /// Serve status over HTTP and websocket
    pub status_server: bool,
    pub status_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            input_path: "/dev/stdin".into(),
            poll_interval_ms: 100,
            report_url: None,
            status_server: false,
            status_port: 3030,
        }
    }
}

impl Settings {
    /// Load settings from the named file (extension optional) layered
    /// under the environment
    pub fn load(name: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(config)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::presence::DebouncePolicy;

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_toml(
            r#"
            input_path = "/run/tof/readings"
            report_url = "http://localhost:1309/vehicle"
            status_server = true

            [engine]
            threshold_cm = 150
            assist_duration_s = 60

            [engine.debounce]
            policy = "unanimous"
            unanimous_len = 30
            "#,
        )
        .unwrap();

        assert_eq!(settings.input_path, "/run/tof/readings");
        assert_eq!(
            settings.report_url.as_deref(),
            Some("http://localhost:1309/vehicle")
        );
        assert!(settings.status_server);
        assert_eq!(settings.status_port, 3030);
        assert_eq!(settings.engine.threshold_cm, 150);
        assert_eq!(settings.engine.threshold_mm(), 1500);
        assert_eq!(settings.engine.assist_duration_s, 60);
        assert_eq!(settings.engine.motion_timeout_ms, 5000);
        assert_eq!(settings.engine.debounce.policy, DebouncePolicy::Unanimous);
        assert_eq!(settings.engine.debounce.unanimous_len, 30);
        assert_eq!(settings.engine.debounce.history_len, 256);
    }

    #[test]
    fn test_rejects_zero_threshold() {
        assert!(Settings::from_toml("[engine]\nthreshold_cm = 0\n").is_err());
        assert!(Settings::from_toml("poll_interval_ms = 0\n").is_err());
        assert!(Settings::from_toml("[engine.debounce]\npolicy = \"sometimes\"\n").is_err());
    }
}
