//! Configuration loading and command-line overrides

use anyhow::{bail, Context, Result};
use can_recorder::{Bitrate, InterfaceConfig, InterfaceKind, RecorderConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_interface")]
    pub interface: InterfaceConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub replay: Option<ReplayConfig>,
    /// Generate traffic on the virtual channel
    #[serde(default)]
    pub simulate: bool,
}

fn default_interface() -> InterfaceConfig {
    InterfaceConfig::new(InterfaceKind::Virtual, Bitrate::Kbps500)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            recording: RecordingConfig::default(),
            output: OutputConfig::default(),
            replay: None,
            simulate: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RecordingConfig {
    #[serde(flatten)]
    pub pipeline: RecorderConfig,
    /// Stop automatically after this many seconds
    pub duration_secs: Option<u64>,
}

impl RecordingConfig {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Where to save the `.trc` trace after recording
    pub trace: Option<PathBuf>,
    /// Where to save the per-identifier statistics as JSON
    pub summary: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayConfig {
    pub file: PathBuf,
    #[serde(default = "default_true")]
    pub paced: bool,
}

fn default_true() -> bool {
    true
}

/// Command-line values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub interface: Option<InterfaceKind>,
    pub channel: Option<String>,
    pub bitrate: Option<u32>,
    pub duration_secs: Option<u64>,
    pub trace: Option<PathBuf>,
    pub summary: Option<PathBuf>,
    pub replay: Option<PathBuf>,
    pub no_pacing: bool,
    pub simulate: bool,
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

impl AppConfig {
    /// Apply command-line overrides and validate the result
    pub fn apply(mut self, overrides: Overrides) -> Result<Self> {
        if let Some(kind) = overrides.interface {
            if kind != self.interface.kind {
                // The configured channel belongs to the old kind
                self.interface.channel = None;
            }
            self.interface.kind = kind;
        }
        if let Some(channel) = overrides.channel {
            self.interface.channel = Some(channel);
        }
        if let Some(bitrate) = overrides.bitrate {
            self.interface.bitrate = Bitrate::try_from(bitrate)
                .with_context(|| "Supported bitrates: 125000, 250000, 500000, 1000000")?;
        }
        if let Some(secs) = overrides.duration_secs {
            self.recording.duration_secs = Some(secs);
        }
        if let Some(trace) = overrides.trace {
            self.output.trace = Some(trace);
        }
        if let Some(summary) = overrides.summary {
            self.output.summary = Some(summary);
        }
        if let Some(file) = overrides.replay {
            self.replay = Some(ReplayConfig { file, paced: true });
        }
        if overrides.no_pacing {
            if let Some(replay) = self.replay.as_mut() {
                replay.paced = false;
            }
        }
        self.simulate |= overrides.simulate;

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.simulate && self.replay.is_some() {
            bail!("--simulate and --replay cannot be combined");
        }
        if self.simulate && self.interface.kind != InterfaceKind::Virtual {
            bail!(
                "Traffic simulation needs the virtual interface, not {}",
                self.interface.kind.display_name()
            );
        }
        if self.recording.pipeline.batch_limit == 0 {
            bail!("batch_limit must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            simulate = true

            [interface]
            kind = "virtual"
            channel = "vcan1"
            bitrate = 250000

            [recording]
            refresh_interval_ms = 200
            duration_secs = 5

            [output]
            trace = "session.trc"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.interface.channel(), "vcan1");
        assert_eq!(config.interface.bitrate, Bitrate::Kbps250);
        assert_eq!(config.recording.pipeline.refresh_interval_ms, 200);
        assert_eq!(config.recording.pipeline.batch_limit, 50);
        assert_eq!(config.recording.duration(), Some(Duration::from_secs(5)));
        assert_eq!(config.output.trace, Some(PathBuf::from("session.trc")));
        assert!(config.simulate);
    }

    #[test]
    fn test_unsupported_bitrate_rejected() {
        let toml_content = r#"
            [interface]
            kind = "pcan"
            bitrate = 83333
        "#;
        assert!(toml::from_str::<AppConfig>(toml_content).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::default()
            .apply(Overrides {
                interface: Some(InterfaceKind::Kvaser),
                bitrate: Some(1_000_000),
                duration_secs: Some(3),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.interface.kind, InterfaceKind::Kvaser);
        assert_eq!(config.interface.channel(), "0");
        assert_eq!(config.interface.bitrate, Bitrate::Mbps1);
        assert_eq!(config.recording.duration_secs, Some(3));
    }

    #[test]
    fn test_invalid_combinations() {
        let bad_bitrate = AppConfig::default().apply(Overrides {
            bitrate: Some(100_000),
            ..Default::default()
        });
        assert!(bad_bitrate.is_err());

        let simulate_on_hardware = AppConfig::default().apply(Overrides {
            interface: Some(InterfaceKind::Pcan),
            simulate: true,
            ..Default::default()
        });
        assert!(simulate_on_hardware.is_err());

        let replay = AppConfig::default()
            .apply(Overrides {
                replay: Some(PathBuf::from("in.trc")),
                no_pacing: true,
                ..Default::default()
            })
            .unwrap();
        assert!(!replay.replay.unwrap().paced);
    }
}
