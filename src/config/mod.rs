// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Application configuration for tapedeck.
//!
//! Settings are read from a TOML file. Every field has a default, so an empty
//! or missing file yields a working configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::clock::ClockConfig;
use crate::store::{NewContainer, DEFAULT_SAMPLE_RATE, MAX_TRACKS, NEW_CONTAINER_SECONDS};

/// File looked for in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "tapedeck.toml";

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Directory holding project files
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,
    /// Project opened at startup
    #[serde(default = "default_project")]
    pub project: String,
    /// Layout of containers created from scratch
    #[serde(default)]
    pub new_project: NewProjectConfig,
    /// Audio device selection
    #[serde(default)]
    pub audio: AudioConfig,
    /// Transport step sizes
    #[serde(default)]
    pub transport: TransportConfig,
    /// Terminal UI
    #[serde(default)]
    pub ui: UiConfig,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_project() -> String {
    "default".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            project: default_project(),
            new_project: NewProjectConfig::default(),
            audio: AudioConfig::default(),
            transport: TransportConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml(&contents)
    }

    /// Load `path`, or the default file if it exists, or the built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self> {
        toml::from_str(toml).context("Failed to parse TOML configuration")
    }

    /// Serialize to a TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Default log file location
    pub fn log_path(&self) -> PathBuf {
        self.project_dir.join("tapedeck.log")
    }
}

/// Layout of a new container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewProjectConfig {
    /// Track count (1-16)
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Seconds of silence to start with
    #[serde(default = "default_seconds")]
    pub seconds: u32,
}

fn default_channels() -> u16 {
    MAX_TRACKS as u16
}
fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}
fn default_seconds() -> u32 {
    NEW_CONTAINER_SECONDS
}

impl Default for NewProjectConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            sample_rate: default_sample_rate(),
            seconds: default_seconds(),
        }
    }
}

impl NewProjectConfig {
    pub fn container(&self) -> NewContainer {
        NewContainer {
            channels: self.channels,
            sample_rate: self.sample_rate,
            seconds: self.seconds,
        }
    }
}

/// Audio device selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    /// Name shown in logs
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Output device name (host default if unset)
    #[serde(default)]
    pub output_device: Option<String>,
    /// Input device name (host default if unset)
    #[serde(default)]
    pub input_device: Option<String>,
}

fn default_client_name() -> String {
    "tapedeck".to_string()
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            output_device: None,
            input_device: None,
        }
    }
}

impl AudioConfig {
    pub fn clock(&self) -> ClockConfig {
        ClockConfig {
            client_name: self.client_name.clone(),
            output_device: self.output_device.clone(),
            input_device: self.input_device.clone(),
        }
    }
}

/// Transport step sizes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Seconds moved by `,` and `.`
    #[serde(default = "default_seek_small")]
    pub seek_small_seconds: u32,
    /// Seconds moved by `<` and `>`
    #[serde(default = "default_seek_large")]
    pub seek_large_seconds: u32,
}

fn default_seek_small() -> u32 {
    1
}
fn default_seek_large() -> u32 {
    10
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            seek_small_seconds: default_seek_small(),
            seek_large_seconds: default_seek_large(),
        }
    }
}

/// Terminal UI settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiConfig {
    /// Redraws per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
}

fn default_frame_rate() -> u32 {
    30
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.new_project.channels, 16);
        assert_eq!(config.new_project.sample_rate, 44100);
        assert_eq!(config.new_project.seconds, 4);
        assert_eq!(config.transport.seek_small_seconds, 1);
        assert_eq!(config.transport.seek_large_seconds, 10);
        assert_eq!(config.ui.frame_rate, 30);
        assert_eq!(config.audio.client_name, "tapedeck");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
project_dir = "/tmp/tapes"
project = "demo"

[new_project]
channels = 8

[audio]
output_device = "Scarlett 2i2"
"#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(config.project_dir, PathBuf::from("/tmp/tapes"));
        assert_eq!(config.project, "demo");
        assert_eq!(config.new_project.channels, 8);
        assert_eq!(config.new_project.sample_rate, 44100);
        assert_eq!(config.audio.output_device.as_deref(), Some("Scarlett 2i2"));
        assert_eq!(config.audio.input_device, None);

        let clock = config.audio.clock();
        assert_eq!(clock.output_device.as_deref(), Some("Scarlett 2i2"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(AppConfig::from_toml("project = [").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tapedeck.toml");

        let mut config = AppConfig::default();
        config.project = "session".to_string();
        config.ui.frame_rate = 60;
        fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.new_project.container().seconds, 4);
    }
}
