// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Project persistence.
//!
//! A project named `name` is the tape `<dir>/<name>.wav` plus its mixer
//! settings in `<dir>/<name>.yaml`. Settings from the older fixed-column
//! `<name>.cfg` files are imported when no YAML file exists yet.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{Leg, NullClock};
use crate::engine::track::MONITOR_MAX;
use crate::engine::{Engine, StatusSnapshot};
use crate::store::FrameStore;

const SETTINGS_HEADER: &str = "\
# This file is completely overwritten each time the project is saved.
# Do not edit it while tapedeck is using this project.
";

/// Saved mixer state of a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProjectFile {
    /// Head position in frames
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub tracks: Vec<TrackSettings>,
}

/// Saved state of one track
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackSettings {
    pub index: usize,
    #[serde(default = "default_monitor_mix")]
    pub monitor_mix: u8,
    #[serde(default)]
    pub mute_a: bool,
    #[serde(default)]
    pub mute_b: bool,
}

fn default_monitor_mix() -> u8 {
    MONITOR_MAX
}

impl TrackSettings {
    fn new(index: usize) -> Self {
        Self {
            index,
            monitor_mix: default_monitor_mix(),
            mute_a: false,
            mute_b: false,
        }
    }
}

impl ProjectFile {
    /// Load settings from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read project file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse project YAML")
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize project to YAML")
    }

    /// Save settings to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = format!("{}\n{}", SETTINGS_HEADER, self.to_yaml()?);
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write project file: {:?}", path.as_ref()))
    }

    /// Parse the legacy `NNV=level` / `NNL=0|1` / `NNR=0|1` / `Pos=frames`
    /// format. `1` in an `L`/`R` line means the leg is routed (unmuted).
    pub fn from_legacy_cfg(text: &str) -> Self {
        let mut project = ProjectFile::default();
        for line in text.lines() {
            let line = line.trim_end();
            if line.starts_with('#') || line.len() < 5 {
                continue;
            }
            if let Some(position) = line.strip_prefix("Pos=") {
                project.position = position.trim().parse().unwrap_or(0);
                continue;
            }

            let bytes = line.as_bytes();
            if !bytes[0].is_ascii_digit() || !bytes[1].is_ascii_digit() || bytes[3] != b'=' {
                continue;
            }
            let index = ((bytes[0] - b'0') * 10 + (bytes[1] - b'0')) as usize;
            let value = &line[4..];
            let track = project.track_mut(index);
            match bytes[2] {
                b'V' => track.monitor_mix = value.trim().parse::<u8>().unwrap_or(MONITOR_MAX).min(MONITOR_MAX),
                b'L' => track.mute_a = !value.starts_with('1'),
                b'R' => track.mute_b = !value.starts_with('1'),
                _ => {}
            }
        }
        project
    }

    /// Capture the mixer state published by a running engine
    pub fn from_snapshot(snapshot: &StatusSnapshot) -> Self {
        Self {
            position: snapshot.head,
            tracks: snapshot
                .tracks
                .iter()
                .enumerate()
                .map(|(index, track)| TrackSettings {
                    index,
                    monitor_mix: track.monitor_mix,
                    mute_a: track.mute_a,
                    mute_b: track.mute_b,
                })
                .collect(),
        }
    }

    /// Settings for `index`, created with defaults if missing
    pub fn track_mut(&mut self, index: usize) -> &mut TrackSettings {
        let slot = match self.tracks.iter().position(|t| t.index == index) {
            Some(slot) => slot,
            None => {
                self.tracks.push(TrackSettings::new(index));
                self.tracks.len() - 1
            }
        };
        &mut self.tracks[slot]
    }

    /// Restore levels, mutes and position on a freshly built engine.
    ///
    /// Tracks the tape does not have are ignored; the position is clamped to
    /// the tape.
    pub fn apply_to<S: FrameStore>(&self, engine: &mut Engine<S>) {
        let mut clock = NullClock;
        for settings in &self.tracks {
            if settings.index >= engine.tracks().len() {
                continue;
            }
            engine.set_monitor(settings.index, settings.monitor_mix);
            engine.set_mute(settings.index, Leg::A, settings.mute_a, &mut clock);
            engine.set_mute(settings.index, Leg::B, settings.mute_b, &mut clock);
        }
        engine.seek(self.position.min(i64::MAX as u64) as i64, &mut clock);
        engine.publish();
    }
}

/// Names and paths of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    dir: PathBuf,
    name: String,
}

impl Project {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn container_path(&self) -> PathBuf {
        self.dir.join(format!("{}.wav", self.name))
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(format!("{}.yaml", self.name))
    }

    pub fn legacy_settings_path(&self) -> PathBuf {
        self.dir.join(format!("{}.cfg", self.name))
    }

    /// Load the project settings, falling back to a legacy file and then to
    /// defaults
    pub fn load_settings(&self) -> Result<ProjectFile> {
        let path = self.settings_path();
        if path.exists() {
            let settings = ProjectFile::load(&path)?;
            info!(path = %path.display(), "loaded project settings");
            return Ok(settings);
        }

        let legacy = self.legacy_settings_path();
        if legacy.exists() {
            let text = fs::read_to_string(&legacy)
                .with_context(|| format!("Failed to read legacy settings: {:?}", legacy))?;
            info!(path = %legacy.display(), "imported legacy project settings");
            return Ok(ProjectFile::from_legacy_cfg(&text));
        }

        info!(project = %self.name, "no saved settings, using defaults");
        Ok(ProjectFile::default())
    }

    pub fn save_settings(&self, settings: &ProjectFile) -> Result<()> {
        let path = self.settings_path();
        settings.save(&path)?;
        info!(path = %path.display(), "saved project settings");
        Ok(())
    }

    /// Copy the tape to `name`, save the settings there and switch to it
    pub fn save_as(&mut self, name: &str, settings: &ProjectFile) -> Result<()> {
        let target = Project::new(self.dir.clone(), name);
        if target.container_path() == self.container_path() {
            return self.save_settings(settings);
        }

        let source = self.container_path();
        if source.exists() {
            fs::copy(&source, target.container_path()).with_context(|| {
                format!("Failed to copy {:?} to {:?}", source, target.container_path())
            })?;
        } else {
            warn!(path = %source.display(), "no tape to copy, saving settings only");
        }
        target.save_settings(settings)?;
        *self = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineStatus, LatencyCompensator};
    use crate::store::{Container, NewContainer};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_legacy_cfg_import() {
        let text = "\
# This configuration file is completely overwritten each time the project is saved
# Do not manually edit this file while the recorder is using this project.

00V=80
00L=1
00R=0
03V=250
03L=0
03R=0
Pos=44100
";
        let project = ProjectFile::from_legacy_cfg(text);
        assert_eq!(project.position, 44100);
        assert_eq!(project.tracks.len(), 2);

        assert_eq!(
            project.tracks[0],
            TrackSettings {
                index: 0,
                monitor_mix: 80,
                mute_a: false,
                mute_b: true,
            }
        );
        assert_eq!(project.tracks[1].index, 3);
        assert_eq!(project.tracks[1].monitor_mix, 100);
        assert!(project.tracks[1].mute_a && project.tracks[1].mute_b);
    }

    #[test]
    fn test_yaml_defaults() {
        let project = ProjectFile::from_yaml("tracks:\n  - index: 2\n").unwrap();
        assert_eq!(project.position, 0);
        assert_eq!(project.tracks[0], TrackSettings::new(2));
    }

    #[test]
    fn test_load_prefers_yaml_then_legacy() {
        let dir = tempdir().unwrap();
        let project = Project::new(dir.path(), "song");
        assert_eq!(project.load_settings().unwrap(), ProjectFile::default());

        fs::write(project.legacy_settings_path(), "Pos=10\n").unwrap();
        assert_eq!(project.load_settings().unwrap().position, 10);

        let mut settings = ProjectFile::default();
        settings.position = 20;
        project.save_settings(&settings).unwrap();
        assert_eq!(project.load_settings().unwrap().position, 20);

        let text = fs::read_to_string(project.settings_path()).unwrap();
        assert!(text.starts_with("# This file is completely overwritten"));
    }

    #[test]
    fn test_save_as_copies_tape() {
        let dir = tempdir().unwrap();
        let mut project = Project::new(dir.path(), "first");
        fs::write(project.container_path(), b"tape bytes").unwrap();

        let settings = ProjectFile::default();
        project.save_as("second", &settings).unwrap();

        assert_eq!(project.name(), "second");
        assert_eq!(fs::read(project.container_path()).unwrap(), b"tape bytes");
        assert!(project.settings_path().exists());
        assert!(dir.path().join("first.wav").exists());
    }

    #[test]
    fn test_apply_to_engine() {
        let dir = tempdir().unwrap();
        let defaults = NewContainer {
            channels: 2,
            sample_rate: 100,
            seconds: 10,
        };
        let container = Container::open(dir.path().join("t.wav"), &defaults).unwrap();
        let mut engine = Engine::new(
            container,
            Arc::new(LatencyCompensator::new()),
            Arc::new(EngineStatus::new()),
        );

        let mut settings = ProjectFile::default();
        settings.position = 5000;
        settings.track_mut(1).monitor_mix = 30;
        settings.track_mut(1).mute_a = true;
        settings.track_mut(9).monitor_mix = 10;
        settings.apply_to(&mut engine);

        assert_eq!(engine.head(), 1000);
        assert_eq!(engine.track(1).unwrap().monitor_mix, 30);
        assert!(engine.track(1).unwrap().mute_a);
        assert_eq!(engine.track(0).unwrap().monitor_mix, 100);

        let saved = ProjectFile::from_snapshot(&engine.status().snapshot());
        assert_eq!(saved.position, 1000);
        assert_eq!(saved.tracks[1].monitor_mix, 30);
    }
}
