// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System configuration document.
//!
//! A YAML file naming the cabinet config file, the managed directories,
//! and the persisted checksum map. Relative paths resolve against the
//! config file's own directory. Unrecognized keys are ignored; a missing
//! ROM or settings directory is fatal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(one) => vec![one],
            Self::Many(many) => many,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawConfig {
    cabinet_config: Option<String>,
    rom_directory: Option<OneOrMany>,
    patch_directory: Option<OneOrMany>,
    sram_directory: Option<OneOrMany>,
    settings_directory: Option<String>,
    #[serde(default)]
    filenames: HashMap<String, String>,
}

/// Parsed and validated system configuration.
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub path: PathBuf,
    pub cabinet_config: PathBuf,
    pub rom_directories: Vec<PathBuf>,
    pub patch_directories: Vec<PathBuf>,
    pub sram_directories: Vec<PathBuf>,
    pub settings_directory: PathBuf,
    pub filenames: HashMap<String, String>,
}

fn resolve(base: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl SystemConfig {
    /// Load and validate the document. Errors here are fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FleetError::Config(format!("{}: {e}", path.display())))?;
        let raw: RawConfig = serde_yaml::from_str(&contents)
            .map_err(|e| FleetError::Config(format!("{}: {e}", path.display())))?;
        let base = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let cabinet_config = raw
            .cabinet_config
            .ok_or_else(|| FleetError::Config("missing cabinet_config setting".to_owned()))?;
        let cabinet_config = resolve(&base, &cabinet_config);
        if !cabinet_config.is_file() {
            // Assume a new deployment and start with an empty fleet.
            std::fs::write(&cabinet_config, "")
                .map_err(|e| FleetError::Config(format!("{}: {e}", cabinet_config.display())))?;
        }

        let rom_directories: Vec<PathBuf> = raw
            .rom_directory
            .ok_or_else(|| FleetError::Config("missing rom_directory setting".to_owned()))?
            .into_vec()
            .iter()
            .map(|d| resolve(&base, d))
            .collect();
        for directory in &rom_directories {
            if !directory.is_dir() {
                return Err(FleetError::Config(format!(
                    "{} is not a directory",
                    directory.display()
                )));
            }
        }

        let patch_directories: Vec<PathBuf> = raw
            .patch_directory
            .unwrap_or(OneOrMany::One("patches".to_owned()))
            .into_vec()
            .iter()
            .map(|d| resolve(&base, d))
            .collect();
        for directory in &patch_directories {
            if !directory.is_dir() {
                return Err(FleetError::Config(format!(
                    "{} is not a directory",
                    directory.display()
                )));
            }
        }

        let sram_directories: Vec<PathBuf> = raw
            .sram_directory
            .unwrap_or(OneOrMany::One("srams".to_owned()))
            .into_vec()
            .iter()
            .map(|d| resolve(&base, d))
            .collect();

        let settings_directory = raw
            .settings_directory
            .ok_or_else(|| FleetError::Config("missing settings_directory setting".to_owned()))?;
        let settings_directory = resolve(&base, &settings_directory);

        Ok(Self {
            path: path.to_path_buf(),
            cabinet_config,
            rom_directories,
            patch_directories,
            sram_directories,
            settings_directory,
            filenames: raw.filenames,
        })
    }

    /// Rewrite the document, preserving the current checksum map.
    pub fn save(&self) -> Result<()> {
        let to_strings = |paths: &[PathBuf]| -> Vec<String> {
            paths.iter().map(|p| p.to_string_lossy().into_owned()).collect()
        };
        let raw = RawConfig {
            cabinet_config: Some(self.cabinet_config.to_string_lossy().into_owned()),
            rom_directory: Some(OneOrMany::Many(to_strings(&self.rom_directories))),
            patch_directory: Some(OneOrMany::Many(to_strings(&self.patch_directories))),
            sram_directory: Some(OneOrMany::Many(to_strings(&self.sram_directories))),
            settings_directory: Some(self.settings_directory.to_string_lossy().into_owned()),
            filenames: self.filenames.clone(),
        };
        let text =
            serde_yaml::to_string(&raw).map_err(|e| FleetError::Config(e.to_string()))?;
        std::fs::write(&self.path, text)
            .map_err(|e| FleetError::Config(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "sysconfig_tests.rs"]
mod tests;
