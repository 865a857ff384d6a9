// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Library indexers for ROMs, patches, SRAM files, and NAOMI settings.
//!
//! A library is a set of managed directories. It lists files, derives
//! display names, keeps opaque checksums, and answers applicability
//! queries by filename-stem convention (`game-anything.patch` applies to
//! `game.bin`).

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use sha2::{Digest, Sha256};

use crate::error::{FleetError, Result};

pub struct Library {
    directories: Vec<PathBuf>,
    checksums: RwLock<HashMap<String, String>>,
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

fn stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split_once('.').map_or(name, |(stem, _)| stem)
}

impl Library {
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self { directories, checksums: RwLock::new(HashMap::new()) }
    }

    pub fn with_checksums(directories: Vec<PathBuf>, checksums: HashMap<String, String>) -> Self {
        Self { directories, checksums: RwLock::new(checksums) }
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    /// Sorted file names directly inside one managed directory.
    pub fn files(&self, directory: &Path) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(entries) = std::fs::read_dir(directory) else {
            return names;
        };
        for entry in entries.flatten() {
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        names
    }

    /// Every managed file as a full path, sorted.
    pub fn all_files(&self) -> Vec<String> {
        let mut all = Vec::new();
        for directory in &self.directories {
            for name in self.files(directory) {
                all.push(directory.join(name).to_string_lossy().into_owned());
            }
        }
        all.sort();
        all
    }

    /// Is this path a managed file on disk?
    pub fn contains(&self, path: &str) -> bool {
        let path = Path::new(path);
        let Some(parent) = path.parent() else {
            return false;
        };
        self.directories.iter().any(|d| d.as_path() == parent) && path.is_file()
    }

    /// Display name for a managed file. ROM headers are not parsed; the
    /// name derives from the filename.
    pub fn display_name(path: &str) -> String {
        stem(path).replace(['_', '-'], " ")
    }

    /// Files applicable to a game: same stem prefix, with a separator or
    /// nothing after it.
    pub fn applicable_to(&self, rom_path: &str) -> Vec<String> {
        let game = stem(rom_path);
        self.all_files()
            .into_iter()
            .filter(|candidate| {
                let candidate_stem = stem(candidate);
                match candidate_stem.strip_prefix(game) {
                    Some("") => true,
                    Some(rest) => rest.starts_with(['-', '_', '.']),
                    None => false,
                }
            })
            .collect()
    }

    /// Store an uploaded file into the first managed directory.
    pub fn upload(&self, name: &str, bytes: &[u8]) -> Result<String> {
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return Err(FleetError::Config(format!("invalid upload name {name:?}")));
        }
        let Some(directory) = self.directories.first() else {
            return Err(FleetError::Config("library has no directories".to_owned()));
        };
        let path = directory.join(name);
        std::fs::write(&path, bytes)
            .map_err(|e| FleetError::Config(format!("{}: {e}", path.display())))?;
        let full = path.to_string_lossy().into_owned();
        if let Ok(mut checksums) = self.checksums.write() {
            checksums.insert(full.clone(), hex_digest(bytes));
        }
        Ok(full)
    }

    /// Read a managed file whole.
    pub fn load(&self, path: &str) -> Result<Vec<u8>> {
        if !self.contains(path) {
            return Err(FleetError::NotFound(path.to_owned()));
        }
        std::fs::read(path).map_err(|e| FleetError::NotFound(format!("{path}: {e}")))
    }

    /// Re-hash one file, or every managed file.
    pub fn recalculate(&self, only: Option<&str>) {
        let targets: Vec<String> = match only {
            Some(path) => vec![path.to_owned()],
            None => self.all_files(),
        };
        let Ok(mut checksums) = self.checksums.write() else {
            return;
        };
        for path in targets {
            match std::fs::read(&path) {
                Ok(bytes) => {
                    checksums.insert(path, hex_digest(&bytes));
                }
                Err(_) => {
                    checksums.remove(&path);
                }
            }
        }
    }

    pub fn checksums(&self) -> HashMap<String, String> {
        self.checksums.read().map(|map| map.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;
