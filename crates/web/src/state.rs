// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use cabnet::directory::Library;
use cabnet::{FleetManager, Result, SystemConfig};

/// Shared control-plane state.
pub struct AppState {
    pub manager: Arc<FleetManager>,
    pub roms: Library,
    pub patches: Library,
    pub srams: Library,
    pub settings: Library,
    pub config: RwLock<SystemConfig>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Build the full state from a validated system config. Must run
    /// inside the runtime: loading the fleet starts its probers.
    pub fn from_config(config: SystemConfig) -> Result<Self> {
        let manager = Arc::new(FleetManager::load(&config.cabinet_config)?);
        let roms =
            Library::with_checksums(config.rom_directories.clone(), config.filenames.clone());
        let patches = Library::new(config.patch_directories.clone());
        let srams = Library::new(config.sram_directories.clone());
        let settings = Library::new(vec![config.settings_directory.clone()]);
        Ok(Self {
            manager,
            roms,
            patches,
            srams,
            settings,
            config: RwLock::new(config),
            shutdown: CancellationToken::new(),
        })
    }

    /// Rewrite both persisted documents: the system config (with the
    /// current ROM checksum map) and the cabinet records.
    pub async fn persist(&self) -> Result<()> {
        let mut config = self.config.write().await;
        config.filenames = self.roms.checksums();
        config.save()?;
        self.manager.save(&config.cabinet_config).await
    }
}
