// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet manager.
//!
//! Owns the cabinet set, dispatches the heartbeat that drives every
//! cabinet's state machine, serves lookup by address, and persists the
//! per-cabinet records as YAML.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cabinet::{Cabinet, CabinetConfig};
use crate::error::{FleetError, Result};

/// Heartbeat cadence for the whole fleet.
const HEARTBEAT: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Default, Serialize, Deserialize)]
struct FleetFile {
    #[serde(default)]
    cabinets: Vec<CabinetConfig>,
}

pub struct FleetManager {
    cabinets: RwLock<HashMap<String, Arc<Mutex<Cabinet>>>>,
    cancel: CancellationToken,
}

impl Default for FleetManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetManager {
    pub fn new() -> Self {
        Self { cabinets: RwLock::new(HashMap::new()), cancel: CancellationToken::new() }
    }

    /// Load the fleet from a YAML cabinet file. An empty file is an empty
    /// fleet. Must run inside the runtime: every cabinet starts its prober.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| FleetError::Config(format!("{}: {e}", path.display())))?;
        let file: FleetFile = if contents.trim().is_empty() {
            FleetFile::default()
        } else {
            serde_yaml::from_str(&contents)
                .map_err(|e| FleetError::Config(format!("{}: {e}", path.display())))?
        };

        let mut cabinets = HashMap::new();
        for config in file.cabinets {
            let ip = config.ip.clone();
            if cabinets.contains_key(&ip) {
                return Err(FleetError::Config(format!("duplicate cabinet {ip}")));
            }
            cabinets.insert(ip, Arc::new(Mutex::new(Cabinet::new(config))));
        }
        Ok(Self { cabinets: RwLock::new(cabinets), cancel: CancellationToken::new() })
    }

    /// Persist every cabinet record.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut records = Vec::new();
        for cabinet in self.snapshot().await {
            records.push(cabinet.lock().await.to_config());
        }
        records.sort_by(|a, b| a.ip.cmp(&b.ip));
        let text = serde_yaml::to_string(&FleetFile { cabinets: records })
            .map_err(|e| FleetError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), text)
            .map_err(|e| FleetError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Ok(())
    }

    pub async fn ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self.cabinets.read().await.keys().cloned().collect();
        ips.sort();
        ips
    }

    pub async fn exists(&self, ip: &str) -> bool {
        self.cabinets.read().await.contains_key(ip)
    }

    pub async fn cabinet(&self, ip: &str) -> Option<Arc<Mutex<Cabinet>>> {
        self.cabinets.read().await.get(ip).map(Arc::clone)
    }

    /// Add a cabinet. The address must be new to the fleet.
    pub async fn add(&self, config: CabinetConfig) -> Result<Arc<Mutex<Cabinet>>> {
        let mut cabinets = self.cabinets.write().await;
        if cabinets.contains_key(&config.ip) {
            return Err(FleetError::Config(format!("cabinet {} already exists", config.ip)));
        }
        let ip = config.ip.clone();
        let cabinet = Arc::new(Mutex::new(Cabinet::new(config)));
        cabinets.insert(ip, Arc::clone(&cabinet));
        Ok(cabinet)
    }

    /// Remove a cabinet and tear down its host.
    pub async fn remove(&self, ip: &str) -> Result<()> {
        let removed = self.cabinets.write().await.remove(ip);
        match removed {
            Some(cabinet) => {
                cabinet.lock().await.shutdown().await;
                Ok(())
            }
            None => Err(FleetError::NotFound(format!("cabinet {ip}"))),
        }
    }

    async fn snapshot(&self) -> Vec<Arc<Mutex<Cabinet>>> {
        self.cabinets.read().await.values().map(Arc::clone).collect()
    }

    /// Tick every cabinet once.
    pub async fn tick_all(&self) {
        for cabinet in self.snapshot().await {
            cabinet.lock().await.tick().await;
        }
    }

    /// Spawn the 1 Hz heartbeat task.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEARTBEAT);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = manager.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                manager.tick_all().await;
            }
        })
    }

    /// Stop the heartbeat.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
