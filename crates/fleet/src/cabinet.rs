// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-cabinet state machine.
//!
//! The top-level automaton coordinating liveness, the outlet, transfers,
//! and the time-limit refresh. Transitions are evaluated on the fleet
//! heartbeat; a disabled cabinet freezes in place while its prober keeps
//! running.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};
use crate::host::{Host, HostConfig, HostStatus};
use crate::netdimm::{ProtocolVersion, Target};
use crate::outlet::{self, Outlet, OutletConfig, PowerState};
#[cfg(test)]
use crate::prober::ProbeFn;
use crate::settings::SettingsKind;

/// Region a cabinet's hardware is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Japan,
    Usa,
    Export,
    Korea,
    Australia,
    Unknown,
}

/// States of the cabinet automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinetState {
    Startup,
    WaitForCabinetPowerOn,
    WaitForCabinetPowerOff,
    SendCurrentGame,
    WaitForCurrentGame,
    CheckCurrentGame,
    WaitForCabinetDisconnect,
}

fn default_true() -> bool {
    true
}

/// Persisted per-cabinet record; also the constructor input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CabinetConfig {
    pub ip: String,
    #[serde(default)]
    pub description: String,
    pub region: Region,
    pub target: Target,
    pub version: ProtocolVersion,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub controllable: bool,
    #[serde(default)]
    pub time_hack: bool,
    #[serde(default)]
    pub skip_crc: bool,
    #[serde(default)]
    pub skip_now_load: bool,
    #[serde(default)]
    pub power_cycle: bool,
    #[serde(default)]
    pub send_timeout: Option<u64>,
    #[serde(default)]
    pub outlet: Option<OutletConfig>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub patches: HashMap<String, Vec<String>>,
    #[serde(default, with = "settings_blobs")]
    pub settings: HashMap<String, Option<Vec<u8>>>,
    #[serde(default)]
    pub srams: HashMap<String, Option<String>>,
}

/// EEPROM blobs ride in YAML as base64 strings.
mod settings_blobs {
    use std::collections::HashMap;

    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        map: &HashMap<String, Option<Vec<u8>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: HashMap<&String, Option<String>> = map
            .iter()
            .map(|(key, value)| (key, value.as_ref().map(|blob| STANDARD.encode(blob))))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<String, Option<Vec<u8>>>, D::Error> {
        let encoded = HashMap::<String, Option<String>>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(key, value)| {
                let decoded = value
                    .map(|text| STANDARD.decode(text.as_bytes()))
                    .transpose()
                    .map_err(serde::de::Error::custom)?;
                Ok((key, decoded))
            })
            .collect()
    }
}

/// Mutable fields accepted by a cabinet update.
#[derive(Debug, Clone, Deserialize)]
pub struct CabinetUpdate {
    pub description: String,
    pub region: Region,
    pub target: Target,
    pub version: ProtocolVersion,
    pub enabled: bool,
    pub time_hack: bool,
    pub skip_crc: bool,
    pub skip_now_load: bool,
    #[serde(default)]
    pub send_timeout: Option<u64>,
}

pub struct Cabinet {
    pub ip: String,
    pub description: String,
    pub region: Region,
    pub target: Target,
    pub version: ProtocolVersion,
    pub enabled: bool,
    pub controllable: bool,
    pub time_hack: bool,
    pub skip_crc: bool,
    pub skip_now_load: bool,
    pub power_cycle: bool,
    pub send_timeout: Option<u64>,
    pub patches: HashMap<String, Vec<String>>,
    pub settings: HashMap<String, Option<Vec<u8>>>,
    pub srams: HashMap<String, Option<String>>,
    filename: Option<String>,
    outlet: Option<OutletConfig>,
    pub(crate) outlet_driver: Option<Arc<dyn Outlet>>,
    power_state: PowerState,
    pub(crate) state: CabinetState,
    last_sent: Option<String>,
    pub(crate) last_message: Option<String>,
    pub(crate) host: Host,
}

impl std::fmt::Debug for Cabinet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cabinet")
            .field("ip", &self.ip)
            .field("description", &self.description)
            .field("region", &self.region)
            .field("target", &self.target)
            .field("version", &self.version)
            .field("enabled", &self.enabled)
            .field("controllable", &self.controllable)
            .field("time_hack", &self.time_hack)
            .field("skip_crc", &self.skip_crc)
            .field("skip_now_load", &self.skip_now_load)
            .field("power_cycle", &self.power_cycle)
            .field("send_timeout", &self.send_timeout)
            .field("patches", &self.patches)
            .field("settings", &self.settings)
            .field("srams", &self.srams)
            .field("filename", &self.filename)
            .field("outlet", &self.outlet)
            .field("outlet_driver", &self.outlet_driver.is_some())
            .field("power_state", &self.power_state)
            .field("state", &self.state)
            .field("last_sent", &self.last_sent)
            .field("last_message", &self.last_message)
            .field("host", &self.host)
            .finish()
    }
}

impl Cabinet {
    pub fn new(config: CabinetConfig) -> Self {
        let host = Host::new(Self::host_config(&config));
        Self::assemble(config, host)
    }

    #[cfg(test)]
    pub(crate) fn with_probe(config: CabinetConfig, probe: ProbeFn) -> Self {
        let host = Host::with_probe(Self::host_config(&config), probe);
        Self::assemble(config, host)
    }

    fn host_config(config: &CabinetConfig) -> HostConfig {
        HostConfig {
            ip: config.ip.clone(),
            target: config.target,
            version: config.version,
            send_timeout: config.send_timeout,
            time_hack: config.time_hack,
            skip_crc: config.skip_crc,
            skip_now_load: config.skip_now_load,
        }
    }

    fn assemble(config: CabinetConfig, host: Host) -> Self {
        let outlet = outlet::ingest(config.outlet);
        let outlet_driver = outlet.as_ref().map(OutletConfig::driver);
        let filename = match config.filename {
            Some(filename) if config.patches.contains_key(&filename) => Some(filename),
            Some(filename) => {
                tracing::warn!(ip = %config.ip, file = %filename, "selected game is unknown, clearing");
                None
            }
            None => None,
        };
        Self {
            ip: config.ip,
            description: config.description,
            region: config.region,
            target: config.target,
            version: config.version,
            enabled: config.enabled,
            controllable: config.controllable,
            time_hack: config.time_hack,
            skip_crc: config.skip_crc,
            skip_now_load: config.skip_now_load,
            power_cycle: config.power_cycle,
            send_timeout: config.send_timeout,
            patches: config.patches,
            settings: config.settings,
            srams: config.srams,
            filename,
            outlet,
            outlet_driver,
            power_state: PowerState::Unknown,
            state: CabinetState::Startup,
            last_sent: None,
            last_message: None,
            host,
        }
    }

    pub fn state(&self) -> CabinetState {
        self.state
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn selected_filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn outlet_config(&self) -> Option<&OutletConfig> {
        self.outlet.as_ref()
    }

    /// Select a game. The filename must be one of the cabinet's enabled
    /// games; `None` deselects.
    pub fn set_filename(&mut self, filename: Option<String>) -> Result<()> {
        if let Some(ref filename) = filename {
            if !self.patches.contains_key(filename) {
                return Err(FleetError::NotFound(format!("game {filename} is not enabled")));
            }
        }
        self.filename = filename;
        Ok(())
    }

    /// Replace the outlet configuration and control flags. An invalid
    /// outlet config degrades to none.
    pub fn set_outlet(
        &mut self,
        config: Option<OutletConfig>,
        controllable: bool,
        power_cycle: bool,
    ) {
        self.outlet = outlet::ingest(config);
        self.outlet_driver = self.outlet.as_ref().map(OutletConfig::driver);
        self.controllable = controllable;
        self.power_cycle = power_cycle;
    }

    /// Apply an update. Host-facing fields rebuild the controller so the
    /// prober and future transfers see the new parameters.
    pub async fn apply_update(&mut self, update: CabinetUpdate) {
        let rebuild = update.target != self.target
            || update.version != self.version
            || update.time_hack != self.time_hack
            || update.skip_crc != self.skip_crc
            || update.skip_now_load != self.skip_now_load
            || update.send_timeout != self.send_timeout;

        self.description = update.description;
        self.region = update.region;
        self.target = update.target;
        self.version = update.version;
        self.enabled = update.enabled;
        self.time_hack = update.time_hack;
        self.skip_crc = update.skip_crc;
        self.skip_now_load = update.skip_now_load;
        self.send_timeout = update.send_timeout;

        if self.target != Target::Naomi {
            // Settings and SRAM assignments only mean something on NAOMI.
            for value in self.settings.values_mut() {
                *value = None;
            }
            for value in self.srams.values_mut() {
                *value = None;
            }
        }

        if rebuild {
            self.host.shutdown().await;
            let config = HostConfig {
                ip: self.ip.clone(),
                target: self.target,
                version: self.version,
                send_timeout: self.send_timeout,
                time_hack: self.time_hack,
                skip_crc: self.skip_crc,
                skip_now_load: self.skip_now_load,
            };
            self.host = Host::new(config);
        }
    }

    /// Commanded power state; authoritative only when an outlet exists.
    pub fn power_state(&self) -> PowerState {
        self.power_state
    }

    /// Read back the outlet. Without an outlet this mirrors the last
    /// command.
    pub async fn read_power_state(&self) -> PowerState {
        match self.outlet_driver.clone() {
            Some(driver) => tokio::task::spawn_blocking(move || driver.read_state())
                .await
                .unwrap_or(PowerState::Unknown),
            None => self.power_state,
        }
    }

    /// Drive the outlet and record the commanded state. Cutting power
    /// terminates any transfer and marks the host offline immediately.
    pub async fn set_power_state(&mut self, on: bool) {
        self.write_outlet(on).await;
        self.power_state = if on { PowerState::On } else { PowerState::Off };
        if !on {
            self.host.force_offline().await;
        }
    }

    async fn write_outlet(&self, on: bool) -> bool {
        let Some(driver) = self.outlet_driver.clone() else {
            return false;
        };
        match tokio::task::spawn_blocking(move || driver.write_state(on)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(ip = %self.ip, err = %e, "outlet write failed");
                false
            }
            Err(e) => {
                tracing::debug!(ip = %self.ip, err = %e, "outlet write panicked");
                false
            }
        }
    }

    fn transition(&mut self, state: CabinetState, message: String) {
        tracing::info!("{message}");
        self.last_message = Some(message);
        self.state = state;
    }

    /// Advance the automaton one heartbeat.
    pub async fn tick(&mut self) {
        self.host.tick().await;
        if !self.enabled {
            return;
        }

        let alive = self.host.alive().await;

        // Losing liveness in any post-power-on state re-arms the machine;
        // an in-flight transfer is force-terminated.
        if !alive
            && matches!(
                self.state,
                CabinetState::WaitForCabinetPowerOff
                    | CabinetState::SendCurrentGame
                    | CabinetState::WaitForCurrentGame
                    | CabinetState::CheckCurrentGame
            )
        {
            self.host.force_offline().await;
            self.last_sent = None;
            self.transition(
                CabinetState::WaitForCabinetPowerOn,
                format!("Cabinet {} turned off, waiting for power on.", self.ip),
            );
            return;
        }

        match self.state {
            CabinetState::Startup => {
                self.transition(
                    CabinetState::WaitForCabinetPowerOn,
                    format!("Cabinet {} waiting for power on.", self.ip),
                );
            }
            CabinetState::WaitForCabinetPowerOn => {
                if self.controllable && self.power_state == PowerState::On {
                    self.write_outlet(true).await;
                }
                if alive {
                    match self.filename.clone() {
                        None => self.transition(
                            CabinetState::WaitForCabinetPowerOff,
                            format!(
                                "Cabinet {} has no associated game, waiting for power off.",
                                self.ip
                            ),
                        ),
                        Some(filename) => {
                            self.transition(
                                CabinetState::SendCurrentGame,
                                format!("Cabinet {} sending game {filename}.", self.ip),
                            );
                            self.start_send(&filename).await;
                        }
                    }
                }
            }
            CabinetState::SendCurrentGame => match self.filename.clone() {
                Some(filename) if alive => self.start_send(&filename).await,
                Some(_) => {}
                None => self.state = CabinetState::WaitForCabinetPowerOff,
            },
            CabinetState::WaitForCurrentGame => match self.host.status().await {
                HostStatus::Completed => {
                    self.transition(
                        CabinetState::CheckCurrentGame,
                        format!("Cabinet {} finished sending game, checking it.", self.ip),
                    );
                }
                HostStatus::Failed => {
                    let reason = self.host.failure_reason().await.unwrap_or_default();
                    self.transition(
                        CabinetState::WaitForCabinetPowerOn,
                        format!("Cabinet {} failed to send game: {reason}.", self.ip),
                    );
                }
                _ => {}
            },
            CabinetState::CheckCurrentGame => {
                match self.host.info().await {
                    Some(info) => tracing::info!(
                        ip = %self.ip,
                        firmware = %info.firmware_version,
                        crc = %format!("{:08x}", info.current_game_crc),
                        "game active on DIMM"
                    ),
                    None => tracing::debug!(ip = %self.ip, "board gave no info after send"),
                }
                self.last_sent = self.filename.clone();
                self.transition(
                    CabinetState::WaitForCabinetPowerOff,
                    format!("Cabinet {} game active, waiting for power off.", self.ip),
                );
            }
            CabinetState::WaitForCabinetPowerOff => {
                if self.filename != self.last_sent && self.power_cycle {
                    self.transition(
                        CabinetState::WaitForCabinetDisconnect,
                        format!("Cabinet {} game changed, power cycling.", self.ip),
                    );
                    self.write_outlet(false).await;
                    self.power_state = PowerState::Off;
                    // Stale probe successes must not survive the cycle.
                    self.host.reset_prober().await;
                }
            }
            CabinetState::WaitForCabinetDisconnect => {
                if !alive {
                    self.write_outlet(true).await;
                    self.power_state = PowerState::On;
                    self.last_sent = None;
                    self.transition(
                        CabinetState::WaitForCabinetPowerOn,
                        format!("Cabinet {} powered off, turning power back on.", self.ip),
                    );
                }
            }
        }
    }

    async fn start_send(&mut self, filename: &str) {
        let patches = self.patches.get(filename).cloned().unwrap_or_default();
        let mut settings = HashMap::new();
        if self.target == Target::Naomi {
            if let Some(Some(blob)) = self.settings.get(filename) {
                settings.insert(SettingsKind::Eeprom, blob.clone());
            }
            if let Some(Some(path)) = self.srams.get(filename) {
                match std::fs::read(path) {
                    Ok(bytes) => {
                        settings.insert(SettingsKind::Sram, bytes);
                    }
                    Err(e) => {
                        tracing::warn!(ip = %self.ip, sram = %path, err = %e, "skipping unreadable SRAM file");
                    }
                }
            }
        }
        match self.host.send(filename, patches, settings).await {
            Ok(()) => self.state = CabinetState::WaitForCurrentGame,
            Err(e) => {
                tracing::warn!(ip = %self.ip, err = %e, "could not start transfer");
            }
        }
    }

    /// Snapshot the persisted record.
    pub fn to_config(&self) -> CabinetConfig {
        CabinetConfig {
            ip: self.ip.clone(),
            description: self.description.clone(),
            region: self.region,
            target: self.target,
            version: self.version,
            enabled: self.enabled,
            controllable: self.controllable,
            time_hack: self.time_hack,
            skip_crc: self.skip_crc,
            skip_now_load: self.skip_now_load,
            power_cycle: self.power_cycle,
            send_timeout: self.send_timeout,
            outlet: self.outlet.clone(),
            filename: self.filename.clone(),
            patches: self.patches.clone(),
            settings: self.settings.clone(),
            srams: self.srams.clone(),
        }
    }

    /// Tear down the host (prober and any worker).
    pub async fn shutdown(&self) {
        self.host.shutdown().await;
    }
}

#[cfg(test)]
#[path = "cabinet_tests.rs"]
mod tests;
