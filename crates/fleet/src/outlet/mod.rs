// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote power outlet drivers.
//!
//! An outlet is a capability object with a single binary state. Variants
//! differ only in transport; all operations are bounded to a few seconds
//! and fail soft (reads to `Unknown`, writes to an error the caller may
//! ignore). Configuration is a tagged variant validated at ingestion; an
//! invalid config degrades to no outlet at all.

mod np02b;
mod snmp;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

pub use np02b::Np02bOutlet;
pub use snmp::SnmpOutlet;

/// Observed or commanded power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

/// A controllable power receptacle.
pub trait Outlet: Send + Sync {
    /// Read the current state. Unmappable or failed reads are `Unknown`.
    fn read_state(&self) -> PowerState;

    /// Drive the outlet on or off. Idempotent: writing the observed state
    /// is a no-op that still succeeds.
    fn write_state(&self, on: bool) -> Result<()>;
}

fn default_read_community() -> String {
    "public".to_owned()
}

fn default_write_community() -> String {
    "private".to_owned()
}

fn default_community() -> String {
    "public".to_owned()
}

/// Persisted outlet configuration, keyed by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutletConfig {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "snmp")]
    Snmp {
        host: String,
        query_oid: String,
        query_on_value: i64,
        query_off_value: i64,
        update_oid: String,
        update_on_value: i64,
        update_off_value: i64,
        #[serde(default = "default_read_community")]
        read_community: String,
        #[serde(default = "default_write_community")]
        write_community: String,
    },
    #[serde(rename = "ap7900")]
    Ap7900 {
        host: String,
        outlet: u32,
        #[serde(default = "default_read_community")]
        read_community: String,
        #[serde(default = "default_write_community")]
        write_community: String,
    },
    #[serde(rename = "np-02")]
    Np02 {
        host: String,
        outlet: u32,
        #[serde(default = "default_community")]
        community: String,
    },
    #[serde(rename = "np-02b")]
    Np02b { host: String, outlet: u32, username: String, password: String },
}

impl OutletConfig {
    /// Validate per-variant fields.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Snmp { host, query_oid, update_oid, .. } => {
                if host.is_empty() {
                    return Err(FleetError::Config("snmp outlet requires a host".to_owned()));
                }
                snmp::parse_oid(query_oid)?;
                snmp::parse_oid(update_oid)?;
                Ok(())
            }
            Self::Ap7900 { host, outlet, .. } => {
                if host.is_empty() {
                    return Err(FleetError::Config("ap7900 outlet requires a host".to_owned()));
                }
                if !(1..=8).contains(outlet) {
                    return Err(FleetError::Config(format!("ap7900 outlet {outlet} out of bounds")));
                }
                Ok(())
            }
            Self::Np02 { host, outlet, .. } | Self::Np02b { host, outlet, .. } => {
                if host.is_empty() {
                    return Err(FleetError::Config("outlet requires a host".to_owned()));
                }
                if !(1..=2).contains(outlet) {
                    return Err(FleetError::Config(format!("np-02 outlet {outlet} out of bounds")));
                }
                Ok(())
            }
        }
    }

    /// Build the driver for this configuration.
    pub fn driver(&self) -> Arc<dyn Outlet> {
        match self {
            Self::None => Arc::new(NullOutlet),
            Self::Snmp {
                host,
                query_oid,
                query_on_value,
                query_off_value,
                update_oid,
                update_on_value,
                update_off_value,
                read_community,
                write_community,
            } => Arc::new(SnmpOutlet::new(
                host.clone(),
                query_oid.clone(),
                *query_on_value,
                *query_off_value,
                update_oid.clone(),
                *update_on_value,
                *update_off_value,
                read_community.clone(),
                write_community.clone(),
            )),
            Self::Ap7900 { host, outlet, read_community, write_community } => {
                // APC PDUs expose one control OID per outlet index.
                let oid = format!("1.3.6.1.4.1.318.1.1.12.3.3.1.1.4.{outlet}");
                Arc::new(SnmpOutlet::new(
                    host.clone(),
                    oid.clone(),
                    1,
                    2,
                    oid,
                    1,
                    2,
                    read_community.clone(),
                    write_community.clone(),
                ))
            }
            Self::Np02 { host, outlet, community } => {
                let oid = format!("1.3.6.1.4.1.21728.2.4.1.2.1.1.3.{outlet}");
                Arc::new(SnmpOutlet::new(
                    host.clone(),
                    oid.clone(),
                    1,
                    0,
                    oid,
                    1,
                    0,
                    community.clone(),
                    community.clone(),
                ))
            }
            Self::Np02b { host, outlet, username, password } => Arc::new(Np02bOutlet::new(
                host.clone(),
                *outlet,
                username.clone(),
                password.clone(),
            )),
        }
    }
}

/// Validate an optional config at ingestion; invalid configs degrade to
/// no outlet.
pub fn ingest(config: Option<OutletConfig>) -> Option<OutletConfig> {
    match config {
        None | Some(OutletConfig::None) => None,
        Some(config) => match config.validate() {
            Ok(()) => Some(config),
            Err(e) => {
                tracing::warn!(err = %e, "dropping invalid outlet config");
                None
            }
        },
    }
}

/// Absent outlet: reads are unknown, writes succeed without effect.
struct NullOutlet;

impl Outlet for NullOutlet {
    fn read_state(&self) -> PowerState {
        PowerState::Unknown
    }

    fn write_state(&self, _on: bool) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
