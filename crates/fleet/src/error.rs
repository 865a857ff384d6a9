// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors produced by the cabinet control core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    /// ICMP/SNMP/DIMM network failure.
    Transport(String),
    /// The DIMM returned something malformed.
    Protocol(String),
    /// A patch directive was invalid or did not apply.
    Patch(String),
    /// The DIMM reported a different CRC than we computed.
    CrcMismatch,
    /// A transfer is already in flight on this host.
    HostBusy,
    /// Progress was requested while the sentinel is in place.
    NoActiveTransfer,
    /// Startup or persisted configuration is invalid.
    Config(String),
    /// A cabinet, file, or directory was not found.
    NotFound(String),
}

impl FleetError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Patch(_) => "PATCH_ERROR",
            Self::CrcMismatch => "CRC_MISMATCH",
            Self::HostBusy => "HOST_BUSY",
            Self::NoActiveTransfer => "NO_ACTIVE_TRANSFER",
            Self::Config(_) => "CONFIG_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Patch(msg) => write!(f, "patch error: {msg}"),
            Self::CrcMismatch => f.write_str("CRC mismatch"),
            Self::HostBusy => f.write_str("host has active transfer already"),
            Self::NoActiveTransfer => f.write_str("there is no active transfer"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::NotFound(what) => write!(f, "not found: {what}"),
        }
    }
}

impl std::error::Error for FleetError {}

impl From<std::io::Error> for FleetError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
