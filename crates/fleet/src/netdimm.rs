// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NetDIMM protocol client.
//!
//! Thin TCP client for the DIMM board's control port. Every network await
//! is wrapped in the session timeout, so a wedged board bounds the caller
//! instead of hanging it.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{FleetError, Result};
use crate::window::ImageWindow;

/// Platform a DIMM board is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Naomi,
    Chihiro,
    Triforce,
}

/// NetDIMM firmware protocol revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "1.07")]
    V1_07,
    #[serde(rename = "2.03")]
    V2_03,
    #[serde(rename = "2.15")]
    V2_15,
    #[serde(rename = "3.01")]
    V3_01,
    #[serde(rename = "4.01")]
    V4_01,
    #[serde(rename = "4.02")]
    V4_02,
}

impl ProtocolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_07 => "1.07",
            Self::V2_03 => "2.03",
            Self::V2_15 => "2.15",
            Self::V3_01 => "3.01",
            Self::V4_01 => "4.01",
            Self::V4_02 => "4.02",
        }
    }

    fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0107 => Some(Self::V1_07),
            0x0203 => Some(Self::V2_03),
            0x0215 => Some(Self::V2_15),
            0x0301 => Some(Self::V3_01),
            0x0401 => Some(Self::V4_01),
            0x0402 => Some(Self::V4_02),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Board state reported by `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetDimmInfo {
    pub firmware_version: ProtocolVersion,
    /// Installed DIMM memory in megabytes.
    pub memory_size: u32,
    /// Memory available to a game image, in bytes.
    pub available_game_memory: u32,
    /// CRC of the currently loaded game.
    pub current_game_crc: u32,
}

const PORT: u16 = 10703;
const CHUNK: usize = 0x8000;

pub(crate) const CMD_UPLOAD: u8 = 0x04;
pub(crate) const CMD_HOST_RESTART: u8 = 0x0A;
pub(crate) const CMD_WIPE: u8 = 0x16;
pub(crate) const CMD_SET_TIME_LIMIT: u8 = 0x17;
pub(crate) const CMD_GET_INFORMATION: u8 = 0x18;
pub(crate) const CMD_SET_INFORMATION: u8 = 0x19;

const FLAG_LAST_CHUNK: u8 = 0x01;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Pure CRC of the byte stream a send of this window would transmit.
pub fn crc(window: &mut ImageWindow) -> Result<u32> {
    let mut hasher = crc32fast::Hasher::new();
    let mut offset = 0u64;
    loop {
        let chunk = window.read_chunk(offset, CHUNK)?;
        if chunk.is_empty() {
            break;
        }
        offset += chunk.len() as u64;
        hasher.update(&chunk);
    }
    Ok(hasher.finalize())
}

pub struct NetDimm {
    ip: String,
    version: ProtocolVersion,
    timeout: Duration,
}

impl NetDimm {
    pub fn new(ip: impl Into<String>, version: ProtocolVersion, timeout: Duration) -> Self {
        Self { ip: ip.into(), version, timeout }
    }

    async fn connect(&self) -> Result<TcpStream> {
        // Addresses may carry an explicit port; the control port is implied
        // otherwise.
        let addr = if self.ip.contains(':') {
            self.ip.clone()
        } else {
            format!("{}:{PORT}", self.ip)
        };
        match tokio::time::timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(FleetError::Transport(format!("connect {addr}: {e}"))),
            Err(_) => Err(FleetError::Transport(format!("connect {addr}: timed out"))),
        }
    }

    async fn write_packet(
        &self,
        stream: &mut TcpStream,
        cmd: u8,
        flags: u8,
        payload: &[u8],
    ) -> Result<()> {
        if payload.len() > u16::MAX as usize {
            return Err(FleetError::Protocol(format!("oversized packet: {}", payload.len())));
        }
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u8(cmd);
        buf.put_u8(flags);
        buf.put_u16_le(payload.len() as u16);
        buf.put_slice(payload);
        match tokio::time::timeout(self.timeout, stream.write_all(&buf)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FleetError::Transport(format!("write: {e}"))),
            Err(_) => Err(FleetError::Transport("write timed out".to_owned())),
        }
    }

    async fn read_packet(&self, stream: &mut TcpStream) -> Result<(u8, Vec<u8>)> {
        let mut header = [0u8; 4];
        match tokio::time::timeout(self.timeout, stream.read_exact(&mut header)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(FleetError::Transport(format!("read: {e}"))),
            Err(_) => return Err(FleetError::Transport("read timed out".to_owned())),
        }
        let cmd = header[0];
        let len = u16::from_le_bytes([header[2], header[3]]) as usize;
        let mut payload = vec![0u8; len];
        match tokio::time::timeout(self.timeout, stream.read_exact(&mut payload)).await {
            Ok(Ok(_)) => Ok((cmd, payload)),
            Ok(Err(e)) => Err(FleetError::Transport(format!("read: {e}"))),
            Err(_) => Err(FleetError::Transport("read timed out".to_owned())),
        }
    }

    /// Stream the window to the board. `progress` is invoked after every
    /// chunk with `(sent, total)`; returning `false` aborts the transfer.
    pub async fn send(
        &self,
        window: &mut ImageWindow,
        progress: &mut (dyn FnMut(u64, u64) -> bool + Send),
        disable_crc_check: bool,
        disable_now_loading: bool,
    ) -> Result<()> {
        let total = window.len();
        let mut stream = self.connect().await?;
        let mut hasher = crc32fast::Hasher::new();
        let mut sent = 0u64;

        while sent < total {
            let chunk = window.read_chunk(sent, CHUNK)?;
            if chunk.is_empty() {
                return Err(FleetError::Protocol(format!("window exhausted at {sent:#x}")));
            }
            hasher.update(&chunk);
            let next = sent + chunk.len() as u64;
            let flags = if next >= total { FLAG_LAST_CHUNK } else { 0 };
            let mut payload = BytesMut::with_capacity(4 + chunk.len());
            payload.put_u32_le(sent as u32);
            payload.put_slice(&chunk);
            self.write_packet(&mut stream, CMD_UPLOAD, flags, &payload).await?;
            sent = next;
            if !progress(sent, total) {
                return Err(FleetError::Transport("transfer aborted".to_owned()));
            }
        }

        let image_crc = hasher.finalize();
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u32_le(image_crc);
        payload.put_u32_le(total as u32);
        self.write_packet(&mut stream, CMD_SET_INFORMATION, 0, &payload).await?;

        if !disable_crc_check {
            let info = self.info_on(&mut stream).await?;
            if info.current_game_crc != image_crc {
                return Err(FleetError::CrcMismatch);
            }
        }

        if !disable_now_loading {
            self.write_packet(&mut stream, CMD_HOST_RESTART, 0, &[]).await?;
        }

        Ok(())
    }

    /// Reboot the target into the loaded game.
    pub async fn reboot(&self) -> Result<()> {
        let mut stream = self.connect().await?;
        self.write_packet(&mut stream, CMD_HOST_RESTART, 0, &[]).await
    }

    /// Drop the currently loaded game from DIMM memory.
    pub async fn wipe_current_game(&self) -> Result<()> {
        let mut stream = self.connect().await?;
        self.write_packet(&mut stream, CMD_WIPE, 0, &[]).await
    }

    /// Extend the play-time watchdog.
    pub async fn set_time_limit(&self, minutes: u32) -> Result<()> {
        let mut stream = self.connect().await?;
        self.write_packet(&mut stream, CMD_SET_TIME_LIMIT, 0, &minutes.to_le_bytes()).await
    }

    /// Query firmware and memory state.
    pub async fn info(&self) -> Result<NetDimmInfo> {
        let mut stream = self.connect().await?;
        self.info_on(&mut stream).await
    }

    async fn info_on(&self, stream: &mut TcpStream) -> Result<NetDimmInfo> {
        self.write_packet(stream, CMD_GET_INFORMATION, 0, &[]).await?;
        let (cmd, payload) = self.read_packet(stream).await?;
        if cmd != CMD_GET_INFORMATION || payload.len() < 16 {
            return Err(FleetError::Protocol(format!(
                "unexpected info response: cmd {cmd:#04x}, {} bytes",
                payload.len()
            )));
        }
        let code = u16::from_le_bytes([payload[0], payload[1]]);
        Ok(NetDimmInfo {
            firmware_version: ProtocolVersion::from_code(code).unwrap_or(self.version),
            memory_size: u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]),
            available_game_memory: u32::from_le_bytes([
                payload[8],
                payload[9],
                payload[10],
                payload[11],
            ]),
            current_game_crc: u32::from_le_bytes([
                payload[12],
                payload[13],
                payload[14],
                payload[15],
            ]),
        })
    }
}

#[cfg(test)]
#[path = "netdimm_tests.rs"]
mod tests;
