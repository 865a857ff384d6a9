// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::netdimm::{CMD_GET_INFORMATION, CMD_UPLOAD};

/// A local stand-in for a DIMM board's control port.
///
/// Accepts connections, consumes upload packets while accumulating the
/// stream CRC, and answers info queries. `crc_skew` is added to the
/// reported game CRC so tests can force a mismatch.
pub(crate) async fn spawn_fake_dimm(crc_skew: u32) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let mut hasher = crc32fast::Hasher::new();
            loop {
                let mut header = [0u8; 4];
                if stream.read_exact(&mut header).await.is_err() {
                    break;
                }
                let len = u16::from_le_bytes([header[2], header[3]]) as usize;
                let mut payload = vec![0u8; len];
                if stream.read_exact(&mut payload).await.is_err() {
                    break;
                }
                match header[0] {
                    CMD_UPLOAD => {
                        // Skip the 4-byte offset prefix.
                        hasher.update(&payload[4..]);
                    }
                    CMD_GET_INFORMATION => {
                        let crc = hasher.clone().finalize().wrapping_add(crc_skew);
                        let mut body = Vec::with_capacity(16);
                        body.extend_from_slice(&0x0401u16.to_le_bytes());
                        body.extend_from_slice(&[0, 0]);
                        body.extend_from_slice(&512u32.to_le_bytes());
                        body.extend_from_slice(&(512u32 * 1024 * 1024).to_le_bytes());
                        body.extend_from_slice(&crc.to_le_bytes());
                        let mut packet = vec![CMD_GET_INFORMATION, 0];
                        packet.extend_from_slice(&(body.len() as u16).to_le_bytes());
                        packet.extend_from_slice(&body);
                        if stream.write_all(&packet).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    });

    (addr, handle)
}
