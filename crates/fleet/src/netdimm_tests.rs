// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{crc, NetDimm, ProtocolVersion, Target};
use crate::error::FleetError;
use crate::test_support::spawn_fake_dimm;
use crate::window::ImageWindow;

#[test]
fn version_and_target_serialize_as_wire_strings() -> anyhow::Result<()> {
    assert_eq!(serde_json::to_string(&ProtocolVersion::V4_01)?, "\"4.01\"");
    assert_eq!(serde_json::from_str::<ProtocolVersion>("\"1.07\"")?, ProtocolVersion::V1_07);
    assert_eq!(serde_json::to_string(&Target::Naomi)?, "\"naomi\"");
    Ok(())
}

#[test]
fn crc_matches_flat_crc32_of_edited_stream() -> anyhow::Result<()> {
    let mut w = ImageWindow::from_vec(vec![0x11; 100_000]);
    w.write_at(40_000, &[0xDE, 0xAD]);

    let mut flat = vec![0x11u8; 100_000];
    flat[40_000] = 0xDE;
    flat[40_001] = 0xAD;

    assert_eq!(crc(&mut w)?, crc32fast::hash(&flat));
    Ok(())
}

#[tokio::test]
async fn send_reports_monotone_progress_and_succeeds() -> anyhow::Result<()> {
    let (addr, server) = spawn_fake_dimm(0).await;
    let dimm = NetDimm::new(addr, ProtocolVersion::V4_01, Duration::from_secs(5));

    let mut w = ImageWindow::from_vec(vec![0xA5; 0x12000]);
    let mut seen: Vec<(u64, u64)> = Vec::new();
    dimm.send(
        &mut w,
        &mut |sent, total| {
            seen.push((sent, total));
            true
        },
        false,
        true,
    )
    .await?;

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|p| p[0].0 <= p[1].0));
    assert!(seen.iter().all(|(_, total)| *total == 0x12000));
    assert_eq!(seen.last().map(|(sent, _)| *sent), Some(0x12000));
    server.abort();
    Ok(())
}

#[tokio::test]
async fn send_detects_crc_mismatch() -> anyhow::Result<()> {
    let (addr, server) = spawn_fake_dimm(1).await;
    let dimm = NetDimm::new(addr, ProtocolVersion::V4_01, Duration::from_secs(5));

    let mut w = ImageWindow::from_vec(vec![0x42; 2048]);
    let err = dimm.send(&mut w, &mut |_, _| true, false, true).await.unwrap_err();
    assert_eq!(err, FleetError::CrcMismatch);
    assert_eq!(err.to_string(), "CRC mismatch");
    server.abort();
    Ok(())
}

#[tokio::test]
async fn aborting_callback_stops_transfer() -> anyhow::Result<()> {
    let (addr, server) = spawn_fake_dimm(0).await;
    let dimm = NetDimm::new(addr, ProtocolVersion::V4_01, Duration::from_secs(5));

    let mut w = ImageWindow::from_vec(vec![0x42; 0x20000]);
    let err = dimm.send(&mut w, &mut |_, _| false, true, true).await.unwrap_err();
    assert!(err.to_string().contains("aborted"));
    server.abort();
    Ok(())
}

#[tokio::test]
async fn info_parses_board_state() -> anyhow::Result<()> {
    let (addr, server) = spawn_fake_dimm(7).await;
    let dimm = NetDimm::new(addr, ProtocolVersion::V3_01, Duration::from_secs(5));
    let info = dimm.info().await?;
    assert_eq!(info.firmware_version, ProtocolVersion::V4_01);
    assert_eq!(info.memory_size, 512);
    assert_eq!(info.available_game_memory, 512 * 1024 * 1024);
    assert_eq!(info.current_game_crc, 7);
    server.abort();
    Ok(())
}

#[tokio::test]
async fn unreachable_board_is_transport_error() {
    let dimm = NetDimm::new("127.0.0.1:1", ProtocolVersion::V4_01, Duration::from_millis(500));
    let err = dimm.reboot().await.unwrap_err();
    assert!(matches!(err, FleetError::Transport(_)));
}
