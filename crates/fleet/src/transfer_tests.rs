// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::{prepare_image, spawn_transfer, TransferJob, TransferMessage};
use crate::netdimm::{self, ProtocolVersion, Target};
use crate::settings::{SettingsKind, EEPROM_SIZE};
use crate::test_support::spawn_fake_dimm;

fn job(ip: &str, filename: &str) -> TransferJob {
    TransferJob {
        ip: ip.to_owned(),
        filename: filename.to_owned(),
        patches: Vec::new(),
        settings: HashMap::new(),
        target: Target::Naomi,
        version: ProtocolVersion::V4_01,
        send_timeout: Some(5),
        skip_crc: false,
        skip_now_load: true,
    }
}

async fn drain(mut rx: tokio::sync::mpsc::Receiver<TransferMessage>) -> Vec<TransferMessage> {
    let mut all = Vec::new();
    while let Some(msg) = rx.recv().await {
        all.push(msg);
    }
    all
}

#[tokio::test]
async fn worker_emits_progress_then_single_terminal_success() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("game.bin");
    std::fs::write(&image, vec![0x7Eu8; 0x11000])?;
    let (addr, server) = spawn_fake_dimm(0).await;

    let (task, rx) = spawn_transfer(job(&addr, &image.to_string_lossy()), CancellationToken::new());
    let messages = drain(rx).await;
    task.await?;

    let terminal_at = messages.len() - 1;
    assert_eq!(messages[terminal_at], TransferMessage::Success);
    let progress: Vec<(i64, i64)> = messages[..terminal_at]
        .iter()
        .filter_map(|m| match m {
            TransferMessage::Progress(sent, total) => Some((*sent, *total)),
            _ => None,
        })
        .collect();
    // Nothing but progress precedes the terminal message.
    assert_eq!(progress.len(), terminal_at);
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|p| p[0].0 <= p[1].0));
    assert!(progress.iter().all(|(_, total)| *total == 0x11000));
    server.abort();
    Ok(())
}

#[tokio::test]
async fn missing_image_is_a_failure_not_a_hang() {
    let (task, rx) = spawn_transfer(job("127.0.0.1:1", "/does/not/exist.bin"), CancellationToken::new());
    let messages = drain(rx).await;
    let _ = task.await;
    assert_eq!(messages.len(), 1);
    assert!(matches!(&messages[0], TransferMessage::Failure(reason) if reason.contains("not found")));
}

#[tokio::test]
async fn crc_mismatch_reason_is_verbatim() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("game.bin");
    std::fs::write(&image, vec![0x01u8; 4096])?;
    let (addr, server) = spawn_fake_dimm(99).await;

    let (task, rx) = spawn_transfer(job(&addr, &image.to_string_lossy()), CancellationToken::new());
    let messages = drain(rx).await;
    let _ = task.await;

    assert_eq!(messages.last(), Some(&TransferMessage::Failure("CRC mismatch".to_owned())));
    server.abort();
    Ok(())
}

#[tokio::test]
async fn cancelled_worker_goes_silent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("game.bin");
    std::fs::write(&image, vec![0x01u8; 4096])?;
    let (addr, server) = spawn_fake_dimm(0).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (task, rx) = spawn_transfer(job(&addr, &image.to_string_lossy()), cancel);
    let messages = drain(rx).await;
    let _ = task.await;

    // No terminal message: the parent revoked the transfer before the
    // first progress callback ran.
    assert!(messages.iter().all(|m| matches!(m, TransferMessage::Progress(..))));
    server.abort();
    Ok(())
}

#[tokio::test]
async fn settings_change_the_transmitted_crc() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let image = dir.path().join("game.bin");
    std::fs::write(&image, vec![0u8; 0x1000])?;
    let path = image.to_string_lossy().into_owned();

    let plain = netdimm::crc(&mut prepare_image(&path, &[], &HashMap::new(), Target::Naomi)?)?;

    let mut settings = HashMap::new();
    settings.insert(SettingsKind::Eeprom, vec![0xAB; EEPROM_SIZE]);
    let spliced = netdimm::crc(&mut prepare_image(&path, &[], &settings, Target::Naomi)?)?;
    assert_ne!(plain, spliced);

    // Non-NAOMI targets ignore settings.
    let chihiro = netdimm::crc(&mut prepare_image(&path, &[], &settings, Target::Chihiro)?)?;
    assert_eq!(plain, chihiro);
    Ok(())
}
