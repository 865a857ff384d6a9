// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Isolated transfer worker.
//!
//! One transfer = one spawned task owning the image window, the patch
//! pipeline, and the DIMM connection. The controller holds only the
//! consumer side of the progress channel and a cancellation token; it can
//! abort the task at any time without cooperation, and every DIMM await
//! inside carries a hard timeout.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::netdimm::{self, NetDimm, ProtocolVersion, Target};
use crate::patch;
use crate::settings::{SettingsKind, SettingsPatcher};
use crate::window::ImageWindow;

/// Messages published on the progress channel.
///
/// Zero or more `Progress` messages are followed by exactly one terminal
/// `Success` or `Failure`. Intermediate progress may be coalesced under
/// back-pressure; terminal messages are never dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMessage {
    Progress(i64, i64),
    Success,
    Failure(String),
}

/// Everything a worker needs to run one transfer.
#[derive(Debug, Clone)]
pub struct TransferJob {
    pub ip: String,
    pub filename: String,
    pub patches: Vec<String>,
    pub settings: HashMap<SettingsKind, Vec<u8>>,
    pub target: Target,
    pub version: ProtocolVersion,
    pub send_timeout: Option<u64>,
    pub skip_crc: bool,
    pub skip_now_load: bool,
}

/// Channel depth for progress coalescing.
const PROGRESS_DEPTH: usize = 64;

/// Open the image and run the full patch pipeline: patch files in list
/// order, then EEPROM, then SRAM splice. Non-NAOMI targets ignore
/// settings entirely.
pub(crate) fn prepare_image(
    filename: &str,
    patches: &[String],
    settings: &HashMap<SettingsKind, Vec<u8>>,
    target: Target,
) -> Result<ImageWindow> {
    let mut window = ImageWindow::open(filename)?;
    patch::apply_files(&mut window, patches)?;
    if target == Target::Naomi {
        if let Some(blob) = settings.get(&SettingsKind::Eeprom) {
            SettingsPatcher::new(&mut window).put_eeprom(blob)?;
        }
        if let Some(blob) = settings.get(&SettingsKind::Sram) {
            SettingsPatcher::new(&mut window).put_sram(blob)?;
        }
    }
    Ok(window)
}

/// Spawn a transfer worker. Returns the task handle and the consumer side
/// of its progress channel.
pub(crate) fn spawn_transfer(
    job: TransferJob,
    cancel: CancellationToken,
) -> (JoinHandle<()>, mpsc::Receiver<TransferMessage>) {
    let (tx, rx) = mpsc::channel(PROGRESS_DEPTH);
    let task = tokio::spawn(run(job, tx, cancel));
    (task, rx)
}

async fn run(job: TransferJob, tx: mpsc::Sender<TransferMessage>, cancel: CancellationToken) {
    let ip = job.ip.clone();
    let result = transfer(job, &tx, &cancel).await;

    // The parent disappeared or terminated us; nobody is listening, so
    // exit without a terminal message.
    if cancel.is_cancelled() || tx.is_closed() {
        return;
    }

    match result {
        Ok(()) => {
            let _ = tx.send(TransferMessage::Success).await;
        }
        Err(e) => {
            tracing::debug!(ip = %ip, err = %e, "transfer worker failed");
            let _ = tx.send(TransferMessage::Failure(e.to_string())).await;
        }
    }
}

async fn transfer(
    job: TransferJob,
    tx: &mpsc::Sender<TransferMessage>,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut window = prepare_image(&job.filename, &job.patches, &job.settings, job.target)?;

    let timeout = Duration::from_secs(job.send_timeout.unwrap_or(netdimm::DEFAULT_TIMEOUT_SECS));
    let dimm = NetDimm::new(job.ip.clone(), job.version, timeout);
    dimm.send(
        &mut window,
        &mut |sent, total| {
            if cancel.is_cancelled() || tx.is_closed() {
                return false;
            }
            // Coalesce: a full channel drops this datum, never the terminal.
            let _ = tx.try_send(TransferMessage::Progress(sent as i64, total as i64));
            true
        },
        job.skip_crc,
        job.skip_now_load,
    )
    .await
}

#[cfg(test)]
#[path = "transfer_tests.rs"]
mod tests;
