// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-cabinet host controller.
//!
//! Serializes every control operation against at-most-one active transfer
//! behind a single mutex, and exposes the debounced liveness flag, sticky
//! transfer status, and last observed progress.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::Receiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{FleetError, Result};
use crate::netdimm::{self, NetDimm, NetDimmInfo, ProtocolVersion, Target};
use crate::prober::{self, ProbeFn, ProberConfig};
use crate::settings::SettingsKind;
use crate::transfer::{self, TransferJob, TransferMessage};

/// Timeout for one-shot DIMM operations (reboot, wipe, info).
const ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transfer status as seen by callers. Terminal values are sticky until
/// the next `send` supersedes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Inactive,
    Transferring,
    Completed,
    Failed,
}

pub(crate) struct WorkerHandle {
    task: JoinHandle<()>,
    rx: Receiver<TransferMessage>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("task", &self.task)
            .field("cancel", &self.cancel)
            .finish()
    }
}

#[cfg(test)]
impl WorkerHandle {
    pub(crate) fn for_tests(task: JoinHandle<()>, rx: Receiver<TransferMessage>) -> Self {
        Self { task, rx, cancel: CancellationToken::new() }
    }
}

/// State guarded by the controller mutex.
#[derive(Debug)]
pub(crate) struct HostInner {
    pub(crate) alive: bool,
    pub(crate) probe_reset: bool,
    pub(crate) worker: Option<WorkerHandle>,
    pub(crate) last_progress: (i64, i64),
    pub(crate) last_status: Option<HostStatus>,
    pub(crate) last_failure: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub ip: String,
    pub target: Target,
    pub version: ProtocolVersion,
    pub send_timeout: Option<u64>,
    pub time_hack: bool,
    pub skip_crc: bool,
    pub skip_now_load: bool,
}

#[derive(Debug)]
pub struct Host {
    pub ip: String,
    pub target: Target,
    pub version: ProtocolVersion,
    pub send_timeout: Option<u64>,
    pub skip_crc: bool,
    pub skip_now_load: bool,
    pub(crate) inner: Arc<Mutex<HostInner>>,
    cancel: CancellationToken,
    prober: JoinHandle<()>,
}

impl Host {
    /// Construct a host and start its prober.
    pub fn new(config: HostConfig) -> Self {
        let probe = prober::icmp_probe(&config.ip);
        Self::with_probe(config, probe)
    }

    pub(crate) fn with_probe(config: HostConfig, probe: ProbeFn) -> Self {
        let inner = Arc::new(Mutex::new(HostInner {
            alive: false,
            probe_reset: false,
            worker: None,
            last_progress: (-1, -1),
            last_status: None,
            last_failure: None,
        }));
        let cancel = CancellationToken::new();
        let prober = prober::spawn_prober(
            ProberConfig {
                ip: config.ip.clone(),
                version: config.version,
                time_hack: config.time_hack,
            },
            Arc::clone(&inner),
            probe,
            cancel.clone(),
        );
        Self {
            ip: config.ip,
            target: config.target,
            version: config.version,
            send_timeout: config.send_timeout,
            skip_crc: config.skip_crc,
            skip_now_load: config.skip_now_load,
            inner,
            cancel,
            prober,
        }
    }

    /// Start a transfer. Blocks the caller only until the worker produces
    /// its first message, then hands follow-up to `tick`.
    pub async fn send(
        &self,
        filename: &str,
        patches: Vec<String>,
        settings: HashMap<SettingsKind, Vec<u8>>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.worker.is_some() {
            return Err(FleetError::HostBusy);
        }
        inner.last_progress = (-1, -1);
        inner.last_status = None;
        inner.last_failure = None;
        tracing::info!(
            ip = %self.ip,
            file = %filename,
            skip_crc = self.skip_crc,
            "host started sending image"
        );

        let job = TransferJob {
            ip: self.ip.clone(),
            filename: filename.to_owned(),
            patches,
            settings,
            target: self.target,
            version: self.version,
            send_timeout: self.send_timeout,
            skip_crc: self.skip_crc,
            skip_now_load: self.skip_now_load,
        };
        let cancel = self.cancel.child_token();
        let (task, rx) = transfer::spawn_transfer(job, cancel.clone());
        inner.worker = Some(WorkerHandle { task, rx, cancel });

        while inner.last_progress == (-1, -1) && inner.worker.is_some() {
            let msg = match inner.worker.as_mut() {
                Some(worker) => worker.rx.recv().await,
                None => break,
            };
            match msg {
                Some(msg) => Self::apply(&self.ip, &mut inner, msg),
                None => Self::reap(&self.ip, &mut inner, "terminated"),
            }
        }
        Ok(())
    }

    /// Drain all currently-available worker messages without blocking.
    pub async fn tick(&self) {
        let mut inner = self.inner.lock().await;
        self.drain_available(&mut inner);
    }

    fn drain_available(&self, inner: &mut HostInner) {
        loop {
            let msg = match inner.worker.as_mut() {
                None => return,
                Some(worker) => match worker.rx.try_recv() {
                    Ok(msg) => Some(msg),
                    Err(TryRecvError::Empty) => return,
                    Err(TryRecvError::Disconnected) => None,
                },
            };
            match msg {
                Some(msg) => Self::apply(&self.ip, inner, msg),
                None => Self::reap(&self.ip, inner, "terminated"),
            }
        }
    }

    fn apply(ip: &str, inner: &mut HostInner, msg: TransferMessage) {
        match msg {
            TransferMessage::Progress(sent, total) => {
                inner.last_progress = (sent, total);
            }
            TransferMessage::Success => {
                tracing::info!(ip = %ip, "host succeeded in sending image");
                inner.last_status = Some(HostStatus::Completed);
                inner.last_failure = None;
                inner.last_progress = (-1, -1);
                if let Some(worker) = inner.worker.take() {
                    worker.task.abort();
                }
            }
            TransferMessage::Failure(reason) => {
                tracing::info!(ip = %ip, reason = %reason, "host failed to send image");
                inner.last_status = Some(HostStatus::Failed);
                inner.last_failure = Some(reason);
                inner.last_progress = (-1, -1);
                if let Some(worker) = inner.worker.take() {
                    worker.task.abort();
                }
            }
        }
    }

    /// Tear down a worker that can no longer deliver a terminal message.
    fn reap(ip: &str, inner: &mut HostInner, reason: &str) {
        tracing::info!(ip = %ip, reason = %reason, "discarding transfer worker");
        inner.last_status = Some(HostStatus::Failed);
        inner.last_failure = Some(reason.to_owned());
        inner.last_progress = (-1, -1);
        if let Some(worker) = inner.worker.take() {
            worker.cancel.cancel();
            worker.task.abort();
        }
    }

    /// The debounced prober value.
    pub async fn alive(&self) -> bool {
        self.inner.lock().await.alive
    }

    /// Discard accumulated probe counts on the next prober cycle. Used
    /// when the outlet cycles power, so stale successes don't count.
    pub async fn reset_prober(&self) {
        self.inner.lock().await.probe_reset = true;
    }

    /// Force the host offline: terminate any active transfer, reset the
    /// prober counters, and publish `alive = false` immediately.
    pub async fn force_offline(&self) {
        let mut inner = self.inner.lock().await;
        inner.probe_reset = true;
        inner.alive = false;
        if inner.worker.is_some() {
            Self::reap(&self.ip, &mut inner, "terminated");
        }
    }

    pub async fn status(&self) -> HostStatus {
        let inner = self.inner.lock().await;
        if let Some(status) = inner.last_status {
            status
        } else if inner.worker.is_some() {
            HostStatus::Transferring
        } else {
            HostStatus::Inactive
        }
    }

    /// Last `(sent, total)` observation of the active transfer.
    pub async fn progress(&self) -> Result<(i64, i64)> {
        let inner = self.inner.lock().await;
        if inner.last_progress == (-1, -1) {
            return Err(FleetError::NoActiveTransfer);
        }
        Ok(inner.last_progress)
    }

    pub async fn failure_reason(&self) -> Option<String> {
        self.inner.lock().await.last_failure.clone()
    }

    /// Is a transfer worker currently attached?
    async fn transferring(&self) -> bool {
        self.inner.lock().await.worker.is_some()
    }

    /// Reboot the target. Refuses while a transfer is in flight; transport
    /// errors degrade to `false`. The controller lock is released before
    /// the network round trip so DIMM I/O never blocks the control loop.
    pub async fn reboot(&self) -> bool {
        if self.transferring().await {
            return false;
        }
        NetDimm::new(self.ip.clone(), self.version, ONE_SHOT_TIMEOUT).reboot().await.is_ok()
    }

    /// Wipe the currently loaded game. Same fail-soft rules as `reboot`.
    pub async fn wipe(&self) -> bool {
        if self.transferring().await {
            return false;
        }
        NetDimm::new(self.ip.clone(), self.version, ONE_SHOT_TIMEOUT)
            .wipe_current_game()
            .await
            .is_ok()
    }

    /// Query board info. Empty while transferring or on transport failure.
    pub async fn info(&self) -> Option<NetDimmInfo> {
        if self.transferring().await {
            return None;
        }
        NetDimm::new(self.ip.clone(), self.version, ONE_SHOT_TIMEOUT).info().await.ok()
    }

    /// CRC of the exact byte stream a `send` of this payload would
    /// transmit, computed without network I/O.
    pub fn crc(
        &self,
        filename: &str,
        patches: &[String],
        settings: &HashMap<SettingsKind, Vec<u8>>,
    ) -> Result<u32> {
        let mut window = transfer::prepare_image(filename, patches, settings, self.target)?;
        netdimm::crc(&mut window)
    }

    /// Stop the prober and terminate any worker.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut inner = self.inner.lock().await;
        if let Some(worker) = inner.worker.take() {
            worker.cancel.cancel();
            worker.task.abort();
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.prober.abort();
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
