// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Debounced liveness prober.
//!
//! One background task per host issues ICMP echo at a fixed cadence and
//! flips the published `alive` flag only after enough consecutive
//! agreeing probes. The probe transport is injected as a closure so tests
//! can drive deterministic sequences.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::host::HostInner;
use crate::netdimm::{NetDimm, ProtocolVersion};

/// Consecutive consistent probes required to flip the alive flag.
pub const DEBOUNCE_SECONDS: u32 = 3;

/// Seconds between time-hack refreshes.
const TIME_HACK_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) type ProbeFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

/// ICMP echo through the platform `ping` binary, one packet, one-second
/// deadline.
pub(crate) fn icmp_probe(ip: &str) -> ProbeFn {
    let ip = ip.to_owned();
    Arc::new(move || {
        let ip = ip.clone();
        Box::pin(async move {
            let mut command = tokio::process::Command::new("ping");
            if cfg!(windows) {
                command.args(["-n", "1", "-w", "1000", &ip]);
            } else {
                command.args(["-c1", "-W1", &ip]);
            }
            command
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .await
                .map(|status| status.success())
                .unwrap_or(false)
        })
    })
}

pub(crate) struct ProberConfig {
    pub ip: String,
    pub version: ProtocolVersion,
    pub time_hack: bool,
}

/// Spawn the prober loop for a host.
pub(crate) fn spawn_prober(
    config: ProberConfig,
    inner: Arc<Mutex<HostInner>>,
    probe: ProbeFn,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut success_count: u32 = 0;
        let mut failure_count: u32 = 0;
        let mut last_timehack = tokio::time::Instant::now();

        loop {
            let transferring = {
                let guard = inner.lock().await;
                guard.worker.is_some() && guard.last_status.is_none()
            };

            if !transferring {
                {
                    // Discard stale counts after an explicit power down.
                    let mut guard = inner.lock().await;
                    if guard.probe_reset {
                        guard.probe_reset = false;
                        success_count = 0;
                        failure_count = 0;
                    }
                }

                let alive = probe().await;

                if alive {
                    success_count += 1;
                    failure_count = 0;
                    if success_count >= DEBOUNCE_SECONDS {
                        let mut guard = inner.lock().await;
                        if !guard.alive {
                            tracing::info!(
                                ip = %config.ip,
                                "host started responding to ping, marking up"
                            );
                        }
                        guard.alive = true;
                    }

                    // Keep the play-time watchdog from evicting the game.
                    // Gated on this probe's raw result, not the debounced
                    // flag, so the refresh keeps flowing through the
                    // ramp-up window after a host comes back.
                    if last_timehack.elapsed() >= TIME_HACK_INTERVAL {
                        last_timehack = tokio::time::Instant::now();
                        if config.time_hack {
                            let dimm = NetDimm::new(
                                config.ip.clone(),
                                config.version,
                                Duration::from_secs(5),
                            );
                            if let Err(e) = dimm.set_time_limit(10).await {
                                tracing::debug!(ip = %config.ip, err = %e, "time hack failed");
                            } else {
                                tracing::debug!(ip = %config.ip, "reset time limit with time hack");
                            }
                        }
                    }
                } else {
                    success_count = 0;
                    failure_count += 1;
                    if failure_count >= DEBOUNCE_SECONDS {
                        let mut guard = inner.lock().await;
                        if guard.alive {
                            tracing::info!(
                                ip = %config.ip,
                                "host stopped responding to ping, marking down"
                            );
                        }
                        guard.alive = false;
                    }
                }
            }

            let cadence = if success_count >= DEBOUNCE_SECONDS {
                Duration::from_secs(2)
            } else {
                Duration::from_secs(1)
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(cadence) => {}
            }
        }
    })
}

#[cfg(test)]
#[path = "prober_tests.rs"]
mod tests;
