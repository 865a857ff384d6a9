// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{spawn_prober, ProbeFn, ProberConfig, DEBOUNCE_SECONDS};
use crate::host::HostInner;
use crate::netdimm::ProtocolVersion;

fn fresh_inner() -> Arc<Mutex<HostInner>> {
    Arc::new(Mutex::new(HostInner {
        alive: false,
        probe_reset: false,
        worker: None,
        last_progress: (-1, -1),
        last_status: None,
        last_failure: None,
    }))
}

/// Probe that replays a scripted sequence, then repeats its final answer.
fn scripted(sequence: &[bool]) -> ProbeFn {
    let queue: Arc<StdMutex<VecDeque<bool>>> =
        Arc::new(StdMutex::new(sequence.iter().copied().collect()));
    let last = *sequence.last().unwrap_or(&false);
    Arc::new(move || {
        let queue = Arc::clone(&queue);
        Box::pin(async move {
            let mut guard = queue.lock().unwrap();
            guard.pop_front().unwrap_or(last)
        })
    })
}

fn config(ip: &str) -> ProberConfig {
    ProberConfig { ip: ip.to_owned(), version: ProtocolVersion::V4_01, time_hack: false }
}

async fn settle(inner: &Arc<Mutex<HostInner>>, want: bool) -> bool {
    for _ in 0..60 {
        if inner.lock().await.alive == want {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    false
}

#[tokio::test(start_paused = true)]
async fn alive_flips_only_after_debounce() {
    let inner = fresh_inner();
    let cancel = CancellationToken::new();
    let prober = spawn_prober(config("1.2.3.4"), Arc::clone(&inner), scripted(&[true]), cancel.clone());

    assert!(settle(&inner, true).await);
    cancel.cancel();
    prober.abort();
}

#[tokio::test(start_paused = true)]
async fn single_flap_does_not_flip_the_flag() {
    let inner = fresh_inner();
    let cancel = CancellationToken::new();
    // Confirmed up, one dropped probe, then up again.
    let sequence = [true, true, true, false, true, true, true, true];
    let prober = spawn_prober(config("1.2.3.4"), Arc::clone(&inner), scripted(&sequence), cancel.clone());

    assert!(settle(&inner, true).await);
    // Ride through the flap: the flag must never drop.
    for _ in 0..(sequence.len() as u32 + DEBOUNCE_SECONDS) {
        assert!(inner.lock().await.alive);
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    cancel.cancel();
    prober.abort();
}

#[tokio::test(start_paused = true)]
async fn sustained_failures_mark_down() {
    let inner = fresh_inner();
    let cancel = CancellationToken::new();
    let sequence = [true, true, true, false, false, false, false];
    let prober = spawn_prober(config("1.2.3.4"), Arc::clone(&inner), scripted(&sequence), cancel.clone());

    assert!(settle(&inner, true).await);
    assert!(settle(&inner, false).await);
    cancel.cancel();
    prober.abort();
}

#[tokio::test(start_paused = true)]
async fn reset_discards_accumulated_successes() {
    let inner = fresh_inner();
    let cancel = CancellationToken::new();
    let prober = spawn_prober(config("1.2.3.4"), Arc::clone(&inner), scripted(&[true]), cancel.clone());

    assert!(settle(&inner, true).await);

    // A reset zeroes both counters; the flag itself only moves on a full
    // contrary debounce, which never comes here.
    inner.lock().await.probe_reset = true;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    let guard = inner.lock().await;
    assert!(guard.alive);
    assert!(!guard.probe_reset, "prober should have consumed the reset");
    cancel.cancel();
    prober.abort();
}

#[tokio::test(start_paused = true)]
async fn probing_pauses_during_active_transfer() {
    let inner = fresh_inner();
    {
        let mut guard = inner.lock().await;
        // Worker handle present and no terminal status: transferring.
        let (_tx, rx) = tokio::sync::mpsc::channel(1);
        guard.worker = Some(crate::host::WorkerHandle::for_tests(
            tokio::spawn(async {
                std::future::pending::<()>().await;
            }),
            rx,
        ));
    }
    let cancel = CancellationToken::new();
    let prober = spawn_prober(config("1.2.3.4"), Arc::clone(&inner), scripted(&[true]), cancel.clone());

    for _ in 0..(DEBOUNCE_SECONDS * 4) {
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!inner.lock().await.alive);
    }
    cancel.cancel();
    prober.abort();
}

#[tokio::test(start_paused = true)]
async fn time_hack_failures_never_influence_liveness() {
    let inner = fresh_inner();
    let cancel = CancellationToken::new();
    // Nothing listens on this port, so every watchdog refresh fails.
    let config = ProberConfig {
        ip: "127.0.0.1:1".to_owned(),
        version: ProtocolVersion::V4_01,
        time_hack: true,
    };
    let prober = spawn_prober(config, Arc::clone(&inner), scripted(&[true]), cancel.clone());

    assert!(settle(&inner, true).await);
    for _ in 0..15 {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert!(inner.lock().await.alive);
    cancel.cancel();
    prober.abort();
}
