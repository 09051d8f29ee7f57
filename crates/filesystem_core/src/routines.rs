//! Background sweeps, grounded on `pkg/fs/routines.go`: a flush sweep that
//! moves ripe cache entries out to the object store, and a cleanup sweep
//! that deletes zip archives past their retention window.

use std::sync::Arc;

use coordination_store::{keys, scan_all};
use futures::FutureExt;
use job_queue::BlockingJobQueue;
use tokio_util::sync::CancellationToken;

use crate::{now_unix, Core, CLEANUP_SWEEP, FLUSH_DELAY, FLUSH_POOL_WIDTH, FLUSH_SWEEP, LOCK_TTL, ZIP_TTL};

/// Runs the flush sweep every `FLUSH_SWEEP`, exiting once `cancellation`
/// fires (checked between ticks, not mid-sweep — an in-progress sweep runs
/// to completion).
pub(crate) async fn run_flush_sweep(core: Arc<Core>, cancellation: CancellationToken) {
    let mut interval = tokio::time::interval(FLUSH_SWEEP);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => flush_sweep_once(&core).await,
            _ = cancellation.cancelled() => return,
        }
    }
}

/// Runs the zip cleanup sweep every `CLEANUP_SWEEP`, exiting once
/// `cancellation` fires.
pub(crate) async fn run_cleanup_sweep(core: Arc<Core>, cancellation: CancellationToken) {
    let mut interval = tokio::time::interval(CLEANUP_SWEEP);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => cleanup_sweep_once(&core).await,
            _ = cancellation.cancelled() => return,
        }
    }
}

/// One pass over every `flush:*` key: flushes entries whose mark is older
/// than `FLUSH_DELAY`, each under a per-file `lock:*` SETNX so a concurrent
/// sweep (or a future multi-instance deployment) can't double-flush the
/// same file (spec.md §4.3 flush sweep).
pub(crate) async fn flush_sweep_once(core: &Arc<Core>) {
    let marks = match scan_all(core.coordination.as_ref(), "flush:*").await {
        Ok(marks) => marks,
        Err(err) => {
            tracing::warn!(%err, "flush sweep: scan failed");
            return;
        },
    };

    let pool = BlockingJobQueue::new(FLUSH_POOL_WIDTH);
    for flush_key in marks {
        let Some((bucket_id, path)) = keys::parse_flush_key(&flush_key) else {
            continue;
        };
        let (bucket_id, path) = (bucket_id.to_owned(), path.to_owned());

        let Ok(Some(ts_str)) = core.coordination.get(&flush_key).await else {
            continue;
        };
        let Ok(marked_at) = ts_str.parse::<i64>() else {
            continue;
        };
        if now_unix() - marked_at < FLUSH_DELAY.as_secs() as i64 {
            continue;
        }

        let lock_key = keys::lock(&bucket_id, &path);
        match core.coordination.set_nx(&lock_key, "1", LOCK_TTL).await {
            Ok(true) => {},
            // Either another sweep holds the lock, or the store is degraded —
            // either way this file waits for next sweep.
            Ok(false) | Err(_) => continue,
        }

        let core = core.clone();
        let flush_key = flush_key.clone();
        pool.add_and_block_if_full(
            async move {
                let result = core.flush_file_to_object_store(&bucket_id, &path).await;
                match &result {
                    Ok(()) => {
                        let _ = core.coordination.del(&flush_key).await;
                    },
                    Err(err) => {
                        tracing::warn!(bucket_id = %bucket_id, path = %path, %err, "flush failed, retrying next sweep");
                    },
                }
                let _ = core.coordination.del(&lock_key).await;
                result.map_err(anyhow::Error::from)
            }
            .boxed(),
        )
        .await;
    }

    // Per-file failures are already logged above; the sweep itself never fails.
    let _ = pool.wait().await;
}

/// One pass over every `zip:*` key: deletes the underlying object (and its
/// bookkeeping key) once it's older than `ZIP_TTL` (spec.md §4.3 cleanup sweep).
pub(crate) async fn cleanup_sweep_once(core: &Arc<Core>) {
    let marks = match scan_all(core.coordination.as_ref(), "zip:*").await {
        Ok(marks) => marks,
        Err(err) => {
            tracing::warn!(%err, "cleanup sweep: scan failed");
            return;
        },
    };

    for zip_key in marks {
        let Some(object_key) = keys::parse_zip_key(&zip_key) else {
            continue;
        };

        let Ok(Some(ts_str)) = core.coordination.get(&zip_key).await else {
            continue;
        };
        let Ok(created_at) = ts_str.parse::<i64>() else {
            continue;
        };
        if now_unix() - created_at <= ZIP_TTL.as_secs() as i64 {
            continue;
        }

        if let Err(err) = core.objects.delete_object(object_key).await {
            tracing::warn!(object_key, %err, "failed to delete expired zip object");
            continue;
        }
        let _ = core.coordination.del(&zip_key).await;
    }
}
