// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MRF (Most Recently Failed) retry queue (spec §4.9): a short-term, bounded,
//! in-process hedge that gives a just-failed task a few extra attempts before it is
//! left for the external healer. Wires up the `mrf_replica_ch`/`mrf_save_ch` channel
//! fields and `MRFReplicateEntry` type into an actual worker pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::collaborators::Collaborators;
use crate::delete_replicator::replicate_delete;
use crate::object_replicator::replicate_object;
use crate::types::{MRFReplicateEntry, ReplicationTask};

/// One task as it travels through the MRF channel: the task itself plus how many times
/// the MRF queue has already retried it. Never reset by a fresh live-path submission
/// (spec §3 invariant) because a fresh submission with the same dedup key is simply
/// dropped by the Dispatch Engine while this one is in flight.
#[derive(Debug, Clone)]
pub struct MrfRetry {
    pub task: ReplicationTask,
    pub retry_count: u32,
}

impl MrfRetry {
    /// The spec's observable `MRFReplicateEntry` view of this retry, as it would be
    /// reported to an operator or persisted by a fuller implementation.
    pub fn entry(&self) -> MRFReplicateEntry {
        match &self.task {
            ReplicationTask::Object(o) => MRFReplicateEntry {
                bucket: o.bucket.clone(),
                object: o.name.clone(),
                version_id: o.version_id.clone(),
                retry_count: self.retry_count as i32,
                size: o.size,
            },
            ReplicationTask::Delete(d) => MRFReplicateEntry {
                bucket: d.bucket.clone(),
                object: d.object.clone(),
                version_id: d.target_version_id().to_string(),
                retry_count: self.retry_count as i32,
                size: 0,
            },
        }
    }
}

/// Handle to the running MRF worker pool. Cheap to clone — cloning shares the same
/// bounded channel.
#[derive(Clone)]
pub struct MrfQueue {
    tx: mpsc::Sender<MrfRetry>,
}

impl MrfQueue {
    /// Hands a just-failed task to the MRF queue for a bounded retry. Non-blocking: if
    /// the channel itself is full, the entry is dropped exactly like a dispatch queue
    /// overflow (spec §4.6/§4.9) and the task is simply left `FAILED` for the external
    /// healer.
    pub fn offer(&self, task: ReplicationTask) {
        let retry = MrfRetry { task, retry_count: 0 };
        if self.tx.try_send(retry).is_err() {
            warn!("MRF queue full or closed, dropping failed task for external healer");
        }
    }
}

/// Spawns `worker_count` workers draining a bounded MRF channel of `capacity`. Each
/// worker replays a failed task through the same Object/Delete Replicator used on the
/// live path; a task that fails again is resubmitted with an incremented retry count
/// after `backoff`, unless doing so would exceed `max_retries`, in which case it is
/// dropped (spec §8 property 10 / scenario S7).
pub fn spawn_workers(
    worker_count: usize,
    capacity: usize,
    max_retries: u32,
    backoff: Duration,
    collaborators: Arc<Collaborators>,
    cancellation: CancellationToken,
) -> MrfQueue {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    for worker_id in 0..worker_count.max(1) {
        let rx = rx.clone();
        let collaborators = collaborators.clone();
        let cancellation = cancellation.clone();
        let resubmit = tx.clone();
        tokio::spawn(async move {
            loop {
                let retry = {
                    let mut guard = rx.lock().await;
                    tokio::select! {
                        _ = cancellation.cancelled() => return,
                        item = guard.recv() => item,
                    }
                };
                let Some(retry) = retry else { return };
                run_one(&collaborators, retry, max_retries, backoff, &resubmit, worker_id).await;
            }
        });
    }

    MrfQueue { tx }
}

async fn run_one(
    collaborators: &Arc<Collaborators>,
    retry: MrfRetry,
    max_retries: u32,
    backoff: Duration,
    resubmit: &mpsc::Sender<MrfRetry>,
    worker_id: usize,
) {
    let bucket = match &retry.task {
        ReplicationTask::Object(o) => o.bucket.clone(),
        ReplicationTask::Delete(d) => d.bucket.clone(),
    };

    let cfg = match collaborators.config_store.get_replication_config(&bucket).await {
        Ok(Some(cfg)) => cfg,
        _ => {
            warn!(worker = worker_id, bucket = %bucket, "MRF retry abandoned: replication config no longer present");
            return;
        }
    };

    let outcome = match &retry.task {
        ReplicationTask::Object(object) => replicate_object(collaborators, &cfg, object).await.map(|_| ()),
        ReplicationTask::Delete(deleted) => replicate_delete(collaborators, &cfg, deleted).await.map(|_| ()),
    };

    if outcome.is_ok() {
        return;
    }

    let next_retry_count = retry.retry_count + 1;
    if next_retry_count >= max_retries {
        warn!(worker = worker_id, bucket = %bucket, retries = next_retry_count, "MRF retries exhausted, leaving task FAILED for external healer");
        return;
    }

    tokio::time::sleep(backoff).await;
    let next = MrfRetry {
        task: retry.task,
        retry_count: next_retry_count,
    };
    if resubmit.try_send(next).is_err() {
        warn!(worker = worker_id, bucket = %bucket, "MRF queue full while resubmitting retry, dropping");
    }
}
