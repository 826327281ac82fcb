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

//! Dispatch Engine (spec §4.6): two bounded queues (object, delete) drained by a fixed
//! worker pool, each task looked up against its bucket's replication config and handed
//! to the Object or Delete Replicator. Submission is always non-blocking: a full queue
//! or a duplicate already-queued task is dropped rather than awaited (spec §8 property
//! #9/#11), leaving the MRF queue and the external healer to pick it back up. Worker-
//! count/queue-depth fields and `AtomicUsize` in-flight counters generalized from a
//! single hard-coded bucket/target loop into a queue fed by any bucket's rules.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collaborators::Collaborators;
use crate::config::CoreConfig;
use crate::delete_replicator::replicate_delete;
use crate::mrf::{self, MrfQueue};
use crate::object_replicator::replicate_object;
use crate::resync::{ResyncManager, TaskEnqueuer};
use crate::types::{DeletedObjectDescriptor, ObjectDescriptor, QueuedTask, ReplicationTask, TaskOrigin};

/// Shared submission path for both the live write path and the Resync Engine: dedups
/// by `(bucket, name/object, version)` against tasks currently sitting in a queue, and
/// routes object vs. delete tasks to their own channel.
#[derive(Clone)]
struct EnqueueHandle {
    object_tx: mpsc::Sender<QueuedTask>,
    delete_tx: mpsc::Sender<QueuedTask>,
    inflight: Arc<StdMutex<HashSet<String>>>,
}

impl EnqueueHandle {
    fn try_enqueue(&self, task: QueuedTask) -> bool {
        let key = task.task.dedup_key();
        {
            let mut inflight = self.inflight.lock().unwrap();
            if !inflight.insert(key.clone()) {
                debug!(key = %key, "dropping duplicate submission, task already queued");
                return false;
            }
        }

        let tx = match &task.task {
            ReplicationTask::Object(_) => &self.object_tx,
            ReplicationTask::Delete(_) => &self.delete_tx,
        };

        match tx.try_send(task) {
            Ok(()) => true,
            Err(_) => {
                self.inflight.lock().unwrap().remove(&key);
                warn!(key = %key, "dispatch queue full, dropping task for MRF/external healer");
                false
            }
        }
    }

    fn release(&self, key: &str) {
        self.inflight.lock().unwrap().remove(key);
    }
}

impl TaskEnqueuer for EnqueueHandle {
    fn enqueue(&self, task: QueuedTask) -> bool {
        self.try_enqueue(task)
    }
}

/// The running dispatch pool: bounded queues, their worker pool, the MRF retry queue
/// and the resync orchestrator it feeds. Constructed once at startup and held for the
/// process lifetime; `shutdown()` signals all workers to stop accepting new work.
pub struct ReplicationPool {
    collaborators: Arc<Collaborators>,
    handle: EnqueueHandle,
    cancellation: CancellationToken,
    mrf: MrfQueue,
    resync: Arc<ResyncManager>,
    core_cfg: CoreConfig,
}

impl ReplicationPool {
    pub fn new(collaborators: Collaborators, core_cfg: CoreConfig) -> Arc<Self> {
        let collaborators = Arc::new(collaborators);

        let (object_tx, object_rx) = mpsc::channel(core_cfg.object_queue_capacity.max(1));
        let (delete_tx, delete_rx) = mpsc::channel(core_cfg.delete_queue_capacity.max(1));
        let handle = EnqueueHandle {
            object_tx,
            delete_tx,
            inflight: Arc::new(StdMutex::new(HashSet::new())),
        };

        let cancellation = CancellationToken::new();

        let mrf = mrf::spawn_workers(
            core_cfg.mrf_worker_count,
            core_cfg.mrf_queue_capacity,
            core_cfg.mrf_max_retries,
            core_cfg.mrf_retry_backoff,
            collaborators.clone(),
            cancellation.clone(),
        );

        let resync = Arc::new(ResyncManager::new(core_cfg.resync_worker_count));

        let object_rx = Arc::new(AsyncMutex::new(object_rx));
        let delete_rx = Arc::new(AsyncMutex::new(delete_rx));

        for worker_id in 0..core_cfg.worker_count.max(1) {
            spawn_worker(
                worker_id,
                collaborators.clone(),
                handle.clone(),
                object_rx.clone(),
                delete_rx.clone(),
                mrf.clone(),
                cancellation.clone(),
            );
        }

        info!(workers = core_cfg.worker_count, mrf_workers = core_cfg.mrf_worker_count, "dispatch engine started");

        Arc::new(Self {
            collaborators,
            handle,
            cancellation,
            mrf,
            resync,
            core_cfg,
        })
    }

    /// `enqueueObject` (spec §6): non-blocking; returns false if dropped (queue full or
    /// already queued).
    pub fn enqueue_object(&self, object: ObjectDescriptor) -> bool {
        self.handle.try_enqueue(QueuedTask {
            task: ReplicationTask::Object(object),
            origin: TaskOrigin::Live,
            retry_count: 0,
        })
    }

    /// `enqueueDelete` (spec §6): non-blocking; returns false if dropped.
    pub fn enqueue_delete(&self, deleted: DeletedObjectDescriptor) -> bool {
        self.handle.try_enqueue(QueuedTask {
            task: ReplicationTask::Delete(deleted),
            origin: TaskOrigin::Live,
            retry_count: 0,
        })
    }

    /// Exposes this pool's own enqueue path to the Resync Engine, so resync-discovered
    /// tasks flow through the same queues, dedup, and worker pool as the live path
    /// (spec §9 resolved open question).
    pub fn enqueuer(&self) -> Arc<dyn TaskEnqueuer> {
        Arc::new(self.handle.clone())
    }

    pub fn resync(&self) -> &Arc<ResyncManager> {
        &self.resync
    }

    pub fn collaborators(&self) -> &Arc<Collaborators> {
        &self.collaborators
    }

    pub fn core_config(&self) -> &CoreConfig {
        &self.core_cfg
    }

    /// Stops all dispatch/MRF workers from picking up further work. In-flight remote
    /// calls already underway are allowed to finish; no deadline or forced abort is
    /// imposed (spec §4.6/§5: no in-flight cancellation).
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_worker(
    worker_id: usize,
    collaborators: Arc<Collaborators>,
    handle: EnqueueHandle,
    object_rx: Arc<AsyncMutex<mpsc::Receiver<QueuedTask>>>,
    delete_rx: Arc<AsyncMutex<mpsc::Receiver<QueuedTask>>>,
    mrf: MrfQueue,
    cancellation: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = cancellation.cancelled() => {
                    info!(worker = worker_id, "dispatch worker stopping on shutdown");
                    return;
                }
                item = async { object_rx.lock().await.recv().await } => item,
                item = async { delete_rx.lock().await.recv().await } => item,
            };

            let Some(queued) = next else {
                info!(worker = worker_id, "dispatch worker stopping, queues closed");
                return;
            };

            handle.release(&queued.task.dedup_key());
            run_task(&collaborators, queued, &mrf).await;
        }
    });
}

async fn run_task(collaborators: &Arc<Collaborators>, queued: QueuedTask, mrf: &MrfQueue) {
    let bucket = match &queued.task {
        ReplicationTask::Object(o) => o.bucket.clone(),
        ReplicationTask::Delete(d) => d.bucket.clone(),
    };

    let cfg = match collaborators.config_store.get_replication_config(&bucket).await {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            debug!(bucket = %bucket, "no replication config for bucket, dropping task");
            return;
        }
        Err(err) => {
            warn!(bucket = %bucket, %err, "failed to load replication config, dropping task");
            return;
        }
    };

    let ok = match &queued.task {
        ReplicationTask::Object(object) => replicate_object(collaborators, &cfg, object).await.is_ok(),
        ReplicationTask::Delete(deleted) => replicate_delete(collaborators, &cfg, deleted).await.is_ok(),
    };

    if !ok {
        mrf.offer(queued.task);
    }
}
