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

//! Resync Engine (spec §4.10): an operator-triggered walk of a bucket's existing
//! objects against its current replication rules, for objects that predate a rule (or
//! an edit to one) and were never tasked through the live write path. Drives the
//! `ReplicationResyncer`/`BucketReplicationResyncStatus` machinery entirely through
//! injected collaborators rather than a concrete storage backend.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio::time::Duration as TokioDuration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::collaborators::Collaborators;
use crate::config::ReplicationConfig;
use crate::error::{Error, Result};
use crate::rules::should_replicate_object;
use crate::types::{ObjectDescriptor, QueuedTask, ReplicationTask, TaskOrigin};

/// Logical key prefix under which resync status is persisted via the injected
/// `ConfigStore`. The real on-disk bucket-metadata layout is owned by the backend this
/// core no longer depends on directly; this is just the path this core asks the
/// collaborator to read/write.
const BUCKET_META_PREFIX: &str = "buckets";
const REPLICATION_DIR: &str = ".replication";
const RESYNC_FILE_NAME: &str = "resync.bin";
const RESYNC_META_FORMAT: u16 = 1;
const RESYNC_META_VERSION: u16 = 1;

/// Anything able to accept a task produced by a resync job, subject to the same
/// non-blocking/drop policy as any other enqueue (spec §9 resolved open question: MRF
/// and resync reuse the Dispatch Engine's own entry points rather than owning separate
/// queues).
pub trait TaskEnqueuer: Send + Sync {
    fn enqueue(&self, task: QueuedTask) -> bool;
}

pub struct ResyncOpts {
    pub bucket: String,
    pub arn: String,
    pub resync_id: String,
    pub resync_before: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResyncStatusType {
    #[default]
    NoResync,
    ResyncPending,
    ResyncCanceled,
    ResyncStarted,
    ResyncCompleted,
    ResyncFailed,
}

impl ResyncStatusType {
    pub fn is_valid(&self) -> bool {
        *self != ResyncStatusType::NoResync
    }
}

impl fmt::Display for ResyncStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResyncStatusType::ResyncStarted => "Ongoing",
            ResyncStatusType::ResyncCompleted => "Completed",
            ResyncStatusType::ResyncFailed => "Failed",
            ResyncStatusType::ResyncPending => "Pending",
            ResyncStatusType::ResyncCanceled => "Canceled",
            ResyncStatusType::NoResync => "",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetReplicationResyncStatus {
    pub start_time: Option<OffsetDateTime>,
    pub last_update: Option<OffsetDateTime>,
    pub resync_id: String,
    pub resync_before_date: Option<OffsetDateTime>,
    pub resync_status: ResyncStatusType,
    pub failed_size: i64,
    pub failed_count: i64,
    pub replicated_size: i64,
    pub replicated_count: i64,
    pub bucket: String,
    pub object: String,
    pub error: Option<String>,
}

impl TargetReplicationResyncStatus {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-bucket resync status, keyed by target arn. In this single-target-per-bucket
/// core the map never holds more than one entry, but the shape is kept as a map since
/// a bucket could historically have resynced more than one target before this core's
/// single-target Non-goal, and it costs nothing to keep it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BucketReplicationResyncStatus {
    pub version: u16,
    pub targets_map: HashMap<String, TargetReplicationResyncStatus>,
    pub last_update: Option<OffsetDateTime>,
}

impl BucketReplicationResyncStatus {
    pub fn new() -> Self {
        Self {
            version: RESYNC_META_VERSION,
            ..Default::default()
        }
    }

    pub fn marshal_msg(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(&self)?)
    }

    pub fn unmarshal_msg(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}

fn resync_config_path(bucket: &str) -> String {
    format!("{BUCKET_META_PREFIX}/{bucket}/{REPLICATION_DIR}/{RESYNC_FILE_NAME}")
}

async fn save_resync_status(collaborators: &Collaborators, bucket: &str, status: &BucketReplicationResyncStatus) -> Result<()> {
    let body = status.marshal_msg()?;
    let mut data = Vec::with_capacity(body.len() + 4);
    let mut header = [0u8; 4];
    LittleEndian::write_u16(&mut header[0..2], RESYNC_META_FORMAT);
    LittleEndian::write_u16(&mut header[2..4], RESYNC_META_VERSION);
    data.extend_from_slice(&header);
    data.extend_from_slice(&body);
    collaborators.config_kv.save_config(&resync_config_path(bucket), data).await
}

/// Orchestrates resync jobs for every bucket: in-memory running status plus
/// best-effort periodic persistence via the injected `ConfigStore`.
pub struct ResyncManager {
    status_map: Arc<RwLock<HashMap<String, BucketReplicationResyncStatus>>>,
    cancellations: Arc<RwLock<HashMap<(String, String), CancellationToken>>>,
    worker_count: usize,
}

impl ResyncManager {
    pub fn new(worker_count: usize) -> Self {
        Self {
            status_map: Arc::new(RwLock::new(HashMap::new())),
            cancellations: Arc::new(RwLock::new(HashMap::new())),
            worker_count: worker_count.max(1),
        }
    }

    pub async fn status(&self, bucket: &str) -> Option<BucketReplicationResyncStatus> {
        self.status_map.read().await.get(bucket).cloned()
    }

    /// Transitions a running job's status to `ResyncCanceled`. In-flight objects
    /// already enqueued are not retracted (spec §4.10 step 4 / §4.6 no-cancellation
    /// rule); only further listing/enqueuing from this job stops.
    pub async fn cancel_resync(&self, bucket: &str, arn: &str) {
        if let Some(token) = self.cancellations.read().await.get(&(bucket.to_string(), arn.to_string())) {
            token.cancel();
        }
        self.set_status(bucket, arn, ResyncStatusType::ResyncCanceled, None).await;
    }

    async fn set_status(&self, bucket: &str, arn: &str, status: ResyncStatusType, resync_id: Option<&str>) {
        let mut map = self.status_map.write().await;
        let bucket_status = map.entry(bucket.to_string()).or_insert_with(BucketReplicationResyncStatus::new);
        let target = bucket_status.targets_map.entry(arn.to_string()).or_insert_with(TargetReplicationResyncStatus::new);
        if let Some(id) = resync_id {
            target.resync_id = id.to_string();
        }
        target.resync_status = status;
        target.last_update = Some(OffsetDateTime::now_utc());
        bucket_status.last_update = Some(OffsetDateTime::now_utc());
    }

    async fn record_outcome(&self, bucket: &str, arn: &str, object: &str, size: i64, ok: bool) {
        let mut map = self.status_map.write().await;
        let bucket_status = map.entry(bucket.to_string()).or_insert_with(BucketReplicationResyncStatus::new);
        let target = bucket_status.targets_map.entry(arn.to_string()).or_insert_with(TargetReplicationResyncStatus::new);
        target.object = object.to_string();
        if ok {
            target.replicated_count += 1;
            target.replicated_size += size;
        } else {
            target.failed_count += 1;
            target.failed_size += size;
        }
        target.last_update = Some(OffsetDateTime::now_utc());
        bucket_status.last_update = Some(OffsetDateTime::now_utc());
    }

    /// `startResync`: validates `cfg` targets `arn`, assigns a fresh resync id, marks
    /// the job `ResyncStarted`, and spawns the listing/enqueue loop in the background.
    /// Returns immediately with the resync id.
    pub async fn start_resync(
        &self,
        collaborators: Arc<Collaborators>,
        enqueuer: Arc<dyn TaskEnqueuer>,
        persist_interval: TokioDuration,
        bucket: String,
        arn: String,
        cfg: ReplicationConfig,
        resync_before: Option<OffsetDateTime>,
    ) -> Result<String> {
        if cfg.role_arn != arn {
            return Err(Error::ArnInvalid { arn });
        }

        let resync_id = uuid::Uuid::new_v4().to_string();
        self.set_status(&bucket, &arn, ResyncStatusType::ResyncStarted, Some(&resync_id)).await;

        let token = CancellationToken::new();
        self.cancellations.write().await.insert((bucket.clone(), arn.clone()), token.clone());

        let status_map = self.status_map.clone();
        let opts = ResyncOpts {
            bucket: bucket.clone(),
            arn: arn.clone(),
            resync_id: resync_id.clone(),
            resync_before,
        };
        let this_worker_count = self.worker_count;

        tokio::spawn(run_resync_job(collaborators, enqueuer, status_map, token, persist_interval, opts, cfg, this_worker_count));

        Ok(resync_id)
    }
}

impl Default for ResyncManager {
    fn default() -> Self {
        Self::new(10)
    }
}

async fn run_resync_job(
    collaborators: Arc<Collaborators>,
    enqueuer: Arc<dyn TaskEnqueuer>,
    status_map: Arc<RwLock<HashMap<String, BucketReplicationResyncStatus>>>,
    token: CancellationToken,
    persist_interval: TokioDuration,
    opts: ResyncOpts,
    cfg: ReplicationConfig,
    _worker_count: usize,
) {
    let mut cursor = None;
    let mut last_persist = tokio::time::Instant::now();

    loop {
        if token.is_cancelled() {
            info!(bucket = %opts.bucket, "resync job canceled, stopping listing");
            return;
        }

        let page = match collaborators.backend.list_object_versions(&opts.bucket, cursor.clone()).await {
            Ok(page) => page,
            Err(err) => {
                error!(bucket = %opts.bucket, %err, "resync lister failed");
                mark_terminal(&status_map, &opts, ResyncStatusType::ResyncFailed).await;
                return;
            }
        };

        for object in &page.objects {
            if token.is_cancelled() {
                info!(bucket = %opts.bucket, "resync job canceled mid-page");
                return;
            }
            if let Some(before) = opts.resync_before {
                if object.mod_time < before {
                    continue;
                }
            }
            if !should_replicate_object(&cfg, object) {
                continue;
            }
            enqueue_and_record(&enqueuer, &status_map, &opts, object).await;
        }

        if last_persist.elapsed() >= persist_interval {
            persist(&collaborators, &status_map, &opts.bucket).await;
            last_persist = tokio::time::Instant::now();
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    persist(&collaborators, &status_map, &opts.bucket).await;
    mark_terminal(&status_map, &opts, ResyncStatusType::ResyncCompleted).await;
}

async fn enqueue_and_record(
    enqueuer: &Arc<dyn TaskEnqueuer>,
    status_map: &Arc<RwLock<HashMap<String, BucketReplicationResyncStatus>>>,
    opts: &ResyncOpts,
    object: &ObjectDescriptor,
) {
    let accepted = enqueuer.enqueue(QueuedTask {
        task: ReplicationTask::Object(object.clone()),
        origin: TaskOrigin::Resync,
        retry_count: 0,
    });

    let mut map = status_map.write().await;
    let bucket_status = map.entry(opts.bucket.clone()).or_insert_with(BucketReplicationResyncStatus::new);
    let target = bucket_status.targets_map.entry(opts.arn.clone()).or_insert_with(TargetReplicationResyncStatus::new);
    target.object = object.name.clone();
    if accepted {
        target.replicated_count += 1;
        target.replicated_size += object.size;
    } else {
        warn!(bucket = %opts.bucket, object = %object.name, "resync enqueue dropped by full dispatch queue");
        target.failed_count += 1;
        target.failed_size += object.size;
    }
    target.last_update = Some(OffsetDateTime::now_utc());
    bucket_status.last_update = Some(OffsetDateTime::now_utc());
}

async fn mark_terminal(status_map: &Arc<RwLock<HashMap<String, BucketReplicationResyncStatus>>>, opts: &ResyncOpts, status: ResyncStatusType) {
    let mut map = status_map.write().await;
    let bucket_status = map.entry(opts.bucket.clone()).or_insert_with(BucketReplicationResyncStatus::new);
    let target = bucket_status.targets_map.entry(opts.arn.clone()).or_insert_with(TargetReplicationResyncStatus::new);
    target.resync_status = status;
    target.last_update = Some(OffsetDateTime::now_utc());
    bucket_status.last_update = Some(OffsetDateTime::now_utc());
}

async fn persist(collaborators: &Collaborators, status_map: &Arc<RwLock<HashMap<String, BucketReplicationResyncStatus>>>, bucket: &str) {
    let snapshot = status_map.read().await.get(bucket).cloned();
    if let Some(status) = snapshot {
        if let Err(err) = save_resync_status(collaborators, bucket, &status).await {
            error!(bucket = %bucket, %err, "failed to persist resync status");
        }
    }
}
