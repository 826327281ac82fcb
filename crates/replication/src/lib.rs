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

//! Cross-site bucket replication core: decides which object/delete operations a
//! bucket's replication rules require, and drives them to a single configured remote
//! target. Everything this core needs from the rest of the system — configuration
//! storage, the remote-target registry, the object backend, the event bus, bandwidth
//! accounting, and versioning state — is injected at construction through
//! [`collaborators::Collaborators`]; this crate owns no ambient process-level state.
//!
//! [`ReplicationCore`] is the single entry point an embedder constructs and holds. It
//! wires together the Rule Engine ([`rules`]), Action Classifier ([`action`]), Metadata
//! Projector ([`metadata`]), Object/Delete Replicators, Destination Validator
//! ([`validator`]), Dispatch Engine ([`dispatch`]), MRF retry queue ([`mrf`]) and Resync
//! Engine ([`resync`]) behind the operations in spec §6.

pub mod action;
pub mod bandwidth;
pub mod collaborators;
pub mod config;
pub mod delete_replicator;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod headers;
pub mod metadata;
pub mod mrf;
pub mod object_replicator;
pub mod resync;
pub mod rules;
pub mod tags;
pub mod types;
pub mod validator;

use std::sync::Arc;

use time::OffsetDateTime;
use url::Url;

use collaborators::Collaborators;
use config::{CoreConfig, ObjectOpts, ReplicationConfig};
use error::Result;
use resync::BucketReplicationResyncStatus;
use types::{DeletedObjectDescriptor, ObjectDescriptor, StatusType};
use validator::ValidationOutcome;

/// The replication core's single entry point (spec §6). Cheap to clone: wraps an
/// `Arc<dispatch::ReplicationPool>` internally.
#[derive(Clone)]
pub struct ReplicationCore {
    pool: Arc<dispatch::ReplicationPool>,
}

impl ReplicationCore {
    /// `init`: constructs the core and starts its dispatch, MRF and resync worker
    /// pools. `collaborators` and `core_cfg` are supplied wholesale by the embedder;
    /// nothing here reads ambient global state.
    pub fn init(collaborators: Collaborators, core_cfg: CoreConfig) -> Self {
        Self {
            pool: dispatch::ReplicationPool::new(collaborators, core_cfg),
        }
    }

    /// `shouldReplicate` (spec §4.1).
    pub fn should_replicate(&self, cfg: &ReplicationConfig, opts: &ObjectOpts, current_status: &StatusType) -> bool {
        rules::should_replicate(cfg, opts, current_status)
    }

    /// `shouldReplicate`, taking the live object descriptor directly.
    pub fn should_replicate_object(&self, cfg: &ReplicationConfig, object: &ObjectDescriptor) -> bool {
        rules::should_replicate_object(cfg, object)
    }

    /// `shouldReplicateDelete` (spec §4.1). Returns `(is_delete_marker, replicate)`.
    pub fn should_replicate_delete(
        &self,
        cfg: Option<&ReplicationConfig>,
        deleted: &DeletedObjectDescriptor,
        current_object: Option<&ObjectDescriptor>,
        get_object_err: bool,
    ) -> (bool, bool) {
        rules::should_replicate_delete(cfg, deleted, current_object, get_object_err)
    }

    /// `enqueueObject` (spec §6): submits one object version for replication.
    /// Non-blocking; returns false if the task was dropped (queue full, or already
    /// queued).
    pub fn enqueue_object(&self, object: ObjectDescriptor) -> bool {
        self.pool.enqueue_object(object)
    }

    /// `enqueueDelete` (spec §6): submits one delete for replication. Non-blocking.
    pub fn enqueue_delete(&self, deleted: DeletedObjectDescriptor) -> bool {
        self.pool.enqueue_delete(deleted)
    }

    /// `validateDestination(bucket, config)` (spec §4.7/§6).
    pub async fn validate_destination(&self, bucket: &str, cfg: &ReplicationConfig, source_endpoint: &Url) -> Result<ValidationOutcome> {
        validator::validate_destination(self.pool.collaborators(), bucket, cfg, source_endpoint).await
    }

    /// `startResync` (spec §4.10): begins an asynchronous walk of `bucket`'s existing
    /// objects against `cfg`, enqueuing every object `cfg` newly covers. Returns the
    /// resync id immediately; progress is polled via [`Self::resync_status`].
    pub async fn start_resync(
        &self,
        bucket: String,
        arn: String,
        cfg: ReplicationConfig,
        resync_before: Option<OffsetDateTime>,
    ) -> Result<String> {
        self.pool
            .resync()
            .start_resync(
                self.pool.collaborators().clone(),
                self.pool.enqueuer(),
                self.pool.core_config().resync_persist_interval,
                bucket,
                arn,
                cfg,
                resync_before,
            )
            .await
    }

    /// `cancelResync` (spec §4.10): stops a running resync job from listing/enqueuing
    /// any further objects. Objects already enqueued are not retracted.
    pub async fn cancel_resync(&self, bucket: &str, arn: &str) {
        self.pool.resync().cancel_resync(bucket, arn).await
    }

    /// `resyncStatus` (spec §4.10): the last known status snapshot for `bucket`, if a
    /// resync has ever run against it.
    pub async fn resync_status(&self, bucket: &str) -> Option<BucketReplicationResyncStatus> {
        self.pool.resync().status(bucket).await
    }

    /// Stops the dispatch/MRF worker pools from accepting further work. In-flight
    /// remote calls are allowed to finish.
    pub fn shutdown(&self) {
        self.pool.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime as Odt;

    struct StubConfigStore;
    #[async_trait]
    impl ReplicationConfigStore for StubConfigStore {
        async fn get_replication_config(&self, _bucket: &str) -> Result<Option<ReplicationConfig>> {
            Ok(None)
        }
    }

    struct StubTargets;
    #[async_trait]
    impl BucketTargetRegistry for StubTargets {
        async fn get_bucket_target(&self, _bucket: &str, _role_arn: &str) -> Result<TargetInfo> {
            Ok(TargetInfo::default())
        }
        fn get_remote_target_client(&self, _role_arn: &str) -> Option<Arc<dyn RemoteClient>> {
            None
        }
    }

    struct StubBackend;
    #[async_trait]
    impl ObjectBackend for StubBackend {
        async fn get_object_n_info(&self, bucket: &str, object: &str, version_id: &str) -> Result<ObjectReader> {
            Ok(ObjectReader {
                descriptor: descriptor(bucket, object, version_id),
                stream: Box::pin(std::io::Cursor::new(Vec::new())),
            })
        }
        async fn copy_object_metadata_only(&self, _bucket: &str, _object: &str, _version_id: &str, _user_defined: HashMap<String, String>) -> Result<()> {
            Ok(())
        }
        async fn delete_object(&self, _bucket: &str, _object: &str, _opts: &DeleteObjectOptions) -> Result<()> {
            Ok(())
        }
        async fn list_object_versions(&self, _bucket: &str, _after_cursor: Option<String>) -> Result<ObjectVersionPage> {
            Ok(ObjectVersionPage::default())
        }
    }

    struct StubVersioning;
    impl VersioningOracle for StubVersioning {
        fn enabled(&self, _bucket: &str) -> bool {
            true
        }
        fn suspended(&self, _bucket: &str) -> bool {
            false
        }
        fn object_lock_enabled(&self, _bucket: &str) -> bool {
            false
        }
    }

    struct StubEvents {
        sent: AtomicUsize,
    }
    impl EventBus for StubEvents {
        fn send(&self, _event: crate::events::ReplicationEvent) {
            self.sent.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubConfigKv;
    #[async_trait]
    impl ConfigStore for StubConfigKv {
        async fn save_config(&self, _path: &str, _data: Vec<u8>) -> Result<()> {
            Ok(())
        }
        async fn read_config(&self, _path: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn descriptor(bucket: &str, name: &str, version_id: &str) -> ObjectDescriptor {
        ObjectDescriptor {
            bucket: bucket.into(),
            name: name.into(),
            version_id: version_id.into(),
            size: 0,
            actual_size: 0,
            etag: "e1".into(),
            mod_time: Odt::UNIX_EPOCH,
            content_type: String::new(),
            content_encoding: String::new(),
            storage_class: String::new(),
            user_defined: HashMap::new(),
            user_tags: String::new(),
            delete_marker: false,
            replication_status: StatusType::Pending,
            version_purge_status: Default::default(),
            ssec: false,
        }
    }

    fn core() -> ReplicationCore {
        let collaborators = Collaborators {
            config_store: Arc::new(StubConfigStore),
            targets: Arc::new(StubTargets),
            backend: Arc::new(StubBackend),
            versioning: Arc::new(StubVersioning),
            events: Arc::new(StubEvents { sent: AtomicUsize::new(0) }),
            bandwidth: Arc::new(crate::bandwidth::NoopBandwidthMonitor),
            config_kv: Arc::new(StubConfigKv),
        };
        let cfg = CoreConfig {
            worker_count: 0,
            mrf_worker_count: 0,
            ..CoreConfig::default()
        };
        ReplicationCore::init(collaborators, cfg)
    }

    #[test]
    fn enqueue_object_accepts_a_fresh_task() {
        let core = core();
        assert!(core.enqueue_object(descriptor("b1", "o1", "v1")));
        core.shutdown();
    }

    #[test]
    fn enqueue_object_drops_a_duplicate_while_first_is_queued() {
        let core = core();
        assert!(core.enqueue_object(descriptor("b1", "o1", "v1")));
        assert!(!core.enqueue_object(descriptor("b1", "o1", "v1")));
        core.shutdown();
    }

    #[tokio::test]
    async fn validate_destination_rejects_missing_target() {
        let core = core();
        let cfg = ReplicationConfig {
            role_arn: "arn:rustfs:replication::role".into(),
            destination: config::Destination {
                bucket: "dst".into(),
                storage_class: None,
            },
            rules: vec![],
        };
        let url = Url::parse("https://local.example:9000").unwrap();
        let err = core.validate_destination("b1", &cfg, &url).await.unwrap_err();
        assert!(matches!(err, error::Error::TargetNotFound { .. }));
    }

    #[tokio::test]
    async fn resync_status_is_none_before_any_resync_runs() {
        let core = core();
        assert!(core.resync_status("b1").await.is_none());
    }
}
