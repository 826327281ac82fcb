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

//! Delete Replicator (spec §4.4): propagates a delete-marker creation or a permanent
//! versioned purge to the configured remote target.

use tracing::{info, warn};

use crate::collaborators::{Collaborators, DeleteObjectOptions, EventBus as _, RemoveObjectOptions};
use crate::config::ReplicationConfig;
use crate::error::{Error, Result};
use crate::events::ReplicationEvent;
use crate::types::{DeletedObjectDescriptor, StatusType, VersionPurgeStatusType};

/// The outcome of one delete-replication attempt, written back onto the local object
/// metadata by the caller (dispatch engine / MRF worker).
#[derive(Debug, Clone)]
pub struct DeleteReplicationResult {
    pub replication_status: StatusType,
    pub version_purge_status: VersionPurgeStatusType,
}

/// Replicates one delete — either a delete-marker creation (`deleted.is_version_purge()
/// == false`) or a permanent purge of an explicit version — to the target named by
/// `cfg.role_arn`.
pub async fn replicate_delete(
    collaborators: &Collaborators,
    cfg: &ReplicationConfig,
    deleted: &DeletedObjectDescriptor,
) -> Result<DeleteReplicationResult> {
    let version_purge = deleted.is_version_purge();

    let Some(client) = collaborators.targets.get_remote_target_client(&cfg.role_arn) else {
        warn!(arn = %cfg.role_arn, "no remote client registered for delete replication");
        return Ok(failure(version_purge));
    };

    let versioned = collaborators.versioning.enabled(&deleted.bucket);
    let version_suspended = collaborators.versioning.suspended(&deleted.bucket);

    let opts = RemoveObjectOptions {
        version_id: deleted.target_version_id().to_string(),
        replication_mtime: deleted.delete_marker_mtime,
        replication_delete_marker: deleted.delete_marker,
        replication_status_replica: true,
    };

    let outcome = client.remove_object(&deleted.bucket, &deleted.object, &opts).await;

    let result = match outcome {
        Ok(()) => success(version_purge),
        Err(err) => {
            warn!(bucket = %deleted.bucket, object = %deleted.object, %err, "remote delete replication failed");
            failure(version_purge)
        }
    };

    write_back_status(collaborators, deleted, &result, versioned, version_suspended).await?;
    emit_event(collaborators, deleted, &result);

    if matches!(result.replication_status, StatusType::Failed) || matches!(result.version_purge_status, VersionPurgeStatusType::Failed) {
        return Err(Error::transient_remote(
            "remove_object",
            deleted.bucket.clone(),
            deleted.object.clone(),
            std::io::Error::other("remote delete replication failed"),
        ));
    }

    Ok(result)
}

fn success(version_purge: bool) -> DeleteReplicationResult {
    if version_purge {
        DeleteReplicationResult {
            replication_status: StatusType::Empty,
            version_purge_status: VersionPurgeStatusType::Complete,
        }
    } else {
        DeleteReplicationResult {
            replication_status: StatusType::Completed,
            version_purge_status: VersionPurgeStatusType::Empty,
        }
    }
}

fn failure(version_purge: bool) -> DeleteReplicationResult {
    if version_purge {
        DeleteReplicationResult {
            replication_status: StatusType::Empty,
            version_purge_status: VersionPurgeStatusType::Failed,
        }
    } else {
        DeleteReplicationResult {
            replication_status: StatusType::Failed,
            version_purge_status: VersionPurgeStatusType::Empty,
        }
    }
}

async fn write_back_status(
    collaborators: &Collaborators,
    deleted: &DeletedObjectDescriptor,
    result: &DeleteReplicationResult,
    versioned: bool,
    version_suspended: bool,
) -> Result<()> {
    let opts = DeleteObjectOptions {
        version_id: deleted.target_version_id().to_string(),
        delete_marker: deleted.delete_marker,
        replication_status: Some(result.replication_status.clone()),
        version_purge_status: Some(result.version_purge_status.clone()),
        versioned,
        version_suspended,
    };
    match collaborators.backend.delete_object(&deleted.bucket, &deleted.object, &opts).await {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(bucket = %deleted.bucket, object = %deleted.object, %err, "failed to persist delete replication status locally");
            Err(err)
        }
    }
}

fn emit_event(collaborators: &Collaborators, deleted: &DeletedObjectDescriptor, result: &DeleteReplicationResult) {
    let failed = matches!(result.replication_status, StatusType::Failed) || matches!(result.version_purge_status, VersionPurgeStatusType::Failed);
    let event = ReplicationEvent::new(deleted.bucket.clone(), deleted.object.clone(), deleted.target_version_id().to_string(), failed);
    info!(bucket = %deleted.bucket, object = %deleted.object, failed, "delete replication attempt finished");
    collaborators.events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::*;
    use crate::config::Destination;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct StubConfigStore;
    #[async_trait]
    impl ReplicationConfigStore for StubConfigStore {
        async fn get_replication_config(&self, _bucket: &str) -> Result<Option<ReplicationConfig>> {
            Ok(None)
        }
    }

    struct StubTargets {
        client: Option<Arc<dyn RemoteClient>>,
    }
    #[async_trait]
    impl BucketTargetRegistry for StubTargets {
        async fn get_bucket_target(&self, _bucket: &str, _role_arn: &str) -> Result<TargetInfo> {
            Ok(TargetInfo::default())
        }
        fn get_remote_target_client(&self, _role_arn: &str) -> Option<Arc<dyn RemoteClient>> {
            self.client.clone()
        }
    }

    struct StubRemoteClient {
        fail_remove: bool,
        removed: AtomicUsize,
    }
    #[async_trait]
    impl RemoteClient for StubRemoteClient {
        async fn bucket_exists(&self, _bucket: &str) -> Result<bool> {
            Ok(true)
        }
        async fn get_object_lock_config(&self, _bucket: &str) -> Result<bool> {
            Ok(false)
        }
        async fn stat_object(&self, _bucket: &str, _object: &str, _version_id: &str) -> Result<Option<crate::types::RemoteObjectDescriptor>> {
            Ok(None)
        }
        async fn put_object(
            &self,
            _bucket: &str,
            _object: &str,
            _reader: BoxedAsyncReader,
            _size: i64,
            _opts: &crate::metadata::PutOptions,
        ) -> Result<()> {
            Ok(())
        }
        async fn copy_object(
            &self,
            _bucket: &str,
            _object: &str,
            _source_version_id: &str,
            _metadata: std::collections::HashMap<String, String>,
        ) -> Result<()> {
            Ok(())
        }
        async fn remove_object(&self, _bucket: &str, _object: &str, _opts: &RemoveObjectOptions) -> Result<()> {
            self.removed.fetch_add(1, Ordering::SeqCst);
            if self.fail_remove {
                Err(Error::transient_remote("remove_object", "b", "o", std::io::Error::other("boom")))
            } else {
                Ok(())
            }
        }
        fn endpoint_url(&self) -> &url::Url {
            static URL: std::sync::OnceLock<url::Url> = std::sync::OnceLock::new();
            URL.get_or_init(|| url::Url::parse("https://remote.example").unwrap())
        }
    }

    struct StubBackend {
        last_written_status: Mutex<Option<StatusType>>,
    }
    #[async_trait]
    impl ObjectBackend for StubBackend {
        async fn get_object_n_info(&self, _bucket: &str, _object: &str, _version_id: &str) -> Result<ObjectReader> {
            unimplemented!()
        }
        async fn copy_object_metadata_only(
            &self,
            _bucket: &str,
            _object: &str,
            _version_id: &str,
            _user_defined: std::collections::HashMap<String, String>,
        ) -> Result<()> {
            Ok(())
        }
        async fn delete_object(&self, _bucket: &str, _object: &str, opts: &DeleteObjectOptions) -> Result<()> {
            *self.last_written_status.lock().unwrap() = opts.replication_status.clone();
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
        sent: AtomicBool,
    }
    impl EventBus for StubEvents {
        fn send(&self, _event: ReplicationEvent) {
            self.sent.store(true, Ordering::SeqCst);
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

    fn collaborators(missing_client: bool, fail_remove: bool) -> (Collaborators, Arc<StubBackend>, Arc<StubEvents>) {
        let backend = Arc::new(StubBackend {
            last_written_status: Mutex::new(None),
        });
        let events = Arc::new(StubEvents { sent: AtomicBool::new(false) });
        let client: Option<Arc<dyn RemoteClient>> = if missing_client {
            None
        } else {
            Some(Arc::new(StubRemoteClient {
                fail_remove,
                removed: AtomicUsize::new(0),
            }))
        };
        let collaborators = Collaborators {
            config_store: Arc::new(StubConfigStore),
            targets: Arc::new(StubTargets { client }),
            backend: backend.clone(),
            versioning: Arc::new(StubVersioning),
            events: events.clone(),
            bandwidth: Arc::new(crate::bandwidth::NoopBandwidthMonitor),
            config_kv: Arc::new(StubConfigKv),
        };
        (collaborators, backend, events)
    }

    fn cfg() -> ReplicationConfig {
        ReplicationConfig {
            role_arn: "arn:rustfs:replication::role".into(),
            destination: Destination {
                bucket: "dst".into(),
                storage_class: None,
            },
            rules: vec![],
        }
    }

    fn delete_marker() -> DeletedObjectDescriptor {
        DeletedObjectDescriptor {
            bucket: "b1".into(),
            object: "o1".into(),
            delete_marker_version_id: "dm1".into(),
            version_id: String::new(),
            delete_marker_mtime: None,
            delete_marker_replication_status: StatusType::Pending,
            version_purge_status: Default::default(),
            delete_marker: true,
        }
    }

    #[tokio::test]
    async fn successful_delete_marks_completed_and_emits_event() {
        let (collaborators, backend, events) = collaborators(false, false);
        let result = replicate_delete(&collaborators, &cfg(), &delete_marker()).await.unwrap();
        assert_eq!(result.replication_status, StatusType::Completed);
        assert_eq!(*backend.last_written_status.lock().unwrap(), Some(StatusType::Completed));
        assert!(events.sent.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn remote_failure_marks_failed_and_returns_err() {
        let (collaborators, backend, _events) = collaborators(false, true);
        let err = replicate_delete(&collaborators, &cfg(), &delete_marker()).await.unwrap_err();
        assert!(matches!(err, Error::TransientRemoteError { .. }));
        assert_eq!(*backend.last_written_status.lock().unwrap(), Some(StatusType::Failed));
    }

    #[tokio::test]
    async fn missing_remote_client_aborts_silently_without_touching_source() {
        let (collaborators, backend, events) = collaborators(true, false);
        let result = replicate_delete(&collaborators, &cfg(), &delete_marker()).await.unwrap();
        assert_eq!(result.replication_status, StatusType::Failed);
        assert!(backend.last_written_status.lock().unwrap().is_none(), "abort-silently must not write back source status");
        assert!(!events.sent.load(Ordering::SeqCst), "abort-silently must not emit an event");
    }

    #[tokio::test]
    async fn version_purge_uses_purge_status_fields() {
        let (collaborators, backend, _events) = collaborators(false, false);
        let mut deleted = delete_marker();
        deleted.delete_marker = false;
        deleted.delete_marker_version_id = String::new();
        deleted.version_id = "v2".into();
        let result = replicate_delete(&collaborators, &cfg(), &deleted).await.unwrap();
        assert_eq!(result.version_purge_status, VersionPurgeStatusType::Complete);
        assert_eq!(*backend.last_written_status.lock().unwrap(), Some(StatusType::Empty));
    }
}
