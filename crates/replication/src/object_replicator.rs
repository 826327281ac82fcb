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

//! Object Replicator (spec §4.5): performs a full-object PUT or a metadata-only COPY
//! against the remote target, depending on what the Action Classifier decided.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::action::classify;
use crate::collaborators::Collaborators;
use crate::config::ReplicationConfig;
use crate::error::Result;
use crate::headers;
use crate::metadata::{project_copy_metadata, project_put_options};
use crate::types::{ObjectDescriptor, ReplicationAction, StatusType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectReplicationOutcome {
    /// No remote call was needed; object was already in sync.
    Skipped,
    Completed,
    Failed,
}

/// Replicates one object version. Stats the remote first to classify the required
/// action (full copy, metadata-only copy, or none), then executes it and writes the
/// resulting status back onto the source via the backend's metadata-patch API.
pub async fn replicate_object(
    collaborators: &Collaborators,
    cfg: &ReplicationConfig,
    source: &ObjectDescriptor,
) -> Result<ObjectReplicationOutcome> {
    let Some(client) = collaborators.targets.get_remote_target_client(&cfg.role_arn) else {
        warn!(arn = %cfg.role_arn, "no remote client registered for object replication");
        // Backend write-back is best-effort (spec §4.5 step 10/§7 TransientLocalError):
        // its own failure is already logged by `write_back` and must not suppress this
        // outcome's event or turn it into a propagated error.
        let _ = write_back(collaborators, source, StatusType::Failed).await;
        emit_event(collaborators, source, true);
        return Ok(ObjectReplicationOutcome::Failed);
    };

    let remote = match client.stat_object(&cfg.destination.bucket, &source.name, &source.version_id).await {
        Ok(r) => r,
        Err(err) => {
            warn!(bucket = %source.bucket, object = %source.name, %err, "remote stat failed, assuming full copy required");
            None
        }
    };

    let action = classify(source, remote.as_ref());

    if action == ReplicationAction::None {
        // A concurrent PUT path already replicated this version; close and return
        // without touching status or the event stream (spec §4.5 step 4).
        return Ok(ObjectReplicationOutcome::Skipped);
    }

    let outcome = match action {
        ReplicationAction::None => unreachable!(),
        ReplicationAction::Metadata => replicate_metadata(&*client, cfg, source).await,
        ReplicationAction::All => replicate_full(collaborators, &*client, cfg, source).await,
    };

    let status = match &outcome {
        Ok(()) => StatusType::Completed,
        Err(err) => {
            warn!(bucket = %source.bucket, object = %source.name, %err, "object replication failed");
            StatusType::Failed
        }
    };

    // Best-effort, same as above: a failed write-back must not mask a successful
    // remote PUT/COPY as a failed task, or dispatch.rs would re-offer it to MRF.
    let _ = write_back(collaborators, source, status.clone()).await;
    emit_event(collaborators, source, matches!(status, StatusType::Failed));

    if let Err(err) = outcome {
        return Err(err);
    }

    Ok(ObjectReplicationOutcome::Completed)
}

async fn replicate_metadata(
    client: &(dyn crate::collaborators::RemoteClient),
    cfg: &ReplicationConfig,
    source: &ObjectDescriptor,
) -> Result<()> {
    let metadata = project_copy_metadata(source, &cfg.destination)?;
    client
        .copy_object(&cfg.destination.bucket, &source.name, &source.version_id, metadata)
        .await
}

async fn replicate_full(
    collaborators: &Collaborators,
    client: &(dyn crate::collaborators::RemoteClient),
    cfg: &ReplicationConfig,
    source: &ObjectDescriptor,
) -> Result<()> {
    let opts = project_put_options(source, &cfg.destination)?;

    let mut reader = collaborators
        .backend
        .get_object_n_info(&source.bucket, &source.name, &source.version_id)
        .await?;

    let header_size = estimate_header_size(&opts.user_metadata);
    let node_count = collaborators.targets.cluster_node_count().max(1);
    let bandwidth_limit = collaborators
        .targets
        .get_bucket_target(&source.bucket, &cfg.role_arn)
        .await
        .map(|t| t.bandwidth_limit)
        .unwrap_or(0);
    let per_node_limit = if bandwidth_limit > 0 { bandwidth_limit / node_count as i64 } else { 0 };

    let throttled = collaborators.bandwidth.new_monitored_reader(
        &source.bucket,
        &source.name,
        reader.stream,
        header_size,
        per_node_limit,
        bandwidth_limit,
    );
    reader.stream = throttled;

    client
        .put_object(&cfg.destination.bucket, &source.name, reader.stream, source.size, &opts)
        .await
}

fn estimate_header_size(user_metadata: &HashMap<String, String>) -> usize {
    user_metadata.iter().map(|(k, v)| k.len() + v.len() + 4).sum()
}

async fn write_back(collaborators: &Collaborators, source: &ObjectDescriptor, status: StatusType) -> Result<()> {
    let mut user_defined = source.user_defined.clone();
    user_defined.insert(headers::REPLICATION_STATUS.to_string(), status.to_string());
    match collaborators
        .backend
        .copy_object_metadata_only(&source.bucket, &source.name, &source.version_id, user_defined)
        .await
    {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(bucket = %source.bucket, object = %source.name, %err, "failed to persist replication status locally");
            Err(err)
        }
    }
}

fn emit_event(collaborators: &Collaborators, source: &ObjectDescriptor, failed: bool) {
    use crate::collaborators::EventBus as _;
    let event = crate::events::ReplicationEvent::new(source.bucket.clone(), source.name.clone(), source.version_id.clone(), failed);
    info!(bucket = %source.bucket, object = %source.name, failed, "object replication attempt finished");
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
    use time::OffsetDateTime;
    use tokio::io::AsyncReadExt;

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

    struct StubTargetsWithClient {
        client: Arc<dyn RemoteClient>,
    }
    #[async_trait]
    impl BucketTargetRegistry for StubTargetsWithClient {
        async fn get_bucket_target(&self, _bucket: &str, _role_arn: &str) -> Result<TargetInfo> {
            Ok(TargetInfo::default())
        }
        fn get_remote_target_client(&self, _role_arn: &str) -> Option<Arc<dyn RemoteClient>> {
            Some(self.client.clone())
        }
    }

    struct StubRemoteClient {
        remote_descriptor: Mutex<Option<crate::types::RemoteObjectDescriptor>>,
        put_called: AtomicUsize,
        copy_called: AtomicUsize,
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
            Ok(self.remote_descriptor.lock().unwrap().clone())
        }
        async fn put_object(&self, _bucket: &str, _object: &str, mut reader: BoxedAsyncReader, _size: i64, _opts: &crate::metadata::PutOptions) -> Result<()> {
            self.put_called.fetch_add(1, Ordering::SeqCst);
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await.unwrap();
            Ok(())
        }
        async fn copy_object(&self, _bucket: &str, _object: &str, _source_version_id: &str, _metadata: HashMap<String, String>) -> Result<()> {
            self.copy_called.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remove_object(&self, _bucket: &str, _object: &str, _opts: &RemoveObjectOptions) -> Result<()> {
            Ok(())
        }
        fn endpoint_url(&self) -> &url::Url {
            static URL: std::sync::OnceLock<url::Url> = std::sync::OnceLock::new();
            URL.get_or_init(|| url::Url::parse("https://remote.example").unwrap())
        }
    }

    struct StubBackend {
        last_status: Mutex<Option<String>>,
    }
    #[async_trait]
    impl ObjectBackend for StubBackend {
        async fn get_object_n_info(&self, bucket: &str, object: &str, version_id: &str) -> Result<ObjectReader> {
            let cursor = std::io::Cursor::new(b"hello world".to_vec());
            Ok(ObjectReader {
                descriptor: descriptor_for(bucket, object, version_id),
                stream: Box::pin(cursor),
            })
        }
        async fn copy_object_metadata_only(&self, _bucket: &str, _object: &str, _version_id: &str, user_defined: HashMap<String, String>) -> Result<()> {
            *self.last_status.lock().unwrap() = user_defined.get(headers::REPLICATION_STATUS).cloned();
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
        sent: AtomicBool,
    }
    impl EventBus for StubEvents {
        fn send(&self, _event: crate::events::ReplicationEvent) {
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

    fn descriptor_for(bucket: &str, name: &str, version_id: &str) -> ObjectDescriptor {
        ObjectDescriptor {
            bucket: bucket.into(),
            name: name.into(),
            version_id: version_id.into(),
            size: 11,
            actual_size: 11,
            etag: "e1".into(),
            mod_time: OffsetDateTime::UNIX_EPOCH,
            content_type: "text/plain".into(),
            content_encoding: String::new(),
            storage_class: "STANDARD".into(),
            user_defined: HashMap::new(),
            user_tags: String::new(),
            delete_marker: false,
            replication_status: StatusType::Pending,
            version_purge_status: Default::default(),
            ssec: false,
        }
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

    fn make_collaborators(targets: Arc<dyn BucketTargetRegistry>, backend: Arc<StubBackend>, events: Arc<StubEvents>) -> Collaborators {
        Collaborators {
            config_store: Arc::new(StubConfigStore),
            targets,
            backend,
            versioning: Arc::new(StubVersioning),
            events,
            bandwidth: Arc::new(crate::bandwidth::NoopBandwidthMonitor),
            config_kv: Arc::new(StubConfigKv),
        }
    }

    #[tokio::test]
    async fn missing_remote_client_marks_failed() {
        let backend = Arc::new(StubBackend { last_status: Mutex::new(None) });
        let events = Arc::new(StubEvents { sent: AtomicBool::new(false) });
        let collaborators = make_collaborators(Arc::new(StubTargets), backend.clone(), events);
        let outcome = replicate_object(&collaborators, &cfg(), &descriptor_for("b1", "o1", "v1")).await.unwrap();
        assert_eq!(outcome, ObjectReplicationOutcome::Failed);
        assert_eq!(backend.last_status.lock().unwrap().as_deref(), Some("FAILED"));
    }

    #[tokio::test]
    async fn absent_remote_descriptor_triggers_full_put() {
        let client = Arc::new(StubRemoteClient {
            remote_descriptor: Mutex::new(None),
            put_called: AtomicUsize::new(0),
            copy_called: AtomicUsize::new(0),
        });
        let backend = Arc::new(StubBackend { last_status: Mutex::new(None) });
        let events = Arc::new(StubEvents { sent: AtomicBool::new(false) });
        let collaborators = make_collaborators(Arc::new(StubTargetsWithClient { client: client.clone() }), backend.clone(), events);
        let outcome = replicate_object(&collaborators, &cfg(), &descriptor_for("b1", "o1", "v1")).await.unwrap();
        assert_eq!(outcome, ObjectReplicationOutcome::Completed);
        assert_eq!(client.put_called.load(Ordering::SeqCst), 1);
        assert_eq!(backend.last_status.lock().unwrap().as_deref(), Some("COMPLETED"));
    }

    #[tokio::test]
    async fn identical_remote_descriptor_skips_transfer() {
        let source = descriptor_for("b1", "o1", "v1");
        let remote = crate::types::RemoteObjectDescriptor {
            etag: source.etag.clone(),
            version_id: source.version_id.clone(),
            size: source.size,
            delete_marker: source.delete_marker,
            last_modified: Some(source.mod_time),
            content_type: source.content_type.clone(),
            storage_class: source.storage_class.clone(),
            user_metadata: source.user_defined.clone(),
            user_tags: source.user_tags.clone(),
        };
        let client = Arc::new(StubRemoteClient {
            remote_descriptor: Mutex::new(Some(remote)),
            put_called: AtomicUsize::new(0),
            copy_called: AtomicUsize::new(0),
        });
        let backend = Arc::new(StubBackend { last_status: Mutex::new(None) });
        let events = Arc::new(StubEvents { sent: AtomicBool::new(false) });
        let collaborators = make_collaborators(Arc::new(StubTargetsWithClient { client: client.clone() }), backend.clone(), events.clone());
        let outcome = replicate_object(&collaborators, &cfg(), &source).await.unwrap();
        assert_eq!(outcome, ObjectReplicationOutcome::Skipped);
        assert_eq!(client.put_called.load(Ordering::SeqCst), 0);
        assert_eq!(client.copy_called.load(Ordering::SeqCst), 0);
        assert!(backend.last_status.lock().unwrap().is_none(), "a skipped replication must not touch source status");
        assert!(!events.sent.load(Ordering::SeqCst), "a skipped replication must not emit an event");
    }
}
