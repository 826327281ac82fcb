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

//! External collaborator interfaces (spec §6, §9). Everything out of scope per §1 —
//! bucket metadata storage, the remote-target registry, the object storage backend,
//! the event bus, the bandwidth monitor, and the versioning oracle — is modeled here
//! as an explicit trait passed into the core at construction, never as ambient
//! process-level state.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::config::ReplicationConfig;
use crate::error::Result;
use crate::events::ReplicationEvent;
use crate::metadata::PutOptions;
use crate::types::{ObjectDescriptor, RemoteObjectDescriptor};

pub type BoxedAsyncReader = Pin<Box<dyn AsyncRead + Send + Sync>>;

/// `getReplicationConfig(bucket)`.
#[async_trait]
pub trait ReplicationConfigStore: Send + Sync {
    async fn get_replication_config(&self, bucket: &str) -> Result<Option<ReplicationConfig>>;
}

/// Per-target metadata needed at replication time (currently just the bandwidth cap).
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetInfo {
    pub bandwidth_limit: i64,
}

/// `getBucketTarget`/`getRemoteTargetClient` and the registered remote's operations.
#[async_trait]
pub trait BucketTargetRegistry: Send + Sync {
    async fn get_bucket_target(&self, bucket: &str, role_arn: &str) -> Result<TargetInfo>;
    fn get_remote_target_client(&self, role_arn: &str) -> Option<Arc<dyn RemoteClient>>;
    /// Number of nodes in the local cluster, used to spread `BandwidthLimit` across
    /// workers (spec §4.5 step 6). Always at least 1.
    fn cluster_node_count(&self) -> usize {
        1
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoveObjectOptions {
    pub version_id: String,
    pub replication_mtime: Option<time::OffsetDateTime>,
    pub replication_delete_marker: bool,
    pub replication_status_replica: bool,
}

/// An S3-compatible client bound to one configured remote target.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
    /// Returns true if the destination bucket has object-lock enabled.
    async fn get_object_lock_config(&self, bucket: &str) -> Result<bool>;
    async fn stat_object(&self, bucket: &str, object: &str, version_id: &str) -> Result<Option<RemoteObjectDescriptor>>;
    async fn put_object(&self, bucket: &str, object: &str, reader: BoxedAsyncReader, size: i64, opts: &PutOptions) -> Result<()>;
    async fn copy_object(
        &self,
        bucket: &str,
        object: &str,
        source_version_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()>;
    async fn remove_object(&self, bucket: &str, object: &str, opts: &RemoveObjectOptions) -> Result<()>;
    fn endpoint_url(&self) -> &url::Url;
}

/// A freshly opened read stream of one object version plus its live descriptor, as
/// returned by `getObjectNInfo` under read-lock semantics.
pub struct ObjectReader {
    pub descriptor: ObjectDescriptor,
    pub stream: BoxedAsyncReader,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteObjectOptions {
    pub version_id: String,
    pub delete_marker: bool,
    pub replication_status: Option<crate::types::StatusType>,
    pub version_purge_status: Option<crate::types::VersionPurgeStatusType>,
    pub versioned: bool,
    pub version_suspended: bool,
}

/// A page of object versions returned by the Resync Engine's lister, with an opaque
/// continuation cursor.
#[derive(Debug, Clone, Default)]
pub struct ObjectVersionPage {
    pub objects: Vec<ObjectDescriptor>,
    pub next_cursor: Option<String>,
}

/// `getObjectNInfo`/`copyObject`/`deleteObject`/`listObjectVersions` on the source
/// object backend.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn get_object_n_info(&self, bucket: &str, object: &str, version_id: &str) -> Result<ObjectReader>;
    /// Rewrites headers for a version without rewriting its data (spec §9: "a
    /// targeted header-patch API"). Used for writeback after a replication attempt.
    async fn copy_object_metadata_only(&self, bucket: &str, object: &str, version_id: &str, user_defined: HashMap<String, String>) -> Result<()>;
    async fn delete_object(&self, bucket: &str, object: &str, opts: &DeleteObjectOptions) -> Result<()>;
    async fn list_object_versions(&self, bucket: &str, after_cursor: Option<String>) -> Result<ObjectVersionPage>;
}

/// `enabled(bucket)`/`suspended(bucket)`/`object_lock_enabled(bucket)`.
pub trait VersioningOracle: Send + Sync {
    fn enabled(&self, bucket: &str) -> bool;
    fn suspended(&self, bucket: &str) -> bool;
    /// Whether the *source* bucket has object-lock enabled, used by the Destination
    /// Validator to require the same of the remote (spec §4.7 item 4).
    fn object_lock_enabled(&self, bucket: &str) -> bool;
}

/// `send(eventName, bucket, object, host)`.
pub trait EventBus: Send + Sync {
    fn send(&self, event: ReplicationEvent);
}

/// `newMonitoredReader(ctx, bucket, name, reader, headerSize, perNodeLimit, totalLimit)`.
pub trait BandwidthMonitor: Send + Sync {
    fn new_monitored_reader(
        &self,
        bucket: &str,
        object: &str,
        reader: BoxedAsyncReader,
        header_size: usize,
        per_node_limit: i64,
        total_limit: i64,
    ) -> BoxedAsyncReader;
}

/// `save_config`/`read_config`, used only by the Resync Engine to persist its status
/// snapshot.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn save_config(&self, path: &str, data: Vec<u8>) -> Result<()>;
    async fn read_config(&self, path: &str) -> Result<Vec<u8>>;
}

/// The full set of collaborators the core is constructed with (spec §9: explicit
/// constructor arguments, never ambient globals). Cheap to clone: every field is an
/// `Arc`.
#[derive(Clone)]
pub struct Collaborators {
    pub config_store: Arc<dyn ReplicationConfigStore>,
    pub targets: Arc<dyn BucketTargetRegistry>,
    pub backend: Arc<dyn ObjectBackend>,
    pub versioning: Arc<dyn VersioningOracle>,
    pub events: Arc<dyn EventBus>,
    pub bandwidth: Arc<dyn BandwidthMonitor>,
    pub config_kv: Arc<dyn ConfigStore>,
}
