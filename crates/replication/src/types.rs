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

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;

/// StatusType of Replication for x-amz-replication-status header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StatusType {
    /// Pending - replication is pending.
    Pending,
    /// Completed - replication completed ok.
    Completed,
    /// CompletedLegacy was called "COMPLETE" incorrectly.
    CompletedLegacy,
    /// Failed - replication failed.
    Failed,
    /// Replica - this is a replica.
    Replica,
    #[default]
    Empty,
}

impl StatusType {
    /// Returns string representation of status
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusType::Pending => "PENDING",
            StatusType::Completed => "COMPLETED",
            StatusType::CompletedLegacy => "COMPLETE",
            StatusType::Failed => "FAILED",
            StatusType::Replica => "REPLICA",
            StatusType::Empty => "",
        }
    }
}

impl fmt::Display for StatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for StatusType {
    fn from(s: &str) -> Self {
        match s {
            "PENDING" => StatusType::Pending,
            "COMPLETED" => StatusType::Completed,
            "COMPLETE" => StatusType::CompletedLegacy,
            "FAILED" => StatusType::Failed,
            "REPLICA" => StatusType::Replica,
            _ => StatusType::Empty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VersionPurgeStatusType {
    Pending,
    Complete,
    Failed,
    #[default]
    Empty,
}

impl VersionPurgeStatusType {
    /// Returns string representation of version purge status
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionPurgeStatusType::Pending => "PENDING",
            VersionPurgeStatusType::Complete => "COMPLETE",
            VersionPurgeStatusType::Failed => "FAILED",
            VersionPurgeStatusType::Empty => "",
        }
    }

    /// Returns true if the version is pending purge.
    pub fn is_pending(&self) -> bool {
        matches!(self, VersionPurgeStatusType::Pending | VersionPurgeStatusType::Failed)
    }
}

impl fmt::Display for VersionPurgeStatusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for VersionPurgeStatusType {
    fn from(s: &str) -> Self {
        match s {
            "PENDING" => VersionPurgeStatusType::Pending,
            "COMPLETE" => VersionPurgeStatusType::Complete,
            "FAILED" => VersionPurgeStatusType::Failed,
            _ => VersionPurgeStatusType::Empty,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MRFReplicateEntry {
    #[serde(rename = "bucket")]
    pub bucket: String,

    #[serde(rename = "object")]
    pub object: String,

    #[serde(skip_serializing, skip_deserializing)]
    pub version_id: String,

    #[serde(rename = "retryCount")]
    pub retry_count: i32,

    #[serde(skip_serializing, skip_deserializing)]
    pub size: i64,
}

pub trait ReplicationWorkerOperation: Any + Send + Sync {
    fn to_mrf_entry(&self) -> MRFReplicateEntry;
    fn as_any(&self) -> &dyn Any;
}

/// ReplicationState represents internal replication state
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicationState {
    pub replica_timestamp: Option<OffsetDateTime>,
    pub replica_status: StatusType,
    pub delete_marker: bool,
    pub replication_timestamp: Option<OffsetDateTime>,
    pub replication_status_internal: String,
    pub version_purge_status_internal: String,
    pub replicate_decision_str: String,
    pub targets: HashMap<String, StatusType>,
    pub purge_targets: HashMap<String, VersionPurgeStatusType>,
    pub reset_statuses_map: HashMap<String, String>,
}

impl ReplicationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if replication state is identical for version purge statuses and replication statuses
    pub fn equal(&self, other: &ReplicationState) -> bool {
        self.replica_status == other.replica_status
            && self.replication_status_internal == other.replication_status_internal
            && self.version_purge_status_internal == other.version_purge_status_internal
    }

    /// Returns overall replication status for the object version being replicated
    pub fn composite_replication_status(&self) -> StatusType {
        if !self.replication_status_internal.is_empty() {
            match StatusType::from(self.replication_status_internal.as_str()) {
                StatusType::Pending | StatusType::Completed | StatusType::Failed | StatusType::Replica => {
                    return StatusType::from(self.replication_status_internal.as_str());
                }
                _ => {
                    let repl_status = get_composite_replication_status(&self.targets);

                    if self.replica_timestamp.is_none() {
                        return repl_status;
                    }

                    if repl_status == StatusType::Completed {
                        if let (Some(replica_timestamp), Some(replication_timestamp)) =
                            (self.replica_timestamp, self.replication_timestamp)
                        {
                            if replica_timestamp > replication_timestamp {
                                return self.replica_status.clone();
                            }
                        }
                    }

                    return repl_status;
                }
            }
        } else if self.replica_status != StatusType::default() {
            return self.replica_status.clone();
        }

        StatusType::default()
    }

    /// Returns overall replication purge status for the permanent delete being replicated
    pub fn composite_version_purge_status(&self) -> VersionPurgeStatusType {
        match VersionPurgeStatusType::from(self.version_purge_status_internal.as_str()) {
            VersionPurgeStatusType::Pending | VersionPurgeStatusType::Complete | VersionPurgeStatusType::Failed => {
                VersionPurgeStatusType::from(self.version_purge_status_internal.as_str())
            }
            _ => get_composite_version_purge_status(&self.purge_targets),
        }
    }

    /// Returns replicatedInfos struct initialized with the previous state of replication
    pub fn target_state(&self, arn: &str) -> ReplicatedTargetInfo {
        ReplicatedTargetInfo {
            arn: arn.to_string(),
            prev_replication_status: self.targets.get(arn).cloned().unwrap_or_default(),
            version_purge_status: self.purge_targets.get(arn).cloned().unwrap_or_default(),
            resync_timestamp: self.reset_statuses_map.get(arn).cloned().unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReplicationAction {
    /// Replicate all data
    All,
    /// Replicate only metadata
    Metadata,
    /// Do not replicate
    #[default]
    None,
}

impl ReplicationAction {
    /// Returns string representation of replication action
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationAction::All => "all",
            ReplicationAction::Metadata => "metadata",
            ReplicationAction::None => "none",
        }
    }
}

impl fmt::Display for ReplicationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for ReplicationAction {
    fn from(s: &str) -> Self {
        match s {
            "all" => ReplicationAction::All,
            "metadata" => ReplicationAction::Metadata,
            "none" => ReplicationAction::None,
            _ => ReplicationAction::None,
        }
    }
}

/// Type - replication type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Type {
    #[default]
    UnsetReplicationType,
    ObjectReplicationType,
    DeleteReplicationType,
    MetadataReplicationType,
    HealReplicationType,
    ExistingObjectReplicationType,
    ResyncReplicationType,
    AllReplicationType,
}

impl Type {
    pub fn as_str(&self) -> &'static str {
        match self {
            Type::UnsetReplicationType => "",
            Type::ObjectReplicationType => "OBJECT",
            Type::DeleteReplicationType => "DELETE",
            Type::MetadataReplicationType => "METADATA",
            Type::HealReplicationType => "HEAL",
            Type::ExistingObjectReplicationType => "EXISTING_OBJECT",
            Type::ResyncReplicationType => "RESYNC",
            Type::AllReplicationType => "ALL",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            Type::ObjectReplicationType
                | Type::DeleteReplicationType
                | Type::MetadataReplicationType
                | Type::HealReplicationType
                | Type::ExistingObjectReplicationType
                | Type::ResyncReplicationType
                | Type::AllReplicationType
        )
    }

    pub fn is_data_replication(&self) -> bool {
        matches!(
            self,
            Type::ObjectReplicationType | Type::DeleteReplicationType | Type::HealReplicationType
        )
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for Type {
    fn from(s: &str) -> Self {
        match s {
            "UNSET" => Type::UnsetReplicationType,
            "OBJECT" => Type::ObjectReplicationType,
            "DELETE" => Type::DeleteReplicationType,
            "METADATA" => Type::MetadataReplicationType,
            "HEAL" => Type::HealReplicationType,
            "EXISTING_OBJECT" => Type::ExistingObjectReplicationType,
            "RESYNC" => Type::ResyncReplicationType,
            "ALL" => Type::AllReplicationType,
            _ => Type::UnsetReplicationType,
        }
    }
}

/// ReplicatedTargetInfo struct represents replication info on a target
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicatedTargetInfo {
    pub arn: String,
    pub size: i64,
    pub duration: Duration,
    pub replication_action: ReplicationAction,
    pub op_type: Type,
    pub replication_status: StatusType,
    pub prev_replication_status: StatusType,
    pub version_purge_status: VersionPurgeStatusType,
    pub resync_timestamp: String,
    pub replication_resynced: bool,
    pub endpoint: String,
    pub secure: bool,
    pub error: Option<String>,
}

impl ReplicatedTargetInfo {
    /// Returns true for a target if arn is empty
    pub fn is_empty(&self) -> bool {
        self.arn.is_empty()
    }
}

pub fn get_composite_replication_status(targets: &HashMap<String, StatusType>) -> StatusType {
    if targets.is_empty() {
        return StatusType::Empty;
    }

    let mut completed = 0;
    for status in targets.values() {
        match status {
            StatusType::Failed => return StatusType::Failed,
            StatusType::Completed => completed += 1,
            _ => {}
        }
    }

    if completed == targets.len() {
        StatusType::Completed
    } else {
        StatusType::Pending
    }
}

pub fn get_composite_version_purge_status(targets: &HashMap<String, VersionPurgeStatusType>) -> VersionPurgeStatusType {
    if targets.is_empty() {
        return VersionPurgeStatusType::default();
    }

    let mut completed = 0;
    for status in targets.values() {
        match status {
            VersionPurgeStatusType::Failed => return VersionPurgeStatusType::Failed,
            VersionPurgeStatusType::Complete => completed += 1,
            _ => {}
        }
    }

    if completed == targets.len() {
        VersionPurgeStatusType::Complete
    } else {
        VersionPurgeStatusType::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicateTargetDecision {
    pub replicate: bool,
    pub synchronous: bool,
    pub arn: String,
    pub id: String,
}

impl ReplicateTargetDecision {
    pub fn new(arn: String, replicate: bool, sync: bool) -> Self {
        Self {
            replicate,
            synchronous: sync,
            arn,
            id: String::new(),
        }
    }
}

impl fmt::Display for ReplicateTargetDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{};{}", self.replicate, self.synchronous, self.arn, self.id)
    }
}

/// ReplicateDecision represents replication decision for each target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateDecision {
    pub targets_map: HashMap<String, ReplicateTargetDecision>,
}

impl ReplicateDecision {
    pub fn new() -> Self {
        Self {
            targets_map: HashMap::new(),
        }
    }

    /// Returns true if at least one target qualifies for replication
    pub fn replicate_any(&self) -> bool {
        self.targets_map.values().any(|t| t.replicate)
    }

    /// Returns true if at least one target qualifies for synchronous replication
    pub fn is_synchronous(&self) -> bool {
        self.targets_map.values().any(|t| t.synchronous)
    }

    /// Updates ReplicateDecision with target's replication decision
    pub fn set(&mut self, target: ReplicateTargetDecision) {
        self.targets_map.insert(target.arn.clone(), target);
    }

    /// Returns a stringified representation of internal replication status with all targets marked as `PENDING`
    pub fn pending_status(&self) -> String {
        let mut result = String::new();
        for target in self.targets_map.values() {
            if target.replicate {
                result.push_str(&format!("{}={};", target.arn, StatusType::Pending.as_str()));
            }
        }
        result
    }
}

impl fmt::Display for ReplicateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = String::new();
        for (key, value) in &self.targets_map {
            result.push_str(&format!("{key}={value},"));
        }
        write!(f, "{}", result.trim_end_matches(','))
    }
}

impl Default for ReplicateDecision {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResyncTargetDecision {
    pub replicate: bool,
    pub reset_id: String,
    pub reset_before_date: Option<OffsetDateTime>,
}

/// ResyncDecision is a struct representing a map with target's individual resync decisions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResyncDecision {
    pub targets: HashMap<String, ResyncTargetDecision>,
}

impl ResyncDecision {
    pub fn new() -> Self {
        Self { targets: HashMap::new() }
    }

    /// Returns true if no targets with resync decision present
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn must_resync(&self) -> bool {
        self.targets.values().any(|v| v.replicate)
    }

    pub fn must_resync_target(&self, tgt_arn: &str) -> bool {
        self.targets.get(tgt_arn).map(|v| v.replicate).unwrap_or(false)
    }
}

impl Default for ResyncDecision {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateObjectInfo {
    pub name: String,
    pub size: i64,
    pub actual_size: i64,
    pub bucket: String,
    pub version_id: String,
    pub etag: String,
    pub mod_time: Option<OffsetDateTime>,
    pub replication_status: StatusType,
    pub replication_status_internal: String,
    pub delete_marker: bool,
    pub version_purge_status_internal: String,
    pub version_purge_status: VersionPurgeStatusType,
    pub replication_state: ReplicationState,
    pub op_type: Type,
    pub dsc: ReplicateDecision,
    pub existing_obj_resync: ResyncDecision,
    pub target_statuses: HashMap<String, StatusType>,
    pub target_purge_statuses: HashMap<String, VersionPurgeStatusType>,
    pub replication_timestamp: Option<OffsetDateTime>,
    pub ssec: bool,
    pub user_tags: HashMap<String, String>,
    pub checksum: Option<String>,
    pub retry_count: u32,
}

/// The source-side view of a single object version (spec §3 Object Descriptor). This
/// is the working type for the Rule Engine, Action Classifier, Metadata Projector and
/// Object Replicator; it deliberately carries a single `replication_status` /
/// `version_purge_status` pair rather than a multi-target map, per the single-target
/// Non-goal. `ReplicationState`'s multi-target composite-status machinery above is
/// retained for the property it models (see DESIGN.md) but is not threaded through
/// this flat descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    pub bucket: String,
    pub name: String,
    pub version_id: String,
    pub size: i64,
    pub actual_size: i64,
    pub etag: String,
    pub mod_time: OffsetDateTime,
    pub content_type: String,
    pub content_encoding: String,
    pub storage_class: String,
    /// User-defined metadata, keys treated case-insensitively by callers. Entries whose
    /// lower-cased key matches the reserved-internal prefix are not user-visible.
    pub user_defined: HashMap<String, String>,
    pub user_tags: String,
    pub delete_marker: bool,
    pub replication_status: StatusType,
    pub version_purge_status: VersionPurgeStatusType,
    pub ssec: bool,
}

impl ObjectDescriptor {
    /// An object currently marked as a replica is never re-replicated, preventing
    /// cycles on bidirectional configurations.
    pub fn is_replica(&self) -> bool {
        self.replication_status == StatusType::Replica
    }
}

/// Source-side view of a deleted object version (spec §3 Deleted Object Descriptor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedObjectDescriptor {
    pub bucket: String,
    pub object: String,
    pub delete_marker_version_id: String,
    /// Non-empty only for a permanent versioned delete (`DELETE ?versionId=...`).
    pub version_id: String,
    pub delete_marker_mtime: Option<OffsetDateTime>,
    pub delete_marker_replication_status: StatusType,
    pub version_purge_status: VersionPurgeStatusType,
    pub delete_marker: bool,
}

impl DeletedObjectDescriptor {
    /// The version id actually targeted by the remote delete call: the delete marker's
    /// own version id if one was created, else the explicit purge version id.
    pub fn target_version_id(&self) -> &str {
        if !self.delete_marker_version_id.is_empty() {
            &self.delete_marker_version_id
        } else {
            &self.version_id
        }
    }

    /// True when this delete names an explicit version (a permanent versioned purge)
    /// rather than creating a new delete marker.
    pub fn is_version_purge(&self) -> bool {
        !self.version_id.is_empty()
    }
}

/// The remote's view of an object version, as returned by `statObject` (spec §4.2).
/// `user_metadata` is the flat, single-valued header map the remote hands back; the
/// Action Classifier folds it into a multi-valued view for comparison rather than
/// mutating this struct (see DESIGN.md open question resolution #1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteObjectDescriptor {
    pub etag: String,
    pub version_id: String,
    pub size: i64,
    pub delete_marker: bool,
    pub last_modified: Option<OffsetDateTime>,
    pub content_type: String,
    pub storage_class: String,
    pub user_metadata: HashMap<String, String>,
    pub user_tags: String,
}

/// Tags a queued task with where it came from, for observability only — never
/// consulted by decision logic (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TaskOrigin {
    #[default]
    Live,
    Mrf,
    Resync,
}

impl fmt::Display for TaskOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskOrigin::Live => "live",
            TaskOrigin::Mrf => "mrf",
            TaskOrigin::Resync => "resync",
        };
        write!(f, "{s}")
    }
}

/// Tagged union of the two task kinds the Dispatch Engine moves through its queues
/// (spec §3 Replication Task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplicationTask {
    Object(ObjectDescriptor),
    Delete(DeletedObjectDescriptor),
}

impl ReplicationTask {
    /// A stable dedup key: (bucket, name, version-id). Used by the Dispatch Engine to
    /// silently drop a duplicate already present in a queue.
    pub fn dedup_key(&self) -> String {
        match self {
            ReplicationTask::Object(o) => format!("{}/{}/{}", o.bucket, o.name, o.version_id),
            ReplicationTask::Delete(d) => format!("{}/{}/{}", d.bucket, d.object, d.target_version_id()),
        }
    }
}

/// A task as it travels through the MRF retry path: the original task plus a retry
/// counter that is never reset by a fresh live-path submission (spec §3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task: ReplicationTask,
    pub origin: TaskOrigin,
    pub retry_count: u32,
}

impl ReplicationWorkerOperation for ObjectDescriptor {
    fn to_mrf_entry(&self) -> MRFReplicateEntry {
        MRFReplicateEntry {
            bucket: self.bucket.clone(),
            object: self.name.clone(),
            version_id: self.version_id.clone(),
            retry_count: 0,
            size: self.size,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ReplicationWorkerOperation for DeletedObjectDescriptor {
    fn to_mrf_entry(&self) -> MRFReplicateEntry {
        MRFReplicateEntry {
            bucket: self.bucket.clone(),
            object: self.object.clone(),
            version_id: self.target_version_id().to_string(),
            retry_count: 0,
            size: 0,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

lazy_static::lazy_static! {
    static ref REPL_STATUS_REGEX: Regex = Regex::new(r"([^=].*?)=([^,].*?);").unwrap();
}

impl ReplicateObjectInfo {
    /// Returns replication status of a target
    pub fn target_replication_status(&self, arn: &str) -> StatusType {
        let captures = REPL_STATUS_REGEX.captures_iter(&self.replication_status_internal);
        for cap in captures {
            if cap.len() == 3 && &cap[1] == arn {
                return StatusType::from(&cap[2]);
            }
        }
        StatusType::default()
    }

    /// Returns the relevant info needed by MRF
    pub fn to_mrf_entry(&self) -> MRFReplicateEntry {
        MRFReplicateEntry {
            bucket: self.bucket.clone(),
            object: self.name.clone(),
            version_id: self.version_id.clone(),
            retry_count: self.retry_count as i32,
            size: self.size,
        }
    }
}
