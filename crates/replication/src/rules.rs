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

//! Rule Engine (spec §4.1): the only synchronous decision point on the write path.

use crate::config::{ObjectOpts, ReplicationConfig};
use crate::types::{DeletedObjectDescriptor, ObjectDescriptor, StatusType};

/// `shouldReplicate` — returns true iff an enabled rule matches and permits this
/// action class. A `REPLICA` object short-circuits to false regardless of rules, to
/// prevent replication cycles on bidirectional configurations.
pub fn should_replicate(cfg: &ReplicationConfig, opts: &ObjectOpts, current_status: &StatusType) -> bool {
    if *current_status == StatusType::Replica {
        return false;
    }
    cfg.replicate(opts)
}

/// Convenience overload taking the live `ObjectDescriptor` directly.
pub fn should_replicate_object(cfg: &ReplicationConfig, object: &ObjectDescriptor) -> bool {
    if object.is_replica() {
        return false;
    }
    let opts = ObjectOpts {
        name: object.name.clone(),
        user_tags: object.user_tags.clone(),
        ssec: object.ssec,
        delete_marker: object.delete_marker,
        version_id: object.version_id.clone(),
        op_is_version_purge: false,
    };
    cfg.replicate(&opts)
}

/// `shouldReplicateDelete` — decides whether a delete (marker creation, or permanent
/// versioned purge) qualifies for replication. When the backend's `getObjectInfo` for
/// the just-deleted name already failed (`get_object_err`), the decision falls back to
/// whatever replication state the object carried before the delete, rather than
/// re-evaluating rules — the object is gone, so the only information left is what was
/// already recorded on it.
///
/// Returns `(is_delete_marker, replicate)`.
pub fn should_replicate_delete(
    cfg: Option<&ReplicationConfig>,
    deleted: &DeletedObjectDescriptor,
    current_object: Option<&ObjectDescriptor>,
    get_object_err: bool,
) -> (bool, bool) {
    let Some(cfg) = cfg else {
        return (false, false);
    };

    if get_object_err {
        let Some(current) = current_object else {
            return (false, false);
        };
        let valid_status = matches!(
            current.replication_status,
            StatusType::Pending | StatusType::Completed | StatusType::Failed
        );
        return (current.delete_marker, current.delete_marker && valid_status);
    }

    let ssec = current_object.map(|o| o.ssec).unwrap_or(false);
    let user_tags = current_object.map(|o| o.user_tags.clone()).unwrap_or_default();
    let delete_marker = current_object.map(|o| o.delete_marker).unwrap_or(deleted.delete_marker);

    let opts = ObjectOpts {
        name: deleted.object.clone(),
        user_tags,
        ssec,
        delete_marker: true,
        version_id: deleted.version_id.clone(),
        op_is_version_purge: deleted.is_version_purge(),
    };
    (delete_marker, cfg.replicate(&opts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Destination, ReplicationRule};
    use std::collections::BTreeMap;

    fn cfg_with(delete_marker: bool, delete_replication: bool) -> ReplicationConfig {
        ReplicationConfig {
            role_arn: "arn:rustfs:replication::role".into(),
            destination: Destination {
                bucket: "dst".into(),
                storage_class: None,
            },
            rules: vec![ReplicationRule {
                id: "r1".into(),
                enabled: true,
                prefix: String::new(),
                tags: BTreeMap::new(),
                delete_marker_replication: delete_marker,
                delete_replication,
            }],
        }
    }

    #[test]
    fn replica_never_replicates() {
        let cfg = cfg_with(true, true);
        let opts = ObjectOpts {
            name: "x".into(),
            ..Default::default()
        };
        assert!(!should_replicate(&cfg, &opts, &StatusType::Replica));
    }

    #[test]
    fn pending_object_replicates_when_rule_matches() {
        let cfg = cfg_with(true, true);
        let opts = ObjectOpts {
            name: "x".into(),
            ..Default::default()
        };
        assert!(should_replicate(&cfg, &opts, &StatusType::Empty));
    }

    #[test]
    fn delete_marker_requires_delete_marker_toggle() {
        let cfg = cfg_with(false, true);
        let deleted = DeletedObjectDescriptor {
            bucket: "b".into(),
            object: "x".into(),
            delete_marker_version_id: "dm1".into(),
            version_id: String::new(),
            delete_marker_mtime: None,
            delete_marker_replication_status: StatusType::Pending,
            version_purge_status: Default::default(),
            delete_marker: true,
        };
        let (is_dm, replicate) = should_replicate_delete(Some(&cfg), &deleted, None, false);
        assert!(is_dm);
        assert!(!replicate);
    }

    #[test]
    fn version_purge_requires_delete_replication_toggle() {
        let cfg = cfg_with(true, true);
        let deleted = DeletedObjectDescriptor {
            bucket: "b".into(),
            object: "x".into(),
            delete_marker_version_id: String::new(),
            version_id: "v1".into(),
            delete_marker_mtime: None,
            delete_marker_replication_status: StatusType::Empty,
            version_purge_status: Default::default(),
            delete_marker: false,
        };
        let (_, replicate) = should_replicate_delete(Some(&cfg), &deleted, None, false);
        assert!(replicate);
    }

    #[test]
    fn missing_config_never_replicates_delete() {
        let deleted = DeletedObjectDescriptor {
            bucket: "b".into(),
            object: "x".into(),
            delete_marker_version_id: "dm1".into(),
            version_id: String::new(),
            delete_marker_mtime: None,
            delete_marker_replication_status: StatusType::Empty,
            version_purge_status: Default::default(),
            delete_marker: true,
        };
        assert_eq!(should_replicate_delete(None, &deleted, None, false), (false, false));
    }

    #[test]
    fn get_object_err_falls_back_to_recorded_status() {
        let cfg = cfg_with(true, true);
        let deleted = DeletedObjectDescriptor {
            bucket: "b".into(),
            object: "x".into(),
            delete_marker_version_id: "dm1".into(),
            version_id: String::new(),
            delete_marker_mtime: None,
            delete_marker_replication_status: StatusType::Empty,
            version_purge_status: Default::default(),
            delete_marker: true,
        };
        let current = ObjectDescriptor {
            bucket: "b".into(),
            name: "x".into(),
            version_id: "dm1".into(),
            size: 0,
            actual_size: 0,
            etag: String::new(),
            mod_time: time::OffsetDateTime::UNIX_EPOCH,
            content_type: String::new(),
            content_encoding: String::new(),
            storage_class: String::new(),
            user_defined: Default::default(),
            user_tags: String::new(),
            delete_marker: true,
            replication_status: StatusType::Pending,
            version_purge_status: Default::default(),
            ssec: false,
        };
        let (is_dm, replicate) = should_replicate_delete(Some(&cfg), &deleted, Some(&current), true);
        assert!(is_dm);
        assert!(replicate);
    }
}
