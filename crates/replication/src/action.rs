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

//! Action Classifier (spec §4.2): decides whether a replicated version needs a full
//! copy, a metadata-only copy, or nothing at all.

use std::collections::HashMap;

use crate::headers::CONTENT_ENCODING;
use crate::tags::canonical_eq;
use crate::types::{ObjectDescriptor, ReplicationAction, RemoteObjectDescriptor};

/// Builds a fresh multi-valued view of `remote`'s flat user metadata rather than
/// mutating `remote` in place, which would be a bug if the remote descriptor is
/// reused by the caller (see DESIGN.md open question resolution #1).
fn normalize_remote_metadata(remote: &RemoteObjectDescriptor) -> HashMap<String, String> {
    remote.user_metadata.clone()
}

/// Total, order-sensitive classification: the first matching rule wins.
pub fn classify(source: &ObjectDescriptor, remote: Option<&RemoteObjectDescriptor>) -> ReplicationAction {
    let Some(remote) = remote else {
        return ReplicationAction::All;
    };

    if source.etag != remote.etag
        || source.version_id != remote.version_id
        || source.size != remote.size
        || source.delete_marker != remote.delete_marker
    {
        return ReplicationAction::All;
    }

    let mod_times_differ = match remote.last_modified {
        Some(remote_mtime) => source.mod_time != remote_mtime,
        None => true,
    };
    if mod_times_differ || source.content_type != remote.content_type || source.storage_class != remote.storage_class {
        return ReplicationAction::Metadata;
    }

    if !source.content_encoding.is_empty() {
        match remote.user_metadata.get(CONTENT_ENCODING) {
            Some(enc) if enc == &source.content_encoding => {}
            _ => return ReplicationAction::Metadata,
        }
    }

    let normalized_remote = normalize_remote_metadata(remote);
    if normalized_remote.len() != source.user_defined.len() {
        return ReplicationAction::Metadata;
    }
    for (k, v) in source.user_defined.iter() {
        match normalized_remote.get(k) {
            Some(rv) if rv == v => {}
            _ => return ReplicationAction::Metadata,
        }
    }

    if !canonical_eq(&source.user_tags, &remote.user_tags) {
        return ReplicationAction::Metadata;
    }

    ReplicationAction::None
}
