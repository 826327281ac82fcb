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

//! Event names and payload shape emitted after every replication attempt (spec §6/§7).

/// Fixed host tag stamped on every event this core emits.
pub const INTERNAL_REPLICATION_HOST: &str = "Internal: [Replication]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationEventName {
    ObjectReplicationComplete,
    ObjectReplicationFailed,
}

impl ReplicationEventName {
    pub fn for_outcome(failed: bool) -> Self {
        if failed {
            ReplicationEventName::ObjectReplicationFailed
        } else {
            ReplicationEventName::ObjectReplicationComplete
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicationEvent {
    pub name: ReplicationEventName,
    pub bucket: String,
    pub object: String,
    pub version_id: String,
    pub host: &'static str,
}

impl ReplicationEvent {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>, version_id: impl Into<String>, failed: bool) -> Self {
        Self {
            name: ReplicationEventName::for_outcome(failed),
            bucket: bucket.into(),
            object: object.into(),
            version_id: version_id.into(),
            host: INTERNAL_REPLICATION_HOST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_selects_correct_event_name() {
        assert_eq!(ReplicationEventName::for_outcome(false), ReplicationEventName::ObjectReplicationComplete);
        assert_eq!(ReplicationEventName::for_outcome(true), ReplicationEventName::ObjectReplicationFailed);
    }

    #[test]
    fn event_always_carries_fixed_host() {
        let e = ReplicationEvent::new("b1", "obj", "v1", false);
        assert_eq!(e.host, INTERNAL_REPLICATION_HOST);
    }
}
