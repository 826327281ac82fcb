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

//! Replication configuration domain types (spec §3) and the core's own tunables
//! (spec §4.8).

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::Error;

/// The object subset the Rule Engine needs to reach a decision (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct ObjectOpts {
    pub name: String,
    pub user_tags: String,
    pub ssec: bool,
    pub delete_marker: bool,
    pub version_id: String,
    /// Set when this evaluation is for a permanent versioned delete (a DELETE that
    /// named an explicit version id), as opposed to a delete-marker creation.
    pub op_is_version_purge: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Destination {
    pub bucket: String,
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationRule {
    pub id: String,
    pub enabled: bool,
    pub prefix: String,
    /// Conjunctive tag filter: every pair here must be present, with equal value, on
    /// the candidate object's tags.
    pub tags: BTreeMap<String, String>,
    pub delete_marker_replication: bool,
    pub delete_replication: bool,
}

impl ReplicationRule {
    fn matches_prefix(&self, name: &str) -> bool {
        self.prefix.is_empty() || name.starts_with(&self.prefix)
    }

    fn matches_tags(&self, candidate: &crate::tags::ObjectTags) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let candidate = candidate.to_map();
        self.tags.iter().all(|(k, v)| candidate.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationConfig {
    pub role_arn: String,
    pub destination: Destination,
    pub rules: Vec<ReplicationRule>,
}

impl ReplicationConfig {
    /// Finds an enabled rule whose prefix and tag filter match `opts`, honoring the
    /// per-action-class toggles. See spec §4.1 for the exact contract.
    pub fn matching_rule(&self, opts: &ObjectOpts) -> Option<&ReplicationRule> {
        let tags = crate::tags::ObjectTags::parse(&opts.user_tags).ok()?;
        self.rules.iter().find(|rule| {
            if !rule.enabled {
                return false;
            }
            if !rule.matches_prefix(&opts.name) || !rule.matches_tags(&tags) {
                return false;
            }
            if opts.delete_marker && !opts.op_is_version_purge {
                return rule.delete_marker_replication;
            }
            if opts.op_is_version_purge {
                return rule.delete_replication;
            }
            true
        })
    }

    pub fn replicate(&self, opts: &ObjectOpts) -> bool {
        self.matching_rule(opts).is_some()
    }

    /// Returns true if any enabled rule's prefix matches `prefix`, gating only on
    /// whether the relevant delete toggle is on when `for_delete` is set.
    pub fn has_active_rules(&self, prefix: &str, for_delete: bool) -> bool {
        self.rules.iter().any(|r| {
            r.enabled
                && r.matches_prefix(prefix)
                && (!for_delete || r.delete_marker_replication || r.delete_replication)
        })
    }
}

impl TryFrom<&s3s::dto::ReplicationConfiguration> for ReplicationConfig {
    type Error = Error;

    fn try_from(cfg: &s3s::dto::ReplicationConfiguration) -> Result<Self, Self::Error> {
        let mut rules = Vec::with_capacity(cfg.rules.len());
        let mut destination = Destination::default();
        for rule in cfg.rules.iter() {
            let enabled = matches!(rule.status, s3s::dto::ReplicationRuleStatus::Enabled);
            let (prefix, tags) = match rule.filter.as_ref() {
                Some(filter) => {
                    let prefix = filter.prefix.clone().unwrap_or_default();
                    let mut tags = BTreeMap::new();
                    if let Some(tag) = filter.tag.as_ref() {
                        tags.insert(tag.key.clone(), tag.value.clone());
                    }
                    if let Some(and) = filter.and.as_ref() {
                        for t in and.tags.iter().flatten() {
                            tags.insert(t.key.clone(), t.value.clone());
                        }
                    }
                    (prefix, tags)
                }
                None => (rule.prefix.clone().unwrap_or_default(), BTreeMap::new()),
            };
            let delete_marker_replication = rule
                .delete_marker_replication
                .as_ref()
                .map(|d| matches!(d.status, s3s::dto::DeleteMarkerReplicationStatus::Enabled))
                .unwrap_or(false);
            let delete_replication = rule
                .delete_replication
                .as_ref()
                .map(|d| matches!(d.status, s3s::dto::DeleteReplicationStatus::Enabled))
                .unwrap_or(false);
            if destination.bucket.is_empty() {
                destination.bucket = rule.destination.bucket.clone();
                destination.storage_class = rule.destination.storage_class.as_ref().map(|s| s.as_str().to_string());
            }
            rules.push(ReplicationRule {
                id: rule.id.clone().unwrap_or_default(),
                enabled,
                prefix,
                tags,
                delete_marker_replication,
                delete_replication,
            });
        }
        Ok(ReplicationConfig {
            role_arn: cfg.role.clone(),
            destination,
            rules,
        })
    }
}

/// The core's own tunables (spec §4.8). Constructed with `Default` and overridden
/// field-by-field by the embedding application; never read from ambient global state.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub object_queue_capacity: usize,
    pub delete_queue_capacity: usize,
    pub worker_count: usize,
    pub mrf_worker_count: usize,
    pub mrf_max_retries: u32,
    pub mrf_retry_backoff: Duration,
    pub mrf_queue_capacity: usize,
    pub resync_worker_count: usize,
    pub resync_persist_interval: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            object_queue_capacity: 10_000,
            delete_queue_capacity: 10_000,
            worker_count: (parallelism / 2).max(1),
            mrf_worker_count: 4,
            mrf_max_retries: 3,
            mrf_retry_backoff: Duration::from_secs(5),
            mrf_queue_capacity: 100_000,
            resync_worker_count: 10,
            resync_persist_interval: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(prefix: &str, enabled: bool) -> ReplicationRule {
        ReplicationRule {
            id: "r1".into(),
            enabled,
            prefix: prefix.into(),
            tags: BTreeMap::new(),
            delete_marker_replication: false,
            delete_replication: false,
        }
    }

    #[test]
    fn empty_prefix_matches_everything() {
        let cfg = ReplicationConfig {
            role_arn: "arn".into(),
            destination: Destination::default(),
            rules: vec![rule("", true)],
        };
        assert!(cfg.replicate(&ObjectOpts {
            name: "anything/at/all".into(),
            ..Default::default()
        }));
    }

    #[test]
    fn disabled_rule_never_matches() {
        let cfg = ReplicationConfig {
            role_arn: "arn".into(),
            destination: Destination::default(),
            rules: vec![rule("", false)],
        };
        assert!(!cfg.replicate(&ObjectOpts {
            name: "x".into(),
            ..Default::default()
        }));
    }

    #[test]
    fn delete_marker_requires_toggle() {
        let mut r = rule("", true);
        r.delete_marker_replication = false;
        let cfg = ReplicationConfig {
            role_arn: "arn".into(),
            destination: Destination::default(),
            rules: vec![r],
        };
        assert!(!cfg.replicate(&ObjectOpts {
            name: "x".into(),
            delete_marker: true,
            ..Default::default()
        }));
    }

    #[test]
    fn tag_filter_is_conjunctive() {
        let mut r = rule("", true);
        r.tags.insert("env".into(), "prod".into());
        r.tags.insert("team".into(), "core".into());
        let cfg = ReplicationConfig {
            role_arn: "arn".into(),
            destination: Destination::default(),
            rules: vec![r],
        };
        assert!(!cfg.replicate(&ObjectOpts {
            name: "x".into(),
            user_tags: "env=prod".into(),
            ..Default::default()
        }));
        assert!(cfg.replicate(&ObjectOpts {
            name: "x".into(),
            user_tags: "env=prod&team=core".into(),
            ..Default::default()
        }));
    }
}
