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

//! Destination Validator (spec §4.7): checks a replication config's target is
//! reachable and compatible before it is accepted.

use url::Url;

use crate::collaborators::Collaborators;
use crate::config::ReplicationConfig;
use crate::error::{Error, Result};

/// Result of validating a destination: whether it is reachable/compatible, and
/// whether it resolves to the same host/port as `source_endpoint` (a pathological
/// self-replication topology the caller should reject).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub same_target: bool,
}

/// `arn:rustfs:replication::<role>` — the only ARN shape this core accepts. Returns
/// the role segment on success.
fn parse_replication_arn(arn: &str) -> Result<&str> {
    let mut parts = arn.splitn(5, ':');
    let (scheme, partition, service, _region_account, role) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    );
    match (scheme, partition, service, role) {
        (Some("arn"), Some(_), Some(service), Some(role)) if !role.is_empty() => {
            if service != "replication" {
                return Err(Error::ArnTypeInvalid { arn: arn.to_string() });
            }
            Ok(role)
        }
        _ => Err(Error::ArnInvalid { arn: arn.to_string() }),
    }
}

/// Validates `cfg`'s destination against the injected collaborators, for the source
/// bucket `bucket` (spec §6: `validateDestination(bucket, config)`). `source_endpoint`
/// is the local cluster's own reachable endpoint, used only for the self-replication
/// check.
pub async fn validate_destination(collaborators: &Collaborators, bucket: &str, cfg: &ReplicationConfig, source_endpoint: &Url) -> Result<ValidationOutcome> {
    parse_replication_arn(&cfg.role_arn)?;

    let Some(client) = collaborators.targets.get_remote_target_client(&cfg.role_arn) else {
        return Err(Error::TargetNotFound { arn: cfg.role_arn.clone() });
    };

    if !client.bucket_exists(&cfg.destination.bucket).await? {
        return Err(Error::DestinationNotFound {
            bucket: cfg.destination.bucket.clone(),
        });
    }

    let source_lock_enabled = collaborators.versioning.object_lock_enabled(bucket);
    if source_lock_enabled && !client.get_object_lock_config(&cfg.destination.bucket).await? {
        return Err(Error::DestinationMissingLock {
            bucket: cfg.destination.bucket.clone(),
        });
    }

    let same_target = same_host_and_port(source_endpoint, client.endpoint_url());

    Ok(ValidationOutcome { same_target })
}

fn same_host_and_port(a: &Url, b: &Url) -> bool {
    a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}
