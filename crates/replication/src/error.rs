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

//! Error taxonomy for the replication core (see spec §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every fallible collaborator call and internal decision in this crate resolves to
/// one of these variants. Variants carry enough context (bucket/object/arn) to be
/// logged directly without building ad hoc strings at every call site.
#[derive(Debug, Error)]
pub enum Error {
    #[error("replication config not found for bucket {bucket}")]
    ConfigNotFound { bucket: String },

    #[error("invalid role arn: {arn}")]
    ArnInvalid { arn: String },

    #[error("role arn {arn} is not a replication arn")]
    ArnTypeInvalid { arn: String },

    #[error("no remote target registered for arn {arn}")]
    TargetNotFound { arn: String },

    #[error("destination bucket {bucket} not found on remote")]
    DestinationNotFound { bucket: String },

    #[error("destination bucket {bucket} is missing object-lock configuration")]
    DestinationMissingLock { bucket: String },

    #[error("remote {op} failed for {bucket}/{object}: {source}")]
    TransientRemoteError {
        op: &'static str,
        bucket: String,
        object: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("local backend {op} failed for {bucket}/{object}: {source}")]
    TransientLocalError {
        op: &'static str,
        bucket: String,
        object: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to project replication metadata for {bucket}/{object}: {reason}")]
    ProjectionError { bucket: String, object: String, reason: String },

    #[error("resync failed for bucket {bucket}: {reason}")]
    ResyncError { bucket: String, reason: String },

    #[error("serialization error: {0}")]
    Serde(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    SerdeDecode(#[from] rmp_serde::decode::Error),
}

impl Error {
    pub fn transient_remote(
        op: &'static str,
        bucket: impl Into<String>,
        object: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::TransientRemoteError {
            op,
            bucket: bucket.into(),
            object: object.into(),
            source: Box::new(source),
        }
    }

    pub fn transient_local(
        op: &'static str,
        bucket: impl Into<String>,
        object: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::TransientLocalError {
            op,
            bucket: bucket.into(),
            object: object.into(),
            source: Box::new(source),
        }
    }
}
