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

//! Metadata Projector (spec §4.3): builds the remote PUT/COPY request metadata from a
//! source descriptor.

use std::collections::HashMap;

use time::format_description::well_known::Rfc3339;

use crate::config::Destination;
use crate::error::Error;
use crate::headers::{self, OBJECT_LOCK_LEGAL_HOLD, OBJECT_LOCK_MODE, OBJECT_LOCK_RETAIN_UNTIL_DATE};
use crate::tags::ObjectTags;
use crate::types::{ObjectDescriptor, StatusType};

/// Options for a full-object remote PUT.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub user_metadata: HashMap<String, String>,
    pub user_tags: HashMap<String, String>,
    pub content_type: String,
    pub content_encoding: String,
    pub storage_class: String,
    pub source_version_id: String,
    pub source_mtime: String,
    pub source_etag: String,
    pub replication_status: StatusType,
    pub object_lock_mode: Option<String>,
    pub retain_until_date: Option<String>,
    pub legal_hold: Option<String>,
    pub server_side_encryption: bool,
}

fn user_metadata_without_reserved(source: &ObjectDescriptor) -> HashMap<String, String> {
    source
        .user_defined
        .iter()
        .filter(|(k, _)| k.as_str() != headers::REPLICATION_STATUS && !headers::is_reserved(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn storage_class_for(source: &ObjectDescriptor, dest: &Destination) -> String {
    dest.storage_class.clone().unwrap_or_else(|| source.storage_class.clone())
}

fn format_rfc3339_nano(t: time::OffsetDateTime) -> Result<String, Error> {
    t.format(&Rfc3339)
        .map_err(|e| Error::ProjectionError {
            bucket: String::new(),
            object: String::new(),
            reason: format!("failed to format timestamp: {e}"),
        })
}

/// Builds PUT options for a full-object replication stream. Tag or retain-date parse
/// failures abort with `ProjectionError` (spec §9 open question resolution #2) rather
/// than silently producing empty options.
pub fn project_put_options(source: &ObjectDescriptor, dest: &Destination) -> Result<PutOptions, Error> {
    let meta = user_metadata_without_reserved(source);

    let tags = ObjectTags::parse(&source.user_tags).map_err(|e| Error::ProjectionError {
        bucket: source.bucket.clone(),
        object: source.name.clone(),
        reason: format!("malformed object tags: {e}"),
    })?;

    let mut opts = PutOptions {
        user_metadata: meta,
        user_tags: tags.to_map().into_iter().collect(),
        content_type: source.content_type.clone(),
        content_encoding: source.content_encoding.clone(),
        storage_class: storage_class_for(source, dest),
        source_version_id: source.version_id.clone(),
        source_mtime: format_rfc3339_nano(source.mod_time)?,
        source_etag: source.etag.clone(),
        replication_status: StatusType::Replica,
        object_lock_mode: None,
        retain_until_date: None,
        legal_hold: None,
        server_side_encryption: false,
    };

    if let Some(mode) = source.user_defined.get(OBJECT_LOCK_MODE) {
        opts.object_lock_mode = Some(mode.clone());
    }
    if let Some(raw) = source.user_defined.get(OBJECT_LOCK_RETAIN_UNTIL_DATE) {
        time::OffsetDateTime::parse(raw, &Rfc3339).map_err(|e| Error::ProjectionError {
            bucket: source.bucket.clone(),
            object: source.name.clone(),
            reason: format!("malformed retain-until-date {raw:?}: {e}"),
        })?;
        opts.retain_until_date = Some(raw.clone());
    }
    if let Some(hold) = source.user_defined.get(OBJECT_LOCK_LEGAL_HOLD) {
        opts.legal_hold = Some(hold.clone());
    }

    // SSE-C material never travels with the core; only server-managed SSE is signalled
    // on so the remote PUT requests its own encryption. This is inferred, not carried,
    // because the customer key is never visible to this core (spec §4.3 last bullet).
    opts.server_side_encryption = !source.ssec && source_is_sse_managed(source);

    Ok(opts)
}

fn source_is_sse_managed(source: &ObjectDescriptor) -> bool {
    source
        .user_defined
        .keys()
        .any(|k| k.eq_ignore_ascii_case("X-Amz-Server-Side-Encryption"))
}

/// Builds the metadata map for a metadata-only remote COPY (`getCopyObjMetadata`).
pub fn project_copy_metadata(source: &ObjectDescriptor, dest: &Destination) -> Result<HashMap<String, String>, Error> {
    let mut meta = user_metadata_without_reserved(source);

    if !source.content_encoding.is_empty() {
        meta.insert(headers::CONTENT_ENCODING.to_string(), source.content_encoding.clone());
    }
    if !source.content_type.is_empty() {
        meta.insert("Content-Type".to_string(), source.content_type.clone());
    }

    let tags = ObjectTags::parse(&source.user_tags).map_err(|e| Error::ProjectionError {
        bucket: source.bucket.clone(),
        object: source.name.clone(),
        reason: format!("malformed object tags: {e}"),
    })?;
    if !tags.is_empty() {
        meta.insert(headers::OBJECT_TAGGING.to_string(), tags.to_canonical_string());
        meta.insert(headers::TAG_DIRECTIVE.to_string(), headers::TAG_DIRECTIVE_REPLACE.to_string());
    }

    meta.insert(headers::STORAGE_CLASS.to_string(), storage_class_for(source, dest));
    meta.insert(headers::SOURCE_MTIME.to_string(), format_rfc3339_nano(source.mod_time)?);
    meta.insert(headers::SOURCE_ETAG.to_string(), source.etag.clone());
    meta.insert(headers::REPLICATION_STATUS.to_string(), StatusType::Replica.to_string());

    Ok(meta)
}
