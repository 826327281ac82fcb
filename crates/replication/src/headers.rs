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

//! Bit-exact wire header names (spec §6). Kept as plain constants, no derive machinery
//! needed here.

/// Standard AWS replication-status header; doubles as the source's own user-metadata
/// key and as the value sent to the remote (always `REPLICA` on the wire).
pub const REPLICATION_STATUS: &str = "X-Amz-Bucket-Replication-Status";
/// Standard AWS object-tagging header.
pub const OBJECT_TAGGING: &str = "X-Amz-Tagging";
pub const TAG_DIRECTIVE: &str = "X-Amz-Tagging-Directive";
pub const TAG_DIRECTIVE_REPLACE: &str = "REPLACE";
pub const STORAGE_CLASS: &str = "X-Amz-Storage-Class";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const OBJECT_LOCK_MODE: &str = "X-Amz-Object-Lock-Mode";
pub const OBJECT_LOCK_RETAIN_UNTIL_DATE: &str = "X-Amz-Object-Lock-Retain-Until-Date";
pub const OBJECT_LOCK_LEGAL_HOLD: &str = "X-Amz-Object-Lock-Legal-Hold";

/// Lower-cased prefix marking a header as internal bookkeeping, never shown to users
/// and never copied as user metadata. Comparison against this prefix is always done on
/// a lower-cased key.
pub const RESERVED_METADATA_PREFIX_LOWER: &str = "x-rustfs-internal-";

pub const SOURCE_MTIME: &str = "X-Rustfs-Internal-Source-Mtime";
pub const SOURCE_ETAG: &str = "X-Rustfs-Internal-Source-Etag";
pub const SOURCE_VERSION_ID: &str = "X-Rustfs-Internal-Source-Version-Id";

/// Returns true if `key`'s lower-cased form starts with the reserved-internal prefix.
pub fn is_reserved(key: &str) -> bool {
    key.to_ascii_lowercase().starts_with(RESERVED_METADATA_PREFIX_LOWER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_prefix_is_case_insensitive() {
        assert!(is_reserved("X-RustFS-Internal-Source-Etag"));
        assert!(is_reserved("x-rustfs-internal-foo"));
        assert!(!is_reserved("x-amz-meta-foo"));
    }
}
