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

//! Parsing and canonicalization of the URL-encoded object-tagging query string.

use std::collections::BTreeMap;

const MAX_TAG_COUNT: usize = 10;
const MAX_KEY_LEN: usize = 128;
const MAX_VALUE_LEN: usize = 256;

/// A parsed, canonically-ordered object tag set. Key order is sorted so two tag sets
/// with the same contents always produce the same encoded string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectTags(BTreeMap<String, String>);

impl ObjectTags {
    /// Parses a `k1=v1&k2=v2`-style query string. An empty string yields an empty,
    /// valid tag set (not an error).
    pub fn parse(raw: &str) -> Result<Self, TagParseError> {
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let mut map = BTreeMap::new();
        for (k, v) in url::form_urlencoded::parse(raw.as_bytes()) {
            if k.is_empty() || k.len() > MAX_KEY_LEN || v.len() > MAX_VALUE_LEN {
                return Err(TagParseError::InvalidEntry(k.into_owned()));
            }
            map.insert(k.into_owned(), v.into_owned());
        }
        if map.len() > MAX_TAG_COUNT {
            return Err(TagParseError::TooManyTags(map.len()));
        }
        Ok(Self(map))
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical URL-encoded form, keys in sorted order.
    pub fn to_canonical_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TagParseError {
    #[error("malformed tag entry: {0}")]
    InvalidEntry(String),
    #[error("too many tags: {0} (max {MAX_TAG_COUNT})")]
    TooManyTags(usize),
}

/// Compares two raw tag query strings after parsing both to canonical form. An
/// unparsable string (on either side) is never treated as equal to anything else,
/// including itself as raw bytes, because callers must surface a `ProjectionError`
/// rather than silently comparing unparsed text.
pub fn canonical_eq(a: &str, b: &str) -> bool {
    match (ObjectTags::parse(a), ObjectTags::parse(b)) {
        (Ok(ta), Ok(tb)) => ta == tb,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_parses_to_empty_set() {
        let t = ObjectTags::parse("").unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn order_independent_canonicalization() {
        let a = ObjectTags::parse("b=2&a=1").unwrap();
        let b = ObjectTags::parse("a=1&b=2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_canonical_string(), b.to_canonical_string());
    }

    #[test]
    fn rejects_too_many_tags() {
        let raw: String = (0..20).map(|i| format!("k{i}=v{i}&")).collect();
        assert!(ObjectTags::parse(raw.trim_end_matches('&')).is_err());
    }

    #[test]
    fn canonical_eq_compares_semantically() {
        assert!(canonical_eq("a=1&b=2", "b=2&a=1"));
        assert!(!canonical_eq("a=1", "a=2"));
    }
}
