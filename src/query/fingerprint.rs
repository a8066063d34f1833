//! Content fingerprints for stored queries and their fragments

use crate::query::Metadata;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Content hash identifying a stored query or one of its fragments
///
/// The root fingerprint covers the raw expression and the metadata; a
/// fragment fingerprint is `root + "_" + ordinal`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a raw query expression and its metadata
    pub fn root(query: &str, metadata: &Metadata) -> Self {
        let mut hasher = Sha256::new();
        update_component(&mut hasher, query);
        // Metadata is a BTreeMap, so iteration order is stable
        for (key, value) in metadata {
            update_component(&mut hasher, key);
            update_component(&mut hasher, value);
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Fingerprint of the fragment at `ordinal` within this root
    pub fn fragment(&self, ordinal: usize) -> Self {
        Self(format!("{}_{}", self.0, ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Length-prefixed, so no two component sequences hash the same bytes
fn update_component(hasher: &mut Sha256, component: &str) {
    hasher.update((component.len() as u64).to_le_bytes());
    hasher.update(component.as_bytes());
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_stable() {
        let metadata = Metadata::new();
        let a = Fingerprint::root("test1 test4", &metadata);
        let b = Fingerprint::root("test1 test4", &metadata);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, Fingerprint::root("test1  test4", &metadata));
    }

    #[test]
    fn test_metadata_changes_fingerprint() {
        let mut metadata = Metadata::new();
        let plain = Fingerprint::root("q", &metadata);
        metadata.insert("lang".to_string(), "en".to_string());
        assert_ne!(plain, Fingerprint::root("q", &metadata));
    }

    #[test]
    fn test_separators_in_content_do_not_collide() {
        let mut metadata = Metadata::new();
        metadata.insert("k".to_string(), "v".to_string());
        let with_metadata = Fingerprint::root("a", &metadata);
        assert_ne!(with_metadata, Fingerprint::root("a\0k\0v", &Metadata::new()));

        let mut shifted = Metadata::new();
        shifted.insert("k\0v".to_string(), String::new());
        assert_ne!(with_metadata, Fingerprint::root("a", &shifted));

        let mut split = Metadata::new();
        split.insert("k".to_string(), String::new());
        split.insert("v".to_string(), String::new());
        assert_ne!(Fingerprint::root("a", &split), Fingerprint::root("a\0k", &shifted));
    }

    #[test]
    fn test_fragment_suffix() {
        let root = Fingerprint::from("abc".to_string());
        assert_eq!(root.fragment(0).as_str(), "abc_0");
        assert_eq!(root.fragment(12).to_string(), "abc_12");
    }
}
