use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Deterministic fingerprint of a configuration's expanded YAML.
///
/// The fingerprint is attached to the workflow's log span and run report so
/// that output produced by different config revisions can be told apart.
pub fn fingerprint(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}
