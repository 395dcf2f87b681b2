//! Content fingerprints and module status derivation.

use sha2::{Digest, Sha256};

use super::module::ModuleStatus;
use super::registry::{FieldMap, ModuleKey, is_blank};
use super::world::World;

/// Computes a SHA-256 fingerprint of a field map.
///
/// Keys are visited in sorted order and every key and value is length
/// prefixed, so the digest depends only on the map's contents. Values are
/// hashed as stored; blank values never reach a module's map because field
/// updates remove them. Returns `None` for an empty map.
#[must_use]
pub fn compute_content_hash(fields: &FieldMap) -> Option<String> {
    if fields.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    // FieldMap is a BTreeMap, so iteration is already in key order.
    for (key, value) in fields {
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    Some(format!("{:x}", hasher.finalize()))
}

/// Derives a module's status from its fields and the world's history.
///
/// `FAILED` is never produced here; only the scheduler sets it.
#[must_use]
pub fn determine_status(
    world: &World,
    module_key: ModuleKey,
    fields: &FieldMap,
    content_changed: bool,
) -> ModuleStatus {
    let has_content = fields.values().any(|value| !is_blank(value));
    let required_filled = module_key.definition().missing_required(fields).is_empty();
    classify(has_content, required_filled, world.is_published(), content_changed)
}

/// The status table behind [`determine_status`].
#[must_use]
pub const fn classify(
    has_content: bool,
    required_filled: bool,
    published: bool,
    content_changed: bool,
) -> ModuleStatus {
    if !has_content {
        ModuleStatus::Empty
    } else if !required_filled {
        ModuleStatus::InProgress
    } else if published && content_changed {
        ModuleStatus::AwaitingGeneration
    } else {
        ModuleStatus::Ready
    }
}
