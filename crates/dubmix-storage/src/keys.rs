//! Shared key generation for published artifacts.

use dubmix_core::MediaKind;
use uuid::Uuid;

/// Storage key for an artifact: `{folder}/{owner}/{id}.{ext}`.
///
/// The owner id is opaque (it comes from the identity provider), so anything outside
/// `[A-Za-z0-9_@-]` is replaced before it becomes a path segment.
pub fn artifact_key(kind: MediaKind, owner_id: &str, id: Uuid) -> String {
    format!(
        "{}/{}/{}.{}",
        kind.folder(),
        owner_segment(owner_id),
        id,
        kind.extension()
    )
}

fn owner_segment(owner_id: &str) -> String {
    let cleaned: String = owner_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
