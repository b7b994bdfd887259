use std::collections::HashSet;

use wanderer_protocol::{ids, Signature, SignatureDiff};

/// Options for [`diff`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Absence from the new set is not a deletion (augment-only pastes)
    pub update_only: bool,
    /// Emit nothing for records whose group did not improve
    pub skip_unchanged: bool,
}

impl DiffOptions {
    #[must_use]
    pub const fn new(update_only: bool, skip_unchanged: bool) -> Self {
        Self {
            update_only,
            skip_unchanged,
        }
    }
}

/// Classify `old` against `new` into added, updated and removed records.
///
/// A three-letter wormhole bookmark whose prefix reappears as a seven-character
/// dashed wormhole in `new` is reported as removed: the full record replaces it.
/// Records found by exact id are updated only when the new group ranks higher,
/// which copies group and name onto the old record; otherwise they are echoed
/// back unchanged unless `skip_unchanged` is set.
#[must_use]
pub fn diff(old: &[Signature], new: &[Signature], options: DiffOptions) -> SignatureDiff {
    let mut result = SignatureDiff::default();

    for previous in old {
        if previous.is_wormhole_bookmark() && is_superseded(previous, new) {
            log::debug!("Bookmark {} superseded by a full id", previous.id);
            result.removed.push(previous.clone());
            continue;
        }

        match new.iter().find(|candidate| candidate.id == previous.id) {
            Some(current) if current.group.rank() > previous.group.rank() => {
                let mut upgraded = previous.clone();
                upgraded.group = current.group;
                upgraded.name.clone_from(&current.name);
                result.updated.push(upgraded);
            }
            Some(_) => {
                if !options.skip_unchanged {
                    result.updated.push(previous.clone());
                }
            }
            None => {
                if !options.update_only {
                    result.removed.push(previous.clone());
                }
            }
        }
    }

    let old_ids: HashSet<&str> = old.iter().map(|s| s.id.as_str()).collect();
    result.added = new
        .iter()
        .filter(|candidate| !old_ids.contains(candidate.id.as_str()))
        .cloned()
        .collect();

    result
}

fn is_superseded(bookmark: &Signature, new: &[Signature]) -> bool {
    new.iter()
        .any(|candidate| candidate.is_resolved_wormhole() && ids::shares_prefix(&bookmark.id, &candidate.id))
}
