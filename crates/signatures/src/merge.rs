use std::collections::{HashMap, HashSet};

use wanderer_protocol::{ids, Signature, SignatureGroup};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identity {
    /// Wormholes sharing a three-letter prefix
    Family(String),
    /// Everything else, keyed by exact id
    Exact(String),
}

enum Slot<'a> {
    Family(Vec<&'a Signature>),
    Exact(&'a Signature),
}

/// Consolidate existing and incoming signatures into one record per identity.
///
/// Wormholes are grouped by their three-letter prefix; within a group the
/// first full-ID record survives and every other member is folded into it.
/// Other signatures are keyed by exact id, a later record replacing an earlier
/// one. Output order follows the first appearance of each identity.
#[must_use]
pub fn merge(existing: &[Signature], incoming: &[Signature]) -> Vec<Signature> {
    let mut slots: Vec<Slot<'_>> = Vec::new();
    let mut index: HashMap<Identity, usize> = HashMap::new();

    for signature in existing.iter().chain(incoming) {
        let identity = identity_of(signature);
        match (index.get(&identity).copied(), identity) {
            (Some(at), Identity::Family(_)) => {
                if let Slot::Family(members) = &mut slots[at] {
                    members.push(signature);
                }
            }
            (Some(at), Identity::Exact(_)) => slots[at] = Slot::Exact(signature),
            (None, identity) => {
                let slot = match identity {
                    Identity::Family(_) => Slot::Family(vec![signature]),
                    Identity::Exact(_) => Slot::Exact(signature),
                };
                index.insert(identity, slots.len());
                slots.push(slot);
            }
        }
    }

    let mut merged: Vec<Signature> = slots
        .into_iter()
        .map(|slot| match slot {
            Slot::Family(members) => consolidate(&members),
            Slot::Exact(signature) => signature.clone(),
        })
        .collect();

    drop_superseded_bookmarks(&mut merged);

    for signature in &mut merged {
        if signature.ensure_custom_info() {
            log::debug!("Backfilled custom_info for {}", signature.id);
        }
    }

    merged
}

/// Fold `candidate` into `target`.
///
/// Known fields on the candidate win; unknown ones leave the target as is.
/// A name equal to the candidate's own id is the parser default and counts as
/// unknown.
pub fn fold_into(target: &mut Signature, candidate: &Signature) {
    if candidate.group != SignatureGroup::CosmicSignature {
        target.group = candidate.group;
    }
    if !candidate.name.trim().is_empty() && candidate.name != candidate.id {
        target.name.clone_from(&candidate.name);
    }
    if !candidate.description.trim().is_empty() {
        target.description.clone_from(&candidate.description);
    }
    if target.inserted_at.is_none() {
        target.inserted_at = candidate.inserted_at;
    }
    target.custom_info.merge_from(&candidate.custom_info);
}

fn identity_of(signature: &Signature) -> Identity {
    if signature.is_wormhole() {
        if let Some(prefix) = ids::family_prefix(&signature.id) {
            return Identity::Family(prefix.to_ascii_uppercase());
        }
    }
    Identity::Exact(signature.id.clone())
}

fn consolidate(members: &[&Signature]) -> Signature {
    let survivor_at = members
        .iter()
        .position(|s| ids::looks_full_id(&s.id))
        .unwrap_or(0);

    let mut survivor = members[survivor_at].clone();
    for (at, candidate) in members.iter().enumerate() {
        if at != survivor_at {
            fold_into(&mut survivor, candidate);
        }
    }
    survivor
}

fn drop_superseded_bookmarks(merged: &mut Vec<Signature>) {
    let resolved: HashSet<String> = merged
        .iter()
        .filter(|s| ids::is_dashed_full_id(&s.id))
        .map(|s| s.id[..ids::PREFIX_LEN].to_ascii_uppercase())
        .collect();
    if resolved.is_empty() {
        return;
    }

    merged.retain(|s| {
        let superseded = s.is_wormhole_bookmark() && resolved.contains(&s.id.to_ascii_uppercase());
        if superseded {
            log::debug!("Dropping bookmark {} superseded by a full id", s.id);
        }
        !superseded
    });
}
