//! Shape predicates for signature identifiers.
//!
//! A scanner signature is known either by a partial ID (the three letters a
//! bookmark label carries, e.g. `ERU`) or by the full ID reported by the probe
//! scanner (e.g. `ERU-123`). Both shapes share the three-letter prefix, which
//! is what ties a bookmark to its resolved counterpart.

/// Length of the shared prefix between a partial and a full ID.
pub const PREFIX_LEN: usize = 3;

/// Length of a resolved probe-scanner ID such as `ERU-123`.
pub const FULL_ID_LEN: usize = 7;

/// Exactly three ASCII characters, the shape a bookmark paste yields.
#[must_use]
pub fn is_bookmark_id(id: &str) -> bool {
    id.is_ascii() && id.len() == PREFIX_LEN
}

/// Seven characters containing a dash (`ERU-123`).
#[must_use]
pub fn is_dashed_full_id(id: &str) -> bool {
    id.is_ascii() && id.len() == FULL_ID_LEN && id.contains('-')
}

/// Three letters, a dash, then at least three alphanumerics.
#[must_use]
pub fn looks_full_id(id: &str) -> bool {
    let Some((head, tail)) = id.split_once('-') else {
        return false;
    };
    head.len() == PREFIX_LEN
        && head.chars().all(|c| c.is_ascii_alphabetic())
        && tail.len() >= 3
        && tail.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Prefix used to group partial and full IDs into one family.
///
/// Only IDs of length 3 or at least 7 whose first three characters are
/// uppercase ASCII letters have a family prefix.
#[must_use]
pub fn family_prefix(id: &str) -> Option<&str> {
    if !id.is_ascii() {
        return None;
    }
    if id.len() != PREFIX_LEN && id.len() < FULL_ID_LEN {
        return None;
    }
    let prefix = &id[..PREFIX_LEN];
    prefix
        .chars()
        .all(|c| c.is_ascii_uppercase())
        .then_some(prefix)
}

/// True when `other` starts with the same three characters as `bookmark`.
#[must_use]
pub fn shares_prefix(bookmark: &str, other: &str) -> bool {
    match (bookmark.get(..PREFIX_LEN), other.get(..PREFIX_LEN)) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}
