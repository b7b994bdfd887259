//! Line grammar for bookmark-panel pastes.
//!
//! A bookmark row has three tab-separated fields: the bookmark label, the
//! location type and the creation timestamp. The label is what players type
//! by hand, so it comes in a few conventional shapes:
//!
//! ```text
//! 31-ERU              distance-ERU                 wormhole ERU, description 31
//! 31-ERU 12 EC        distance-ERU [dist] [flags]  E = end of life, C = critical
//! J1234-ERU NS E      name-ERU class [flags]       class token becomes the description
//! zR IEB-620 Name     z + site selector + legacy site label
//! zD 12-ABC           z + site selector + wormhole token, group forced to the site
//! ```
//!
//! Rows starting with `xx`/`zz` are deliberately excluded by the player.

use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use wanderer_protocol::{CustomInfo, Signature, SignatureGroup};

const EXCLUSION_MARKERS: [&str; 2] = ["xx", "zz"];
const LEGACY_PREFIX: char = 'z';
const TURN_MARKER: &str = "LTURN";
const NO_TIMESTAMP: &str = "-";
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y.%m.%d %H:%M", "%Y.%m.%d %H:%M:%S"];

static LEGACY_SITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+-\d+)\s+(.+)$").expect("legacy site pattern"));

static DISTANCE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)-([A-Za-z]{3})(?:\s+(\d+))?(?:\s+([EeCc]+))?$")
        .expect("distance token pattern")
});

static CLASS_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]+)-([A-Za-z]{3})\s+(NS|[A-Za-z]{1,2})(?:\s+([EeCc]+))?$")
        .expect("class token pattern")
});

/// Parse one bookmark-format row into a candidate signature.
///
/// Returns `None` for blank, excluded or unrecognised rows.
#[must_use]
pub fn parse_line(line: &str) -> Option<Signature> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    if has_exclusion_marker(line) {
        log::debug!("Skipping excluded scanner row: {line:?}");
        return None;
    }

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() > 3 {
        log::debug!("Skipping row with {} fields as bookmark: {line:?}", fields.len());
        return None;
    }

    let raw = fields[0].trim();
    let token_type = fields.get(1).copied().unwrap_or_default();
    let timestamp = fields.get(2).copied().unwrap_or(NO_TIMESTAMP);

    if token_type.to_ascii_uppercase().contains(TURN_MARKER) {
        log::debug!("Skipping turn marker row: {line:?}");
        return None;
    }

    let parsed = match raw.strip_prefix(LEGACY_PREFIX) {
        Some(rest) => parse_legacy(rest),
        None => parse_wormhole_token(raw, SignatureGroup::Wormhole),
    };
    let Some(mut signature) = parsed else {
        log::debug!("No bookmark grammar matched: {raw:?}");
        return None;
    };

    signature.inserted_at = scanner_timestamp(timestamp);
    Some(signature)
}

/// Parse a wormhole label such as `31-ERU 12 E` or `J1234-ERU NS C`.
///
/// `group` is the group assigned on success; plain bookmarks pass
/// [`SignatureGroup::Wormhole`], legacy site rows force their site group.
#[must_use]
pub fn parse_wormhole_token(token: &str, group: SignatureGroup) -> Option<Signature> {
    let token = token.trim();

    if let Some(caps) = DISTANCE_TOKEN.captures(token) {
        let id = caps[2].to_ascii_uppercase();
        let description = caps.get(3).map_or(&caps[1], |m| m.as_str());
        let flags = caps.get(4).map(|m| m.as_str());
        return Some(wormhole_signature(&id, &id, description, flags, group));
    }

    if let Some(caps) = CLASS_TOKEN.captures(token) {
        let id = caps[2].to_ascii_uppercase();
        let flags = caps.get(4).map(|m| m.as_str());
        return Some(wormhole_signature(&id, &caps[1], &caps[3], flags, group));
    }

    None
}

/// Convert a scanner timestamp (`2024.01.15 14:30`).
///
/// `-` and blank fields carry no timestamp.
#[must_use]
pub fn scanner_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() || raw == NO_TIMESTAMP {
        return None;
    }
    let parsed = TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok());
    if parsed.is_none() {
        log::debug!("Ignoring malformed scanner timestamp {raw:?}");
    }
    parsed
}

fn has_exclusion_marker(line: &str) -> bool {
    let head = line.trim_start();
    EXCLUSION_MARKERS.iter().any(|marker| {
        head.get(..marker.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(marker))
    })
}

fn parse_legacy(rest: &str) -> Option<Signature> {
    let rest = rest.trim_start();
    let mut chars = rest.chars();
    let group = site_group(chars.next()?);
    let remainder = chars.as_str().trim();

    if let Some(caps) = LEGACY_SITE.captures(remainder) {
        let id = caps[1].to_ascii_uppercase();
        return Some(
            Signature::new(id)
                .with_group(group)
                .with_name(caps[2].trim()),
        );
    }

    parse_wormhole_token(remainder, group)
}

fn site_group(selector: char) -> SignatureGroup {
    match selector.to_ascii_uppercase() {
        'R' => SignatureGroup::RelicSite,
        'D' => SignatureGroup::DataSite,
        'G' => SignatureGroup::GasSite,
        _ => SignatureGroup::CosmicSignature,
    }
}

fn wormhole_signature(
    id: &str,
    name: &str,
    description: &str,
    flags: Option<&str>,
    group: SignatureGroup,
) -> Signature {
    let flags = flags.unwrap_or_default().to_ascii_uppercase();
    Signature::new(id)
        .with_group(group)
        .with_name(name)
        .with_description(description)
        .with_custom_info(CustomInfo::wormhole(
            id,
            flags.contains('E'),
            flags.contains('C'),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn parses_distance_bookmark_with_timestamp() {
        let sig = parse_line("31-ERU\tCombat Site\t2024.01.15 14:30").expect("parsed");
        assert_eq!(sig.id, "ERU");
        assert_eq!(sig.group, SignatureGroup::Wormhole);
        assert_eq!(sig.name, "ERU");
        assert_eq!(sig.description, "31");
        assert_eq!(
            sig.inserted_at.map(|ts| ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            Some("2024-01-15T14:30:00".to_string())
        );
        assert_eq!(sig.custom_info.dest.as_deref(), Some("ERU"));
        assert_eq!(sig.custom_info.full_id, None);
        assert_eq!(sig.custom_info.is_eol, Some(false));
    }

    #[test]
    fn trailing_distance_and_flags() {
        let sig = parse_line("4-abc 12 ec\tWormhole\t-").expect("parsed");
        assert_eq!(sig.id, "ABC");
        assert_eq!(sig.description, "12");
        assert_eq!(sig.custom_info.is_eol, Some(true));
        assert_eq!(sig.custom_info.is_crit, Some(true));
        assert_eq!(sig.inserted_at, None);
    }

    #[test]
    fn class_shaped_bookmark() {
        let sig = parse_line("J1234-XYZ NS C\tWormhole\t-").expect("parsed");
        assert_eq!(sig.id, "XYZ");
        assert_eq!(sig.name, "J1234");
        assert_eq!(sig.description, "NS");
        assert_eq!(sig.custom_info.is_eol, Some(false));
        assert_eq!(sig.custom_info.is_crit, Some(true));
    }

    #[test]
    fn excluded_and_turn_rows_are_skipped() {
        assert_eq!(parse_line("zz ignore this"), None);
        assert_eq!(parse_line("ZZ-ERU\tWormhole\t-"), None);
        assert_eq!(parse_line("  xX 31-ERU\tWormhole\t-"), None);
        assert_eq!(parse_line("31-ERU\tLturn gate\t-"), None);
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn legacy_relic_site() {
        let sig = parse_line("zR IEB-620 Some Relic Site\tSite\t-").expect("parsed");
        assert_eq!(sig.id, "IEB-620");
        assert_eq!(sig.group, SignatureGroup::RelicSite);
        assert_eq!(sig.name, "Some Relic Site");
        assert_eq!(sig.inserted_at, None);
        assert_eq!(sig.custom_info.full_id.as_deref(), Some("IEB-620"));
    }

    #[test]
    fn legacy_row_falls_back_to_wormhole_grammar_with_forced_group() {
        let sig = parse_line("zD 12-ABC E\tSite\t2024.02.01 08:05").expect("parsed");
        assert_eq!(sig.id, "ABC");
        assert_eq!(sig.group, SignatureGroup::DataSite);
        assert_eq!(sig.custom_info.is_eol, Some(true));

        let generic = parse_line("zX 7-QRS\tSite\t-").expect("parsed");
        assert_eq!(generic.group, SignatureGroup::CosmicSignature);
    }

    #[test]
    fn unmatched_rows_return_none() {
        assert_eq!(parse_line("hello world\tSite\t-"), None);
        assert_eq!(parse_line("31-ERUX\tWormhole\t-"), None);
        assert_eq!(parse_line("zR\tSite\t-"), None);
        assert_eq!(parse_line("31-ERU\ta\tb\tc"), None);
    }

    #[test]
    fn malformed_timestamp_keeps_signature() {
        let sig = parse_line("31-ERU\tWormhole\tyesterday").expect("parsed");
        assert_eq!(sig.inserted_at, None);
        assert!(scanner_timestamp("2024.01.15 14:30:59").is_some());
    }

    proptest! {
        #[test]
        fn proptest_exclusion_markers_always_skip(
            marker in "(?i:xx|zz)",
            tail in "[ -~]{0,24}",
        ) {
            let line = format!("{marker}{tail}\tWormhole\t-");
            prop_assert_eq!(parse_line(&line), None);
        }

        #[test]
        fn proptest_distance_bookmarks_resolve_to_prefix(
            distance in 0u32..1000,
            letters in "[A-Z]{3}",
        ) {
            let line = format!("{distance}-{letters}\tWormhole\t-");
            let sig = parse_line(&line).expect("parsed");
            prop_assert_eq!(&sig.id, &letters);
            prop_assert_eq!(sig.description, distance.to_string());
            prop_assert_eq!(sig.custom_info.dest, Some(letters));
        }
    }
}
