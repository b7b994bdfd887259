use once_cell::sync::Lazy;
use regex::Regex;
use wanderer_protocol::{Signature, SignatureGroup, SignatureKind};

use crate::grammar::parse_line;
use crate::merge::merge;

/// Column count of a probe-scanner row: id, kind, group, name, strength, distance
pub const PROBE_FIELDS: usize = 6;

/// Column count of a bookmark row: label, location type, timestamp
pub const BOOKMARK_FIELDS: usize = 3;

/// Probe-scanner kind labels, English first, then client localisations.
const KIND_LABELS: &[(&str, SignatureKind)] = &[
    ("Cosmic Signature", SignatureKind::CosmicSignature),
    ("Cosmic Anomaly", SignatureKind::CosmicAnomaly),
    ("Structure", SignatureKind::Structure),
    ("Ship", SignatureKind::Ship),
    ("Deployable", SignatureKind::Deployable),
    ("Drone", SignatureKind::Drone),
    ("Starbase", SignatureKind::Starbase),
    ("Kosmische Signatur", SignatureKind::CosmicSignature),
    ("Kosmische Anomalie", SignatureKind::CosmicAnomaly),
    ("Signature cosmique", SignatureKind::CosmicSignature),
    ("Anomalie cosmique", SignatureKind::CosmicAnomaly),
    ("Скрытый сигнал", SignatureKind::CosmicSignature),
    ("Космическая аномалия", SignatureKind::CosmicAnomaly),
];

static PROBE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[A-Z]{3}-[A-Z0-9]{3}$").expect("probe id pattern"));

static DISTANCE_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:AU|KM|K|M)$").expect("distance unit pattern"));

/// Clipboard row layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// Probe scanner results window
    ProbeScanner,
    /// Bookmark panel
    Bookmark,
    /// Neither layout
    Unknown,
}

/// Decide the layout of one tab-split row.
///
/// A full-ID first column together with a distance in the last column marks a
/// probe-scanner row regardless of how many columns survived the copy. Rows
/// without that shape fall back to the column count.
#[must_use]
pub fn classify_row(fields: &[&str]) -> RowFormat {
    if looks_like_probe_row(fields) {
        return RowFormat::ProbeScanner;
    }
    match fields.len() {
        PROBE_FIELDS => RowFormat::ProbeScanner,
        BOOKMARK_FIELDS => RowFormat::Bookmark,
        _ => RowFormat::Unknown,
    }
}

fn looks_like_probe_row(fields: &[&str]) -> bool {
    let (Some(first), Some(last)) = (fields.first(), fields.last()) else {
        return false;
    };
    fields.len() > 1 && PROBE_ID.is_match(first.trim()) && DISTANCE_UNIT.is_match(last.trim())
}

/// Map a probe-scanner kind label to its kind, matching case-insensitively.
#[must_use]
pub fn translate_kind(label: &str) -> Option<SignatureKind> {
    let label = label.trim().to_lowercase();
    KIND_LABELS
        .iter()
        .find(|(known, _)| known.to_lowercase() == label)
        .map(|(_, kind)| *kind)
}

/// Parse a probe-scanner row.
///
/// Kinds that are unknown or not in `enabled_kinds` become cosmic signatures.
#[must_use]
pub fn parse_probe_row(fields: &[&str], enabled_kinds: &[SignatureKind]) -> Option<Signature> {
    let id = fields.first().map(|id| id.trim()).filter(|id| !id.is_empty())?;

    let kind = fields
        .get(1)
        .and_then(|label| translate_kind(label))
        .filter(|kind| enabled_kinds.contains(kind))
        .unwrap_or(SignatureKind::CosmicSignature);
    let group = fields
        .get(2)
        .and_then(|label| SignatureGroup::from_label(label))
        .unwrap_or_default();
    let name = fields
        .get(3)
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(id);

    Some(
        Signature::new(id)
            .with_kind(kind)
            .with_group(group)
            .with_name(name),
    )
}

/// Split a clipboard payload into candidate signatures.
///
/// Unparseable rows are dropped and logged at debug level.
#[must_use]
pub fn parse_batch(text: &str, enabled_kinds: &[SignatureKind]) -> Vec<Signature> {
    let mut candidates = Vec::new();
    let mut rows = 0usize;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        rows += 1;

        let fields: Vec<&str> = line.split('\t').collect();
        let parsed = match classify_row(&fields) {
            RowFormat::ProbeScanner => parse_probe_row(&fields, enabled_kinds),
            RowFormat::Bookmark => parse_line(line),
            RowFormat::Unknown => {
                log::debug!(
                    "Skipping row with {} tab-separated fields: {line:?}",
                    fields.len()
                );
                None
            }
        };
        if let Some(signature) = parsed {
            candidates.push(signature);
        }
    }

    log::debug!("Parsed {} signatures from {rows} rows", candidates.len());
    candidates
}

/// Parse a clipboard payload and consolidate it into one record per identity.
#[must_use]
pub fn parse_clipboard(text: &str, enabled_kinds: &[SignatureKind]) -> Vec<Signature> {
    merge(&[], &parse_batch(text, enabled_kinds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PROBE_ROW: &str = "ERU-123\tCosmic Signature\tWormhole\tUnstable Wormhole\t100,0%\t4,23 AU";

    #[test]
    fn probe_row_fields() {
        let sigs = parse_batch(PROBE_ROW, &SignatureKind::ALL);
        assert_eq!(sigs.len(), 1);
        let sig = &sigs[0];
        assert_eq!(sig.id, "ERU-123");
        assert_eq!(sig.kind, SignatureKind::CosmicSignature);
        assert_eq!(sig.group, SignatureGroup::Wormhole);
        assert_eq!(sig.name, "Unstable Wormhole");
        assert_eq!(sig.custom_info.full_id.as_deref(), Some("ERU-123"));
    }

    #[test]
    fn disabled_or_unknown_kinds_fall_back_to_cosmic_signature() {
        let row = "ABC-456\tCosmic Anomaly\tCombat Site\tGuristas Hideaway\t100,0%\t2,1 AU";
        let enabled = parse_batch(row, &SignatureKind::ALL);
        assert_eq!(enabled[0].kind, SignatureKind::CosmicAnomaly);
        assert_eq!(enabled[0].group, SignatureGroup::CombatSite);

        let filtered = parse_batch(row, &[SignatureKind::CosmicSignature]);
        assert_eq!(filtered[0].kind, SignatureKind::CosmicSignature);

        let unknown = parse_batch("ABC-456\tMystery\t\t\t0,0%\t9 km", &SignatureKind::ALL);
        assert_eq!(unknown[0].kind, SignatureKind::CosmicSignature);
        assert_eq!(unknown[0].group, SignatureGroup::CosmicSignature);
        assert_eq!(unknown[0].name, "ABC-456");
    }

    #[test]
    fn localized_kind_labels() {
        assert_eq!(
            translate_kind("kosmische anomalie"),
            Some(SignatureKind::CosmicAnomaly)
        );
        assert_eq!(
            translate_kind(" Скрытый сигнал "),
            Some(SignatureKind::CosmicSignature)
        );
        assert_eq!(translate_kind("Ghost Site"), None);
    }

    #[test]
    fn shape_detection_beats_column_count() {
        // Five columns, but full ID first and a distance last.
        let short = ["ERU-123", "Cosmic Signature", "Wormhole", "", "12 km"];
        assert_eq!(classify_row(&short), RowFormat::ProbeScanner);

        // Three columns shaped like a probe row.
        let three = ["ERU-123", "Cosmic Signature", "0,5 AU"];
        assert_eq!(classify_row(&three), RowFormat::ProbeScanner);

        // Six columns that do not look like a probe row still use the count fallback.
        let six = ["ERU-123", "Cosmic Signature", "", "", "0,0%", ""];
        assert_eq!(classify_row(&six), RowFormat::ProbeScanner);

        let bookmark = ["31-ERU", "Wormhole", "2024.01.15 14:30"];
        assert_eq!(classify_row(&bookmark), RowFormat::Bookmark);

        assert_eq!(classify_row(&["just text"]), RowFormat::Unknown);
    }

    #[test]
    fn mixed_paste_drops_garbage() {
        let text = format!(
            "{PROBE_ROW}\r\n\n31-ERU\tWormhole\t2024.01.15 14:30\nzz skip\tx\t-\nrandom garbage\n"
        );
        let sigs = parse_batch(&text, &SignatureKind::ALL);
        let ids: Vec<&str> = sigs.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ERU-123", "ERU"]);
    }

    #[test]
    fn parse_clipboard_collapses_families() {
        let text = format!("31-ERU E\tWormhole\t-\n{PROBE_ROW}");
        let sigs = parse_clipboard(&text, &SignatureKind::ALL);
        assert_eq!(sigs.len(), 1);
        let sig = &sigs[0];
        assert_eq!(sig.id, "ERU-123");
        assert_eq!(sig.name, "Unstable Wormhole");
        assert_eq!(sig.description, "31");
        assert_eq!(sig.custom_info.is_eol, Some(true));
        assert_eq!(sig.custom_info.full_id.as_deref(), Some("ERU-123"));
    }
}
