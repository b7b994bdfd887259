use chrono::{DateTime, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::custom_info::{deserialize_lenient, CustomInfo};
use crate::ids;

/// Game-defined kind of a scanned object.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    #[default]
    CosmicSignature,
    CosmicAnomaly,
    Structure,
    Ship,
    Deployable,
    Drone,
    Starbase,
}

impl SignatureKind {
    pub const ALL: [Self; 7] = [
        Self::CosmicSignature,
        Self::CosmicAnomaly,
        Self::Structure,
        Self::Ship,
        Self::Deployable,
        Self::Drone,
        Self::Starbase,
    ];

    /// Stable kind key used in settings and on the wire
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::CosmicSignature => "cosmic_signature",
            Self::CosmicAnomaly => "cosmic_anomaly",
            Self::Structure => "structure",
            Self::Ship => "ship",
            Self::Deployable => "deployable",
            Self::Drone => "drone",
            Self::Starbase => "starbase",
        }
    }

    /// Look up a kind key; unknown keys yield `None`.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.key().eq_ignore_ascii_case(key))
    }
}

impl<'de> Deserialize<'de> for SignatureKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_key(&raw).unwrap_or_default())
    }
}

/// Scanner group of a signature.
///
/// Variants are declared in state-rank order: a later variant is a more
/// specific classification than an earlier one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, JsonSchema,
)]
pub enum SignatureGroup {
    #[default]
    #[serde(rename = "Cosmic Signature")]
    CosmicSignature,
    #[serde(rename = "Combat Site")]
    CombatSite,
    #[serde(rename = "Ore Site")]
    OreSite,
    #[serde(rename = "Gas Site")]
    GasSite,
    #[serde(rename = "Data Site")]
    DataSite,
    #[serde(rename = "Relic Site")]
    RelicSite,
    Wormhole,
}

impl SignatureGroup {
    /// Every group, lowest state rank first.
    pub const ALL: [Self; 7] = [
        Self::CosmicSignature,
        Self::CombatSite,
        Self::OreSite,
        Self::GasSite,
        Self::DataSite,
        Self::RelicSite,
        Self::Wormhole,
    ];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CosmicSignature => "Cosmic Signature",
            Self::CombatSite => "Combat Site",
            Self::OreSite => "Ore Site",
            Self::GasSite => "Gas Site",
            Self::DataSite => "Data Site",
            Self::RelicSite => "Relic Site",
            Self::Wormhole => "Wormhole",
        }
    }

    /// Match a scanner label, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|group| group.label().eq_ignore_ascii_case(label))
    }

    /// Position in [`SignatureGroup::ALL`]; higher means better known.
    #[must_use]
    pub fn rank(self) -> usize {
        Self::ALL
            .iter()
            .position(|group| *group == self)
            .unwrap_or_default()
    }
}

impl<'de> Deserialize<'de> for SignatureGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .and_then(Self::from_label)
            .unwrap_or_default())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A scanned signature in one solar system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Signature {
    /// Partial (`ERU`) or full (`ERU-123`) identifier
    #[serde(alias = "eve_id")]
    pub id: String,

    #[serde(default)]
    pub kind: SignatureKind,

    #[serde(default)]
    pub group: SignatureGroup,

    /// Display label
    #[serde(default)]
    pub name: String,

    /// Free text: distance, scan strength or wormhole class
    #[serde(default)]
    pub description: String,

    #[serde(default, deserialize_with = "deserialize_lenient")]
    #[schemars(with = "CustomInfo")]
    pub custom_info: CustomInfo,

    /// Timestamp taken from the scanner line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub inserted_at: Option<NaiveDateTime>,

    /// Maintained by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub pending_deletion: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub pending_addition: bool,

    /// Wall-clock end of the grace window while a pending flag is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub pending_until: Option<DateTime<Utc>>,
}

impl Signature {
    /// New cosmic signature whose name and `dest` default to `id`.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            custom_info: CustomInfo::for_id(&id),
            id,
            kind: SignatureKind::CosmicSignature,
            group: SignatureGroup::CosmicSignature,
            description: String::new(),
            inserted_at: None,
            updated_at: None,
            pending_deletion: false,
            pending_addition: false,
            pending_until: None,
        }
    }

    /// Builder: set kind
    #[must_use]
    pub const fn with_kind(mut self, kind: SignatureKind) -> Self {
        self.kind = kind;
        self
    }

    /// Builder: set group
    #[must_use]
    pub const fn with_group(mut self, group: SignatureGroup) -> Self {
        self.group = group;
        self
    }

    /// Builder: set name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder: set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set custom info
    #[must_use]
    pub fn with_custom_info(mut self, custom_info: CustomInfo) -> Self {
        self.custom_info = custom_info;
        self
    }

    /// Builder: set scanner timestamp
    #[must_use]
    pub const fn with_inserted_at(mut self, inserted_at: NaiveDateTime) -> Self {
        self.inserted_at = Some(inserted_at);
        self
    }

    #[must_use]
    pub fn is_wormhole(&self) -> bool {
        self.group == SignatureGroup::Wormhole
    }

    /// Wormhole known only by its three-letter bookmark ID.
    #[must_use]
    pub fn is_wormhole_bookmark(&self) -> bool {
        self.is_wormhole() && ids::is_bookmark_id(&self.id)
    }

    /// Wormhole carrying a seven-character dashed ID.
    #[must_use]
    pub fn is_resolved_wormhole(&self) -> bool {
        self.is_wormhole() && ids::is_dashed_full_id(&self.id)
    }

    /// Name to show, falling back to the ID.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending_deletion || self.pending_addition
    }

    /// Drop both pending flags and the grace deadline.
    pub fn clear_pending(&mut self) {
        self.pending_deletion = false;
        self.pending_addition = false;
        self.pending_until = None;
    }

    /// Replace a `custom_info` that has no usable `dest`.
    ///
    /// Returns `true` when the payload was replaced.
    pub fn ensure_custom_info(&mut self) -> bool {
        if self.custom_info.has_dest() {
            return false;
        }
        self.custom_info = CustomInfo::fallback(&self.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn group_rank_follows_declaration_order() {
        assert!(SignatureGroup::Wormhole.rank() > SignatureGroup::RelicSite.rank());
        assert!(SignatureGroup::CombatSite.rank() > SignatureGroup::CosmicSignature.rank());
        assert_eq!(SignatureGroup::CosmicSignature.rank(), 0);
    }

    #[test]
    fn unknown_labels_and_keys_fall_back_to_generic() {
        let sig: Signature = serde_json::from_value(json!({
            "eve_id": "ABC-123",
            "kind": "mystery",
            "group": "",
        }))
        .expect("decode");
        assert_eq!(sig.id, "ABC-123");
        assert_eq!(sig.kind, SignatureKind::CosmicSignature);
        assert_eq!(sig.group, SignatureGroup::CosmicSignature);
        assert!(!sig.custom_info.has_dest());
    }

    #[test]
    fn wire_round_trip_keeps_labels() {
        let sig = Signature::new("IEB-620")
            .with_group(SignatureGroup::RelicSite)
            .with_name("Some Relic Site");
        let value = serde_json::to_value(&sig).expect("encode");
        assert_eq!(value["group"], json!("Relic Site"));
        assert_eq!(value["kind"], json!("cosmic_signature"));
        assert_eq!(value["custom_info"]["full_id"], json!("IEB-620"));
        assert!(value.get("pending_deletion").is_none());

        let back: Signature = serde_json::from_value(value).expect("decode");
        assert_eq!(back, sig);
    }

    #[test]
    fn string_encoded_custom_info_is_accepted() {
        let sig: Signature = serde_json::from_value(json!({
            "id": "ERU",
            "group": "wormhole",
            "custom_info": "{\"dest\":\"J100001\",\"isCrit\":true}",
        }))
        .expect("decode");
        assert!(sig.is_wormhole_bookmark());
        assert_eq!(sig.custom_info.dest.as_deref(), Some("J100001"));
        assert_eq!(sig.custom_info.is_crit, Some(true));
    }

    #[test]
    fn ensure_custom_info_backfills_missing_dest() {
        let mut sig = Signature::new("ERU").with_custom_info(CustomInfo::default());
        assert!(sig.ensure_custom_info());
        assert_eq!(sig.custom_info, CustomInfo::fallback("ERU"));
        assert!(!sig.ensure_custom_info());
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let sig = Signature::new("ERU").with_name("  ");
        assert_eq!(sig.display_name(), "ERU");
    }
}
