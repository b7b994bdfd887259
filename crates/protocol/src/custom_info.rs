use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ids::is_dashed_full_id;

/// Structured hint payload attached to every signature.
///
/// The wire shape is a small JSON object that always carries `dest`, and
/// `full_id` once the full probe-scanner ID is known. Keys this crate does not
/// model are kept in `extra` so they survive a merge untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CustomInfo {
    /// Destination hint; the signature ID when nothing better is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,

    /// Full dashed ID once resolved
    #[serde(default, alias = "fullId")]
    pub full_id: Option<String>,

    /// Wormhole is near the end of its life
    #[serde(default, alias = "isEOL", skip_serializing_if = "Option::is_none")]
    pub is_eol: Option<bool>,

    /// Wormhole is mass-critical
    #[serde(default, alias = "isCrit", skip_serializing_if = "Option::is_none")]
    pub is_crit: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomInfo {
    /// Payload a freshly parsed signature starts with.
    #[must_use]
    pub fn for_id(id: &str) -> Self {
        Self {
            dest: Some(id.to_string()),
            full_id: is_dashed_full_id(id).then(|| id.to_string()),
            ..Self::default()
        }
    }

    /// Payload for a wormhole token carrying EOL/critical flags.
    #[must_use]
    pub fn wormhole(id: &str, is_eol: bool, is_crit: bool) -> Self {
        Self {
            is_eol: Some(is_eol),
            is_crit: Some(is_crit),
            ..Self::for_id(id)
        }
    }

    /// Replacement used when a payload has no usable `dest`.
    #[must_use]
    pub fn fallback(id: &str) -> Self {
        Self {
            dest: Some(id.to_string()),
            full_id: Some(id.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_dest(&self) -> bool {
        self.dest.as_deref().is_some_and(|dest| !dest.trim().is_empty())
    }

    /// Overlay every non-null field of `other` onto `self`.
    pub fn merge_from(&mut self, other: &Self) {
        if let Some(dest) = other.dest.as_ref().filter(|d| !d.is_empty()) {
            self.dest = Some(dest.clone());
        }
        if let Some(full_id) = &other.full_id {
            self.full_id = Some(full_id.clone());
        }
        if other.is_eol.is_some() {
            self.is_eol = other.is_eol;
        }
        if other.is_crit.is_some() {
            self.is_crit = other.is_crit;
        }
        for (key, value) in &other.extra {
            if !value.is_null() {
                self.extra.insert(key.clone(), value.clone());
            }
        }
    }

    /// Decode a JSON-encoded payload, `None` when it is not a valid object.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => serde_json::from_value(Value::Object(map)).ok(),
            _ => None,
        }
    }

    /// Lenient conversion from whatever the store handed over.
    ///
    /// Objects and JSON-encoded strings are decoded; anything else, or a value
    /// that fails to decode, becomes an empty payload.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => serde_json::from_value(Value::Object(map)).unwrap_or_default(),
            Value::String(raw) => Self::decode(&raw).unwrap_or_default(),
            _ => Self::default(),
        }
    }
}

pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<CustomInfo, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(CustomInfo::from_value(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn for_id_sets_full_id_only_for_dashed_ids() {
        let partial = CustomInfo::for_id("ERU");
        assert_eq!(partial.dest.as_deref(), Some("ERU"));
        assert_eq!(partial.full_id, None);

        let full = CustomInfo::for_id("ERU-123");
        assert_eq!(full.full_id.as_deref(), Some("ERU-123"));
    }

    #[test]
    fn decodes_string_encoded_payload_with_aliases() {
        let info = CustomInfo::from_value(json!(
            r#"{"dest":"J123","fullId":"ERU-123","isEOL":true,"k162":"yes"}"#
        ));
        assert_eq!(info.dest.as_deref(), Some("J123"));
        assert_eq!(info.full_id.as_deref(), Some("ERU-123"));
        assert_eq!(info.is_eol, Some(true));
        assert_eq!(info.extra.get("k162"), Some(&json!("yes")));
    }

    #[test]
    fn malformed_payloads_become_empty() {
        assert_eq!(CustomInfo::from_value(json!("{not json")), CustomInfo::default());
        assert_eq!(CustomInfo::from_value(json!("[1,2]")), CustomInfo::default());
        assert_eq!(CustomInfo::from_value(json!(42)), CustomInfo::default());
        assert_eq!(CustomInfo::from_value(json!({"dest": 7})), CustomInfo::default());
        assert!(!CustomInfo::default().has_dest());
    }

    #[test]
    fn merge_overwrites_with_non_null_fields_only() {
        let mut base = CustomInfo::for_id("ERU-123");
        base.extra.insert("note".into(), json!("keep"));
        base.extra.insert("mass".into(), json!("stable"));

        let mut overlay = CustomInfo::wormhole("ERU", true, false);
        overlay.extra.insert("note".into(), Value::Null);
        overlay.extra.insert("mass".into(), json!("reduced"));

        base.merge_from(&overlay);
        assert_eq!(base.dest.as_deref(), Some("ERU"));
        assert_eq!(base.full_id.as_deref(), Some("ERU-123"));
        assert_eq!(base.is_eol, Some(true));
        assert_eq!(base.is_crit, Some(false));
        assert_eq!(base.extra.get("note"), Some(&json!("keep")));
        assert_eq!(base.extra.get("mass"), Some(&json!("reduced")));
    }
}
