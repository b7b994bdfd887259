//! # Wanderer Protocol
//!
//! Wire data model for scanner signatures: the records exchanged between the
//! signature engine, the persistence store and the UI.

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod custom_info;
pub mod ids;
mod signature;

pub use custom_info::CustomInfo;
pub use signature::{Signature, SignatureGroup, SignatureKind};

pub const SIGNATURE_SCHEMA_VERSION: u32 = 1;

/// Classification of one signature set against another.
///
/// Doubles as the commit payload handed to the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SignatureDiff {
    #[serde(default)]
    pub added: Vec<Signature>,
    #[serde(default)]
    pub updated: Vec<Signature>,
    #[serde(default)]
    pub removed: Vec<Signature>,
}

impl SignatureDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    #[must_use]
    pub fn removal(signature: Signature) -> Self {
        Self {
            removed: vec![signature],
            ..Self::default()
        }
    }
}

/// JSON Schema of [`Signature`] as a plain JSON value.
pub fn signature_schema() -> Result<serde_json::Value> {
    let schema = schemars::schema_for!(Signature);
    serde_json::to_value(schema).map_err(Into::into)
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

pub fn serialize_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
