use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wanderer_protocol::SignatureKind;

use crate::error::{Result, SignatureError};

/// Configuration for one signature session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Route removals through a grace period instead of committing them at once.
    /// When disabled, pastes only add and update.
    pub lazy_delete: bool,

    /// Keep fresh additions undoable for `grace.addition_window_ms`
    pub undo_additions: bool,

    /// Do not touch records a paste leaves unchanged
    pub skip_unchanged: bool,

    /// Kind keys the batch parser accepts from probe-scanner rows
    pub enabled_kinds: Vec<SignatureKind>,

    /// Grace windows and failure handling
    pub grace: GraceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lazy_delete: true,
            undo_additions: true,
            skip_unchanged: false,
            enabled_kinds: SignatureKind::ALL.to_vec(),
            grace: GraceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// One grace window: records stay visible and flagged until committed
    pub fn single_window() -> Self {
        Self {
            grace: GraceConfig {
                flash_window_ms: 0,
                ..GraceConfig::default()
            },
            ..Default::default()
        }
    }

    /// No lazy deletion and no undo for additions
    pub fn immediate() -> Self {
        Self {
            lazy_delete: false,
            undo_additions: false,
            ..Default::default()
        }
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.grace.validate()
    }
}

/// Grace windows of the pending-state lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraceConfig {
    /// Delay before a pending deletion disappears from the local view (0 = single window)
    pub flash_window_ms: u64,

    /// Delay before a pending deletion is committed to the store
    pub final_window_ms: u64,

    /// Delay before a pending addition is confirmed
    pub addition_window_ms: u64,

    /// What to do when committing a removal fails
    pub commit_failure: CommitFailurePolicy,
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            flash_window_ms: 5_000,
            final_window_ms: 30_000,
            addition_window_ms: 30_000,
            commit_failure: CommitFailurePolicy::default(),
        }
    }
}

impl GraceConfig {
    #[must_use]
    pub fn flash_window(&self) -> Option<Duration> {
        (self.flash_window_ms > 0).then(|| Duration::from_millis(self.flash_window_ms))
    }

    #[must_use]
    pub const fn final_window(&self) -> Duration {
        Duration::from_millis(self.final_window_ms)
    }

    #[must_use]
    pub const fn addition_window(&self) -> Duration {
        Duration::from_millis(self.addition_window_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.final_window_ms == 0 {
            return Err(SignatureError::invalid_config(
                "grace.final_window_ms must be > 0",
            ));
        }

        if self.flash_window_ms > self.final_window_ms {
            return Err(SignatureError::invalid_config(format!(
                "grace.flash_window_ms ({}) cannot exceed grace.final_window_ms ({})",
                self.flash_window_ms, self.final_window_ms
            )));
        }

        if let CommitFailurePolicy::Retry { max_attempts, .. } = self.commit_failure {
            if max_attempts == 0 {
                return Err(SignatureError::invalid_config(
                    "grace.commit_failure.max_attempts must be > 0",
                ));
            }
        }

        Ok(())
    }
}

/// Handling of a failed "commit removal" call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CommitFailurePolicy {
    /// Reschedule the commit after `backoff_ms`, up to `max_attempts` calls in total
    Retry { max_attempts: u32, backoff_ms: u64 },

    /// Report the failure once and leave the record undoable
    Surface,
}

impl Default for CommitFailurePolicy {
    fn default() -> Self {
        Self::Retry {
            max_attempts: 3,
            backoff_ms: 2_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.grace.flash_window(),
            Some(Duration::from_millis(5_000))
        );
        assert_eq!(config.grace.final_window(), Duration::from_millis(30_000));
    }

    #[test]
    fn test_preset_configs_valid() {
        assert!(EngineConfig::single_window().validate().is_ok());
        assert!(EngineConfig::immediate().validate().is_ok());
        assert_eq!(EngineConfig::single_window().grace.flash_window(), None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        // Invalid: flash > final
        config.grace.flash_window_ms = 40_000;
        assert!(config.validate().is_err());

        // Invalid: final = 0
        config.grace.flash_window_ms = 0;
        config.grace.final_window_ms = 0;
        assert!(config.validate().is_err());

        // Invalid: retry without attempts
        config.grace.final_window_ms = 1_000;
        config.grace.commit_failure = CommitFailurePolicy::Retry {
            max_attempts: 0,
            backoff_ms: 10,
        };
        assert!(config.validate().is_err());

        config.grace.commit_failure = CommitFailurePolicy::Surface;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            lazy_delete = false
            enabled_kinds = ["cosmic_signature", "cosmic_anomaly"]

            [grace]
            flash_window_ms = 1000

            [grace.commit_failure]
            mode = "surface"
            "#,
        )
        .expect("valid toml");

        assert!(!config.lazy_delete);
        assert!(config.undo_additions);
        assert_eq!(
            config.enabled_kinds,
            vec![SignatureKind::CosmicSignature, SignatureKind::CosmicAnomaly]
        );
        assert_eq!(config.grace.flash_window_ms, 1_000);
        assert_eq!(config.grace.final_window_ms, 30_000);
        assert_eq!(config.grace.commit_failure, CommitFailurePolicy::Surface);
    }

    #[test]
    fn test_toml_rejects_unknown_keys_and_bad_windows() {
        assert!(matches!(
            EngineConfig::from_toml_str("lazy_deletes = true"),
            Err(SignatureError::ConfigParse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[grace]\nflash_window_ms = 60000"),
            Err(SignatureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("signatures.toml");
        std::fs::write(&path, "skip_unchanged = true\n").expect("write");
        let config = EngineConfig::load(&path).expect("load");
        assert!(config.skip_unchanged);
        assert!(EngineConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
