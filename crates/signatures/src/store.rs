use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex as TokioMutex;
use wanderer_protocol::{Signature, SignatureDiff};

use crate::error::{Result, SignatureError};

/// Persistence collaborator holding the authoritative signature set per system.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    /// Current signatures of a solar system.
    async fn fetch_signatures(&self, system_id: &str) -> Result<Vec<Signature>>;

    /// Apply a diff and return the resulting set.
    async fn commit_signatures(
        &self,
        system_id: &str,
        diff: &SignatureDiff,
    ) -> Result<Vec<Signature>>;

    /// Commit the final removal of one record whose grace window elapsed.
    async fn commit_removal(&self, system_id: &str, signature: &Signature) -> Result<Vec<Signature>> {
        self.commit_signatures(system_id, &SignatureDiff::removal(signature.clone()))
            .await
    }

    /// Take back an addition the user undid.
    async fn retract_addition(
        &self,
        system_id: &str,
        signature: &Signature,
    ) -> Result<Vec<Signature>> {
        self.commit_signatures(system_id, &SignatureDiff::removal(signature.clone()))
            .await
    }
}

/// In-process store keyed by system id.
///
/// Records every committed diff and can be told to fail upcoming commits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    systems: TokioMutex<HashMap<String, Vec<Signature>>>,
    commits: TokioMutex<Vec<SignatureDiff>>,
    failures: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with one system.
    #[must_use]
    pub fn with_system(system_id: impl Into<String>, signatures: Vec<Signature>) -> Self {
        let mut systems = HashMap::new();
        systems.insert(system_id.into(), signatures);
        Self {
            systems: TokioMutex::new(systems),
            ..Self::default()
        }
    }

    /// Replace the stored set of a system.
    pub async fn seed(&self, system_id: &str, signatures: Vec<Signature>) {
        self.systems
            .lock()
            .await
            .insert(system_id.to_string(), signatures);
    }

    pub async fn snapshot(&self, system_id: &str) -> Vec<Signature> {
        self.systems
            .lock()
            .await
            .get(system_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make the next `count` commits fail.
    pub fn fail_next_commits(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Every diff applied so far, in commit order.
    pub async fn commits(&self) -> Vec<SignatureDiff> {
        self.commits.lock().await.clone()
    }

    /// How many commits removed `id`.
    pub async fn removal_count(&self, id: &str) -> usize {
        self.commits
            .lock()
            .await
            .iter()
            .filter(|diff| diff.removed.iter().any(|s| s.id == id))
            .count()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SignatureStore for MemoryStore {
    async fn fetch_signatures(&self, system_id: &str) -> Result<Vec<Signature>> {
        Ok(self.snapshot(system_id).await)
    }

    async fn commit_signatures(
        &self,
        system_id: &str,
        diff: &SignatureDiff,
    ) -> Result<Vec<Signature>> {
        if self.take_failure() {
            log::warn!("Injected commit failure for system {system_id}");
            return Err(SignatureError::store(system_id, "commit rejected"));
        }

        let mut systems = self.systems.lock().await;
        let stored = systems.entry(system_id.to_string()).or_default();

        stored.retain(|s| !diff.removed.iter().any(|gone| gone.id == s.id));
        for signature in diff.updated.iter().chain(&diff.added) {
            let mut signature = signature.clone();
            signature.clear_pending();
            match stored.iter_mut().find(|s| s.id == signature.id) {
                Some(slot) => *slot = signature,
                None => stored.push(signature),
            }
        }

        let result = stored.clone();
        drop(systems);

        self.commits.lock().await.push(diff.clone());
        log::debug!(
            "Committed to {system_id}: +{} ~{} -{}",
            diff.added.len(),
            diff.updated.len(),
            diff.removed.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SYSTEM: &str = "31000001";

    fn ids(list: &[Signature]) -> Vec<&str> {
        list.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn commit_applies_diff_in_place() {
        let store = MemoryStore::with_system(
            SYSTEM,
            vec![Signature::new("AAA-111"), Signature::new("BBB-222")],
        );
        let diff = SignatureDiff {
            added: vec![Signature::new("CCC-333")],
            updated: vec![Signature::new("AAA-111").with_name("renamed")],
            removed: vec![Signature::new("BBB-222")],
        };

        let result = store.commit_signatures(SYSTEM, &diff).await.unwrap();
        assert_eq!(ids(&result), vec!["AAA-111", "CCC-333"]);
        assert_eq!(result[0].name, "renamed");
        assert_eq!(store.commits().await.len(), 1);
    }

    #[tokio::test]
    async fn stored_records_never_carry_pending_flags() {
        let store = MemoryStore::new();
        let mut flagged = Signature::new("AAA-111");
        flagged.pending_addition = true;
        let diff = SignatureDiff {
            added: vec![flagged],
            ..SignatureDiff::default()
        };
        let result = store.commit_signatures(SYSTEM, &diff).await.unwrap();
        assert!(!result[0].pending_addition);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = MemoryStore::with_system(SYSTEM, vec![Signature::new("AAA-111")]);
        store.fail_next_commits(1);

        let sig = Signature::new("AAA-111");
        let err = store.commit_removal(SYSTEM, &sig).await.unwrap_err();
        assert!(matches!(err, SignatureError::Store { .. }));
        assert_eq!(store.snapshot(SYSTEM).await.len(), 1);

        let result = store.commit_removal(SYSTEM, &sig).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(store.removal_count("AAA-111").await, 1);
    }

    #[tokio::test]
    async fn unknown_system_fetches_empty() {
        let store = MemoryStore::new();
        assert!(store.fetch_signatures("nowhere").await.unwrap().is_empty());
    }
}
