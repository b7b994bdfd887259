use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::time::{self, Instant};
use wanderer_protocol::{ids, Signature, SignatureDiff};

use crate::batch::parse_clipboard;
use crate::config::EngineConfig;
use crate::diff::{diff, DiffOptions};
use crate::error::Result;
use crate::merge::merge;
use crate::pending::{
    merge_with_pending_flags, FailureOutcome, PendingAction, PendingEntry, PendingSignatures,
    Transition, UndoOutcome,
};
use crate::store::SignatureStore;

/// Timer-driven change to the local view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A pending deletion left the view after the flash window
    Hidden { id: String },
    /// A pending deletion was committed to the store
    RemovalCommitted { id: String },
    /// A pending addition became an ordinary record
    AdditionConfirmed { id: String },
    /// Committing a removal failed
    CommitFailed {
        id: String,
        error: String,
        retrying: bool,
    },
}

/// Result of [`SignatureSession::paste`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PasteOutcome {
    /// Classification of the paste against the stored set
    pub diff: SignatureDiff,
    /// Removals now waiting out their grace window
    pub pending_deletions: Vec<String>,
    /// Additions that stay undoable for the addition window
    pub pending_additions: Vec<String>,
}

/// One solar system's signatures as seen by a single user.
///
/// Owns the local view, the pending-state tracker and the timers; the store
/// stays the authority for everything that is not pending.
pub struct SignatureSession<S> {
    system_id: String,
    store: Arc<S>,
    config: EngineConfig,
    signatures: Vec<Signature>,
    pending: PendingSignatures,
}

impl<S: SignatureStore> SignatureSession<S> {
    pub fn new(system_id: impl Into<String>, store: Arc<S>, config: EngineConfig) -> Self {
        let pending = PendingSignatures::new(config.grace.clone());
        Self {
            system_id: system_id.into(),
            store,
            config,
            signatures: Vec::new(),
            pending,
        }
    }

    /// Create a session and load its initial view.
    pub async fn open(
        system_id: impl Into<String>,
        store: Arc<S>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut session = Self::new(system_id, store, config);
        session.refresh().await?;
        Ok(session)
    }

    #[must_use]
    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Records currently shown, pending ones flagged, hidden ones left out.
    #[must_use]
    pub fn visible(&self) -> &[Signature] {
        &self.signatures
    }

    /// Pending entries an undo would revert.
    #[must_use]
    pub fn undo_eligible(&self) -> Vec<&PendingEntry> {
        self.pending.undo_eligible()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.next_deadline()
    }

    /// Re-fetch from the store, keeping local pending flags.
    pub async fn refresh(&mut self) -> Result<&[Signature]> {
        let server = self.store.fetch_signatures(&self.system_id).await?;
        self.rebuild_view(&server);
        Ok(&self.signatures)
    }

    /// Apply a clipboard paste to the system.
    ///
    /// Additions and updates are committed straight away. Removals wait out
    /// their grace window when lazy deletion is on and are committed with the
    /// rest otherwise.
    pub async fn paste(&mut self, text: &str) -> Result<PasteOutcome> {
        let incoming = parse_clipboard(text, &self.config.enabled_kinds);
        let old = self.store.fetch_signatures(&self.system_id).await?;

        // Bookmarks about to be superseded lend their description and flags
        // to the full record replacing them.
        let carried: Vec<Signature> = old
            .iter()
            .filter(|stored| {
                stored.is_wormhole_bookmark()
                    && incoming.iter().any(|candidate| {
                        candidate.is_resolved_wormhole()
                            && ids::shares_prefix(&stored.id, &candidate.id)
                    })
            })
            .cloned()
            .collect();
        let new = merge(&carried, &incoming);

        let options = DiffOptions::new(!self.config.lazy_delete, self.config.skip_unchanged);
        let classified = diff(&old, &new, options);

        let commit = if self.config.lazy_delete {
            SignatureDiff {
                added: classified.added.clone(),
                updated: classified.updated.clone(),
                removed: Vec::new(),
            }
        } else {
            classified.clone()
        };
        let server = if commit.is_empty() {
            old
        } else {
            self.store
                .commit_signatures(&self.system_id, &commit)
                .await?
        };

        for signature in &new {
            let removing = self
                .pending
                .get(&signature.id)
                .is_some_and(|entry| entry.action == PendingAction::PendingDeletion);
            if removing && self.pending.cancel(&signature.id).is_some() {
                log::info!("Paste revived pending signature {}", signature.id);
            }
        }

        let now = Instant::now();
        let wall = Utc::now();
        let mut outcome = PasteOutcome {
            diff: classified,
            ..PasteOutcome::default()
        };

        if self.config.lazy_delete && !outcome.diff.removed.is_empty() {
            outcome.pending_deletions = self
                .pending
                .begin_deletion(outcome.diff.removed.clone(), now, wall)
                .into_iter()
                .map(|s| s.id)
                .collect();
        }
        if self.config.undo_additions && !outcome.diff.added.is_empty() {
            outcome.pending_additions = self
                .pending
                .begin_addition(outcome.diff.added.clone(), now, wall)
                .into_iter()
                .map(|s| s.id)
                .collect();
        }

        self.rebuild_view(&server);
        log::info!(
            "Paste into {}: {} added, {} updated, {} removed ({} pending)",
            self.system_id,
            outcome.diff.added.len(),
            outcome.diff.updated.len(),
            outcome.diff.removed.len(),
            self.pending.len()
        );
        Ok(outcome)
    }

    /// Revert every pending entry.
    ///
    /// Timers are cancelled and the view restored before the store is asked to
    /// retract undone additions, so nothing scheduled can still fire. A failed
    /// retraction is logged and does not bring the record back.
    pub async fn undo(&mut self) -> UndoOutcome {
        let outcome = self.pending.undo();

        for restored in &outcome.restored {
            match self.signatures.iter_mut().find(|s| s.id == restored.id) {
                Some(slot) => *slot = restored.clone(),
                None => self.signatures.push(restored.clone()),
            }
        }
        self.signatures
            .retain(|s| !outcome.retracted.iter().any(|gone| gone.id == s.id));

        for retracted in &outcome.retracted {
            if let Err(err) = self
                .store
                .retract_addition(&self.system_id, retracted)
                .await
            {
                log::warn!("Failed to retract {}: {err}", retracted.id);
            }
        }

        outcome
    }

    /// Run every transition whose deadline has passed.
    pub async fn process_due(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        for transition in self.pending.pop_due(Instant::now()) {
            match transition {
                Transition::Hide(signature) => {
                    self.signatures.retain(|s| s.id != signature.id);
                    events.push(SessionEvent::Hidden { id: signature.id });
                }
                Transition::CommitRemoval(signature) => {
                    events.push(self.commit_removal(signature).await);
                }
                Transition::ConfirmAddition(signature) => {
                    if let Some(slot) = self.signatures.iter_mut().find(|s| s.id == signature.id) {
                        slot.clear_pending();
                    }
                    events.push(SessionEvent::AdditionConfirmed { id: signature.id });
                }
            }
        }

        events
    }

    /// Sleep through every armed deadline until nothing is scheduled.
    pub async fn drive_until_idle(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(deadline) = self.next_deadline() {
            time::sleep_until(deadline).await;
            events.extend(self.process_due().await);
        }
        events
    }

    async fn commit_removal(&mut self, signature: Signature) -> SessionEvent {
        let id = signature.id.clone();
        match self.store.commit_removal(&self.system_id, &signature).await {
            Ok(_) => {
                self.pending.finish_removal(&id);
                self.signatures.retain(|s| s.id != id);
                log::debug!("Committed removal of {id}");
                SessionEvent::RemovalCommitted { id }
            }
            Err(err) => {
                let retrying = match self
                    .pending
                    .removal_failed(&id, Instant::now(), Utc::now())
                {
                    Some(FailureOutcome::Retrying { attempt, backoff }) => {
                        self.sync_pending_until(&id);
                        log::warn!(
                            "Removal of {id} failed (attempt {attempt}), retrying in {}ms: {err}",
                            backoff.as_millis()
                        );
                        true
                    }
                    Some(FailureOutcome::Surfaced { attempts }) => {
                        log::error!("Removal of {id} failed after {attempts} attempts: {err}");
                        false
                    }
                    None => false,
                };
                SessionEvent::CommitFailed {
                    id,
                    error: err.to_string(),
                    retrying,
                }
            }
        }
    }

    fn sync_pending_until(&mut self, id: &str) {
        let Some(entry) = self.pending.get(id) else {
            return;
        };
        if let Some(slot) = self.signatures.iter_mut().find(|s| s.id == id) {
            slot.pending_until = entry.signature.pending_until;
        }
    }

    fn rebuild_view(&mut self, server: &[Signature]) {
        let local: Vec<Signature> = self
            .pending
            .undo_eligible()
            .into_iter()
            .map(|entry| entry.signature.clone())
            .collect();
        let mut view = merge_with_pending_flags(server, &local, Utc::now());
        view.retain(|s| !self.pending.is_hidden(&s.id));
        self.signatures = view;
    }
}
