//! Pending-state lifecycle for lazily removed and added signatures.
//!
//! ```text
//! Active ──remove──> PendingDeletion ──flash──> hidden ──final──> committed
//!                         │                        │
//!                         └────────── undo ────────┴──> Active (restored)
//!
//! Active ──add─────> PendingAddition ──window──> confirmed
//!                         │
//!                         └── undo ──> retracted from the store
//! ```
//!
//! Timers are plain deadlines owned by [`GraceTimers`]; the owner of a
//! [`PendingSignatures`] sleeps until [`PendingSignatures::next_deadline`] and
//! then calls [`PendingSignatures::pop_due`]. Cancelling a timer is removing
//! its slot, so cancellation never needs to be awaited.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use wanderer_protocol::Signature;

use crate::config::{CommitFailurePolicy, GraceConfig};

/// What a pending entry is waiting to finalize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    PendingDeletion,
    PendingAddition,
}

/// Which deadline a timer slot stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GracePhase {
    /// Hide the record locally
    Flash,
    /// Commit the removal or confirm the addition
    Final,
}

#[derive(Debug, Clone, Copy)]
struct TimerSlot {
    deadline: Instant,
    phase: GracePhase,
}

/// Deadlines keyed by signature id, at most one per id.
#[derive(Debug, Default)]
pub struct GraceTimers {
    slots: HashMap<String, TimerSlot>,
}

impl GraceTimers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a deadline for `id`, replacing any earlier one.
    pub fn schedule(&mut self, id: impl Into<String>, phase: GracePhase, deadline: Instant) {
        self.slots.insert(id.into(), TimerSlot { deadline, phase });
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        self.slots.remove(id).is_some()
    }

    /// Cancel every timer, returning how many were armed.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.slots.len();
        self.slots.clear();
        cancelled
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.values().map(|slot| slot.deadline).min()
    }

    #[must_use]
    pub fn deadline_of(&self, id: &str) -> Option<(Instant, GracePhase)> {
        self.slots.get(id).map(|slot| (slot.deadline, slot.phase))
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<(String, GracePhase)> {
        let mut due: Vec<(Instant, String)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.deadline <= now)
            .map(|(id, slot)| (slot.deadline, id.clone()))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, id)| {
                let slot = self.slots.remove(&id)?;
                Some((id, slot.phase))
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A signature inside its grace window
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    /// The record, stamped with its pending flag and `pending_until`
    pub signature: Signature,
    pub action: PendingAction,
    /// Wall-clock end of the grace window
    pub grace_deadline: DateTime<Utc>,
    /// Removed from the local view by the flash window
    pub hidden: bool,
    /// Failed commit attempts so far
    pub attempts: u32,
    /// Commit gave up; the entry waits for undo with no timer
    pub failed: bool,
    final_at: Instant,
}

/// Timer work handed back by [`PendingSignatures::pop_due`]
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Flash window elapsed; drop the record from the local view
    Hide(Signature),
    /// Final window elapsed; commit the removal to the store
    CommitRemoval(Signature),
    /// Addition window elapsed; the record is now an ordinary active record
    ConfirmAddition(Signature),
}

/// Result of a failed removal commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Commit rescheduled after `backoff`
    Retrying { attempt: u32, backoff: Duration },
    /// No further attempts; the entry stays undoable
    Surfaced { attempts: u32 },
}

/// What [`PendingSignatures::undo`] reverted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoOutcome {
    /// Pending deletions back to active, flags cleared
    pub restored: Vec<Signature>,
    /// Pending additions that must be retracted from the store
    pub retracted: Vec<Signature>,
    pub cancelled_timers: usize,
}

impl UndoOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.restored.is_empty() && self.retracted.is_empty()
    }
}

/// Pending entries of one signature session, in the order they became pending.
#[derive(Debug)]
pub struct PendingSignatures {
    grace: GraceConfig,
    entries: HashMap<String, PendingEntry>,
    order: Vec<String>,
    timers: GraceTimers,
}

impl PendingSignatures {
    #[must_use]
    pub fn new(grace: GraceConfig) -> Self {
        Self {
            grace,
            entries: HashMap::new(),
            order: Vec::new(),
            timers: GraceTimers::new(),
        }
    }

    /// Put `removed` into PendingDeletion and return the stamped records.
    ///
    /// With a flash window the record is hidden first and committed at the
    /// final deadline; without one it stays visible until committed. Records
    /// already pending deletion keep their deadlines and hidden state.
    pub fn begin_deletion(
        &mut self,
        removed: Vec<Signature>,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Vec<Signature> {
        let final_window = self.grace.final_window();
        let flash_window = self.grace.flash_window();

        removed
            .into_iter()
            .map(|mut signature| {
                if let Some(entry) = self
                    .entries
                    .get(&signature.id)
                    .filter(|entry| entry.action == PendingAction::PendingDeletion)
                {
                    return entry.signature.clone();
                }

                let grace_deadline = wall + to_chrono(final_window);
                signature.pending_deletion = true;
                signature.pending_addition = false;
                signature.pending_until = Some(grace_deadline);

                let final_at = now + final_window;
                match flash_window {
                    Some(flash) => self.timers.schedule(&signature.id, GracePhase::Flash, now + flash),
                    None => self.timers.schedule(&signature.id, GracePhase::Final, final_at),
                }
                log::debug!("Signature {} pending deletion", signature.id);

                self.insert(PendingEntry {
                    signature: signature.clone(),
                    action: PendingAction::PendingDeletion,
                    grace_deadline,
                    hidden: false,
                    attempts: 0,
                    failed: false,
                    final_at,
                });
                signature
            })
            .collect()
    }

    /// Put `added` into PendingAddition and return the stamped records.
    pub fn begin_addition(
        &mut self,
        added: Vec<Signature>,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Vec<Signature> {
        let window = self.grace.addition_window();

        added
            .into_iter()
            .map(|mut signature| {
                let grace_deadline = wall + to_chrono(window);
                signature.pending_addition = true;
                signature.pending_deletion = false;
                signature.pending_until = Some(grace_deadline);

                let final_at = now + window;
                self.timers.schedule(&signature.id, GracePhase::Final, final_at);
                log::debug!("Signature {} pending addition", signature.id);

                self.insert(PendingEntry {
                    signature: signature.clone(),
                    action: PendingAction::PendingAddition,
                    grace_deadline,
                    hidden: false,
                    attempts: 0,
                    failed: false,
                    final_at,
                });
                signature
            })
            .collect()
    }

    /// Advance every entry whose timer is due at `now`.
    ///
    /// Removal entries stay tracked until [`Self::finish_removal`] or
    /// [`Self::removal_failed`] reports the outcome of the commit.
    pub fn pop_due(&mut self, now: Instant) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for (id, phase) in self.timers.pop_expired(now) {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            match (entry.action, phase) {
                (PendingAction::PendingDeletion, GracePhase::Flash) => {
                    entry.hidden = true;
                    self.timers.schedule(&id, GracePhase::Final, entry.final_at);
                    transitions.push(Transition::Hide(entry.signature.clone()));
                }
                (PendingAction::PendingDeletion, GracePhase::Final) => {
                    transitions.push(Transition::CommitRemoval(entry.signature.clone()));
                }
                (PendingAction::PendingAddition, _) => {
                    if let Some(mut entry) = self.remove(&id) {
                        entry.signature.clear_pending();
                        transitions.push(Transition::ConfirmAddition(entry.signature));
                    }
                }
            }
        }

        transitions
    }

    /// Stop tracking `id` without committing anything, e.g. when a paste
    /// lists a record again while its removal is still pending.
    pub fn cancel(&mut self, id: &str) -> Option<Signature> {
        self.timers.cancel(id);
        let mut entry = self.remove(id)?;
        entry.signature.clear_pending();
        Some(entry.signature)
    }

    /// Drop a removal whose commit succeeded.
    pub fn finish_removal(&mut self, id: &str) -> Option<PendingEntry> {
        self.timers.cancel(id);
        self.remove(id)
    }

    /// Record a failed removal commit and apply the failure policy.
    ///
    /// A retry moves `pending_until` to the rescheduled commit so the record
    /// keeps its flag across refreshes.
    pub fn removal_failed(
        &mut self,
        id: &str,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Option<FailureOutcome> {
        let policy = self.grace.commit_failure;
        let entry = self.entries.get_mut(id)?;
        entry.attempts += 1;

        if let CommitFailurePolicy::Retry {
            max_attempts,
            backoff_ms,
        } = policy
        {
            if entry.attempts < max_attempts {
                let backoff = Duration::from_millis(backoff_ms);
                entry.final_at = now + backoff;
                entry.grace_deadline = wall + to_chrono(backoff);
                entry.signature.pending_until = Some(entry.grace_deadline);
                self.timers.schedule(id, GracePhase::Final, entry.final_at);
                return Some(FailureOutcome::Retrying {
                    attempt: entry.attempts,
                    backoff,
                });
            }
        }

        entry.failed = true;
        self.timers.cancel(id);
        Some(FailureOutcome::Surfaced {
            attempts: entry.attempts,
        })
    }

    /// Cancel every timer and revert every pending entry.
    ///
    /// Safe to call repeatedly; a second call finds nothing to revert.
    pub fn undo(&mut self) -> UndoOutcome {
        let cancelled_timers = self.timers.cancel_all();
        let mut outcome = UndoOutcome {
            cancelled_timers,
            ..UndoOutcome::default()
        };

        for id in std::mem::take(&mut self.order) {
            let Some(mut entry) = self.entries.remove(&id) else {
                continue;
            };
            entry.signature.clear_pending();
            match entry.action {
                PendingAction::PendingDeletion => outcome.restored.push(entry.signature),
                PendingAction::PendingAddition => outcome.retracted.push(entry.signature),
            }
        }
        self.entries.clear();

        if !outcome.is_empty() {
            log::info!(
                "Undo restored {} and retracted {} signatures",
                outcome.restored.len(),
                outcome.retracted.len()
            );
        }
        outcome
    }

    /// Entries the user can still undo, oldest first.
    #[must_use]
    pub fn undo_eligible(&self) -> Vec<&PendingEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PendingEntry> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn is_hidden(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|entry| entry.hidden)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, entry: PendingEntry) {
        let id = entry.signature.id.clone();
        if self.entries.insert(id.clone(), entry).is_none() {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: &str) -> Option<PendingEntry> {
        self.order.retain(|known| known != id);
        self.entries.remove(id)
    }
}

/// Re-apply local pending flags to a freshly fetched snapshot.
///
/// Local records still inside their grace window keep their flag and
/// deadline on the server copy; those the server does not list yet are
/// appended unchanged.
#[must_use]
pub fn merge_with_pending_flags(
    server: &[Signature],
    local: &[Signature],
    now: DateTime<Utc>,
) -> Vec<Signature> {
    let pending: Vec<&Signature> = local
        .iter()
        .filter(|s| s.is_pending() && s.pending_until.is_some_and(|until| until > now))
        .collect();

    let mut merged: Vec<Signature> = server
        .iter()
        .map(|fetched| {
            let mut fetched = fetched.clone();
            if let Some(local) = pending.iter().find(|local| local.id == fetched.id) {
                fetched.pending_deletion = local.pending_deletion;
                fetched.pending_addition = local.pending_addition;
                fetched.pending_until = local.pending_until;
            }
            fetched
        })
        .collect();

    for local in pending {
        if !server.iter().any(|fetched| fetched.id == local.id) {
            merged.push(local.clone());
        }
    }

    merged
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}
