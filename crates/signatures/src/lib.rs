//! # Wanderer Signatures
//!
//! Reconciles scanner clipboard pastes with the stored signatures of a solar
//! system.
//!
//! ## Architecture
//!
//! ```text
//! Clipboard text
//!     │
//!     ├──> Batch parser (probe-scanner rows / bookmark rows)
//!     │    └─> Line grammar for bookmark labels
//!     │
//!     ├──> Merge: one record per wormhole family or exact id
//!     │
//!     ├──> Diff against the stored set → added / updated / removed
//!     │
//!     └──> Session
//!          ├─> commit additions and updates
//!          ├─> removals wait in PendingDeletion (flash, then final window)
//!          ├─> additions stay undoable in PendingAddition
//!          └─> undo cancels every timer and reverts every pending entry
//! ```
//!
//! ## Example
//!
//! ```rust
//! use wanderer_signatures::{diff, parse_clipboard, DiffOptions, EngineConfig};
//!
//! let config = EngineConfig::default();
//! let pasted = parse_clipboard(
//!     "ERU-123\tCosmic Signature\tWormhole\tUnstable Wormhole\t100,0%\t4,23 AU",
//!     &config.enabled_kinds,
//! );
//!
//! let changes = diff(&[], &pasted, DiffOptions::default());
//! assert_eq!(changes.added.len(), 1);
//! ```

mod batch;
mod config;
mod diff;
mod error;
mod grammar;
mod merge;
mod pending;
mod session;
mod store;

pub use batch::{
    classify_row, parse_batch, parse_clipboard, parse_probe_row, translate_kind, RowFormat,
    BOOKMARK_FIELDS, PROBE_FIELDS,
};
pub use config::{CommitFailurePolicy, EngineConfig, GraceConfig};
pub use diff::{diff, DiffOptions};
pub use error::{Result, SignatureError};
pub use grammar::{parse_line, parse_wormhole_token, scanner_timestamp};
pub use merge::{fold_into, merge};
pub use pending::{
    merge_with_pending_flags, FailureOutcome, GracePhase, GraceTimers, PendingAction,
    PendingEntry, PendingSignatures, Transition, UndoOutcome,
};
pub use session::{PasteOutcome, SessionEvent, SignatureSession};
pub use store::{MemoryStore, SignatureStore};

pub use wanderer_protocol::{CustomInfo, Signature, SignatureDiff, SignatureGroup, SignatureKind};
