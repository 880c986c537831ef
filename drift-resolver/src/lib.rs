//! Conflict detection and resolution for the drift sync engine.
//!
//! When a locally modified entity and the server's version of the same
//! entity diverge, this crate decides what the merged record looks like:
//!
//! - [`ConflictResolver::detect_conflict`] compares two snapshots
//!   field-by-field and reports the differing fields (or nothing).
//! - [`ConflictResolver::resolve`] applies per-`(entity type, field)`
//!   [`ResolutionRule`]s to produce a merged field map, starting from the
//!   server snapshot as the base — the server is the implicit source of
//!   truth for anything not explicitly ruled otherwise.
//!
//! The engine is deliberately bounded: a pluggable per-field policy
//! (server wins, client wins, merge, defer to the user), not a general
//! CRDT. Fields deferred to the user are reported in
//! [`MergeResult::conflicts_remaining`] for a higher-level policy to
//! settle out of band.

mod conflict;
mod resolver;
mod rules;
mod text;

pub use conflict::{Conflict, MergeMetadata, MergeResult};
pub use resolver::ConflictResolver;
pub use rules::{FieldMerger, MergeError, Resolution, ResolutionRule, RuleSet};
pub use text::{merge_text, similarity, MERGE_SEPARATOR, SIMILARITY_THRESHOLD};
