//! Resolution rules and rule storage.

use drift_types::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// How a conflicting field is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Take the server's value verbatim.
    ServerWins,
    /// Take the client's value verbatim.
    ClientWins,
    /// Combine both sides (custom merger, or the built-in default merge).
    Merge,
    /// Leave the field unresolved for a human or higher-level policy.
    UserChoice,
}

/// Error returned by a failing field merger.
///
/// A merger failure never aborts the whole merge — the resolver downgrades
/// that one field to user-choice handling.
#[derive(Debug, Error)]
#[error("merge failed: {0}")]
pub struct MergeError(String);

impl MergeError {
    /// Creates a merge error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A pluggable per-field merge function.
///
/// Mergers operate over the closed [`FieldValue`] variant set; either side
/// may be absent when the field exists on only one snapshot.
pub trait FieldMerger: Send + Sync {
    /// Produces the merged value, or an error to defer the field.
    fn merge(
        &self,
        client: Option<&FieldValue>,
        server: Option<&FieldValue>,
    ) -> Result<FieldValue, MergeError>;
}

impl<F> FieldMerger for F
where
    F: Fn(Option<&FieldValue>, Option<&FieldValue>) -> Result<FieldValue, MergeError>
        + Send
        + Sync,
{
    fn merge(
        &self,
        client: Option<&FieldValue>,
        server: Option<&FieldValue>,
    ) -> Result<FieldValue, MergeError> {
        self(client, server)
    }
}

/// A resolution policy for one field of one entity type.
///
/// At most one rule is active per `(entity_type, field)` key. `priority`
/// orders rules within an entity type (lower = higher precedence) and is
/// reserved for a future multi-rule-per-field lookup; today's lookup is by
/// exact key match.
#[derive(Clone)]
pub struct ResolutionRule {
    /// Entity type the rule applies to.
    pub entity_type: String,
    /// Field the rule applies to.
    pub field: String,
    /// The reconciliation strategy.
    pub resolution: Resolution,
    /// Ordering within the entity type (lower sorts first).
    pub priority: i32,
    /// Custom merger, used when `resolution` is [`Resolution::Merge`].
    pub merger: Option<Arc<dyn FieldMerger>>,
}

impl ResolutionRule {
    /// Creates a rule with priority 0 and no custom merger.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        resolution: Resolution,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            field: field.into(),
            resolution,
            priority: 0,
            merger: None,
        }
    }

    /// Sets the rule's priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Attaches a custom merger.
    #[must_use]
    pub fn with_merger(mut self, merger: Arc<dyn FieldMerger>) -> Self {
        self.merger = Some(merger);
        self
    }
}

impl fmt::Debug for ResolutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionRule")
            .field("entity_type", &self.entity_type)
            .field("field", &self.field)
            .field("resolution", &self.resolution)
            .field("priority", &self.priority)
            .field("has_merger", &self.merger.is_some())
            .finish()
    }
}

/// The rule table: per-entity-type rule lists, sorted by ascending
/// priority.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: HashMap<String, Vec<ResolutionRule>>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, replacing any existing rule for the same
    /// `(entity_type, field)` key, and keeps the entity type's list sorted
    /// by ascending priority.
    pub fn add(&mut self, rule: ResolutionRule) {
        let list = self.rules.entry(rule.entity_type.clone()).or_default();
        list.retain(|r| r.field != rule.field);
        list.push(rule);
        list.sort_by_key(|r| r.priority);
    }

    /// Removes the rule for a key. Returns whether a rule was removed.
    pub fn remove(&mut self, entity_type: &str, field: &str) -> bool {
        let Some(list) = self.rules.get_mut(entity_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.field != field);
        let removed = list.len() != before;
        if list.is_empty() {
            self.rules.remove(entity_type);
        }
        removed
    }

    /// Removes every rule.
    pub fn clear(&mut self) {
        self.rules.clear();
    }

    /// Looks up the rule for an exact `(entity_type, field)` key.
    #[must_use]
    pub fn get(&self, entity_type: &str, field: &str) -> Option<&ResolutionRule> {
        self.rules
            .get(entity_type)?
            .iter()
            .find(|r| r.field == field)
    }

    /// Total number of rules across all entity types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Whether the set holds no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
