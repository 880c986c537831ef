//! The conflict resolver: detection plus per-field rule application.

use crate::conflict::{Conflict, MergeMetadata, MergeResult};
use crate::rules::{MergeError, Resolution, ResolutionRule, RuleSet};
use crate::text::merge_text;
use chrono::Utc;
use drift_types::{EntitySnapshot, FieldValue};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;
use tracing::{debug, warn};

/// A stateless rule engine over versioned entity snapshots.
///
/// The only state is the rule table, which is explicitly synchronized and
/// mutable at runtime (per-tenant policy changes). Construct one per
/// application root and share it — there is no global instance.
#[derive(Debug)]
pub struct ConflictResolver {
    rules: RwLock<RuleSet>,
    default_resolution: RwLock<Resolution>,
}

impl ConflictResolver {
    /// Creates a resolver with an empty rule table and a `ServerWins`
    /// global default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(RuleSet::new()),
            default_resolution: RwLock::new(Resolution::ServerWins),
        }
    }

    // ── Rule management ──────────────────────────────────────────

    /// Adds a rule, replacing any existing rule for the same
    /// `(entity_type, field)` key.
    pub fn add_rule(&self, rule: ResolutionRule) {
        self.rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .add(rule);
    }

    /// Removes the rule for a key. Returns whether a rule was removed.
    pub fn remove_rule(&self, entity_type: &str, field: &str) -> bool {
        self.rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(entity_type, field)
    }

    /// Resets to the built-in defaults: no rules, `ServerWins` fallback.
    pub fn clear_rules(&self) {
        self.rules.write().unwrap_or_else(|e| e.into_inner()).clear();
        *self
            .default_resolution
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Resolution::ServerWins;
    }

    /// Sets the fallback resolution used when no rule matches.
    pub fn set_default_resolution(&self, resolution: Resolution) {
        *self
            .default_resolution
            .write()
            .unwrap_or_else(|e| e.into_inner()) = resolution;
    }

    /// The current fallback resolution.
    #[must_use]
    pub fn default_resolution(&self) -> Resolution {
        *self
            .default_resolution
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Total number of registered rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    // ── Detection ────────────────────────────────────────────────

    /// Compares two snapshots of the same entity field-by-field.
    ///
    /// Fields present on only one side, or with unequal values, count as
    /// conflicting. Returns `None` only when zero fields differ.
    #[must_use]
    pub fn detect_conflict(
        &self,
        entity_type: &str,
        entity_id: &str,
        client: &EntitySnapshot,
        server: &EntitySnapshot,
    ) -> Option<Conflict> {
        let fields: BTreeSet<&String> = client.data.keys().chain(server.data.keys()).collect();

        let conflict_fields: Vec<String> = fields
            .into_iter()
            .filter(|field| client.data.get(*field) != server.data.get(*field))
            .cloned()
            .collect();

        if conflict_fields.is_empty() {
            return None;
        }

        debug!(
            entity_type,
            entity_id,
            fields = conflict_fields.len(),
            "conflict detected"
        );
        Some(Conflict::new(
            entity_type,
            entity_id,
            client.clone(),
            server.clone(),
            conflict_fields,
        ))
    }

    // ── Resolution ───────────────────────────────────────────────

    /// Resolves a conflict into a merged field map.
    ///
    /// Starts from the server snapshot as the base, then applies each
    /// conflicting field's rule (falling back to the global default). A
    /// failing merger downgrades that one field to user-choice handling
    /// rather than aborting the merge.
    #[must_use]
    pub fn resolve(&self, conflict: &Conflict) -> MergeResult {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        let default = self.default_resolution();

        let mut data = conflict.server.data.clone();
        let mut applied: BTreeMap<String, Resolution> = BTreeMap::new();
        let mut remaining: Vec<String> = Vec::new();

        for field in &conflict.conflict_fields {
            let rule = rules.get(&conflict.entity_type, field);
            let resolution = rule.map_or(default, |r| r.resolution);
            let client_value = conflict.client.data.get(field);
            let server_value = conflict.server.data.get(field);

            match resolution {
                Resolution::ServerWins => {
                    // The base is already the server snapshot.
                    applied.insert(field.clone(), Resolution::ServerWins);
                }
                Resolution::ClientWins => {
                    match client_value {
                        Some(value) => {
                            data.insert(field.clone(), value.clone());
                        }
                        None => {
                            data.remove(field);
                        }
                    }
                    applied.insert(field.clone(), Resolution::ClientWins);
                }
                Resolution::Merge => {
                    let merged = match rule.and_then(|r| r.merger.as_deref()) {
                        Some(merger) => merger.merge(client_value, server_value),
                        None => default_merge(client_value, server_value),
                    };
                    match merged {
                        Ok(value) => {
                            data.insert(field.clone(), value);
                            applied.insert(field.clone(), Resolution::Merge);
                        }
                        Err(e) => {
                            warn!(
                                entity_type = %conflict.entity_type,
                                field = %field,
                                "merger failed, deferring field: {e}"
                            );
                            applied.insert(field.clone(), Resolution::UserChoice);
                            remaining.push(field.clone());
                        }
                    }
                }
                Resolution::UserChoice => {
                    applied.insert(field.clone(), Resolution::UserChoice);
                    remaining.push(field.clone());
                }
            }
        }

        let conflicts_resolved = conflict.conflict_fields.len() - remaining.len();
        MergeResult {
            data,
            conflicts_resolved,
            conflicts_remaining: remaining,
            resolution_strategy: dominant_strategy(&applied, default),
            metadata: MergeMetadata {
                merged_at: Utc::now(),
                applied,
                client_version: conflict.client_version(),
                server_version: conflict.server_version(),
            },
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// The built-in merge for fields without a custom merger: timestamps take
/// the most recent, numbers take the maximum, text goes through the
/// similarity merge, anything else falls back to the server value. A field
/// present on only one side keeps that side's value.
fn default_merge(
    client: Option<&FieldValue>,
    server: Option<&FieldValue>,
) -> Result<FieldValue, MergeError> {
    match (client, server) {
        (None, None) => Err(MergeError::new("field absent on both sides")),
        (Some(value), None) | (None, Some(value)) => Ok(value.clone()),
        (Some(client), Some(server)) => Ok(match (client, server) {
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => {
                FieldValue::Timestamp(*a.max(b))
            }
            (FieldValue::Number(a), FieldValue::Number(b)) => FieldValue::Number(a.max(*b)),
            (FieldValue::Text(a), FieldValue::Text(b)) => FieldValue::Text(merge_text(a, b)),
            _ => server.clone(),
        }),
    }
}

/// The most common strategy among the per-field outcomes; ties go to the
/// earlier variant in declaration order. Empty input returns the default.
fn dominant_strategy(applied: &BTreeMap<String, Resolution>, default: Resolution) -> Resolution {
    let candidates = [
        Resolution::ServerWins,
        Resolution::ClientWins,
        Resolution::Merge,
        Resolution::UserChoice,
    ];

    let mut best = default;
    let mut best_count = 0;
    for candidate in candidates {
        let count = applied.values().filter(|r| **r == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}
