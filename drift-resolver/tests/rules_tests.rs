use drift_resolver::{ConflictResolver, Resolution, ResolutionRule, RuleSet};

// ── RuleSet ──────────────────────────────────────────────────────

#[test]
fn add_replaces_same_key() {
    let mut rules = RuleSet::new();
    rules.add(ResolutionRule::new("lead", "stage", Resolution::ClientWins));
    rules.add(ResolutionRule::new("lead", "stage", Resolution::UserChoice));

    assert_eq!(rules.len(), 1);
    assert_eq!(
        rules.get("lead", "stage").unwrap().resolution,
        Resolution::UserChoice
    );
}

#[test]
fn rules_are_sorted_by_ascending_priority() {
    let mut rules = RuleSet::new();
    rules.add(ResolutionRule::new("lead", "b", Resolution::Merge).with_priority(5));
    rules.add(ResolutionRule::new("lead", "a", Resolution::Merge).with_priority(1));
    rules.add(ResolutionRule::new("lead", "c", Resolution::Merge).with_priority(3));

    // Replacing a rule re-sorts its entity type's list.
    rules.add(ResolutionRule::new("lead", "b", Resolution::Merge).with_priority(0));

    let priorities: Vec<i32> = ["b", "a", "c"]
        .into_iter()
        .map(|f| rules.get("lead", f).unwrap().priority)
        .collect();
    assert_eq!(priorities, vec![0, 1, 3]);
}

#[test]
fn remove_reports_whether_anything_was_removed() {
    let mut rules = RuleSet::new();
    rules.add(ResolutionRule::new("lead", "stage", Resolution::Merge));

    assert!(rules.remove("lead", "stage"));
    assert!(!rules.remove("lead", "stage"));
    assert!(!rules.remove("kpi", "stage"));
    assert!(rules.is_empty());
}

#[test]
fn lookup_is_exact_key_match() {
    let mut rules = RuleSet::new();
    rules.add(ResolutionRule::new("lead", "stage", Resolution::Merge));

    assert!(rules.get("lead", "stage").is_some());
    assert!(rules.get("lead", "name").is_none());
    assert!(rules.get("opportunity", "stage").is_none());
}

// ── Resolver rule management ─────────────────────────────────────

#[test]
fn clear_rules_resets_to_builtin_defaults() {
    let resolver = ConflictResolver::new();
    resolver.add_rule(ResolutionRule::new("lead", "stage", Resolution::ClientWins));
    resolver.set_default_resolution(Resolution::ClientWins);

    resolver.clear_rules();

    assert_eq!(resolver.rule_count(), 0);
    assert_eq!(resolver.default_resolution(), Resolution::ServerWins);
}

#[test]
fn set_default_resolution_applies_to_unruled_fields() {
    let resolver = ConflictResolver::new();
    resolver.set_default_resolution(Resolution::ClientWins);
    assert_eq!(resolver.default_resolution(), Resolution::ClientWins);
}

#[test]
fn rule_debug_reports_merger_presence() {
    let rule = ResolutionRule::new("lead", "stage", Resolution::Merge);
    let debug = format!("{rule:?}");
    assert!(debug.contains("has_merger: false"));
}
