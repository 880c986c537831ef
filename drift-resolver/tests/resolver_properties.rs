//! Property-based tests for the resolver's core guarantees:
//! - snapshots with identical field maps never conflict
//! - all-server-wins resolution reproduces the server data exactly
//! - every user-choice field is reported as remaining, never as resolved

use drift_resolver::{ConflictResolver, Resolution, ResolutionRule};
use drift_types::{EntitySnapshot, FieldMap, FieldValue, UserId};
use proptest::prelude::*;

fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z_]{1,12}").unwrap()
}

fn field_value_strategy() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        Just(FieldValue::Null),
        any::<bool>().prop_map(FieldValue::Bool),
        (-1e9f64..1e9f64).prop_map(FieldValue::Number),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,24}")
            .unwrap()
            .prop_map(FieldValue::Text),
    ]
}

fn field_map_strategy() -> impl Strategy<Value = FieldMap> {
    prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..8)
}

proptest! {
    /// Identical field maps never raise a conflict, whatever the versions
    /// or modifiers say.
    #[test]
    fn identical_maps_never_conflict(
        data in field_map_strategy(),
        client_version in 0u64..100,
        server_version in 0u64..100,
    ) {
        let resolver = ConflictResolver::new();
        let client = EntitySnapshot::new(data.clone(), client_version, UserId::new());
        let server = EntitySnapshot::new(data, server_version, UserId::new());

        prop_assert!(resolver.detect_conflict("lead", "l-1", &client, &server).is_none());
    }

    /// With the default server-wins policy, resolution reproduces the
    /// server snapshot's data exactly and leaves nothing remaining.
    #[test]
    fn server_wins_reproduces_server_data(
        client_data in field_map_strategy(),
        server_data in field_map_strategy(),
    ) {
        let resolver = ConflictResolver::new();
        let client = EntitySnapshot::new(client_data, 1, UserId::new());
        let server = EntitySnapshot::new(server_data, 2, UserId::new());

        if let Some(conflict) = resolver.detect_conflict("lead", "l-1", &client, &server) {
            let result = resolver.resolve(&conflict);
            prop_assert_eq!(&result.data, &server.data);
            prop_assert!(result.conflicts_remaining.is_empty());
            prop_assert_eq!(result.conflicts_resolved, conflict.conflict_fields.len());
        }
    }

    /// Every conflicting field under a user-choice default lands in
    /// `conflicts_remaining` and is excluded from the resolved tally.
    #[test]
    fn user_choice_fields_always_remain(
        client_data in field_map_strategy(),
        server_data in field_map_strategy(),
    ) {
        let resolver = ConflictResolver::new();
        resolver.set_default_resolution(Resolution::UserChoice);

        let client = EntitySnapshot::new(client_data, 1, UserId::new());
        let server = EntitySnapshot::new(server_data, 2, UserId::new());

        if let Some(conflict) = resolver.detect_conflict("lead", "l-1", &client, &server) {
            let result = resolver.resolve(&conflict);
            prop_assert_eq!(&result.conflicts_remaining, &conflict.conflict_fields);
            prop_assert_eq!(result.conflicts_resolved, 0);
        }
    }

    /// Detection is symmetric in which fields it reports.
    #[test]
    fn detection_reports_symmetric_fields(
        client_data in field_map_strategy(),
        server_data in field_map_strategy(),
    ) {
        let resolver = ConflictResolver::new();
        let client = EntitySnapshot::new(client_data, 1, UserId::new());
        let server = EntitySnapshot::new(server_data, 2, UserId::new());

        let forward = resolver.detect_conflict("lead", "l-1", &client, &server);
        let backward = resolver.detect_conflict("lead", "l-1", &server, &client);

        match (forward, backward) {
            (Some(a), Some(b)) => prop_assert_eq!(a.conflict_fields, b.conflict_fields),
            (None, None) => {}
            _ => prop_assert!(false, "asymmetric detection"),
        }
    }

    /// A client-wins rule on a single field puts the client's value in the
    /// merged data whenever the client has one.
    #[test]
    fn client_wins_rule_takes_client_value(
        value in prop::string::string_regex("[a-z]{1,10}").unwrap(),
        other in prop::string::string_regex("[a-z]{1,10}").unwrap(),
    ) {
        prop_assume!(value != other);

        let resolver = ConflictResolver::new();
        resolver.add_rule(ResolutionRule::new("lead", "stage", Resolution::ClientWins));

        let mut client_data = FieldMap::new();
        client_data.insert("stage".into(), FieldValue::Text(value.clone()));
        let mut server_data = FieldMap::new();
        server_data.insert("stage".into(), FieldValue::Text(other));

        let client = EntitySnapshot::new(client_data, 1, UserId::new());
        let server = EntitySnapshot::new(server_data, 2, UserId::new());

        let conflict = resolver.detect_conflict("lead", "l-1", &client, &server)
            .expect("values differ");
        let result = resolver.resolve(&conflict);
        prop_assert_eq!(result.data.get("stage"), Some(&FieldValue::Text(value)));
    }
}
