use drift_types::{MessageId, OrgId};
use std::str::FromStr;

#[test]
fn display_and_parse_round_trip() {
    let id = OrgId::new();
    let parsed = OrgId::from_str(&id.to_string()).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn parse_rejects_garbage() {
    assert!(OrgId::parse("not-a-uuid").is_err());
}

#[test]
fn serde_is_transparent() {
    let id = MessageId::new();
    let json = serde_json::to_string(&id).unwrap();
    // A bare JSON string, not an object.
    assert_eq!(json, format!("\"{id}\""));
}

#[test]
fn message_ids_are_time_ordered() {
    let a = MessageId::new();
    let b = MessageId::new();
    assert!(a.as_uuid() <= b.as_uuid());
}
