//! Property tests for registration payloads and topic layout

use clb_connectors::registration::{connection_payload, registration_payload};
use clb_connectors::TopicScheme;
use clb_core::entity::{EntityKind, StatusBoard, StatusEntry};
use clb_core::{DeviceInfo, Status};
use proptest::prelude::*;
use serde_json::Value;

/// Names accepted by the topic-safe validator.
fn topic_safe() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,30}"
}

fn device(name: String, mac_address: [u8; 6], reset_code: i32) -> DeviceInfo {
    DeviceInfo { name, mac_address, reset_code, ..DeviceInfo::default() }
}

fn board(clock_ok: bool) -> StatusBoard {
    let clock = if clock_ok { Status::Ok } else { Status::NotConnected };
    StatusBoard::new(vec![
        StatusEntry { name: "mqtt", kind: EntityKind::Process, status: Status::Ok, has_commands: true },
        StatusEntry { name: "clock", kind: EntityKind::Sensor, status: clock, has_commands: false },
    ])
}

proptest! {
    #[test]
    fn registration_survives_the_wire(
        name in topic_safe(),
        friendly in topic_safe(),
        mac in any::<[u8; 6]>(),
        clock_ok in any::<bool>(),
    ) {
        let device = device(name.clone(), mac, 0);
        let text = registration_payload(&device, &friendly, &board(clock_ok)).to_string();
        let parsed: Value = serde_json::from_str(&text).unwrap();

        prop_assert_eq!(parsed["name"].as_str(), Some(name.as_str()));
        prop_assert_eq!(parsed["friendlyName"].as_str(), Some(friendly.as_str()));
        prop_assert_eq!(parsed["processes"].clone(), serde_json::json!(["mqtt"]));
        let sensors = parsed["sensors"].as_array().map(Vec::len);
        prop_assert_eq!(sensors, Some(usize::from(clock_ok)));

        let mac_text = parsed["macAddress"].as_str().unwrap_or_default();
        let bytes: Vec<u8> = mac_text
            .split(':')
            .filter_map(|part| u8::from_str_radix(part, 16).ok())
            .collect();
        prop_assert_eq!(bytes, mac.to_vec());
    }

    #[test]
    fn connection_carries_reset_code(name in topic_safe(), code in any::<i32>()) {
        let parsed: Value = serde_json::from_str(&connection_payload(&device(name, [0; 6], code)).to_string()).unwrap();
        prop_assert_eq!(parsed["resetcode"].as_i64(), Some(i64::from(code)));
    }

    #[test]
    fn inbound_topic_splits_into_three_levels(prefix in topic_safe(), name in topic_safe()) {
        let topics = TopicScheme::new(&prefix, &name);
        let inbound = topics.inbound_topic();
        let levels: Vec<&str> = inbound.split('/').collect();
        prop_assert_eq!(levels, vec![prefix.as_str(), name.as_str(), "command"]);
        prop_assert_eq!(topics.device_topic("registered"), format!("{}/{}/registered", prefix, name));
    }
}
