//! Property tests for settings validation and persistence

use clb_core::field::{validators, FieldValue};
use clb_core::sensors::{EnvironmentSettings, MotionSettings};
use clb_core::settings::{SettingsBlock, SettingsRecord};
use proptest::prelude::*;

/// Hundredths, so the text form stays short and exact.
fn hundredths(range: std::ops::Range<i32>) -> impl Strategy<Value = f32> {
    range.prop_map(|n| n as f32 / 100.0)
}

proptest! {
    #[test]
    fn positive_averages_are_stored(n in 1i32..100_000) {
        let mut settings = EnvironmentSettings::default();
        prop_assert!(settings.set_from_text("bme280envnoOfAverages", &n.to_string()).is_ok());
        prop_assert_eq!(settings.averages, n);
    }

    #[test]
    fn rejected_values_leave_previous_value(n in -100_000i32..=0) {
        let mut settings = EnvironmentSettings::default();
        prop_assert!(settings.set_from_text("bme280envnoOfAverages", &n.to_string()).is_err());
        prop_assert_eq!(settings.averages, 25);
    }

    #[test]
    fn pins_outside_range_are_rejected(pin in 40i32..10_000) {
        let mut settings = MotionSettings::default();
        prop_assert!(settings.set_from_text("pirsensorinputpin", &pin.to_string()).is_err());
        prop_assert_eq!(settings.pin, 4);
    }

    #[test]
    fn record_restores_every_value(
        fitted in any::<bool>(),
        averages in 1i32..1000,
        temp_delta in hundredths(0..10_000),
        temp_base in hundredths(-5_000..5_000),
    ) {
        let source = EnvironmentSettings { fitted, averages, temp_delta, temp_base, ..Default::default() };
        let bytes = SettingsRecord::capture(&source).to_bytes().unwrap();

        let mut restored = EnvironmentSettings::default();
        let record = SettingsRecord::from_bytes("bme280", &bytes).unwrap();
        prop_assert_eq!(record.apply(&mut restored), 0);
        prop_assert_eq!(restored, source);
    }

    #[test]
    fn port_validator_matches_tcp_range(port in any::<i32>()) {
        let accepted = validators::port_number(&FieldValue::Int(port));
        prop_assert_eq!(accepted, (1..=65535).contains(&port));
    }

    #[test]
    fn topic_safe_rejects_separators(prefix in "[a-z]{0,8}", bad in prop::sample::select(vec!['#', '+', '/', ' '])) {
        let text = format!("{}{}", prefix, bad);
        prop_assert!(!validators::topic_safe(&FieldValue::Text(text)));
        prop_assert!(validators::topic_safe(&FieldValue::Text(prefix)));
    }
}

#[test]
fn unknown_record_values_are_ignored() {
    let json = br#"{"schema":1,"collection":"pirSensor","values":{"pirsensorfitted":"yes","pirsensorinputpin":"99","extra":"1"}}"#;
    let record = SettingsRecord::from_bytes("pir", json).unwrap();
    let mut settings = MotionSettings::default();
    // The bad pin and the missing polarity fall back to defaults
    assert_eq!(record.apply(&mut settings), 2);
    assert!(settings.fitted);
    assert_eq!(settings.pin, 4);
}
