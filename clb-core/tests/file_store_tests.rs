//! Tests for the directory-backed settings store

mod common;

#[cfg(feature = "std")]
mod tests {
    use clb_core::settings::{FileStore, SettingsStore};
    use clb_core::{SettingsSetup, Status};
    use tempfile::TempDir;

    use super::common::Rig;

    fn store(dir: &TempDir) -> FileStore {
        FileStore::open(dir.path().join("settings")).unwrap()
    }

    #[test]
    fn test_records_survive_reboot() {
        let dir = TempDir::new().unwrap();

        let mut first = Rig::boot(store(&dir));
        assert_eq!(first.kernel.settings_setup(), Some(SettingsSetup::ResetToDefaults));
        assert_eq!(first.console("pirsensorfitted=yes"), "setting set OK\n");
        assert_eq!(first.console("pirsensorinputpin=12"), "setting set OK\n");
        drop(first);

        let second = Rig::boot(store(&dir));
        assert_eq!(second.kernel.settings_setup(), Some(SettingsSetup::Loaded));
        let registry = second.kernel.registry();
        let pir = registry.find_sensor("pir").unwrap();
        assert_eq!(registry.sensor_status(pir), Some(Status::Ok));
        assert_eq!(second.pin.configured_pin(), Some(12));
    }

    #[test]
    fn test_one_file_per_owner() {
        let dir = TempDir::new().unwrap();
        let rig = Rig::boot(store(&dir));
        let names = rig.kernel.stored_records().unwrap();
        assert_eq!(names, ["bme280", "console", "messages", "pir"]);
        assert!(dir.path().join("settings").join("pir.json").exists());
    }

    #[test]
    fn test_corrupt_record_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let mut files = store(&dir);
        files.save("pir", b"not json").unwrap();
        files.save("messages", br#"{"schema":1,"collection":"messages","values":{"messagesactive":"no"}}"#).unwrap();

        let mut rig = Rig::boot(files);
        assert_eq!(rig.kernel.settings_setup(), Some(SettingsSetup::ResetToDefaults));
        assert!(rig.console("pirsensorfitted").ends_with(": no\n"));
        assert!(rig.kernel.messages_suppressed());
    }

    #[test]
    fn test_wipe_removes_only_records() {
        let dir = TempDir::new().unwrap();
        let mut files = store(&dir);
        files.save("a", b"{}").unwrap();
        std::fs::write(dir.path().join("settings").join("notes.txt"), "keep").unwrap();

        files.wipe().unwrap();
        assert!(files.names().unwrap().is_empty());
        assert!(dir.path().join("settings").join("notes.txt").exists());
    }
}
