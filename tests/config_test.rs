//! Configuration and persistence tests.

use tempfile::TempDir;
use trueno_track::{BackendConfig, LogValue, TrackerConfig};

#[test]
fn test_sqlite_config_persists_across_opens() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("track.db");
    let config = TrackerConfig::default().sqlite(&path).artifact_root("file:///tmp/track");

    let run_id = {
        let store = config.open().unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        let exp = store.create_experiment("persist", None).unwrap();
        assert_eq!(exp.artifact_uri(), Some("file:///tmp/track/persist"));
        let run = store.start_run(exp.id(), Some("r")).unwrap();
        store.log_param(run.id(), "lr", 0.1, None).unwrap();
        run.id()
    };

    let store = config.open().unwrap();
    assert_eq!(store.get_run(run_id).unwrap().name(), "r");
    assert_eq!(store.get_param(run_id, "lr", None, None).unwrap(), LogValue::from(0.1));
}

#[test]
fn test_json_roundtrip() {
    let config = TrackerConfig::default()
        .sqlite("/var/lib/track.db")
        .log_filter("trueno_track=debug");
    let text = serde_json::to_string(&config).unwrap();
    assert_eq!(TrackerConfig::from_json_str(&text).unwrap(), config);
}

#[test]
fn test_memory_default() {
    let config = TrackerConfig::default();
    assert_eq!(config.backend, BackendConfig::Memory);
    assert_eq!(config.open().unwrap().backend_name(), "memory");
}
