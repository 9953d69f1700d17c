//! Config file handling as the binary uses it.

use neuro::NeuroConfig;

#[test]
fn written_config_loads_back_and_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = NeuroConfig::default();
    config.socket.url = "ws://10.0.0.5:9000/ws".into();
    config.expression.decay_ms = 2_500;
    config.expression.catalog.insert("wink".into(), "key20".into());
    config.logging.file = true;
    config.save_to_file(&path).unwrap();

    let loaded = NeuroConfig::from_file(&path).unwrap();
    loaded.validate().unwrap();
    assert_eq!(loaded.socket.url, "ws://10.0.0.5:9000/ws");
    assert_eq!(loaded.expression.decay_ms, 2_500);
    assert_eq!(
        loaded.expression.catalog.get("wink").map(String::as_str),
        Some("key20")
    );
    assert!(loaded.logging.file);
}

#[test]
fn hand_written_minimal_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[socket]
url = "wss://assistant.example/ws"

[audio]
enabled = false
"#,
    )
    .unwrap();

    let config = NeuroConfig::from_file(&path).unwrap();
    config.validate().unwrap();
    assert!(!config.audio.enabled);
    assert_eq!(config.playback.reading_base_ms, 1_000);
    assert_eq!(config.expression.catalog.len(), 13);
}
