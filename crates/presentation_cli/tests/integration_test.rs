//! Integration tests for CLI
//!
//! These tests run the built binary for commands that need no synthesis
//! backend.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn cadence(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cadence-cli"))
        .args(args)
        .current_dir(dir)
        .env_remove("CADENCE_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn segment_prints_one_sentence_per_line() {
    let dir = TempDir::new().unwrap();
    let output = cadence(
        dir.path(),
        &["segment", "今天的天气非常好。我们一起去公园散步吧！", "--min-length", "5"],
    );

    assert!(output.status.success());
    assert_eq!(
        stdout(&output).lines().collect::<Vec<_>>(),
        vec!["今天的天气非常好。", "我们一起去公园散步吧！"]
    );
}

#[test]
fn config_prints_effective_toml() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("cadence.toml"),
        "[synthesis]\napi_url = \"http://tts.test:9880/tts\"\n",
    )
    .unwrap();

    let output = cadence(dir.path(), &["config"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("http://tts.test:9880/tts"), "{text}");
    assert!(text.contains("[disk_cache]"), "{text}");
}

#[test]
fn invalid_config_is_reported() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("bad.toml"), "[playback]\nvolume = 3.0\n").unwrap();

    let output = cadence(dir.path(), &["--config", "bad.toml", "config"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("playback"));
}

#[test]
fn cache_stats_on_empty_cache() {
    let dir = TempDir::new().unwrap();
    let output = cadence(dir.path(), &["cache", "stats"]);

    assert!(output.status.success());
    let text = stdout(&output);
    let json_start = text.find('{').unwrap();
    let stats: serde_json::Value = serde_json::from_str(&text[json_start..]).unwrap();
    assert_eq!(stats["entries"], 0);
    assert!(dir.path().join("data/tts_cache/audio").is_dir());
}

#[test]
fn unknown_command_fails() {
    let dir = TempDir::new().unwrap();
    assert!(!cadence(dir.path(), &["sing"]).status.success());
}
