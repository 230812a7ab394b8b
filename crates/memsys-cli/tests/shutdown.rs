//! Integration tests for `memsys serve`/`memsys http` startup behavior.
//!
//! Full handshake/shutdown coverage would require a live Qdrant instance to
//! get past wiring — not available in this environment. What's left is the
//! deterministic, infra-free part: both commands must fail fast and cleanly
//! when the vector store is unreachable, and must never leave a pidfile
//! behind from a run that never got past wiring.

use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn memsys_binary() -> std::path::PathBuf {
    assert_cmd::cargo::cargo_bin!("memsys").into()
}

const UNREACHABLE_CONFIG: &str = r#"
[store]
path = "memsys.db"

[vector]
url = "http://127.0.0.1:1"

[models]
embed = "text-embed-a"
heavy = "chat-heavy"
providers = [
    { name = "local", base_url = "http://127.0.0.1:9000", supported_models = ["text-embed-a", "chat-heavy"] },
]
"#;

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let config_path = dir.path().join("memsys.toml");
    std::fs::write(&config_path, UNREACHABLE_CONFIG).unwrap();
    config_path
}

#[test]
fn serve_fails_fast_when_vector_store_unreachable() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir);

    let start = Instant::now();
    let output = Command::new(memsys_binary())
        .args(["--config"])
        .arg(&config_path)
        .arg("serve")
        .env("MEMSYS_DATA_DIR", dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to run memsys serve");
    let elapsed = start.elapsed();

    assert!(
        !output.status.success(),
        "serve should fail when the vector store can't be reached"
    );
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
    assert!(!dir.path().join("memsys-serve.pid").exists());
}

#[test]
fn http_fails_fast_when_vector_store_unreachable() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir);

    let start = Instant::now();
    let output = Command::new(memsys_binary())
        .args(["--config"])
        .arg(&config_path)
        .arg("http")
        .env("MEMSYS_DATA_DIR", dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("failed to run memsys http");
    let elapsed = start.elapsed();

    assert!(
        !output.status.success(),
        "http should fail when the vector store can't be reached"
    );
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
    assert!(!dir.path().join("memsys-serve.pid").exists());
}

#[test]
fn sweep_fails_fast_when_vector_store_unreachable() {
    let dir = TempDir::new().unwrap();
    let config_path = write_config(&dir);

    let output = Command::new(memsys_binary())
        .args(["--config"])
        .arg(&config_path)
        .arg("sweep")
        .env("MEMSYS_DATA_DIR", dir.path())
        .output()
        .expect("failed to run memsys sweep");

    assert!(
        !output.status.success(),
        "sweep should fail when the vector store can't be reached, not hang or silently no-op"
    );
}
