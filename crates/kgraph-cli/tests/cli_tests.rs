//! CLI integration tests for kgraph
//!
//! Every test points KGRAPH_CONFIG_DIR at a fresh temp dir so the config
//! file and the graph store never touch the real user directories.

use assert_cmd::Command;
use kgraph_core::domain::graph::{GraphRepository, Node, NodeProperties};
use kgraph_core::infrastructure::graph::SqliteGraphRepository;
use kgraph_core::storage::Database;
use predicates::prelude::*;
use tempfile::TempDir;

#[allow(deprecated)]
fn kgraph_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kgraph").unwrap();
    cmd.env("KGRAPH_CONFIG_DIR", config_dir.path());
    cmd.env_remove("KGRAPH_API_KEY");
    cmd.env_remove("OPENROUTER_API_KEY");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    kgraph_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("orphans"));
}

#[test]
fn test_config_path_uses_config_dir() {
    let dir = TempDir::new().unwrap();
    kgraph_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            dir.path().to_string_lossy().to_string(),
        ));
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();
    kgraph_cmd(&dir)
        .args(["config", "set", "vector_index.top_k", "9"])
        .assert()
        .success();

    kgraph_cmd(&dir)
        .args(["config", "get", "vector_index.top_k"])
        .assert()
        .success()
        .stdout(predicate::str::contains("9"));
}

#[test]
fn test_stats_on_empty_store() {
    let dir = TempDir::new().unwrap();
    kgraph_cmd(&dir)
        .args(["--format", "json", "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_nodes\": 0"));
}

#[test]
fn test_unknown_node_fails() {
    let dir = TempDir::new().unwrap();
    kgraph_cmd(&dir)
        .args(["node", "does-not-exist"])
        .assert()
        .failure();
}

#[test]
fn test_ingest_without_api_key_fails() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("doc.txt");
    std::fs::write(&input, "Copper prices rose.").unwrap();

    kgraph_cmd(&dir)
        .args(["ingest"])
        .arg(&input)
        .args(["--source", "test", "--topic", "copper"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
}

/// Point the store at a file in `dir` and put one content node in it
async fn seed_content_node(dir: &TempDir, url: &str) -> String {
    let db_path = dir.path().join("graph.db");
    kgraph_cmd(dir)
        .args(["config", "set", "storage.path"])
        .arg(&db_path)
        .assert()
        .success();

    let db = Database::open(&db_path).await.unwrap();
    let repo = SqliteGraphRepository::new(db.pool().clone());
    let node = Node::content(
        "Copper prices rose.",
        NodeProperties {
            original_url: Some(url.to_string()),
            ..Default::default()
        },
    );
    repo.insert_node(&node).await.unwrap();
    db.close().await;
    node.id
}

#[tokio::test]
async fn test_ingest_skips_known_url() {
    let dir = TempDir::new().unwrap();
    let existing = seed_content_node(&dir, "https://example.com/copper").await;
    let input = dir.path().join("doc.txt");
    std::fs::write(&input, "Copper prices rose again.").unwrap();

    kgraph_cmd(&dir)
        .args(["--format", "json", "ingest"])
        .arg(&input)
        .args(["--source", "test", "--topic", "copper"])
        .args(["--url", "https://example.com/copper"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"matched_on\": \"url\""))
        .stdout(predicate::str::contains(existing));
}

#[tokio::test]
async fn test_force_bypasses_duplicate_check() {
    let dir = TempDir::new().unwrap();
    seed_content_node(&dir, "https://example.com/copper").await;
    let input = dir.path().join("doc.txt");
    std::fs::write(&input, "Copper prices rose again.").unwrap();

    kgraph_cmd(&dir)
        .args(["ingest"])
        .arg(&input)
        .args(["--source", "test", "--topic", "copper"])
        .args(["--url", "https://example.com/copper", "--force"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key"));
}
