use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ixr_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ixr");
    path
}

const SNAPSHOT: &str = r#"{
  "makes": [
    { "id": 6, "name": "Ford" },
    { "id": 7, "name": "BMW" }
  ],
  "models": [
    { "id": 60, "name": "Taurus", "make_id": 6 },
    { "id": 61, "name": "Ranger", "make_id": 6 },
    { "id": 70, "name": "325i", "make_id": 7 },
    { "id": 71, "name": "740i", "make_id": 7 }
  ],
  "part_types": [
    { "id": 1, "name": "Engine" },
    { "id": 2, "name": "Engine Control Module" }
  ],
  "inventory": [
    { "id": 1, "make_id": 6, "model_id": 60, "part_type_id": 1,
      "make_text": "Ford", "model_text": "Taurus", "part_text": "Engine",
      "year_start": 2010, "year_end": 2015,
      "interchange_number": "20011", "options": ["V6 3.5L"] },
    { "id": 2, "make_text": "Ford", "model_text": "Ranger", "part_text": "Engine",
      "year_start": 1995, "year_end": 1996,
      "interchange_number": "30022", "options": [] }
  ],
  "catalog": [
    { "legacy_ref_key": "R325", "part_code": "100", "manufacturer_code": "00456",
      "year_start": 1988, "year_end": 1991 }
  ],
  "model_cross_references": [
    { "ref_id": "R325", "legacy_make_name": "BMW", "legacy_model_name": "325I" }
  ],
  "part_code_references": [
    { "part_code": "100", "canonical_part_name_hint": "Engine Assembly" }
  ]
}"#;

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/ixr.sqlite"

[server]
bind = "127.0.0.1:7341"
"#,
        root.display()
    );
    let config_path = config_dir.join("ixr.toml");
    fs::write(&config_path, config_content).unwrap();

    let snapshot_path = root.join("snapshot.json");
    fs::write(&snapshot_path, SNAPSHOT).unwrap();

    (tmp, config_path, snapshot_path)
}

fn run_ixr(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ixr_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ixr binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn loaded_env() -> (TempDir, PathBuf) {
    let (tmp, config_path, snapshot_path) = setup_test_env();
    let (_, stderr, success) = run_ixr(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let (_, stderr, success) = run_ixr(&config_path, &["load", snapshot_path.to_str().unwrap()]);
    assert!(success, "load failed: {}", stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path, _) = setup_test_env();

    let (stdout, stderr, success) = run_ixr(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, _) = setup_test_env();

    let (_, _, success1) = run_ixr(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ixr(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_load_reports_counts_and_skips_unchanged() {
    let (_tmp, config_path, snapshot_path) = setup_test_env();
    run_ixr(&config_path, &["init"]);

    let snapshot = snapshot_path.to_str().unwrap();
    let (stdout, stderr, success) = run_ixr(&config_path, &["load", snapshot]);
    assert!(success, "load failed: {}", stderr);
    assert!(stdout.contains("makes: 2"));
    assert!(stdout.contains("inventory records: 2"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_ixr(&config_path, &["load", snapshot]);
    assert!(success);
    assert!(stdout.contains("(unchanged)"));

    let (stdout, _, success) = run_ixr(&config_path, &["load", snapshot, "--force"]);
    assert!(success);
    assert!(!stdout.contains("(unchanged)"));
}

#[test]
fn test_load_rejects_invalid_snapshot() {
    let (tmp, config_path, _) = setup_test_env();
    run_ixr(&config_path, &["init"]);

    let bad = tmp.path().join("bad.json");
    fs::write(
        &bad,
        r#"{ "makes": [], "models": [{ "id": 1, "name": "Orphan", "make_id": 99 }] }"#,
    )
    .unwrap();
    let (_, stderr, success) = run_ixr(&config_path, &["load", bad.to_str().unwrap()]);
    assert!(!success);
    assert!(!stderr.is_empty());
}

#[test]
fn test_resolve_inventory_and_catalog() {
    let (_tmp, config_path) = loaded_env();

    let (stdout, stderr, success) = run_ixr(&config_path, &["resolve", "2013", "6", "60", "1"]);
    assert!(success, "resolve failed: {}", stderr);
    assert!(stdout.contains("20011"));
    assert!(stdout.contains("[inventory]"));
    assert!(stdout.contains("V6 3.5L"));

    let (stdout, _, success) =
        run_ixr(&config_path, &["resolve", "1990", "7", "70", "1", "--json"]);
    assert!(success);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["results"][0]["source"], "catalog");
    assert_eq!(body["results"][0]["interchange_number"], "100-00456");
    assert_eq!(body["results"][0]["options"].as_array().unwrap().len(), 0);
}

#[test]
fn test_malformed_arguments_print_no_data() {
    let (_tmp, config_path) = loaded_env();

    let (stdout, _, success) = run_ixr(&config_path, &["resolve", "20x3", "6", "60", "1"]);
    assert!(success);
    assert!(stdout.contains("no data"));

    let (stdout, _, success) = run_ixr(&config_path, &["years", "6", "abc", "--json"]);
    assert!(success);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["status"], "no_data");
}

#[test]
fn test_picker_cascade() {
    let (_tmp, config_path) = loaded_env();

    let (stdout, _, success) = run_ixr(&config_path, &["makes"]);
    assert!(success);
    assert!(stdout.contains("BMW"));
    assert!(stdout.contains("Ford"));

    let (stdout, _, success) = run_ixr(&config_path, &["models", "7"]);
    assert!(success);
    assert!(stdout.contains("325i"));
    assert!(!stdout.contains("740i"));

    let (stdout, _, success) = run_ixr(&config_path, &["years", "6", "61"]);
    assert!(success);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["1996", "1995"]);

    let (stdout, _, success) = run_ixr(&config_path, &["parts", "6", "61", "1995"]);
    assert!(success);
    assert!(stdout.contains("Engine"));
    assert!(stdout.contains("30022"));
}

#[test]
fn test_link_fills_raw_rows() {
    let (_tmp, config_path) = loaded_env();

    let (stdout, stderr, success) = run_ixr(&config_path, &["link"]);
    assert!(success, "link failed: {}", stderr);
    assert!(stdout.contains("scanned: 1"));
    assert!(stdout.contains("updated: 1"));

    let (stdout, _, success) = run_ixr(&config_path, &["link", "--json"]);
    assert!(success);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["scanned"], 0);
}

#[test]
fn test_tree_and_audit() {
    let (_tmp, config_path) = loaded_env();

    let (stdout, _, success) = run_ixr(&config_path, &["tree", "7", "--json"]);
    assert!(success);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 2);

    let (stdout, _, success) = run_ixr(&config_path, &["audit", "--make", "7"]);
    assert!(success);
    assert!(stdout.contains("740i (71): no years"));
    assert!(stdout.contains("checked 2 models: 1 without years"));

    let (_, _, success) = run_ixr(&config_path, &["audit", "--make", "99"]);
    assert!(!success);
}
