use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn tctx_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tctx");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/tctx.sqlite"

[context]
default_scope = "inherit"
max_documents = 5

[search]
provider = "keyword"

[answer]
provider = "disabled"
"#,
        root.display()
    );

    let config_path = config_dir.join("tctx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_tctx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tctx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tctx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn run_ok(config_path: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_tctx(config_path, args);
    assert!(
        success,
        "tctx {:?} failed: stdout={}, stderr={}",
        args, stdout, stderr
    );
    stdout
}

fn run_json(config_path: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["--json"];
    full.extend_from_slice(args);
    let stdout = run_ok(config_path, &full);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("invalid JSON from {:?}: {}\n{}", args, e, stdout))
}

/// PROJ > API > API-AUTH, plus DB at the root.
fn seed_tasks(config_path: &Path) {
    run_ok(config_path, &["init"]);
    run_ok(config_path, &["task", "add", "Project", "--code", "PROJ"]);
    run_ok(
        config_path,
        &["task", "add", "Public API", "--code", "API", "--parent", "PROJ"],
    );
    run_ok(
        config_path,
        &[
            "task",
            "add",
            "OAuth login",
            "--code",
            "API-AUTH",
            "--parent",
            "API",
            "--description",
            "Token exchange and refresh",
        ],
    );
    run_ok(config_path, &["task", "add", "Database schema", "--code", "DB"]);
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tctx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_tctx(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_tctx(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_tctx(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_task_tree_and_paths() {
    let (_tmp, config_path) = setup_test_env();
    seed_tasks(&config_path);

    let auth = run_json(&config_path, &["task", "show", "API-AUTH"]);
    assert_eq!(auth["task"]["path"], "PROJ/API/API-AUTH");
    assert_eq!(auth["task"]["level"], 2);
    assert_eq!(auth["ancestors"].as_array().unwrap().len(), 2);

    let tree = run_ok(&config_path, &["task", "tree"]);
    let lines: Vec<&str> = tree.lines().collect();
    assert!(lines[0].starts_with("PROJ "));
    assert!(lines[1].starts_with("  API "));
    assert!(lines[2].starts_with("    API-AUTH "));
    assert!(tree.contains("DB "));

    let roots = run_json(&config_path, &["task", "list", "--roots"]);
    assert_eq!(roots.as_array().unwrap().len(), 2);
}

#[test]
fn test_generated_codes() {
    let (_tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);

    let first = run_json(&config_path, &["task", "add", "First"]);
    let second = run_json(&config_path, &["task", "add", "Second"]);
    assert_eq!(first["code"], "TASK-001");
    assert_eq!(second["code"], "TASK-002");
}

#[test]
fn test_move_and_progress_roll_up() {
    let (_tmp, config_path) = setup_test_env();
    seed_tasks(&config_path);

    let moved = run_json(&config_path, &["task", "move", "API", "--parent", "DB"]);
    assert_eq!(moved["path"], "DB/API");
    let auth = run_json(&config_path, &["task", "show", "API-AUTH"]);
    assert_eq!(auth["task"]["path"], "DB/API/API-AUTH");

    let out = run_json(&config_path, &["task", "progress", "API-AUTH", "50"]);
    assert_eq!(out["task"]["progress"], 50);
    let db = run_json(&config_path, &["task", "show", "DB"]);
    assert_eq!(db["task"]["progress"], 50);

    let (_, stderr, success) = run_tctx(&config_path, &["task", "progress", "API-AUTH", "150"]);
    assert!(!success);
    assert!(stderr.contains("progress"));

    let back = run_json(&config_path, &["task", "move", "API", "--root"]);
    assert_eq!(back["path"], "API");
}

#[test]
fn test_update_and_delete() {
    let (_tmp, config_path) = setup_test_env();
    seed_tasks(&config_path);

    let updated = run_json(
        &config_path,
        &["task", "update", "DB", "--status", "in_progress", "--owner", "ana"],
    );
    assert_eq!(updated["status"], "in_progress");
    assert_eq!(updated["owner"], "ana");

    let (_, _, success) = run_tctx(&config_path, &["task", "update", "DB", "--status", "waiting"]);
    assert!(!success);

    let (_, stderr, success) = run_tctx(&config_path, &["task", "delete", "PROJ"]);
    assert!(!success, "deleting a parent without --cascade must fail");
    assert!(!stderr.is_empty());

    let deleted = run_json(&config_path, &["task", "delete", "PROJ", "--cascade"]);
    assert_eq!(deleted["deleted"], true);
    assert_eq!(deleted["tasks_removed"], 3);

    let (_, _, success) = run_tctx(&config_path, &["task", "show", "API-AUTH"]);
    assert!(!success);
}

#[test]
fn test_dependency_cycle_is_reported() {
    let (_tmp, config_path) = setup_test_env();
    seed_tasks(&config_path);

    run_ok(&config_path, &["dep", "add", "API", "DB"]);
    run_ok(&config_path, &["dep", "add", "API-AUTH", "API"]);
    run_ok(&config_path, &["dep", "add", "API-AUTH", "API"]);

    let analysis = run_json(&config_path, &["dep", "analyze"]);
    assert_eq!(analysis["summary"]["edges"], 2);
    assert_eq!(analysis["summary"]["cycles"], 0);
    assert_eq!(analysis["summary"]["longest_chain"], 2);

    run_ok(&config_path, &["dep", "add", "DB", "API-AUTH"]);
    let text = run_ok(&config_path, &["dep", "analyze"]);
    assert!(text.contains("Cycles:         1"));
    assert!(text.contains("[WARN]"));

    let (_, _, success) = run_tctx(&config_path, &["dep", "add", "DB", "DB"]);
    assert!(!success, "self-dependency must be rejected");

    let removed = run_json(&config_path, &["dep", "remove", "DB", "API-AUTH"]);
    assert_eq!(removed["removed"], true);
}

#[test]
fn test_resources_inherit_into_context() {
    let (_tmp, config_path) = setup_test_env();
    seed_tasks(&config_path);

    let charter = run_json(
        &config_path,
        &[
            "resource",
            "add",
            "Project charter with goals",
            "--source",
            "wiki/charter",
        ],
    );
    let tokens = run_json(
        &config_path,
        &[
            "resource",
            "add",
            "Refresh token rotation guide",
            "--source",
            "https://example.com/tokens",
            "--summary",
            "Token rotation",
        ],
    );
    let charter_id = charter["id"].as_i64().unwrap().to_string();
    let tokens_id = tokens["id"].as_i64().unwrap().to_string();

    run_ok(&config_path, &["resource", "assign", &charter_id, "PROJ"]);

    let unassigned = run_json(&config_path, &["resource", "list", "--status", "unassigned"]);
    assert_eq!(unassigned.as_array().unwrap().len(), 1);

    let ctx = run_json(&config_path, &["context", "API-AUTH"]);
    assert_eq!(ctx["scope"], "inherit");
    let docs = ctx["documents"].as_array().unwrap();
    assert_eq!(docs[0]["resource_id"].as_i64().unwrap().to_string(), charter_id);
    assert_eq!(docs[0]["source"], "inherited");
    // "token" in the description pulls the guide in through keyword search.
    assert!(docs
        .iter()
        .any(|d| d["resource_id"].as_i64().unwrap().to_string() == tokens_id
            && d["source"] == "general"));

    let inherit = run_json(&config_path, &["resource", "inherit", "API-AUTH"]);
    assert_eq!(inherit["inherited_count"], 1);

    let tasks = run_json(&config_path, &["resource", "tasks", &charter_id]);
    assert_eq!(tasks["tasks"].as_array().unwrap().len(), 2);

    run_ok(&config_path, &["resource", "archive", &tokens_id]);
    let ctx = run_json(&config_path, &["context", "API-AUTH", "--scope", "self"]);
    assert!(ctx["documents"]
        .as_array()
        .unwrap()
        .iter()
        .all(|d| d["resource_id"].as_i64().unwrap().to_string() != tokens_id));

    let preview = run_json(&config_path, &["context", "API-AUTH", "--preview"]);
    let scopes: Vec<&str> = preview["suggested_scopes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["scope"].as_str().unwrap())
        .collect();
    assert_eq!(scopes, vec!["self", "inherit", "tree"]);

    let text = run_ok(&config_path, &["context", "API-AUTH"]);
    assert!(text.contains("OAuth login (API-AUTH)"));
}

#[test]
fn test_unknown_scope_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    seed_tasks(&config_path);

    let (_, stderr, success) = run_tctx(&config_path, &["context", "API", "--scope", "galaxy"]);
    assert!(!success);
    assert!(stderr.contains("scope"));
}

#[test]
fn test_ask_requires_answer_provider() {
    let (_tmp, config_path) = setup_test_env();
    seed_tasks(&config_path);

    let (_, stderr, success) = run_tctx(&config_path, &["ask", "API", "What is left?"]);
    assert!(!success);
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();
    seed_tasks(&config_path);

    let stats = run_json(&config_path, &["stats"]);
    assert_eq!(stats["assignments"]["total_tasks"], 4);
    assert_eq!(stats["max_depth"], 3);
    assert_eq!(stats["tasks_by_status"]["new"], 4);

    let text = run_ok(&config_path, &["stats"]);
    assert!(text.contains("Database Stats"));
}
