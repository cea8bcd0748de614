use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn hrag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("hrag");
    path
}

/// Config with embeddings and generation disabled so no model is fetched.
fn write_config(root: &Path, text_dims: usize) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("jackets.txt"),
        "Item A: long down jacket, white duck down, 90% fill.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/hrag.sqlite"

[index]
name = "test_index"

[indexing]
batch_size = 10
data_path = "{root}/docs"
image_path = "{root}/images"

[embedding]
provider = "disabled"
text_dims = {text_dims}
image_dims = 4
"#,
        root = root.display(),
        text_dims = text_dims,
    );

    let config_path = config_dir.join("hrag.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), 8);
    (tmp, config_path)
}

fn run_hrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = hrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run hrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_hrag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(stdout.contains("test_index"));
    assert!(tmp.path().join("data/hrag.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_hrag(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_hrag(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_init_rejects_changed_dimensions() {
    let (tmp, config_path) = setup_test_env();

    let (_, _, success) = run_hrag(&config_path, &["init"]);
    assert!(success);

    // Same database, different text vector width.
    let config_path = write_config(tmp.path(), 16);
    let (_, stderr, success) = run_hrag(&config_path, &["init"]);
    assert!(!success, "init should fail on a dimension change");
    assert!(
        stderr.contains("text_vector"),
        "Expected the mismatched field in the error, got: {}",
        stderr
    );
}

#[test]
fn test_index_requires_embeddings() {
    let (_tmp, config_path) = setup_test_env();

    run_hrag(&config_path, &["init"]);
    let (_, stderr, success) = run_hrag(&config_path, &["index", "text"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_search_requires_embeddings() {
    let (_tmp, config_path) = setup_test_env();

    run_hrag(&config_path, &["init"]);
    let (_, stderr, success) = run_hrag(&config_path, &["search", "down jacket"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n\n[chunking]\nchunk_size = 10\noverlap = 10\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_hrag(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "got: {}", stderr);
}

#[test]
fn test_missing_config_file() {
    let tmp = TempDir::new().unwrap();
    let (_, _, success) = run_hrag(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
}

#[test]
fn test_help_lists_commands() {
    let output = Command::new(hrag_binary()).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for cmd in ["init", "index", "search", "ask", "serve"] {
        assert!(stdout.contains(cmd), "help is missing '{}'", cmd);
    }
}
