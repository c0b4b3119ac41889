use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn hbi_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("hbi");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let photos = root.join("photos");
    fs::create_dir_all(photos.join("2023")).unwrap();
    RgbImage::from_pixel(24, 24, Rgb([200, 10, 10]))
        .save(photos.join("red.png"))
        .unwrap();
    RgbImage::from_pixel(32, 16, Rgb([10, 10, 200]))
        .save(photos.join("2023").join("blue.jpg"))
        .unwrap();

    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("notes.md"), "# Notes\n\nGroceries and errands.").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/hbi.sqlite"

[scan]
image_roots = ["{root}/photos"]
document_roots = ["{root}/docs"]

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("hbi.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_hbi(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = hbi_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run hbi binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_hbi(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/hbi.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_hbi(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_hbi(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_scan_images_then_rescan_is_noop() {
    let (_tmp, config_path) = setup_test_env();
    run_hbi(&config_path, &["init"]);

    let (stdout, stderr, success) = run_hbi(&config_path, &["scan", "images"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 indexed"), "got: {}", stdout);

    let (stdout, _, success) = run_hbi(&config_path, &["scan", "images"]);
    assert!(success);
    assert!(
        stdout.contains("0 indexed, 2 unchanged"),
        "Expected nothing reprocessed on rescan, got: {}",
        stdout
    );
}

#[test]
fn test_scan_detects_modified_file() {
    let (tmp, config_path) = setup_test_env();
    run_hbi(&config_path, &["init"]);
    run_hbi(&config_path, &["scan", "images"]);

    RgbImage::from_pixel(24, 24, Rgb([10, 200, 10]))
        .save(tmp.path().join("photos/red.png"))
        .unwrap();

    let (stdout, _, success) = run_hbi(&config_path, &["scan", "images"]);
    assert!(success);
    assert!(stdout.contains("1 indexed, 1 unchanged"), "got: {}", stdout);
}

#[test]
fn test_scan_reports_corrupt_file_and_continues() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join("photos/broken.jpg"), b"\x00\x01garbage").unwrap();
    run_hbi(&config_path, &["init"]);

    let (stdout, _, success) = run_hbi(&config_path, &["scan", "images"]);
    assert!(success, "per-file failures must not fail the command");
    assert!(stdout.contains("2 indexed"), "got: {}", stdout);
    assert!(stdout.contains("1 failed"));
    assert!(stdout.contains("broken.jpg"));
}

#[test]
fn test_scan_missing_root_fails() {
    let (tmp, config_path) = setup_test_env();
    run_hbi(&config_path, &["init"]);

    let missing = tmp.path().join("nowhere");
    let (_, stderr, success) =
        run_hbi(&config_path, &["scan", "images", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("not found"), "got: {}", stderr);
}

#[test]
fn test_scan_documents_without_embedder_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_hbi(&config_path, &["init"]);

    let (_, stderr, success) = run_hbi(&config_path, &["scan", "documents"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_person_management() {
    let (_tmp, config_path) = setup_test_env();
    run_hbi(&config_path, &["init"]);

    let (stdout, _, success) = run_hbi(&config_path, &["person", "add", "Alice"]);
    assert!(success);
    assert!(stdout.contains("Added person Alice"));

    let (_, stderr, success) = run_hbi(&config_path, &["person", "add", "Alice"]);
    assert!(!success);
    assert!(stderr.contains("already exists"));

    let (stdout, _, _) = run_hbi(&config_path, &["person", "list"]);
    assert!(stdout.contains("Alice"));

    // Known person, no linked faces: empty result, not an error.
    let (stdout, _, success) = run_hbi(&config_path, &["search", "person", "Alice"]);
    assert!(success);
    assert!(stdout.contains("No photos of Alice"));

    let (_, stderr, success) = run_hbi(&config_path, &["search", "person", "Bob"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_prune_and_stats() {
    let (tmp, config_path) = setup_test_env();
    run_hbi(&config_path, &["init"]);
    run_hbi(&config_path, &["scan", "images"]);

    fs::remove_file(tmp.path().join("photos/red.png")).unwrap();
    let (stdout, _, success) = run_hbi(&config_path, &["prune", "images"]);
    assert!(success);
    assert!(stdout.contains("1 removed"), "got: {}", stdout);

    let (stdout, _, success) = run_hbi(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Images:      1"), "got: {}", stdout);
    assert!(stdout.contains("Documents:   0"));
}

#[test]
fn test_semantic_search_without_embedder_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_hbi(&config_path, &["init"]);

    let (_, stderr, success) = run_hbi(&config_path, &["search", "documents", "groceries"]);
    assert!(!success);
    assert!(stderr.contains("unavailable"), "got: {}", stderr);
}
