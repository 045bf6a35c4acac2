//! Runs the `cachectl` binary against a populated cache.

use artifact_cache::ArtifactCache;
use camino::Utf8PathBuf;
use std::fs;
use std::process::Command;

fn cachectl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cachectl"))
}

#[test]
fn stats_reports_entry_count_and_size() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).expect("utf8 path");
    let cache = ArtifactCache::open(root.clone());
    let source = temp.path().join("blob.bin");
    fs::write(&source, vec![0_u8; 1_048_576]).expect("write source");
    cache.cache("build", "1", &source).expect("cache 1");
    cache.cache("build", "2", &source).expect("cache 2");

    let output = cachectl()
        .args(["--cache", root.as_str(), "stats"])
        .output()
        .expect("run cachectl");

    assert!(output.status.success(), "cachectl failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cached artifacts: 2"), "stdout: {stdout}");
    assert!(stdout.contains("Cache size: 2.00 MiB"), "stdout: {stdout}");
}

#[test]
fn stats_reads_cache_dir_from_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("env-cache");

    let output = cachectl()
        .arg("stats")
        .env("ARTIFACT_CACHE_DIR", &root)
        .output()
        .expect("run cachectl");

    assert!(output.status.success(), "cachectl failed: {output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cached artifacts: 0"), "stdout: {stdout}");
    assert!(!root.exists(), "stats must not create the cache root");
}

#[test]
fn unknown_subcommand_fails() {
    let output = cachectl().arg("prune").output().expect("run cachectl");
    assert!(!output.status.success());
}
