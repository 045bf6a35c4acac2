//! Exercises the public artifact cache API against a real cache root.

use artifact_cache::test_support::{read_tree, write_tree};
use artifact_cache::{ArtifactCache, CacheErrorKind, CanonicalKey, LinkMode, Sha256Digest};
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use serde::Serialize;
use std::fs;
use tempfile::TempDir;

struct Workspace {
    temp: TempDir,
    cache: ArtifactCache,
}

#[fixture]
fn workspace() -> Workspace {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).expect("utf8 path");
    Workspace {
        temp,
        cache: ArtifactCache::open(root),
    }
}

#[derive(Serialize)]
struct ImageKey<'a> {
    image: &'a str,
    format: &'a str,
    size_gib: u32,
}

/// Tests the lookup-or-produce flow a build step would use.
#[rstest]
fn miss_then_produce_then_hit(workspace: Workspace) -> color_eyre::Result<()> {
    let key = r#"{"image":"core","format":"vhdx"}"#;
    assert!(workspace.cache.lookup("converted-image", key)?.is_none());

    let out = workspace.temp.path().join("out");
    write_tree(&out, &[("core.vhdx", "disk image"), ("logs/convert.log", "ok")])?;
    let produced = workspace.cache.cache("converted-image", key, &out)?;

    let hit = workspace
        .cache
        .lookup("converted-image", key)?
        .expect("entry cached");
    assert_eq!(hit.content_path(), produced.content_path());
    assert_eq!(read_tree(hit.content_path().as_std_path())?, read_tree(&out)?);
    Ok(())
}

#[rstest]
fn typed_and_raw_keys_address_the_same_entry(workspace: Workspace) -> color_eyre::Result<()> {
    let source = workspace.temp.path().join("core.vhdx");
    fs::write(&source, "disk image")?;
    let typed = ImageKey {
        image: "core",
        format: "vhdx",
        size_gib: 4,
    };

    workspace.cache.cache_value("converted-image", &typed, &source)?;
    let raw = r#"{ "size_gib": 4, "format": "vhdx", "image": "core" }"#;

    assert!(workspace.cache.lookup("converted-image", raw)?.is_some());
    assert_eq!(
        CanonicalKey::from_value("converted-image", &typed)?,
        CanonicalKey::from_json("converted-image", raw)?
    );
    Ok(())
}

#[rstest]
fn lookup_never_mutates_the_cache(workspace: Workspace) -> color_eyre::Result<()> {
    workspace.cache.lookup("build", r#"{"k":1}"#)?;
    workspace.cache.lookup_blob_by_sha256(&"0".repeat(64))?;

    assert!(!workspace.cache.root().exists());
    Ok(())
}

#[rstest]
fn entry_exposes_its_type_and_key_digest(workspace: Workspace) -> color_eyre::Result<()> {
    let source = workspace.temp.path().join("a.txt");
    fs::write(&source, "alpha")?;

    let entry = workspace.cache.cache("build", "[1,2]", &source)?;

    let expected = CanonicalKey::from_json("build", "[1,2]")?.digest();
    assert_eq!(entry.artifact_type(), "build");
    assert_eq!(entry.digest(), &expected);
    assert_eq!(
        entry.entry_dir(),
        workspace.cache.layout().entry_dir(&expected).as_path()
    );
    Ok(())
}

#[rstest]
fn blob_lookup_accepts_upper_case_digest(workspace: Workspace) -> color_eyre::Result<()> {
    let source = workspace.temp.path().join("hello.txt");
    fs::write(&source, "hello")?;
    workspace.cache.cache("download", r#"{"uri":"x"}"#, &source)?;

    let digest = Sha256Digest::of_bytes(b"hello").to_string().to_ascii_uppercase();
    let blob = workspace
        .cache
        .lookup_blob_by_sha256(&digest)?
        .expect("blob present");

    assert_eq!(fs::read_to_string(blob)?, "hello");
    Ok(())
}

#[rstest]
fn copy_mode_cache_is_readable_by_hard_link_handle(workspace: Workspace) -> color_eyre::Result<()> {
    let copying = ArtifactCache::with_link_mode(workspace.cache.root(), LinkMode::Copy);
    let source = workspace.temp.path().join("a.txt");
    fs::write(&source, "alpha")?;

    copying.cache("build", "1", &source)?;
    let entry = workspace.cache.lookup("build", "1")?.expect("entry present");

    assert_eq!(fs::read_to_string(entry.content_path().join("a.txt"))?, "alpha");
    Ok(())
}

#[rstest]
#[case::invalid_json("build", "{", CacheErrorKind::InvalidKey)]
#[case::trailing_garbage("build", "1 2", CacheErrorKind::InvalidKey)]
fn lookup_rejects_malformed_keys(
    workspace: Workspace,
    #[case] artifact_type: &str,
    #[case] key: &str,
    #[case] expected: CacheErrorKind,
) {
    let err = workspace
        .cache
        .lookup(artifact_type, key)
        .expect_err("malformed key");
    assert_eq!(err.kind(), expected);
}
