//! Shared filesystem helpers that operate within the capability sandbox.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs::Dir};
use color_eyre::eyre::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Resolves a path to an ambient directory handle paired with the relative path component.
///
/// Absolute paths are opened relative to the ambient root; relative paths reuse the current
/// working directory.
pub(crate) fn ambient_dir_and_path(path: &Utf8Path) -> Result<(Dir, Utf8PathBuf)> {
    if path.has_root() {
        let stripped = path
            .strip_prefix("/")
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf());
        let dir = Dir::open_ambient_dir("/", ambient_authority())
            .context("open ambient root directory")?;
        Ok((dir, stripped))
    } else {
        let dir = Dir::open_ambient_dir(".", ambient_authority())
            .context("open ambient working directory")?;
        Ok((dir, path.to_path_buf()))
    }
}

/// Ensures the provided path exists, creating intermediate directories when required.
pub(crate) fn ensure_dir_exists(path: &Utf8Path) -> Result<()> {
    let (dir, relative) = ambient_dir_and_path(path)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }

    dir.create_dir_all(relative.as_std_path())
        .or_else(|err| {
            if err.kind() == ErrorKind::AlreadyExists {
                Ok(())
            } else {
                Err(err)
            }
        })
        .with_context(|| format!("create {}", path.as_str()))
}

/// Removes every file and directory beneath `path` while keeping `path` itself.
///
/// Keeps going after a failure so as much as possible is removed, then reports
/// the first error. A missing `path` is treated as already empty.
pub(crate) fn remove_dir_contents(path: &Utf8Path) -> Result<()> {
    let (root, relative) = ambient_dir_and_path(path)?;
    let dir = if relative.as_str().is_empty() {
        root
    } else {
        match root.open_dir(relative.as_std_path()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err).with_context(|| format!("open {path}")),
        }
    };

    let mut first_error = None;
    for dir_entry in dir.entries().with_context(|| format!("read {path}"))? {
        let outcome = dir_entry.and_then(|entry| {
            let name = entry.file_name();
            if entry.file_type()?.is_dir() {
                dir.remove_dir_all(&name)
            } else {
                dir.remove_file(&name)
            }
        });
        if let Err(err) = outcome {
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        None => Ok(()),
        Some(err) => Err(err).with_context(|| format!("clear contents of {path}")),
    }
}

/// Sums the sizes of all non-directory entries beneath `path`.
///
/// Unreadable entries are skipped rather than reported, so the result is a
/// lower bound when the tree is partially inaccessible.
pub(crate) fn best_effort_tree_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };

    entries
        .filter_map(std::result::Result::ok)
        .map(|entry| match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => best_effort_tree_size(&entry.path()),
            Ok(_) => entry.metadata().map_or(0, |metadata| metadata.len()),
            Err(_) => 0,
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_dir_exists_creates_nested_directories() {
        let temp = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(temp.path()).expect("utf8 path");
        let nested = root.join("a/b/c");

        ensure_dir_exists(&nested).expect("create nested");
        ensure_dir_exists(&nested).expect("idempotent create");

        assert!(nested.is_dir());
    }

    #[test]
    fn remove_dir_contents_keeps_the_root() {
        let temp = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(temp.path()).expect("utf8 path");
        fs::create_dir_all(root.join("content/sub")).expect("mkdir");
        fs::write(root.join("content/sub/file"), "data").expect("write");
        fs::write(root.join("metadata.json"), "{}").expect("write");

        remove_dir_contents(root).expect("clear");

        assert!(root.is_dir());
        assert_eq!(fs::read_dir(root).expect("read_dir").count(), 0);
    }

    #[test]
    fn remove_dir_contents_tolerates_missing_directory() {
        let temp = tempdir().expect("tempdir");
        let root = Utf8Path::from_path(temp.path()).expect("utf8 path");

        remove_dir_contents(&root.join("absent")).expect("missing dir is empty");
    }

    #[test]
    fn best_effort_tree_size_sums_nested_files() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("nested")).expect("mkdir");
        fs::write(temp.path().join("a"), "12345").expect("write");
        fs::write(temp.path().join("nested/b"), "678").expect("write");

        assert_eq!(best_effort_tree_size(temp.path()), 8);
    }

    #[test]
    fn best_effort_tree_size_of_missing_path_is_zero() {
        let temp = tempdir().expect("tempdir");
        assert_eq!(best_effort_tree_size(&temp.path().join("absent")), 0);
    }
}
