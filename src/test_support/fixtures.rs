//! Filesystem fixtures for building and comparing artifact trees.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Writes each `(relative path, contents)` pair beneath `root`, creating
/// parent directories as needed.
///
/// # Errors
///
/// Returns the first I/O error encountered.
///
/// # Examples
/// ```
/// use artifact_cache::test_support::{read_tree, write_tree};
///
/// let temp = tempfile::tempdir()?;
/// write_tree(temp.path(), &[("a.txt", "alpha"), ("nested/b.txt", "beta")])?;
/// let tree = read_tree(temp.path())?;
/// assert_eq!(tree.get("nested/b.txt").map(String::as_str), Some("beta"));
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn write_tree(root: &Path, files: &[(&str, &str)]) -> io::Result<()> {
    for (relative, contents) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
    }
    Ok(())
}

/// Reads every regular file beneath `root` into a map keyed by its
/// `/`-separated path relative to `root`.
///
/// # Errors
///
/// Returns the first I/O error encountered, including for files that are not
/// valid UTF-8.
pub fn read_tree(root: &Path) -> io::Result<BTreeMap<String, String>> {
    let mut tree = BTreeMap::new();
    collect(root, Path::new(""), &mut tree)?;
    Ok(tree)
}

fn collect(dir: &Path, prefix: &Path, tree: &mut BTreeMap<String, String>) -> io::Result<()> {
    for dir_entry in fs::read_dir(dir)? {
        let entry = dir_entry?;
        let relative = prefix.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            collect(&entry.path(), &relative, tree)?;
        } else {
            let contents = fs::read_to_string(entry.path())?;
            let key = relative
                .components()
                .map(|component| component.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            tree.insert(key, contents);
        }
    }
    Ok(())
}
