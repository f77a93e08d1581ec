//! Workspace directory preparation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

/// Recursively delete everything inside `dir`, keeping `dir` itself.
///
/// A missing directory is not an error. Symlinks are removed, never followed.
/// Read-only entries are made writable and retried once.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn clean_directory(dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("local directory absent, nothing to clean");
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("read {}", dir.display())),
    };

    let mut removed = 0usize;
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        remove_entry(&path).with_context(|| format!("remove {}", path.display()))?;
        removed += 1;
    }
    debug!(removed, "cleaned local directory");
    Ok(())
}

/// Create `dir` (and parents) and return its canonical absolute path.
pub fn prepare_local_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    fs::canonicalize(dir).with_context(|| format!("canonicalize {}", dir.display()))
}

fn remove_entry(path: &Path) -> io::Result<()> {
    match remove_once(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            make_writable(path)?;
            remove_once(path)
        }
        other => other,
    }
}

fn remove_once(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Clear the read-only flag on `path` and, for directories, everything below it.
fn make_writable(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)?;
    if meta.is_dir() {
        for entry in fs::read_dir(path)? {
            make_writable(&entry?.path())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        clean_directory(&temp.path().join("absent")).expect("clean");
    }

    #[test]
    fn removes_nested_contents_but_keeps_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("trunk");
        fs::create_dir_all(dir.join(".svn/pristine")).expect("mkdir");
        fs::write(dir.join(".svn/pristine/blob"), "x").expect("write");
        fs::write(dir.join("stale.txt"), "old").expect("write");

        clean_directory(&dir).expect("clean");

        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).expect("read").count(), 0);
    }

    #[test]
    fn removes_read_only_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("wc");
        fs::create_dir_all(dir.join("sub")).expect("mkdir");
        let file = dir.join("sub/locked.txt");
        fs::write(&file, "x").expect("write");
        let mut perms = fs::metadata(&file).expect("meta").permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).expect("chmod");

        clean_directory(&dir).expect("clean");
        assert!(!dir.join("sub").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_removed_without_following() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).expect("mkdir");
        fs::write(outside.join("keep.txt"), "keep").expect("write");
        let dir = temp.path().join("wc");
        fs::create_dir_all(&dir).expect("mkdir");
        std::os::unix::fs::symlink(&outside, dir.join("link")).expect("symlink");

        clean_directory(&dir).expect("clean");

        assert!(!dir.join("link").exists());
        assert!(outside.join("keep.txt").is_file());
    }

    #[test]
    fn prepare_local_dir_creates_and_canonicalizes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("a/./b");
        let canonical = prepare_local_dir(&dir).expect("prepare");
        assert!(canonical.is_absolute());
        assert!(canonical.is_dir());
        assert!(canonical.ends_with("a/b"));
    }
}
