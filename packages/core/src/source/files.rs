//! File-mode secret reading.
//!
//! Walks a directory tree where every file's base name is a variable name
//! and its contents the value. This is the layout produced by mounting a
//! secret volume into a container.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Read every non-directory entry under `root` as `(base name, contents)`.
///
/// Entries come back in filesystem enumeration order. Symlinks are not
/// followed during the walk but are read through, so a link to a file
/// yields the file's contents. Nested files keep only their own base name.
///
/// # Errors
///
/// The first walk, open, or read failure aborts the traversal. A missing
/// `root` is reported as [`Error::Walk`].
pub fn read_secret_files(root: &Path) -> Result<Vec<(OsString, Vec<u8>)>> {
    let mut secrets = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|source| Error::Walk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
            source,
        })?;

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let contents = std::fs::read(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), bytes = contents.len(), "read secret file");
        secrets.push((entry.file_name().to_os_string(), contents));
    }

    Ok(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;

    #[test]
    fn test_reads_files_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("API_KEY"), "abc123").unwrap();
        fs::write(dir.path().join("DB_PASS"), "s3cr3t\n").unwrap();

        let secrets: HashMap<OsString, Vec<u8>> =
            read_secret_files(dir.path()).unwrap().into_iter().collect();

        assert_eq!(secrets.len(), 2);
        assert_eq!(secrets[&OsString::from("API_KEY")], b"abc123");
        assert_eq!(secrets[&OsString::from("DB_PASS")], b"s3cr3t\n");
    }

    #[test]
    fn test_nested_files_use_base_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("db").join("primary")).unwrap();
        fs::write(dir.path().join("db").join("primary").join("PASSWORD"), "pw").unwrap();

        let secrets = read_secret_files(dir.path()).unwrap();

        assert_eq!(secrets, vec![(OsString::from("PASSWORD"), b"pw".to_vec())]);
    }

    #[test]
    fn test_empty_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_secret_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let err = read_secret_files(&missing).unwrap_err();
        assert!(matches!(err, Error::Walk { .. }));
        assert!(err.to_string().contains("does-not-exist"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_file_is_read_through() {
        let dir = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        fs::write(target.path().join("real"), "linked-value").unwrap();
        std::os::unix::fs::symlink(target.path().join("real"), dir.path().join("LINKED")).unwrap();

        let secrets = read_secret_files(dir.path()).unwrap();

        assert_eq!(
            secrets,
            vec![(OsString::from("LINKED"), b"linked-value".to_vec())]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("GOOD"), "ok").unwrap();
        // A link to a directory is not descended into, and reading it fails.
        std::os::unix::fs::symlink(target.path(), dir.path().join("DIR_LINK")).unwrap();

        let err = read_secret_files(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ReadFile { .. }));
    }
}
