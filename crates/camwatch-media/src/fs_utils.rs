//! Filesystem utilities.
//!
//! State and index files are read by other processes while we rewrite them,
//! so every write goes to a temporary file in the destination directory and is
//! then renamed over the target. Readers see either the old or the new file.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Atomically replace `path` with `contents`.
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created, or if writing
/// or renaming the temporary file fails. The target is untouched on error.
pub async fn write_atomic(path: impl AsRef<Path>, contents: Vec<u8>) -> MediaResult<()> {
    let path = path.as_ref().to_path_buf();

    let parent = parent_dir(&path);
    if !parent.exists() {
        fs::create_dir_all(&parent).await?;
    }

    tokio::task::spawn_blocking(move || write_atomic_blocking(&parent, &path, &contents))
        .await
        .map_err(|e| MediaError::internal(format!("atomic write task failed: {e}")))?
}

/// Atomically replace `path` with the pretty-printed JSON of `value`.
pub async fn write_json_atomic<T: Serialize + ?Sized>(
    path: impl AsRef<Path>,
    value: &T,
) -> MediaResult<()> {
    let mut contents = serde_json::to_vec_pretty(value)?;
    contents.push(b'\n');
    write_atomic(path, contents).await
}

/// Remove a file, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub async fn remove_if_exists(path: impl AsRef<Path>) -> MediaResult<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MediaError::from(e)),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_atomic_blocking(dir: &Path, path: &Path, contents: &[u8]) -> MediaResult<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| MediaError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_write_atomic_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        assert_ok!(write_atomic(&path, b"old".to_vec()).await);
        assert_ok!(write_atomic(&path, b"new content".to_vec()).await);

        assert_eq!(fs::read_to_string(&path).await.unwrap(), "new content");

        // No temp files left behind
        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        write_atomic(&path, b"{}".to_vec()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_write_json_atomic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("value.json");

        write_json_atomic(&path, &serde_json::json!({"a": 1})).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, b"x").await.unwrap();

        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!remove_if_exists(&path).await.unwrap());
    }
}
