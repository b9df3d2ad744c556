//! Recording metadata index and retention.
//!
//! The index is `recordings.json` inside the recordings directory. The API can
//! delete or favourite recordings at any time, so every operation re-reads
//! the file instead of trusting an in-memory copy. Operations are serialised
//! by an async mutex and every write is atomic.

use std::path::{Path, PathBuf};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use camwatch_media::{remove_if_exists, write_json_atomic};
use camwatch_models::{is_valid_recording_name, Recording};

use crate::error::{CoreError, CoreResult};
use crate::metrics;

/// Index file name inside the recordings directory.
pub const INDEX_FILE: &str = "recordings.json";

/// Cheap view of the index for the reporting loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSummary {
    pub total: usize,
    pub latest: Option<Recording>,
}

impl IndexSummary {
    fn from_recordings(recordings: &[Recording]) -> Self {
        Self {
            total: recordings.len(),
            latest: recordings.iter().max_by_key(|r| r.start_time).cloned(),
        }
    }
}

/// Recording metadata store backed by `recordings.json`.
pub struct RecordingIndex {
    dir: PathBuf,
    path: PathBuf,
    lock: Mutex<()>,
    summary_tx: watch::Sender<IndexSummary>,
}

impl RecordingIndex {
    /// Open the index in `dir`. A missing index file means no recordings.
    pub async fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(INDEX_FILE);
        let (summary_tx, _) = watch::channel(IndexSummary::default());

        let index = Self {
            dir,
            path,
            lock: Mutex::new(()),
            summary_tx,
        };

        let recordings = index.load().await;
        index.publish(&recordings);
        index
    }

    /// Recordings directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Latest published summary.
    pub fn summary(&self) -> IndexSummary {
        self.summary_tx.borrow().clone()
    }

    pub fn subscribe_summary(&self) -> watch::Receiver<IndexSummary> {
        self.summary_tx.subscribe()
    }

    async fn load(&self) -> Vec<Recording> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(recordings) => recordings,
            Err(e) => {
                warn!("Recording index {} is corrupt, treating as empty: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    async fn save(&self, recordings: &[Recording]) -> CoreResult<()> {
        write_json_atomic(&self.path, recordings).await?;
        self.publish(recordings);
        Ok(())
    }

    fn publish(&self, recordings: &[Recording]) {
        self.summary_tx
            .send_replace(IndexSummary::from_recordings(recordings));
    }

    /// All recordings, newest first.
    pub async fn list(&self) -> Vec<Recording> {
        let _guard = self.lock.lock().await;
        let mut recordings = self.load().await;
        sort_newest_first(&mut recordings);
        recordings
    }

    pub async fn get(&self, name: &str) -> Option<Recording> {
        let _guard = self.lock.lock().await;
        self.load().await.into_iter().find(|r| r.filename == name)
    }

    pub async fn latest(&self) -> Option<Recording> {
        let _guard = self.lock.lock().await;
        self.load().await.into_iter().max_by_key(|r| r.start_time)
    }

    /// Add a finalized recording, replacing any entry with the same name.
    pub async fn insert(&self, recording: Recording) -> CoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut recordings = self.load().await;
        recordings.retain(|r| r.filename != recording.filename);
        recordings.push(recording);
        self.save(&recordings).await
    }

    /// Set (or toggle when `favorite` is None) the favourite flag.
    pub async fn set_favorite(&self, name: &str, favorite: Option<bool>) -> CoreResult<Recording> {
        validate_name(name)?;

        let _guard = self.lock.lock().await;
        let mut recordings = self.load().await;

        let entry = recordings
            .iter_mut()
            .find(|r| r.filename == name)
            .ok_or_else(|| CoreError::not_found(name))?;
        entry.favorite = favorite.unwrap_or(!entry.favorite);
        let updated = entry.clone();

        self.save(&recordings).await?;
        info!(recording = %name, favorite = updated.favorite, "Favorite updated");
        Ok(updated)
    }

    /// Delete a recording: video, screenshots, thumbnail and index entry.
    ///
    /// A video that exists on disk without an index entry is deleted too.
    pub async fn delete(&self, name: &str) -> CoreResult<()> {
        validate_name(name)?;

        let _guard = self.lock.lock().await;
        let mut recordings = self.load().await;

        let position = recordings.iter().position(|r| r.filename == name);
        let artifacts = match position {
            Some(i) => recordings.remove(i).artifact_names(),
            None => vec![name.to_string()],
        };

        let mut removed_any = false;
        for artifact in &artifacts {
            match remove_if_exists(self.dir.join(artifact)).await {
                Ok(removed) => removed_any |= removed,
                Err(e) => warn!("Failed to delete {}: {}", artifact, e),
            }
        }

        if position.is_none() && !removed_any {
            return Err(CoreError::not_found(name));
        }

        if position.is_some() {
            self.save(&recordings).await?;
        }

        info!(recording = %name, files = artifacts.len(), "Recording deleted");
        Ok(())
    }

    /// Keep the `max` most recent recordings by start time and delete the
    /// rest. `max == 0` keeps everything. Returns the evicted names.
    ///
    /// Per-file deletion failures are logged and skipped.
    pub async fn sweep(&self, max: usize) -> CoreResult<Vec<String>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let _guard = self.lock.lock().await;
        let mut recordings = self.load().await;
        if recordings.len() <= max {
            return Ok(Vec::new());
        }

        sort_newest_first(&mut recordings);
        let evicted = recordings.split_off(max);

        for recording in &evicted {
            for artifact in recording.artifact_names() {
                if let Err(e) = remove_if_exists(self.dir.join(&artifact)).await {
                    warn!("Retention: failed to delete {}: {}", artifact, e);
                }
            }
            debug!(recording = %recording.filename, "Retention evicted recording");
        }

        self.save(&recordings).await?;

        let names: Vec<String> = evicted.into_iter().map(|r| r.filename).collect();
        metrics::record_evictions(names.len());
        info!(
            "Retention removed {} old recordings (keeping {})",
            names.len(),
            max
        );
        Ok(names)
    }
}

fn sort_newest_first(recordings: &mut [Recording]) {
    recordings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
}

fn validate_name(name: &str) -> CoreResult<()> {
    if is_valid_recording_name(name) && name != INDEX_FILE {
        Ok(())
    } else {
        Err(CoreError::invalid_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::TempDir;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 27, 8, 0, 0).unwrap() + chrono::Duration::minutes(minute)
    }

    /// Completed recording with a video and one screenshot on disk.
    async fn seed(dir: &Path, index: &RecordingIndex, minute: i64) -> Recording {
        let stem = format!("motion_{:04}", minute);
        let mut rec = Recording::new(format!("{stem}.mp4"), at(minute));
        rec.end_time = Some(at(minute) + chrono::Duration::seconds(20));
        rec.screenshots = vec![format!("{stem}_000.jpg")];
        rec.thumbnail = Some(format!("{stem}_000.jpg"));

        tokio::fs::write(dir.join(&rec.filename), b"video").await.unwrap();
        tokio::fs::write(dir.join(&rec.screenshots[0]), b"jpg").await.unwrap();
        index.insert(rec.clone()).await.unwrap();
        rec
    }

    #[tokio::test]
    async fn test_sweep_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let index = RecordingIndex::open(dir.path()).await;

        // Insert out of order so eviction has to sort by start time
        for minute in (0..55).rev() {
            seed(dir.path(), &index, minute).await;
        }

        let evicted = index.sweep(50).await.unwrap();
        assert_eq!(evicted.len(), 5);

        let remaining = index.list().await;
        assert_eq!(remaining.len(), 50);
        assert_eq!(remaining[0].start_time, at(54));
        assert_eq!(remaining[49].start_time, at(5));

        for minute in 0..5 {
            assert!(!dir.path().join(format!("motion_{:04}.mp4", minute)).exists());
            assert!(!dir.path().join(format!("motion_{:04}_000.jpg", minute)).exists());
        }
        assert!(dir.path().join("motion_0005.mp4").exists());
        assert_eq!(index.summary().total, 50);
    }

    #[tokio::test]
    async fn test_sweep_unlimited_and_under_cap() {
        let dir = TempDir::new().unwrap();
        let index = RecordingIndex::open(dir.path()).await;
        for minute in 0..3 {
            seed(dir.path(), &index, minute).await;
        }

        assert!(index.sweep(0).await.unwrap().is_empty());
        assert!(index.sweep(3).await.unwrap().is_empty());
        assert_eq!(index.list().await.len(), 3);
    }

    #[tokio::test]
    async fn test_sweep_evicts_favorites_too() {
        let dir = TempDir::new().unwrap();
        let index = RecordingIndex::open(dir.path()).await;
        let oldest = seed(dir.path(), &index, 0).await;
        seed(dir.path(), &index, 1).await;

        index.set_favorite(&oldest.filename, Some(true)).await.unwrap();
        let evicted = index.sweep(1).await.unwrap();
        assert_eq!(evicted, vec![oldest.filename]);
    }

    #[tokio::test]
    async fn test_sweep_sees_external_deletes() {
        let dir = TempDir::new().unwrap();
        let index = RecordingIndex::open(dir.path()).await;
        for minute in 0..3 {
            seed(dir.path(), &index, minute).await;
        }

        // Another process edits the index behind our back
        let mut on_disk: Vec<Recording> =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap())
                .unwrap();
        on_disk.retain(|r| r.start_time != at(2));
        std::fs::write(dir.path().join(INDEX_FILE), serde_json::to_vec(&on_disk).unwrap()).unwrap();

        assert!(index.sweep(2).await.unwrap().is_empty());
        assert_eq!(index.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_favorite_toggle_and_set() {
        let dir = TempDir::new().unwrap();
        let index = RecordingIndex::open(dir.path()).await;
        let rec = seed(dir.path(), &index, 0).await;

        assert!(index.set_favorite(&rec.filename, None).await.unwrap().favorite);
        assert!(!index.set_favorite(&rec.filename, None).await.unwrap().favorite);
        assert!(index.set_favorite(&rec.filename, Some(true)).await.unwrap().favorite);
        assert!(index.get(&rec.filename).await.unwrap().favorite);

        assert!(matches!(
            index.set_favorite("motion_missing.mp4", None).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_files_and_entry() {
        let dir = TempDir::new().unwrap();
        let index = RecordingIndex::open(dir.path()).await;
        let rec = seed(dir.path(), &index, 0).await;
        seed(dir.path(), &index, 1).await;

        index.delete(&rec.filename).await.unwrap();

        assert!(!dir.path().join(&rec.filename).exists());
        assert!(!dir.path().join(&rec.screenshots[0]).exists());
        assert!(index.get(&rec.filename).await.is_none());
        assert_eq!(index.summary().total, 1);

        assert!(matches!(
            index.delete(&rec.filename).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let index = RecordingIndex::open(dir.path()).await;

        assert!(matches!(
            index.delete("../recordings.json").await,
            Err(CoreError::InvalidName(_))
        ));
        assert!(matches!(
            index.delete(INDEX_FILE).await,
            Err(CoreError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_and_summary() {
        let dir = TempDir::new().unwrap();
        let index = RecordingIndex::open(dir.path()).await;
        assert!(index.latest().await.is_none());

        seed(dir.path(), &index, 3).await;
        seed(dir.path(), &index, 7).await;
        seed(dir.path(), &index, 5).await;

        assert_eq!(index.latest().await.unwrap().start_time, at(7));
        let summary = index.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.latest.unwrap().start_time, at(7));

        // A reopened index sees the same data
        let reopened = RecordingIndex::open(dir.path()).await;
        assert_eq!(reopened.summary().total, 3);
    }

    #[tokio::test]
    async fn test_corrupt_index_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "{not json").unwrap();

        let index = RecordingIndex::open(dir.path()).await;
        assert!(index.list().await.is_empty());
    }
}
