//! Shared detection settings with validated writes and live reload.
//!
//! The current [`DetectionSettings`] snapshot lives in a `watch` channel.
//! Readers clone the snapshot (it is `Copy`), so a reader never observes a
//! half-applied update. Writers merge a [`SettingsPatch`] onto the current
//! snapshot inside the channel lock, which makes concurrent partial updates
//! last-write-wins per call without clobbering untouched fields.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use camwatch_media::write_json_atomic;
use camwatch_models::{DetectionSettings, SettingsPatch, SettingsValidationError};

/// Process-wide detection settings.
pub struct SettingsStore {
    tx: watch::Sender<DetectionSettings>,
    file: Option<PathBuf>,
    persist_lock: Mutex<()>,
    /// Last snapshot this store wrote to `file`
    written: watch::Sender<Option<DetectionSettings>>,
}

impl SettingsStore {
    pub fn new(initial: DetectionSettings, file: Option<PathBuf>) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx,
            file,
            persist_lock: Mutex::new(()),
            written: watch::Sender::new(None),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> DetectionSettings {
        *self.tx.borrow()
    }

    /// Receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<DetectionSettings> {
        self.tx.subscribe()
    }

    fn forget_own_write(&self) {
        self.written.send_replace(None);
    }

    /// Whether `patch` carries nothing beyond what this store last wrote
    /// to its file.
    fn is_own_write(&self, patch: &SettingsPatch) -> bool {
        self.written
            .borrow()
            .is_some_and(|written| written.merged(patch) == written)
    }

    /// Settings file backing this store, if any.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Validate and publish a partial update without persisting it.
    ///
    /// On success the new snapshot is visible to every reader before this
    /// returns. On failure nothing changes.
    pub fn apply(&self, patch: &SettingsPatch) -> Result<DetectionSettings, SettingsValidationError> {
        // Always overwritten: the closure runs exactly once
        let mut outcome = Err(SettingsValidationError::ThresholdNotPositive);

        self.tx.send_if_modified(|current| match current.try_apply(patch) {
            Ok(next) => {
                let changed = next != *current;
                *current = next;
                outcome = Ok(next);
                changed
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });

        outcome
    }

    /// Validate, publish and persist a partial update.
    ///
    /// Persistence failures are logged; the published snapshot stands.
    pub async fn update(&self, patch: SettingsPatch) -> Result<DetectionSettings, SettingsValidationError> {
        let next = self.apply(&patch)?;
        info!(
            threshold = next.threshold,
            roi_x = %format!("{}-{}", next.roi_x_start, next.roi_x_end),
            roi_y = %format!("{}-{}", next.roi_y_start, next.roi_y_end),
            "Detection settings updated"
        );
        self.persist().await;
        Ok(next)
    }

    /// Write the latest snapshot to the settings file.
    async fn persist(&self) {
        let Some(path) = &self.file else {
            return;
        };

        // Serialise writers so an older snapshot never lands after a newer one
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.get();

        if let Err(e) = write_json_atomic(path, &snapshot).await {
            warn!("Failed to save settings to {}: {}", path.display(), e);
        } else {
            self.written.send_replace(Some(snapshot));
            debug!("Saved settings to {}", path.display());
        }
    }

    /// Apply the settings file on top of the current snapshot (startup).
    ///
    /// A missing file is fine; unreadable or invalid contents are ignored with
    /// a warning.
    pub async fn load_file(&self) -> Option<DetectionSettings> {
        let path = self.file.as_ref()?;

        let patch = read_patch(path).await?;
        match self.apply(&patch) {
            Ok(settings) => {
                info!("Loaded detection settings from {}", path.display());
                Some(settings)
            }
            Err(e) => {
                warn!("Ignoring settings file {}: {}", path.display(), e);
                None
            }
        }
    }
}

async fn read_patch(path: &Path) -> Option<SettingsPatch> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read settings file {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&contents) {
        Ok(patch) => Some(patch),
        Err(e) => {
            warn!("Settings file {} is not valid: {}", path.display(), e);
            None
        }
    }
}

/// Polls the settings file and applies external edits.
pub struct SettingsWatcher {
    store: Arc<SettingsStore>,
    path: PathBuf,
    interval: Duration,
    last_modified: Option<SystemTime>,
}

impl SettingsWatcher {
    pub fn new(store: Arc<SettingsStore>, path: PathBuf, interval: Duration) -> Self {
        Self {
            store,
            path,
            interval,
            last_modified: None,
        }
    }

    /// Run until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        // The file as it is now was already applied at startup
        self.last_modified = modified(&self.path).await;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        debug!("Settings watcher stopped");
    }

    /// Check the file once. Returns whether new settings were applied.
    pub async fn poll_once(&mut self) -> bool {
        let Some(mtime) = modified(&self.path).await else {
            return false;
        };
        if self.last_modified == Some(mtime) {
            return false;
        }
        self.last_modified = Some(mtime);

        let Some(patch) = read_patch(&self.path).await else {
            return false;
        };

        // A file we wrote ourselves may be older than the current snapshot
        if self.store.is_own_write(&patch) {
            return false;
        }
        // Someone else owns the file now; a later revert to our value is theirs
        self.store.forget_own_write();

        let current = self.store.get();
        if current.merged(&patch) == current {
            return false;
        }

        match self.store.apply(&patch) {
            Ok(settings) => {
                info!(
                    "Settings reloaded from {}: threshold={}, roi_x={}-{}, roi_y={}-{}",
                    self.path.display(),
                    settings.threshold,
                    settings.roi_x_start,
                    settings.roi_x_end,
                    settings.roi_y_start,
                    settings.roi_y_end
                );
                true
            }
            Err(e) => {
                warn!("Rejected settings from {}: {}", self.path.display(), e);
                false
            }
        }
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_rejected_update_keeps_prior_settings() {
        let store = SettingsStore::new(DetectionSettings::default(), None);
        let before = store.get();

        let patch = SettingsPatch {
            roi_x_start: Some(80),
            roi_x_end: Some(20),
            ..Default::default()
        };
        assert_err!(store.apply(&patch));

        assert_eq!(store.get(), before);
    }

    #[test]
    fn test_apply_visible_to_subscribers_immediately() {
        let store = SettingsStore::new(DetectionSettings::default(), None);
        let mut rx = store.subscribe();

        let applied = assert_ok!(store.apply(&SettingsPatch::roi_x(33, 66)));

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), applied);
        assert_eq!(store.get().roi_x_start, 33);
        assert_eq!(store.get().roi_y_end, 100);
    }

    #[test]
    fn test_unchanged_patch_does_not_notify() {
        let store = SettingsStore::new(DetectionSettings::default(), None);
        let rx = store.subscribe();

        assert_ok!(store.apply(&SettingsPatch::threshold(5000)));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_update_persists_and_load_reads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(DetectionSettings::default(), Some(path.clone()));
        assert_ok!(store.update(SettingsPatch::threshold(8000)).await);
        assert_ok!(store.update(SettingsPatch::roi_y(10, 90)).await);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["motion_threshold"], 8000);
        assert_eq!(saved["roi_y_start"], 10);

        let restarted = SettingsStore::new(DetectionSettings::default(), Some(path));
        let loaded = restarted.load_file().await.unwrap();
        assert_eq!(loaded.threshold, 8000);
        assert_eq!(loaded.roi_y_end, 90);
    }

    #[tokio::test]
    async fn test_invalid_file_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"roi_x_start": 90, "roi_x_end": 10}"#).unwrap();

        let store = SettingsStore::new(DetectionSettings::default(), Some(path));
        assert!(store.load_file().await.is_none());
        assert_eq!(store.get(), DetectionSettings::default());
    }

    #[tokio::test]
    async fn test_watcher_applies_external_edit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = Arc::new(SettingsStore::new(DetectionSettings::default(), Some(path.clone())));
        let mut watcher = SettingsWatcher::new(store.clone(), path.clone(), Duration::from_secs(2));

        // No file yet
        assert!(!watcher.poll_once().await);

        std::fs::write(&path, r#"{"motion_threshold": 1200, "roi_x_start": 25}"#).unwrap();
        assert!(watcher.poll_once().await);
        assert_eq!(store.get().threshold, 1200);
        assert_eq!(store.get().roi_x_start, 25);

        // Same modification time: nothing to do
        assert!(!watcher.poll_once().await);
    }

    #[tokio::test]
    async fn test_watcher_ignores_own_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = Arc::new(SettingsStore::new(DetectionSettings::default(), Some(path.clone())));
        let mut watcher = SettingsWatcher::new(store.clone(), path, Duration::from_secs(2));

        assert_ok!(store.update(SettingsPatch::threshold(6500)).await);
        assert!(!watcher.poll_once().await, "file matches current snapshot");
        assert_eq!(store.get().threshold, 6500);
    }

    #[tokio::test]
    async fn test_watcher_skips_stale_own_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = Arc::new(SettingsStore::new(DetectionSettings::default(), Some(path.clone())));
        let mut watcher = SettingsWatcher::new(store.clone(), path, Duration::from_secs(2));

        // Written to disk, then superseded before the next save
        assert_ok!(store.update(SettingsPatch::threshold(6500)).await);
        assert_ok!(store.apply(&SettingsPatch::roi_x(20, 80)));

        assert!(!watcher.poll_once().await);
        assert_eq!(store.get().roi_x_start, 20);
        assert_eq!(store.get().threshold, 6500);
    }

    #[tokio::test]
    async fn test_watcher_applies_external_revert_to_saved_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");

        let store = Arc::new(SettingsStore::new(DetectionSettings::default(), Some(path.clone())));
        let mut watcher = SettingsWatcher::new(store.clone(), path.clone(), Duration::from_secs(2));

        assert_ok!(store.update(SettingsPatch::threshold(6500)).await);
        assert!(!watcher.poll_once().await);

        std::fs::write(&path, r#"{"motion_threshold": 9000}"#).unwrap();
        watcher.last_modified = None;
        assert!(watcher.poll_once().await);
        assert_eq!(store.get().threshold, 9000);

        // Hand edit back to the value we last saved
        std::fs::write(&path, r#"{"motion_threshold": 6500}"#).unwrap();
        watcher.last_modified = None;
        assert!(watcher.poll_once().await);
        assert_eq!(store.get().threshold, 6500);
    }
}
