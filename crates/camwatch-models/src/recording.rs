//! Recording models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A recorded (or in-flight) clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Recording {
    /// File name inside the recordings directory
    pub filename: String,

    /// When motion for this clip was first seen
    pub start_time: DateTime<Utc>,

    /// When the clip was finalized (None while recording)
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Clip duration in seconds
    #[serde(default)]
    pub duration_secs: Option<f64>,

    /// File size in bytes
    #[serde(default)]
    pub size_bytes: Option<u64>,

    /// Thumbnail file name (first screenshot)
    #[serde(default)]
    pub thumbnail: Option<String>,

    /// Screenshot file names, in clip order
    #[serde(default)]
    pub screenshots: Vec<String>,

    /// User-marked as important
    #[serde(default)]
    pub favorite: bool,
}

impl Recording {
    /// Create an open recording.
    pub fn new(filename: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            filename: filename.into(),
            start_time,
            end_time: None,
            duration_secs: None,
            size_bytes: None,
            thumbnail: None,
            screenshots: Vec::new(),
            favorite: false,
        }
    }

    /// Whether the clip has been finalized.
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    /// Every file belonging to this recording (video first).
    pub fn artifact_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.screenshots.len() + 2);
        names.push(self.filename.clone());
        for shot in &self.screenshots {
            if !names.contains(shot) {
                names.push(shot.clone());
            }
        }
        if let Some(thumb) = &self.thumbnail {
            if !names.contains(thumb) {
                names.push(thumb.clone());
            }
        }
        names
    }
}

/// Check that a recording name is a plain file name.
///
/// Only `[A-Za-z0-9_.-]` is accepted and `..` is rejected, so a name can never
/// escape the recordings directory.
pub fn is_valid_recording_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 255
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Recorder lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordingPhase {
    /// No capture process running
    #[default]
    Idle,
    /// Capture process running
    Recording,
    /// Capture process running, stop scheduled after post-roll
    Stopping,
}

impl RecordingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingPhase::Idle => "idle",
            RecordingPhase::Recording => "recording",
            RecordingPhase::Stopping => "stopping",
        }
    }

    /// Whether a capture process is believed to be running.
    pub fn is_capturing(&self) -> bool {
        !matches!(self, RecordingPhase::Idle)
    }
}

impl fmt::Display for RecordingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the recorder, safe to poll from any task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RecorderStatus {
    pub phase: RecordingPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_recording: Option<Recording>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_stop_deadline: Option<DateTime<Utc>>,
}

impl RecorderStatus {
    pub fn is_recording(&self) -> bool {
        self.phase.is_capturing()
    }
}
