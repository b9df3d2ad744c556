//! Motion events and detector state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of motion event emitted by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MotionEventKind {
    /// Motion persisted long enough to be confirmed
    Start,
    /// Motion continues on a confirmed episode
    Frame,
    /// The confirmed episode ended
    End,
}

impl MotionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MotionEventKind::Start => "start",
            MotionEventKind::Frame => "frame",
            MotionEventKind::End => "end",
        }
    }
}

impl fmt::Display for MotionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single motion event. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MotionEvent {
    pub kind: MotionEventKind,
    /// For `Start` this is when the episode's first qualifying sample was seen
    pub timestamp: DateTime<Utc>,
    /// Motion area score of the sample that produced the event
    pub motion_area: u64,
    /// Frames processed by the detector when the event was produced
    pub frame_count: u64,
}

impl MotionEvent {
    pub fn new(
        kind: MotionEventKind,
        timestamp: DateTime<Utc>,
        motion_area: u64,
        frame_count: u64,
    ) -> Self {
        Self {
            kind,
            timestamp,
            motion_area,
            frame_count,
        }
    }
}

/// Detector phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPhase {
    /// No motion above threshold
    #[default]
    Idle,
    /// Motion seen, waiting for it to persist for the minimum duration
    Pending,
    /// Motion confirmed
    Active,
}

impl DetectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionPhase::Idle => "idle",
            DetectionPhase::Pending => "pending",
            DetectionPhase::Active => "active",
        }
    }
}

impl fmt::Display for DetectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time snapshot of the detector, published once per tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionStats {
    pub phase: DetectionPhase,
    pub frames_processed: u64,
    /// Number of confirmed motion episodes since startup
    pub motion_events: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_started_at: Option<DateTime<Utc>>,
    pub consecutive_above_threshold_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_motion_at: Option<DateTime<Utc>>,
    pub last_area: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_at: Option<DateTime<Utc>>,
    /// Consecutive frame grab failures
    pub decode_failures: u64,
}

impl DetectionStats {
    /// Whether a confirmed motion episode is in progress.
    pub fn is_motion_active(&self) -> bool {
        self.phase == DetectionPhase::Active
    }
}
