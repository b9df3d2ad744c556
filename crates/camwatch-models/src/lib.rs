//! Shared data models for the camwatch motion recorder.
//!
//! This crate provides Serde-serializable types for:
//! - Motion events and detector state
//! - Detection settings and their validation rules
//! - Recordings and the recorder lifecycle
//! - The sensor state file consumed by Home Assistant

pub mod motion;
pub mod recording;
pub mod settings;
pub mod state;

// Re-export common types
pub use motion::{DetectionPhase, DetectionStats, MotionEvent, MotionEventKind};
pub use recording::{is_valid_recording_name, Recording, RecorderStatus, RecordingPhase};
pub use settings::{DetectionSettings, Roi, SettingsPatch, SettingsValidationError};
pub use state::SensorState;
