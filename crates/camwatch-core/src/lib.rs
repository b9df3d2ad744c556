//! Motion detection and recording coordination for camwatch.
//!
//! Data flows one way:
//!
//! ```text
//! FrameSource → MotionClassifier → MotionStateMachine ─events─▶ RecordingController
//!                     (MotionSampler task)                        (actor task)
//!                                                                      │
//!                                                         RecordingIndex (recordings.json)
//!                                                                      │
//!                                            StateReporter ◀── watch snapshots
//! ```
//!
//! [`CameraRuntime`] wires the tasks together and owns shutdown ordering.

pub mod config;
pub mod error;
pub mod index;
pub mod metrics;
pub mod motion;
pub mod recorder;
pub mod reporter;
pub mod runtime;
pub mod sampler;
pub mod settings;

pub use config::{CameraConfig, ConfigSource};
pub use error::{CoreError, CoreResult};
pub use index::{IndexSummary, RecordingIndex, INDEX_FILE};
pub use motion::MotionStateMachine;
pub use recorder::{RecorderConfig, RecorderHandle, RecordingController};
pub use reporter::{DailyCounter, StateReporter};
pub use runtime::CameraRuntime;
pub use sampler::MotionSampler;
pub use settings::{SettingsStore, SettingsWatcher};
