#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper and pixel-level motion classification.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with timeout
//! - Frame grabbing from a live stream
//! - Stream-copy capture processes with polite stop and forced kill
//! - Screenshot series and ffprobe duration probing
//! - Background subtraction, morphology and motion area scoring
//! - Atomic file writes for state and index files

pub mod capture;
pub mod command;
pub mod detection;
pub mod error;
pub mod frame_source;
pub mod fs_utils;
pub mod probe;
pub mod thumbnail;

pub use capture::{CaptureExit, CaptureLauncher, CaptureProcess, FfmpegCaptureLauncher};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detection::{
    BackgroundSubtractor, MaskFilter, MotionClassifier, PixelMorphology, RunningGaussianSubtractor,
};
pub use error::{MediaError, MediaResult};
pub use frame_source::{FfmpegFrameSource, FrameSource};
pub use fs_utils::{remove_if_exists, write_atomic, write_json_atomic};
pub use probe::probe_duration;
pub use thumbnail::{generate_thumbnail, FfmpegThumbnailer, Thumbnailer};
