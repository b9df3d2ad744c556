//! Detection and recording metrics.
//!
//! Recorded through the `metrics` facade; they are no-ops until a recorder
//! (the Prometheus exporter in the API binary) is installed.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    // Detection metrics
    pub const FRAMES_PROCESSED_TOTAL: &str = "camwatch_frames_processed_total";
    pub const FRAME_DECODE_FAILURES_TOTAL: &str = "camwatch_frame_decode_failures_total";
    pub const MOTION_EVENTS_TOTAL: &str = "camwatch_motion_events_total";
    pub const MOTION_AREA: &str = "camwatch_motion_area";

    // Recording metrics
    pub const RECORDINGS_STARTED_TOTAL: &str = "camwatch_recordings_started_total";
    pub const RECORDINGS_FINALIZED_TOTAL: &str = "camwatch_recordings_finalized_total";
    pub const CAPTURE_LAUNCH_FAILURES_TOTAL: &str = "camwatch_capture_launch_failures_total";
    pub const CAPTURE_UNEXPECTED_EXITS_TOTAL: &str = "camwatch_capture_unexpected_exits_total";
    pub const RECORDINGS_EVICTED_TOTAL: &str = "camwatch_recordings_evicted_total";
    pub const RECORDING_ACTIVE: &str = "camwatch_recording_active";
}

/// Record a processed frame and its motion area.
pub fn record_frame(area: u64) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(1);
    gauge!(names::MOTION_AREA).set(area as f64);
}

/// Record a failed frame grab.
pub fn record_decode_failure() {
    counter!(names::FRAME_DECODE_FAILURES_TOTAL).increment(1);
}

/// Record a motion event.
pub fn record_motion_event(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::MOTION_EVENTS_TOTAL, &labels).increment(1);
}

/// Record a capture process start.
pub fn record_recording_started() {
    counter!(names::RECORDINGS_STARTED_TOTAL).increment(1);
    gauge!(names::RECORDING_ACTIVE).set(1.0);
}

/// Record that the capture process is gone.
pub fn record_recording_stopped() {
    gauge!(names::RECORDING_ACTIVE).set(0.0);
}

/// Record a finalized recording.
pub fn record_recording_finalized() {
    counter!(names::RECORDINGS_FINALIZED_TOTAL).increment(1);
}

/// Record a capture launch failure.
pub fn record_launch_failure() {
    counter!(names::CAPTURE_LAUNCH_FAILURES_TOTAL).increment(1);
}

/// Record a capture process that exited without being asked to.
pub fn record_unexpected_exit() {
    counter!(names::CAPTURE_UNEXPECTED_EXITS_TOTAL).increment(1);
}

/// Record recordings removed by retention.
pub fn record_evictions(count: usize) {
    counter!(names::RECORDINGS_EVICTED_TOTAL).increment(count as u64);
}
