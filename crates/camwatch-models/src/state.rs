//! Sensor state written for Home Assistant.

use chrono::{DateTime, Local};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::motion::DetectionPhase;
use crate::recording::RecordingPhase;

/// Sensor state exposed through the state file and `GET /api/state`.
///
/// Timestamps are local ISO-8601 strings, which is what the Home Assistant
/// templates consuming this file expect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SensorState {
    pub motion_detected: bool,
    pub detector_state: DetectionPhase,
    pub last_motion_time: Option<DateTime<Local>>,
    pub frames_processed: u64,
    pub motion_events_today: u64,
    pub is_recording: bool,
    pub recording_state: RecordingPhase,
    pub total_recordings: usize,
    pub latest_recording: Option<String>,
    pub latest_recording_time: Option<DateTime<Local>>,
    pub latest_thumbnail: Option<String>,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file_shape() {
        let state = SensorState {
            motion_detected: true,
            detector_state: DetectionPhase::Active,
            is_recording: true,
            recording_state: RecordingPhase::Recording,
            total_recordings: 3,
            latest_recording: Some("motion_20241127_143022.mp4".into()),
            ..Default::default()
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["motion_detected"], true);
        assert_eq!(json["detector_state"], "active");
        assert_eq!(json["recording_state"], "recording");
        assert_eq!(json["total_recordings"], 3);
        assert!(json["latest_thumbnail"].is_null());
        assert!(json.get("frames_processed").is_some());
    }
}
