//! Camera configuration.
//!
//! Values are layered: built-in defaults, then the add-on options file
//! (`CAMWATCH_OPTIONS_FILE`, default `/data/options.json`), then environment
//! variables named after the upper-cased key (`STREAM_URL`, `HTTP_PORT`, ...).

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use camwatch_models::DetectionSettings;

use crate::error::{CoreError, CoreResult};

/// Options file written by the Home Assistant supervisor.
pub const DEFAULT_OPTIONS_FILE: &str = "/data/options.json";

/// Longest accepted duration setting (one week).
const MAX_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Layered key/value configuration source.
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    options: Map<String, Value>,
    use_env: bool,
}

impl ConfigSource {
    /// Options file (if present) plus the process environment.
    pub fn load() -> Self {
        let path = std::env::var("CAMWATCH_OPTIONS_FILE")
            .unwrap_or_else(|_| DEFAULT_OPTIONS_FILE.to_string());

        Self {
            options: read_options(Path::new(&path)),
            use_env: true,
        }
    }

    /// Only the given options, ignoring the environment.
    pub fn from_options(options: Map<String, Value>) -> Self {
        Self {
            options,
            use_env: false,
        }
    }

    /// Raw string value for `key`. The environment wins over the options file.
    pub fn string(&self, key: &str) -> Option<String> {
        if self.use_env {
            if let Ok(v) = std::env::var(key.to_uppercase()) {
                return Some(v);
            }
        }

        match self.options.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => i.to_string(),
                (None, Some(f)) if f.fract() == 0.0 => (f as i64).to_string(),
                _ => n.to_string(),
            }),
            other => Some(other.to_string()),
        }
    }

    /// Parsed value for `key`; unparsable values count as missing.
    pub fn get<T: FromStr>(&self, key: &str) -> Option<T> {
        self.string(key).and_then(|s| s.trim().parse().ok())
    }

    fn secs(&self, key: &str, default: f64) -> Duration {
        let parsed = self
            .get::<f64>(key)
            .filter(|secs| *secs <= MAX_SECS)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
        match parsed {
            Some(duration) => duration,
            None => Duration::try_from_secs_f64(default).unwrap_or_default(),
        }
    }
}

fn read_options(path: &Path) -> Map<String, Value> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Map::new(),
    };

    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("Options file {} is not a JSON object, ignoring", path.display());
            Map::new()
        }
        Err(e) => {
            warn!("Options file {} is not valid JSON: {}", path.display(), e);
            Map::new()
        }
    }
}

/// Camera and recording configuration.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Live stream URL (HLS or anything ffmpeg reads)
    pub stream_url: String,
    /// Initial detection settings (overridden by the settings file)
    pub detection: DetectionSettings,
    /// How long motion must persist before it counts
    pub min_duration: Duration,
    /// Sampling interval
    pub check_interval: Duration,
    /// Seconds of video wanted before motion (approximated by start latency)
    pub pre_roll: Duration,
    /// Seconds of video kept after motion ends
    pub post_roll: Duration,
    /// Retention cap, 0 = unlimited
    pub max_recordings: usize,
    /// Maximum clip length enforced by the capture process
    pub max_duration: Duration,
    pub recordings_path: PathBuf,
    pub state_file: PathBuf,
    /// Settings file; None disables persistence and hot reload
    pub settings_file: Option<PathBuf>,
    pub settings_reload_interval: Duration,
    pub state_update_interval: Duration,
    pub screenshot_interval: Duration,
    /// Timeout for one frame grab
    pub frame_timeout: Duration,
    /// Time a capture process gets to stop before it is killed
    pub capture_stop_grace: Duration,
    /// Bound on each shutdown step
    pub shutdown_timeout: Duration,
    pub log_level: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            stream_url: String::new(),
            detection: DetectionSettings::default(),
            min_duration: Duration::from_secs(3),
            check_interval: Duration::from_secs(1),
            pre_roll: Duration::from_secs(6),
            post_roll: Duration::from_secs(5),
            max_recordings: 50,
            max_duration: Duration::from_secs(300),
            recordings_path: PathBuf::from("/share/security_recordings"),
            state_file: PathBuf::from("/share/security_state.json"),
            settings_file: Some(PathBuf::from("/share/security_settings.json")),
            settings_reload_interval: Duration::from_secs(2),
            state_update_interval: Duration::from_secs(1),
            screenshot_interval: Duration::from_secs(5),
            frame_timeout: Duration::from_secs(10),
            capture_stop_grace: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(15),
            log_level: "info".to_string(),
        }
    }
}

impl CameraConfig {
    /// Create config from the options file and environment variables.
    pub fn from_env() -> Self {
        Self::from_source(&ConfigSource::load())
    }

    /// Create config from an explicit source.
    pub fn from_source(source: &ConfigSource) -> Self {
        let defaults = Self::default();

        let configured = DetectionSettings {
            threshold: source
                .get("motion_threshold")
                .unwrap_or(defaults.detection.threshold),
            roi_x_start: source.get("roi_x_start").unwrap_or(defaults.detection.roi_x_start),
            roi_x_end: source.get("roi_x_end").unwrap_or(defaults.detection.roi_x_end),
            roi_y_start: source.get("roi_y_start").unwrap_or(defaults.detection.roi_y_start),
            roi_y_end: source.get("roi_y_end").unwrap_or(defaults.detection.roi_y_end),
        };
        let detection = match configured.validate() {
            Ok(()) => configured,
            Err(e) => {
                warn!("Configured detection settings rejected ({}), using full frame", e);
                DetectionSettings {
                    threshold: if configured.threshold > 0 {
                        configured.threshold
                    } else {
                        defaults.detection.threshold
                    },
                    ..DetectionSettings::default()
                }
            }
        };

        let settings_file = match source.string("settings_file") {
            Some(s) if s.trim().is_empty() => None,
            Some(s) => Some(PathBuf::from(s)),
            None => defaults.settings_file.clone(),
        };

        Self {
            stream_url: source.string("stream_url").unwrap_or_default(),
            detection,
            min_duration: source.secs("min_duration", defaults.min_duration.as_secs_f64()),
            check_interval: source.secs("check_interval", defaults.check_interval.as_secs_f64()),
            pre_roll: source.secs("pre_roll", defaults.pre_roll.as_secs_f64()),
            post_roll: source.secs("post_roll", defaults.post_roll.as_secs_f64()),
            max_recordings: source.get("max_recordings").unwrap_or(defaults.max_recordings),
            max_duration: source.secs("max_duration", defaults.max_duration.as_secs_f64()),
            recordings_path: source
                .string("recordings_path")
                .map(PathBuf::from)
                .unwrap_or(defaults.recordings_path),
            state_file: source
                .string("state_file")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_file),
            settings_file,
            settings_reload_interval: source.secs(
                "settings_reload_interval",
                defaults.settings_reload_interval.as_secs_f64(),
            ),
            state_update_interval: source.secs(
                "state_update_interval",
                defaults.state_update_interval.as_secs_f64(),
            ),
            screenshot_interval: source.secs(
                "screenshot_interval",
                defaults.screenshot_interval.as_secs_f64(),
            ),
            frame_timeout: source.secs("frame_timeout", defaults.frame_timeout.as_secs_f64()),
            capture_stop_grace: source.secs(
                "capture_stop_grace",
                defaults.capture_stop_grace.as_secs_f64(),
            ),
            shutdown_timeout: source.secs(
                "shutdown_timeout",
                defaults.shutdown_timeout.as_secs_f64(),
            ),
            log_level: source.string("log_level").unwrap_or(defaults.log_level),
        }
    }

    /// Reject configurations the runtime cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.stream_url.trim().is_empty() {
            return Err(CoreError::config_error("stream_url is required"));
        }

        for (name, value) in [
            ("check_interval", self.check_interval),
            ("max_duration", self.max_duration),
            ("state_update_interval", self.state_update_interval),
            ("settings_reload_interval", self.settings_reload_interval),
            ("screenshot_interval", self.screenshot_interval),
            ("frame_timeout", self.frame_timeout),
        ] {
            if value.is_zero() {
                return Err(CoreError::config_error(format!("{name} must be positive")));
            }
        }

        // Capture length is passed to ffmpeg in whole seconds
        if self.max_duration < Duration::from_secs(1) {
            return Err(CoreError::config_error("max_duration must be at least 1 second"));
        }

        self.detection.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn source(value: Value) -> ConfigSource {
        match value {
            Value::Object(map) => ConfigSource::from_options(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_defaults_for_missing_values() {
        let config = CameraConfig::from_source(&source(json!({})));

        assert_eq!(config.detection, DetectionSettings::default());
        assert_eq!(config.min_duration, Duration::from_secs(3));
        assert_eq!(config.post_roll, Duration::from_secs(5));
        assert_eq!(config.max_recordings, 50);
        assert_eq!(config.max_duration, Duration::from_secs(300));
        assert_eq!(config.recordings_path, PathBuf::from("/share/security_recordings"));
        assert!(config.validate().is_err(), "stream_url is required");
    }

    #[test]
    fn test_options_values() {
        let config = CameraConfig::from_source(&source(json!({
            "stream_url": "http://cam/stream.m3u8",
            "motion_threshold": 7000,
            "min_duration": 2.5,
            "roi_x_start": 33,
            "roi_x_end": 66,
            "pre_roll": 10,
            "max_recordings": "20",
            "settings_file": "",
            "log_level": "debug"
        })));

        assert_eq!(config.stream_url, "http://cam/stream.m3u8");
        assert_eq!(config.detection.threshold, 7000);
        assert_eq!(config.detection.roi_x_start, 33);
        assert_eq!(config.detection.roi_x_end, 66);
        assert_eq!(config.min_duration, Duration::from_millis(2500));
        assert_eq!(config.pre_roll, Duration::from_secs(10));
        assert_eq!(config.max_recordings, 20);
        assert!(config.settings_file.is_none());
        assert_eq!(config.log_level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_float_encoded_integers() {
        let config = CameraConfig::from_source(&source(json!({ "max_recordings": 30.0 })));
        assert_eq!(config.max_recordings, 30);
    }

    #[test]
    fn test_invalid_roi_falls_back_to_full_frame() {
        let config = CameraConfig::from_source(&source(json!({
            "motion_threshold": 4000,
            "roi_x_start": 80,
            "roi_x_end": 20
        })));

        assert!(config.detection.roi().is_full_frame());
        assert_eq!(config.detection.threshold, 4000);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = CameraConfig::from_source(&source(json!({ "stream_url": "x" })));
        config.check_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(CoreError::ConfigError(_))));
    }

    #[test]
    fn test_out_of_range_durations_use_defaults() {
        let config = CameraConfig::from_source(&source(json!({
            "post_roll": "1e20",
            "min_duration": "-4",
            "check_interval": "NaN",
            "max_duration": "inf",
        })));

        assert_eq!(config.post_roll, Duration::from_secs(5));
        assert_eq!(config.min_duration, Duration::from_secs(3));
        assert_eq!(config.check_interval, Duration::from_secs(1));
        assert_eq!(config.max_duration, Duration::from_secs(300));
    }

    #[test]
    fn test_subsecond_max_duration_rejected() {
        let config = CameraConfig::from_source(&source(json!({
            "stream_url": "x",
            "max_duration": 0.5,
        })));

        assert_eq!(config.max_duration, Duration::from_millis(500));
        assert!(matches!(config.validate(), Err(CoreError::ConfigError(_))));
    }

    #[test]
    fn test_options_file_parsing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");

        std::fs::write(&path, r#"{"stream_url": "rtsp://cam/1", "post_roll": 8}"#).unwrap();
        let options = read_options(&path);
        assert_eq!(options["stream_url"], "rtsp://cam/1");

        std::fs::write(&path, "not json").unwrap();
        assert!(read_options(&path).is_empty());

        assert!(read_options(&dir.path().join("missing.json")).is_empty());
    }
}
