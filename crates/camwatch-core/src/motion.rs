//! State machine turning per-tick motion scores into motion events.
//!
//! # State Machine
//!
//! ```text
//!            area >= threshold                 persisted >= min_duration
//!   ┌──────┐ ───────────────────▶ ┌─────────┐ ─────────────────────────▶ ┌────────┐
//!   │ Idle │                      │ Pending │        emit start          │ Active │ ─┐ area >= threshold
//!   └──────┘ ◀─────────────────── └─────────┘                            └────────┘ ◀┘ emit frame
//!      ▲        area < threshold                                              │
//!      │        (blip, no event)                                              │
//!      └──────────────────────────────────────────────────────────────────────┘
//!                              area < threshold, emit end
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

use camwatch_models::{DetectionPhase, DetectionStats, MotionEvent, MotionEventKind};

/// Slack for tick jitter when comparing persisted time to `min_duration`.
const PERSISTENCE_SLACK_SECS: f64 = 0.05;

/// Internal state for the detector.
#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    /// Motion seen, not yet confirmed.
    Pending {
        started_at: DateTime<Utc>,
        above_secs: f64,
    },
    /// Motion confirmed.
    Active {
        started_at: DateTime<Utc>,
        above_secs: f64,
    },
}

/// Debounces motion scores into start/frame/end events.
///
/// Not reentrant: one instance per stream, driven by a single task.
#[derive(Debug, Clone)]
pub struct MotionStateMachine {
    min_duration_secs: f64,
    sample_interval_secs: f64,
    state: State,
    frames_processed: u64,
    motion_events: u64,
    last_motion_at: Option<DateTime<Utc>>,
    last_area: u64,
    last_tick: Option<DateTime<Utc>>,
}

impl MotionStateMachine {
    /// Create a detector.
    ///
    /// # Arguments
    /// - `min_duration`: how long motion must persist before `start` is emitted
    /// - `sample_interval`: nominal time between ticks; the first qualifying
    ///   sample of an episode counts for one interval
    pub fn new(min_duration: Duration, sample_interval: Duration) -> Self {
        Self {
            min_duration_secs: min_duration.as_secs_f64(),
            sample_interval_secs: sample_interval.as_secs_f64(),
            state: State::Idle,
            frames_processed: 0,
            motion_events: 0,
            last_motion_at: None,
            last_area: 0,
            last_tick: None,
        }
    }

    /// Process one tick.
    ///
    /// `threshold` comes from the settings snapshot taken for this tick, so
    /// changes apply from the next tick on without touching the episode in
    /// progress.
    pub fn ingest(&mut self, area: u64, threshold: u64, now: DateTime<Utc>) -> Option<MotionEvent> {
        let elapsed = self
            .last_tick
            .map(|prev| (now - prev).to_std().map(|d| d.as_secs_f64()).unwrap_or(0.0))
            .unwrap_or(self.sample_interval_secs);

        self.frames_processed += 1;
        self.last_tick = Some(now);
        self.last_area = area;

        let above = area >= threshold;
        if above {
            self.last_motion_at = Some(now);
        }

        match (self.state, above) {
            // Something moved: start timing it
            (State::Idle, true) => {
                self.state = State::Pending {
                    started_at: now,
                    above_secs: self.sample_interval_secs,
                };
                None
            }

            // Still moving: confirm once it persisted long enough
            (
                State::Pending {
                    started_at,
                    above_secs,
                },
                true,
            ) => {
                let above_secs = above_secs + elapsed;
                if above_secs + PERSISTENCE_SLACK_SECS >= self.min_duration_secs {
                    self.state = State::Active {
                        started_at,
                        above_secs,
                    };
                    self.motion_events += 1;
                    Some(self.event(MotionEventKind::Start, started_at, area))
                } else {
                    self.state = State::Pending {
                        started_at,
                        above_secs,
                    };
                    None
                }
            }

            // Transient blip
            (State::Pending { .. }, false) => {
                self.state = State::Idle;
                None
            }

            (
                State::Active {
                    started_at,
                    above_secs,
                },
                true,
            ) => {
                self.state = State::Active {
                    started_at,
                    above_secs: above_secs + elapsed,
                };
                Some(self.event(MotionEventKind::Frame, now, area))
            }

            (State::Active { .. }, false) => {
                self.state = State::Idle;
                Some(self.event(MotionEventKind::End, now, area))
            }

            (State::Idle, false) => None,
        }
    }

    fn event(&self, kind: MotionEventKind, timestamp: DateTime<Utc>, area: u64) -> MotionEvent {
        MotionEvent::new(kind, timestamp, area, self.frames_processed)
    }

    pub fn phase(&self) -> DetectionPhase {
        match self.state {
            State::Idle => DetectionPhase::Idle,
            State::Pending { .. } => DetectionPhase::Pending,
            State::Active { .. } => DetectionPhase::Active,
        }
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Snapshot for reporting.
    pub fn stats(&self) -> DetectionStats {
        let (motion_started_at, above_secs) = match self.state {
            State::Idle => (None, 0.0),
            State::Pending {
                started_at,
                above_secs,
            }
            | State::Active {
                started_at,
                above_secs,
            } => (Some(started_at), above_secs),
        };

        DetectionStats {
            phase: self.phase(),
            frames_processed: self.frames_processed,
            motion_events: self.motion_events,
            motion_started_at,
            consecutive_above_threshold_secs: above_secs,
            last_motion_at: self.last_motion_at,
            last_area: self.last_area,
            last_frame_at: self.last_tick,
            decode_failures: 0,
        }
    }
}
