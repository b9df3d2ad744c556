//! Background subtraction.

use image::{GrayImage, Luma};

/// Frames the model averages over.
pub const DEFAULT_HISTORY: u32 = 500;

/// Squared Mahalanobis distance above which a pixel is foreground.
pub const DEFAULT_VAR_THRESHOLD: f32 = 50.0;

const INITIAL_VARIANCE: f32 = 15.0;
const MIN_VARIANCE: f32 = 4.0;
const MAX_VARIANCE: f32 = 75.0;

/// Foreground value in masks.
pub const FOREGROUND: u8 = 255;

/// Stateful background model producing foreground masks.
pub trait BackgroundSubtractor: Send {
    /// Feed a frame and return its foreground mask (0 or 255 per pixel).
    fn apply(&mut self, frame: &GrayImage) -> GrayImage;

    /// Forget the learned background.
    fn reset(&mut self);
}

/// Single Gaussian per pixel with running mean and variance.
///
/// The learning rate starts high and settles at `1 / history`, so the model
/// converges quickly after a reset and then adapts slowly to lighting drift.
#[derive(Debug, Clone)]
pub struct RunningGaussianSubtractor {
    history: u32,
    var_threshold: f32,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
}

impl Default for RunningGaussianSubtractor {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD)
    }
}

impl RunningGaussianSubtractor {
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            history: history.max(1),
            var_threshold,
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }

    /// Whether the model has been seeded.
    pub fn is_seeded(&self) -> bool {
        self.frames_seen > 0
    }

    fn seed(&mut self, frame: &GrayImage) {
        self.width = frame.width();
        self.height = frame.height();
        self.mean = frame.as_raw().iter().map(|&p| p as f32).collect();
        self.variance = vec![INITIAL_VARIANCE; self.mean.len()];
        self.frames_seen = 1;
    }
}

impl BackgroundSubtractor for RunningGaussianSubtractor {
    fn apply(&mut self, frame: &GrayImage) -> GrayImage {
        let (width, height) = frame.dimensions();

        if !self.is_seeded() || width != self.width || height != self.height {
            self.seed(frame);
            return GrayImage::new(width, height);
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = 1.0 / self.frames_seen.min(self.history) as f32;

        let mut mask = GrayImage::new(width, height);
        for (i, (pixel, out)) in frame.pixels().zip(mask.pixels_mut()).enumerate() {
            let value = pixel.0[0] as f32;
            let diff = value - self.mean[i];
            let dist2 = diff * diff;

            if dist2 > self.var_threshold * self.variance[i] {
                *out = Luma([FOREGROUND]);
            }

            self.mean[i] += alpha * diff;
            self.variance[i] =
                (self.variance[i] + alpha * (dist2 - self.variance[i])).clamp(MIN_VARIANCE, MAX_VARIANCE);
        }

        mask
    }

    fn reset(&mut self) {
        self.frames_seen = 0;
        self.mean.clear();
        self.variance.clear();
    }
}
