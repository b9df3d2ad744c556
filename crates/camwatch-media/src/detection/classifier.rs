//! Motion area scoring for one stream.

use camwatch_models::Roi;
use image::imageops::{self, FilterType};
use image::DynamicImage;

use super::background::{BackgroundSubtractor, RunningGaussianSubtractor};
use super::morphology::{self, MaskFilter, PixelMorphology};

/// Downscale factor applied before background subtraction.
const PROCESS_SCALE: f64 = 0.5;

/// Turns frames into a motion area score.
///
/// The background model inside is stateful and order-dependent: one
/// classifier per stream, and [`MotionClassifier::reset`] after a decode gap.
pub struct MotionClassifier {
    subtractor: Box<dyn BackgroundSubtractor>,
    filter: Box<dyn MaskFilter>,
}

impl Default for MotionClassifier {
    fn default() -> Self {
        Self::new(Box::new(RunningGaussianSubtractor::default()))
    }
}

impl MotionClassifier {
    pub fn new(subtractor: Box<dyn BackgroundSubtractor>) -> Self {
        Self {
            subtractor,
            filter: Box::new(PixelMorphology),
        }
    }

    /// Replace the mask cleanup stage.
    pub fn with_filter(mut self, filter: Box<dyn MaskFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// OpenCV MOG2 when built with the `opencv` feature and the library
    /// initialises, the built-in model otherwise.
    pub fn preferred() -> Self {
        preferred_backend().unwrap_or_default()
    }

    /// Motion area of `frame` inside `roi`, in full-resolution pixels.
    ///
    /// Returns 0 while the background model is (re)seeding, which includes
    /// the first frame after an ROI change.
    pub fn classify(&mut self, frame: &DynamicImage, roi: &Roi) -> u64 {
        let (x, y, w, h) = roi.pixel_bounds(frame.width(), frame.height());
        if w == 0 || h == 0 {
            return 0;
        }

        let gray = frame.crop_imm(x, y, w, h).to_luma8();

        let sw = ((w as f64 * PROCESS_SCALE).round() as u32).max(1);
        let sh = ((h as f64 * PROCESS_SCALE).round() as u32).max(1);
        let small = imageops::resize(&gray, sw, sh, FilterType::Triangle);

        let mask = self.subtractor.apply(&small);
        let cleaned = self.filter.clean(&mask);
        let area = morphology::filled_area(&cleaned);

        (area as f64 / (PROCESS_SCALE * PROCESS_SCALE)).round() as u64
    }

    /// Drop the learned background (stream restart).
    pub fn reset(&mut self) {
        self.subtractor.reset();
    }
}

#[cfg(feature = "opencv")]
fn preferred_backend() -> Option<MotionClassifier> {
    use super::opencv_backend::{ImgprocMorphology, Mog2Subtractor};

    let backend = Mog2Subtractor::with_defaults().and_then(|subtractor| {
        let filter = ImgprocMorphology::new()?;
        Ok(MotionClassifier::new(Box::new(subtractor)).with_filter(Box::new(filter)))
    });

    match backend {
        Ok(classifier) => {
            tracing::info!("Motion classifier using OpenCV MOG2");
            Some(classifier)
        }
        Err(e) => {
            tracing::warn!("OpenCV unavailable, using built-in background model: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "opencv"))]
fn preferred_backend() -> Option<MotionClassifier> {
    None
}
