//! Pixel-level motion classification.
//!
//! ```text
//! frame -> ROI crop -> gray -> 0.5x -> background model -> open/close -> blob area
//! ```
//!
//! | Stage | Type |
//! |-------|------|
//! | Background model | [`BackgroundSubtractor`] ([`RunningGaussianSubtractor`]) |
//! | Noise cleanup | [`MaskFilter`] ([`PixelMorphology`]) |
//! | Area | [`morphology::filled_area`] |
//! | Orchestration | [`MotionClassifier`] |
//!
//! With the `opencv` feature, [`MotionClassifier::preferred`] swaps in
//! OpenCV's MOG2 model and `imgproc` morphology.

pub mod background;
pub mod classifier;
pub mod morphology;
#[cfg(feature = "opencv")]
pub mod opencv_backend;

pub use background::{BackgroundSubtractor, RunningGaussianSubtractor};
pub use classifier::MotionClassifier;
pub use morphology::{MaskFilter, PixelMorphology};
#[cfg(feature = "opencv")]
pub use opencv_backend::{ImgprocMorphology, Mog2Subtractor};
