//! OpenCV backend: MOG2 background model and `imgproc` morphology.
//!
//! Both plug into the same seams as the built-in implementations, so the
//! classifier, thresholds and area scaling are unchanged.

use image::GrayImage;
use opencv::core::{Mat, Point, Ptr, Size, BORDER_CONSTANT};
use opencv::imgproc;
use opencv::prelude::*;
use opencv::video;
use tracing::warn;

use super::background::{BackgroundSubtractor, DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD};
use super::morphology::{self, MaskFilter};
use crate::error::{MediaError, MediaResult};

/// Side of the elliptical structuring element.
const KERNEL_SIZE: i32 = 5;

/// Let OpenCV pick the learning rate from the history length.
const AUTO_LEARNING_RATE: f64 = -1.0;

fn gray_to_mat(image: &GrayImage) -> opencv::Result<Mat> {
    let view = Mat::new_rows_cols_with_data(
        image.height() as i32,
        image.width() as i32,
        image.as_raw().as_slice(),
    )?;
    view.try_clone()
}

fn mat_to_gray(mat: &Mat) -> opencv::Result<Option<GrayImage>> {
    let bytes = mat.data_bytes()?;
    Ok(GrayImage::from_raw(
        mat.cols() as u32,
        mat.rows() as u32,
        bytes.to_vec(),
    ))
}

/// OpenCV's Gaussian-mixture background model, shadows disabled.
pub struct Mog2Subtractor {
    history: i32,
    var_threshold: f64,
    model: Ptr<video::BackgroundSubtractorMOG2>,
}

impl Mog2Subtractor {
    pub fn new(history: u32, var_threshold: f32) -> MediaResult<Self> {
        let history = i32::try_from(history).unwrap_or(i32::MAX);
        let var_threshold = f64::from(var_threshold);
        let model = create_model(history, var_threshold)?;
        Ok(Self {
            history,
            var_threshold,
            model,
        })
    }

    /// History 500, variance threshold 50.
    pub fn with_defaults() -> MediaResult<Self> {
        Self::new(DEFAULT_HISTORY, DEFAULT_VAR_THRESHOLD)
    }

    fn try_apply(&mut self, frame: &GrayImage) -> opencv::Result<Option<GrayImage>> {
        let input = gray_to_mat(frame)?;
        let mut mask = Mat::default();
        self.model.apply(&input, &mut mask, AUTO_LEARNING_RATE)?;
        mat_to_gray(&mask)
    }
}

fn create_model(
    history: i32,
    var_threshold: f64,
) -> MediaResult<Ptr<video::BackgroundSubtractorMOG2>> {
    video::create_background_subtractor_mog2(history, var_threshold, false)
        .map_err(|e| MediaError::detection_failed(format!("MOG2: {}", e)))
}

impl BackgroundSubtractor for Mog2Subtractor {
    fn apply(&mut self, frame: &GrayImage) -> GrayImage {
        match self.try_apply(frame) {
            Ok(Some(mask)) => mask,
            Ok(None) => {
                warn!("MOG2 mask size does not match the frame");
                GrayImage::new(frame.width(), frame.height())
            }
            Err(e) => {
                warn!("MOG2 failed: {}", e);
                GrayImage::new(frame.width(), frame.height())
            }
        }
    }

    fn reset(&mut self) {
        match create_model(self.history, self.var_threshold) {
            Ok(model) => self.model = model,
            Err(e) => warn!("Failed to reset MOG2 model: {}", e),
        }
    }
}

/// Open then close with a 5x5 ellipse via `imgproc::morphology_ex`.
pub struct ImgprocMorphology {
    kernel: Mat,
}

impl ImgprocMorphology {
    pub fn new() -> MediaResult<Self> {
        let kernel = imgproc::get_structuring_element(
            imgproc::MORPH_ELLIPSE,
            Size::new(KERNEL_SIZE, KERNEL_SIZE),
            Point::new(-1, -1),
        )
        .map_err(|e| MediaError::detection_failed(format!("Structuring element: {}", e)))?;
        Ok(Self { kernel })
    }

    fn morph(&self, src: &Mat, op: i32) -> opencv::Result<Mat> {
        let mut dst = Mat::default();
        imgproc::morphology_ex(
            src,
            &mut dst,
            op,
            &self.kernel,
            Point::new(-1, -1),
            1,
            BORDER_CONSTANT,
            imgproc::morphology_default_border_value()?,
        )?;
        Ok(dst)
    }

    fn try_clean(&self, mask: &GrayImage) -> opencv::Result<Option<GrayImage>> {
        let input = gray_to_mat(mask)?;
        let opened = self.morph(&input, imgproc::MORPH_OPEN)?;
        let closed = self.morph(&opened, imgproc::MORPH_CLOSE)?;
        mat_to_gray(&closed)
    }
}

impl MaskFilter for ImgprocMorphology {
    fn clean(&mut self, mask: &GrayImage) -> GrayImage {
        match self.try_clean(mask) {
            Ok(Some(cleaned)) => cleaned,
            Ok(None) => morphology::close(&morphology::open(mask)),
            Err(e) => {
                warn!("imgproc morphology failed, using built-in: {}", e);
                morphology::close(&morphology::open(mask))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square(size: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = x >= x0 && x < x0 + side && y >= y0 && y < y0 + side;
            Luma([if inside { 255 } else { 0 }])
        })
    }

    fn count(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] != 0).count()
    }

    #[test]
    fn test_mog2_static_scene_settles() {
        let mut bg = Mog2Subtractor::with_defaults().unwrap();
        let frame = GrayImage::from_pixel(64, 64, Luma([90]));

        for _ in 0..10 {
            bg.apply(&frame);
        }
        assert_eq!(count(&bg.apply(&frame)), 0);
    }

    #[test]
    fn test_mog2_flags_new_object() {
        let mut bg = Mog2Subtractor::with_defaults().unwrap();
        let blank = GrayImage::new(64, 64);
        for _ in 0..10 {
            bg.apply(&blank);
        }

        let mask = bg.apply(&square(64, 20, 20, 16));
        assert!(count(&mask) >= 200, "foreground {}", count(&mask));
    }

    #[test]
    fn test_imgproc_open_removes_speck() {
        let mut filter = ImgprocMorphology::new().unwrap();
        let mut mask = square(64, 20, 20, 16);
        mask.put_pixel(2, 2, Luma([255]));

        let cleaned = filter.clean(&mask);
        assert_eq!(cleaned.get_pixel(2, 2).0[0], 0);
        assert!(count(&cleaned) >= 200);
    }
}
