//! Binary morphology on foreground masks.
//!
//! Masks are `GrayImage`s where any non-zero pixel is foreground.

use image::{GrayImage, Luma};
use std::collections::VecDeque;

use super::background::FOREGROUND;

/// Offsets of the 5x5 elliptical structuring element.
///
/// ```text
/// . . x . .
/// x x x x x
/// x x x x x
/// x x x x x
/// . . x . .
/// ```
const ELLIPSE_5X5: [(i32, i32); 17] = [
    (0, -2),
    (-2, -1),
    (-1, -1),
    (0, -1),
    (1, -1),
    (2, -1),
    (-2, 0),
    (-1, 0),
    (0, 0),
    (1, 0),
    (2, 0),
    (-2, 1),
    (-1, 1),
    (0, 1),
    (1, 1),
    (2, 1),
    (0, 2),
];

fn is_set(mask: &GrayImage, x: i32, y: i32) -> Option<bool> {
    if x < 0 || y < 0 || x >= mask.width() as i32 || y >= mask.height() as i32 {
        return None;
    }
    Some(mask.get_pixel(x as u32, y as u32).0[0] != 0)
}

/// Pixel stays set only if every kernel neighbour is set. Out-of-frame
/// neighbours do not erode.
pub fn erode(mask: &GrayImage) -> GrayImage {
    let (w, h) = mask.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let keep = ELLIPSE_5X5
            .iter()
            .all(|(dx, dy)| is_set(mask, x as i32 + dx, y as i32 + dy).unwrap_or(true));
        Luma([if keep { FOREGROUND } else { 0 }])
    })
}

/// Pixel becomes set if any kernel neighbour is set.
pub fn dilate(mask: &GrayImage) -> GrayImage {
    let (w, h) = mask.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let hit = ELLIPSE_5X5
            .iter()
            .any(|(dx, dy)| is_set(mask, x as i32 + dx, y as i32 + dy).unwrap_or(false));
        Luma([if hit { FOREGROUND } else { 0 }])
    })
}

/// Erode then dilate: removes specks smaller than the kernel.
pub fn open(mask: &GrayImage) -> GrayImage {
    dilate(&erode(mask))
}

/// Dilate then erode: fills small gaps inside blobs.
pub fn close(mask: &GrayImage) -> GrayImage {
    erode(&dilate(mask))
}

/// Noise cleanup applied to foreground masks before measuring them.
pub trait MaskFilter: Send {
    fn clean(&mut self, mask: &GrayImage) -> GrayImage;
}

/// Open then close with the 5x5 ellipse, on plain `image` buffers.
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelMorphology;

impl MaskFilter for PixelMorphology {
    fn clean(&mut self, mask: &GrayImage) -> GrayImage {
        close(&open(mask))
    }
}

/// Total area of the external blobs with their holes filled.
///
/// Background pixels reachable from the frame border (4-connected) are
/// outside every blob; everything else belongs to a filled blob.
pub fn filled_area(mask: &GrayImage) -> u64 {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return 0;
    }

    let idx = |x: u32, y: u32| (y * w + x) as usize;
    let mut outside = vec![false; (w * h) as usize];
    let mut queue = VecDeque::new();

    let seed = |x: u32, y: u32, outside: &mut Vec<bool>, queue: &mut VecDeque<(u32, u32)>| {
        if mask.get_pixel(x, y).0[0] == 0 && !outside[idx(x, y)] {
            outside[idx(x, y)] = true;
            queue.push_back((x, y));
        }
    };

    for x in 0..w {
        seed(x, 0, &mut outside, &mut queue);
        seed(x, h - 1, &mut outside, &mut queue);
    }
    for y in 0..h {
        seed(0, y, &mut outside, &mut queue);
        seed(w - 1, y, &mut outside, &mut queue);
    }

    while let Some((x, y)) = queue.pop_front() {
        if x > 0 {
            seed(x - 1, y, &mut outside, &mut queue);
        }
        if x + 1 < w {
            seed(x + 1, y, &mut outside, &mut queue);
        }
        if y > 0 {
            seed(x, y - 1, &mut outside, &mut queue);
        }
        if y + 1 < h {
            seed(x, y + 1, &mut outside, &mut queue);
        }
    }

    outside.iter().filter(|o| !**o).count() as u64
}
