// THEORY:
// The `ChangeDetector` is the spatial half of the engine. Given the current
// region of interest and the background model's running average, it answers a
// single question for this frame: "is something moving, and where?"
//
// Algorithm steps:
// 1.  **Differencing**: the absolute per-pixel difference between the frame and
//     the average (rounded to 8-bit first, the same precision the frame has).
// 2.  **Thresholding**: every pixel whose difference exceeds `delta_threshold`
//     is switched on in a binary mask (`imageproc::contrast::threshold`).
// 3.  **Dilation**: the mask is grown with a 3x3 square, `dilate_iterations`
//     times, so one moving object does not fall apart into a spray of specks.
// 4.  **Region extraction**: `imageproc` labels the 8-connected components of
//     the mask; each label is folded into a bounding box and a pixel count.
// 5.  **Filtering**: regions smaller than `min_area` are dropped. Whatever
//     survives is motion; bounding boxes are shifted by the crop origin so the
//     rest of the system never needs to know a crop happened.
//
// The detector is stateless; all memory lives in the `BackgroundModel`.

use crate::core_modules::background::RunningAverage;
use crate::error::{Result, VisionError};
use image::{GrayImage, Luma};
use imageproc::contrast::{self, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::map::map_colors2;
use imageproc::morphology;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

/// A connected patch of change, in full-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Number of mask pixels in the region.
    pub area: u32,
}

/// The per-frame verdict of the change detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotionSignal {
    pub motion: bool,
    pub regions: Vec<MotionRegion>,
}

impl MotionSignal {
    pub fn from_regions(regions: Vec<MotionRegion>) -> Self {
        Self {
            motion: !regions.is_empty(),
            regions,
        }
    }

    pub fn still() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Minimum intensity difference (exclusive) for a pixel to count as changed.
    pub delta_threshold: u8,
    /// Regions with fewer pixels than this are ignored.
    pub min_area: u32,
    pub dilate_iterations: u32,
}

/// Mask value of a changed pixel.
pub const MASK_ON: u8 = 255;

/// Switches on every pixel whose `|frame - background|` exceeds `threshold`.
pub fn difference_mask(frame: &GrayImage, background: &GrayImage, threshold: u8) -> GrayImage {
    let difference = map_colors2(frame, background, |a: Luma<u8>, b: Luma<u8>| {
        Luma([a[0].abs_diff(b[0])])
    });
    contrast::threshold(&difference, threshold, ThresholdType::Binary)
}

/// Grows the mask by `iterations` passes of a 3x3 square.
pub fn dilate_mask(mask: &GrayImage, iterations: u32) -> GrayImage {
    if iterations == 0 {
        return mask.clone();
    }
    // An L-infinity radius of k is k passes of the 3x3 square.
    let radius = u8::try_from(iterations).unwrap_or(u8::MAX);
    morphology::dilate(mask, Norm::LInf, radius)
}

/// Bounding box and pixel count of every 8-connected component of the mask,
/// in raster order of each component's first pixel.
pub fn label_regions(mask: &GrayImage) -> Vec<MotionRegion> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut slots: HashMap<u32, usize> = HashMap::new();
    let mut regions: Vec<(u32, u32, u32, u32, u32)> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        let slot = *slots.entry(label).or_insert_with(|| {
            regions.push((x, y, x, y, 0));
            regions.len() - 1
        });
        let (min_x, min_y, max_x, max_y, area) = &mut regions[slot];
        *min_x = (*min_x).min(x);
        *min_y = (*min_y).min(y);
        *max_x = (*max_x).max(x);
        *max_y = (*max_y).max(y);
        *area += 1;
    }

    regions
        .into_iter()
        .map(|(min_x, min_y, max_x, max_y, area)| MotionRegion {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
            area,
        })
        .collect()
}

fn count_on(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&p| p == MASK_ON).count()
}

#[derive(Debug, Clone)]
pub struct ChangeDetector {
    config: DetectorConfig,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Compares `roi` against the background and reports the surviving regions,
    /// translated by `origin` into full-frame coordinates.
    pub fn detect(
        &self,
        roi: &GrayImage,
        background: &RunningAverage,
        origin: (u32, u32),
    ) -> Result<MotionSignal> {
        if roi.dimensions() != (background.width(), background.height()) {
            return Err(VisionError::DimensionMismatch {
                expected_width: background.width(),
                expected_height: background.height(),
                actual_width: roi.width(),
                actual_height: roi.height(),
            });
        }

        let mask = difference_mask(roi, &background.to_gray(), self.config.delta_threshold);
        let mask = dilate_mask(&mask, self.config.dilate_iterations);

        let (origin_x, origin_y) = origin;
        let regions: Vec<MotionRegion> = label_regions(&mask)
            .into_iter()
            .filter(|region| region.area >= self.config.min_area)
            .map(|region| MotionRegion {
                x: region.x + origin_x,
                y: region.y + origin_y,
                ..region
            })
            .collect();

        log::debug!(
            "{} changed pixels, {} region(s) at or above {} px",
            count_on(&mask),
            regions.len(),
            self.config.min_area
        );

        Ok(MotionSignal::from_regions(regions))
    }
}
