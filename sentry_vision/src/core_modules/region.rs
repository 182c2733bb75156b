// THEORY:
// The `RegionOfInterest` is the fixed pre-processing stage between acquisition
// and the background model. It narrows the frame to the rectangle the operator
// cares about (a doorway rather than the whole street), drops colour, and blurs
// away sensor noise so that the change detector compares shapes, not grain.
//
// It is stateless. The only thing later stages need to know about cropping is
// the crop origin, which the change detector adds back to every region so that
// consumers always see full-frame coordinates.

use crate::error::{Result, VisionError};
use image::{GrayImage, RgbImage, imageops};

/// A crop rectangle in full-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Builds the rectangle spanned by a top-left and a bottom-right corner.
    /// The bottom-right corner is exclusive.
    pub fn from_corners(top_left: [u32; 2], bottom_right: [u32; 2]) -> Result<Self> {
        let [x1, y1] = top_left;
        let [x2, y2] = bottom_right;
        if x2 <= x1 || y2 <= y1 {
            return Err(VisionError::Configuration(format!(
                "crop corners ({x1}, {y1}) and ({x2}, {y2}) do not form a rectangle"
            )));
        }
        Ok(Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }

    pub fn origin(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x + self.width <= width && self.y + self.height <= height
    }
}

/// Crop, grayscale and blur in one stage.
#[derive(Debug, Clone)]
pub struct RegionOfInterest {
    crop: Option<CropRect>,
    blur_sigma: f32,
}

impl RegionOfInterest {
    pub fn new(crop: Option<CropRect>, blur_sigma: f32) -> Self {
        Self { crop, blur_sigma }
    }

    pub fn crop(&self) -> Option<CropRect> {
        self.crop
    }

    /// Offset of the region inside the full frame.
    pub fn origin(&self) -> (u32, u32) {
        self.crop.map(|rect| rect.origin()).unwrap_or((0, 0))
    }

    /// The colour pixels of the region, used for aiming the camera.
    pub fn extract_color(&self, image: &RgbImage) -> Result<RgbImage> {
        match self.crop {
            Some(rect) => {
                if !rect.fits_within(image.width(), image.height()) {
                    return Err(VisionError::DimensionMismatch {
                        expected_width: rect.x + rect.width,
                        expected_height: rect.y + rect.height,
                        actual_width: image.width(),
                        actual_height: image.height(),
                    });
                }
                Ok(imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image())
            }
            None => Ok(image.clone()),
        }
    }

    /// The grayscale, blurred region the background model works on.
    pub fn extract(&self, image: &RgbImage) -> Result<GrayImage> {
        let gray = match self.crop {
            Some(_) => imageops::grayscale(&self.extract_color(image)?),
            None => imageops::grayscale(image),
        };

        if self.blur_sigma > 0.0 {
            Ok(imageops::blur(&gray, self.blur_sigma))
        } else {
            Ok(gray)
        }
    }
}
