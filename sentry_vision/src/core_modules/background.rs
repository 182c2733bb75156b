// THEORY:
// The `BackgroundModel` is the engine's memory of what the scene normally looks
// like. It keeps one floating-point value per region-of-interest pixel and folds
// every new frame into it as an exponentially weighted moving average:
//
//     average = alpha * frame + (1 - alpha) * average
//
// Slow drift (clouds, the sun moving across a wall) is absorbed within a few
// frames, while a person walking into view stands out against the average.
// Memory stays constant no matter how long the stream runs.
//
// A model that has not seen a frame yet is `Unseeded`. That is a state of its
// own rather than an all-zero grid; blending into zeros would report the whole
// first frame as motion.

use crate::error::{Result, VisionError};
use image::GrayImage;

/// The running average of the scene, one `f32` per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningAverage {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl RunningAverage {
    fn from_gray(gray: &GrayImage) -> Self {
        Self {
            width: gray.width(),
            height: gray.height(),
            values: gray.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The average rounded and saturated back into 8-bit intensities.
    pub fn to_gray(&self) -> GrayImage {
        let bytes = self
            .values
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        // Dimensions come from a GrayImage of the same size.
        GrayImage::from_raw(self.width, self.height, bytes)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

#[derive(Debug, Clone, Default)]
enum ModelState {
    #[default]
    Unseeded,
    Seeded(RunningAverage),
}

#[derive(Debug, Clone, Default)]
pub struct BackgroundModel {
    state: ModelState,
}

impl BackgroundModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        matches!(self.state, ModelState::Seeded(_))
    }

    /// Initialises the average from the first observed frame. The dimensions
    /// chosen here are fixed for the lifetime of the model.
    pub fn seed(&mut self, gray: &GrayImage) -> Result<()> {
        if self.is_seeded() {
            return Err(VisionError::AlreadySeeded);
        }
        log::info!(
            "starting background model ({}x{})",
            gray.width(),
            gray.height()
        );
        self.state = ModelState::Seeded(RunningAverage::from_gray(gray));
        Ok(())
    }

    /// Blends `gray` into the average with weight `alpha`.
    pub fn update(&mut self, gray: &GrayImage, alpha: f32) -> Result<()> {
        let ModelState::Seeded(average) = &mut self.state else {
            return Err(VisionError::Unseeded);
        };

        if gray.dimensions() != (average.width, average.height) {
            return Err(VisionError::DimensionMismatch {
                expected_width: average.width,
                expected_height: average.height,
                actual_width: gray.width(),
                actual_height: gray.height(),
            });
        }

        let keep = 1.0 - alpha;
        for (avg, &sample) in average.values.iter_mut().zip(gray.as_raw()) {
            *avg = alpha * sample as f32 + keep * *avg;
        }
        Ok(())
    }

    pub fn current(&self) -> Result<&RunningAverage> {
        match &self.state {
            ModelState::Seeded(average) => Ok(average),
            ModelState::Unseeded => Err(VisionError::Unseeded),
        }
    }
}
