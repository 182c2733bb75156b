// THEORY:
// `CameraSource` is the OpenCV side of `FrameSource`. It reads BGR matrices
// from a `VideoCapture`, converts them to RGB buffers, resizes them to the
// configured resolution and stamps each one with its capture time.
//
// A live device and a video file behave differently at the edges. A device
// that stops delivering is a hard acquisition failure, while a file that
// runs out is simply the end of the stream. Files are also timestamped from
// their own frame rate instead of the wall clock, so a recording processed
// faster than real time still sees the same debounce intervals.

use crate::convert;
use chrono::{Duration, Local};
use image::{imageops, RgbImage};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture},
};
use sentry_vision::{Frame, FrameSource, Result, Timestamp, VisionError};

enum Clock {
    /// Wall-clock time, nudged forward if the system clock steps back.
    Wall { last: Option<Timestamp> },
    /// `start + index / fps`.
    Video { start: Timestamp, fps: f64, index: u32 },
}

impl Clock {
    fn tick(&mut self) -> Timestamp {
        match self {
            Clock::Wall { last } => {
                let now = Local::now();
                let stamped = match *last {
                    Some(previous) if now <= previous => previous + Duration::microseconds(1),
                    _ => now,
                };
                *last = Some(stamped);
                stamped
            }
            Clock::Video { start, fps, index } => {
                let offset = Duration::microseconds((*index as f64 * 1_000_000.0 / *fps) as i64);
                *index += 1;
                *start + offset
            }
        }
    }
}

pub struct CameraSource {
    capture: VideoCapture,
    live: bool,
    resolution: [u32; 2],
    clock: Clock,
    buffer: Mat,
}

impl CameraSource {
    /// Opens camera `index` and asks it for the configured resolution and fps.
    pub fn open_device(index: i32, resolution: [u32; 2], fps: u32) -> Result<Self> {
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY).map_err(acquisition)?;
        if !capture.is_opened().map_err(acquisition)? {
            return Err(VisionError::Acquisition(format!("cannot open camera {index}")));
        }
        capture
            .set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(resolution[0]))
            .map_err(acquisition)?;
        capture
            .set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(resolution[1]))
            .map_err(acquisition)?;
        capture
            .set(videoio::CAP_PROP_FPS, f64::from(fps))
            .map_err(acquisition)?;
        log::info!("opened camera {index}");

        Ok(Self {
            capture,
            live: true,
            resolution,
            clock: Clock::Wall { last: None },
            buffer: Mat::default(),
        })
    }

    /// Opens a video file. Falls back to `fallback_fps` when the container
    /// does not report a frame rate.
    pub fn open_file(path: &str, resolution: [u32; 2], fallback_fps: u32) -> Result<Self> {
        let capture = VideoCapture::from_file(path, videoio::CAP_ANY).map_err(acquisition)?;
        if !capture.is_opened().map_err(acquisition)? {
            return Err(VisionError::Acquisition(format!("cannot open video file {path}")));
        }
        let reported = capture.get(videoio::CAP_PROP_FPS).map_err(acquisition)?;
        let fps = if reported > 0.0 {
            reported
        } else {
            f64::from(fallback_fps)
        };
        log::info!("opened {path} at {fps:.2} fps");

        Ok(Self {
            capture,
            live: false,
            resolution,
            clock: Clock::Video {
                start: Local::now(),
                fps,
                index: 0,
            },
            buffer: Mat::default(),
        })
    }

    fn fit(&self, image: RgbImage) -> RgbImage {
        let [width, height] = self.resolution;
        if image.dimensions() == (width, height) {
            image
        } else {
            imageops::resize(&image, width, height, imageops::FilterType::Triangle)
        }
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let grabbed = self.capture.read(&mut self.buffer).map_err(acquisition)?;
        if !grabbed {
            return if self.live {
                Err(VisionError::Acquisition("camera stopped delivering frames".to_string()))
            } else {
                Ok(None)
            };
        }

        let timestamp = self.clock.tick();
        if self.buffer.empty() {
            return Ok(Some(Frame::new(RgbImage::new(0, 0), timestamp)));
        }

        let image = convert::bgr_to_rgb_image(&self.buffer)
            .map_err(acquisition)?
            .ok_or_else(|| VisionError::Acquisition("captured frame has an unexpected layout".to_string()))?;
        Ok(Some(Frame::new(self.fit(image), timestamp)))
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            log::warn!("failed to release capture: {e}");
        }
    }
}

fn acquisition(error: opencv::Error) -> VisionError {
    VisionError::Acquisition(error.to_string())
}
