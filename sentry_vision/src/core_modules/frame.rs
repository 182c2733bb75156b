// THEORY:
// A `Frame` is the unit that flows through the whole engine: one RGB capture
// plus the instant it was taken. Every stage downstream of acquisition only
// ever sees frames, never device handles or wall clocks, which is what makes
// a run replayable from a recorded sequence.
//
// Pixels live behind an `Arc` so that handing a frame to the recording sink
// and keeping it as the incident snapshot are both pointer copies.

use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::Arc;

pub type Timestamp = DateTime<Local>;

/// One captured RGB image tagged with its capture time.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    timestamp: Timestamp,
    // Set by the pipeline once the change detector has judged the frame.
    motion: bool,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp: Timestamp) -> Self {
        Self {
            image: Arc::new(image),
            timestamp,
            motion: false,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// A frame with no pixels: the source delivered something, but nothing usable.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Returns the same frame with different pixels, keeping the timestamp
    /// and the motion verdict.
    pub fn with_image(&self, image: RgbImage) -> Self {
        Self {
            image: Arc::new(image),
            timestamp: self.timestamp,
            motion: self.motion,
        }
    }

    pub fn with_motion(mut self, motion: bool) -> Self {
        self.motion = motion;
        self
    }

    /// Whether the change detector saw motion in this frame.
    pub fn motion(&self) -> bool {
        self.motion
    }

    /// The status line drawn on displayed and recorded frames.
    pub fn status_text(&self) -> &'static str {
        if self.motion {
            "Motion Detected"
        } else {
            "No motion detected"
        }
    }

    /// True when both frames share the same pixel buffer.
    pub fn shares_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clones_share_pixels() {
        let ts = Local.timestamp_opt(1_700_000_000, 0).unwrap();
        let frame = Frame::new(RgbImage::new(4, 3), ts);
        let copy = frame.clone();

        assert!(frame.shares_pixels(&copy));
        assert_eq!(copy.width(), 4);
        assert_eq!(copy.height(), 3);
        assert_eq!(copy.timestamp(), ts);
    }

    #[test]
    fn motion_verdict_survives_reannotation() {
        let ts = Local.timestamp_opt(1_700_000_000, 0).unwrap();
        let frame = Frame::new(RgbImage::new(2, 2), ts);
        assert!(!frame.motion());
        assert_eq!(frame.status_text(), "No motion detected");

        let marked = frame.with_motion(true).with_image(RgbImage::new(2, 2));
        assert!(marked.motion());
        assert_eq!(marked.status_text(), "Motion Detected");
        assert_eq!(marked.timestamp(), ts);
    }

    #[test]
    fn zero_sized_frame_is_empty() {
        let ts = Local.timestamp_opt(1_700_000_000, 0).unwrap();
        assert!(Frame::new(RgbImage::new(0, 0), ts).is_empty());
        assert!(!Frame::new(RgbImage::new(1, 1), ts).is_empty());
    }
}
