// THEORY:
// The `pipeline` module is the top-level API of the engine. It owns every piece
// of per-stream state (the background model and the incident machine) and runs
// the stages in order, one frame per call:
//
//     region of interest -> background model -> change detector -> overlay
//         -> incident machine
//
// The caller hands in timestamped frames and gets back a `FrameReport`: the
// (possibly annotated) frame, the motion verdict, and the lifecycle events the
// sinks should act on. Nothing in here reads a clock or touches a device.

use crate::config::WatchConfig;
use crate::core_modules::background::BackgroundModel;
use crate::core_modules::change_detector::ChangeDetector;
use crate::core_modules::frame::{Frame, Timestamp};
use crate::core_modules::incident::IncidentMachine;
use crate::core_modules::overlay;
use crate::core_modules::region::RegionOfInterest;
use crate::error::{Result, VisionError};

// Re-export key data structures for the public API.
pub use crate::core_modules::change_detector::{MotionRegion, MotionSignal};
pub use crate::core_modules::incident::{IncidentEvent, IncidentPhase};

pub type Event = IncidentEvent<Frame>;

/// The result of pushing one frame through the pipeline.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// The frame as the sinks see it, with motion regions outlined.
    pub frame: Frame,
    /// `None` for the frame that seeded the background model.
    pub signal: Option<MotionSignal>,
    pub events: Vec<Event>,
    pub recording: bool,
}

impl FrameReport {
    pub fn is_seed(&self) -> bool {
        self.signal.is_none()
    }

    pub fn motion(&self) -> bool {
        self.signal.as_ref().is_some_and(|s| s.motion)
    }

    pub fn status_text(&self) -> &'static str {
        self.frame.status_text()
    }
}

pub struct MotionPipeline {
    region: RegionOfInterest,
    background: BackgroundModel,
    detector: ChangeDetector,
    incidents: IncidentMachine<Frame>,
    alpha: f32,
    annotate: bool,
    last_timestamp: Option<Timestamp>,
}

impl MotionPipeline {
    pub fn new(config: &WatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            region: RegionOfInterest::new(config.crop_rect()?, config.blur_sigma),
            background: BackgroundModel::new(),
            detector: ChangeDetector::new(config.detector_config()),
            incidents: IncidentMachine::new(config.incident_config())?,
            alpha: config.alpha,
            annotate: true,
            last_timestamp: None,
        })
    }

    /// Turns bounding-box drawing on recorded frames on or off.
    pub fn with_annotation(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    pub fn region(&self) -> &RegionOfInterest {
        &self.region
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    pub fn incidents(&self) -> &IncidentMachine<Frame> {
        &self.incidents
    }

    pub fn is_recording(&self) -> bool {
        self.incidents.is_recording()
    }

    pub fn process(&mut self, frame: Frame) -> Result<FrameReport> {
        self.check_order(frame.timestamp())?;
        let gray = self.region.extract(frame.image())?;

        // Stage 1: the first frame only seeds the background.
        if !self.background.is_seeded() {
            self.background.seed(&gray)?;
            return Ok(FrameReport {
                frame,
                signal: None,
                events: Vec::new(),
                recording: self.is_recording(),
            });
        }

        // Stage 2: fold the frame into the background, then difference.
        self.background.update(&gray, self.alpha)?;
        let signal = self
            .detector
            .detect(&gray, self.background.current()?, self.region.origin())?;

        // Stage 3: outline what moved so the recording shows it.
        let frame = frame.with_motion(signal.motion);
        let frame = if self.annotate && signal.motion {
            frame.with_image(overlay::draw_regions(frame.image(), &signal.regions))
        } else {
            frame
        };

        // Stage 4: incident decisions.
        let events = self
            .incidents
            .step(signal.motion, frame.timestamp(), frame.clone());

        Ok(FrameReport {
            frame,
            signal: Some(signal),
            events,
            recording: self.is_recording(),
        })
    }

    /// Closes an open incident at the time of the last processed frame.
    pub fn finish(&mut self) -> Vec<Event> {
        match self.last_timestamp {
            Some(timestamp) => self.incidents.finish(timestamp),
            None => Vec::new(),
        }
    }

    fn check_order(&mut self, timestamp: Timestamp) -> Result<()> {
        if let Some(previous) = self.last_timestamp {
            if timestamp <= previous {
                return Err(VisionError::Timestamp {
                    previous: previous.to_rfc3339(),
                    current: timestamp.to_rfc3339(),
                });
            }
        }
        self.last_timestamp = Some(timestamp);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use image::{Rgb, RgbImage};

    fn config() -> WatchConfig {
        WatchConfig::from_json(
            r#"{
                "delta_thresh": 20,
                "min_area": 20,
                "min_upload_seconds": 10,
                "min_motion_frames": 2,
                "min_no_motion_frames": 2,
                "send_email": true,
                "notify_command": ["mail-snapshot"],
                "fps": 10,
                "resolution": [32, 32],
                "blur_sigma": 0.0
            }"#,
        )
        .unwrap()
    }

    fn frame(second: i64, square: Option<(u32, u32)>) -> Frame {
        let mut image = RgbImage::new(32, 32);
        if let Some((x, y)) = square {
            for py in y..y + 8 {
                for px in x..x + 8 {
                    image.put_pixel(px, py, Rgb([255, 255, 255]));
                }
            }
        }
        Frame::new(image, Local.timestamp_opt(1_700_000_000 + second, 0).unwrap())
    }

    #[test]
    fn first_frame_seeds_and_reports_nothing() {
        let mut pipeline = MotionPipeline::new(&config()).unwrap();
        let report = pipeline.process(frame(0, Some((4, 4)))).unwrap();

        assert!(report.is_seed());
        assert!(report.events.is_empty());
        assert!(pipeline.background().is_seeded());
        assert_eq!(report.status_text(), "No motion detected");
    }

    #[test]
    fn moving_square_starts_an_incident() {
        let mut pipeline = MotionPipeline::new(&config()).unwrap();
        pipeline.process(frame(0, None)).unwrap();

        let first = pipeline.process(frame(1, Some((2, 2)))).unwrap();
        assert!(first.motion());
        assert_eq!(first.status_text(), "Motion Detected");
        assert!(first.events.is_empty());

        let second = pipeline.process(frame(2, Some((20, 20)))).unwrap();
        assert!(matches!(
            second.events.first(),
            Some(IncidentEvent::BeginRecording { .. })
        ));
        assert!(second.recording);
        assert_eq!(second.frame.image().get_pixel(19, 19), &Rgb([0, 255, 0]));
        assert!(second.events.iter().any(|event| matches!(
            event,
            IncidentEvent::Frame(recorded) if recorded.motion()
        )));
    }

    #[test]
    fn out_of_order_timestamps_are_rejected() {
        let mut pipeline = MotionPipeline::new(&config()).unwrap();
        pipeline.process(frame(5, None)).unwrap();
        let err = pipeline.process(frame(5, None)).unwrap_err();
        assert!(matches!(err, VisionError::Timestamp { .. }));
    }

    #[test]
    fn finish_without_frames_is_silent() {
        let mut pipeline = MotionPipeline::new(&config()).unwrap();
        assert!(pipeline.finish().is_empty());
    }
}
