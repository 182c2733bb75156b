//! Incident recordings as AVI files written with OpenCV's `VideoWriter`.

use crate::convert;
use opencv::{
    core::{Mat, Size},
    imgproc,
    prelude::*,
    videoio::VideoWriter,
};
use sentry_vision::{Frame, RecordingSink, SinkError, Timestamp};
use std::path::PathBuf;

const FILE_NAME_FORMAT: &str = "%A-%d-%B-%Y-%I-%M-%S%p.avi";

pub struct AviRecorder {
    output_dir: PathBuf,
    fourcc: [char; 4],
    fps: f64,
    size: Size,
    writer: Option<(VideoWriter, PathBuf)>,
}

impl AviRecorder {
    pub fn new(output_dir: PathBuf, fourcc: &str, fps: u32, resolution: [u32; 2]) -> Result<Self, SinkError> {
        let code: Vec<char> = fourcc.chars().collect();
        let fourcc: [char; 4] = code
            .try_into()
            .map_err(|_| SinkError::Recording(format!("fourcc {fourcc:?} is not four characters")))?;
        Ok(Self {
            output_dir,
            fourcc,
            fps: f64::from(fps),
            size: Size::new(resolution[0] as i32, resolution[1] as i32),
            writer: None,
        })
    }

    fn encode(&self, frame: &Frame) -> opencv::Result<Mat> {
        let stamped = convert::stamp(frame)?;
        if stamped.size()? == self.size {
            return Ok(stamped);
        }
        let mut resized = Mat::default();
        imgproc::resize(&stamped, &mut resized, self.size, 0.0, 0.0, imgproc::INTER_LINEAR)?;
        Ok(resized)
    }
}

impl RecordingSink for AviRecorder {
    fn begin(&mut self, started_at: Timestamp) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(started_at.format(FILE_NAME_FORMAT).to_string());
        let [a, b, c, d] = self.fourcc;
        let code = VideoWriter::fourcc(a, b, c, d).map_err(recording)?;
        let writer = VideoWriter::new(&path.to_string_lossy(), code, self.fps, self.size, true)
            .map_err(recording)?;
        if !writer.is_opened().map_err(recording)? {
            return Err(SinkError::Recording(format!("cannot open {} for writing", path.display())));
        }
        log::info!("recording to {}", path.display());
        self.writer = Some((writer, path));
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let mat = self.encode(frame).map_err(recording)?;
        let (writer, _) = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Recording("no recording in progress".to_string()))?;
        writer.write(&mat).map_err(recording)
    }

    fn end(&mut self, _ended_at: Timestamp) -> Result<(), SinkError> {
        let (mut writer, path) = self
            .writer
            .take()
            .ok_or_else(|| SinkError::Recording("no recording in progress".to_string()))?;
        writer.release().map_err(recording)?;
        log::debug!("closed {}", path.display());
        Ok(())
    }
}

fn recording(error: opencv::Error) -> SinkError {
    SinkError::Recording(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use image::RgbImage;

    #[test]
    fn recorded_frames_are_stamped_and_sized_for_the_writer() {
        let recorder = AviRecorder::new(PathBuf::from("."), "XVID", 10, [80, 60]).unwrap();
        let frame = Frame::new(RgbImage::new(160, 120), Local::now()).with_motion(true);

        let mat = recorder.encode(&frame).unwrap();
        assert_eq!(mat.size().unwrap(), Size::new(80, 60));

        // BGR: the red labels show up in the third channel.
        let bytes = mat.data_bytes().unwrap();
        let width = 80 * 3;
        let status_band = &bytes[3 * width..13 * width];
        assert!(status_band.chunks(3).any(|bgr| bgr[2] > 0));
    }

    #[test]
    fn fourcc_must_be_four_characters() {
        assert!(AviRecorder::new(PathBuf::from("."), "XVI", 10, [80, 60]).is_err());
    }
}
