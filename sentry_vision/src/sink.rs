//! Consumers of incident lifecycle events.
//!
//! The engine only decides *when* to record and notify. Writing video and
//! delivering snapshots happen behind [`RecordingSink`] and [`Notifier`], and
//! the [`EventDispatcher`] routes events to them. A sink failure is logged and
//! counted, and the stream carries on; it never feeds back into the incident
//! state.

use crate::core_modules::frame::{Frame, Timestamp};
use crate::core_modules::incident::IncidentEvent;
use crate::error::SinkError;
use image::codecs::jpeg::JpegEncoder;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;

const SNAPSHOT_JPEG_QUALITY: u8 = 90;

/// Persists the frames of one incident at a time.
pub trait RecordingSink {
    fn begin(&mut self, started_at: Timestamp) -> Result<(), SinkError>;
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError>;
    fn end(&mut self, ended_at: Timestamp) -> Result<(), SinkError>;
}

/// Delivers the still image of an incident once it is over.
pub trait Notifier {
    fn notify(&mut self, snapshot: &Frame) -> Result<(), SinkError>;
}

impl<T: RecordingSink + ?Sized> RecordingSink for Box<T> {
    fn begin(&mut self, started_at: Timestamp) -> Result<(), SinkError> {
        (**self).begin(started_at)
    }

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        (**self).write(frame)
    }

    fn end(&mut self, ended_at: Timestamp) -> Result<(), SinkError> {
        (**self).end(ended_at)
    }
}

impl<T: Notifier + ?Sized> Notifier for Box<T> {
    fn notify(&mut self, snapshot: &Frame) -> Result<(), SinkError> {
        (**self).notify(snapshot)
    }
}

/// Writes the snapshot as a JPEG into a directory.
#[derive(Debug, Clone)]
pub struct SnapshotNotifier {
    dir: PathBuf,
}

impl SnapshotNotifier {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Saves `snapshot` and returns where it went.
    pub fn save(&self, snapshot: &Frame) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.dir)?;
        let name = snapshot
            .timestamp()
            .format("snapshot-%Y%m%d-%H%M%S%.3f.jpg")
            .to_string();
        let path = self.dir.join(name);
        save_jpeg(&path, snapshot)?;
        Ok(path)
    }
}

impl Notifier for SnapshotNotifier {
    fn notify(&mut self, snapshot: &Frame) -> Result<(), SinkError> {
        let path = self.save(snapshot)?;
        log::info!("snapshot saved to {}", path.display());
        Ok(())
    }
}

/// Saves the snapshot, then runs an external program with the file path as its
/// last argument. Mail delivery lives in that program.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    snapshots: SnapshotNotifier,
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    pub fn new<P: Into<PathBuf>>(dir: P, command: &[String]) -> Result<Self, SinkError> {
        let (program, args) = command.split_first().ok_or_else(|| {
            SinkError::Notification("notify command is empty".to_string())
        })?;
        Ok(Self {
            snapshots: SnapshotNotifier::new(dir),
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Notifier for CommandNotifier {
    fn notify(&mut self, snapshot: &Frame) -> Result<(), SinkError> {
        let path = self.snapshots.save(snapshot)?;
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&path)
            .status()?;
        if !status.success() {
            return Err(SinkError::Notification(format!(
                "{} exited with {status}",
                self.program
            )));
        }
        log::info!("notification sent for {}", path.display());
        Ok(())
    }
}

fn save_jpeg(path: &Path, frame: &Frame) -> Result<(), SinkError> {
    let output = BufWriter::new(File::create(path)?);
    let mut encoder = JpegEncoder::new_with_quality(output, SNAPSHOT_JPEG_QUALITY);
    encoder.encode_image(frame.image())?;
    Ok(())
}

/// The snapshot as JPEG bytes, for notifiers that attach it instead of
/// writing it to disk.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, SinkError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, SNAPSHOT_JPEG_QUALITY).encode_image(frame.image())?;
    Ok(bytes)
}

/// Counters kept by the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub incidents_started: u64,
    pub incidents_ended: u64,
    pub frames_written: u64,
    pub notifications_sent: u64,
    pub sink_failures: u64,
}

/// Routes lifecycle events to the recording sink and the notifier.
pub struct EventDispatcher<R, N> {
    recorder: R,
    notifier: N,
    // Frames are dropped until the next incident if `begin` failed.
    recording_open: bool,
    stats: DispatchStats,
}

impl<R: RecordingSink, N: Notifier> EventDispatcher<R, N> {
    pub fn new(recorder: R, notifier: N) -> Self {
        Self {
            recorder,
            notifier,
            recording_open: false,
            stats: DispatchStats::default(),
        }
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn dispatch<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = IncidentEvent<Frame>>,
    {
        for event in events {
            self.dispatch_one(event);
        }
    }

    fn dispatch_one(&mut self, event: IncidentEvent<Frame>) {
        match event {
            IncidentEvent::BeginRecording { started_at } => {
                self.stats.incidents_started += 1;
                match self.recorder.begin(started_at) {
                    Ok(()) => self.recording_open = true,
                    Err(e) => {
                        self.recording_open = false;
                        self.failed("begin recording", &e);
                    }
                }
            }
            IncidentEvent::Frame(frame) => {
                if !self.recording_open {
                    return;
                }
                match self.recorder.write(&frame) {
                    Ok(()) => self.stats.frames_written += 1,
                    Err(e) => self.failed("write frame", &e),
                }
            }
            IncidentEvent::EndRecording { ended_at } => {
                self.stats.incidents_ended += 1;
                if !std::mem::take(&mut self.recording_open) {
                    return;
                }
                match self.recorder.end(ended_at) {
                    Ok(()) => log::info!("[VIDEO SAVED] {}", ended_at.format("%A %d %B %Y %I:%M:%S%p")),
                    Err(e) => self.failed("finish recording", &e),
                }
            }
            IncidentEvent::Notify { snapshot } => match self.notifier.notify(&snapshot) {
                Ok(()) => self.stats.notifications_sent += 1,
                Err(e) => self.failed("notify", &e),
            },
        }
    }

    fn failed(&mut self, action: &str, error: &SinkError) {
        self.stats.sink_failures += 1;
        log::error!("failed to {action}: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use image::RgbImage;

    fn frame(second: i64) -> Frame {
        Frame::new(
            RgbImage::new(4, 4),
            Local.timestamp_opt(1_700_000_000 + second, 0).unwrap(),
        )
    }

    #[derive(Default)]
    struct Tape {
        log: Vec<String>,
        fail_begin: bool,
    }

    impl RecordingSink for Tape {
        fn begin(&mut self, _started_at: Timestamp) -> Result<(), SinkError> {
            if self.fail_begin {
                return Err(SinkError::Recording("disk full".to_string()));
            }
            self.log.push("begin".to_string());
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
            self.log.push(format!("frame {}", frame.timestamp().timestamp() - 1_700_000_000));
            Ok(())
        }

        fn end(&mut self, _ended_at: Timestamp) -> Result<(), SinkError> {
            self.log.push("end".to_string());
            Ok(())
        }
    }

    struct Flaky {
        attempts: u32,
    }

    impl Notifier for Flaky {
        fn notify(&mut self, _snapshot: &Frame) -> Result<(), SinkError> {
            self.attempts += 1;
            Err(SinkError::Notification("smtp unreachable".to_string()))
        }
    }

    fn incident(first: i64, last: i64) -> Vec<IncidentEvent<Frame>> {
        let mut events = vec![IncidentEvent::BeginRecording {
            started_at: frame(first).timestamp(),
        }];
        events.extend((first..=last).map(|s| IncidentEvent::Frame(frame(s))));
        events.push(IncidentEvent::EndRecording {
            ended_at: frame(last).timestamp(),
        });
        events.push(IncidentEvent::Notify { snapshot: frame(first) });
        events
    }

    #[test]
    fn events_reach_the_recorder_in_order() {
        let mut dispatcher = EventDispatcher::new(Tape::default(), Flaky { attempts: 0 });
        dispatcher.dispatch(incident(1, 3));

        assert_eq!(
            dispatcher.recorder().log,
            vec!["begin", "frame 1", "frame 2", "frame 3", "end"]
        );
        let stats = dispatcher.stats();
        assert_eq!(stats.frames_written, 3);
        assert_eq!(stats.incidents_ended, 1);
    }

    #[test]
    fn notifier_failure_is_counted_not_fatal() {
        let mut dispatcher = EventDispatcher::new(Tape::default(), Flaky { attempts: 0 });
        dispatcher.dispatch(incident(1, 2));
        dispatcher.dispatch(incident(10, 11));

        assert_eq!(dispatcher.notifier().attempts, 2);
        assert_eq!(dispatcher.stats().sink_failures, 2);
        assert_eq!(dispatcher.stats().notifications_sent, 0);
        assert_eq!(dispatcher.stats().incidents_started, 2);
    }

    #[test]
    fn frames_are_skipped_when_begin_failed() {
        let tape = Tape {
            fail_begin: true,
            ..Tape::default()
        };
        let mut dispatcher = EventDispatcher::new(tape, Flaky { attempts: 0 });
        dispatcher.dispatch(incident(1, 4));

        assert!(dispatcher.recorder().log.is_empty());
        assert_eq!(dispatcher.stats().frames_written, 0);
        // One failed begin plus one failed notification.
        assert_eq!(dispatcher.stats().sink_failures, 2);
    }

    #[test]
    fn snapshot_notifier_writes_a_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let mut notifier = SnapshotNotifier::new(dir.path().join("shots"));
        notifier.notify(&frame(0)).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path().join("shots"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].extension().unwrap(), "jpg");
        let decoded = image::open(&entries[0]).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandNotifier::new(".", &[]).is_err());
    }

    #[test]
    fn encoded_snapshot_is_a_jpeg_of_the_frame() {
        let bytes = encode_jpeg(&frame(0)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }
}
