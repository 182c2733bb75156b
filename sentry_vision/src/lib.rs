// THEORY:
// This file is the entry point for the `sentry_vision` library crate. It
// exports the `MotionPipeline` and the pieces around it (configuration, frame
// sources, sinks and the stream runner) as the interface of the engine. The
// stage implementations live in `core_modules`; most consumers only need the
// re-exports below.
//
// The crate never opens a camera or writes a video file itself. Those are the
// job of the front-end (`sentry_cam`), which plugs into `FrameSource` and
// `RecordingSink`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod sink;
pub mod source;

pub use config::{EmailSettings, WatchConfig};
pub use core_modules::frame::{Frame, Timestamp};
pub use error::{Result, SinkError, VisionError};
pub use pipeline::{Event, FrameReport, MotionPipeline};
pub use runner::{RunSummary, StopReason, StreamRunner};
pub use sink::{CommandNotifier, EventDispatcher, Notifier, RecordingSink, SnapshotNotifier};
pub use source::{FrameSource, ReplaySource};
