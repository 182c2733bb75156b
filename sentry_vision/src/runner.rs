// THEORY:
// The runner is the processing loop: acquire, process, dispatch, repeat. It is
// single-threaded and synchronous; a frame is completely handled before the
// next one is requested. The only thing that may block is the frame source.
//
// Three ways out of the loop, all of which close an in-progress incident first
// so a recording is never left half-written:
// - the source reports end of stream,
// - the shutdown flag is raised (checked once per iteration),
// - a fatal error (acquisition failure or a frame the pipeline cannot
//   process), which is returned after the incident is closed.

use crate::core_modules::frame::Frame;
use crate::error::Result;
use crate::pipeline::{FrameReport, MotionPipeline};
use crate::sink::{DispatchStats, EventDispatcher, Notifier, RecordingSink};
use crate::source::FrameSource;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub frames_processed: u64,
    pub empty_frames: u64,
    pub dispatch: DispatchStats,
}

pub struct StreamRunner<'a, S, R, N> {
    source: S,
    pipeline: MotionPipeline,
    dispatcher: EventDispatcher<R, N>,
    shutdown: &'a AtomicBool,
    frames_processed: u64,
    empty_frames: u64,
}

impl<'a, S, R, N> StreamRunner<'a, S, R, N>
where
    S: FrameSource,
    R: RecordingSink,
    N: Notifier,
{
    pub fn new(
        source: S,
        pipeline: MotionPipeline,
        dispatcher: EventDispatcher<R, N>,
        shutdown: &'a AtomicBool,
    ) -> Self {
        Self {
            source,
            pipeline,
            dispatcher,
            shutdown,
            frames_processed: 0,
            empty_frames: 0,
        }
    }

    pub fn pipeline(&self) -> &MotionPipeline {
        &self.pipeline
    }

    pub fn dispatcher(&self) -> &EventDispatcher<R, N> {
        &self.dispatcher
    }

    /// Runs until end of stream, shutdown or a fatal error. `observer` sees
    /// every processed frame after its events have been dispatched.
    pub fn run<O>(&mut self, mut observer: O) -> Result<RunSummary>
    where
        O: FnMut(&FrameReport),
    {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                log::info!("shutdown requested");
                return Ok(self.close(StopReason::Shutdown));
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("end of stream");
                    return Ok(self.close(StopReason::EndOfStream));
                }
                Err(e) => return Err(self.abort(e)),
            };

            if frame.is_empty() {
                self.empty_frames += 1;
                log::warn!("skipping empty frame from {}", frame.timestamp());
                continue;
            }

            match self.step(frame) {
                Ok(report) => observer(&report),
                Err(e) => return Err(self.abort(e)),
            }
        }
    }

    fn step(&mut self, frame: Frame) -> Result<FrameReport> {
        let report = self.pipeline.process(frame)?;
        self.frames_processed += 1;
        self.dispatcher.dispatch(report.events.iter().cloned());
        Ok(report)
    }

    fn close(&mut self, stop_reason: StopReason) -> RunSummary {
        self.dispatcher.dispatch(self.pipeline.finish());
        RunSummary {
            stop_reason,
            frames_processed: self.frames_processed,
            empty_frames: self.empty_frames,
            dispatch: self.dispatcher.stats(),
        }
    }

    fn abort<E: std::fmt::Display>(&mut self, error: E) -> E {
        log::error!("stopping: {error}");
        self.dispatcher.dispatch(self.pipeline.finish());
        error
    }
}
