use crate::core_modules::frame::Frame;
use crate::error::Result;
use std::collections::VecDeque;

/// Anything that hands out timestamped frames in capture order.
///
/// `Ok(None)` means the stream is over. A frame with no pixels means the
/// device answered but had nothing to give; a failure to answer at all is an
/// `Err`.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}

/// Replays a prepared sequence of frames and failures, for tests and for
/// re-running a logged session.
#[derive(Debug, Default)]
pub struct ReplaySource {
    queue: VecDeque<Result<Frame>>,
}

impl ReplaySource {
    pub fn new<I: IntoIterator<Item = Result<Frame>>>(items: I) -> Self {
        Self {
            queue: items.into_iter().collect(),
        }
    }

    pub fn from_frames<I: IntoIterator<Item = Frame>>(frames: I) -> Self {
        Self::new(frames.into_iter().map(Ok))
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.queue.pop_front().transpose()
    }
}
