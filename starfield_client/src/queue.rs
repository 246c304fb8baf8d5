//! Frame queue.
//!
//! The server hands out frames in batches; the client replays them one per
//! animation step. The queue itself has no hard cap. Buffering is bounded by
//! the request throttle instead: no new batch is asked for while the queue
//! holds more than `throttle` frames.

use std::collections::VecDeque;

use starfield_shared::net::Frame;

/// FIFO of frames waiting to be animated.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: VecDeque<Frame>,
    throttle: usize,
}

impl FrameQueue {
    pub fn new(throttle: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            throttle,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    /// Appends a batch, preserving its order.
    pub fn extend<I: IntoIterator<Item = Frame>>(&mut self, frames: I) {
        self.frames.extend(frames);
    }

    /// Removes the oldest frame.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Returns the number of buffered frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns true if no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// True while the queue is shallow enough to ask for more.
    pub fn wants_more(&self) -> bool {
        self.frames.len() <= self.throttle
    }
}
