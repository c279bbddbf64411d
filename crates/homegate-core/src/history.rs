use std::collections::VecDeque;

use crate::frame::DecodedFrame;

/// Number of recent frames retained for motion comparison.
pub const FRAME_HISTORY_CAPACITY: usize = 5;

/// Fixed-capacity FIFO of the most recently analyzed frames.
///
/// Frames are only ever appended at the tail; once full, each append evicts
/// the oldest frame.
#[derive(Debug, Default)]
pub struct FrameHistory {
    frames: VecDeque<DecodedFrame>,
}

impl FrameHistory {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::with_capacity(FRAME_HISTORY_CAPACITY),
        }
    }

    /// Take ownership of `frame`, evicting the oldest entry when full.
    pub fn push(&mut self, frame: DecodedFrame) {
        while self.frames.len() >= FRAME_HISTORY_CAPACITY {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// The most recently appended frame.
    pub fn latest(&self) -> Option<&DecodedFrame> {
        self.frames.back()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Frames in append order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DecodedFrame> {
        self.frames.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1×1 frame tagged by its red channel.
    fn tagged(tag: u8) -> DecodedFrame {
        DecodedFrame::solid(1, 1, [tag, 0, 0, 255])
    }

    #[test]
    fn test_starts_empty() {
        let history = FrameHistory::new();
        assert!(history.is_empty());
        assert!(history.latest().is_none());
    }

    #[test]
    fn test_sixth_append_evicts_oldest() {
        let mut history = FrameHistory::new();
        for tag in 1..=6 {
            history.push(tagged(tag));
        }
        assert_eq!(history.len(), FRAME_HISTORY_CAPACITY);
        let tags: Vec<u8> = history.iter().map(|f| f.data()[0]).collect();
        assert_eq!(tags, vec![2, 3, 4, 5, 6]);
        assert_eq!(history.latest().map(|f| f.data()[0]), Some(6));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut history = FrameHistory::new();
        for tag in 0..50 {
            history.push(tagged(tag));
            assert!(history.len() <= FRAME_HISTORY_CAPACITY);
        }
    }

    #[test]
    fn test_clear() {
        let mut history = FrameHistory::new();
        history.push(tagged(1));
        history.push(tagged(2));
        history.clear();
        assert_eq!(history.len(), 0);
    }
}
