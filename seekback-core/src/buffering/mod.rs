//! Fixed-capacity circular store of the most recent audio frames.
//!
//! Frames are stored back to back in one flat `Vec<Sample>` allocated at
//! construction, so writing a frame is a single `copy_from_slice` and never
//! allocates. Once `capacity` frames have been written the oldest frame is
//! silently evicted on every write.
//!
//! ```text
//!   before first wrap          after wrap (is_full)
//!   [f0 f1 f2 .. .. ..]        [f6 f7 f2 f3 f4 f5]
//!    ^oldest   ^write                ^write/oldest
//! ```

pub mod frame;

use crate::error::{Result, SeekbackError};
use frame::Sample;

/// Point-in-time description of the valid span of a [`FrameRing`].
///
/// Both ends are slot indices; `end_inclusive` may be smaller than `start`
/// when the span wraps past the end of the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotRange {
    pub start: usize,
    pub end_inclusive: usize,
    /// Number of frames covered (1..=capacity).
    pub len: usize,
}

/// Ring buffer of audio frames with a single writer.
#[derive(Debug)]
pub struct FrameRing {
    slots: Vec<Sample>,
    frame_size: usize,
    capacity: usize,
    write_index: usize,
    oldest_index: usize,
    is_full: bool,
}

impl FrameRing {
    /// Allocate `capacity` zeroed slots of `frame_size` samples each.
    ///
    /// # Errors
    /// `SeekbackError::Config` when either dimension is zero or the total
    /// sample count overflows `usize`.
    pub fn new(capacity: usize, frame_size: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SeekbackError::Config(
                "ring buffer capacity must be at least one frame".into(),
            ));
        }
        if frame_size == 0 {
            return Err(SeekbackError::Config(
                "frame size must be at least one sample".into(),
            ));
        }
        let total = capacity.checked_mul(frame_size).ok_or_else(|| {
            SeekbackError::Config(format!(
                "ring buffer of {capacity} frames x {frame_size} samples is too large"
            ))
        })?;

        Ok(Self {
            slots: vec![0; total],
            frame_size,
            capacity,
            write_index: 0,
            oldest_index: 0,
            is_full: false,
        })
    }

    /// Store `frame` in the current write slot and advance.
    ///
    /// `frame` must hold exactly `frame_size` samples.
    pub fn write(&mut self, frame: &[Sample]) {
        debug_assert_eq!(frame.len(), self.frame_size);
        let base = self.write_index * self.frame_size;
        self.slots[base..base + self.frame_size].copy_from_slice(frame);

        let was_full = self.is_full;
        self.write_index = (self.write_index + 1) % self.capacity;
        if was_full {
            self.oldest_index = (self.oldest_index + 1) % self.capacity;
        } else if self.write_index == 0 {
            self.is_full = true;
        }
    }

    /// The currently valid span, or `None` before the first write.
    pub fn snapshot_range(&self) -> Option<SnapshotRange> {
        if self.is_full {
            Some(SnapshotRange {
                start: self.oldest_index,
                end_inclusive: (self.write_index + self.capacity - 1) % self.capacity,
                len: self.capacity,
            })
        } else if self.write_index == 0 {
            None
        } else {
            Some(SnapshotRange {
                start: 0,
                end_inclusive: self.write_index - 1,
                len: self.write_index,
            })
        }
    }

    /// Iterate the frames of `range` in capture order, wrapping modulo the
    /// capacity.
    pub fn frames(&self, range: SnapshotRange) -> impl Iterator<Item = &[Sample]> + '_ {
        (0..range.len).map(move |offset| self.frame((range.start + offset) % self.capacity))
    }

    /// Samples of the frame stored in slot `index`.
    pub fn frame(&self, index: usize) -> &[Sample] {
        let base = index * self.frame_size;
        &self.slots[base..base + self.frame_size]
    }

    /// Number of valid frames.
    pub fn len(&self) -> usize {
        if self.is_full {
            self.capacity
        } else {
            self.write_index
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn is_full(&self) -> bool {
        self.is_full
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    pub fn oldest_index(&self) -> usize {
        self.oldest_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(i: i32, frame_size: usize) -> Vec<Sample> {
        (0..frame_size as i32).map(|s| i * frame_size as i32 + s).collect()
    }

    fn collect(ring: &FrameRing) -> Vec<Vec<Sample>> {
        match ring.snapshot_range() {
            Some(range) => ring.frames(range).map(<[Sample]>::to_vec).collect(),
            None => Vec::new(),
        }
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(FrameRing::new(0, 4), Err(SeekbackError::Config(_))));
        assert!(matches!(FrameRing::new(4, 0), Err(SeekbackError::Config(_))));
    }

    #[test]
    fn empty_ring_has_no_snapshot() {
        let ring = FrameRing::new(4, 2).unwrap();
        assert_eq!(ring.snapshot_range(), None);
        assert!(ring.is_empty());
        assert!(!ring.is_full());
    }

    #[test]
    fn partial_fill_covers_written_frames_in_order() {
        let mut ring = FrameRing::new(8, 3).unwrap();
        for i in 0..5 {
            ring.write(&numbered(i, 3));
        }
        let range = ring.snapshot_range().unwrap();
        assert_eq!((range.start, range.end_inclusive, range.len), (0, 4, 5));
        assert!(!ring.is_full());
        let expected: Vec<_> = (0..5).map(|i| numbered(i, 3)).collect();
        assert_eq!(collect(&ring), expected);
    }

    #[test]
    fn exactly_full_keeps_oldest_at_zero() {
        let mut ring = FrameRing::new(4, 1).unwrap();
        for i in 0..4 {
            ring.write(&[i]);
        }
        assert!(ring.is_full());
        assert_eq!(ring.write_index(), 0);
        assert_eq!(ring.oldest_index(), 0);
        let range = ring.snapshot_range().unwrap();
        assert_eq!((range.start, range.end_inclusive, range.len), (0, 3, 4));
        assert_eq!(collect(&ring), vec![vec![0], vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn wraparound_keeps_most_recent_frames() {
        for capacity in 1..6usize {
            for extra in 0..(3 * capacity) {
                let mut ring = FrameRing::new(capacity, 2).unwrap();
                let total = capacity + extra;
                for i in 0..total {
                    ring.write(&numbered(i as i32, 2));
                }
                let expected: Vec<_> = (extra..total).map(|i| numbered(i as i32, 2)).collect();
                assert_eq!(collect(&ring), expected, "capacity={capacity} extra={extra}");
                assert_eq!(ring.len(), capacity);
                assert!(ring.write_index() < capacity);
                assert!(ring.oldest_index() < capacity);
            }
        }
    }

    #[test]
    fn fifteen_frames_into_ten_slots() {
        let mut ring = FrameRing::new(10, 2).unwrap();
        for i in 0..15 {
            ring.write(&[2 * i, 2 * i + 1]);
        }
        let range = ring.snapshot_range().unwrap();
        assert_eq!(range.start, 5);
        assert_eq!(range.end_inclusive, 4);
        assert_eq!(range.len, 10);

        let flat: Vec<Sample> = ring.frames(range).flatten().copied().collect();
        let expected: Vec<Sample> = (10..30).collect();
        assert_eq!(flat, expected);
    }
}
