//! # Delay Buffer (Ring Buffer)
//!
//! A delay buffer stores past audio samples so they can be read back a
//! fixed number of samples later. Every tap of the multi-tap delay reads
//! from the same buffer; only the distance behind the write head differs.
//!
//! ## How the Ring Works
//!
//! Picture a circular tape loop with one write head and several read
//! heads trailing behind it. In code the tape is a `Vec<f32>` and the
//! write head is an index. For each audio sample:
//!
//! 1. Every tap reads from `(write_pos - delay)`, wrapping around the
//!    start of the buffer.
//! 2. The new sample (input plus feedback) is written at `write_pos`.
//! 3. `write_pos` advances by one, wrapping back to 0 at the end.
//!
//! Reads happen *before* the write, so the slot at `write_pos` still holds
//! the sample written `capacity` samples ago. That makes every delay from
//! 1 up to and including `capacity` a valid read.
//!
//! ## Out-of-range delays
//!
//! - A delay of 0 would read the slot that is about to be written, i.e. a
//!   sample from the future. It reads as silence.
//! - A delay longer than the buffer is clamped to `capacity`, the oldest
//!   sample still held, instead of wrapping around to some arbitrary slot.

use std::collections::TryReserveError;
use std::num::NonZeroUsize;

/// A fixed-capacity ring buffer of audio samples for one channel.
///
/// Allocated once, outside the audio thread. Nothing in here allocates
/// afterwards.
pub struct DelayBuffer {
    /// Stored samples. All values start at 0.0 (silence).
    buffer: Vec<f32>,

    /// Where the next sample will be written.
    write_pos: usize,
}

impl DelayBuffer {
    /// Create a silent delay buffer holding `capacity` samples.
    ///
    /// For a 2-second delay at 44100 Hz, that's 88200 samples (about 350 KB).
    /// `NonZeroUsize` rules out the zero-length buffer, which would make the
    /// modular arithmetic below divide by zero.
    ///
    /// Fails instead of aborting when the allocator can't provide the memory.
    pub fn new(capacity: NonZeroUsize) -> Result<Self, TryReserveError> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(capacity.get())?;
        buffer.resize(capacity.get(), 0.0);

        Ok(Self {
            buffer,
            write_pos: 0,
        })
    }

    /// How many past samples this buffer holds. Also the longest readable delay.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Read the sample written `delay_samples` samples ago.
    ///
    /// ```text
    /// read_index = (write_pos + capacity - delay) % capacity
    /// ```
    ///
    /// Adding `capacity` before subtracting keeps the `usize` from going
    /// negative.
    pub fn read(&self, delay_samples: usize) -> f32 {
        if delay_samples == 0 {
            return 0.0;
        }

        let capacity = self.buffer.len();
        let delay = delay_samples.min(capacity);
        let index = (self.write_pos + capacity - delay) % capacity;

        self.buffer[index]
    }

    /// Write a sample at the current write position.
    ///
    /// Does NOT advance. Call [`advance()`](Self::advance) once all taps
    /// have been read and the new sample written.
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
    }

    /// Move the write head forward one sample, wrapping at the end.
    pub fn advance(&mut self) {
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Fill the buffer with silence and rewind the write head.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    #[cfg(test)]
    pub(crate) fn is_silent(&self) -> bool {
        self.write_pos == 0 && self.buffer.iter().all(|&s| s == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(capacity: usize) -> DelayBuffer {
        DelayBuffer::new(NonZeroUsize::new(capacity).unwrap()).unwrap()
    }

    #[test]
    fn test_impossible_capacity_is_an_error() {
        assert!(DelayBuffer::new(NonZeroUsize::MAX).is_err());
    }

    #[test]
    fn test_write_and_read_exact() {
        let mut db = buffer(100);

        db.write(0.75);
        db.advance();

        let result = db.read(1);
        assert!((result - 0.75).abs() < 1e-6, "Expected 0.75, got {result}");
    }

    /// Write positions wrap; the buffer keeps the last `capacity` values.
    #[test]
    fn test_wrapping() {
        let mut db = buffer(4);

        for i in 0..6 {
            db.write(i as f32);
            db.advance();
        }

        // write_pos = 6 % 4 = 2, contents [4.0, 5.0, 2.0, 3.0]
        assert_eq!(db.read(1), 5.0);
        assert_eq!(db.read(2), 4.0);
        assert_eq!(db.read(3), 3.0);
        assert_eq!(db.read(4), 2.0);
    }

    #[test]
    fn test_zero_delay_reads_silence() {
        let mut db = buffer(8);

        db.write(1.0);
        assert_eq!(db.read(0), 0.0);
        db.advance();
        assert_eq!(db.read(0), 0.0);
    }

    /// Reading further back than the buffer holds gives the oldest sample.
    #[test]
    fn test_delay_beyond_capacity_is_clamped() {
        let mut db = buffer(4);

        for i in 1..=4 {
            db.write(i as f32);
            db.advance();
        }

        assert_eq!(db.read(4), 1.0);
        assert_eq!(db.read(5), 1.0);
        assert_eq!(db.read(usize::MAX), 1.0);
    }

    /// Every delay in 1..=capacity lands on a distinct, valid slot.
    #[test]
    fn test_full_capacity_is_readable() {
        let capacity = 96;
        let mut db = buffer(capacity);

        for i in 1..=capacity {
            db.write(i as f32);
            db.advance();
        }

        for delay in 1..=capacity {
            let expected = (capacity + 1 - delay) as f32;
            assert_eq!(db.read(delay), expected, "delay {delay}");
        }
    }

    #[test]
    fn test_clear() {
        let mut db = buffer(10);

        db.write(0.5);
        db.advance();
        db.clear();

        assert!(db.is_silent());
        assert_eq!(db.read(1), 0.0);
    }

    #[test]
    fn test_fifo_sequence() {
        let mut db = buffer(10);

        for i in 1..=5 {
            db.write(i as f32);
            db.advance();
        }

        // Most recent first.
        assert_eq!(db.read(1), 5.0);
        assert_eq!(db.read(2), 4.0);
        assert_eq!(db.read(3), 3.0);
        assert_eq!(db.read(4), 2.0);
        assert_eq!(db.read(5), 1.0);
    }
}
