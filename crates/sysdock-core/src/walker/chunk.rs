//! Chunk buffer with a carried tail.
//!
//! Layout: `[ carry slot | read slot ]`. The carry slot holds the tail of the
//! previous window of the same region so that a pattern straddling two reads
//! is still seen in one contiguous window.
//!
//! The carry holds real bytes only; the first window of a region starts at
//! the region base with no zero padding, so nothing matches before it.

use crate::error::Result;
use crate::pattern::MAX_PATTERN_LEN;

/// Bytes carried from one window into the next.
///
/// The scanner only accepts a match at `i` when `i + len < window.len()`,
/// so a pattern of the maximum length needs the full length carried to be
/// found across a chunk boundary.
pub const OVERLAP_SIZE: usize = MAX_PATTERN_LEN;

/// Default number of bytes read per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 0x1000;

#[derive(Debug)]
pub struct ChunkBuffer {
    buf: Vec<u8>,
    overlap: usize,
    /// Real bytes at the end of the carry slot
    carried: usize,
    /// Bytes filled by the last read
    filled: usize,
}

impl ChunkBuffer {
    pub fn new(chunk_size: usize) -> Self {
        Self::with_overlap(chunk_size, OVERLAP_SIZE)
    }

    pub fn with_overlap(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            buf: vec![0; overlap + chunk_size],
            overlap,
            carried: 0,
            filled: 0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.buf.len() - self.overlap
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn carried(&self) -> usize {
        self.carried
    }

    /// Forget the carried tail. Called at the start of every region.
    pub fn reset(&mut self) {
        self.carried = 0;
        self.filled = 0;
    }

    /// Fill the first `len` bytes of the read slot with `read`.
    ///
    /// `len` is clamped to the chunk size. On error nothing is committed.
    pub fn fill<F>(&mut self, len: usize, read: F) -> Result<usize>
    where
        F: FnOnce(&mut [u8]) -> Result<()>,
    {
        let len = len.min(self.chunk_size());
        let start = self.overlap;
        read(&mut self.buf[start..start + len])?;
        self.filled = len;
        Ok(len)
    }

    /// Carried tail followed by the last read.
    pub fn window(&self) -> &[u8] {
        &self.buf[self.overlap - self.carried..self.overlap + self.filled]
    }

    /// Address of `window()[0]` given the address of the last read.
    pub fn window_base(&self, chunk_address: u64) -> u64 {
        chunk_address - self.carried as u64
    }

    /// Move the last `min(overlap, window len)` bytes of the window into the
    /// carry slot.
    pub fn carry_tail(&mut self) {
        let end = self.overlap + self.filled;
        let keep = self.overlap.min(self.carried + self.filled);
        self.buf.copy_within(end - keep..end, self.overlap - keep);
        self.carried = keep;
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn fill_from(buffer: &mut ChunkBuffer, bytes: &[u8]) {
        buffer
            .fill(bytes.len(), |slot| {
                slot.copy_from_slice(bytes);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_first_window_has_no_carry() {
        let mut buffer = ChunkBuffer::with_overlap(8, 4);
        fill_from(&mut buffer, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buffer.window(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(buffer.window_base(0x1000), 0x1000);
    }

    #[test]
    fn test_carry_tail_prefixes_next_window() {
        let mut buffer = ChunkBuffer::with_overlap(8, 4);
        fill_from(&mut buffer, &[1, 2, 3, 4, 5, 6, 7, 8]);
        buffer.carry_tail();
        assert_eq!(buffer.carried(), 4);

        fill_from(&mut buffer, &[9, 10]);
        assert_eq!(buffer.window(), &[5, 6, 7, 8, 9, 10]);
        assert_eq!(buffer.window_base(0x1008), 0x1004);
    }

    #[test]
    fn test_short_windows_accumulate_up_to_overlap() {
        let mut buffer = ChunkBuffer::with_overlap(2, 5);
        fill_from(&mut buffer, &[1, 2]);
        buffer.carry_tail();
        assert_eq!(buffer.carried(), 2);

        fill_from(&mut buffer, &[3, 4]);
        assert_eq!(buffer.window(), &[1, 2, 3, 4]);
        buffer.carry_tail();
        assert_eq!(buffer.carried(), 4);

        fill_from(&mut buffer, &[5, 6]);
        assert_eq!(buffer.window(), &[1, 2, 3, 4, 5, 6]);
        buffer.carry_tail();
        assert_eq!(buffer.carried(), 5);

        fill_from(&mut buffer, &[7]);
        assert_eq!(buffer.window(), &[2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_reset_drops_carry() {
        let mut buffer = ChunkBuffer::with_overlap(4, 4);
        fill_from(&mut buffer, &[1, 2, 3, 4]);
        buffer.carry_tail();
        buffer.reset();
        fill_from(&mut buffer, &[5]);
        assert_eq!(buffer.window(), &[5]);
    }

    #[test]
    fn test_failed_fill_commits_nothing() {
        let mut buffer = ChunkBuffer::with_overlap(4, 4);
        let err = buffer.fill(4, |_| {
            Err(Error::RegionReadFailed {
                address: 0,
                message: "denied".into(),
            })
        });
        assert!(err.is_err());
        assert!(buffer.window().is_empty());
    }

    #[test]
    fn test_fill_clamps_to_chunk_size() {
        let mut buffer = ChunkBuffer::new(16);
        assert_eq!(buffer.overlap(), OVERLAP_SIZE);
        let n = buffer.fill(100, |slot| {
            slot.fill(0xAA);
            Ok(())
        });
        assert_eq!(n.unwrap(), 16);
        assert_eq!(buffer.window().len(), 16);
    }
}
