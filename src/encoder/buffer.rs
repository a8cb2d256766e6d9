//! Fixed-capacity PCM arenas exchanged between the pipeline and an encoder.

use std::io::{self, Read};

use crate::error::{Result, TranscodeError};

/// A byte arena of fixed capacity with an explicit valid length.
///
/// The backing allocation never grows; refilling reuses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl PcmBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Shorten the valid region; longer values are ignored.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Replace the contents with `bytes`.
    pub fn copy_from(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.capacity() {
            return Err(TranscodeError::EncodeFailure(format!(
                "chunk of {} bytes exceeds input slot capacity {}",
                bytes.len(),
                self.capacity()
            )));
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }

    /// Read up to `max` bytes (bounded by capacity), stopping early only at EOF.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R, max: usize) -> io::Result<usize> {
        let want = max.min(self.capacity());
        self.len = 0;
        while self.len < want {
            match reader.read(&mut self.data[self.len..want]) {
                Ok(0) => break,
                Ok(n) => self.len += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(self.len)
    }
}

/// An input arena lent out by an encoder session.
#[derive(Debug)]
pub struct InputSlot {
    index: usize,
    buffer: PcmBuffer,
}

impl InputSlot {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn buffer(&self) -> &PcmBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut PcmBuffer {
        &mut self.buffer
    }
}

/// A fixed set of input arenas.
#[derive(Debug)]
pub struct SlotPool {
    free: Vec<InputSlot>,
    total: usize,
    slot_bytes: usize,
}

impl SlotPool {
    pub fn new(slots: usize, slot_bytes: usize) -> Self {
        let free = (0..slots)
            .rev()
            .map(|index| InputSlot {
                index,
                buffer: PcmBuffer::with_capacity(slot_bytes),
            })
            .collect();
        Self {
            free,
            total: slots,
            slot_bytes,
        }
    }

    /// Lend out a free slot, emptied.
    pub fn acquire(&mut self) -> Option<InputSlot> {
        let mut slot = self.free.pop()?;
        slot.buffer.clear();
        Some(slot)
    }

    /// Return a slot to the pool.
    pub fn release(&mut self, slot: InputSlot) -> Result<()> {
        if slot.index >= self.total
            || slot.buffer.capacity() != self.slot_bytes
            || self.free.iter().any(|s| s.index == slot.index)
        {
            return Err(TranscodeError::EncodeFailure(format!(
                "input slot {} does not belong to this session",
                slot.index
            )));
        }
        self.free.push(slot);
        Ok(())
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_respects_capacity() {
        let mut buf = PcmBuffer::with_capacity(4);
        buf.copy_from(&[1, 2, 3]).unwrap();
        assert_eq!(buf.as_bytes(), &[1, 2, 3]);
        assert!(buf.copy_from(&[0; 5]).is_err());
        // a rejected copy leaves the previous contents alone
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_fill_stops_at_eof() {
        let mut buf = PcmBuffer::with_capacity(8);
        let mut src: &[u8] = &[9, 8, 7];
        assert_eq!(buf.fill_from(&mut src, 8).unwrap(), 3);
        assert_eq!(buf.as_bytes(), &[9, 8, 7]);
        assert_eq!(buf.fill_from(&mut src, 8).unwrap(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_fill_bounded_by_max() {
        let mut buf = PcmBuffer::with_capacity(8);
        let mut src: &[u8] = &[1; 16];
        assert_eq!(buf.fill_from(&mut src, 6).unwrap(), 6);
        assert_eq!(buf.fill_from(&mut src, 100).unwrap(), 8);
    }

    #[test]
    fn test_pool_lends_each_slot_once() {
        let mut pool = SlotPool::new(2, 16);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_ne!(a.index(), b.index());

        pool.release(a).unwrap();
        assert_eq!(pool.available(), 1);
        let c = pool.acquire().unwrap();
        assert!(c.buffer().is_empty());
    }

    #[test]
    fn test_pool_rejects_foreign_slot() {
        let mut pool = SlotPool::new(1, 16);
        let mut other = SlotPool::new(4, 16);
        let _ = other.acquire();
        let foreign = other.acquire().unwrap();
        assert_eq!(foreign.index(), 1);
        assert!(pool.release(foreign).is_err());
    }
}
