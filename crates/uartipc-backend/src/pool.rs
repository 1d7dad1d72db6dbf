use tracing::warn;
use uartipc_transport::RxBuffer;

use crate::error::{BackendError, Result};

/// Fixed set of equally sized receive buffers lent to the link.
///
/// All memory is obtained up front; lending and reclaiming never allocate.
#[derive(Debug)]
pub struct RxBufferPool {
    free: Vec<RxBuffer>,
    capacity: usize,
    block_size: usize,
}

impl RxBufferPool {
    /// Allocate `capacity` buffers of `block_size` bytes.
    pub fn new(capacity: usize, block_size: usize) -> Result<Self> {
        let mut free = Vec::new();
        free.try_reserve_exact(capacity)
            .map_err(|_| BackendError::OutOfMemory)?;
        for _ in 0..capacity {
            free.push(RxBuffer::try_new(block_size).ok_or(BackendError::OutOfMemory)?);
        }
        Ok(Self {
            free,
            capacity,
            block_size,
        })
    }

    /// Take a free buffer, if any.
    pub fn acquire(&mut self) -> Option<RxBuffer> {
        self.free.pop()
    }

    /// Return a buffer previously taken from this pool.
    ///
    /// Buffers of the wrong size, or beyond the pool's capacity, are dropped.
    pub fn release(&mut self, buffer: RxBuffer) {
        if buffer.capacity() != self.block_size {
            warn!(
                size = buffer.capacity(),
                expected = self.block_size,
                "dropping foreign receive buffer"
            );
            return;
        }
        if self.free.len() >= self.capacity {
            warn!("receive buffer released twice, dropping");
            return;
        }
        self.free.push(buffer);
    }

    /// Buffers currently available.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lends_until_exhausted() {
        let mut pool = RxBufferPool::new(2, 73).unwrap();
        assert_eq!(pool.available(), 2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.capacity(), 73);
        assert!(pool.acquire().is_none());

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn never_grows_past_capacity() {
        let mut pool = RxBufferPool::new(1, 8).unwrap();
        pool.release(RxBuffer::try_new(8).unwrap());
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn drops_foreign_sizes() {
        let mut pool = RxBufferPool::new(1, 8).unwrap();
        let _held = pool.acquire().unwrap();
        pool.release(RxBuffer::try_new(16).unwrap());
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn allocation_failure_is_out_of_memory() {
        assert!(matches!(
            RxBufferPool::new(1, usize::MAX),
            Err(BackendError::OutOfMemory)
        ));
    }
}
