use crate::error::BufferError;
use tracing::{error, trace};

/// Single-owner bookkeeping for the reusable pixel buffer.
///
/// `checkout` hands the buffer out (the lease is then detached) and
/// `give_back` returns it. Checking out while the previous buffer is still
/// away allocates a fresh one instead of touching memory someone else owns.
#[derive(Debug, Default)]
pub struct BufferLease {
    buffer: Option<Vec<u8>>,
    required_size: usize,
    /// Checkouts not yet given back. Buffers a consumer never returns keep
    /// this count high, so it is approximate; detachment only trusts it
    /// while no buffer is retained.
    outstanding: usize,
    allocations: u64,
}

impl BufferLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a buffer of exactly `size` bytes
    pub fn checkout(&mut self, size: usize) -> Vec<u8> {
        self.required_size = size;
        self.outstanding += 1;

        match self.buffer.take() {
            Some(buffer) if buffer.len() == size => {
                trace!("Reusing retained {} byte buffer", size);
                buffer
            }
            Some(stale) => {
                trace!("Dropping {} byte buffer, now need {}", stale.len(), size);
                self.allocate(size)
            }
            None => {
                if self.outstanding > 1 {
                    trace!("Previous buffer still leased, allocating a fresh one");
                }
                self.allocate(size)
            }
        }
    }

    fn allocate(&mut self, size: usize) -> Vec<u8> {
        self.allocations += 1;
        vec![0u8; size]
    }

    /// Return a buffer. Its length must match the most recent checkout.
    pub fn give_back(&mut self, buffer: Vec<u8>) -> Result<(), BufferError> {
        if buffer.len() != self.required_size {
            error!(
                "Buffer reattach rejected: {} bytes returned, {} required",
                buffer.len(),
                self.required_size
            );
            return Err(BufferError::SizeMismatch {
                expected: self.required_size,
                actual: buffer.len(),
            });
        }

        self.outstanding = self.outstanding.saturating_sub(1);
        self.buffer = Some(buffer);
        Ok(())
    }

    /// A buffer is out and nothing is retained for reuse
    pub fn is_detached(&self) -> bool {
        self.buffer.is_none() && self.outstanding > 0
    }

    pub fn required_size(&self) -> usize {
        self.required_size
    }

    /// Number of buffers allocated so far
    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}
