//! Reusable byte buffers for bulk transfers.

use std::sync::Mutex;

/// Transfer chunk size. Chosen to fit a 64 KiB TCP read with room for
/// bookkeeping.
pub(crate) const BUFFER_SIZE: usize = 65524;

/// Buffers retained beyond this are dropped instead of pooled.
const MAX_POOLED: usize = 64;

/// Pool of fixed-size byte buffers shared by a connection's bulk transfers.
///
/// Consumers of an export stream should return chunks with [`BufferPool::put`]
/// once read, so steady-state transfers allocate nothing.
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// A zeroed buffer of the standard transfer size.
    pub fn get(&self) -> Vec<u8> {
        let reused = self
            .buffers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop();
        match reused {
            Some(mut buf) => {
                buf.resize(BUFFER_SIZE, 0);
                buf
            }
            None => vec![0; BUFFER_SIZE],
        }
    }

    /// Number of buffers currently held for reuse.
    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.buffers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Return a buffer for reuse. Undersized or surplus buffers are dropped.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.capacity() < BUFFER_SIZE {
            return;
        }
        let mut buffers = self.buffers.lock().unwrap_or_else(|e| e.into_inner());
        if buffers.len() < MAX_POOLED {
            buffers.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_standard_size() {
        let pool = BufferPool::new();
        assert_eq!(pool.get().len(), BUFFER_SIZE);
    }

    #[test]
    fn test_put_then_get_reuses() {
        let pool = BufferPool::new();
        let mut buf = pool.get();
        buf.truncate(10);
        let ptr = buf.as_ptr();
        pool.put(buf);

        let buf = pool.get();
        assert_eq!(buf.len(), BUFFER_SIZE);
        assert_eq!(buf.as_ptr(), ptr);
    }

    #[test]
    fn test_put_drops_undersized() {
        let pool = BufferPool::new();
        pool.put(vec![0; 16]);
        assert!(pool.buffers.lock().unwrap().is_empty());
    }
}
