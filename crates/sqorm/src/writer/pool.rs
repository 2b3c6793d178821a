use std::sync::{Mutex, PoisonError};

use super::{Dialect, SqlWriter};

/// Reusable statement buffers.
///
/// Checkout and return are safe across tasks. Returned buffers are emptied before they can be
/// handed out again; oversized buffers are dropped instead of retained.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<String>>,
    max_retained: usize,
    max_capacity: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(32, 64 * 1024)
    }
}

impl BufferPool {
    pub fn new(max_retained: usize, max_capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            max_retained,
            max_capacity,
        }
    }

    /// Take a writer backed by a pooled buffer.
    pub fn writer(&self, dialect: Dialect) -> SqlWriter {
        let buf = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| String::with_capacity(1024));
        SqlWriter::from_buffer(buf, dialect.marker_style(), dialect.quote())
    }

    /// Hand a buffer back to the pool.
    pub fn put(&self, mut buf: String) {
        if buf.capacity() > self.max_capacity {
            return;
        }
        buf.clear();
        let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < self.max_retained {
            buffers.push(buf);
        }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
