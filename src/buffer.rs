use std::io;

use crate::stream::RelaySocket;

pub const BUFFER_SIZE: usize = 8192;

/// Why a single transfer ended the session.
#[derive(Debug)]
pub enum Terminal {
    /// The source returned end-of-stream.
    Closed,
    Failed(io::Error),
}

/// Fixed-capacity staging area for one direction of a session.
///
/// Buffered bytes always occupy `data[..len]` in arrival order.
pub struct DirectionalBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl Default for DirectionalBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectionalBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_SIZE)
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// There is free space left for another read.
    #[must_use]
    pub fn can_read(&self) -> bool {
        self.len < self.data.len()
    }

    /// There are buffered bytes waiting to be written.
    #[must_use]
    pub fn can_write(&self) -> bool {
        self.len > 0
    }

    /// Performs one read from `src` into the free tail.
    ///
    /// Returns the number of bytes appended; `Ok(0)` means no progress was made
    /// (the buffer is full or the readiness was spurious). End-of-stream and read
    /// errors are terminal for the whole session.
    pub fn append_from<S: RelaySocket + ?Sized>(&mut self, src: &S) -> Result<usize, Terminal> {
        if !self.can_read() {
            return Ok(0);
        }
        match src.try_read(&mut self.data[self.len..]) {
            Ok(0) => Err(Terminal::Closed),
            Ok(n) => {
                self.len += n;
                Ok(n)
            }
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) => Err(Terminal::Failed(e)),
        }
    }

    /// Performs one write of the buffered bytes to `dst`.
    ///
    /// Whatever `dst` did not accept is moved to the front of the buffer, order
    /// preserved, for a later attempt.
    pub fn drain_to<S: RelaySocket + ?Sized>(&mut self, dst: &S) -> Result<usize, Terminal> {
        if !self.can_write() {
            return Ok(0);
        }
        match dst.try_write(&self.data[..self.len]) {
            Ok(n) => {
                self.consume(n);
                Ok(n)
            }
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) => Err(Terminal::Failed(e)),
        }
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.len);
        self.data.copy_within(n..self.len, 0);
        self.len -= n;
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
