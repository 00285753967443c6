//! Scripted in-memory socket for exercising the relay without the network.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    io,
    rc::Rc,
    task::{Context, Poll},
};

use crate::stream::RelaySocket;

pub enum Step {
    Data(Vec<u8>),
    WouldBlock,
    Fail(io::ErrorKind),
}

/// Reads replay the scripted steps in order; once the script is exhausted the
/// peer reads as closed. Writes are recorded, optionally capped per call.
#[derive(Default)]
pub struct MockSocket {
    reads: RefCell<VecDeque<Step>>,
    written: Rc<RefCell<Vec<u8>>>,
    write_limit: Cell<Option<usize>>,
    write_error: Cell<Option<io::ErrorKind>>,
    readiness_error: Cell<Option<io::ErrorKind>>,
}

impl MockSocket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(self, bytes: &[u8]) -> Self {
        self.reads.borrow_mut().push_back(Step::Data(bytes.to_vec()));
        self
    }

    pub fn would_block(self, times: usize) -> Self {
        for _ in 0..times {
            self.reads.borrow_mut().push_back(Step::WouldBlock);
        }
        self
    }

    pub fn fail_read(self, kind: io::ErrorKind) -> Self {
        self.reads.borrow_mut().push_back(Step::Fail(kind));
        self
    }

    pub fn write_limit(self, limit: usize) -> Self {
        self.write_limit.set(Some(limit));
        self
    }

    pub fn fail_writes(self, kind: io::ErrorKind) -> Self {
        self.write_error.set(Some(kind));
        self
    }

    /// Makes every readiness poll fail, as a broken reactor registration would.
    pub fn fail_readiness(self, kind: io::ErrorKind) -> Self {
        self.readiness_error.set(Some(kind));
        self
    }

    fn readiness(&self) -> Poll<io::Result<()>> {
        match self.readiness_error.get() {
            Some(kind) => Poll::Ready(Err(kind.into())),
            None => Poll::Ready(Ok(())),
        }
    }

    /// Handle to everything written so far; stays valid after the socket is dropped.
    pub fn written(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.written)
    }
}

impl RelaySocket for MockSocket {
    fn poll_read_ready(&self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.readiness()
    }

    fn poll_write_ready(&self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.readiness()
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut reads = self.reads.borrow_mut();
        match reads.pop_front() {
            None => Ok(0),
            Some(Step::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(Step::Fail(kind)) => Err(kind.into()),
            Some(Step::Data(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    reads.push_front(Step::Data(bytes.split_off(n)));
                }
                Ok(n)
            }
        }
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_error.get() {
            return Err(kind.into());
        }
        let n = self.write_limit.get().map_or(buf.len(), |limit| limit.min(buf.len()));
        if n == 0 && !buf.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        self.written.borrow_mut().extend_from_slice(&buf[..n]);
        Ok(n)
    }
}
