use anyhow::{Context, Result};
use socket2::SockRef;
use std::{
    io,
    task::{Context as TaskContext, Poll},
};
use tokio::net::TcpStream;

/// A non-blocking byte stream the relay engine can wait on and move bytes through.
///
/// Readiness polling never performs I/O; `try_read`/`try_write` perform at most
/// one system call and report `WouldBlock` when readiness was spurious.
pub trait RelaySocket {
    fn poll_read_ready(&self, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>>;

    fn poll_write_ready(&self, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>>;

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl RelaySocket for TcpStream {
    fn poll_read_ready(&self, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Self::poll_read_ready(self, cx)
    }

    fn poll_write_ready(&self, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Self::poll_write_ready(self, cx)
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        Self::try_read(self, buf)
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        Self::try_write(self, buf)
    }
}

/// Puts a connected stream into non-blocking mode and enables keep-alive probing.
///
/// On error the stream must be treated as unusable and dropped.
pub fn prepare(stream: &TcpStream) -> Result<()> {
    let socket = SockRef::from(stream);
    socket
        .set_nonblocking(true)
        .context("Failed to enable non-blocking mode")?;
    socket
        .set_keepalive(true)
        .context("Failed to enable TCP keep-alive")?;
    Ok(())
}
