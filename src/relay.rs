use futures_util::future::poll_fn;
use std::{fmt, io, task::Poll};
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::buffer::{DirectionalBuffer, Terminal};
use crate::stream::RelaySocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Upstream => f.write_str("upstream"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Wait,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
            Self::Wait => f.write_str("readiness wait"),
        }
    }
}

/// The terminal signal that moved a session to closing.
#[derive(Debug, Error)]
pub enum SessionEnd {
    /// Orderly end-of-stream from one peer.
    #[error("{0} closed the connection")]
    Closed(Side),
    #[error("{side} {op} failed: {source}")]
    Failed {
        side: Side,
        op: Operation,
        source: io::Error,
    },
}

impl SessionEnd {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    #[must_use]
    pub fn side(&self) -> Side {
        match self {
            Self::Closed(side) | Self::Failed { side, .. } => *side,
        }
    }

    fn from_terminal(side: Side, op: Operation, terminal: Terminal) -> Self {
        match terminal {
            Terminal::Closed => Self::Closed(side),
            Terminal::Failed(source) => Self::Failed { side, op, source },
        }
    }
}

#[derive(Debug)]
pub struct SessionSummary {
    /// Bytes delivered to the upstream.
    pub client_to_upstream: u64,
    /// Bytes delivered to the client.
    pub upstream_to_client: u64,
    /// Bytes still buffered in either direction when the session closed.
    pub discarded: usize,
    pub end: SessionEnd,
}

/// Readiness interests for one multiplexing wait.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub client_read: bool,
    pub client_write: bool,
    pub upstream_read: bool,
    pub upstream_write: bool,
}

impl Interest {
    fn any(self) -> bool {
        self.client_read || self.client_write || self.upstream_read || self.upstream_write
    }
}

/// One client paired with one upstream, plus a staging buffer per direction.
pub struct Session<S = TcpStream> {
    client: S,
    upstream: S,
    client_to_upstream: DirectionalBuffer,
    upstream_to_client: DirectionalBuffer,
}

impl<S: RelaySocket> Session<S> {
    pub fn new(client: S, upstream: S) -> Self {
        Self {
            client,
            upstream,
            client_to_upstream: DirectionalBuffer::new(),
            upstream_to_client: DirectionalBuffer::new(),
        }
    }

    pub fn with_capacity(client: S, upstream: S, capacity: usize) -> Self {
        Self {
            client,
            upstream,
            client_to_upstream: DirectionalBuffer::with_capacity(capacity),
            upstream_to_client: DirectionalBuffer::with_capacity(capacity),
        }
    }

    /// Interests to register for the next wait. A direction stops reading while
    /// its buffer is full and starts writing as soon as it holds a byte.
    #[must_use]
    pub fn interest(&self) -> Interest {
        Interest {
            client_read: self.client_to_upstream.can_read(),
            client_write: self.upstream_to_client.can_write(),
            upstream_read: self.upstream_to_client.can_read(),
            upstream_write: self.client_to_upstream.can_write(),
        }
    }

    /// Relays until either peer closes or any read, write or wait fails.
    ///
    /// Bytes still buffered at that point are dropped. Both sockets are closed
    /// when `self` goes out of scope on return.
    pub async fn run(mut self) -> SessionSummary {
        let mut client_to_upstream = 0u64;
        let mut upstream_to_client = 0u64;

        let end = loop {
            let interest = self.interest();
            let ready = match self.wait(interest).await {
                Ok(ready) => ready,
                Err(end) => break end,
            };
            trace!(?ready, "Sockets ready");

            if let Err(end) = self.step(ready, &mut client_to_upstream, &mut upstream_to_client) {
                break end;
            }
        };

        let discarded = self.client_to_upstream.len() + self.upstream_to_client.len();
        debug!(
            client_to_upstream,
            upstream_to_client,
            discarded,
            end = %end,
            "Relay finished"
        );

        SessionSummary {
            client_to_upstream,
            upstream_to_client,
            discarded,
            end,
        }
    }

    /// Blocks until at least one registered interest is ready and reports all
    /// interests that are ready at that moment.
    async fn wait(&self, interest: Interest) -> Result<Interest, SessionEnd> {
        debug_assert!(interest.any(), "a session always has some interest");
        poll_fn(|cx| -> Poll<Result<Interest, SessionEnd>> {
            let ready = Interest {
                client_read: interest.client_read
                    && poll_ready(self.client.poll_read_ready(cx), Side::Client)?,
                client_write: interest.client_write
                    && poll_ready(self.client.poll_write_ready(cx), Side::Client)?,
                upstream_read: interest.upstream_read
                    && poll_ready(self.upstream.poll_read_ready(cx), Side::Upstream)?,
                upstream_write: interest.upstream_write
                    && poll_ready(self.upstream.poll_write_ready(cx), Side::Upstream)?,
            };
            if ready.any() {
                Poll::Ready(Ok(ready))
            } else {
                Poll::Pending
            }
        })
        .await
    }

    /// At most one transfer per ready interest.
    fn step(
        &mut self,
        ready: Interest,
        client_to_upstream: &mut u64,
        upstream_to_client: &mut u64,
    ) -> Result<(), SessionEnd> {
        if ready.client_read {
            let n = self
                .client_to_upstream
                .append_from(&self.client)
                .map_err(|t| SessionEnd::from_terminal(Side::Client, Operation::Read, t))?;
            trace!(bytes = n, "Read from client");
        }

        if ready.upstream_write {
            let n = self
                .client_to_upstream
                .drain_to(&self.upstream)
                .map_err(|t| SessionEnd::from_terminal(Side::Upstream, Operation::Write, t))?;
            *client_to_upstream += n as u64;
            trace!(bytes = n, "Forwarded data from client to upstream");
        }

        if ready.upstream_read {
            let n = self
                .upstream_to_client
                .append_from(&self.upstream)
                .map_err(|t| SessionEnd::from_terminal(Side::Upstream, Operation::Read, t))?;
            trace!(bytes = n, "Read from upstream");
        }

        if ready.client_write {
            let n = self
                .upstream_to_client
                .drain_to(&self.client)
                .map_err(|t| SessionEnd::from_terminal(Side::Client, Operation::Write, t))?;
            *upstream_to_client += n as u64;
            trace!(bytes = n, "Forwarded data from upstream to client");
        }

        Ok(())
    }
}

/// Maps one readiness poll to "ready or not", turning a failed poll into a
/// terminal wait error.
fn poll_ready(poll: Poll<io::Result<()>>, side: Side) -> Result<bool, SessionEnd> {
    match poll {
        Poll::Ready(Ok(())) => Ok(true),
        Poll::Ready(Err(source)) => Err(SessionEnd::Failed {
            side,
            op: Operation::Wait,
            source,
        }),
        Poll::Pending => Ok(false),
    }
}
