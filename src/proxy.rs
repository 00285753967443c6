use anyhow::{Context, Result};
use std::{io, net::SocketAddr};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::config::{Config, TargetConfig};
use crate::relay::{Session, SessionSummary};
use crate::resolver::{resolve_dialer, resolve_listener};
use crate::stream::prepare;

/// Accepts one client at a time and relays it to the fixed upstream.
///
/// Sessions never overlap: while one is being relayed, further clients wait in
/// the listen backlog.
pub struct Proxy {
    listener: TcpListener,
    target: TargetConfig,
    prepare: Prepare,
}

/// Socket configuration applied to both ends of every session.
type Prepare = fn(&TcpStream) -> Result<()>;

impl Proxy {
    pub fn bind(config: &Config) -> Result<Self> {
        let listener = resolve_listener(config.listen.port)?;
        Ok(Self::new(listener, config.target.clone()))
    }

    #[cfg(test)]
    fn bind_addr(addr: SocketAddr, target: TargetConfig) -> Result<Self> {
        Ok(Self::new(crate::resolver::bind_listener(addr)?, target))
    }

    #[must_use]
    pub fn new(listener: TcpListener, target: TargetConfig) -> Self {
        Self {
            listener,
            target,
            prepare,
        }
    }

    #[cfg(test)]
    fn with_prepare(mut self, prepare: Prepare) -> Self {
        self.prepare = prepare;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to get listener local address")
    }

    /// Runs the accept loop. Only returns on an accept failure that is not
    /// specific to a single pending connection.
    pub async fn run(self) -> Result<()> {
        let target_addr = self.target.addr();
        info!(
            listen_addr = %self.local_addr()?,
            target_addr = %target_addr,
            "TCP proxy listening"
        );

        loop {
            let (stream, client_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if is_connection_error(&e) => {
                    warn!(error = %e, "Failed to accept client connection");
                    continue;
                }
                Err(e) => return Err(e).context("Failed to accept client connection"),
            };

            match relay_connection(stream, &self.target, self.prepare).await {
                Ok(summary) if summary.end.is_failure() => {
                    warn!(
                        client_addr = %client_addr,
                        reason = %summary.end,
                        discarded = summary.discarded,
                        "Session ended with error"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!(client_addr = %client_addr, error = %format!("{e:#}"), "Session abandoned");
                }
            }
        }
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
    )
}

/// Dials the upstream for an accepted client and relays until the session ends.
///
/// Dial and socket configuration failures abandon the session; the client is
/// closed when `client` is dropped on the error path.
pub async fn handle_connection(client: TcpStream, target: &TargetConfig) -> Result<SessionSummary> {
    relay_connection(client, target, prepare).await
}

#[tracing::instrument(skip(client, target, prepare), fields(client_addr = %client.peer_addr().map_or_else(|_| "unknown".to_string(), |addr| addr.to_string())))]
async fn relay_connection(
    client: TcpStream,
    target: &TargetConfig,
    prepare: Prepare,
) -> Result<SessionSummary> {
    let upstream = resolve_dialer(target).await?;
    info!(target_addr = %target.addr(), "Connected to upstream");

    prepare(&client).context("Failed to configure client socket")?;
    prepare(&upstream).context("Failed to configure upstream socket")?;

    let summary = Session::new(client, upstream).run().await;

    info!(
        client_to_upstream = summary.client_to_upstream,
        upstream_to_client = summary.upstream_to_client,
        end = %summary.end,
        "Proxy connection closed"
    );
    Ok(summary)
}
