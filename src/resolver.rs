use anyhow::{Context, Result, anyhow};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::{TcpListener, TcpSocket, TcpStream, lookup_host};
use tracing::debug;

use crate::config::TargetConfig;

pub const LISTEN_BACKLOG: u32 = 10;

/// Opens a listener on the IPv4 wildcard address.
pub fn resolve_listener(port: u16) -> Result<TcpListener> {
    bind_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
}

pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .context("Failed to create listening socket")?;

    socket
        .set_reuseaddr(true)
        .context("Failed to set SO_REUSEADDR on listening socket")?;
    socket
        .bind(addr)
        .with_context(|| format!("Failed to bind to address {addr}"))?;
    socket
        .listen(LISTEN_BACKLOG)
        .with_context(|| format!("Failed to listen on address {addr}"))
}

/// Connects to the first IPv4 address the target resolves to, or to the first
/// address of any family when it has no IPv4 address.
pub async fn resolve_dialer(target: &TargetConfig) -> Result<TcpStream> {
    let target_addr = target.addr();
    let resolved = lookup_host((target.host.as_str(), target.port))
        .await
        .with_context(|| format!("Failed to resolve {target_addr}"))?;
    let addr = pick_address(resolved)
        .ok_or_else(|| anyhow!("No addresses found for {target_addr}"))?;

    debug!(target_addr = %target_addr, resolved = %addr, "Attempting to connect to upstream");
    TcpStream::connect(addr)
        .await
        .with_context(|| format!("Failed to connect to upstream {target_addr} ({addr})"))
}

fn pick_address(resolved: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    let mut first = None;
    for addr in resolved {
        if addr.is_ipv4() {
            return Some(addr);
        }
        first.get_or_insert(addr);
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str, port: u16) -> TargetConfig {
        TargetConfig {
            host: host.to_string(),
            port,
        }
    }

    #[tokio::test]
    async fn listener_accepts_dialed_connection() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let port = listener.local_addr().unwrap().port();

        let upstream = target("127.0.0.1", port);
        let (dialed, accepted) = tokio::join!(resolve_dialer(&upstream), listener.accept());
        let dialed = dialed.unwrap();
        let (accepted, _) = accepted.unwrap();

        assert_eq!(dialed.local_addr().unwrap(), accepted.peer_addr().unwrap());
    }

    #[tokio::test]
    async fn wildcard_listener_binds_ephemeral_port() {
        let listener = resolve_listener(0).unwrap();
        let addr = listener.local_addr().unwrap();

        assert!(addr.ip().is_unspecified());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let port = {
            let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = resolve_dialer(&target("127.0.0.1", port)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to connect to upstream"));
    }

    #[test]
    fn prefers_first_ipv4_address() {
        let v6: SocketAddr = "[::1]:80".parse().unwrap();
        let first_v4: SocketAddr = "127.0.0.1:80".parse().unwrap();
        let second_v4: SocketAddr = "10.0.0.1:80".parse().unwrap();

        assert_eq!(pick_address([v6, first_v4, second_v4]), Some(first_v4));
        assert_eq!(pick_address([v6]), Some(v6));
        assert_eq!(pick_address(Vec::<SocketAddr>::new()), None);
    }

    #[tokio::test]
    async fn unresolvable_host_is_an_error() {
        let result = resolve_dialer(&target("host.invalid", 80)).await;
        assert!(result.is_err());
    }
}
