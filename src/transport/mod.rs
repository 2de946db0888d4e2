//! Transport layer abstraction.
//!
//! The core binds transports by textual address with a domain prefix
//! (`udp:`, `tcp:`, `unix:`, `alias:`). UDP is provided here; stream and
//! socket-file transports plug in through the same [`AgentTransport`]
//! contract. `alias:` names resolve through the `defDomain`/`defTarget`
//! configuration tables before binding.

use std::net::SocketAddr;

use bytes::Bytes;
use socket2::{Domain as SocketDomain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::{Error, Result};

/// Agent-side transport abstraction (listener mode).
pub trait AgentTransport: Send + Sync {
    /// Receive data from any source.
    fn recv_from(&self, buf: &mut [u8])
    -> impl Future<Output = Result<(usize, SocketAddr)>> + Send;

    /// Send data to a specific target.
    fn send_to(&self, data: &[u8], target: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    /// Local bind address.
    fn local_addr(&self) -> SocketAddr;
}

/// Transport domains addressable by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    /// UDP datagrams (default when no prefix is given).
    Udp,
    /// TCP streams.
    Tcp,
    /// Unix domain sockets.
    Unix,
    /// Indirection through the configured alias tables.
    Alias,
}

impl Domain {
    /// The textual prefix, without the colon.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Unix => "unix",
            Self::Alias => "alias",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "udp" => Some(Self::Udp),
            "tcp" => Some(Self::Tcp),
            "unix" => Some(Self::Unix),
            "alias" => Some(Self::Alias),
            _ => None,
        }
    }
}

/// A parsed textual transport address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAddress {
    /// Addressed domain.
    pub domain: Domain,
    /// The part after the prefix: socket address, path, or alias name.
    pub rest: String,
}

/// Parse a textual address of the form `domain:rest`.
///
/// A prefix that is not a registered domain is not an error: the whole
/// string is taken as an address in the default (UDP) domain, so host
/// names with ports parse naturally.
pub fn parse_address(input: &str) -> Result<TransportAddress> {
    if input.is_empty() {
        return Err(Error::InvalidTransportAddress {
            input: input.into(),
        });
    }
    if let Some((prefix, rest)) = input.split_once(':')
        && let Some(domain) = Domain::from_prefix(prefix)
    {
        if rest.is_empty() {
            return Err(Error::InvalidTransportAddress {
                input: input.into(),
            });
        }
        return Ok(TransportAddress {
            domain,
            rest: rest.to_string(),
        });
    }
    Ok(TransportAddress {
        domain: Domain::Udp,
        rest: input.to_string(),
    })
}

/// Resolve a textual address through the configured alias table.
///
/// `alias:NAME` looks NAME up in the `alias` config entries; targets may
/// themselves be aliases, bounded to a small depth to keep cycles from
/// looping.
pub fn resolve_address(
    input: &str,
    config: &crate::store::CoreConfig,
) -> Result<TransportAddress> {
    let mut parsed = parse_address(input)?;
    let mut depth = 0;
    while parsed.domain == Domain::Alias {
        depth += 1;
        if depth > 8 {
            return Err(Error::InvalidTransportAddress {
                input: input.into(),
            });
        }
        let Some(target) = config.alias(&parsed.rest) else {
            return Err(Error::UnknownTransportDomain {
                domain: format!("alias:{}", parsed.rest).into(),
            });
        };
        parsed = parse_address(target)?;
    }
    Ok(parsed)
}

/// UDP transport bound to a local address.
pub struct UdpTransport {
    socket: UdpSocket,
    local: SocketAddr,
}

impl UdpTransport {
    /// Bind the agent's listener socket.
    ///
    /// The socket allows address reuse so a restarted agent can rebind
    /// immediately, and IPv6 sockets are v6-only so v4 traffic never shows
    /// up as mapped addresses in request contexts.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let family = if addr.is_ipv6() {
            SocketDomain::IPV6
        } else {
            SocketDomain::IPV4
        };
        let raw = Socket::new(family, Type::DGRAM, Some(Protocol::UDP))?;
        if addr.is_ipv6() {
            raw.set_only_v6(true)?;
        }
        raw.set_reuse_address(true)?;
        // Non-blocking before the tokio handoff.
        raw.set_nonblocking(true)?;
        raw.bind(&addr.into())?;

        let socket = UdpSocket::from_std(raw.into())?;
        let local = socket.local_addr()?;
        Ok(Self { socket, local })
    }

    /// Bind from a textual address (`udp:host:port` or bare `host:port`).
    pub async fn bind_address(input: &str) -> Result<Self> {
        let parsed = parse_address(input)?;
        if parsed.domain != Domain::Udp {
            return Err(Error::UnknownTransportDomain {
                domain: parsed.domain.prefix().into(),
            });
        }
        let addr: SocketAddr =
            parsed
                .rest
                .parse()
                .map_err(|_| Error::InvalidTransportAddress {
                    input: input.into(),
                })?;
        Self::bind(addr).await
    }
}

/// Hex rendering for datagram traces, formatted only when the trace level
/// is actually enabled.
struct Wire<'a>(&'a [u8]);

impl std::fmt::Display for Wire<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for octet in self.0 {
            write!(f, "{:02x}", octet)?;
        }
        Ok(())
    }
}

impl AgentTransport for UdpTransport {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let (len, source) = self.socket.recv_from(buf).await?;
        trace!(%source, len, payload = %Wire(&buf[..len]), "received datagram");
        Ok((len, source))
    }

    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        trace!(%target, len = data.len(), "sending datagram");
        self.socket.send_to(data, target).await?;
        Ok(())
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

/// In-process loopback transport for tests: requests are pushed in, and
/// responses captured.
#[cfg(any(test, feature = "testing"))]
pub struct LoopbackTransport {
    incoming: tokio::sync::Mutex<tokio::sync::mpsc::Receiver<(Bytes, SocketAddr)>>,
    outgoing: tokio::sync::mpsc::Sender<(Bytes, SocketAddr)>,
    local: SocketAddr,
}

#[cfg(any(test, feature = "testing"))]
impl LoopbackTransport {
    /// Create a loopback pair: the transport plus (request sender,
    /// response receiver) handles for the test driver.
    #[allow(clippy::type_complexity)]
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::Sender<(Bytes, SocketAddr)>,
        tokio::sync::mpsc::Receiver<(Bytes, SocketAddr)>,
    ) {
        let (request_tx, request_rx) = tokio::sync::mpsc::channel(16);
        let (response_tx, response_rx) = tokio::sync::mpsc::channel(16);
        let transport = Self {
            incoming: tokio::sync::Mutex::new(request_rx),
            outgoing: response_tx,
            local: "127.0.0.1:161".parse().expect("static addr"),
        };
        (transport, request_tx, response_rx)
    }
}

#[cfg(any(test, feature = "testing"))]
impl AgentTransport for LoopbackTransport {
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut incoming = self.incoming.lock().await;
        let (data, source) = incoming.recv().await.ok_or_else(|| Error::Io {
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "loopback closed"),
        })?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok((len, source))
    }

    async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        self.outgoing
            .send((Bytes::copy_from_slice(data), target))
            .await
            .map_err(|_| Error::Io {
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "loopback closed"),
            })
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }
}
