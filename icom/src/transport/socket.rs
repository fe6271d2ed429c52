//! TCP transport: `socket_tx` (active open) and `socket_rx` (passive open).
//!
//! ```text
//!   socket_tx:  PendingConnect ──connect ok──▶ Connected
//!                     │  ▲
//!                     └──┘ refused: stay pending, retry on next use
//!
//!   socket_rx:  Listening ──accept──▶ Accepted
//! ```
//!
//! The connect side tries once when created; the bind side only listens and
//! defers `accept` until the first transfer. States never move backwards.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::config::Timeouts;
use crate::error::{IcomError, Result};
use crate::link::LinkState;

/// Listen backlog: each bound link serves exactly one peer.
const BACKLOG: i32 = 1;

/// Wildcard host accepted by the bind side.
const ANY_HOST: &str = "*";

enum SocketState {
    PendingConnect { addr: SocketAddr },
    Connected(TcpStream),
    Listening(TcpListener),
    Accepted(TcpStream),
}

pub(crate) struct SocketTransport {
    endpoint: String,
    state: SocketState,
    timeouts: Option<Timeouts>,
}

impl SocketTransport {
    /// Active open. A refused (or timed out) first attempt leaves the link
    /// pending; any other failure aborts creation.
    pub(crate) fn connect(endpoint: &str, timeouts: Option<Timeouts>) -> Result<Self> {
        let addr = SocketAddr::V4(parse_connect_addr(endpoint)?);
        let state = match open_stream(addr, timeouts) {
            Ok(stream) => {
                log::debug!("[{endpoint}] connected");
                SocketState::Connected(stream)
            }
            Err(e) if is_transient(&e) => {
                log::debug!("[{endpoint}] peer not ready ({e}), connect deferred");
                SocketState::PendingConnect { addr }
            }
            Err(e) => return Err(IcomError::link(endpoint, e)),
        };
        Ok(Self {
            endpoint: endpoint.to_string(),
            state,
            timeouts,
        })
    }

    /// Passive open: `SO_REUSEADDR`, bind, listen. `accept` is deferred.
    pub(crate) fn bind(endpoint: &str, timeouts: Option<Timeouts>) -> Result<Self> {
        let addr = parse_bind_addr(endpoint)?;
        let listener = listen(addr, timeouts).map_err(|e| IcomError::link(endpoint, e))?;
        log::debug!("[{endpoint}] listening");
        Ok(Self {
            endpoint: endpoint.to_string(),
            state: SocketState::Listening(listener),
            timeouts,
        })
    }

    pub(crate) fn state(&self) -> LinkState {
        match self.state {
            SocketState::PendingConnect { .. } => LinkState::PendingConnect,
            SocketState::Connected(_) => LinkState::Connected,
            SocketState::Listening(_) => LinkState::Listening,
            SocketState::Accepted(_) => LinkState::Accepted,
        }
    }

    /// The established stream, connecting or accepting first if needed.
    pub(crate) fn stream(&mut self) -> Result<&mut TcpStream> {
        self.establish()?;
        match &mut self.state {
            SocketState::Connected(stream) | SocketState::Accepted(stream) => Ok(stream),
            SocketState::PendingConnect { .. } | SocketState::Listening(_) => Err(
                IcomError::InvalidArgument(format!("[{}] link not established", self.endpoint)),
            ),
        }
    }

    fn establish(&mut self) -> Result<()> {
        let next = match &self.state {
            SocketState::Connected(_) | SocketState::Accepted(_) => return Ok(()),
            SocketState::PendingConnect { addr } => {
                let stream = open_stream(*addr, self.timeouts)?;
                log::debug!("[{}] connected on retry", self.endpoint);
                SocketState::Connected(stream)
            }
            SocketState::Listening(listener) => {
                let (stream, peer) = listener.accept()?;
                configure(&stream, self.timeouts)?;
                log::debug!("[{}] accepted {peer}", self.endpoint);
                SocketState::Accepted(stream)
            }
        };
        self.state = next;
        Ok(())
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        log::debug!("[{}] socket closed in state {:?}", self.endpoint, self.state());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

fn open_stream(addr: SocketAddr, timeouts: Option<Timeouts>) -> io::Result<TcpStream> {
    let stream = match timeouts {
        Some(t) => TcpStream::connect_timeout(&addr, t.send)?,
        None => TcpStream::connect(addr)?,
    };
    configure(&stream, timeouts)?;
    Ok(stream)
}

fn configure(stream: &TcpStream, timeouts: Option<Timeouts>) -> io::Result<()> {
    // Header and payload go out as separate writes.
    stream.set_nodelay(true)?;
    if let Some(t) = timeouts {
        stream.set_read_timeout(Some(t.recv))?;
        stream.set_write_timeout(Some(t.send))?;
    }
    Ok(())
}

fn listen(addr: SocketAddrV4, timeouts: Option<Timeouts>) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if let Some(t) = timeouts {
        // Bounds the deferred accept.
        socket.set_read_timeout(Some(t.recv))?;
    }
    socket.bind(&SockAddr::from(addr))?;
    socket.listen(BACKLOG)?;
    Ok(socket.into())
}

fn split_endpoint(endpoint: &str) -> Result<(&str, u16)> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| invalid_endpoint(endpoint))?;
    let port = port.parse().map_err(|_| invalid_endpoint(endpoint))?;
    Ok((host, port))
}

fn parse_connect_addr(endpoint: &str) -> Result<SocketAddrV4> {
    let (host, port) = split_endpoint(endpoint)?;
    let ip: Ipv4Addr = host.parse().map_err(|_| invalid_endpoint(endpoint))?;
    Ok(SocketAddrV4::new(ip, port))
}

fn parse_bind_addr(endpoint: &str) -> Result<SocketAddrV4> {
    let (host, port) = split_endpoint(endpoint)?;
    let ip = if host == ANY_HOST {
        Ipv4Addr::UNSPECIFIED
    } else {
        host.parse().map_err(|_| invalid_endpoint(endpoint))?
    };
    Ok(SocketAddrV4::new(ip, port))
}

fn invalid_endpoint(endpoint: &str) -> IcomError {
    IcomError::InvalidArgument(format!("bad socket endpoint {endpoint:?}, expected ipv4:port"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_side_needs_a_literal_address() {
        assert_eq!(
            parse_connect_addr("127.0.0.1:8889").unwrap(),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8889)
        );
        for bad in ["*:8889", "localhost:1", "127.0.0.1", "127.0.0.1:x", "1.2.3.4:70000"] {
            assert!(parse_connect_addr(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn bind_side_accepts_wildcard() {
        assert_eq!(
            parse_bind_addr("*:9000").unwrap(),
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 9000)
        );
        assert_eq!(
            parse_bind_addr("127.0.0.1:9000").unwrap(),
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 9000)
        );
        assert!(parse_bind_addr("/tmp/x.fifo").is_err());
    }

    #[test]
    fn refused_connect_stays_pending() {
        // Nothing listens on a port we just freed.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let mut t = SocketTransport::connect(&format!("127.0.0.1:{port}"), None).unwrap();
        assert_eq!(t.state(), LinkState::PendingConnect);
        assert!(matches!(t.stream(), Err(IcomError::ConnectionRefused(_))));
        assert_eq!(t.state(), LinkState::PendingConnect);
    }

    #[test]
    fn bind_defers_accept_until_first_use() {
        let t = SocketTransport::bind("127.0.0.1:0", None).unwrap();
        assert_eq!(t.state(), LinkState::Listening);
    }
}
