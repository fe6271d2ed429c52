//! One concrete endpoint of a communicator.
//!
//! A [`Link`] pairs a transport with its receive buffer and acknowledgement
//! state, and runs the framing protocol from [`crate::wire`] over it.
//!
//! ```text
//!   send:  establish ─▶ header ─▶ payload | handle ─▶ [autonotify: wait ack]
//!   recv:  establish ─▶ [autonotify: flush ack] ─▶ header ─▶ payload | handle
//! ```

use bytes::Bytes;

use crate::config::Timeouts;
use crate::context::{self, Lease};
use crate::error::{IcomError, Result};
use crate::flags::FlagSet;
use crate::kind::TransportKind;
use crate::transport::Transport;
use crate::wire::{self, MessageHeader};

/// Observable transport state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// `socket_tx` whose peer was not reachable yet.
    PendingConnect,
    Connected,
    /// `socket_rx` waiting for its first transfer to accept.
    Listening,
    Accepted,
    /// FIFO not opened yet.
    PendingOpen,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckState {
    Idle,
    /// A message was received under `autonotify` and not acknowledged yet.
    Pending,
}

pub struct Link {
    kind: TransportKind,
    flags: FlagSet,
    endpoint: String,
    transport: Transport,
    buffer: Vec<u8>,
    shared: Option<Bytes>,
    recv_len: usize,
    reallocations: usize,
    ack: AckState,
    /// Zero-copy handles sent but possibly not taken yet.
    published: Vec<u64>,
    _lease: Option<Lease>,
}

impl Link {
    /// Create the link for `endpoint`, resolving [`TransportKind::Auto`].
    ///
    /// `timeouts` only matter when `flags` carries [`FlagSet::TIMEOUT`].
    pub fn create(
        kind: TransportKind,
        flags: FlagSet,
        endpoint: &str,
        timeouts: Timeouts,
    ) -> Result<Link> {
        if flags.contains(FlagSet::INVALID) {
            return Err(IcomError::InvalidArgument(format!(
                "invalid flags {}",
                flags.to_token_string()
            )));
        }
        flags.check_combination()?;

        let (kind, transport) = match kind {
            TransportKind::Auto => resolve_auto(endpoint, flags, timeouts)?,
            concrete => (concrete, Transport::open(concrete, endpoint, flags, timeouts)?),
        };
        let lease = flags.contains(FlagSet::ZERO_COPY).then(Lease::acquire);

        log::debug!(
            "[{endpoint}] link created: {kind}, flags {}",
            flags.to_token_string()
        );
        Ok(Link {
            kind,
            flags,
            endpoint: endpoint.to_string(),
            transport,
            buffer: Vec::new(),
            shared: None,
            recv_len: 0,
            reallocations: 0,
            ack: AckState::Idle,
            published: Vec::new(),
            _lease: lease,
        })
    }

    /// Concrete kind; never [`TransportKind::Auto`].
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> LinkState {
        self.transport.state()
    }

    /// Bytes of the last receive, short if it ended in a partial transfer.
    pub fn buffer(&self) -> &[u8] {
        match &self.shared {
            Some(bytes) => bytes,
            None => &self.buffer[..self.recv_len],
        }
    }

    pub fn recv_len(&self) -> usize {
        self.recv_len
    }

    /// How many times the receive buffer was resized.
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }

    // -----------------------------------------------------------------------
    // Transfer
    // -----------------------------------------------------------------------

    pub fn send(&mut self, buf: &Bytes) -> Result<()> {
        let header = MessageHeader::new(self.kind, self.flags, buf.len())?;
        let w = self.transport.writer()?;
        if header.is_zero_copy() {
            wire::write_header(w, &header)?;
            let handle = context::publish(buf.clone());
            if let Err(e) = wire::write_handle(w, handle) {
                context::revoke(handle);
                return Err(e);
            }
            context::retain_unclaimed(&mut self.published);
            self.published.push(handle);
        } else {
            wire::write_frame(w, &header, buf)?;
        }
        log::debug!("[{}] sent {} bytes", self.endpoint, buf.len());

        if self.flags.contains(FlagSet::AUTO_NOTIFY) {
            wire::read_ack(self.transport.reader()?)?;
            log::debug!("[{}] ack received", self.endpoint);
        }
        Ok(())
    }

    /// Receive one message; returns its length.
    ///
    /// On [`IcomError::PartialTransfer`] the bytes that arrived stay
    /// available through [`Link::buffer`].
    pub fn recv(&mut self) -> Result<usize> {
        self.flush_ack()?;
        self.recv_len = 0;
        self.shared = None;

        let r = self.transport.reader()?;
        let header = wire::read_header(r)?;
        let size = header.payload_len();

        if header.is_zero_copy() {
            let handle = wire::read_handle(r)?;
            let bytes = context::take(handle)?;
            if bytes.len() != size {
                log::warn!(
                    "[{}] handle buffer is {} bytes, header declared {size}",
                    self.endpoint,
                    bytes.len()
                );
            }
            self.recv_len = bytes.len();
            self.shared = Some(bytes);
        } else {
            if size != self.buffer.len() {
                let mut fresh = Vec::new();
                fresh.try_reserve_exact(size)?;
                fresh.resize(size, 0);
                self.buffer = fresh;
                self.reallocations += 1;
            }
            match wire::read_payload(r, &mut self.buffer) {
                Ok(n) => self.recv_len = n,
                Err(e) => {
                    if let IcomError::PartialTransfer { actual, .. } = e {
                        self.recv_len = actual;
                    }
                    return Err(e);
                }
            }
        }

        if self.flags.contains(FlagSet::AUTO_NOTIFY) {
            self.ack = AckState::Pending;
        }
        log::debug!("[{}] received {} bytes", self.endpoint, self.recv_len);
        Ok(self.recv_len)
    }

    // -----------------------------------------------------------------------
    // Acknowledgement
    // -----------------------------------------------------------------------

    /// Receiver side: acknowledge the last message.
    ///
    /// Under `notify` this always writes an ack; under `autonotify` it flushes
    /// a pending one early; otherwise it does nothing.
    pub fn notify_send(&mut self) -> Result<()> {
        if self.flags.contains(FlagSet::NOTIFY) {
            wire::write_ack(self.transport.writer()?)?;
            log::debug!("[{}] ack sent", self.endpoint);
            return Ok(());
        }
        self.flush_ack()
    }

    /// Sender side: wait for the receiver's ack. Only valid under `notify`.
    pub fn notify_recv(&mut self) -> Result<()> {
        if self.flags.contains(FlagSet::AUTO_NOTIFY) {
            return Err(IcomError::InvalidArgument(format!(
                "[{}] acks are consumed by send under autonotify",
                self.endpoint
            )));
        }
        if self.flags.contains(FlagSet::NOTIFY) {
            wire::read_ack(self.transport.reader()?)?;
            log::debug!("[{}] ack received", self.endpoint);
        }
        Ok(())
    }

    fn flush_ack(&mut self) -> Result<()> {
        if self.ack == AckState::Pending {
            wire::write_ack(self.transport.writer()?)?;
            self.ack = AckState::Idle;
            log::debug!("[{}] pending ack flushed", self.endpoint);
        }
        Ok(())
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        if self.ack == AckState::Pending {
            log::debug!("[{}] dropped with an unsent ack", self.endpoint);
        }
        context::retain_unclaimed(&mut self.published);
        if !self.published.is_empty() {
            log::debug!(
                "[{}] revoking {} unclaimed zero-copy buffer(s)",
                self.endpoint,
                self.published.len()
            );
            for handle in self.published.drain(..) {
                context::revoke(handle);
            }
        }
    }
}

fn resolve_auto(
    endpoint: &str,
    flags: FlagSet,
    timeouts: Timeouts,
) -> Result<(TransportKind, Transport)> {
    let mut last = IcomError::InvalidArgument(format!("[{endpoint}] no transport fits"));
    for &kind in TransportKind::auto_candidates(endpoint) {
        match Transport::open(kind, endpoint, flags, timeouts) {
            Ok(transport) => {
                log::debug!("[{endpoint}] auto resolved to {kind}");
                return Ok((kind, transport));
            }
            Err(e) => {
                log::debug!("[{endpoint}] auto: {kind} rejected: {e}");
                last = e;
            }
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeouts() -> Timeouts {
        Timeouts {
            recv: std::time::Duration::from_millis(100),
            send: std::time::Duration::from_millis(100),
        }
    }

    #[test]
    fn invalid_flags_fail_creation() {
        let flags = FlagSet::decode("bogus");
        assert!(matches!(
            Link::create(TransportKind::SocketBind, flags, "127.0.0.1:0", timeouts()),
            Err(IcomError::InvalidArgument(_))
        ));
        assert!(matches!(
            Link::create(
                TransportKind::SocketBind,
                FlagSet::NOTIFY | FlagSet::AUTO_NOTIFY,
                "127.0.0.1:0",
                timeouts()
            ),
            Err(IcomError::InvalidArgument(_))
        ));
    }

    #[test]
    fn auto_picks_bind_for_wildcard() {
        let link = Link::create(TransportKind::Auto, FlagSet::empty(), "*:0", timeouts()).unwrap();
        assert_eq!(link.kind(), TransportKind::SocketBind);
        assert_eq!(link.state(), LinkState::Listening);
    }

    #[test]
    fn auto_fails_with_last_error_when_nothing_fits() {
        assert!(Link::create(TransportKind::Auto, FlagSet::NOTIFY, "", timeouts()).is_err());
    }

    #[test]
    fn fresh_link_has_empty_buffer() {
        let link =
            Link::create(TransportKind::SocketBind, FlagSet::empty(), "127.0.0.1:0", timeouts())
                .unwrap();
        assert!(link.buffer().is_empty());
        assert_eq!(link.recv_len(), 0);
        assert_eq!(link.reallocations(), 0);
    }

    #[test]
    fn notify_recv_is_rejected_under_autonotify() {
        let mut link = Link::create(
            TransportKind::SocketBind,
            FlagSet::AUTO_NOTIFY,
            "127.0.0.1:0",
            timeouts(),
        )
        .unwrap();
        assert!(matches!(
            link.notify_recv(),
            Err(IcomError::InvalidArgument(_))
        ));
        // Nothing pending yet, so the flush is a no-op and does not accept.
        link.notify_send().unwrap();
        assert_eq!(link.state(), LinkState::Listening);
    }

    #[test]
    fn zero_copy_link_holds_a_lease() {
        let link =
            Link::create(TransportKind::SocketBind, FlagSet::ZERO_COPY, "127.0.0.1:0", timeouts())
                .unwrap();
        assert!(context::live_leases() >= 1);
        drop(link);
    }
}
