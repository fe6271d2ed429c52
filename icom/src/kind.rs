//! Transport kinds and their textual tokens.
//!
//! The ordinal of each kind is part of the wire format (first header field),
//! so the numbering below must never be reshuffled.

use std::fmt;
use std::str::FromStr;

use crate::error::IcomError;

/// Every transport a link can be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// TCP, active open (`socket_tx`).
    SocketConnect,
    /// TCP, passive open (`socket_rx`).
    SocketBind,
    /// Named pipe, write end.
    FifoTx,
    /// Named pipe, read end.
    FifoRx,
    ZmqPush,
    ZmqPull,
    ZmqPub,
    ZmqSub,
    ZmqReq,
    ZmqRep,
    /// Resolved to a concrete kind when the link is created.
    Auto,
}

// (kind, token) in ordinal order.
const TOKENS: [(TransportKind, &str); 11] = [
    (TransportKind::SocketConnect, "socket_tx"),
    (TransportKind::SocketBind, "socket_rx"),
    (TransportKind::FifoTx, "fifo_tx"),
    (TransportKind::FifoRx, "fifo_rx"),
    (TransportKind::ZmqPush, "zmq_push"),
    (TransportKind::ZmqPull, "zmq_pull"),
    (TransportKind::ZmqPub, "zmq_pub"),
    (TransportKind::ZmqSub, "zmq_sub"),
    (TransportKind::ZmqReq, "zmq_req"),
    (TransportKind::ZmqRep, "zmq_rep"),
    (TransportKind::Auto, "auto"),
];

impl TransportKind {
    /// Kinds [`TransportKind::Auto`] tries for `endpoint`, in order.
    ///
    /// `host:port` endpoints only try the socket kinds; anything else is a
    /// path and only tries the FIFO kinds.
    pub fn auto_candidates(endpoint: &str) -> &'static [TransportKind] {
        const SOCKET: &[TransportKind] =
            &[TransportKind::SocketConnect, TransportKind::SocketBind];
        const FIFO: &[TransportKind] = &[TransportKind::FifoTx, TransportKind::FifoRx];
        if is_socket_endpoint(endpoint) {
            SOCKET
        } else {
            FIFO
        }
    }

    /// Decode a token; `None` for anything unknown (no best-effort matching).
    pub fn from_token(token: &str) -> Option<Self> {
        TOKENS
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(kind, _)| *kind)
    }

    pub fn token(self) -> &'static str {
        TOKENS[self.ordinal() as usize].1
    }

    /// Wire ordinal of this kind.
    pub fn ordinal(self) -> u32 {
        match self {
            TransportKind::SocketConnect => 0,
            TransportKind::SocketBind => 1,
            TransportKind::FifoTx => 2,
            TransportKind::FifoRx => 3,
            TransportKind::ZmqPush => 4,
            TransportKind::ZmqPull => 5,
            TransportKind::ZmqPub => 6,
            TransportKind::ZmqSub => 7,
            TransportKind::ZmqReq => 8,
            TransportKind::ZmqRep => 9,
            TransportKind::Auto => 10,
        }
    }

    pub fn from_ordinal(value: u32) -> Option<Self> {
        TOKENS.get(value as usize).map(|(kind, _)| *kind)
    }

    pub fn is_zmq(self) -> bool {
        matches!(
            self,
            TransportKind::ZmqPush
                | TransportKind::ZmqPull
                | TransportKind::ZmqPub
                | TransportKind::ZmqSub
                | TransportKind::ZmqReq
                | TransportKind::ZmqRep
        )
    }

    pub fn is_fifo(self) -> bool {
        matches!(self, TransportKind::FifoTx | TransportKind::FifoRx)
    }
}

impl FromStr for TransportKind {
    type Err = IcomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransportKind::from_token(s).ok_or_else(|| IcomError::Lookup(s.to_string()))
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// `host:port` with a non-empty host and a decimal port.
fn is_socket_endpoint(endpoint: &str) -> bool {
    endpoint.rsplit_once(':').is_some_and(|(host, port)| {
        !host.is_empty() && !host.contains('/') && port.parse::<u16>().is_ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_decode_to_kinds() {
        assert_eq!(
            TransportKind::from_token("socket_tx"),
            Some(TransportKind::SocketConnect)
        );
        assert_eq!(
            TransportKind::from_token("socket_rx"),
            Some(TransportKind::SocketBind)
        );
        assert_eq!(TransportKind::from_token("zmq_sub"), Some(TransportKind::ZmqSub));
        assert_eq!(TransportKind::from_token("auto"), Some(TransportKind::Auto));
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert_eq!(TransportKind::from_token("socket"), None);
        assert_eq!(TransportKind::from_token("SOCKET_TX"), None);
        assert_eq!(TransportKind::from_token(" socket_tx"), None);
        assert!(matches!(
            "inproc".parse::<TransportKind>(),
            Err(IcomError::Lookup(_))
        ));
    }

    #[test]
    fn ordinals_are_stable_and_reversible() {
        for (i, (kind, token)) in TOKENS.iter().enumerate() {
            assert_eq!(kind.ordinal(), i as u32);
            assert_eq!(TransportKind::from_ordinal(i as u32), Some(*kind));
            assert_eq!(kind.token(), *token);
        }
        assert_eq!(TransportKind::from_ordinal(11), None);
    }

    #[test]
    fn display_uses_token() {
        assert_eq!(TransportKind::FifoRx.to_string(), "fifo_rx");
    }

    #[test]
    fn auto_candidates_follow_endpoint_syntax() {
        let socket = [TransportKind::SocketConnect, TransportKind::SocketBind];
        let fifo = [TransportKind::FifoTx, TransportKind::FifoRx];
        assert_eq!(TransportKind::auto_candidates("127.0.0.1:8889"), socket);
        assert_eq!(TransportKind::auto_candidates("*:8890"), socket);
        assert_eq!(TransportKind::auto_candidates("/tmp/icom.fifo"), fifo);
        assert_eq!(TransportKind::auto_candidates("/tmp/a:1"), fifo);
        assert_eq!(TransportKind::auto_candidates("host:99999"), fifo);
        assert_eq!(TransportKind::auto_candidates(":80"), fifo);
        assert_eq!(TransportKind::auto_candidates(""), fifo);
    }
}
