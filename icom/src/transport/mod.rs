//! Concrete transports behind a [`crate::link::Link`].
//!
//! Each transport owns its own state enum and establishes itself lazily the
//! first time a reader or writer is requested.

mod fifo;
mod socket;
mod zmq;

use std::io::{Read, Write};

use crate::config::Timeouts;
use crate::error::{IcomError, Result};
use crate::flags::FlagSet;
use crate::kind::TransportKind;
use crate::link::LinkState;

use fifo::FifoTransport;
use socket::SocketTransport;

pub(crate) enum Transport {
    Socket(SocketTransport),
    Fifo(FifoTransport),
}

impl Transport {
    /// Create the transport for one concrete kind.
    pub(crate) fn open(
        kind: TransportKind,
        endpoint: &str,
        flags: FlagSet,
        timeouts: Timeouts,
    ) -> Result<Transport> {
        let timeouts = flags.contains(FlagSet::TIMEOUT).then_some(timeouts);
        match kind {
            TransportKind::SocketConnect => {
                SocketTransport::connect(endpoint, timeouts).map(Transport::Socket)
            }
            TransportKind::SocketBind => {
                SocketTransport::bind(endpoint, timeouts).map(Transport::Socket)
            }
            TransportKind::FifoTx | TransportKind::FifoRx => {
                FifoTransport::create(kind, endpoint, flags).map(Transport::Fifo)
            }
            TransportKind::ZmqPush
            | TransportKind::ZmqPull
            | TransportKind::ZmqPub
            | TransportKind::ZmqSub
            | TransportKind::ZmqReq
            | TransportKind::ZmqRep => zmq::create(kind, endpoint),
            TransportKind::Auto => Err(IcomError::InvalidArgument(
                "auto must be resolved before opening a transport".into(),
            )),
        }
    }

    pub(crate) fn state(&self) -> LinkState {
        match self {
            Transport::Socket(s) => s.state(),
            Transport::Fifo(f) => f.state(),
        }
    }

    pub(crate) fn writer(&mut self) -> Result<&mut dyn Write> {
        match self {
            Transport::Socket(s) => Ok(s.stream()?),
            Transport::Fifo(f) => Ok(f.writer()?),
        }
    }

    pub(crate) fn reader(&mut self) -> Result<&mut dyn Read> {
        match self {
            Transport::Socket(s) => Ok(s.stream()?),
            Transport::Fifo(f) => Ok(f.reader()?),
        }
    }
}
