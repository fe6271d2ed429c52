//! `icom` — one communication API over many links.
//!
//! A program names its peers with a single specification string,
//! `"<type>|<flags>|<topology>"`, and moves buffers over every endpoint the
//! topology expands to:
//!
//! ```text
//!   "socket_rx|timeout|*:[8000-8002]"
//!        │        │          │
//!        │        │          └─ topology ─▶ *:8000, *:8001, *:8002
//!        │        └─ flags
//!        └─ transport kind
//! ```
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────────────────────┐
//!  │           Communicator           │  fan-out send, fan-in recv,
//!  │  (owns links in creation order)  │  buffer traversal
//!  └────┬─────────────┬───────────────┘
//!       │             │
//!  ┌────▼─────┐  ┌────▼─────┐
//!  │   Link   │  │   Link   │  framing, receive buffer, acks
//!  └────┬─────┘  └────┬─────┘
//!       │             │
//!  ┌────▼─────────────▼───────┐      ┌─────────┐
//!  │  Transport (socket/fifo) │◀────▶│  wire   │ header, payload, ack
//!  └──────────────────────────┘      └─────────┘
//! ```
//!
//! Modules:
//! - [`topology`]     — range/list expansion and field splitting
//! - [`flags`]        — flag tokens and the [`FlagSet`] bitmask
//! - [`kind`]         — transport tokens and wire ordinals
//! - [`wire`]         — message header and framing routines
//! - [`link`]         — one endpoint and its transfer protocol
//! - [`communicator`] — the multi-link aggregate
//! - [`config`]       — process-wide defaults
//! - [`context`]      — shared handle table for zero-copy transfers
//! - [`error`]        — the crate error type
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use icom::Communicator;
//!
//! # fn main() -> icom::Result<()> {
//! let mut rx = Communicator::init("socket_rx|default|*:8889")?;
//! let mut tx = Communicator::init("socket_tx|default|127.0.0.1:8889")?;
//!
//! let sender = std::thread::spawn(move || tx.send(&Bytes::from_static(b"hello")).into_result());
//! let buf = rx.recv_one()?;
//! assert_eq!(&*buf, b"hello");
//! sender.join().unwrap()?;
//! # Ok(())
//! # }
//! ```

pub mod communicator;
pub mod config;
pub mod context;
pub mod error;
pub mod flags;
pub mod kind;
pub mod link;
pub mod topology;
mod transport;
pub mod wire;

pub use communicator::{Communicator, LinkBuffer, Outcomes};
pub use config::{ConfigKey, Timeouts};
pub use error::{IcomError, Result};
pub use flags::FlagSet;
pub use kind::TransportKind;
pub use link::{Link, LinkState};
