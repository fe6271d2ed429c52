//! Wire framing shared by every stream transport.
//!
//! No connection handling happens here: the routines run over any
//! [`Read`]/[`Write`] so links, tests and fault-injecting mocks share them.
//!
//! # Wire format
//!
//! All integers are **little-endian**.
//!
//! ```text
//!  0               4               8               12
//! +---------------+---------------+---------------+------------------------+
//! | kind ordinal  |     flags     | payload_size  | payload | handle (8)   |
//! +---------------+---------------+---------------+------------------------+
//!
//!  ack:
//! +---------------+
//! |    1 (u32)    |
//! +---------------+
//! ```
//!
//! `payload_size` is always the real buffer length, including for zero-copy
//! frames whose slot carries an 8-byte handle instead of the bytes.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut};

use crate::error::{IcomError, Result};
use crate::flags::FlagSet;
use crate::kind::TransportKind;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 12;
/// Byte length of a zero-copy handle.
pub const HANDLE_LEN: usize = 8;
/// Byte length of an acknowledgement.
pub const ACK_LEN: usize = 4;
/// The only valid acknowledgement value.
pub const ACK_VALUE: u32 = 1;

/// Header preceding every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: TransportKind,
    pub flags: FlagSet,
    pub payload_size: u32,
}

impl MessageHeader {
    /// Build a header for `len` payload bytes.
    pub fn new(kind: TransportKind, flags: FlagSet, len: usize) -> Result<Self> {
        let payload_size = u32::try_from(len).map_err(|_| {
            IcomError::InvalidArgument(format!("payload of {len} bytes exceeds u32::MAX"))
        })?;
        Ok(Self {
            kind,
            flags,
            payload_size,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        let mut dst = &mut buf[..];
        dst.put_u32_le(self.kind.ordinal());
        dst.put_u32_le(self.flags.bits());
        dst.put_u32_le(self.payload_size);
        buf
    }

    /// Parse a header; an unknown kind ordinal is invalid data.
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Result<Self> {
        let mut src = &raw[..];
        let ordinal = src.get_u32_le();
        let flags = FlagSet::from_bits_retain(src.get_u32_le());
        let payload_size = src.get_u32_le();
        let kind = TransportKind::from_ordinal(ordinal).ok_or_else(|| {
            IcomError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown transport ordinal {ordinal} in header"),
            ))
        })?;
        Ok(Self {
            kind,
            flags,
            payload_size,
        })
    }

    pub fn payload_len(&self) -> usize {
        self.payload_size as usize
    }

    pub fn is_zero_copy(&self) -> bool {
        self.flags.contains(FlagSet::ZERO_COPY)
    }
}

// ---------------------------------------------------------------------------
// Send side
// ---------------------------------------------------------------------------

/// Write the whole header.
///
/// A send timeout before any byte left is [`IcomError::Timeout`]; once part
/// of the header is out it is [`IcomError::PartialTransfer`].
pub fn write_header<W: Write + ?Sized>(w: &mut W, header: &MessageHeader) -> Result<()> {
    write_fixed(w, &header.encode())
}

/// Write the payload with a single write call.
///
/// A short write is reported, not retried: the peer is already expecting
/// `payload.len()` bytes.
pub fn write_payload<W: Write + ?Sized>(w: &mut W, payload: &[u8]) -> Result<()> {
    if payload.is_empty() {
        return Ok(());
    }
    let written = loop {
        match w.write(payload) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => break result?,
        }
    };
    if written < payload.len() {
        log::warn!("short payload write: {written} of {} bytes", payload.len());
        return Err(IcomError::PartialTransfer {
            expected: payload.len(),
            actual: written,
        });
    }
    Ok(())
}

/// Header followed by the payload bytes.
pub fn write_frame<W: Write + ?Sized>(
    w: &mut W,
    header: &MessageHeader,
    payload: &[u8],
) -> Result<()> {
    write_header(w, header)?;
    write_payload(w, payload)
}

pub fn write_handle<W: Write + ?Sized>(w: &mut W, handle: u64) -> Result<()> {
    write_fixed(w, &handle.to_le_bytes())
}

pub fn write_ack<W: Write + ?Sized>(w: &mut W) -> Result<()> {
    write_fixed(w, &ACK_VALUE.to_le_bytes())?;
    w.flush()?;
    Ok(())
}

/// `write_all` that tells a clean timeout from one that split the record.
fn write_fixed<W: Write + ?Sized>(w: &mut W, buf: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match w.write(&buf[written..]) {
            Ok(0) => return Err(IcomError::Io(io::ErrorKind::WriteZero.into())),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(split_record(e, buf.len(), written)),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Receive side
// ---------------------------------------------------------------------------

/// Read a full header. Peer close before or inside it is `UnexpectedEof`.
///
/// A timeout is [`IcomError::Timeout`] only while no header byte has been
/// consumed; after that the stream is off a frame boundary and the result is
/// [`IcomError::PartialTransfer`].
pub fn read_header<R: Read + ?Sized>(r: &mut R) -> Result<MessageHeader> {
    let mut raw = [0u8; HEADER_LEN];
    read_fixed(r, &mut raw)?;
    MessageHeader::decode(&raw)
}

/// Fill `buf`, looping over short reads until it is full or the peer closes.
///
/// Returns the byte count on success. Falling short yields
/// [`IcomError::PartialTransfer`]; the bytes that did arrive stay in `buf`.
pub fn read_payload<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            // Nothing arrived yet: a clean timeout the caller may retry.
            Err(e) if filled == 0 => return Err(e.into()),
            Err(e) => {
                log::debug!("payload read stopped after {filled} bytes: {e}");
                break;
            }
        }
    }
    if filled < buf.len() {
        log::warn!("short payload read: {filled} of {} bytes", buf.len());
        return Err(IcomError::PartialTransfer {
            expected: buf.len(),
            actual: filled,
        });
    }
    Ok(filled)
}

pub fn read_handle<R: Read + ?Sized>(r: &mut R) -> Result<u64> {
    let mut raw = [0u8; HANDLE_LEN];
    read_fixed(r, &mut raw)?;
    Ok(u64::from_le_bytes(raw))
}

/// Wait for one acknowledgement; any value other than 1 is invalid data.
pub fn read_ack<R: Read + ?Sized>(r: &mut R) -> Result<()> {
    let mut raw = [0u8; ACK_LEN];
    read_fixed(r, &mut raw)?;
    let value = u32::from_le_bytes(raw);
    if value != ACK_VALUE {
        return Err(IcomError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected ack value {value}"),
        )));
    }
    Ok(())
}

/// `read_exact` that tells a clean timeout from one that split the record.
fn read_fixed<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Err(IcomError::Io(io::ErrorKind::UnexpectedEof.into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(split_record(e, buf.len(), filled)),
        }
    }
    Ok(())
}

fn split_record(err: io::Error, expected: usize, actual: usize) -> IcomError {
    match IcomError::from(err) {
        IcomError::Timeout if actual > 0 => {
            log::warn!("timed out after {actual} of {expected} record bytes");
            IcomError::PartialTransfer { expected, actual }
        }
        other => other,
    }
}
