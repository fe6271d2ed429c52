//! The multi-link communicator.
//!
//! A [`Communicator`] is built from one `"type|flags|topology"` string and
//! owns one [`Link`] per expanded endpoint. Every operation fans out over
//! all links in creation order and returns per-link [`Outcomes`].
//!
//! ```text
//!                      ┌──────────────┐
//!   send(buf) ────────▶│ Communicator │───▶ Link 0 ──▶ endpoint 0
//!                      │              │───▶ Link 1 ──▶ endpoint 1
//!   recv() ◀───────────│              │───▶ Link N ──▶ endpoint N
//!                      └──────────────┘
//! ```

use std::ops::Deref;

use bytes::Bytes;

use crate::config::Timeouts;
use crate::error::{IcomError, Result};
use crate::flags::FlagSet;
use crate::kind::TransportKind;
use crate::link::Link;
use crate::topology::CompositeSpec;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Per-link results of one fanned-out operation, in link order.
#[derive(Debug)]
pub struct Outcomes<T> {
    results: Vec<Result<T>>,
}

impl<T> Outcomes<T> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Result<T>> {
        self.results.get(index)
    }

    /// Result of the first link.
    pub fn first(&self) -> Option<&Result<T>> {
        self.results.first()
    }

    /// Index and error of the first failing link.
    pub fn first_error(&self) -> Option<(usize, &IcomError)> {
        self.results
            .iter()
            .enumerate()
            .find_map(|(i, r)| r.as_ref().err().map(|e| (i, e)))
    }

    pub fn all_ok(&self) -> bool {
        self.results.iter().all(Result::is_ok)
    }

    /// Collapse to the first error, or every value in link order.
    pub fn into_result(self) -> Result<Vec<T>> {
        self.results.into_iter().collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Result<T>> {
        self.results.iter()
    }

    pub fn into_inner(self) -> Vec<Result<T>> {
        self.results
    }
}

impl<T> IntoIterator for Outcomes<T> {
    type Item = Result<T>;
    type IntoIter = std::vec::IntoIter<Result<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<T> FromIterator<Result<T>> for Outcomes<T> {
    fn from_iter<I: IntoIterator<Item = Result<T>>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// LinkBuffer
// ---------------------------------------------------------------------------

/// The received bytes of one link, tagged with the link's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkBuffer<'a> {
    index: usize,
    bytes: &'a [u8],
}

impl<'a> LinkBuffer<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl Deref for LinkBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

// ---------------------------------------------------------------------------
// Communicator
// ---------------------------------------------------------------------------

pub struct Communicator {
    kind: TransportKind,
    flags: FlagSet,
    links: Vec<Link>,
    endpoints: Vec<String>,
}

impl Communicator {
    /// Build from `"type|flags|topology"` using the configured timeouts.
    pub fn init(spec: &str) -> Result<Self> {
        Self::init_with(spec, Timeouts::from_defaults())
    }

    /// Build with explicit timeouts instead of the process-wide defaults.
    ///
    /// If any link fails, the ones already created are released in reverse
    /// order before the error is returned.
    pub fn init_with(spec: &str, timeouts: Timeouts) -> Result<Self> {
        let CompositeSpec {
            kind,
            flags,
            endpoints,
        } = CompositeSpec::parse(spec)?;

        let mut links: Vec<Link> = Vec::new();
        links.try_reserve_exact(endpoints.len())?;
        for endpoint in &endpoints {
            match Link::create(kind, flags, endpoint, timeouts) {
                Ok(link) => links.push(link),
                Err(e) => {
                    log::debug!(
                        "[{endpoint}] link failed ({e}), unwinding {} link(s)",
                        links.len()
                    );
                    release_reversed(&mut links);
                    return Err(e);
                }
            }
        }

        log::debug!("communicator {spec:?} up with {} link(s)", links.len());
        Ok(Self {
            kind,
            flags,
            links,
            endpoints,
        })
    }

    /// Kind as written in the specification (may be `auto`).
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn flags(&self) -> FlagSet {
        self.flags
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn link(&self, index: usize) -> Option<&Link> {
        self.links.get(index)
    }

    // -----------------------------------------------------------------------
    // Fan-out / fan-in
    // -----------------------------------------------------------------------

    /// Send `buf` on every link.
    pub fn send(&mut self, buf: &Bytes) -> Outcomes<()> {
        self.links.iter_mut().map(|link| link.send(buf)).collect()
    }

    /// Copying convenience over [`Communicator::send`].
    pub fn send_slice(&mut self, buf: &[u8]) -> Outcomes<()> {
        self.send(&Bytes::copy_from_slice(buf))
    }

    /// Receive one message on every link into that link's buffer.
    pub fn recv(&mut self) -> Outcomes<usize> {
        self.links.iter_mut().map(Link::recv).collect()
    }

    /// Receive on every link and hand back the first link's buffer.
    pub fn recv_one(&mut self) -> Result<LinkBuffer<'_>> {
        self.recv().into_result()?;
        self.next_buffer(None)
            .ok_or_else(|| IcomError::InvalidArgument("communicator has no links".into()))
    }

    /// `None` gives the first buffer; a buffer gives the one after it.
    pub fn next_buffer(&self, prev: Option<LinkBuffer<'_>>) -> Option<LinkBuffer<'_>> {
        let index = prev.map_or(0, |b| b.index + 1);
        self.links.get(index).map(|link| LinkBuffer {
            index,
            bytes: link.buffer(),
        })
    }

    /// Every link's buffer in creation order.
    pub fn buffers(&self) -> impl Iterator<Item = LinkBuffer<'_>> {
        self.links
            .iter()
            .enumerate()
            .map(|(index, link)| LinkBuffer {
                index,
                bytes: link.buffer(),
            })
    }

    pub fn notify_send(&mut self) -> Outcomes<()> {
        self.links.iter_mut().map(Link::notify_send).collect()
    }

    pub fn notify_recv(&mut self) -> Outcomes<()> {
        self.links.iter_mut().map(Link::notify_recv).collect()
    }

    /// Release every link in reverse creation order.
    pub fn deinit(self) {
        drop(self);
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        release_reversed(&mut self.links);
        log::debug!("communicator released");
    }
}

fn release_reversed(links: &mut Vec<Link>) {
    while let Some(link) = links.pop() {
        drop(link);
    }
}
