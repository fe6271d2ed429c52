//! Process-wide handle table backing zero-copy transfers.
//!
//! A zero-copy sender publishes its buffer here and ships only the returned
//! 8-byte handle; the receiver takes the buffer back out by handle. Both ends
//! must therefore live in the same process.
//!
//! ```text
//!   sender link                 CONTEXT                  receiver link
//!   publish(bytes) ──handle──▶ { handle -> Bytes } ──▶ take(handle)
//! ```
//!
//! The table is created lazily on first use. Every zero-copy link holds a
//! [`Lease`]; only [`release`] tears the table down, and it refuses while any
//! lease is alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

use crate::error::{IcomError, Result};

#[derive(Default)]
struct Table {
    buffers: HashMap<u64, Bytes>,
    leases: usize,
}

static CONTEXT: Mutex<Option<Table>> = Mutex::new(None);

// Handles are never reused, even across release/re-create cycles.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn lock() -> MutexGuard<'static, Option<Table>> {
    CONTEXT.lock().unwrap_or_else(|e| e.into_inner())
}

fn table(guard: &mut Option<Table>) -> &mut Table {
    guard.get_or_insert_with(|| {
        log::debug!("zero-copy context created");
        Table::default()
    })
}

/// Keeps the shared context alive for the lifetime of one link.
#[derive(Debug)]
pub struct Lease {
    _private: (),
}

impl Lease {
    pub fn acquire() -> Lease {
        table(&mut lock()).leases += 1;
        Lease { _private: () }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(t) = lock().as_mut() {
            t.leases = t.leases.saturating_sub(1);
        }
    }
}

/// Store `buf` and return the handle that names it.
pub fn publish(buf: Bytes) -> u64 {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    table(&mut lock()).buffers.insert(handle, buf);
    handle
}

/// Remove and return the buffer named by `handle`.
pub fn take(handle: u64) -> Result<Bytes> {
    lock()
        .as_mut()
        .and_then(|t| t.buffers.remove(&handle))
        .ok_or_else(|| {
            IcomError::InvalidArgument(format!("unknown zero-copy handle {handle:#x}"))
        })
}

/// Drop a published buffer that will never be taken. Unknown handles are ignored.
pub fn revoke(handle: u64) {
    if let Some(t) = lock().as_mut() {
        t.buffers.remove(&handle);
    }
}

/// Keep only the handles in `handles` that have not been taken yet.
pub fn retain_unclaimed(handles: &mut Vec<u64>) {
    match lock().as_ref() {
        Some(t) => handles.retain(|h| t.buffers.contains_key(h)),
        None => handles.clear(),
    }
}

/// Number of published buffers nobody has taken.
pub fn unclaimed() -> usize {
    lock().as_ref().map_or(0, |t| t.buffers.len())
}

/// Number of live leases; zero when the context does not exist.
pub fn live_leases() -> usize {
    lock().as_ref().map_or(0, |t| t.leases)
}

pub fn is_active() -> bool {
    lock().is_some()
}

/// Tear the context down, dropping any buffer that was never taken.
///
/// Fails with [`IcomError::InvalidArgument`] while a zero-copy link is alive.
/// Releasing a context that does not exist is a no-op.
pub fn release() -> Result<()> {
    let mut guard = lock();
    if let Some(t) = guard.as_ref() {
        if t.leases > 0 {
            return Err(IcomError::InvalidArgument(format!(
                "zero-copy context still used by {} link(s)",
                t.leases
            )));
        }
        if !t.buffers.is_empty() {
            log::warn!("releasing {} unclaimed zero-copy buffer(s)", t.buffers.len());
        }
    }
    *guard = None;
    log::debug!("zero-copy context released");
    Ok(())
}
