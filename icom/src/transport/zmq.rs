//! ZeroMQ transports. The kinds are part of the wire and token vocabulary
//! but have no implementation; creating one fails cleanly.

use crate::error::{IcomError, Result};
use crate::kind::TransportKind;

pub(crate) fn create(kind: TransportKind, endpoint: &str) -> Result<super::Transport> {
    log::debug!("[{endpoint}] {kind} requested but not implemented");
    Err(IcomError::NotImplemented(kind))
}
