//! Named-pipe transport: `fifo_tx` writes, `fifo_rx` reads.
//!
//! Creating either end makes the pipe if it is missing; the end that made it
//! removes it again when dropped. Opening is deferred to the first transfer
//! because opening one end of a FIFO blocks until the other end shows up.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use crate::error::{IcomError, Result};
use crate::flags::FlagSet;
use crate::kind::TransportKind;
use crate::link::LinkState;

const FIFO_MODE: libc::mode_t = 0o666;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Tx,
    Rx,
}

enum FifoState {
    PendingOpen,
    Open(File),
}

pub(crate) struct FifoTransport {
    path: PathBuf,
    direction: Direction,
    state: FifoState,
    /// This end ran `mkfifo` and owns the filesystem entry.
    created: bool,
}

impl FifoTransport {
    pub(crate) fn create(kind: TransportKind, endpoint: &str, flags: FlagSet) -> Result<Self> {
        let direction = match kind {
            TransportKind::FifoTx => Direction::Tx,
            TransportKind::FifoRx => Direction::Rx,
            other => {
                return Err(IcomError::InvalidArgument(format!(
                    "{other} is not a fifo transport"
                )))
            }
        };
        if endpoint.is_empty() {
            return Err(IcomError::InvalidArgument("empty fifo path".into()));
        }
        if flags.wants_ack() {
            return Err(IcomError::InvalidArgument(format!(
                "[{endpoint}] fifo links are one-way, notify is not supported"
            )));
        }
        if flags.contains(FlagSet::TIMEOUT) {
            log::warn!("[{endpoint}] timeout flag ignored on fifo links");
        }

        let path = PathBuf::from(endpoint);
        let created = ensure_fifo(&path).map_err(|e| IcomError::link(endpoint, e))?;
        log::debug!("[{endpoint}] {kind} ready (created: {created})");
        Ok(Self {
            path,
            direction,
            state: FifoState::PendingOpen,
            created,
        })
    }

    pub(crate) fn state(&self) -> LinkState {
        match self.state {
            FifoState::PendingOpen => LinkState::PendingOpen,
            FifoState::Open(_) => LinkState::Open,
        }
    }

    pub(crate) fn writer(&mut self) -> Result<&mut File> {
        self.require(Direction::Tx)?;
        self.file()
    }

    pub(crate) fn reader(&mut self) -> Result<&mut File> {
        self.require(Direction::Rx)?;
        self.file()
    }

    fn require(&self, direction: Direction) -> Result<()> {
        if self.direction != direction {
            return Err(IcomError::InvalidArgument(format!(
                "[{}] fifo end is {:?}-only",
                self.path.display(),
                self.direction
            )));
        }
        Ok(())
    }

    fn file(&mut self) -> Result<&mut File> {
        if let FifoState::PendingOpen = self.state {
            let mut options = OpenOptions::new();
            match self.direction {
                Direction::Tx => options.write(true),
                Direction::Rx => options.read(true),
            };
            let file = options.open(&self.path)?;
            log::debug!("[{}] opened", self.path.display());
            self.state = FifoState::Open(file);
        }
        match &mut self.state {
            FifoState::Open(file) => Ok(file),
            FifoState::PendingOpen => Err(IcomError::InvalidArgument(format!(
                "[{}] fifo not open",
                self.path.display()
            ))),
        }
    }
}

impl Drop for FifoTransport {
    fn drop(&mut self) {
        // Close before unlinking.
        self.state = FifoState::PendingOpen;
        if self.created {
            match fs::remove_file(&self.path) {
                Ok(()) => log::debug!("[{}] removed", self.path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("[{}] could not remove fifo: {e}", self.path.display()),
            }
        }
    }
}

/// Make sure `path` is a FIFO. Returns `true` if this call created it.
fn ensure_fifo(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => return Ok(false),
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path exists and is not a fifo",
            ))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the whole call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE) };
    if rc == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.kind() == io::ErrorKind::AlreadyExists {
        // The peer won the race.
        return Ok(false);
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creating_end_makes_and_removes_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.fifo");
        let endpoint = path.to_str().unwrap();

        let tx = FifoTransport::create(TransportKind::FifoTx, endpoint, FlagSet::empty()).unwrap();
        assert!(fs::metadata(&path).unwrap().file_type().is_fifo());
        assert_eq!(tx.state(), LinkState::PendingOpen);

        let rx = FifoTransport::create(TransportKind::FifoRx, endpoint, FlagSet::empty()).unwrap();
        assert!(tx.created);
        assert!(!rx.created);

        drop(rx);
        assert!(path.exists());
        drop(tx);
        assert!(!path.exists());
    }

    #[test]
    fn notify_flags_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n.fifo");
        for flags in [FlagSet::NOTIFY, FlagSet::AUTO_NOTIFY] {
            assert!(matches!(
                FifoTransport::create(TransportKind::FifoRx, path.to_str().unwrap(), flags),
                Err(IcomError::InvalidArgument(_))
            ));
        }
        assert!(!path.exists());
    }

    #[test]
    fn regular_file_is_not_a_fifo() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let endpoint = file.path().to_str().unwrap();
        assert!(matches!(
            FifoTransport::create(TransportKind::FifoTx, endpoint, FlagSet::empty()),
            Err(IcomError::Link { .. })
        ));
    }

    #[test]
    fn wrong_direction_is_rejected_without_opening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.fifo");
        let mut rx =
            FifoTransport::create(TransportKind::FifoRx, path.to_str().unwrap(), FlagSet::empty())
                .unwrap();
        assert!(matches!(rx.writer(), Err(IcomError::InvalidArgument(_))));
        assert_eq!(rx.state(), LinkState::PendingOpen);
    }
}
