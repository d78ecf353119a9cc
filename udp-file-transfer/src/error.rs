//! Crate-wide error type and its severity classification.
//!
//! Both dispatch loops match on [`TransferError::severity`] to decide what to
//! do next: keep reading, abandon the current exchange, or stop.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::packet::PacketError;
use crate::path_guard::PathError;

/// How the dispatcher reacts to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Drop the datagram or retry the read; nothing is torn down.
    Transient,
    /// Abandon the current exchange and return to idle.
    Abort,
    /// Stop the endpoint.
    Fatal,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("socket I/O error: {0}")]
    Socket(#[source] io::Error),
    #[error("file I/O error on {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed datagram: {0}")]
    Packet(#[from] PacketError),
    #[error("rejected path: {0}")]
    Path(#[from] PathError),
    #[error("no response from {0} within the ack timeout")]
    NoResponse(std::net::SocketAddr),
}

impl TransferError {
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Socket(e) if is_transient_io_error(e) => Severity::Transient,
            Self::Socket(_) => Severity::Fatal,
            Self::Packet(_) | Self::NoResponse(_) => Severity::Transient,
            Self::File { .. } | Self::Path(_) => Severity::Abort,
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        Self::Socket(e)
    }
}

/// Returns true if the error is likely transient (retry may succeed).
///
/// `ConnectionReset` / `ConnectionRefused` show up on some platforms after an
/// ICMP port-unreachable for an earlier datagram; the socket is still usable.
fn is_transient_io_error(e: &io::Error) -> bool {
    use io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::Interrupted
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
    )
}
