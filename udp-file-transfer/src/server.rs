//! Receiving endpoint: the session dispatcher.
//!
//! [`Server::serve`] reads one datagram at a time and routes it:
//!
//! | Request         | Action                                            |
//! |-----------------|---------------------------------------------------|
//! | `END_SESSION`   | return from `serve`; the socket is released       |
//! | `DELETE…`       | validate path, remove file, reply with status     |
//! | `DELETE_FOLDER…`| validate path, remove subtree, reply with status  |
//! | upload-begin    | open the destination and run the upload loop      |
//! | fragment, `END` | dropped: no upload is open                        |
//!
//! While an upload is open the loop belongs to that upload: only fragments
//! and `END` from the uploading client are processed.  Delete requests and
//! `END_SESSION` arriving in that window are logged and dropped, not queued.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::fs;

use crate::config::{ServerConfig, WindowConfig};
use crate::error::{Severity, TransferError};
use crate::packet::Request;
use crate::path_guard::PathGuard;
use crate::receiver::{UploadSession, UploadSummary};
use crate::socket::{Socket, Transport};
use crate::state::SessionState;

/// Single-session file server.
pub struct Server<T> {
    transport: T,
    guard: PathGuard,
    window: WindowConfig,
    state: SessionState,
}

impl Server<Socket> {
    /// Bind the configured address.  Failure here is fatal.
    pub async fn bind(config: ServerConfig) -> Result<Self, TransferError> {
        let socket = Socket::bind(config.bind).await?;
        Ok(Self::with_transport(socket, config.root, config.window))
    }
}

impl<T: Transport> Server<T> {
    pub fn with_transport(transport: T, root: impl Into<PathBuf>, window: WindowConfig) -> Self {
        Self {
            transport,
            guard: PathGuard::new(root),
            window,
            state: SessionState::Idle,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Serve requests until `END_SESSION` arrives or a fatal error occurs.
    pub async fn serve(&mut self) -> Result<(), TransferError> {
        log::info!(
            "[server] serving {} on {}",
            self.guard.root().display(),
            self.local_addr()
        );

        loop {
            let Some((datagram, peer)) = self.recv().await? else {
                continue;
            };
            let request = match Request::decode(&datagram) {
                Ok(request) => request,
                Err(e) => {
                    log::debug!("[server] dropping datagram from {peer}: {e}");
                    continue;
                }
            };

            log::debug!("[server] {} from {peer} ({})", request.kind(), self.state);
            match request {
                Request::EndSession => {
                    log::info!("[server] END_SESSION from {peer}; shutting down");
                    return Ok(());
                }
                Request::DeleteFile { path } => self.handle_delete(&path, peer, false).await?,
                Request::DeleteFolder { path } => self.handle_delete(&path, peer, true).await?,
                Request::UploadBegin { path } => {
                    let result = self.receive_upload(&path, peer).await;
                    self.state = SessionState::Idle;
                    match result {
                        Ok(summary) => log::info!(
                            "[server] received {} ({} byte(s), {} chunk(s))",
                            summary.destination.display(),
                            summary.bytes_written,
                            summary.chunks_written
                        ),
                        Err(e) if e.severity() == Severity::Fatal => return Err(e),
                        Err(e) => log::warn!("[server] upload of '{path}' abandoned: {e}"),
                    }
                }
                Request::Fragment(_) | Request::End => {
                    log::debug!(
                        "[server] {} from {peer} with no upload open; dropped",
                        request.kind()
                    );
                }
            }
        }
    }

    /// Run one upload from `peer` to completion.
    async fn receive_upload(
        &mut self,
        relative: &str,
        peer: SocketAddr,
    ) -> Result<UploadSummary, TransferError> {
        let mut session =
            UploadSession::create(&self.guard, relative, self.window.capacity).await?;
        self.state = SessionState::Open;
        log::info!(
            "[server] receiving {} from {peer}",
            session.destination().display()
        );

        loop {
            let Some((datagram, addr)) = self.recv().await? else {
                continue;
            };
            if addr != peer {
                log::debug!("[server] ignoring {addr} while receiving from {peer}");
                continue;
            }

            match Request::decode(&datagram) {
                Ok(Request::Fragment(fragment)) => {
                    if let Some(ack) = session.on_fragment(&fragment).await? {
                        self.reply(&ack.encode(), peer).await?;
                    }
                }
                Ok(Request::End) => {
                    self.state = SessionState::Draining;
                    let summary = session.finish().await?;
                    self.state = session.state();
                    return Ok(summary);
                }
                Ok(other) => log::debug!(
                    "[server] {} not serviced while {}",
                    other.kind(),
                    self.state
                ),
                Err(e) => log::debug!("[server] dropping datagram from {peer}: {e}"),
            }
        }
    }

    async fn handle_delete(
        &self,
        relative: &str,
        peer: SocketAddr,
        folder: bool,
    ) -> Result<(), TransferError> {
        let status = delete_target(&self.guard, relative, folder).await;
        log::info!("[server] {status}");
        self.reply(status.as_bytes(), peer).await
    }

    /// Receive one datagram; `None` after a transient socket error.
    async fn recv(&self) -> Result<Option<(Vec<u8>, SocketAddr)>, TransferError> {
        match self.transport.recv_from().await {
            Ok(received) => Ok(Some(received)),
            Err(e) => {
                let err = TransferError::from(e);
                if err.severity() == Severity::Transient {
                    log::debug!("[server] transient receive error: {err}");
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn reply(&self, datagram: &[u8], peer: SocketAddr) -> Result<(), TransferError> {
        if let Err(e) = self.transport.send_to(datagram, peer).await {
            let err = TransferError::from(e);
            if err.severity() == Severity::Fatal {
                return Err(err);
            }
            log::debug!("[server] reply to {peer} failed: {err}");
        }
        Ok(())
    }
}

/// Delete `relative` (a file, or a whole folder when `folder` is set) and
/// return the status text sent back to the client.
///
/// Paths outside the root are reported exactly like missing ones.
pub async fn delete_target(guard: &PathGuard, relative: &str, folder: bool) -> String {
    let not_found = || format!("File or folder '{relative}' not found.");

    let target = match guard.resolve_strict(relative) {
        Ok(target) => target,
        Err(e) => {
            log::warn!("[server] delete refused: {e}");
            return not_found();
        }
    };
    if !fs::try_exists(&target).await.unwrap_or(false) {
        return not_found();
    }

    let removed = if folder {
        fs::remove_dir_all(&target).await
    } else {
        fs::remove_file(&target).await
    };
    match removed {
        Ok(()) if folder => format!("Folder '{relative}' deleted successfully."),
        Ok(()) => format!("File '{relative}' deleted successfully."),
        Err(e) => format!("Error deleting '{relative}': {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_file_then_not_found() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("a.txt"), b"x").unwrap();
        let guard = PathGuard::new(root.path());

        let status = delete_target(&guard, "a.txt", false).await;
        assert_eq!(status, "File 'a.txt' deleted successfully.");
        assert!(!root.path().join("a.txt").exists());

        let status = delete_target(&guard, "a.txt", false).await;
        assert_eq!(status, "File or folder 'a.txt' not found.");
    }

    #[tokio::test]
    async fn delete_folder_removes_subtree() {
        let root = tempfile::tempdir().unwrap();
        let docs = root.path().join("docs");
        std::fs::create_dir_all(docs.join("deep/er")).unwrap();
        std::fs::write(docs.join("one.txt"), b"1").unwrap();
        std::fs::write(docs.join("deep/er/two.txt"), b"2").unwrap();
        let guard = PathGuard::new(root.path());

        let status = delete_target(&guard, "docs", true).await;
        assert_eq!(status, "Folder 'docs' deleted successfully.");
        assert!(!docs.exists());
        assert!(root.path().exists());
    }

    #[tokio::test]
    async fn file_delete_on_folder_reports_error() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("dir")).unwrap();
        let guard = PathGuard::new(root.path());

        let status = delete_target(&guard, "dir", false).await;
        assert!(status.starts_with("Error deleting 'dir'"), "{status}");
        assert!(root.path().join("dir").exists());
    }

    #[tokio::test]
    async fn root_itself_cannot_be_deleted() {
        let root = tempfile::tempdir().unwrap();
        let guard = PathGuard::new(root.path());
        let status = delete_target(&guard, "", true).await;
        assert!(status.contains("not found"));
        assert!(root.path().exists());
    }
}
