//! Sending endpoint: uploads, remote deletes and session shutdown.
//!
//! # Upload flow
//!
//! ```text
//!  Client                                   Server
//!    │── 0x00000000 + "docs/a.txt" ────────▶│  open destination
//!    │── seq 1 frag 0..n ──────────────────▶│
//!    │── seq 2 frag 0..n ──────────────────▶│  (up to `capacity` chunks)
//!    │◀──────────────────────────── ACK 1 ──│
//!    │        ... ack wait expires ...      │
//!    │── seq 2 frag 0..n (whole window) ───▶│
//!    │◀──────────────────────────── ACK 2 ──│
//!    │── "END" ────────────────────────────▶│  close destination
//! ```
//!
//! Every expiry of the ack wait retransmits every chunk still in the window
//! and waits again with the same timeout.  There is no retry ceiling: a
//! permanently broken path stalls the upload until the caller gives up.

use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::config::WindowConfig;
use crate::error::{Severity, TransferError};
use crate::packet::{Ack, Request, CHUNK_SIZE};
use crate::socket::Transport;
use crate::window::{InFlightChunk, SendWindow};

/// What one upload did on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub chunks: u32,
    pub bytes: u64,
    /// Number of whole-window retransmissions triggered by ack timeouts.
    pub retransmit_bursts: u32,
}

/// Client half of the protocol, bound to one server address.
pub struct Client<T> {
    transport: T,
    server: SocketAddr,
    config: WindowConfig,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T, server: SocketAddr) -> Self {
        Self::with_config(transport, server, WindowConfig::default())
    }

    pub fn with_config(transport: T, server: SocketAddr, config: WindowConfig) -> Self {
        Self {
            transport,
            server,
            config,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upload the file at `path` into `folder` on the server (empty folder =
    /// server root).  The destination keeps the local file name.
    pub async fn upload(&self, path: &Path, folder: &str) -> Result<UploadReport, TransferError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TransferError::file(
                    path,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "no UTF-8 file name"),
                )
            })?;
        let destination = destination_path(folder, name);

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TransferError::file(path, e))?;
        log::info!("[client] uploading {} as '{}'", path.display(), destination);
        self.begin_upload(&destination, file).await
    }

    /// Announce `destination` with an upload-begin message, then stream
    /// `source` to it.
    pub async fn begin_upload<R>(
        &self,
        destination: &str,
        source: R,
    ) -> Result<UploadReport, TransferError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let begin = Request::UploadBegin {
            path: destination.to_string(),
        };
        self.send_control(&begin).await?;
        self.stream(source).await
    }

    /// Drive the sliding window until `source` is exhausted and every chunk
    /// is acknowledged, then send `END`.
    async fn stream<R>(&self, mut source: R) -> Result<UploadReport, TransferError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut window = SendWindow::new(self.config.capacity);
        let mut report = UploadReport::default();
        let mut exhausted = false;

        loop {
            while window.can_send() && !exhausted {
                let chunk = read_chunk(&mut source).await?;
                if chunk.is_empty() {
                    exhausted = true;
                    break;
                }
                report.chunks += 1;
                report.bytes += chunk.len() as u64;
                let entry = window.push(chunk);
                self.send_chunk(entry).await?;
                let seq = entry.seq;
                log::debug!("[client] → chunk seq={} in_flight={}", seq, window.in_flight());
            }

            if exhausted && window.is_empty() {
                break;
            }

            match timeout(self.config.ack_timeout, self.transport.recv_from()).await {
                Ok(Ok((datagram, addr))) => {
                    if addr != self.server {
                        continue;
                    }
                    match Ack::decode(&datagram) {
                        Ok(ack) => {
                            let slid = window.on_ack(ack.seq);
                            log::debug!("[client] ← ACK {} (in window: {})", ack.seq, slid);
                        }
                        Err(e) => log::debug!("[client] dropping non-ACK datagram: {e}"),
                    }
                }
                Ok(Err(e)) => {
                    let err = TransferError::from(e);
                    if err.severity() != Severity::Transient {
                        return Err(err);
                    }
                    log::debug!("[client] transient receive error: {err}");
                }
                Err(_elapsed) => {
                    report.retransmit_bursts += 1;
                    log::debug!(
                        "[client] timeout; retransmitting {} chunk(s)",
                        window.in_flight()
                    );
                    for entry in window.entries() {
                        self.send_chunk(entry).await?;
                    }
                }
            }
        }

        self.send_control(&Request::End).await?;
        log::info!(
            "[client] upload complete: {} chunk(s), {} byte(s), {} retransmission burst(s)",
            report.chunks,
            report.bytes,
            report.retransmit_bursts
        );
        Ok(report)
    }

    async fn send_chunk(&self, entry: &InFlightChunk) -> Result<(), TransferError> {
        for fragment in entry.fragments() {
            self.transport.send_to(&fragment.encode(), self.server).await?;
        }
        Ok(())
    }

    /// Send a control message and flush it past any datagram the transport
    /// is holding back; nothing may follow a control message to release it.
    async fn send_control(&self, request: &Request) -> Result<(), TransferError> {
        self.transport.send_to(&request.encode(), self.server).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Ask the server to delete one file; returns its status text.
    pub async fn delete_file(&self, path: &str) -> Result<String, TransferError> {
        self.request_status(Request::DeleteFile {
            path: path.to_string(),
        })
        .await
    }

    /// Ask the server to delete a folder and everything beneath it.
    pub async fn delete_folder(&self, path: &str) -> Result<String, TransferError> {
        self.request_status(Request::DeleteFolder {
            path: path.to_string(),
        })
        .await
    }

    /// Tell the server to shut down.  Fire-and-forget.
    pub async fn end_session(&self) -> Result<(), TransferError> {
        self.send_control(&Request::EndSession).await?;
        log::info!("[client] → END_SESSION");
        Ok(())
    }

    async fn request_status(&self, request: Request) -> Result<String, TransferError> {
        self.send_control(&request).await?;
        let wait = async {
            loop {
                let (datagram, addr) = self.transport.recv_from().await?;
                if addr != self.server {
                    continue;
                }
                // Late duplicate ACKs from an earlier upload are not the reply.
                if let Ok(ack) = Ack::decode(&datagram) {
                    log::debug!("[client] skipping stale ACK {} while awaiting status", ack.seq);
                    continue;
                }
                return Ok::<_, TransferError>(String::from_utf8_lossy(&datagram).into_owned());
            }
        };
        match timeout(self.config.ack_timeout, wait).await {
            Ok(reply) => reply,
            Err(_elapsed) => Err(TransferError::NoResponse(self.server)),
        }
    }
}

/// Server-side relative path for a file called `name` inside `folder`.
pub fn destination_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Read up to [`CHUNK_SIZE`] bytes, stopping short only at end of input.
async fn read_chunk<R>(source: &mut R) -> Result<Vec<u8>, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = Vec::with_capacity(CHUNK_SIZE);
    source
        .take(CHUNK_SIZE as u64)
        .read_to_end(&mut chunk)
        .await
        .map_err(|e| TransferError::file("<upload source>", e))?;
    Ok(chunk)
}
