//! One receive-side upload: reassembly plus the destination writer.
//!
//! [`UploadSession`] owns the [`Reassembler`] and the sink the file bytes
//! go to.  The server feeds it fragments and sends back whatever ACK it
//! returns; the session never touches the socket.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::TransferError;
use crate::packet::{Ack, Fragment};
use crate::path_guard::PathGuard;
use crate::reassembly::{FragmentOutcome, Leftovers, Reassembler};
use crate::state::SessionState;

/// What a finished upload produced.
#[derive(Debug)]
pub struct UploadSummary {
    pub destination: PathBuf,
    pub bytes_written: u64,
    pub chunks_written: u32,
    pub leftovers: Leftovers,
}

/// Receive-side state for the single active upload.
#[derive(Debug)]
pub struct UploadSession<W> {
    writer: W,
    destination: PathBuf,
    reassembler: Reassembler,
    state: SessionState,
    bytes_written: u64,
    chunks_written: u32,
}

impl UploadSession<File> {
    /// Open `relative` under the guard's root for writing, creating any
    /// missing parent directories.  An existing file is truncated.
    pub async fn create(
        guard: &PathGuard,
        relative: &str,
        window: usize,
    ) -> Result<Self, TransferError> {
        let destination = guard.resolve_strict(relative)?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::file(parent, e))?;
        }
        let file = File::create(&destination)
            .await
            .map_err(|e| TransferError::file(&destination, e))?;
        Ok(Self::open(file, destination, window))
    }
}

impl<W: AsyncWrite + Unpin> UploadSession<W> {
    /// Start a session writing into `writer`.  The session is `Open`.
    pub fn open(writer: W, destination: impl Into<PathBuf>, window: usize) -> Self {
        Self {
            writer,
            destination: destination.into(),
            reassembler: Reassembler::new(window),
            state: SessionState::Open,
            bytes_written: 0,
            chunks_written: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Feed one fragment; returns the acknowledgment to send back, if any.
    pub async fn on_fragment(&mut self, fragment: &Fragment) -> Result<Option<Ack>, TransferError> {
        match self.reassembler.on_fragment(fragment) {
            FragmentOutcome::Buffered | FragmentOutcome::Inconsistent => Ok(None),
            FragmentOutcome::OutOfWindow { ack } => {
                log::debug!(
                    "[recv] seq={} outside window at expected={}; dup ACK {}",
                    fragment.seq,
                    self.reassembler.expected(),
                    ack
                );
                Ok(Some(Ack { seq: ack }))
            }
            FragmentOutcome::Completed { ack, ready } => {
                self.write_chunks(ready).await?;
                log::debug!(
                    "[recv] chunk seq={} complete; expected={} pending={}",
                    ack,
                    self.reassembler.expected(),
                    self.reassembler.pending_len()
                );
                Ok(Some(Ack { seq: ack }))
            }
        }
    }

    /// Handle `END`: write what is still contiguous, flush and close.
    pub async fn finish(&mut self) -> Result<UploadSummary, TransferError> {
        self.state = SessionState::Draining;
        let (ready, leftovers) = self.reassembler.finish();
        self.write_chunks(ready).await?;
        if leftovers != Leftovers::default() {
            log::warn!(
                "[recv] {}: END with {} stranded and {} incomplete chunk(s) discarded",
                self.destination.display(),
                leftovers.stranded_chunks,
                leftovers.incomplete_chunks
            );
        }

        self.writer
            .flush()
            .await
            .map_err(|e| TransferError::file(&self.destination, e))?;
        self.writer
            .shutdown()
            .await
            .map_err(|e| TransferError::file(&self.destination, e))?;
        self.state = SessionState::Closed;

        Ok(UploadSummary {
            destination: self.destination.clone(),
            bytes_written: self.bytes_written,
            chunks_written: self.chunks_written,
            leftovers,
        })
    }

    #[cfg(test)]
    fn into_writer(self) -> W {
        self.writer
    }

    async fn write_chunks(&mut self, chunks: Vec<Vec<u8>>) -> Result<(), TransferError> {
        for chunk in chunks {
            self.writer
                .write_all(&chunk)
                .await
                .map_err(|e| TransferError::file(&self.destination, e))?;
            self.bytes_written += chunk.len() as u64;
            self.chunks_written += 1;
        }
        Ok(())
    }
}
