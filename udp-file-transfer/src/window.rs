//! Send-side sliding window.
//!
//! [`SendWindow`] holds up to `capacity` chunks that have been transmitted but
//! not yet acknowledged, keyed by sequence number.
//!
//! # Protocol contract
//!
//! - Sequence numbers start at [`FIRST_DATA_SEQ`] and increase by one per
//!   chunk; 0 belongs to the upload-begin message.
//! - ACKs are **selective**: an ack for `S` removes exactly chunk `S`.
//!   Acks for chunks not in the window are ignored.
//! - On timeout the caller retransmits **every** chunk still in the window.
//!   There is no per-chunk timer and no backoff.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use std::collections::BTreeMap;

use crate::packet::{fragment_chunk, Fragment, FIRST_DATA_SEQ};

/// A single in-flight chunk occupying one slot in the window.
#[derive(Debug, Clone)]
pub struct InFlightChunk {
    pub seq: u32,
    /// Chunk bytes, kept until acknowledged so they can be re-fragmented.
    pub data: Vec<u8>,
}

impl InFlightChunk {
    pub fn fragments(&self) -> Vec<Fragment> {
        fragment_chunk(self.seq, &self.data)
    }
}

/// Sender-side window state for one upload.
///
/// ```text
///   lowest unacked              next_seq
///        │                          │
///  ──────┼──────────────────────────┼──────────▶ seq space
///        │ <─ in flight (≤ cap) ──▶ │ <── unread source ──▶
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Sequence number to use for the **next** new chunk.
    next_seq: u32,

    /// Maximum number of chunks in flight simultaneously.
    capacity: usize,

    window: BTreeMap<u32, InFlightChunk>,
}

impl SendWindow {
    /// `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1");
        Self {
            next_seq: FIRST_DATA_SEQ,
            capacity,
            window: BTreeMap::new(),
        }
    }

    /// `true` when there is room for at least one more chunk.
    pub fn can_send(&self) -> bool {
        self.window.len() < self.capacity
    }

    /// Number of chunks awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Place a chunk into the window and return its sequence number.
    ///
    /// The caller transmits `fragments()` of the returned entry.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is already full.  Check
    /// [`can_send`](Self::can_send) before calling.
    pub fn push(&mut self, data: Vec<u8>) -> &InFlightChunk {
        debug_assert!(
            self.can_send(),
            "push on a full window ({} / {})",
            self.window.len(),
            self.capacity
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        self.window.entry(seq).or_insert(InFlightChunk { seq, data })
    }

    /// Process an acknowledgment.  Returns `true` if `seq` was in flight.
    pub fn on_ack(&mut self, seq: u32) -> bool {
        self.window.remove(&seq).is_some()
    }

    /// In-flight chunks in ascending sequence order.
    pub fn entries(&self) -> impl Iterator<Item = &InFlightChunk> {
        self.window.values()
    }
}
