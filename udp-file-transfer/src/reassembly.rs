//! Receive-side reassembly state machine.
//!
//! [`Reassembler`] turns fragments that arrive in any order into whole
//! chunks, and whole chunks that complete in any order into a strictly
//! ascending stream:
//!
//! - Fragments for sequence numbers outside `[expected, expected + capacity)`
//!   are discarded.  A chunk that was already written is acknowledged again
//!   under its own sequence number; anything ahead of the range gets a
//!   duplicate ACK for `expected - 1`.
//! - Each in-window sequence number gets a [`FragmentSlot`] sized to the
//!   fragment count the first fragment declares.
//! - A completed chunk is acknowledged immediately and parked in the pending
//!   set until every lower sequence number has been handed out.
//!
//! This module only manages state; file writes and ACK transmission are the
//! caller's responsibility (see [`crate::receiver::UploadSession`]).

use std::collections::{BTreeMap, HashMap};

use crate::packet::{Fragment, FIRST_DATA_SEQ};

// ---------------------------------------------------------------------------
// FragmentSlot
// ---------------------------------------------------------------------------

/// Fixed-capacity fragment buffer for one chunk.
#[derive(Debug)]
struct FragmentSlot {
    parts: Box<[Option<Vec<u8>>]>,
    filled: usize,
}

impl FragmentSlot {
    fn new(total: u16) -> Self {
        Self {
            parts: vec![None; usize::from(total)].into_boxed_slice(),
            filled: 0,
        }
    }

    fn total(&self) -> usize {
        self.parts.len()
    }

    /// Store a fragment; a repeated index overwrites without counting twice.
    fn insert(&mut self, index: u16, payload: &[u8]) {
        let part = &mut self.parts[usize::from(index)];
        if part.is_none() {
            self.filled += 1;
        }
        *part = Some(payload.to_vec());
    }

    fn is_complete(&self) -> bool {
        self.filled == self.parts.len()
    }

    fn concat(self) -> Vec<u8> {
        self.parts.into_vec().into_iter().flatten().flatten().collect()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What the caller must do after feeding one fragment.
#[derive(Debug, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Stored; its chunk is still incomplete.  Nothing to send.
    Buffered,
    /// Chunk `ack` is complete (or completed again).  Send an ACK for it and
    /// append `ready` to the destination, in order.
    Completed { ack: u32, ready: Vec<Vec<u8>> },
    /// Outside the acceptance range.  Send a duplicate ACK for `ack`.
    OutOfWindow { ack: u32 },
    /// The fragment contradicts the slot already open for its chunk.
    Inconsistent,
}

// ---------------------------------------------------------------------------
// Reassembler
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Reassembler {
    /// Lowest sequence number not yet handed out for writing.
    expected: u32,
    /// Width of the acceptance range.
    capacity: u32,
    slots: HashMap<u32, FragmentSlot>,
    /// Completed chunks waiting for a lower sequence number.
    pending: BTreeMap<u32, Vec<u8>>,
}

/// Leftovers reported when a transfer ends.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Leftovers {
    /// Completed chunks that never became contiguous.
    pub stranded_chunks: usize,
    /// Chunks that still had missing fragments.
    pub incomplete_chunks: usize,
}

impl Reassembler {
    pub fn new(capacity: usize) -> Self {
        Self {
            expected: FIRST_DATA_SEQ,
            capacity: u32::try_from(capacity).unwrap_or(u32::MAX).max(1),
            slots: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Lowest sequence number not yet written.
    pub fn expected(&self) -> u32 {
        self.expected
    }

    /// Sequence number a duplicate ACK carries.
    pub fn last_in_order(&self) -> u32 {
        self.expected - 1
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn in_window(&self, seq: u32) -> bool {
        seq >= self.expected && seq - self.expected < self.capacity
    }

    /// Process one inbound data fragment.
    pub fn on_fragment(&mut self, fragment: &Fragment) -> FragmentOutcome {
        let seq = fragment.seq;
        if seq < self.expected {
            // Written already; a sender still holding it lost the first ACK.
            return FragmentOutcome::OutOfWindow { ack: seq };
        }
        if !self.in_window(seq) {
            return FragmentOutcome::OutOfWindow {
                ack: self.last_in_order(),
            };
        }

        let slot = self
            .slots
            .entry(seq)
            .or_insert_with(|| FragmentSlot::new(fragment.total));
        if slot.total() != usize::from(fragment.total) {
            log::debug!(
                "[reasm] seq={} declares {} fragments, slot has {}; dropped",
                seq,
                fragment.total,
                slot.total()
            );
            return FragmentOutcome::Inconsistent;
        }
        slot.insert(fragment.index, &fragment.payload);
        if !slot.is_complete() {
            return FragmentOutcome::Buffered;
        }

        let Some(slot) = self.slots.remove(&seq) else {
            return FragmentOutcome::Buffered;
        };
        let chunk = slot.concat();
        // A chunk already parked keeps its first copy; only the ACK repeats.
        self.pending.entry(seq).or_insert(chunk);

        FragmentOutcome::Completed {
            ack: seq,
            ready: self.drain(),
        }
    }

    /// Hand out every pending chunk contiguous with `expected`.
    fn drain(&mut self) -> Vec<Vec<u8>> {
        let mut ready = Vec::new();
        while let Some(chunk) = self.pending.remove(&self.expected) {
            ready.push(chunk);
            self.expected += 1;
        }
        if !ready.is_empty() {
            let expected = self.expected;
            self.slots.retain(|&seq, _| seq >= expected);
        }
        ready
    }

    /// Close out the transfer: return whatever is still contiguous and report
    /// what had to be discarded.
    pub fn finish(&mut self) -> (Vec<Vec<u8>>, Leftovers) {
        let ready = self.drain();
        let leftovers = Leftovers {
            stranded_chunks: self.pending.len(),
            incomplete_chunks: self.slots.len(),
        };
        self.pending.clear();
        self.slots.clear();
        (ready, leftovers)
    }
}
