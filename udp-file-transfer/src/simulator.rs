//! Fault-injecting transport for testing the reliability mechanisms.
//!
//! Real networks drop, reorder, and duplicate datagrams.  To exercise
//! retransmission and reassembly without depending on actual network
//! conditions, [`Simulator`] wraps any [`Transport`] and intercepts sends,
//! applying a configurable fault model:
//!
//! | Fault        | Description                                            |
//! |--------------|--------------------------------------------------------|
//! | Packet loss  | Drop a datagram with probability `loss_rate`.          |
//! | Reordering   | Hold a datagram back until the next send or `flush`.   |
//! | Duplication  | Deliver a datagram twice.                              |
//! | Drop filter  | Drop exactly the datagrams a caller-supplied predicate |
//! |              | selects (deterministic scenarios).                     |
//!
//! Randomness comes from a seeded [`StdRng`] so a failing run can be replayed.
//! Receives pass straight through; wrap both ends to fault both directions.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::socket::Transport;

/// Configuration for the fault-injection model.
///
/// All probabilities are clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Seed for the fault RNG.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: a transparent pass-through.
        Self {
            loss_rate: 0.0,
            reorder_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

/// Predicate deciding whether an outgoing datagram is dropped.
pub type DropFilter = Box<dyn FnMut(&[u8], SocketAddr) -> bool + Send>;

/// Counters of what the simulator did to outgoing traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    /// Datagrams handed to the inner transport (including duplicates).
    pub delivered: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    dropped: AtomicU64,
    duplicated: AtomicU64,
    reordered: AtomicU64,
}

/// A fault-injecting wrapper around another transport.
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    rng: Mutex<StdRng>,
    filter: Mutex<Option<DropFilter>>,
    /// A datagram held back to be sent after the next one.
    held: Mutex<Option<(Vec<u8>, SocketAddr)>>,
    counters: Counters,
}

fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport> Simulator<T> {
    pub fn new(inner: T, mut config: SimulatorConfig) -> Self {
        config.loss_rate = config.loss_rate.clamp(0.0, 1.0);
        config.reorder_rate = config.reorder_rate.clamp(0.0, 1.0);
        config.duplicate_rate = config.duplicate_rate.clamp(0.0, 1.0);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            rng: Mutex::new(rng),
            filter: Mutex::new(None),
            held: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Install a deterministic drop predicate, applied before random faults.
    pub fn with_filter(self, filter: DropFilter) -> Self {
        *lock(&self.filter) = Some(filter);
        self
    }

    pub fn stats(&self) -> SimulatorStats {
        SimulatorStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            duplicated: self.counters.duplicated.load(Ordering::Relaxed),
            reordered: self.counters.reordered.load(Ordering::Relaxed),
        }
    }

    async fn deliver(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(datagram, dest).await?;
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl<T: Transport> Transport for Simulator<T> {
    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<()> {
        let filtered = lock(&self.filter)
            .as_mut()
            .is_some_and(|filter| filter(datagram, dest));
        if filtered {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("[sim] filter dropped {} byte datagram", datagram.len());
            return Ok(());
        }

        let (lose, hold, duplicate) = {
            let mut rng = lock(&self.rng);
            (
                rng.gen_bool(self.config.loss_rate),
                rng.gen_bool(self.config.reorder_rate),
                rng.gen_bool(self.config.duplicate_rate),
            )
        };

        if lose {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("[sim] lost {} byte datagram", datagram.len());
            return Ok(());
        }

        if hold {
            let mut held = lock(&self.held);
            if held.is_none() {
                *held = Some((datagram.to_vec(), dest));
                self.counters.reordered.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }

        self.deliver(datagram, dest).await?;
        if duplicate {
            self.counters.duplicated.fetch_add(1, Ordering::Relaxed);
            self.deliver(datagram, dest).await?;
        }

        self.flush().await
    }

    /// Release the datagram held for reordering, if any.
    async fn flush(&self) -> io::Result<()> {
        let released = lock(&self.held).take();
        if let Some((late, late_dest)) = released {
            self.deliver(&late, late_dest).await?;
        }
        Ok(())
    }

    async fn recv_from(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        self.inner.recv_from().await
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }
}
