//! Adjustable protocol and server parameters.
//!
//! The wire-level sizes (chunk and fragment) are fixed in
//! [`crate::packet`]; everything here may differ between deployments as long
//! as both ends agree on the window capacity.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of unacknowledged chunks in flight.
pub const DEFAULT_WINDOW: usize = 5;

/// Default wait for an acknowledgment before retransmitting the window.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Default server listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:9000";

/// Sliding-window parameters shared by both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Sender: maximum chunks in flight.  Receiver: width of the acceptance
    /// range `[expected, expected + capacity)`.
    pub capacity: usize,
    /// How long the sender waits for one acknowledgment.  There is no
    /// backoff: every expiry retransmits the whole window and waits again.
    pub ack_timeout: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_WINDOW,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

/// Everything the receiving server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Directory every upload and delete path is confined to.
    pub root: PathBuf,
    pub window: WindowConfig,
}

impl ServerConfig {
    pub fn new(bind: SocketAddr, root: impl Into<PathBuf>) -> Self {
        Self {
            bind,
            root: root.into(),
            window: WindowConfig::default(),
        }
    }
}
