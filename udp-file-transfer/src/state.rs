//! Receiver session finite-state machine (FSM) types.
//!
//! ```text
//!  IDLE ──upload-begin──▶ OPEN ──END──▶ DRAINING ──flushed──▶ CLOSED
//!    ▲                      │                                    │
//!    │                      └──── file I/O error (abandoned) ────┤
//!    └───────────────────── next request ◀───────────────────────┘
//! ```
//!
//! Transitions are driven by [`crate::receiver::UploadSession`] and
//! [`crate::server::Server`]; this module only names the states.

/// All states a receive-side transfer session can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No transfer in progress; control requests are serviced.
    #[default]
    Idle,
    /// Destination file open; only fragments and `END` are serviced.
    Open,
    /// `END` received; remaining contiguous chunks are being written.
    Draining,
    /// Destination flushed and closed.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
