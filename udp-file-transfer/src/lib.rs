//! `udp-file-transfer` — reliable file upload and remote deletion over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  upload-begin, fragments, END   ┌──────────┐
//!  │  Client  │────────────────────────────────▶│  Server  │
//!  │ (window) │◀────────────────────────────────│ (reasm.) │
//!  └────┬─────┘        ACKs, delete status       └────┬─────┘
//!       │                                             │
//!  ┌────▼─────────────────────────────────────────────▼────┐
//!  │           Transport (Socket or Simulator)             │
//!  └───────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]      — wire format (encode / decode / fragmentation)
//! - [`path_guard`]  — confinement of client paths to the server root
//! - [`window`]      — send-side sliding window state
//! - [`reassembly`]  — receive-side fragment and chunk ordering state
//! - [`receiver`]    — one upload: reassembly plus destination writes
//! - [`client`]      — sending endpoint (upload, delete, end session)
//! - [`server`]      — receiving endpoint and request dispatch
//! - [`state`]       — receive-side session FSM
//! - [`config`]      — window and server parameters
//! - [`error`]       — error type and severity classification
//! - [`simulator`]   — lossy/reordering transport for testing
//! - [`socket`]      — async UDP transport abstraction

pub mod client;
pub mod config;
pub mod error;
pub mod packet;
pub mod path_guard;
pub mod reassembly;
pub mod receiver;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod window;

pub use client::{Client, UploadReport};
pub use error::{Severity, TransferError};
pub use server::Server;
