// src/ami/mod.rs
//! Asterisk Manager Interface (AMI) status polling.
//!
//! A poll is one short-lived session against the manager port:
//!
//! ```text
//! connect ──> banner ──> Login ──> ExtensionState × N ──> Logoff ──> close
//!   3s          2s         3s          3s each               3s
//! ```
//!
//! Each step is bounded by its own timeout. Failures before the query loop
//! end the session with an empty result; failures inside it only drop the
//! affected extension, unless the connection itself is gone.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use pbx_directory::ami::StatusPoller;
//! use pbx_directory::config::{ConnectionParams, SessionOptions};
//!
//! let poller = StatusPoller::tcp(SessionOptions::default());
//! let params = ConnectionParams::new("10.0.0.5", 5038, "directory", "secret");
//! let statuses = poller.poll_statuses(&params, &["101".into(), "102".into()]).await;
//! ```

pub mod codec;
pub mod connection;
pub mod message;
pub mod session;

pub use codec::{Action, AmiCodec};
pub use connection::{AmiConnection, AmiError, AmiTransport, Connector, StreamTransport, TcpConnector};
pub use message::AmiMessage;
pub use session::{poll_statuses, StatusPoller};
