//! Core types for the semd completion daemon.
//!
//! This crate is independent of any transport. It holds the error taxonomy,
//! editor-facing response types, user options, request arithmetic, project
//! root resolution, the diagnostics store and the long-poll message queue.

pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod message_queue;
pub mod options;
pub mod request;
pub mod types;
pub mod workspace;

pub use diagnostics::DiagnosticsStore;
pub use error::{Error, Result};
pub use message_queue::{MessageQueue, WaitOutcome};
pub use options::{LanguageServerConfig, Options};
pub use request::RequestData;
pub use workspace::{ManifestPolicy, Marker, MarkerProfile, MarkerRank, Workspace, WorkspaceResolver};
