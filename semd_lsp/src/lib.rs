//! LSP connection layer for semd.
//!
//! Frames JSON-RPC over a child's stdio or a local TCP socket, correlates
//! requests with responses, and converts between LSP and editor types.
//! All I/O runs on a per-connection thread; callers block with deadlines.

pub mod connection;
pub mod protocol;
pub mod request_table;
pub mod transport;

pub use connection::{
    ClientSettings, Connection, ConnectionState, LaunchSpec, Notification, NotificationHook,
    SHUTDOWN_TIMEOUT,
};
pub use protocol::{LineCache, SyncKind};
pub use request_table::{PendingRequest, RequestTable};
pub use transport::{JsonRpcMessage, TransportReader, TransportWriter};
