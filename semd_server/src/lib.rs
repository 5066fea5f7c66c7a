//! Completers, request routing and the HTTP front end of the semd daemon.

pub mod auth;
pub mod completer;
pub mod completion_cache;
pub mod context;
pub mod http;
pub mod languages;
pub mod lsp_completer;
pub mod registry;
pub mod router;
#[cfg(test)]
mod test_support;

pub use auth::{AuthGate, HMAC_HEADER};
pub use completer::{Completer, Event, PollResult};
pub use context::ServerContext;
pub use http::{spawn_idle_watchdog, HttpServer, DEFAULT_WORKERS};
pub use languages::{ConfiguredServer, LaunchProvider};
pub use lsp_completer::LspCompleter;
pub use registry::Registry;
pub use router::{handle, RouterRequest, RouterResponse};
