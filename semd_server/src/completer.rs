//! The uniform surface every semantic completer offers the router.

use semd_core::types::{
    CommandResponse, CompletionItem, DebugInfo, PollMessage, SignatureHelpAvailability,
};
use semd_core::{Error, RequestData, Result};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

/// Editor events delivered through `/event_notification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    FileReadyToParse,
    BufferVisit,
    BufferUnload,
    FileSave,
    InsertLeave,
    CurrentIdentifierFinished,
}

impl FromStr for Event {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "FileReadyToParse" => Event::FileReadyToParse,
            "BufferVisit" => Event::BufferVisit,
            "BufferUnload" => Event::BufferUnload,
            "FileSave" => Event::FileSave,
            "InsertLeave" => Event::InsertLeave,
            "CurrentIdentifierFinished" => Event::CurrentIdentifierFinished,
            other => return Err(Error::BadRequest(format!("unknown event {other:?}"))),
        })
    }
}

/// Outcome of a long-poll.
///
/// Serializes the way editors expect: a list of messages, `true` for "poll
/// again" or `false` for "stop polling".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PollResult {
    Messages(Vec<PollMessage>),
    Continue(bool),
}

impl PollResult {
    pub const KEEP_POLLING: PollResult = PollResult::Continue(true);
    pub const ABORT: PollResult = PollResult::Continue(false);
}

/// A semantic completer for one or more filetypes.
pub trait Completer: Send + Sync {
    /// Display name, e.g. `Rust` or `Go`.
    fn name(&self) -> &str;

    fn supported_filetypes(&self) -> &[String];

    /// Whether an unforced completion request should reach the backend.
    fn should_use_now(&self, request: &RequestData) -> bool;

    fn complete(&self, request: &RequestData, force_semantic: bool) -> Result<Vec<CompletionItem>>;

    fn resolve_completion(&self, request: &RequestData) -> Result<Option<CompletionItem>>;

    fn signature_help(&self, request: &RequestData) -> Result<Value>;

    fn signature_help_available(&self) -> SignatureHelpAvailability;

    fn on_event(&self, event: Event, request: &RequestData) -> Result<Value>;

    /// Command names the editor may run, sorted.
    fn defined_subcommands(&self) -> Vec<String>;

    /// Runs `command_arguments[0]` with the remaining arguments.
    fn run_subcommand(&self, request: &RequestData) -> Result<CommandResponse>;

    fn poll_messages(&self, request: &RequestData, timeout: Duration) -> PollResult;

    fn detailed_diagnostic(&self, request: &RequestData) -> Result<String>;

    fn debug_info(&self, request: Option<&RequestData>) -> DebugInfo;

    fn is_healthy(&self) -> bool;

    fn is_ready(&self) -> bool;

    fn restart(&self, request: Option<&RequestData>) -> Result<()>;

    /// Stops the backend. Safe to call repeatedly.
    fn shutdown(&self);
}
