//! In-process completer for router and HTTP tests.

use crate::completer::{Completer, Event, PollResult};
use semd_core::types::{
    CommandResponse, CompletionItem, DebugInfo, PollMessage, SignatureHelpAvailability,
};
use semd_core::{Error, RequestData, Result};
use serde_json::{json, Value};
use std::time::Duration;

/// Completer answering from fixed data.
pub struct Canned {
    filetypes: Vec<String>,
    /// How long `poll_messages` parks before answering.
    poll_delay: Duration,
}

impl Canned {
    pub fn new(filetype: &str) -> Self {
        Self {
            filetypes: vec![filetype.to_string()],
            poll_delay: Duration::ZERO,
        }
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }
}

impl Completer for Canned {
    fn name(&self) -> &str {
        "Canned"
    }
    fn supported_filetypes(&self) -> &[String] {
        &self.filetypes
    }
    fn should_use_now(&self, _: &RequestData) -> bool {
        true
    }
    fn complete(&self, _: &RequestData, _: bool) -> Result<Vec<CompletionItem>> {
        Ok(vec![CompletionItem::new("canned_item")])
    }
    fn resolve_completion(&self, _: &RequestData) -> Result<Option<CompletionItem>> {
        Ok(None)
    }
    fn signature_help(&self, _: &RequestData) -> Result<Value> {
        Ok(json!({ "signatures": [] }))
    }
    fn signature_help_available(&self) -> SignatureHelpAvailability {
        SignatureHelpAvailability::Yes
    }
    fn on_event(&self, _: Event, _: &RequestData) -> Result<Value> {
        Ok(json!([]))
    }
    fn defined_subcommands(&self) -> Vec<String> {
        vec!["GoTo".into(), "RestartServer".into()]
    }
    fn run_subcommand(&self, request: &RequestData) -> Result<CommandResponse> {
        match request.string_argument(0) {
            Some("GoTo") => Err(Error::CannotJumpToLocation),
            _ => Err(Error::UnknownSubcommand(
                "Supported commands are:\nGoTo\nRestartServer".into(),
            )),
        }
    }
    fn poll_messages(&self, _: &RequestData, _: Duration) -> PollResult {
        std::thread::sleep(self.poll_delay);
        PollResult::Messages(vec![PollMessage::Message {
            message: "hello".into(),
        }])
    }
    fn detailed_diagnostic(&self, _: &RequestData) -> Result<String> {
        Err(Error::DiagnosticsNotReady)
    }
    fn debug_info(&self, _: Option<&RequestData>) -> DebugInfo {
        DebugInfo {
            name: "Canned".into(),
            servers: vec![],
            items: vec![],
        }
    }
    fn is_healthy(&self) -> bool {
        true
    }
    fn is_ready(&self) -> bool {
        false
    }
    fn restart(&self, _: Option<&RequestData>) -> Result<()> {
        Ok(())
    }
    fn shutdown(&self) {}
}
