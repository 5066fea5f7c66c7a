//! Editor-facing response types.
//!
//! Lines and columns are 1-based; columns are byte offsets into the UTF-8
//! encoded line, which is what editor clients send and expect back.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A position in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub line_num: usize,
    pub column_num: usize,
    pub filepath: PathBuf,
}

impl Location {
    pub fn new(line_num: usize, column_num: usize, filepath: impl Into<PathBuf>) -> Self {
        Self {
            line_num,
            column_num,
            filepath: filepath.into(),
        }
    }
}

/// A half-open range between two locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Location,
    pub end: Location,
}

impl Range {
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// An empty range at `location`.
    pub fn point(location: Location) -> Self {
        Self {
            start: location.clone(),
            end: location,
        }
    }

    /// Returns true if the range touches the given line.
    pub fn on_line(&self, line: usize) -> bool {
        line >= self.start.line_num && line <= self.end.line_num
    }

    /// Column distance from a point on a covered line to this range.
    ///
    /// Zero when the point is inside the range.
    pub fn distance_to(&self, line: usize, column: usize) -> usize {
        let before_start = self.start.column_num.saturating_sub(column);
        let after_end = column.saturating_sub(self.end.column_num);
        if self.start.line_num == self.end.line_num {
            return before_start.max(after_end);
        }
        if line == self.start.line_num {
            return before_start;
        }
        if line == self.end.line_num {
            return after_end;
        }
        0
    }
}

/// Diagnostic severity, serialized the way editor clients expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiagnosticKind {
    Error,
    Warning,
    Information,
    Hint,
}

/// A diagnostic reported by a backend for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Related ranges, including the extent itself.
    pub ranges: Vec<Range>,
    /// Primary location (start of the extent).
    pub location: Location,
    pub location_extent: Range,
    /// Human readable message.
    pub text: String,
    pub kind: DiagnosticKind,
    pub fixit_available: bool,
    /// Backend error code, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Diagnostic {
    pub fn new(extent: Range, kind: DiagnosticKind, text: impl Into<String>) -> Self {
        Self {
            ranges: vec![extent.clone()],
            location: extent.start.clone(),
            location_extent: extent,
            text: text.into(),
            kind,
            fixit_available: false,
            code: None,
        }
    }
}

/// Completion item kinds exposed to editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionKind {
    Text,
    Method,
    Function,
    Constructor,
    Field,
    Variable,
    Class,
    Interface,
    Module,
    Property,
    Unit,
    Value,
    Enum,
    Keyword,
    Snippet,
    Color,
    File,
    Reference,
    Folder,
    EnumMember,
    Constant,
    Struct,
    Event,
    Operator,
    TypeParameter,
}

/// A single completion candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionItem {
    /// Text inserted when the candidate is accepted.
    pub insertion_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_menu_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CompletionKind>,
    /// Opaque data (fixits, resolve payload) round-tripped by the editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<serde_json::Value>,
}

impl CompletionItem {
    pub fn new(insertion_text: impl Into<String>) -> Self {
        Self {
            insertion_text: insertion_text.into(),
            menu_text: None,
            extra_menu_info: None,
            detailed_info: None,
            kind: None,
            extra_data: None,
        }
    }
}

/// Body of a `/completions` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub completions: Vec<CompletionItem>,
    pub completion_start_column: usize,
    pub errors: Vec<serde_json::Value>,
}

/// A goto target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoToLocation {
    pub filepath: PathBuf,
    pub line_num: usize,
    pub column_num: usize,
    /// The text of the target line, trimmed.
    pub description: String,
}

/// One replacement inside a fixit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixItChunk {
    pub replacement_text: String,
    pub range: Range,
}

/// A set of edits that together implement a fix or refactoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixIt {
    pub text: String,
    pub location: Location,
    pub chunks: Vec<FixItChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Set when the fixit still needs resolving through the backend.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resolve: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<serde_json::Value>,
}

/// Envelope for fixit and refactoring results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixItResponse {
    pub fixits: Vec<FixIt>,
}

/// Result of a subcommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResponse {
    Location(GoToLocation),
    Locations(Vec<GoToLocation>),
    FixIts(FixItResponse),
    Message { message: String },
    DetailedInfo { detailed_info: String },
    Raw(serde_json::Value),
}

/// A message delivered to an editor through `/receive_messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PollMessage {
    Diagnostics {
        filepath: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },
    Message {
        message: String,
    },
}

/// Key/value pair shown in debug output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugItem {
    pub key: String,
    pub value: String,
}

impl DebugItem {
    pub fn new(key: impl Into<String>, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            value: value.to_string(),
        }
    }
}

/// Status of one supervised backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub is_running: bool,
    pub executable: Vec<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
    pub pid: Option<u32>,
    pub logfiles: Vec<PathBuf>,
    pub extras: Vec<DebugItem>,
}

/// Debug information for one completer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub name: String,
    pub servers: Vec<ServerInfo>,
    pub items: Vec<DebugItem>,
}

/// Whether signature help can be offered for a filetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignatureHelpAvailability {
    Yes,
    No,
    Pending,
}
