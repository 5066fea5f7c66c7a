//! Editor request payloads and cursor arithmetic.
//!
//! Editors send 1-based byte columns. Backends speak 0-based UTF-16 code
//! units. The helpers here convert between the two and compute the
//! completion start column and query from the current line.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Buffer contents the editor sends along with every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub contents: String,
    pub filetypes: Vec<String>,
}

/// A decoded editor request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    pub filepath: PathBuf,
    pub line_num: usize,
    pub column_num: usize,
    #[serde(default)]
    pub file_data: HashMap<PathBuf, FileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completer_target: Option<String>,
    #[serde(default)]
    pub force_semantic: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default)]
    pub command_arguments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_conf_data: Option<Value>,
    /// Resolve token of a completion item, for `/resolve_completion`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve: Option<Value>,
}

impl RequestData {
    /// Decodes and validates a request body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let request: RequestData = serde_json::from_slice(body)
            .map_err(|e| Error::BadRequest(format!("malformed request: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    /// Checks the fields every completer relies on.
    pub fn validate(&self) -> Result<()> {
        if self.line_num == 0 || self.column_num == 0 {
            return Err(Error::BadRequest(
                "line_num and column_num are 1-based".to_string(),
            ));
        }
        let Some(data) = self.file_data.get(&self.filepath) else {
            return Err(Error::BadRequest(format!(
                "file_data has no entry for {}",
                self.filepath.display()
            )));
        };
        if data.filetypes.is_empty() {
            return Err(Error::BadRequest(format!(
                "no filetypes for {}",
                self.filepath.display()
            )));
        }
        Ok(())
    }

    /// Buffer contents for `path`, if the editor sent them.
    pub fn contents(&self, path: &Path) -> Option<&str> {
        self.file_data.get(path).map(|d| d.contents.as_str())
    }

    pub fn filetypes(&self) -> &[String] {
        self.file_data
            .get(&self.filepath)
            .map(|d| d.filetypes.as_slice())
            .unwrap_or_default()
    }

    pub fn first_filetype(&self) -> Option<&str> {
        self.filetypes().first().map(String::as_str)
    }

    /// The line under the cursor, without its terminator.
    pub fn line_value(&self) -> &str {
        self.contents(&self.filepath)
            .and_then(|c| split_lines(c).nth(self.line_num - 1))
            .unwrap_or("")
    }

    /// Cursor column as a 1-based codepoint index.
    pub fn column_codepoint(&self) -> usize {
        byte_to_codepoint_column(self.line_value(), self.column_num)
    }

    /// Start of the identifier ending at the cursor, 1-based codepoints.
    pub fn start_codepoint(&self) -> usize {
        let line = self.line_value();
        start_of_identifier_ending_at(line, self.column_codepoint() - 1) + 1
    }

    /// Start of the identifier ending at the cursor, 1-based bytes.
    pub fn start_column(&self) -> usize {
        codepoint_to_byte_column(self.line_value(), self.start_codepoint())
    }

    /// Text between the start column and the cursor.
    pub fn query(&self) -> String {
        let start = self.start_codepoint() - 1;
        let end = self.column_codepoint() - 1;
        self.line_value()
            .chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect()
    }

    /// String arguments after the subcommand name.
    pub fn string_argument(&self, index: usize) -> Option<&str> {
        self.command_arguments.get(index).and_then(Value::as_str)
    }
}

/// Splits on `\n`, dropping a trailing `\r` from each line.
pub fn split_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
}

/// Converts a 1-based byte column to a 1-based codepoint column.
pub fn byte_to_codepoint_column(line: &str, byte_column: usize) -> usize {
    let byte_offset = (byte_column - 1).min(line.len());
    let mut count = 0;
    for (index, _) in line.char_indices() {
        if index >= byte_offset {
            break;
        }
        count += 1;
    }
    // Columns past the end of the line keep counting bytes.
    count + (byte_column - 1).saturating_sub(line.len()) + 1
}

/// Converts a 1-based codepoint column to a 1-based byte column.
pub fn codepoint_to_byte_column(line: &str, codepoint_column: usize) -> usize {
    let wanted = codepoint_column - 1;
    let bytes: usize = line.chars().take(wanted).map(char::len_utf8).sum();
    let chars = line.chars().count();
    bytes + wanted.saturating_sub(chars) + 1
}

/// Converts a 1-based byte column to a 0-based UTF-16 offset.
pub fn byte_column_to_utf16(line: &str, byte_column: usize) -> u32 {
    let byte_offset = byte_column - 1;
    let mut units = 0;
    for (index, ch) in line.char_indices() {
        if index >= byte_offset {
            return units;
        }
        units += ch.len_utf16() as u32;
    }
    units + byte_offset.saturating_sub(line.len()) as u32
}

/// Converts a 0-based UTF-16 offset to a 1-based byte column.
pub fn utf16_to_byte_column(line: &str, utf16_offset: u32) -> usize {
    let mut units = 0;
    for (index, ch) in line.char_indices() {
        if units >= utf16_offset {
            return index + 1;
        }
        units += ch.len_utf16() as u32;
    }
    line.len() + (utf16_offset.saturating_sub(units)) as usize + 1
}

fn is_identifier_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// 0-based codepoint index where the longest identifier ending right before
/// `end` begins. Identifiers may not start with a digit. Returns `end` when
/// no identifier ends there.
pub fn start_of_identifier_ending_at(line: &str, end: usize) -> usize {
    let chars: Vec<char> = line.chars().take(end).collect();
    let mut start = chars.len();
    while start > 0 && is_identifier_char(chars[start - 1]) {
        start -= 1;
    }
    while start < chars.len() && chars[start].is_numeric() {
        start += 1;
    }
    if start == chars.len() {
        end
    } else {
        start
    }
}
