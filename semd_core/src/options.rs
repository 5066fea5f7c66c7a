//! User options loaded from the JSON options file.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A user-defined language server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageServerConfig {
    pub name: String,
    pub filetypes: Vec<String>,
    /// Command line; the first element is the executable.
    pub cmdline: Vec<String>,
    /// Marker files that identify the project root.
    pub project_root_files: Vec<String>,
    /// When set, the server is reached over TCP on this local port.
    pub port: Option<u16>,
    /// Answer to `workspace/configuration` and `initializationOptions`.
    pub settings: Value,
    /// Extra client capabilities merged into `initialize`.
    pub capabilities: Value,
    pub project_directory: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl Default for LanguageServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            filetypes: Vec::new(),
            cmdline: Vec::new(),
            project_root_files: Vec::new(),
            port: None,
            settings: Value::Null,
            capabilities: Value::Null,
            project_directory: None,
            env: HashMap::new(),
        }
    }
}

/// Daemon-wide options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Base64 shared secret. Removed from the options right after loading.
    #[serde(skip_serializing)]
    pub hmac_secret: Option<String>,
    pub max_diagnostics_to_display: usize,
    pub max_num_candidates: usize,
    pub min_num_of_chars_for_completion: usize,
    pub auto_trigger: bool,
    /// Extra trigger sequences per filetype.
    pub semantic_triggers: HashMap<String, Vec<String>>,
    /// Filetypes (or `*`) for which semantic completion is off.
    pub filetype_specific_completion_to_disable: HashMap<String, Value>,
    pub disable_signature_help: bool,
    pub server_keep_logfiles: bool,
    pub language_server: Vec<LanguageServerConfig>,
    pub rust_toolchain_root: Option<PathBuf>,
    pub gopls_binary_path: Option<PathBuf>,
    pub gopls_args: Vec<String>,
    pub clangd_binary_path: Option<PathBuf>,
    pub clangd_args: Vec<String>,
    /// Seconds to wait for completion responses.
    pub completion_timeout_secs: u64,
    /// Seconds to wait for subcommands.
    pub command_timeout_secs: u64,
    /// Seconds to wait for the `initialize` handshake.
    pub initialize_timeout_secs: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            hmac_secret: None,
            max_diagnostics_to_display: 30,
            max_num_candidates: 50,
            min_num_of_chars_for_completion: 2,
            auto_trigger: true,
            semantic_triggers: HashMap::new(),
            filetype_specific_completion_to_disable: HashMap::new(),
            disable_signature_help: false,
            server_keep_logfiles: false,
            language_server: Vec::new(),
            rust_toolchain_root: None,
            gopls_binary_path: None,
            gopls_args: Vec::new(),
            clangd_binary_path: None,
            clangd_args: Vec::new(),
            completion_timeout_secs: 5,
            command_timeout_secs: 30,
            initialize_timeout_secs: 30,
        }
    }
}

impl Options {
    /// Parses options from a JSON string, keeping defaults for absent keys.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads the options file and deletes it, since it holds the secret.
    pub fn load_and_remove(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Could not remove options file {}: {}", path.display(), e);
        }
        Self::from_json(&contents)
    }

    /// Moves the secret out so it is not kept alongside other options.
    pub fn take_hmac_secret(&mut self) -> Option<String> {
        self.hmac_secret.take()
    }

    /// Whether semantic completion is disabled for `filetype`.
    pub fn completion_disabled_for(&self, filetype: &str) -> bool {
        let disabled = &self.filetype_specific_completion_to_disable;
        disabled.contains_key("*") || disabled.contains_key(filetype)
    }

    /// Trigger sequences for `filetype`: built-ins plus user additions.
    pub fn triggers_for(&self, filetype: &str) -> Vec<String> {
        let mut triggers: Vec<String> = default_triggers(filetype)
            .iter()
            .map(|t| t.to_string())
            .collect();
        for (key, extra) in &self.semantic_triggers {
            if key.split(',').any(|ft| ft.trim() == filetype) {
                triggers.extend(extra.iter().cloned());
            }
        }
        triggers
    }
}

fn default_triggers(filetype: &str) -> &'static [&'static str] {
    match filetype {
        "c" | "objc" => &["->", "."],
        "cpp" | "cuda" | "objcpp" => &["->", ".", "::"],
        "rust" => &[".", "::"],
        "perl" | "php" => &["->", "::"],
        "go" | "java" | "javascript" | "typescript" | "python" | "cs" | "d" | "scala" => &["."],
        "ruby" => &[".", "::"],
        "lua" => &[".", ":"],
        "erlang" => &[":"],
        _ => &[],
    }
}
