//! How each language's backend is found, launched and configured.

use semd_core::{LanguageServerConfig, MarkerProfile, Options};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of launch parameters for one backend.
pub trait LaunchProvider: Send + Sync {
    fn name(&self) -> &str;

    fn filetypes(&self) -> &[String];

    /// Executable and arguments, or `None` when the server is not installed.
    fn cmdline(&self) -> Option<Vec<String>>;

    /// Markers used to find the project root of a file.
    fn marker_profile(&self) -> MarkerProfile;

    /// Answer to `workspace/configuration`.
    fn settings(&self) -> Value {
        Value::Null
    }

    fn initialization_options(&self) -> Value {
        Value::Null
    }

    /// Extra client capabilities merged over the defaults.
    fn capabilities(&self) -> Value {
        Value::Null
    }

    fn port(&self) -> Option<u16> {
        None
    }

    fn env(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Fixed project directory overriding root detection.
    fn project_directory(&self) -> Option<PathBuf> {
        None
    }
}

/// Searches `PATH` for an executable.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn explicit_or_path(explicit: Option<&Path>, name: &str) -> Option<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Some(path.to_path_buf()),
        Some(path) => {
            log::warn!("Configured {} not found at {}", name, path.display());
            None
        }
        None => find_executable(name),
    }
}

/// A server described by a `language_server` entry of the options.
pub struct ConfiguredServer {
    config: LanguageServerConfig,
}

impl ConfiguredServer {
    pub fn new(config: LanguageServerConfig) -> Self {
        Self { config }
    }
}

impl LaunchProvider for ConfiguredServer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn filetypes(&self) -> &[String] {
        &self.config.filetypes
    }

    fn cmdline(&self) -> Option<Vec<String>> {
        (!self.config.cmdline.is_empty()).then(|| self.config.cmdline.clone())
    }

    fn marker_profile(&self) -> MarkerProfile {
        MarkerProfile::generic(&self.config.project_root_files)
    }

    fn settings(&self) -> Value {
        self.config.settings.clone()
    }

    fn initialization_options(&self) -> Value {
        self.config.settings.clone()
    }

    fn capabilities(&self) -> Value {
        self.config.capabilities.clone()
    }

    fn port(&self) -> Option<u16> {
        self.config.port
    }

    fn env(&self) -> HashMap<String, String> {
        self.config.env.clone()
    }

    fn project_directory(&self) -> Option<PathBuf> {
        self.config.project_directory.clone()
    }
}

/// rust-analyzer, from the configured toolchain or `PATH`.
pub struct RustAnalyzer {
    filetypes: Vec<String>,
    toolchain_root: Option<PathBuf>,
}

impl RustAnalyzer {
    pub fn new(options: &Options) -> Self {
        Self {
            filetypes: vec!["rust".to_string()],
            toolchain_root: options.rust_toolchain_root.clone(),
        }
    }
}

impl LaunchProvider for RustAnalyzer {
    fn name(&self) -> &str {
        "Rust"
    }

    fn filetypes(&self) -> &[String] {
        &self.filetypes
    }

    fn cmdline(&self) -> Option<Vec<String>> {
        let binary = match &self.toolchain_root {
            Some(root) => explicit_or_path(Some(&root.join("bin").join("rust-analyzer")), "rust-analyzer"),
            None => find_executable("rust-analyzer"),
        }?;
        Some(vec![binary.to_string_lossy().to_string()])
    }

    fn marker_profile(&self) -> MarkerProfile {
        MarkerProfile::rust()
    }

    fn settings(&self) -> Value {
        json!({ "rust-analyzer": {} })
    }
}

/// gopls.
pub struct Gopls {
    filetypes: Vec<String>,
    binary: Option<PathBuf>,
    args: Vec<String>,
}

impl Gopls {
    pub fn new(options: &Options) -> Self {
        Self {
            filetypes: vec!["go".to_string()],
            binary: options.gopls_binary_path.clone(),
            args: options.gopls_args.clone(),
        }
    }
}

impl LaunchProvider for Gopls {
    fn name(&self) -> &str {
        "Go"
    }

    fn filetypes(&self) -> &[String] {
        &self.filetypes
    }

    fn cmdline(&self) -> Option<Vec<String>> {
        let binary = explicit_or_path(self.binary.as_deref(), "gopls")?;
        let mut cmdline = vec![binary.to_string_lossy().to_string()];
        cmdline.extend(self.args.iter().cloned());
        Some(cmdline)
    }

    fn marker_profile(&self) -> MarkerProfile {
        MarkerProfile::go()
    }

    fn initialization_options(&self) -> Value {
        json!({ "hoverKind": "Structured", "fuzzyMatching": false })
    }
}

/// clangd, for the C family.
pub struct Clangd {
    filetypes: Vec<String>,
    binary: Option<PathBuf>,
    args: Vec<String>,
}

impl Clangd {
    pub fn new(options: &Options) -> Self {
        Self {
            filetypes: ["c", "cpp", "cuda", "objc", "objcpp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            binary: options.clangd_binary_path.clone(),
            args: options.clangd_args.clone(),
        }
    }
}

impl LaunchProvider for Clangd {
    fn name(&self) -> &str {
        "C-family"
    }

    fn filetypes(&self) -> &[String] {
        &self.filetypes
    }

    fn cmdline(&self) -> Option<Vec<String>> {
        let binary = explicit_or_path(self.binary.as_deref(), "clangd")?;
        let mut cmdline = vec![binary.to_string_lossy().to_string()];
        if self.args.is_empty() {
            cmdline.push("--header-insertion-decorators=0".to_string());
        } else {
            cmdline.extend(self.args.iter().cloned());
        }
        Some(cmdline)
    }

    fn marker_profile(&self) -> MarkerProfile {
        MarkerProfile::c_family()
    }
}

/// All providers for `options`, user-configured servers first so they
/// shadow the built-in ones for the filetypes they claim.
pub fn providers(options: &Options) -> Vec<Arc<dyn LaunchProvider>> {
    let mut providers: Vec<Arc<dyn LaunchProvider>> = options
        .language_server
        .iter()
        .cloned()
        .map(|config| Arc::new(ConfiguredServer::new(config)) as Arc<dyn LaunchProvider>)
        .collect();
    providers.push(Arc::new(RustAnalyzer::new(options)));
    providers.push(Arc::new(Gopls::new(options)));
    providers.push(Arc::new(Clangd::new(options)));
    providers
}

/// LSP `languageId` for an editor filetype.
pub fn language_id(filetype: &str) -> &str {
    match filetype {
        "objc" => "objective-c",
        "objcpp" => "objective-cpp",
        "cs" => "csharp",
        "javascriptreact" => "javascriptreact",
        "typescriptreact" => "typescriptreact",
        other => other,
    }
}
