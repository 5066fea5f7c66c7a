#![allow(dead_code)]

use semd_core::{LanguageServerConfig, RequestData};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const MOCK_FILETYPE: &str = "mock";

/// A `language_server` entry launching mockls with `args`.
pub fn mockls_config(args: &[&str]) -> LanguageServerConfig {
    let mut cmdline = vec![env!("CARGO_BIN_EXE_mockls").to_string()];
    cmdline.extend(args.iter().map(|a| a.to_string()));
    LanguageServerConfig {
        name: "Mock".into(),
        filetypes: vec![MOCK_FILETYPE.into()],
        cmdline,
        project_root_files: vec!["mock.toml".into()],
        settings: json!({ "mockls": { "answer": 42 } }),
        ..Default::default()
    }
}

/// A project directory with a root marker.
pub fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("mock.toml"), "").unwrap();
    dir
}

pub fn request_json(file: &Path, contents: &str, line: usize, column: usize) -> serde_json::Value {
    json!({
        "filepath": file,
        "line_num": line,
        "column_num": column,
        "file_data": {
            file.to_string_lossy(): { "contents": contents, "filetypes": [MOCK_FILETYPE] }
        }
    })
}

pub fn request(file: &Path, contents: &str, line: usize, column: usize) -> RequestData {
    serde_json::from_value(request_json(file, contents, line, column)).unwrap()
}

pub fn with_command(mut request: RequestData, args: &[&str]) -> RequestData {
    request.command_arguments = args.iter().map(|a| json!(a)).collect();
    request
}

pub fn source_file(dir: &Path) -> PathBuf {
    dir.join("main.mock")
}

/// Polls `check` until it holds or `timeout` passes.
pub fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    check()
}
