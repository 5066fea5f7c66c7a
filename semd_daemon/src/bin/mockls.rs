//! A scriptable language server for integration tests.
//!
//! Speaks `Content-Length` framed JSON-RPC over stdio, or over one TCP
//! connection with `--listen`. Flags control timing and failure modes.
//! Completions are the identifiers found in the open documents.

use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "mockls")]
struct Args {
    /// Serve one TCP connection on this local port instead of stdio.
    #[arg(long)]
    listen: Option<u16>,

    /// Sleep before every response (milliseconds).
    #[arg(long, default_value_t = 0)]
    response_delay: u64,

    /// Never respond to this method (repeatable).
    #[arg(long)]
    hang_on: Vec<String>,

    /// Answer this method with `InternalError` (repeatable).
    #[arg(long)]
    fail_on: Vec<String>,

    /// Exit with status 1 on receiving this method (repeatable).
    #[arg(long)]
    crash_on: Vec<String>,

    /// Never publish diagnostics.
    #[arg(long)]
    no_diagnostics: bool,

    /// Flag every completion list as incomplete.
    #[arg(long)]
    incomplete: bool,

    /// Send this text as `window/showMessage` after `initialized`.
    #[arg(long)]
    show_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Incoming {
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

type Writer = Arc<Mutex<Box<dyn Write + Send>>>;

fn write_framed(writer: &Writer, value: &Value) {
    let Ok(body) = serde_json::to_string(value) else {
        return;
    };
    let Ok(mut w) = writer.lock() else { return };
    let _ = write!(w, "Content-Length: {}\r\n\r\n{}", body.len(), body);
    let _ = w.flush();
}

struct MockServer {
    args: Args,
    documents: HashMap<String, String>,
    writer: Writer,
}

impl MockServer {
    fn run(&mut self, reader: &mut dyn Read) {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            }
            while let Some((body, consumed)) = try_parse_message(&buffer) {
                buffer.drain(..consumed);
                if let Ok(message) = serde_json::from_str::<Incoming>(&body) {
                    self.dispatch(message);
                }
            }
        }
    }

    fn dispatch(&mut self, message: Incoming) {
        let Some(method) = message.method else {
            // Answers to our own requests.
            return;
        };
        if self.args.crash_on.iter().any(|m| *m == method) {
            eprintln!("mockls: crashing on {method}");
            std::process::exit(1);
        }
        match message.id {
            Some(id) => self.handle_request(&method, id, &message.params),
            None => self.handle_notification(&method, &message.params),
        }
    }

    fn respond(&self, id: Value, result: Value) {
        write_framed(
            &self.writer,
            &json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        );
    }

    fn handle_request(&mut self, method: &str, id: Value, params: &Value) {
        if self.args.hang_on.iter().any(|m| m == method) {
            return;
        }
        if self.args.response_delay > 0 {
            std::thread::sleep(Duration::from_millis(self.args.response_delay));
        }
        if self.args.fail_on.iter().any(|m| m == method) {
            write_framed(
                &self.writer,
                &json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32603, "message": format!("mockls: failing {method}") }
                }),
            );
            return;
        }

        let result = match method {
            "initialize" => initialize_result(),
            "shutdown" => Value::Null,
            "textDocument/completion" => self.completion(),
            "completionItem/resolve" => resolve(params),
            "textDocument/hover" => self.hover(params),
            "textDocument/definition" => self.definition(params),
            "textDocument/references" => self.references(params),
            "textDocument/documentSymbol" => self.document_symbols(params),
            "textDocument/signatureHelp" => json!({
                "signatures": [{
                    "label": "mock(a, b)",
                    "parameters": [{ "label": "a" }, { "label": "b" }]
                }],
                "activeSignature": 0,
                "activeParameter": 0
            }),
            "textDocument/rename" => self.rename(params),
            "textDocument/formatting" => json!([]),
            "textDocument/codeAction" => code_actions(params),
            _ => {
                write_framed(
                    &self.writer,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32601, "message": format!("mockls: no method {method}") }
                    }),
                );
                return;
            }
        };
        self.respond(id, result);
    }

    fn handle_notification(&mut self, method: &str, params: &Value) {
        let uri = params["textDocument"]["uri"].as_str().unwrap_or_default().to_string();
        match method {
            "initialized" => {
                write_framed(
                    &self.writer,
                    &json!({
                        "jsonrpc": "2.0",
                        "id": "mockls-config",
                        "method": "workspace/configuration",
                        "params": { "items": [{ "section": "mockls" }] }
                    }),
                );
                if let Some(text) = &self.args.show_message {
                    write_framed(
                        &self.writer,
                        &json!({
                            "jsonrpc": "2.0",
                            "method": "window/showMessage",
                            "params": { "type": 3, "message": text }
                        }),
                    );
                }
            }
            "textDocument/didOpen" => {
                let text = params["textDocument"]["text"].as_str().unwrap_or_default();
                self.documents.insert(uri.clone(), text.to_string());
                self.publish_diagnostics(&uri);
            }
            "textDocument/didChange" => {
                if let Some(text) = params["contentChanges"]
                    .as_array()
                    .and_then(|changes| changes.last())
                    .and_then(|change| change["text"].as_str())
                {
                    self.documents.insert(uri.clone(), text.to_string());
                }
                self.publish_diagnostics(&uri);
            }
            "textDocument/didClose" => {
                self.documents.remove(&uri);
            }
            "exit" => std::process::exit(0),
            _ => {}
        }
    }

    /// One diagnostic per `ERROR` (error) or `FIXME` (warning) in the text.
    fn publish_diagnostics(&self, uri: &str) {
        if self.args.no_diagnostics {
            return;
        }
        let Some(content) = self.documents.get(uri) else {
            return;
        };
        let mut diagnostics = Vec::new();
        for (line, text) in content.lines().enumerate() {
            for (marker, severity, code) in [("ERROR", 1, "mock001"), ("FIXME", 2, "mock002")] {
                if let Some(column) = text.find(marker) {
                    diagnostics.push(json!({
                        "range": range(line, column, column + marker.len()),
                        "severity": severity,
                        "code": code,
                        "source": "mockls",
                        "message": format!("found {marker}")
                    }));
                }
            }
        }
        write_framed(
            &self.writer,
            &json!({
                "jsonrpc": "2.0",
                "method": "textDocument/publishDiagnostics",
                "params": { "uri": uri, "diagnostics": diagnostics }
            }),
        );
    }

    fn completion(&self) -> Value {
        let words: BTreeSet<String> = self
            .documents
            .values()
            .flat_map(|content| identifiers(content))
            .collect();
        let items: Vec<Value> = words
            .into_iter()
            .map(|word| {
                json!({
                    "label": word,
                    "kind": 6,
                    "detail": "mockls",
                    "data": { "word": word }
                })
            })
            .collect();
        json!({ "isIncomplete": self.args.incomplete, "items": items })
    }

    fn word_at(&self, params: &Value) -> Option<(String, String)> {
        let uri = params["textDocument"]["uri"].as_str()?;
        let line = params["position"]["line"].as_u64()? as usize;
        let column = params["position"]["character"].as_u64()? as usize;
        let content = self.documents.get(uri)?;
        Some((uri.to_string(), extract_word(content, line, column)?))
    }

    fn hover(&self, params: &Value) -> Value {
        match self.word_at(params) {
            Some((_, word)) => json!({
                "contents": { "kind": "markdown", "value": format!("```\n{word}: mock\n```\nAbout {word}.") }
            }),
            None => Value::Null,
        }
    }

    fn occurrences(&self, uri: &str, word: &str) -> Vec<(usize, usize)> {
        let Some(content) = self.documents.get(uri) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for (line, text) in content.lines().enumerate() {
            let mut start = 0;
            while let Some(offset) = text[start..].find(word) {
                found.push((line, start + offset));
                start += offset + word.len();
            }
        }
        found
    }

    fn definition(&self, params: &Value) -> Value {
        let Some((uri, word)) = self.word_at(params) else {
            return Value::Null;
        };
        let pattern = format!("fn {word}");
        let Some(content) = self.documents.get(&uri) else {
            return Value::Null;
        };
        for (line, text) in content.lines().enumerate() {
            if let Some(column) = text.find(&pattern) {
                let start = column + 3;
                return json!({ "uri": uri, "range": range(line, start, start + word.len()) });
            }
        }
        Value::Null
    }

    fn references(&self, params: &Value) -> Value {
        let Some((uri, word)) = self.word_at(params) else {
            return json!([]);
        };
        let locations: Vec<Value> = self
            .occurrences(&uri, &word)
            .into_iter()
            .map(|(line, column)| json!({ "uri": uri, "range": range(line, column, column + word.len()) }))
            .collect();
        json!(locations)
    }

    fn document_symbols(&self, params: &Value) -> Value {
        let Some(content) = params["textDocument"]["uri"]
            .as_str()
            .and_then(|uri| self.documents.get(uri))
        else {
            return json!([]);
        };
        let mut symbols = Vec::new();
        for (line, text) in content.lines().enumerate() {
            let trimmed = text.trim_start();
            let Some(rest) = trimmed.strip_prefix("fn ") else {
                continue;
            };
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if name.is_empty() {
                continue;
            }
            let start = text.len() - trimmed.len() + 3;
            symbols.push(json!({
                "name": name,
                "kind": 12,
                "range": range(line, 0, text.len()),
                "selectionRange": range(line, start, start + name.len())
            }));
        }
        json!(symbols)
    }

    fn rename(&self, params: &Value) -> Value {
        let Some((uri, word)) = self.word_at(params) else {
            return Value::Null;
        };
        let new_name = params["newName"].as_str().unwrap_or_default();
        let edits: Vec<Value> = self
            .occurrences(&uri, &word)
            .into_iter()
            .map(|(line, column)| json!({ "range": range(line, column, column + word.len()), "newText": new_name }))
            .collect();
        json!({ "changes": { uri: edits } })
    }
}

fn initialize_result() -> Value {
    json!({
        "capabilities": {
            "textDocumentSync": { "openClose": true, "change": 1, "save": { "includeText": false } },
            "completionProvider": { "triggerCharacters": ["."], "resolveProvider": true },
            "hoverProvider": true,
            "definitionProvider": true,
            "referencesProvider": true,
            "documentSymbolProvider": true,
            "signatureHelpProvider": { "triggerCharacters": ["("] },
            "renameProvider": true,
            "documentFormattingProvider": true,
            "codeActionProvider": true
        },
        "serverInfo": { "name": "mockls" }
    })
}

fn resolve(item: &Value) -> Value {
    let mut resolved = item.clone();
    let label = item["label"].as_str().unwrap_or_default();
    resolved["documentation"] = json!(format!("Documentation for {label}"));
    resolved
}

/// A quick fix deleting the flagged text of each diagnostic.
fn code_actions(params: &Value) -> Value {
    let uri = params["textDocument"]["uri"].as_str().unwrap_or_default();
    let actions: Vec<Value> = params["context"]["diagnostics"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|diagnostic| {
            json!({
                "title": format!("Remove {}", diagnostic["message"].as_str().unwrap_or_default()),
                "kind": "quickfix",
                "diagnostics": [diagnostic],
                "edit": { "changes": { uri: [{ "range": diagnostic["range"], "newText": "" }] } }
            })
        })
        .collect();
    json!(actions)
}

fn range(line: usize, start: usize, end: usize) -> Value {
    json!({
        "start": { "line": line, "character": start },
        "end": { "line": line, "character": end }
    })
}

fn identifiers(content: &str) -> Vec<String> {
    content
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| w.len() > 1 && !w.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

fn extract_word(content: &str, line: usize, column: usize) -> Option<String> {
    let text = content.lines().nth(line)?;
    let bytes = text.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    if column >= bytes.len() || !is_word(bytes[column]) {
        return None;
    }
    let start = (0..column).rev().find(|&i| !is_word(bytes[i])).map_or(0, |i| i + 1);
    let end = (column..bytes.len()).find(|&i| !is_word(bytes[i])).unwrap_or(bytes.len());
    Some(text[start..end].to_string())
}

fn try_parse_message(buffer: &[u8]) -> Option<(String, usize)> {
    let header_end = buffer.windows(4).position(|w| w == b"\r\n\r\n")?;
    let headers = std::str::from_utf8(&buffer[..header_end]).ok()?;
    let length: usize = headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse().ok())
            .flatten()
    })?;
    let total = header_end + 4 + length;
    if buffer.len() < total {
        return None;
    }
    let body = String::from_utf8(buffer[header_end + 4..total].to_vec()).ok()?;
    Some((body, total))
}

fn main() {
    let args = Args::parse();
    match args.listen {
        Some(port) => {
            let listener = match TcpListener::bind(("127.0.0.1", port)) {
                Ok(listener) => listener,
                Err(e) => {
                    eprintln!("mockls: cannot listen on {port}: {e}");
                    std::process::exit(2);
                }
            };
            let Ok((stream, _)) = listener.accept() else {
                std::process::exit(2);
            };
            let Ok(write_half) = stream.try_clone() else {
                std::process::exit(2);
            };
            let mut server = MockServer {
                args,
                documents: HashMap::new(),
                writer: Arc::new(Mutex::new(Box::new(write_half))),
            };
            let mut reader = stream;
            server.run(&mut reader);
        }
        None => {
            let mut server = MockServer {
                args,
                documents: HashMap::new(),
                writer: Arc::new(Mutex::new(Box::new(std::io::stdout()))),
            };
            let mut stdin = std::io::stdin().lock();
            server.run(&mut stdin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_waits_for_full_body() {
        let framed = b"Content-Length: 7\r\n\r\n{\"a\":1}";
        assert_eq!(
            try_parse_message(framed),
            Some(("{\"a\":1}".to_string(), framed.len()))
        );
        assert_eq!(try_parse_message(&framed[..framed.len() - 1]), None);
    }

    #[test]
    fn test_extract_word() {
        assert_eq!(extract_word("let foo_bar = 1;", 0, 6), Some("foo_bar".into()));
        assert_eq!(extract_word("a + b", 0, 1), None);
    }

    #[test]
    fn test_identifiers_skip_numbers_and_single_chars() {
        assert_eq!(identifiers("fn alpha(x: u8) 42"), vec!["fn", "alpha", "u8"]);
    }
}
