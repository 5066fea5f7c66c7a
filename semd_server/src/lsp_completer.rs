//! Generic completer driving one language server.
//!
//! Every language is this completer configured by a [`LaunchProvider`]. The
//! server is started lazily on the first `FileReadyToParse` and initialized
//! in the background; until the handshake finishes, calls fail fast with
//! `ServerNotInitialized` and document updates are recorded to be replayed
//! once it does. A crashed server is never restarted implicitly.

use crate::completer::{Completer, Event, PollResult};
use crate::completion_cache::{Candidate, CompletionCache};
use crate::languages::{language_id, LaunchProvider};
use semd_core::diagnostics::canonical_path;
use semd_core::filter::filter_and_sort;
use semd_core::request::byte_column_to_utf16;
use semd_core::types::{
    CommandResponse, CompletionItem, DebugInfo, DebugItem, FixItResponse, GoToLocation, Location,
    PollMessage, ServerInfo, SignatureHelpAvailability,
};
use semd_core::{DiagnosticsStore, Error, Options, RequestData, Result, WaitOutcome, WorkspaceResolver};
use semd_lsp::protocol::{
    code_actions_to_fixits, completion_filter_text, convert_completion, convert_diagnostic,
    hover_text, initialize_params, parse_completion_response, parse_locations, parse_symbols,
    path_to_uri, request_start_position, sync_kind, text_document_position, text_edits_to_fixit,
    uri_str_to_path, workspace_edit_to_fixit,
};
use semd_lsp::{
    ClientSettings, Connection, ConnectionState, LaunchSpec, LineCache, Notification,
    NotificationHook, SyncKind, SHUTDOWN_TIMEOUT,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// Subcommands and the server capability each one needs.
const LSP_COMMANDS: &[(&str, &str)] = &[
    ("ExecuteCommand", "executeCommandProvider"),
    ("FixIt", "codeActionProvider"),
    ("Format", "documentFormattingProvider"),
    ("GetDoc", "hoverProvider"),
    ("GetHover", "hoverProvider"),
    ("GetType", "hoverProvider"),
    ("GoTo", "definitionProvider"),
    ("GoToCallees", "callHierarchyProvider"),
    ("GoToCallers", "callHierarchyProvider"),
    ("GoToDeclaration", "declarationProvider"),
    ("GoToDefinition", "definitionProvider"),
    ("GoToDocumentOutline", "documentSymbolProvider"),
    ("GoToImplementation", "implementationProvider"),
    ("GoToReferences", "referencesProvider"),
    ("GoToSymbol", "workspaceSymbolProvider"),
    ("GoToType", "typeDefinitionProvider"),
    ("RefactorRename", "renameProvider"),
];

static LOGFILE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn logfile_path(name: &str) -> PathBuf {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!(
        "semd_{}_{}_{}_stderr.log",
        sanitized,
        std::process::id(),
        LOGFILE_COUNTER.fetch_add(1, Ordering::SeqCst)
    ))
}

fn provided(capabilities: &Value, key: &str) -> bool {
    !matches!(
        capabilities.get(key),
        None | Some(Value::Null) | Some(Value::Bool(false))
    )
}

struct Document {
    contents: String,
    version: i32,
    open: bool,
    filetype: String,
}

struct Inner {
    provider: Arc<dyn LaunchProvider>,
    options: Arc<Options>,
    triggers: HashMap<String, Vec<String>>,
    resolver: WorkspaceResolver,
    diagnostics: DiagnosticsStore,
    /// Raw diagnostics kept for code action requests.
    raw_diagnostics: Mutex<HashMap<PathBuf, Vec<lsp_types::Diagnostic>>>,
    cache: CompletionCache,
    /// Lifecycle lock. Never held while waiting on the backend.
    server: Mutex<Option<Arc<Connection>>>,
    restarting: AtomicBool,
    started: AtomicBool,
    documents: Mutex<HashMap<PathBuf, Document>>,
    project_directory: Mutex<Option<PathBuf>>,
}

/// Completer backed by a language server.
pub struct LspCompleter {
    inner: Arc<Inner>,
}

impl LspCompleter {
    pub fn new(provider: Arc<dyn LaunchProvider>, options: Arc<Options>) -> Self {
        let triggers = provider
            .filetypes()
            .iter()
            .map(|ft| (ft.clone(), options.triggers_for(ft)))
            .collect();
        let resolver = WorkspaceResolver::new(provider.marker_profile(), false);
        Self {
            inner: Arc::new(Inner {
                diagnostics: DiagnosticsStore::new(options.max_diagnostics_to_display),
                provider,
                options,
                triggers,
                resolver,
                raw_diagnostics: Mutex::new(HashMap::new()),
                cache: CompletionCache::new(),
                server: Mutex::new(None),
                restarting: AtomicBool::new(false),
                started: AtomicBool::new(false),
                documents: Mutex::new(HashMap::new()),
                project_directory: Mutex::new(None),
            }),
        }
    }

    /// Blocks until the server is initialized, dead, or `timeout` elapses.
    pub fn wait_until_ready(&self, timeout: Duration) -> bool {
        let conn = self.inner.server.lock().clone();
        match conn {
            Some(conn) => conn.await_initialized(timeout) == ConnectionState::Initialized,
            None => false,
        }
    }

    /// The current connection, for inspection in tests and debug output.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.inner.server.lock().clone()
    }
}

impl Inner {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.options.completion_timeout_secs)
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.options.command_timeout_secs)
    }

    fn initialize_timeout(&self) -> Duration {
        Duration::from_secs(self.options.initialize_timeout_secs)
    }

    fn supports(&self, filetype: &str) -> bool {
        self.provider.filetypes().iter().any(|ft| ft == filetype)
    }

    /// The connection, if it can take requests right now.
    fn connection(&self) -> Result<Arc<Connection>> {
        if self.restarting.load(Ordering::SeqCst) {
            return Err(Error::ServerNotInitialized);
        }
        let Some(conn) = self.server.lock().clone() else {
            return Err(if self.started.load(Ordering::SeqCst) {
                Error::ServerNotRunning
            } else {
                Error::ServerNotInitialized
            });
        };
        match conn.state() {
            ConnectionState::Initialized => Ok(conn),
            ConnectionState::Unstarted | ConnectionState::Starting => {
                Err(Error::ServerNotInitialized)
            }
            ConnectionState::ShuttingDown | ConnectionState::Dead => Err(Error::ServerNotRunning),
        }
    }

    fn capabilities_json(&self, conn: &Connection) -> Value {
        conn.capabilities()
            .and_then(|caps| serde_json::to_value(caps).ok())
            .unwrap_or(Value::Null)
    }

    fn project_root(&self, request: Option<&RequestData>) -> PathBuf {
        if let Some(dir) = self.provider.project_directory() {
            return dir;
        }
        if let Some(workspace) = request.and_then(|r| self.resolver.resolve(&r.filepath)) {
            return workspace.root;
        }
        request
            .and_then(|r| r.working_dir.clone())
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(std::env::temp_dir)
    }

    fn start_server(self: &Arc<Self>, request: Option<&RequestData>) -> Result<()> {
        let mut server = self.server.lock();
        if server.as_ref().is_some_and(|c| c.is_running()) {
            return Ok(());
        }
        self.started.store(true, Ordering::SeqCst);

        let cmdline = self.provider.cmdline().ok_or_else(|| {
            Error::ServerFailedToStart(format!("{}: server executable not found", self.name()))
        })?;
        let root = self.project_root(request);
        *self.project_directory.lock() = Some(root.clone());

        self.diagnostics.clear();
        self.raw_diagnostics.lock().clear();
        self.cache.clear();
        for doc in self.documents.lock().values_mut() {
            doc.open = false;
        }

        let spec = LaunchSpec {
            name: self.name().to_string(),
            cmdline,
            working_dir: root.clone(),
            env: self.provider.env(),
            port: self.provider.port(),
            logfile: Some(logfile_path(self.name())),
            keep_logfile: self.options.server_keep_logfiles,
        };
        let client = ClientSettings {
            settings: self.provider.settings(),
            project_root: root.clone(),
        };
        let weak: Weak<Inner> = Arc::downgrade(self);
        let hook: NotificationHook = Arc::new(move |notification: &Notification| {
            if let Some(inner) = weak.upgrade() {
                inner.on_notification(notification);
            }
        });

        log::info!("Starting {} server in {}", self.name(), root.display());
        let conn = Arc::new(Connection::start(spec, client, Some(hook))?);
        *server = Some(Arc::clone(&conn));
        drop(server);

        let params = initialize_params(
            &root,
            self.provider.initialization_options(),
            &self.provider.capabilities(),
        )?;
        let weak = Arc::downgrade(self);
        let name = self.name().to_string();
        let timeout = self.initialize_timeout();
        thread::Builder::new()
            .name(format!("semd-init-{}", name))
            .spawn(move || match conn.initialize(params, timeout) {
                Ok(_) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_initialized(&conn);
                    }
                }
                Err(e) => log::error!("{} server failed to initialize: {}", name, e),
            })?;
        Ok(())
    }

    /// Replays documents recorded before the handshake finished.
    fn on_initialized(&self, conn: &Connection) {
        let mut documents = self.documents.lock();
        for (path, doc) in documents.iter_mut().filter(|(_, d)| !d.open) {
            if let Err(e) = self.open_document(conn, path, doc) {
                log::warn!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    fn on_notification(&self, notification: &Notification) {
        if notification.method != "textDocument/publishDiagnostics" {
            return;
        }
        let Some(uri) = notification.params["uri"].as_str() else {
            return;
        };
        let raw: Vec<lsp_types::Diagnostic> =
            serde_json::from_value(notification.params["diagnostics"].clone()).unwrap_or_default();
        let path = uri_str_to_path(uri);

        let mut lines = LineCache::new(None);
        if let Some(doc) = self.documents.lock().get(&path) {
            lines.insert(&path, &doc.contents);
        }
        let converted = raw
            .iter()
            .map(|d| convert_diagnostic(&mut lines, &path, d))
            .collect();
        self.diagnostics.publish(&path, converted);
        self.raw_diagnostics.lock().insert(canonical_path(&path), raw);
    }

    fn open_document(&self, conn: &Connection, path: &Path, doc: &mut Document) -> Result<()> {
        let (_, open_close) = conn
            .capabilities()
            .map(|caps| sync_kind(&caps))
            .unwrap_or((SyncKind::Full, true));
        doc.version += 1;
        if open_close {
            conn.notify(
                "textDocument/didOpen",
                json!({
                    "textDocument": {
                        "uri": path_to_uri(path)?.as_str(),
                        "languageId": language_id(&doc.filetype),
                        "version": doc.version,
                        "text": doc.contents,
                    }
                }),
            )?;
        }
        doc.open = true;
        Ok(())
    }

    fn change_document(&self, conn: &Connection, path: &Path, doc: &mut Document) -> Result<()> {
        let (sync, _) = conn
            .capabilities()
            .map(|caps| sync_kind(&caps))
            .unwrap_or((SyncKind::Full, true));
        doc.version += 1;
        if sync == SyncKind::None {
            return Ok(());
        }
        // Incremental servers also accept a whole-document change.
        conn.notify(
            "textDocument/didChange",
            json!({
                "textDocument": {
                    "uri": path_to_uri(path)?.as_str(),
                    "version": doc.version,
                },
                "contentChanges": [{ "text": doc.contents }],
            }),
        )
    }

    /// Brings the server's view of the request's buffers up to date.
    fn sync_documents(&self, request: &RequestData) -> Result<()> {
        let conn = self.server.lock().clone();
        let ready = conn
            .as_ref()
            .is_some_and(|c| c.state() == ConnectionState::Initialized);
        let mut documents = self.documents.lock();

        for (path, data) in &request.file_data {
            let Some(filetype) = data.filetypes.iter().find(|ft| self.supports(ft)) else {
                continue;
            };
            let doc = documents.entry(path.clone()).or_insert_with(|| Document {
                contents: data.contents.clone(),
                version: 0,
                open: false,
                filetype: filetype.clone(),
            });
            let changed = doc.contents != data.contents;
            if changed {
                doc.contents = data.contents.clone();
            }
            let Some(conn) = conn.as_deref().filter(|_| ready) else {
                continue;
            };
            if !doc.open {
                self.open_document(conn, path, doc)?;
            } else if changed {
                self.change_document(conn, path, doc)?;
            }
        }
        Ok(())
    }

    fn close_document(&self, path: &Path) -> Result<()> {
        self.cache.invalidate_file(path);
        let Some(doc) = self.documents.lock().remove(path) else {
            return Ok(());
        };
        let Ok(conn) = self.connection() else {
            return Ok(());
        };
        let open_close = conn
            .capabilities()
            .map(|caps| sync_kind(&caps).1)
            .unwrap_or(true);
        if doc.open && open_close {
            conn.notify(
                "textDocument/didClose",
                json!({ "textDocument": { "uri": path_to_uri(path)?.as_str() } }),
            )?;
        }
        Ok(())
    }

    fn save_document(&self, path: &Path) -> Result<()> {
        let open = self.documents.lock().get(path).is_some_and(|d| d.open);
        if !open {
            return Ok(());
        }
        let conn = self.connection()?;
        conn.notify(
            "textDocument/didSave",
            json!({ "textDocument": { "uri": path_to_uri(path)?.as_str() } }),
        )
    }

    fn should_use_now(&self, request: &RequestData) -> bool {
        if !self.options.auto_trigger {
            return false;
        }
        if request.query().chars().count() >= self.options.min_num_of_chars_for_completion {
            return true;
        }
        let line = request.line_value();
        let before_start = line.get(..request.start_column() - 1).unwrap_or("");
        request
            .filetypes()
            .iter()
            .filter_map(|ft| self.triggers.get(ft))
            .flatten()
            .any(|trigger| before_start.ends_with(trigger.as_str()))
    }

    /// Command names for the current capabilities, sorted.
    fn available_commands(&self, include_hidden: bool) -> Vec<String> {
        let conn = self.server.lock().clone();
        let capabilities = conn
            .as_deref()
            .map(|c| self.capabilities_json(c))
            .unwrap_or(Value::Null);
        let mut commands: Vec<String> = LSP_COMMANDS
            .iter()
            .filter(|(_, capability)| provided(&capabilities, capability))
            .map(|(name, _)| name.to_string())
            .collect();
        commands.push("RestartServer".to_string());
        if include_hidden {
            commands.push("StopServer".to_string());
        }
        commands.sort();
        commands
    }

    fn unknown_subcommand(&self) -> Error {
        let supported = self.available_commands(false);
        Error::UnknownSubcommand(format!("Supported commands are:\n{}", supported.join("\n")))
    }

    fn goto(
        &self,
        conn: &Connection,
        method: &str,
        params: Value,
        request: &RequestData,
        not_found: Error,
    ) -> Result<CommandResponse> {
        let result = conn.request(method, params, self.command_timeout())?;
        let locations = parse_locations(result);
        let mut lines = LineCache::new(Some(request));
        let mut targets: Vec<GoToLocation> = locations.iter().map(|l| lines.goto(l)).collect();
        match targets.len() {
            0 => Err(not_found),
            1 => Ok(CommandResponse::Location(targets.remove(0))),
            _ => Ok(CommandResponse::Locations(targets)),
        }
    }

    fn hover(&self, conn: &Connection, request: &RequestData) -> Result<String> {
        let params = serde_json::to_value(text_document_position(request)?)?;
        let result = conn.request("textDocument/hover", params, self.command_timeout())?;
        if result.is_null() {
            return Ok(String::new());
        }
        let hover: lsp_types::Hover = serde_json::from_value(result)?;
        Ok(hover_text(&hover).trim().to_string())
    }

    fn call_hierarchy(
        &self,
        conn: &Connection,
        request: &RequestData,
        incoming: bool,
    ) -> Result<CommandResponse> {
        let params = serde_json::to_value(text_document_position(request)?)?;
        let prepared = conn.request(
            "textDocument/prepareCallHierarchy",
            params,
            self.command_timeout(),
        )?;
        let Some(item) = prepared.as_array().and_then(|items| items.first()).cloned() else {
            return Err(Error::CannotJumpToLocation);
        };
        let (method, key) = if incoming {
            ("callHierarchy/incomingCalls", "from")
        } else {
            ("callHierarchy/outgoingCalls", "to")
        };
        let calls = conn.request(method, json!({ "item": item }), self.command_timeout())?;

        let mut lines = LineCache::new(Some(request));
        let mut targets: Vec<GoToLocation> = Vec::new();
        for call in calls.as_array().into_iter().flatten() {
            let target = &call[key];
            let location = json!({ "uri": target["uri"], "range": target["selectionRange"] });
            if let Ok(location) = serde_json::from_value::<lsp_types::Location>(location) {
                targets.push(lines.goto(&location));
            }
        }
        match targets.len() {
            0 => Err(Error::CannotJumpToLocation),
            1 => Ok(CommandResponse::Location(targets.remove(0))),
            _ => Ok(CommandResponse::Locations(targets)),
        }
    }

    fn fixits(&self, conn: &Connection, request: &RequestData) -> Result<CommandResponse> {
        let line0 = (request.line_num - 1) as u32;
        let line = request.line_value();
        let line_end = byte_column_to_utf16(line, line.len() + 1);
        let diagnostics: Vec<lsp_types::Diagnostic> = self
            .raw_diagnostics
            .lock()
            .get(&canonical_path(&request.filepath))
            .map(|all| {
                all.iter()
                    .filter(|d| d.range.start.line <= line0 && d.range.end.line >= line0)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let params = json!({
            "textDocument": { "uri": path_to_uri(&request.filepath)?.as_str() },
            "range": {
                "start": { "line": line0, "character": 0 },
                "end": { "line": line0, "character": line_end },
            },
            "context": { "diagnostics": diagnostics },
        });
        let result = conn.request("textDocument/codeAction", params, self.command_timeout())?;
        let cursor = Location::new(request.line_num, request.column_num, &request.filepath);
        let mut lines = LineCache::new(Some(request));
        Ok(CommandResponse::FixIts(FixItResponse {
            fixits: code_actions_to_fixits(&mut lines, result, &cursor),
        }))
    }

    fn rename(&self, conn: &Connection, request: &RequestData) -> Result<CommandResponse> {
        let new_name = request
            .string_argument(1)
            .ok_or_else(|| Error::BadRequest("Usage: RefactorRename <new name>".to_string()))?;
        let mut params = serde_json::to_value(text_document_position(request)?)?;
        params["newName"] = json!(new_name);
        let result = conn.request("textDocument/rename", params, self.command_timeout())?;
        if result.is_null() {
            return Err(Error::BadRequest(
                "Cannot rename the symbol under cursor.".to_string(),
            ));
        }
        let edit: lsp_types::WorkspaceEdit = serde_json::from_value(result)?;
        let cursor = Location::new(request.line_num, request.column_num, &request.filepath);
        let mut lines = LineCache::new(Some(request));
        Ok(CommandResponse::FixIts(FixItResponse {
            fixits: vec![workspace_edit_to_fixit(&mut lines, edit, "", cursor)],
        }))
    }

    fn format(&self, conn: &Connection, request: &RequestData) -> Result<CommandResponse> {
        let params = json!({
            "textDocument": { "uri": path_to_uri(&request.filepath)?.as_str() },
            "options": { "tabSize": 4, "insertSpaces": true },
        });
        let result = conn.request("textDocument/formatting", params, self.command_timeout())?;
        let edits: Vec<lsp_types::TextEdit> = if result.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(result)?
        };
        let cursor = Location::new(request.line_num, request.column_num, &request.filepath);
        let mut lines = LineCache::new(Some(request));
        Ok(CommandResponse::FixIts(FixItResponse {
            fixits: vec![text_edits_to_fixit(
                &mut lines,
                &request.filepath,
                "",
                cursor,
                edits,
            )],
        }))
    }

    fn run_lsp_command(
        &self,
        conn: &Connection,
        name: &str,
        request: &RequestData,
    ) -> Result<CommandResponse> {
        let position = || -> Result<Value> {
            Ok(serde_json::to_value(text_document_position(request)?)?)
        };
        let document = || -> Result<Value> {
            Ok(json!({ "textDocument": { "uri": path_to_uri(&request.filepath)?.as_str() } }))
        };
        match name {
            "GoTo" | "GoToDefinition" => self.goto(
                conn,
                "textDocument/definition",
                position()?,
                request,
                Error::NoDefinitionFound,
            ),
            "GoToDeclaration" => self.goto(
                conn,
                "textDocument/declaration",
                position()?,
                request,
                Error::CannotJumpToLocation,
            ),
            "GoToType" => self.goto(
                conn,
                "textDocument/typeDefinition",
                position()?,
                request,
                Error::CannotJumpToLocation,
            ),
            "GoToImplementation" => self.goto(
                conn,
                "textDocument/implementation",
                position()?,
                request,
                Error::CannotJumpToLocation,
            ),
            "GoToReferences" => {
                let mut params = position()?;
                params["context"] = json!({ "includeDeclaration": true });
                self.goto(
                    conn,
                    "textDocument/references",
                    params,
                    request,
                    Error::CannotJumpToLocation,
                )
            }
            "GoToSymbol" => {
                let query = request.string_argument(1).unwrap_or_default();
                let result = conn.request(
                    "workspace/symbol",
                    json!({ "query": query }),
                    self.command_timeout(),
                )?;
                let mut lines = LineCache::new(Some(request));
                symbols_response(parse_symbols(&mut lines, &result, None))
            }
            "GoToDocumentOutline" => {
                let result = conn.request(
                    "textDocument/documentSymbol",
                    document()?,
                    self.command_timeout(),
                )?;
                let mut lines = LineCache::new(Some(request));
                symbols_response(parse_symbols(&mut lines, &result, Some(&request.filepath)))
            }
            "GetDoc" => match self.hover(conn, request)? {
                text if text.is_empty() => Err(Error::NoDocumentationAvailable),
                text => Ok(CommandResponse::DetailedInfo {
                    detailed_info: text,
                }),
            },
            "GetType" => {
                let text = self.hover(conn, request)?;
                let first = text
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty() && !l.starts_with("```"))
                    .map(str::to_string);
                match first {
                    Some(message) => Ok(CommandResponse::Message { message }),
                    None => Err(Error::UnknownType),
                }
            }
            "GetHover" => match self.hover(conn, request)? {
                text if text.is_empty() => Err(Error::NoDocumentationAvailable),
                message => Ok(CommandResponse::Message { message }),
            },
            "FixIt" => self.fixits(conn, request),
            "RefactorRename" => self.rename(conn, request),
            "Format" => self.format(conn, request),
            "ExecuteCommand" => {
                let command = request.string_argument(1).ok_or_else(|| {
                    Error::BadRequest("Usage: ExecuteCommand <command> [args...]".to_string())
                })?;
                let arguments: Vec<Value> =
                    request.command_arguments.iter().skip(2).cloned().collect();
                let result = conn.request(
                    "workspace/executeCommand",
                    json!({ "command": command, "arguments": arguments }),
                    self.command_timeout(),
                )?;
                Ok(CommandResponse::Raw(result))
            }
            "GoToCallers" => self.call_hierarchy(conn, request, true),
            "GoToCallees" => self.call_hierarchy(conn, request, false),
            _ => Err(self.unknown_subcommand()),
        }
    }

    fn poll_messages(&self, timeout: Duration) -> PollResult {
        let Some(conn) = self.server.lock().clone() else {
            return PollResult::ABORT;
        };
        if conn.state() == ConnectionState::Starting {
            return match conn.await_initialized(timeout) {
                ConnectionState::Dead => PollResult::ABORT,
                _ => PollResult::KEEP_POLLING,
            };
        }

        let mut notifications = conn.messages().drain();
        if notifications.is_empty() {
            notifications = match conn.messages().wait(timeout) {
                WaitOutcome::Items(items) => items,
                WaitOutcome::TimedOut => return PollResult::KEEP_POLLING,
                WaitOutcome::Closed => return PollResult::ABORT,
            };
        }

        let messages = self.to_poll_messages(notifications);
        if messages.is_empty() {
            PollResult::KEEP_POLLING
        } else {
            PollResult::Messages(messages)
        }
    }

    fn to_poll_messages(&self, notifications: Vec<Notification>) -> Vec<PollMessage> {
        let mut seen = HashSet::new();
        let mut messages = Vec::new();
        for notification in notifications {
            match notification.method.as_str() {
                "textDocument/publishDiagnostics" => {
                    let Some(uri) = notification.params["uri"].as_str() else {
                        continue;
                    };
                    let filepath = uri_str_to_path(uri);
                    if !seen.insert(filepath.clone()) {
                        continue;
                    }
                    if let Ok(diagnostics) = self.diagnostics.get(&filepath) {
                        messages.push(PollMessage::Diagnostics {
                            filepath,
                            diagnostics,
                        });
                    }
                }
                "window/showMessage" => {
                    if let Some(message) = notification.params["message"].as_str() {
                        messages.push(PollMessage::Message {
                            message: message.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        messages
    }

    fn shutdown(&self) {
        let conn = self.server.lock().take();
        if let Some(conn) = conn {
            conn.shutdown(SHUTDOWN_TIMEOUT);
        }
        for doc in self.documents.lock().values_mut() {
            doc.open = false;
        }
    }
}

fn symbols_response(mut symbols: Vec<GoToLocation>) -> Result<CommandResponse> {
    match symbols.len() {
        0 => Err(Error::CannotJumpToLocation),
        1 => Ok(CommandResponse::Location(symbols.remove(0))),
        _ => Ok(CommandResponse::Locations(symbols)),
    }
}

impl Completer for LspCompleter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn supported_filetypes(&self) -> &[String] {
        self.inner.provider.filetypes()
    }

    fn should_use_now(&self, request: &RequestData) -> bool {
        self.inner.should_use_now(request)
    }

    fn complete(&self, request: &RequestData, force_semantic: bool) -> Result<Vec<CompletionItem>> {
        let inner = &self.inner;
        if !force_semantic && !inner.should_use_now(request) {
            return Ok(Vec::new());
        }
        let conn = match inner.connection() {
            Ok(conn) => conn,
            Err(Error::ServerNotInitialized) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if !provided(&inner.capabilities_json(&conn), "completionProvider") {
            return Ok(Vec::new());
        }
        inner.sync_documents(request)?;

        let query = request.query();
        let start_column = request.start_column();
        let candidates =
            match inner
                .cache
                .lookup(&request.filepath, request.line_num, start_column, &query)
            {
                Some(cached) => {
                    log::debug!("Serving {} completions from cache", cached.len());
                    cached
                }
                None => {
                    let params = json!({
                        "textDocument": { "uri": path_to_uri(&request.filepath)?.as_str() },
                        "position": request_start_position(request),
                    });
                    let result = conn.request(
                        "textDocument/completion",
                        params,
                        inner.completion_timeout(),
                    )?;
                    let (items, is_incomplete) = parse_completion_response(result);
                    let candidates: Vec<Candidate> = items
                        .iter()
                        .map(|item| Candidate {
                            filter_text: completion_filter_text(item).to_string(),
                            item: convert_completion(item),
                        })
                        .collect();
                    inner.cache.store(
                        &request.filepath,
                        request.line_num,
                        start_column,
                        &query,
                        candidates.clone(),
                        is_incomplete,
                    );
                    candidates
                }
            };

        Ok(filter_and_sort(
            candidates,
            &query,
            inner.options.max_num_candidates,
            |c| c.filter_text.as_str(),
        )
        .into_iter()
        .map(|c| c.item)
        .collect())
    }

    fn resolve_completion(&self, request: &RequestData) -> Result<Option<CompletionItem>> {
        let inner = &self.inner;
        let conn = inner.connection()?;
        let resolve = request
            .resolve
            .as_ref()
            .ok_or_else(|| Error::BadRequest("missing resolve data".to_string()))?;
        let item_value = resolve.get("item").cloned().unwrap_or_else(|| resolve.clone());
        let item: lsp_types::CompletionItem = serde_json::from_value(item_value)
            .map_err(|e| Error::BadRequest(format!("invalid resolve data: {e}")))?;

        let supported = conn
            .capabilities()
            .and_then(|caps| caps.completion_provider)
            .and_then(|provider| provider.resolve_provider)
            .unwrap_or(false);
        if !supported {
            return Ok(Some(convert_completion(&item)));
        }
        let result = conn.request(
            "completionItem/resolve",
            serde_json::to_value(&item)?,
            inner.completion_timeout(),
        )?;
        let resolved: lsp_types::CompletionItem = serde_json::from_value(result)?;
        Ok(Some(convert_completion(&resolved)))
    }

    fn signature_help(&self, request: &RequestData) -> Result<Value> {
        let inner = &self.inner;
        if inner.options.disable_signature_help {
            return Ok(json!({}));
        }
        let conn = inner.connection()?;
        if !provided(&inner.capabilities_json(&conn), "signatureHelpProvider") {
            return Ok(json!({}));
        }
        inner.sync_documents(request)?;
        let params = serde_json::to_value(text_document_position(request)?)?;
        let result = conn.request(
            "textDocument/signatureHelp",
            params,
            inner.completion_timeout(),
        )?;
        Ok(if result.is_null() { json!({}) } else { result })
    }

    fn signature_help_available(&self) -> SignatureHelpAvailability {
        let inner = &self.inner;
        if inner.options.disable_signature_help {
            return SignatureHelpAvailability::No;
        }
        match inner.connection() {
            Ok(conn) if provided(&inner.capabilities_json(&conn), "signatureHelpProvider") => {
                SignatureHelpAvailability::Yes
            }
            Ok(_) => SignatureHelpAvailability::No,
            Err(Error::ServerNotInitialized) => SignatureHelpAvailability::Pending,
            Err(_) => SignatureHelpAvailability::No,
        }
    }

    fn on_event(&self, event: Event, request: &RequestData) -> Result<Value> {
        let inner = &self.inner;
        match event {
            Event::FileReadyToParse => {
                inner.cache.invalidate_file(&request.filepath);
                let never_started = !inner.started.load(Ordering::SeqCst);
                if never_started {
                    if let Err(e) = inner.start_server(Some(request)) {
                        log::error!("Could not start {} server: {}", inner.name(), e);
                        return Ok(json!([]));
                    }
                }
                if let Err(e) = inner.sync_documents(request) {
                    log::warn!("Could not update {} server: {}", inner.name(), e);
                }
                let diagnostics = inner
                    .diagnostics
                    .get(&request.filepath)
                    .unwrap_or_default();
                Ok(serde_json::to_value(diagnostics)?)
            }
            Event::BufferUnload => {
                inner.close_document(&request.filepath)?;
                Ok(json!([]))
            }
            Event::FileSave => {
                inner.cache.invalidate_file(&request.filepath);
                inner.sync_documents(request)?;
                inner.save_document(&request.filepath)?;
                Ok(json!([]))
            }
            Event::BufferVisit | Event::InsertLeave | Event::CurrentIdentifierFinished => {
                inner.cache.invalidate_file(&request.filepath);
                if let Err(e) = inner.sync_documents(request) {
                    log::debug!("Could not update {} server: {}", inner.name(), e);
                }
                Ok(json!([]))
            }
        }
    }

    fn defined_subcommands(&self) -> Vec<String> {
        self.inner.available_commands(false)
    }

    fn run_subcommand(&self, request: &RequestData) -> Result<CommandResponse> {
        let inner = &self.inner;
        let name = request
            .string_argument(0)
            .ok_or_else(|| Error::BadRequest("missing command name".to_string()))?;

        match name {
            "RestartServer" => {
                self.restart(Some(request))?;
                return Ok(CommandResponse::Raw(Value::Null));
            }
            "StopServer" => {
                self.shutdown();
                return Ok(CommandResponse::Raw(Value::Null));
            }
            _ => {}
        }

        let is_lsp_command = LSP_COMMANDS.iter().any(|(command, _)| *command == name);
        if !is_lsp_command {
            return Err(inner.unknown_subcommand());
        }
        let conn = inner.connection()?;
        if !inner.available_commands(true).iter().any(|c| c == name) {
            return Err(inner.unknown_subcommand());
        }
        inner.sync_documents(request)?;
        inner.run_lsp_command(&conn, name, request)
    }

    fn poll_messages(&self, _request: &RequestData, timeout: Duration) -> PollResult {
        self.inner.poll_messages(timeout)
    }

    fn detailed_diagnostic(&self, request: &RequestData) -> Result<String> {
        self.inner
            .diagnostics
            .detailed(&request.filepath, request.line_num, request.column_num)
    }

    fn debug_info(&self, _request: Option<&RequestData>) -> DebugInfo {
        let inner = &self.inner;
        let conn = inner.server.lock().clone();
        let state = conn
            .as_ref()
            .map(|c| c.state().as_str())
            .unwrap_or("Unstarted");
        let executable = conn
            .as_ref()
            .map(|c| c.spec().cmdline.clone())
            .or_else(|| inner.provider.cmdline())
            .unwrap_or_default();
        let port = conn.as_ref().and_then(|c| c.spec().port);
        let project_directory = inner
            .project_directory
            .lock()
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        DebugInfo {
            name: inner.name().to_string(),
            servers: vec![ServerInfo {
                name: format!("{} Language Server", inner.name()),
                is_running: conn.as_ref().is_some_and(|c| c.is_running()),
                executable,
                address: port.map(|_| "127.0.0.1".to_string()),
                port,
                pid: conn.as_ref().and_then(|c| c.pid()),
                logfiles: conn
                    .as_ref()
                    .and_then(|c| c.logfile().map(Path::to_path_buf))
                    .into_iter()
                    .collect(),
                extras: vec![
                    DebugItem::new("Server State", state),
                    DebugItem::new("Project Directory", project_directory),
                    DebugItem::new("Settings", inner.provider.settings()),
                ],
            }],
            items: vec![DebugItem::new(
                "Filetypes",
                inner.provider.filetypes().join(", "),
            )],
        }
    }

    fn is_healthy(&self) -> bool {
        self.inner
            .server
            .lock()
            .as_ref()
            .is_some_and(|c| c.is_running())
    }

    fn is_ready(&self) -> bool {
        self.inner
            .server
            .lock()
            .as_ref()
            .is_some_and(|c| c.state() == ConnectionState::Initialized)
    }

    fn restart(&self, request: Option<&RequestData>) -> Result<()> {
        let inner = &self.inner;
        log::info!("Restarting {} server", inner.name());
        inner.restarting.store(true, Ordering::SeqCst);
        inner.shutdown();
        inner.resolver.invalidate();
        let result = inner.start_server(request);
        inner.restarting.store(false, Ordering::SeqCst);
        result
    }

    fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl Drop for LspCompleter {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semd_core::MarkerProfile;

    struct Unavailable {
        filetypes: Vec<String>,
    }

    impl LaunchProvider for Unavailable {
        fn name(&self) -> &str {
            "Nothing"
        }

        fn filetypes(&self) -> &[String] {
            &self.filetypes
        }

        fn cmdline(&self) -> Option<Vec<String>> {
            None
        }

        fn marker_profile(&self) -> MarkerProfile {
            MarkerProfile::generic(["nothing.toml"])
        }
    }

    fn completer() -> LspCompleter {
        LspCompleter::new(
            Arc::new(Unavailable {
                filetypes: vec!["rust".into()],
            }),
            Arc::new(Options::default()),
        )
    }

    fn request(line: &str, column: usize) -> RequestData {
        serde_json::from_value(json!({
            "filepath": "/proj/src/lib.rs",
            "line_num": 1,
            "column_num": column,
            "file_data": {
                "/proj/src/lib.rs": { "contents": line, "filetypes": ["rust"] }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_should_use_now_on_trigger_or_min_chars() {
        let c = completer();
        assert!(c.should_use_now(&request("foo.", 5)));
        assert!(c.should_use_now(&request("std::", 6)));
        assert!(c.should_use_now(&request("let ab", 7)));
        assert!(!c.should_use_now(&request("let a", 6)));
    }

    #[test]
    fn test_calls_before_start() {
        let c = completer();
        let req = request("foo.", 5);
        assert!(c.complete(&req, true).unwrap().is_empty());
        assert!(matches!(
            c.detailed_diagnostic(&req),
            Err(Error::DiagnosticsNotReady)
        ));
        assert_eq!(
            c.signature_help_available(),
            SignatureHelpAvailability::Pending
        );
        assert!(!c.is_healthy());
        assert!(!c.is_ready());
        assert_eq!(
            c.poll_messages(&req, Duration::from_millis(10)),
            PollResult::ABORT
        );
    }

    #[test]
    fn test_unavailable_server_does_not_break_events() {
        let c = completer();
        let req = request("fn main() {}", 1);
        assert_eq!(c.on_event(Event::FileReadyToParse, &req).unwrap(), json!([]));
        // The failed start counts; nothing restarts implicitly.
        assert!(matches!(
            c.run_subcommand(&{
                let mut r = req.clone();
                r.command_arguments = vec![json!("GoToDefinition")];
                r
            }),
            Err(Error::ServerNotRunning)
        ));
    }

    #[test]
    fn test_defined_subcommands_hide_stop_server() {
        let c = completer();
        assert_eq!(c.defined_subcommands(), vec!["RestartServer".to_string()]);
    }

    #[test]
    fn test_unknown_subcommand_lists_supported() {
        let c = completer();
        let mut req = request("x", 1);
        req.command_arguments = vec![json!("Frobnicate")];
        match c.run_subcommand(&req) {
            Err(Error::UnknownSubcommand(help)) => {
                assert!(help.starts_with("Supported commands are:"));
                assert!(help.contains("RestartServer"));
                assert!(!help.contains("StopServer"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_stop_server_is_idempotent() {
        let c = completer();
        let mut req = request("x", 1);
        req.command_arguments = vec![json!("StopServer")];
        assert!(c.run_subcommand(&req).is_ok());
        assert!(c.run_subcommand(&req).is_ok());
    }

    #[test]
    fn test_debug_info_before_start() {
        let info = completer().debug_info(None);
        assert_eq!(info.name, "Nothing");
        assert!(!info.servers[0].is_running);
        assert_eq!(info.servers[0].extras[0].value, "Unstarted");
    }

    #[test]
    fn test_logfile_names_are_unique() {
        assert_ne!(logfile_path("C-family"), logfile_path("C-family"));
        assert!(logfile_path("C-family")
            .to_string_lossy()
            .contains("semd_C_family_"));
    }
}
