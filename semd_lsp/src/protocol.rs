//! Conversions between LSP payloads and editor-facing types.
//!
//! Positions on the wire are 0-based lines and UTF-16 columns. Editors use
//! 1-based lines and byte columns, so every conversion needs the text of
//! the line involved; [`LineCache`] supplies it from the request buffers or
//! from disk.

use lsp_types::*;
use semd_core::request::{byte_column_to_utf16, split_lines, utf16_to_byte_column};
use semd_core::types::{
    CompletionItem as EditorCompletion, CompletionKind, Diagnostic as EditorDiagnostic,
    DiagnosticKind, FixIt, FixItChunk, GoToLocation, Location as EditorLocation,
    Range as EditorRange,
};
use semd_core::{Error, RequestData, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Converts a path to an LSP URI.
pub fn path_to_uri(path: &Path) -> Result<Uri> {
    let url = url::Url::from_file_path(path)
        .map_err(|_| Error::BadRequest(format!("not an absolute path: {}", path.display())))?;
    Uri::from_str(url.as_str())
        .map_err(|e| Error::BadRequest(format!("invalid URI {}: {:?}", url, e)))
}

/// Converts an LSP URI to a path.
pub fn uri_to_path(uri: &Uri) -> PathBuf {
    uri_str_to_path(uri.as_str())
}

/// Converts a URI string to a path, falling back to the raw text.
pub fn uri_str_to_path(uri: &str) -> PathBuf {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
        .unwrap_or_else(|| PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri)))
}

/// Line text lookup for position conversion.
pub struct LineCache<'a> {
    request: Option<&'a RequestData>,
    files: HashMap<PathBuf, Vec<String>>,
}

impl<'a> LineCache<'a> {
    pub fn new(request: Option<&'a RequestData>) -> Self {
        Self {
            request,
            files: HashMap::new(),
        }
    }

    /// Seeds the cache with buffer contents already known for `path`.
    pub fn insert(&mut self, path: &Path, contents: &str) {
        let lines = split_lines(contents).map(str::to_string).collect();
        self.files.insert(path.to_path_buf(), lines);
    }

    /// Text of 0-based `line` in `path`, or empty if unavailable.
    pub fn line(&mut self, path: &Path, line: u32) -> &str {
        if !self.files.contains_key(path) {
            let contents = self
                .request
                .and_then(|r| r.contents(path).map(str::to_string))
                .or_else(|| std::fs::read_to_string(path).ok())
                .unwrap_or_default();
            let lines = split_lines(&contents).map(str::to_string).collect();
            self.files.insert(path.to_path_buf(), lines);
        }
        self.files
            .get(path)
            .and_then(|lines| lines.get(line as usize))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Converts an LSP position in `path` to an editor location.
    pub fn location(&mut self, path: &Path, position: Position) -> EditorLocation {
        let text = self.line(path, position.line);
        EditorLocation::new(
            position.line as usize + 1,
            utf16_to_byte_column(text, position.character),
            path,
        )
    }

    pub fn range(&mut self, path: &Path, range: lsp_types::Range) -> EditorRange {
        EditorRange::new(self.location(path, range.start), self.location(path, range.end))
    }

    /// Goto target with the trimmed target line as description.
    pub fn goto(&mut self, location: &lsp_types::Location) -> GoToLocation {
        let path = uri_to_path(&location.uri);
        let description = self.line(&path, location.range.start.line).trim().to_string();
        let start = self.location(&path, location.range.start);
        GoToLocation {
            filepath: path,
            line_num: start.line_num,
            column_num: start.column_num,
            description,
        }
    }
}

/// The cursor of `request` as an LSP position.
pub fn request_position(request: &RequestData) -> Position {
    Position {
        line: (request.line_num - 1) as u32,
        character: byte_column_to_utf16(request.line_value(), request.column_num),
    }
}

/// The completion start column of `request` as an LSP position.
pub fn request_start_position(request: &RequestData) -> Position {
    Position {
        line: (request.line_num - 1) as u32,
        character: byte_column_to_utf16(request.line_value(), request.start_column()),
    }
}

/// `textDocument` + `position` params for the cursor.
pub fn text_document_position(request: &RequestData) -> Result<TextDocumentPositionParams> {
    Ok(TextDocumentPositionParams {
        text_document: TextDocumentIdentifier {
            uri: path_to_uri(&request.filepath)?,
        },
        position: request_position(request),
    })
}

/// Builds `initialize` params, merging user capabilities on top of ours.
#[allow(deprecated)]
pub fn initialize_params(
    root: &Path,
    initialization_options: Value,
    extra_capabilities: &Value,
) -> Result<Value> {
    let root_uri = path_to_uri(root)?;
    let params = InitializeParams {
        process_id: Some(std::process::id()),
        root_path: Some(root.to_string_lossy().to_string()),
        root_uri: Some(root_uri.clone()),
        initialization_options: (!initialization_options.is_null())
            .then_some(initialization_options),
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: root_uri,
            name: root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        }]),
        client_info: Some(ClientInfo {
            name: "semd".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        capabilities: client_capabilities(),
        ..Default::default()
    };

    let mut value = serde_json::to_value(params)?;
    if !extra_capabilities.is_null() {
        merge_json(&mut value["capabilities"], extra_capabilities);
    }
    Ok(value)
}

fn client_capabilities() -> ClientCapabilities {
    ClientCapabilities {
        workspace: Some(WorkspaceClientCapabilities {
            apply_edit: Some(true),
            configuration: Some(true),
            workspace_folders: Some(true),
            workspace_edit: Some(WorkspaceEditClientCapabilities {
                document_changes: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        text_document: Some(TextDocumentClientCapabilities {
            synchronization: Some(TextDocumentSyncClientCapabilities {
                did_save: Some(true),
                ..Default::default()
            }),
            hover: Some(HoverClientCapabilities {
                dynamic_registration: Some(false),
                content_format: Some(vec![MarkupKind::PlainText, MarkupKind::Markdown]),
            }),
            completion: Some(CompletionClientCapabilities {
                dynamic_registration: Some(false),
                completion_item: Some(CompletionItemCapability {
                    snippet_support: Some(false),
                    documentation_format: Some(vec![MarkupKind::PlainText, MarkupKind::Markdown]),
                    resolve_support: Some(CompletionItemCapabilityResolveSupport {
                        properties: vec!["documentation".to_string(), "detail".to_string()],
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            signature_help: Some(SignatureHelpClientCapabilities {
                signature_information: Some(SignatureInformationSettings {
                    documentation_format: Some(vec![MarkupKind::PlainText, MarkupKind::Markdown]),
                    parameter_information: Some(ParameterInformationSettings {
                        label_offset_support: Some(true),
                    }),
                    active_parameter_support: Some(true),
                }),
                ..Default::default()
            }),
            definition: Some(GotoCapability {
                dynamic_registration: Some(false),
                link_support: Some(true),
            }),
            references: Some(DynamicRegistrationClientCapabilities {
                dynamic_registration: Some(false),
            }),
            rename: Some(RenameClientCapabilities {
                dynamic_registration: Some(false),
                prepare_support: Some(false),
                ..Default::default()
            }),
            code_action: Some(CodeActionClientCapabilities {
                code_action_literal_support: Some(CodeActionLiteralSupport {
                    code_action_kind: CodeActionKindLiteralSupport {
                        value_set: vec![
                            CodeActionKind::QUICKFIX.as_str().to_string(),
                            CodeActionKind::REFACTOR.as_str().to_string(),
                            CodeActionKind::SOURCE.as_str().to_string(),
                        ],
                    },
                }),
                ..Default::default()
            }),
            publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                related_information: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Recursively merges `overlay` into `base`; objects merge, other values
/// replace.
pub fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// How a backend wants document contents synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    None,
    Full,
    Incremental,
}

/// Reads the change mode and whether `didOpen`/`didClose` are wanted.
pub fn sync_kind(capabilities: &ServerCapabilities) -> (SyncKind, bool) {
    let from_kind = |kind: TextDocumentSyncKind| {
        if kind == TextDocumentSyncKind::FULL {
            SyncKind::Full
        } else if kind == TextDocumentSyncKind::INCREMENTAL {
            SyncKind::Incremental
        } else {
            SyncKind::None
        }
    };
    match &capabilities.text_document_sync {
        Some(TextDocumentSyncCapability::Kind(kind)) => (from_kind(*kind), true),
        Some(TextDocumentSyncCapability::Options(options)) => (
            options.change.map(from_kind).unwrap_or(SyncKind::None),
            options.open_close.unwrap_or(false),
        ),
        None => (SyncKind::Full, true),
    }
}

/// Converts a pushed diagnostic.
pub fn convert_diagnostic(
    lines: &mut LineCache<'_>,
    path: &Path,
    diagnostic: &lsp_types::Diagnostic,
) -> EditorDiagnostic {
    let kind = match diagnostic.severity {
        Some(DiagnosticSeverity::WARNING) => DiagnosticKind::Warning,
        Some(DiagnosticSeverity::INFORMATION) => DiagnosticKind::Information,
        Some(DiagnosticSeverity::HINT) => DiagnosticKind::Hint,
        _ => DiagnosticKind::Error,
    };
    let extent = lines.range(path, diagnostic.range);
    let mut converted = EditorDiagnostic::new(extent, kind, diagnostic.message.clone());
    converted.code = diagnostic.code.as_ref().map(|c| match c {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s.clone(),
    });
    for related in diagnostic.related_information.iter().flatten() {
        let related_path = uri_to_path(&related.location.uri);
        let range = lines.range(&related_path, related.location.range);
        converted.ranges.push(range);
    }
    converted
}

/// Parses a completion response into items plus the incomplete flag.
pub fn parse_completion_response(result: Value) -> (Vec<lsp_types::CompletionItem>, bool) {
    if result.is_null() {
        return (vec![], false);
    }

    // Try as CompletionList first
    if let Ok(list) = serde_json::from_value::<CompletionList>(result.clone()) {
        return (list.items, list.is_incomplete);
    }

    // Try as Vec<CompletionItem>
    if let Ok(items) = serde_json::from_value::<Vec<lsp_types::CompletionItem>>(result) {
        return (items, false);
    }

    log::warn!("Unrecognized completion response");
    (vec![], false)
}

fn completion_kind(kind: CompletionItemKind) -> Option<CompletionKind> {
    Some(match kind {
        CompletionItemKind::TEXT => CompletionKind::Text,
        CompletionItemKind::METHOD => CompletionKind::Method,
        CompletionItemKind::FUNCTION => CompletionKind::Function,
        CompletionItemKind::CONSTRUCTOR => CompletionKind::Constructor,
        CompletionItemKind::FIELD => CompletionKind::Field,
        CompletionItemKind::VARIABLE => CompletionKind::Variable,
        CompletionItemKind::CLASS => CompletionKind::Class,
        CompletionItemKind::INTERFACE => CompletionKind::Interface,
        CompletionItemKind::MODULE => CompletionKind::Module,
        CompletionItemKind::PROPERTY => CompletionKind::Property,
        CompletionItemKind::UNIT => CompletionKind::Unit,
        CompletionItemKind::VALUE => CompletionKind::Value,
        CompletionItemKind::ENUM => CompletionKind::Enum,
        CompletionItemKind::KEYWORD => CompletionKind::Keyword,
        CompletionItemKind::SNIPPET => CompletionKind::Snippet,
        CompletionItemKind::COLOR => CompletionKind::Color,
        CompletionItemKind::FILE => CompletionKind::File,
        CompletionItemKind::REFERENCE => CompletionKind::Reference,
        CompletionItemKind::FOLDER => CompletionKind::Folder,
        CompletionItemKind::ENUM_MEMBER => CompletionKind::EnumMember,
        CompletionItemKind::CONSTANT => CompletionKind::Constant,
        CompletionItemKind::STRUCT => CompletionKind::Struct,
        CompletionItemKind::EVENT => CompletionKind::Event,
        CompletionItemKind::OPERATOR => CompletionKind::Operator,
        CompletionItemKind::TYPE_PARAMETER => CompletionKind::TypeParameter,
        _ => return None,
    })
}

fn documentation_text(documentation: &Documentation) -> &str {
    match documentation {
        Documentation::String(s) => s,
        Documentation::MarkupContent(markup) => &markup.value,
    }
}

/// Converts a backend completion item.
///
/// Items that carry resolve data keep it in `extra_data.resolve` so the
/// editor can send it back to `/resolve_completion`.
pub fn convert_completion(item: &lsp_types::CompletionItem) -> EditorCompletion {
    let insertion_text = match &item.text_edit {
        Some(CompletionTextEdit::Edit(edit)) => edit.new_text.clone(),
        Some(CompletionTextEdit::InsertAndReplace(edit)) => edit.new_text.clone(),
        None => item.insert_text.clone().unwrap_or_else(|| item.label.clone()),
    };

    let mut detailed = Vec::new();
    if let Some(detail) = &item.detail {
        detailed.push(detail.clone());
    }
    if let Some(doc) = &item.documentation {
        detailed.push(documentation_text(doc).to_string());
    }

    let mut converted = EditorCompletion::new(insertion_text);
    converted.menu_text = Some(item.label.clone());
    converted.extra_menu_info = item.detail.clone();
    converted.detailed_info = (!detailed.is_empty()).then(|| detailed.join("\n\n"));
    converted.kind = item.kind.and_then(completion_kind);
    if let Some(data) = &item.data {
        converted.extra_data = Some(json!({ "resolve": data, "item": item }));
    }
    converted
}

/// Text used to filter a backend completion item.
pub fn completion_filter_text(item: &lsp_types::CompletionItem) -> &str {
    item.filter_text.as_deref().unwrap_or(&item.label)
}

/// Parses definition-like responses into plain locations.
pub fn parse_locations(result: Value) -> Vec<lsp_types::Location> {
    if result.is_null() {
        return vec![];
    }

    // Try as GotoDefinitionResponse
    if let Ok(resp) = serde_json::from_value::<GotoDefinitionResponse>(result.clone()) {
        return match resp {
            GotoDefinitionResponse::Scalar(loc) => vec![loc],
            GotoDefinitionResponse::Array(locs) => locs,
            GotoDefinitionResponse::Link(links) => links
                .into_iter()
                .map(|l| lsp_types::Location {
                    uri: l.target_uri,
                    range: l.target_selection_range,
                })
                .collect(),
        };
    }

    // Try as Vec<Location>
    serde_json::from_value::<Vec<lsp_types::Location>>(result).unwrap_or_default()
}

/// Extracts symbol locations from `workspace/symbol` or
/// `textDocument/documentSymbol` results.
///
/// Nested document symbols are flattened; `document` is used for them since
/// they carry no URI of their own.
pub fn parse_symbols(
    lines: &mut LineCache<'_>,
    result: &Value,
    document: Option<&Path>,
) -> Vec<GoToLocation> {
    let mut out = Vec::new();
    for symbol in result.as_array().into_iter().flatten() {
        collect_symbol(lines, symbol, document, &mut out);
    }
    out
}

fn collect_symbol(
    lines: &mut LineCache<'_>,
    symbol: &Value,
    document: Option<&Path>,
    out: &mut Vec<GoToLocation>,
) {
    let name = symbol["name"].as_str().unwrap_or_default().to_string();
    let (path, range) = if let Some(uri) = symbol["location"]["uri"].as_str() {
        (Some(uri_str_to_path(uri)), symbol["location"]["range"].clone())
    } else {
        (document.map(Path::to_path_buf), symbol["selectionRange"].clone())
    };
    if let (Some(path), Ok(range)) = (path, serde_json::from_value::<lsp_types::Range>(range)) {
        let start = lines.location(&path, range.start);
        out.push(GoToLocation {
            filepath: path,
            line_num: start.line_num,
            column_num: start.column_num,
            description: name,
        });
    }
    for child in symbol["children"].as_array().into_iter().flatten() {
        collect_symbol(lines, child, document, out);
    }
}

/// Flattens hover contents to plain text.
pub fn hover_text(hover: &Hover) -> String {
    let marked = |m: &MarkedString| match m {
        MarkedString::String(s) => s.clone(),
        MarkedString::LanguageString(ls) => ls.value.clone(),
    };
    match &hover.contents {
        HoverContents::Scalar(m) => marked(m),
        HoverContents::Array(arr) => arr.iter().map(marked).collect::<Vec<_>>().join("\n\n"),
        HoverContents::Markup(markup) => markup.value.clone(),
    }
}

fn text_edit_chunks(
    lines: &mut LineCache<'_>,
    path: &Path,
    edits: impl IntoIterator<Item = TextEdit>,
) -> Vec<FixItChunk> {
    edits
        .into_iter()
        .map(|edit| FixItChunk {
            replacement_text: edit.new_text,
            range: lines.range(path, edit.range),
        })
        .collect()
}

/// Converts text edits on one file into a fixit.
pub fn text_edits_to_fixit(
    lines: &mut LineCache<'_>,
    path: &Path,
    text: &str,
    location: EditorLocation,
    edits: Vec<TextEdit>,
) -> FixIt {
    FixIt {
        text: text.to_string(),
        location,
        chunks: text_edit_chunks(lines, path, edits),
        kind: None,
        resolve: false,
        command: None,
    }
}

/// Converts a workspace edit into a single fixit.
pub fn workspace_edit_to_fixit(
    lines: &mut LineCache<'_>,
    edit: WorkspaceEdit,
    text: &str,
    location: EditorLocation,
) -> FixIt {
    let mut chunks = Vec::new();

    if let Some(changes) = edit.changes {
        for (uri, text_edits) in changes {
            let path = uri_to_path(&uri);
            chunks.extend(text_edit_chunks(lines, &path, text_edits));
        }
    }

    let document_edits: Vec<TextDocumentEdit> = match edit.document_changes {
        Some(DocumentChanges::Edits(edits)) => edits,
        Some(DocumentChanges::Operations(ops)) => ops
            .into_iter()
            .filter_map(|op| match op {
                DocumentChangeOperation::Edit(edit) => Some(edit),
                DocumentChangeOperation::Op(_) => {
                    log::warn!("Ignoring resource operation in workspace edit");
                    None
                }
            })
            .collect(),
        None => Vec::new(),
    };
    for doc_edit in document_edits {
        let path = uri_to_path(&doc_edit.text_document.uri);
        let edits = doc_edit.edits.into_iter().map(|e| match e {
            OneOf::Left(edit) => edit,
            OneOf::Right(annotated) => annotated.text_edit,
        });
        chunks.extend(text_edit_chunks(lines, &path, edits));
    }

    FixIt {
        text: text.to_string(),
        location,
        chunks,
        kind: None,
        resolve: false,
        command: None,
    }
}

/// Converts a `textDocument/codeAction` response.
///
/// Actions without an edit are kept with `resolve` set so the editor can ask
/// for them to be resolved or executed.
pub fn code_actions_to_fixits(
    lines: &mut LineCache<'_>,
    result: Value,
    location: &EditorLocation,
) -> Vec<FixIt> {
    let actions: Vec<CodeActionOrCommand> = serde_json::from_value(result).unwrap_or_default();
    actions
        .into_iter()
        .map(|action| match action {
            CodeActionOrCommand::Command(command) => FixIt {
                text: command.title.clone(),
                location: location.clone(),
                chunks: vec![],
                kind: None,
                resolve: true,
                command: serde_json::to_value(&command).ok(),
            },
            CodeActionOrCommand::CodeAction(action) => {
                let kind = action.kind.as_ref().map(|k| k.as_str().to_string());
                let command = action.command.as_ref().and_then(|c| serde_json::to_value(c).ok());
                let mut fixit = match action.edit {
                    Some(edit) => workspace_edit_to_fixit(lines, edit, &action.title, location.clone()),
                    None => FixIt {
                        text: action.title.clone(),
                        location: location.clone(),
                        chunks: vec![],
                        kind: None,
                        resolve: true,
                        command: None,
                    },
                };
                fixit.kind = kind;
                if command.is_some() {
                    fixit.command = command;
                }
                fixit
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(contents: &str) -> RequestData {
        serde_json::from_value(json!({
            "filepath": "/proj/src/main.rs",
            "line_num": 2,
            "column_num": 9,
            "file_data": {
                "/proj/src/main.rs": { "contents": contents, "filetypes": ["rust"] }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_uri_round_trip() {
        let path = Path::new("/tmp/some dir/file.rs");
        let uri = path_to_uri(path).unwrap();
        assert!(uri.as_str().starts_with("file:///tmp/some%20dir"));
        assert_eq!(uri_to_path(&uri), path);
    }

    #[test]
    fn test_positions_use_utf16() {
        let req = request("fn main() {\n    é.foo\n}");
        // Byte column 9 is after 'f'; é is one UTF-16 unit but two bytes.
        assert_eq!(request_position(&req), Position { line: 1, character: 7 });

        let mut lines = LineCache::new(Some(&req));
        let loc = lines.location(&req.filepath, Position { line: 1, character: 7 });
        assert_eq!((loc.line_num, loc.column_num), (2, 9));
    }

    #[test]
    fn test_convert_diagnostic() {
        let req = request("let x = 1;\nlet y = 2;\n");
        let mut lines = LineCache::new(Some(&req));
        let diag = lsp_types::Diagnostic {
            range: lsp_types::Range::new(Position::new(1, 4), Position::new(1, 5)),
            severity: Some(DiagnosticSeverity::WARNING),
            code: Some(NumberOrString::String("unused".into())),
            message: "unused variable".into(),
            ..Default::default()
        };
        let converted = convert_diagnostic(&mut lines, &req.filepath, &diag);
        assert_eq!(converted.kind, DiagnosticKind::Warning);
        assert_eq!(converted.location.line_num, 2);
        assert_eq!(converted.location.column_num, 5);
        assert_eq!(converted.code.as_deref(), Some("unused"));
    }

    #[test]
    fn test_parse_completion_list_and_array() {
        let list = json!({ "isIncomplete": true, "items": [{ "label": "foo" }] });
        let (items, incomplete) = parse_completion_response(list);
        assert_eq!(items.len(), 1);
        assert!(incomplete);

        let array = json!([{ "label": "a" }, { "label": "b" }]);
        let (items, incomplete) = parse_completion_response(array);
        assert_eq!(items.len(), 2);
        assert!(!incomplete);
    }

    #[test]
    fn test_convert_completion_prefers_text_edit() {
        let item: lsp_types::CompletionItem = serde_json::from_value(json!({
            "label": "push(…)",
            "detail": "fn(&mut self, T)",
            "kind": 2,
            "insertText": "push",
            "textEdit": {
                "range": { "start": { "line": 0, "character": 4 }, "end": { "line": 0, "character": 5 } },
                "newText": "push()"
            }
        }))
        .unwrap();
        let converted = convert_completion(&item);
        assert_eq!(converted.insertion_text, "push()");
        assert_eq!(converted.menu_text.as_deref(), Some("push(…)"));
        assert_eq!(converted.kind, Some(CompletionKind::Method));
        assert_eq!(converted.extra_data, None);
    }

    #[test]
    fn test_parse_locations_handles_links() {
        let links = json!([{
            "targetUri": "file:///a.rs",
            "targetRange": { "start": { "line": 0, "character": 0 }, "end": { "line": 3, "character": 0 } },
            "targetSelectionRange": { "start": { "line": 1, "character": 2 }, "end": { "line": 1, "character": 5 } }
        }]);
        let locations = parse_locations(links);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].range.start, Position::new(1, 2));
        assert!(parse_locations(Value::Null).is_empty());
    }

    #[test]
    fn test_merge_json() {
        let mut base = json!({ "a": { "b": 1, "c": 2 }, "d": 3 });
        merge_json(&mut base, &json!({ "a": { "b": 10 }, "e": 5 }));
        assert_eq!(base, json!({ "a": { "b": 10, "c": 2 }, "d": 3, "e": 5 }));
    }

    #[test]
    fn test_sync_kind() {
        let caps: ServerCapabilities = serde_json::from_value(json!({
            "textDocumentSync": { "openClose": true, "change": 2 }
        }))
        .unwrap();
        assert_eq!(sync_kind(&caps), (SyncKind::Incremental, true));
        assert_eq!(sync_kind(&ServerCapabilities::default()), (SyncKind::Full, true));
    }

    #[test]
    fn test_workspace_edit_to_fixit() {
        let req = request("fn old() {}\nfn main() { old(); }");
        let mut lines = LineCache::new(Some(&req));
        let edit: WorkspaceEdit = serde_json::from_value(json!({
            "changes": {
                "file:///proj/src/main.rs": [
                    { "range": { "start": { "line": 0, "character": 3 }, "end": { "line": 0, "character": 6 } }, "newText": "new" }
                ]
            }
        }))
        .unwrap();
        let fixit = workspace_edit_to_fixit(
            &mut lines,
            edit,
            "rename",
            EditorLocation::new(1, 4, "/proj/src/main.rs"),
        );
        assert_eq!(fixit.chunks.len(), 1);
        assert_eq!(fixit.chunks[0].replacement_text, "new");
        assert_eq!(fixit.chunks[0].range.start.column_num, 4);
    }

    #[test]
    fn test_parse_nested_document_symbols() {
        let mut lines = LineCache::new(None);
        let symbols = json!([{
            "name": "Outer",
            "kind": 23,
            "range": { "start": { "line": 0, "character": 0 }, "end": { "line": 5, "character": 1 } },
            "selectionRange": { "start": { "line": 0, "character": 7 }, "end": { "line": 0, "character": 12 } },
            "children": [{
                "name": "inner",
                "kind": 6,
                "range": { "start": { "line": 1, "character": 4 }, "end": { "line": 2, "character": 5 } },
                "selectionRange": { "start": { "line": 1, "character": 7 }, "end": { "line": 1, "character": 12 } }
            }]
        }]);
        let found = parse_symbols(&mut lines, &symbols, Some(Path::new("/nonexistent/x.rs")));
        let names: Vec<_> = found.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(names, vec!["Outer", "inner"]);
        assert_eq!(found[1].line_num, 2);
    }
}
