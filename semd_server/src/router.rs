//! Maps authenticated HTTP requests to completer operations.
//!
//! The router is transport-free: it takes method, path, headers and body and
//! returns a status, a JSON body and the response signature, so it can be
//! driven directly in tests.

use crate::auth::HMAC_HEADER;
use crate::completer::{Event, PollResult};
use crate::context::ServerContext;
use semd_core::types::{CompletionResponse, SignatureHelpAvailability};
use semd_core::{Error, RequestData, Result};
use serde_json::{json, Value};
use std::collections::HashMap;

/// A request as seen by the router.
#[derive(Debug, Clone)]
pub struct RouterRequest {
    pub method: String,
    /// Path including any query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RouterRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn path(&self) -> &str {
        self.url.split_once('?').map_or(&self.url, |(path, _)| path)
    }

    fn query(&self) -> HashMap<String, String> {
        self.url
            .split_once('?')
            .map(|(_, query)| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct RouterResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Value for the `X-Ycm-Hmac` response header.
    pub hmac: Option<String>,
}

impl RouterResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

/// JSON error envelope.
pub fn error_envelope(error: &Error) -> Value {
    json!({
        "exception": { "TYPE": error.kind() },
        "message": error.to_string(),
        "traceback": null,
    })
}

/// Authenticates, dispatches and signs one request.
pub fn handle(ctx: &ServerContext, request: &RouterRequest) -> RouterResponse {
    let path = request.path();
    let outcome = ctx
        .auth()
        .verify(
            &request.method,
            path,
            &request.body,
            request.header("Host"),
            request.header(HMAC_HEADER),
        )
        .and_then(|()| {
            ctx.touch();
            dispatch(ctx, &request.method, path, request)
        });

    let (status, value) = match outcome {
        Ok(value) => (200, value),
        Err(error) => {
            if error.status() >= 500 {
                log::error!("{} {} failed: {}", request.method, path, error);
            } else {
                log::debug!("{} {} rejected: {}", request.method, path, error);
            }
            (error.status(), error_envelope(&error))
        }
    };

    let body = serde_json::to_vec(&value).unwrap_or_else(|_| b"null".to_vec());
    let hmac = ctx.auth().sign(&body).ok();
    RouterResponse { status, body, hmac }
}

fn parse(request: &RouterRequest) -> Result<RequestData> {
    RequestData::from_json(&request.body)
}

fn dispatch(ctx: &ServerContext, method: &str, path: &str, request: &RouterRequest) -> Result<Value> {
    log::debug!("{} {}", method, path);
    match (method, path) {
        ("POST", "/event_notification") => event_notification(ctx, &parse(request)?),
        ("POST", "/completions") => completions(ctx, &parse(request)?),
        ("POST", "/resolve_completion") => {
            let data = parse(request)?;
            let completer = ctx.registry().completer_for_request(&data)?;
            let completion = completer.resolve_completion(&data)?;
            Ok(json!({ "completion": completion, "errors": [] }))
        }
        ("POST", "/signature_help") => {
            let data = parse(request)?;
            let signature_help = match ctx.registry().completer_for_request(&data) {
                Ok(completer) => completer.signature_help(&data)?,
                Err(Error::NoCompleterForFiletype(_)) => json!({}),
                Err(e) => return Err(e),
            };
            Ok(json!({ "signature_help": signature_help, "errors": [] }))
        }
        ("POST", "/run_completer_command") => {
            let data = parse(request)?;
            let completer = ctx.registry().completer_for_request(&data)?;
            Ok(serde_json::to_value(completer.run_subcommand(&data)?)?)
        }
        ("POST", "/semantic_completion_available") => {
            let data = parse(request)?;
            Ok(json!(ctx.registry().completer_for_request(&data).is_ok()))
        }
        ("POST", "/defined_subcommands") => {
            let data = parse(request)?;
            let completer = ctx.registry().completer_for_request(&data)?;
            Ok(json!(completer.defined_subcommands()))
        }
        ("POST", "/detailed_diagnostic") => {
            let data = parse(request)?;
            let completer = ctx.registry().completer_for_request(&data)?;
            Ok(json!({ "message": completer.detailed_diagnostic(&data)? }))
        }
        ("POST", "/debug_info") => {
            let data = parse(request)?;
            let completer = ctx
                .registry()
                .completer_for_request(&data)
                .ok()
                .map(|c| c.debug_info(Some(&data)));
            Ok(json!({ "python": null, "clang": null, "completer": completer }))
        }
        ("POST", "/receive_messages") => {
            let data = parse(request)?;
            let result = match ctx.registry().completer_for_request(&data) {
                Ok(completer) => completer.poll_messages(&data, ctx.poll_timeout()),
                Err(_) => PollResult::ABORT,
            };
            Ok(serde_json::to_value(result)?)
        }
        ("POST", "/load_extra_conf_file") | ("POST", "/ignore_extra_conf_file") => Ok(json!(true)),
        ("POST", "/shutdown") => {
            ctx.request_shutdown();
            Ok(json!(true))
        }
        ("GET", "/healthy") => subserver_status(ctx, request, |c| c.is_healthy()),
        ("GET", "/ready") => subserver_status(ctx, request, |c| c.is_ready()),
        ("GET", "/signature_help_available") => {
            let subserver = request
                .query()
                .remove("subserver")
                .ok_or_else(|| Error::BadRequest("missing subserver".to_string()))?;
            let available = ctx
                .registry()
                .completer_for_filetype(&subserver)
                .map(|c| c.signature_help_available())
                .unwrap_or(SignatureHelpAvailability::No);
            Ok(json!({ "available": available }))
        }
        _ => Err(Error::NotFound(path.to_string())),
    }
}

fn subserver_status(
    ctx: &ServerContext,
    request: &RouterRequest,
    check: impl Fn(&dyn crate::completer::Completer) -> bool,
) -> Result<Value> {
    match request.query().remove("subserver") {
        Some(filetype) => {
            let completer = ctx
                .registry()
                .completer_for_filetype(&filetype)
                .ok_or_else(|| Error::NoCompleterForFiletype(vec![filetype.clone()]))?;
            Ok(json!(check(completer.as_ref())))
        }
        None => Ok(json!(true)),
    }
}

fn event_notification(ctx: &ServerContext, data: &RequestData) -> Result<Value> {
    let event: Event = data
        .event_name
        .as_deref()
        .ok_or_else(|| Error::BadRequest("missing event_name".to_string()))?
        .parse()?;
    match ctx.registry().completer_for_request(data) {
        Ok(completer) => completer.on_event(event, data),
        Err(Error::NoCompleterForFiletype(_)) => Ok(json!([])),
        Err(e) => Err(e),
    }
}

fn completions(ctx: &ServerContext, data: &RequestData) -> Result<Value> {
    let force = data.force_semantic;
    let start_column = data.start_column();
    let empty = |errors: Vec<Value>| CompletionResponse {
        completions: Vec::new(),
        completion_start_column: start_column,
        errors,
    };

    let completer = match ctx.registry().completer_for_request(data) {
        Ok(completer) => completer,
        Err(e) if force => return Err(e),
        Err(_) => return Ok(serde_json::to_value(empty(Vec::new()))?),
    };
    let response = match completer.complete(data, force) {
        Ok(completions) => CompletionResponse {
            completions,
            completion_start_column: start_column,
            errors: Vec::new(),
        },
        Err(e) if force => return Err(e),
        Err(e) => empty(vec![error_envelope(&e)]),
    };
    Ok(serde_json::to_value(response)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::test_support::Canned;
    use semd_core::Options;
    use std::sync::Arc;

    const SECRET: &[u8] = b"router-test-secret";

    fn context() -> ServerContext {
        let options = Arc::new(Options::default());
        let registry = Registry::empty(Arc::clone(&options));
        registry.insert_completer(Arc::new(Canned::new("canned")));
        ServerContext::with_registry(options, registry, SECRET.to_vec())
    }

    fn body(filetype: &str, extra: Value) -> Vec<u8> {
        let mut value = json!({
            "filepath": "/p/file.x",
            "line_num": 1,
            "column_num": 5,
            "file_data": { "/p/file.x": { "contents": "abc.de", "filetypes": [filetype] } }
        });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::to_vec(&value).unwrap()
    }

    fn signed(ctx: &ServerContext, method: &str, url: &str, body: Vec<u8>) -> RouterRequest {
        let path = url.split('?').next().unwrap();
        let hmac = ctx.auth().sign_request(method, path, &body).unwrap();
        RouterRequest {
            method: method.into(),
            url: url.into(),
            headers: vec![
                ("Host".into(), "127.0.0.1:9999".into()),
                (HMAC_HEADER.into(), hmac),
            ],
            body,
        }
    }

    #[test]
    fn test_completions_route() {
        let ctx = context();
        let resp = handle(&ctx, &signed(&ctx, "POST", "/completions", body("canned", json!({}))));
        assert_eq!(resp.status, 200);
        let json = resp.json();
        assert_eq!(json["completions"][0]["insertion_text"], "canned_item");
        assert_eq!(json["completion_start_column"], 5);
        assert_eq!(json["errors"], json!([]));
        assert!(resp.hmac.is_some());
    }

    #[test]
    fn test_response_is_signed_over_body() {
        let ctx = context();
        let resp = handle(&ctx, &signed(&ctx, "GET", "/healthy", Vec::new()));
        assert_eq!(resp.hmac.unwrap(), ctx.auth().sign(&resp.body).unwrap());
    }

    #[test]
    fn test_no_completer_for_filetype() {
        let ctx = context();
        let unforced = handle(&ctx, &signed(&ctx, "POST", "/completions", body("zzz", json!({}))));
        assert_eq!(unforced.status, 200);
        assert_eq!(unforced.json()["completions"], json!([]));

        let forced = handle(
            &ctx,
            &signed(
                &ctx,
                "POST",
                "/completions",
                body("zzz", json!({ "force_semantic": true })),
            ),
        );
        assert_eq!(forced.status, 400);
        assert_eq!(forced.json()["exception"]["TYPE"], "NoCompleterForFiletype");
        assert_eq!(
            forced.json()["message"],
            "No semantic completer exists for filetypes: [\"zzz\"]"
        );
    }

    #[test]
    fn test_tampered_requests_get_uniform_401() {
        let ctx = context();
        let good = signed(&ctx, "POST", "/completions", body("canned", json!({})));

        let mut wrong_method = good.clone();
        wrong_method.method = "PUT".into();
        let mut wrong_path = good.clone();
        wrong_path.url = "/debug_info".into();
        let mut wrong_body = good.clone();
        wrong_body.body.push(b' ');
        let mut no_header = good.clone();
        no_header.headers.retain(|(k, _)| k != HMAC_HEADER);
        let mut bad_host = good.clone();
        bad_host.headers[0].1 = "attacker.example".into();

        for tampered in [wrong_method, wrong_path, wrong_body, no_header, bad_host] {
            let resp = handle(&ctx, &tampered);
            assert_eq!(resp.status, 401);
            assert_eq!(resp.json()["message"], "Unauthorized, received bad HMAC.");
        }
    }

    #[test]
    fn test_error_envelope_and_status() {
        let ctx = context();
        let goto = handle(
            &ctx,
            &signed(
                &ctx,
                "POST",
                "/run_completer_command",
                body("canned", json!({ "command_arguments": ["GoTo"] })),
            ),
        );
        assert_eq!(goto.status, 400);
        assert_eq!(goto.json()["exception"]["TYPE"], "CannotJumpToLocation");
        assert_eq!(goto.json()["traceback"], Value::Null);

        let missing = handle(&ctx, &signed(&ctx, "POST", "/no_such_route", Vec::new()));
        assert_eq!(missing.status, 404);

        let malformed = handle(&ctx, &signed(&ctx, "POST", "/completions", b"{".to_vec()));
        assert_eq!(malformed.status, 400);
        assert_eq!(malformed.json()["exception"]["TYPE"], "BadRequest");
    }

    #[test]
    fn test_misc_routes() {
        let ctx = context();
        let subcommands = handle(
            &ctx,
            &signed(&ctx, "POST", "/defined_subcommands", body("canned", json!({}))),
        );
        assert_eq!(subcommands.json(), json!(["GoTo", "RestartServer"]));

        let debug = handle(&ctx, &signed(&ctx, "POST", "/debug_info", body("canned", json!({}))));
        assert_eq!(debug.json()["python"], Value::Null);
        assert_eq!(debug.json()["completer"]["name"], "Canned");

        let messages = handle(
            &ctx,
            &signed(&ctx, "POST", "/receive_messages", body("canned", json!({}))),
        );
        assert_eq!(messages.json(), json!([{ "message": "hello" }]));

        let no_poll = handle(
            &ctx,
            &signed(&ctx, "POST", "/receive_messages", body("zzz", json!({}))),
        );
        assert_eq!(no_poll.json(), json!(false));

        let ready = handle(&ctx, &signed(&ctx, "GET", "/ready?subserver=canned", Vec::new()));
        assert_eq!(ready.json(), json!(false));
        let healthy = handle(&ctx, &signed(&ctx, "GET", "/healthy?subserver=canned", Vec::new()));
        assert_eq!(healthy.json(), json!(true));

        let available = handle(
            &ctx,
            &signed(&ctx, "GET", "/signature_help_available?subserver=canned", Vec::new()),
        );
        assert_eq!(available.json(), json!({ "available": "YES" }));

        let diag = handle(
            &ctx,
            &signed(&ctx, "POST", "/detailed_diagnostic", body("canned", json!({}))),
        );
        assert_eq!(diag.status, 400);
        assert_eq!(diag.json()["exception"]["TYPE"], "DiagnosticsNotReady");

        let extra_conf = handle(&ctx, &signed(&ctx, "POST", "/load_extra_conf_file", Vec::new()));
        assert_eq!(extra_conf.json(), json!(true));
    }

    #[test]
    fn test_shutdown_route_signals_context() {
        let ctx = context();
        let resp = handle(&ctx, &signed(&ctx, "POST", "/shutdown", Vec::new()));
        assert_eq!(resp.json(), json!(true));
        assert!(ctx.is_shutting_down());
    }

    #[test]
    fn test_event_notification_without_completer() {
        let ctx = context();
        let resp = handle(
            &ctx,
            &signed(
                &ctx,
                "POST",
                "/event_notification",
                body("zzz", json!({ "event_name": "FileReadyToParse" })),
            ),
        );
        assert_eq!(resp.status, 200);
        assert_eq!(resp.json(), json!([]));
    }
}
