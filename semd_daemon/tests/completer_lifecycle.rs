//! Drives the generic completer against real mockls processes.

mod common;

use common::*;
use semd_core::types::{CommandResponse, PollMessage};
use semd_core::{Error, Options};
use semd_lsp::ConnectionState;
use semd_server::{ConfiguredServer, Completer, Event, LspCompleter, PollResult};
use std::sync::Arc;
use std::time::Duration;

const READY: Duration = Duration::from_secs(10);

const SOURCE: &str = "fn alpha_one() {}\nfn alpha_two() {}\nlet x = alpha_one;\n// ERROR here\n";

fn started_completer(args: &[&str], dir: &std::path::Path) -> LspCompleter {
    started_completer_with(args, dir, Options::default())
}

fn started_completer_with(args: &[&str], dir: &std::path::Path, options: Options) -> LspCompleter {
    let completer = LspCompleter::new(
        Arc::new(ConfiguredServer::new(mockls_config(args))),
        Arc::new(options),
    );
    let file = source_file(dir);
    completer
        .on_event(Event::FileReadyToParse, &request(&file, SOURCE, 1, 1))
        .unwrap();
    assert!(completer.wait_until_ready(READY), "mockls did not initialize");
    completer
}

fn labels(items: &[semd_core::types::CompletionItem]) -> Vec<&str> {
    items.iter().map(|i| i.insertion_text.as_str()).collect()
}

#[test]
fn test_unforced_completion_served_from_forced_cache() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&[], dir.path());
    let conn = completer.connection().unwrap();

    // "let x = al|pha_one;"
    let forced = completer.complete(&request(&file, SOURCE, 3, 11), true).unwrap();
    assert!(labels(&forced).contains(&"alpha_one"));
    assert!(labels(&forced).contains(&"alpha_two"));
    let sent = conn.requests_sent();

    // "let x = alpha_on|e;"
    let unforced = completer.complete(&request(&file, SOURCE, 3, 17), false).unwrap();
    assert_eq!(labels(&unforced), vec!["alpha_one"]);
    assert_eq!(conn.requests_sent(), sent);
}

#[test]
fn test_typing_narrows_cached_completions() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&[], dir.path());
    let conn = completer.connection().unwrap();

    let before = "fn alpha_one() {}\nfn alpha_two() {}\nlet x = al\n";
    let forced = completer.complete(&request(&file, before, 3, 11), true).unwrap();
    assert!(labels(&forced).contains(&"alpha_one"));
    let sent = conn.requests_sent();

    let after = "fn alpha_one() {}\nfn alpha_two() {}\nlet x = alp\n";
    let unforced = completer.complete(&request(&file, after, 3, 12), false).unwrap();
    let mut narrowed = labels(&unforced);
    narrowed.sort();
    assert_eq!(narrowed, vec!["alpha_one", "alpha_two"]);
    assert_eq!(conn.requests_sent(), sent);

    // A new parse drops the cached list.
    completer
        .on_event(Event::FileReadyToParse, &request(&file, after, 3, 12))
        .unwrap();
    completer.complete(&request(&file, after, 3, 12), false).unwrap();
    assert_eq!(conn.requests_sent(), sent + 1);
}

#[test]
fn test_incomplete_lists_are_requested_again() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&["--incomplete"], dir.path());
    let conn = completer.connection().unwrap();

    completer.complete(&request(&file, SOURCE, 3, 11), true).unwrap();
    let sent = conn.requests_sent();
    completer.complete(&request(&file, SOURCE, 3, 17), false).unwrap();
    assert_eq!(conn.requests_sent(), sent + 1);
}

#[test]
fn test_diagnostics_reach_poll_and_detailed_diagnostic() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&[], dir.path());
    let req = request(&file, SOURCE, 4, 5);

    let mut delivered = Vec::new();
    let found = eventually(READY, || {
        if let PollResult::Messages(messages) = completer.poll_messages(&req, Duration::from_millis(200)) {
            delivered.extend(messages);
        }
        delivered.iter().any(|m| matches!(m, PollMessage::Diagnostics { filepath, .. } if *filepath == file))
    });
    assert!(found, "no diagnostics delivered: {delivered:?}");

    assert_eq!(
        completer.detailed_diagnostic(&req).unwrap(),
        "found ERROR [mock001]"
    );
    let other_line = request(&file, SOURCE, 1, 1);
    assert_eq!(
        completer.detailed_diagnostic(&other_line).unwrap(),
        "No diagnostics for current line."
    );
}

#[test]
fn test_show_message_is_delivered() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&["--show-message", "indexing done"], dir.path());
    let req = request(&file, SOURCE, 1, 1);

    let mut delivered = Vec::new();
    let found = eventually(READY, || {
        if let PollResult::Messages(messages) = completer.poll_messages(&req, Duration::from_millis(200)) {
            delivered.extend(messages);
        }
        delivered
            .iter()
            .any(|m| matches!(m, PollMessage::Message { message } if message == "indexing done"))
    });
    assert!(found, "showMessage not delivered: {delivered:?}");
}

#[test]
fn test_goto_and_hover_subcommands() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&[], dir.path());

    // Cursor on "alpha_one" in line 3.
    let on_use = request(&file, SOURCE, 3, 10);
    match completer.run_subcommand(&with_command(on_use.clone(), &["GoToDefinition"])) {
        Ok(CommandResponse::Location(location)) => {
            assert_eq!(location.filepath, file);
            assert_eq!(location.line_num, 1);
            assert_eq!(location.column_num, 4);
        }
        other => panic!("unexpected GoToDefinition result: {other:?}"),
    }

    match completer.run_subcommand(&with_command(on_use.clone(), &["GetType"])) {
        Ok(CommandResponse::Message { message }) => assert_eq!(message, "alpha_one: mock"),
        other => panic!("unexpected GetType result: {other:?}"),
    }

    // "x" has no "fn x" anywhere.
    let on_x = request(&file, SOURCE, 3, 5);
    assert!(matches!(
        completer.run_subcommand(&with_command(on_x, &["GoToDefinition"])),
        Err(Error::NoDefinitionFound)
    ));

    let subcommands = completer.defined_subcommands();
    assert!(subcommands.contains(&"GoToReferences".to_string()));
    assert!(subcommands.contains(&"RestartServer".to_string()));
    assert!(!subcommands.contains(&"StopServer".to_string()));
    assert!(!subcommands.contains(&"GoToCallers".to_string()));
}

#[test]
fn test_backend_error_passes_through() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&["--fail-on", "textDocument/references"], dir.path());
    let result = completer.run_subcommand(&with_command(
        request(&file, SOURCE, 3, 10),
        &["GoToReferences"],
    ));
    match result {
        Err(Error::Backend { code, message }) => {
            assert_eq!(code, -32603);
            assert!(message.contains("textDocument/references"));
        }
        other => panic!("expected a backend error, got {other:?}"),
    }
    assert!(completer.is_healthy());
}

#[test]
fn test_crash_is_reported_and_not_restarted() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&["--crash-on", "textDocument/hover"], dir.path());
    let req = with_command(request(&file, SOURCE, 3, 10), &["GetHover"]);

    match completer.run_subcommand(&req) {
        Err(Error::ConnectionLost) | Err(Error::ServerNotRunning) => {}
        other => panic!("expected the crash to surface, got {other:?}"),
    }
    assert!(eventually(READY, || !completer.is_healthy()));
    assert!(matches!(
        completer.run_subcommand(&with_command(request(&file, SOURCE, 3, 10), &["GoTo"])),
        Err(Error::ServerNotRunning)
    ));

    // FileReadyToParse does not bring a crashed server back.
    completer
        .on_event(Event::FileReadyToParse, &request(&file, SOURCE, 1, 1))
        .unwrap();
    assert!(!completer.is_healthy());
}

#[test]
fn test_killed_backend_fails_next_request() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&[], dir.path());
    let conn = completer.connection().unwrap();

    conn.kill();
    assert!(eventually(READY, || conn.state() == ConnectionState::Dead));
    assert!(matches!(
        completer.complete(&request(&file, SOURCE, 3, 11), true),
        Err(Error::ServerNotRunning)
    ));
}

#[test]
fn test_restart_gives_working_server() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&[], dir.path());
    let first_pid = completer.connection().unwrap().pid();

    completer
        .run_subcommand(&with_command(request(&file, SOURCE, 1, 1), &["RestartServer"]))
        .unwrap();
    assert!(completer.wait_until_ready(READY));
    assert!(completer.is_healthy());
    assert_ne!(completer.connection().unwrap().pid(), first_pid);

    let items = completer.complete(&request(&file, SOURCE, 3, 11), true).unwrap();
    assert!(labels(&items).contains(&"alpha_two"));
}

#[test]
fn test_stop_server_is_idempotent() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&[], dir.path());
    let logfile = completer
        .connection()
        .unwrap()
        .logfile()
        .map(|p| p.to_path_buf())
        .unwrap();
    let stop = with_command(request(&file, SOURCE, 1, 1), &["StopServer"]);

    completer.run_subcommand(&stop).unwrap();
    completer.run_subcommand(&stop).unwrap();
    assert!(!completer.is_healthy());
    assert!(!completer.is_ready());
    assert!(!logfile.exists());
    assert!(matches!(
        completer.run_subcommand(&with_command(request(&file, SOURCE, 3, 10), &["GoTo"])),
        Err(Error::ServerNotRunning)
    ));

    let debug = completer.debug_info(None);
    assert!(!debug.servers[0].is_running);
}

#[test]
fn test_signature_help_and_resolve() {
    let dir = project();
    let file = source_file(dir.path());
    let completer = started_completer(&[], dir.path());
    assert_eq!(
        completer.signature_help_available(),
        semd_core::types::SignatureHelpAvailability::Yes
    );

    let help = completer.signature_help(&request(&file, SOURCE, 3, 9)).unwrap();
    assert_eq!(help["signatures"][0]["label"], "mock(a, b)");

    let mut req = request(&file, SOURCE, 3, 11);
    req.resolve = Some(serde_json::json!({ "item": { "label": "alpha_one" } }));
    let resolved = completer.resolve_completion(&req).unwrap().unwrap();
    assert_eq!(resolved.insertion_text, "alpha_one");
    assert_eq!(
        resolved.detailed_info.as_deref(),
        Some("Documentation for alpha_one")
    );
}

#[test]
fn test_unanswered_request_times_out_and_connection_survives() {
    let dir = project();
    let file = source_file(dir.path());
    let options = Options {
        command_timeout_secs: 1,
        ..Options::default()
    };
    let completer = started_completer_with(&["--hang-on", "textDocument/hover"], dir.path(), options);
    let conn = completer.connection().unwrap();

    let on_use = request(&file, SOURCE, 3, 10);
    assert!(matches!(
        completer.run_subcommand(&with_command(on_use.clone(), &["GetDoc"])),
        Err(Error::Timeout)
    ));
    assert_eq!(conn.outstanding_requests(), 0);
    assert!(completer.is_healthy());

    match completer.run_subcommand(&with_command(on_use, &["GoToDefinition"])) {
        Ok(CommandResponse::Location(location)) => assert_eq!(location.line_num, 1),
        other => panic!("unexpected GoToDefinition result: {other:?}"),
    }
}

#[test]
fn test_late_response_after_timeout_is_dropped() {
    let dir = project();
    let file = source_file(dir.path());
    let options = Options {
        completion_timeout_secs: 1,
        ..Options::default()
    };
    let completer = started_completer_with(&["--response-delay", "1500"], dir.path(), options);
    let conn = completer.connection().unwrap();

    assert!(matches!(
        completer.complete(&request(&file, SOURCE, 3, 11), true),
        Err(Error::Timeout)
    ));
    assert_eq!(conn.outstanding_requests(), 0);

    // The slow answer still arrives; later calls get their own response.
    match completer.run_subcommand(&with_command(request(&file, SOURCE, 3, 10), &["GetType"])) {
        Ok(CommandResponse::Message { message }) => assert_eq!(message, "alpha_one: mock"),
        other => panic!("unexpected GetType result: {other:?}"),
    }
    assert!(completer.is_healthy());
}

#[test]
fn test_unanswered_initialize_kills_server() {
    let dir = project();
    let file = source_file(dir.path());
    let options = Options {
        initialize_timeout_secs: 1,
        ..Options::default()
    };
    let completer = LspCompleter::new(
        Arc::new(ConfiguredServer::new(mockls_config(&["--hang-on", "initialize"]))),
        Arc::new(options),
    );
    completer
        .on_event(Event::FileReadyToParse, &request(&file, SOURCE, 1, 1))
        .unwrap();

    assert!(!completer.wait_until_ready(READY));
    let conn = completer.connection().unwrap();
    assert_eq!(conn.state(), ConnectionState::Dead);
    assert!(eventually(READY, || conn.has_exited()), "mockls left running");
    #[cfg(target_os = "linux")]
    {
        let pid = conn.pid().unwrap();
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }

    assert!(!completer.is_healthy());
    assert!(matches!(
        completer.complete(&request(&file, SOURCE, 3, 11), true),
        Err(Error::ServerNotRunning)
    ));
}
