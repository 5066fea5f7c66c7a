//! semd - semantic completion daemon.
//!
//! Usage: semd --options_file FILE [--host HOST] [--port PORT] [--log LEVEL]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use semd_core::{Error, Options, Result};
use semd_server::{spawn_idle_watchdog, HttpServer, ServerContext, DEFAULT_WORKERS};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "semd", version, about = "Semantic completion daemon for thin editor clients")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on; 0 picks a free one.
    #[arg(long, default_value_t = 0)]
    port: u16,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log: String,

    /// Exit after this many seconds without requests; 0 disables.
    #[arg(long = "idle_suicide_seconds", default_value_t = 0)]
    idle_suicide_seconds: u64,

    /// How often the idle check runs.
    #[arg(long = "check_interval_seconds", default_value_t = 600)]
    check_interval_seconds: u64,

    /// JSON options file. Deleted once read.
    #[arg(long = "options_file")]
    options_file: PathBuf,

    /// HTTP worker threads. Each open long-poll holds one.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Keep language server logs after shutdown.
    #[arg(long = "keep_logfiles")]
    keep_logfiles: bool,
}

fn invalid(message: String) -> Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message).into()
}

fn run(args: Args) -> Result<()> {
    let mut options = Options::load_and_remove(&args.options_file)?;
    if args.keep_logfiles {
        options.server_keep_logfiles = true;
    }
    let encoded = options
        .take_hmac_secret()
        .ok_or_else(|| invalid("options file has no hmac_secret".to_string()))?;
    let secret = STANDARD
        .decode(encoded.trim())
        .map_err(|e| invalid(format!("hmac_secret is not valid base64: {e}")))?;

    let ctx = Arc::new(ServerContext::new(options, secret));
    let server = HttpServer::bind(&args.host, args.port, Arc::clone(&ctx))?;
    let addr = server.local_addr();

    // Editors read the port from this line.
    println!("serving on http://{}:{}", addr.ip(), addr.port());
    std::io::stdout().flush()?;
    log::info!("semd listening on {}", addr);

    if args.idle_suicide_seconds > 0 {
        spawn_idle_watchdog(
            Arc::clone(&ctx),
            Duration::from_secs(args.idle_suicide_seconds),
            Duration::from_secs(args.check_interval_seconds.max(1)),
        )?;
    }

    server.serve(args.workers);
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log.as_str()))
        .init();

    log::info!("Starting semd");

    match run(args) {
        Ok(()) => {
            log::info!("semd exited");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("semd failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
