//! HTTP front end.
//!
//! A pool of worker threads pulls requests from one `tiny_http` server, so
//! a long-poll parked in one worker never blocks the others. Every editor
//! keeps one poll open per filetype; the pool must stay larger than that.

use crate::auth::HMAC_HEADER;
use crate::context::ServerContext;
use crate::router::{handle, RouterRequest, RouterResponse};
use semd_core::{Error, Result};
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tiny_http::{Header, Request, Response, Server};

/// Worker threads serving requests.
pub const DEFAULT_WORKERS: usize = 30;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

pub struct HttpServer {
    server: Arc<Server>,
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
}

impl HttpServer {
    /// Binds `host:port`. Port 0 picks a free port.
    pub fn bind(host: &str, port: u16, ctx: Arc<ServerContext>) -> Result<Self> {
        let server = Server::http((host, port))
            .map_err(|e| Error::from(std::io::Error::other(e.to_string())))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| Error::from(std::io::Error::other("not bound to an IP address")))?;
        Ok(Self {
            server: Arc::new(server),
            addr,
            ctx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves until a shutdown is requested, then stops every completer.
    pub fn serve(self, workers: usize) {
        let handles: Vec<JoinHandle<()>> = (0..workers.max(1))
            .map(|i| {
                let server = Arc::clone(&self.server);
                let ctx = Arc::clone(&self.ctx);
                thread::Builder::new()
                    .name(format!("semd-http-{i}"))
                    .spawn(move || worker_loop(&server, &ctx))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("Failed to spawn HTTP worker: {}", e);
                    None
                }
            })
            .collect();

        while !self.ctx.wait_for_shutdown(Duration::from_secs(1)) {}

        log::info!("Stopping HTTP server on {}", self.addr);
        self.server.unblock();
        for handle in handles {
            if handle.join().is_err() {
                log::error!("HTTP worker panicked");
            }
        }
        self.ctx.registry().shutdown_all();
    }

    /// Runs [`HttpServer::serve`] on its own thread.
    pub fn spawn(self, workers: usize) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("semd-http".to_string())
            .spawn(move || self.serve(workers))
    }
}

fn worker_loop(server: &Server, ctx: &ServerContext) {
    while !ctx.is_shutting_down() {
        match server.recv_timeout(RECV_TIMEOUT) {
            Ok(Some(request)) => serve_one(ctx, request),
            Ok(None) => {}
            Err(e) => {
                log::error!("HTTP receive failed: {}", e);
                break;
            }
        }
    }
}

fn serve_one(ctx: &ServerContext, mut request: Request) {
    let mut body = Vec::new();
    if let Err(e) = request.as_reader().read_to_end(&mut body) {
        log::warn!("Failed to read request body: {}", e);
        return;
    }
    let routed = RouterRequest {
        method: request.method().to_string(),
        url: request.url().to_string(),
        headers: request
            .headers()
            .iter()
            .map(|h| (h.field.as_str().to_string(), h.value.as_str().to_string()))
            .collect(),
        body,
    };
    let response = handle(ctx, &routed);
    if let Err(e) = request.respond(to_http(response)) {
        log::debug!("Failed to send response: {}", e);
    }
}

fn to_http(response: RouterResponse) -> Response<std::io::Cursor<Vec<u8>>> {
    let mut http = Response::from_data(response.body).with_status_code(response.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        http = http.with_header(header);
    }
    if let Some(hmac) = response.hmac {
        if let Ok(header) = Header::from_bytes(HMAC_HEADER.as_bytes(), hmac.as_bytes()) {
            http = http.with_header(header);
        }
    }
    http
}

/// Shuts the daemon down after `idle` without requests.
///
/// Checks every `interval`. A wake-up more than twice the interval late means
/// the machine was suspended, so that check is skipped.
pub fn spawn_idle_watchdog(
    ctx: Arc<ServerContext>,
    idle: Duration,
    interval: Duration,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("semd-watchdog".to_string())
        .spawn(move || loop {
            let slept_from = Instant::now();
            if ctx.wait_for_shutdown(interval) {
                return;
            }
            if slept_from.elapsed() > interval * 2 {
                log::info!("Watchdog woke up late, skipping idle check");
                continue;
            }
            if ctx.idle_for() > idle {
                log::info!("No requests for {:?}, shutting down", idle);
                ctx.request_shutdown();
                return;
            }
        })
}
