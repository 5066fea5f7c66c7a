//! Process-wide state handed to the router.

use crate::auth::AuthGate;
use crate::registry::Registry;
use parking_lot::{Condvar, Mutex};
use semd_core::Options;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound on a `/receive_messages` long-poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ServerContext {
    options: Arc<Options>,
    registry: Registry,
    auth: AuthGate,
    poll_timeout: Duration,
    last_request: Mutex<Instant>,
    shutdown: Mutex<bool>,
    shutdown_changed: Condvar,
}

impl ServerContext {
    /// Context with the languages configured in `options`.
    pub fn new(options: Options, secret: Vec<u8>) -> Self {
        let options = Arc::new(options);
        let registry = Registry::new(Arc::clone(&options));
        Self::with_registry(options, registry, secret)
    }

    pub fn with_registry(options: Arc<Options>, registry: Registry, secret: Vec<u8>) -> Self {
        Self {
            options,
            registry,
            auth: AuthGate::new(secret),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            last_request: Mutex::new(Instant::now()),
            shutdown: Mutex::new(false),
            shutdown_changed: Condvar::new(),
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn auth(&self) -> &AuthGate {
        &self.auth
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Records request activity for the idle watchdog.
    pub fn touch(&self) {
        *self.last_request.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_request.lock().elapsed()
    }

    pub fn request_shutdown(&self) {
        let mut shutdown = self.shutdown.lock();
        if !*shutdown {
            log::info!("Shutdown requested");
            *shutdown = true;
            self.shutdown_changed.notify_all();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.lock()
    }

    /// Waits up to `timeout` for a shutdown request. Returns whether one came.
    pub fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut shutdown = self.shutdown.lock();
        while !*shutdown {
            if self
                .shutdown_changed
                .wait_until(&mut shutdown, deadline)
                .timed_out()
            {
                break;
            }
        }
        *shutdown
    }
}
