//! Filetype to completer mapping.
//!
//! Completers are created on first use. Filetypes served by the same
//! provider share one slot, so `c` and `cpp` talk to one clangd. Each slot
//! has its own lock: starting one language never blocks another.

use crate::completer::Completer;
use crate::languages::{providers, LaunchProvider};
use crate::lsp_completer::LspCompleter;
use parking_lot::{Mutex, RwLock};
use semd_core::{Error, Options, RequestData, Result};
use std::collections::HashMap;
use std::sync::Arc;

struct Slot {
    provider: Option<Arc<dyn LaunchProvider>>,
    completer: Mutex<Option<Arc<dyn Completer>>>,
}

pub struct Registry {
    options: Arc<Options>,
    slots: RwLock<HashMap<String, Arc<Slot>>>,
}

impl Registry {
    /// Registry with the built-in and user-configured languages.
    pub fn new(options: Arc<Options>) -> Self {
        let registry = Self::empty(Arc::clone(&options));
        for provider in providers(&options) {
            registry.add_provider(provider);
        }
        registry
    }

    /// Registry with no languages at all.
    pub fn empty(options: Arc<Options>) -> Self {
        Self {
            options,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a provider for the filetypes nobody claimed yet.
    pub fn add_provider(&self, provider: Arc<dyn LaunchProvider>) {
        let slot = Arc::new(Slot {
            provider: Some(Arc::clone(&provider)),
            completer: Mutex::new(None),
        });
        let mut slots = self.slots.write();
        for filetype in provider.filetypes() {
            slots
                .entry(filetype.clone())
                .or_insert_with(|| Arc::clone(&slot));
        }
    }

    /// Installs a ready-made completer for its filetypes, replacing any slot.
    pub fn insert_completer(&self, completer: Arc<dyn Completer>) {
        let slot = Arc::new(Slot {
            provider: None,
            completer: Mutex::new(Some(Arc::clone(&completer))),
        });
        let mut slots = self.slots.write();
        for filetype in completer.supported_filetypes() {
            slots.insert(filetype.clone(), Arc::clone(&slot));
        }
    }

    /// The completer for `filetype`, creating it if needed.
    pub fn completer_for_filetype(&self, filetype: &str) -> Option<Arc<dyn Completer>> {
        if self.options.completion_disabled_for(filetype) {
            return None;
        }
        let slot = self.slots.read().get(filetype).cloned()?;
        let mut completer = slot.completer.lock();
        if let Some(existing) = completer.as_ref() {
            return Some(Arc::clone(existing));
        }
        let provider = slot.provider.as_ref()?;
        if provider.cmdline().is_none() {
            log::debug!("No {} server available for {}", provider.name(), filetype);
            return None;
        }
        let created: Arc<dyn Completer> = Arc::new(LspCompleter::new(
            Arc::clone(provider),
            Arc::clone(&self.options),
        ));
        log::info!("Created {} completer", created.name());
        *completer = Some(Arc::clone(&created));
        Some(created)
    }

    pub fn has_completer_for(&self, filetype: &str) -> bool {
        self.completer_for_filetype(filetype).is_some()
    }

    /// Picks the completer for a request per its `completer_target`.
    pub fn completer_for_request(&self, request: &RequestData) -> Result<Arc<dyn Completer>> {
        let filetypes: Vec<String> = match request.completer_target.as_deref() {
            None | Some("filetype_default") => request.filetypes().to_vec(),
            Some(target) => vec![target.to_string()],
        };
        filetypes
            .iter()
            .find_map(|ft| self.completer_for_filetype(ft))
            .ok_or(Error::NoCompleterForFiletype(filetypes))
    }

    /// Completers that have been created, each once.
    pub fn active_completers(&self) -> Vec<Arc<dyn Completer>> {
        let slots = self.slots.read();
        let mut active: Vec<Arc<dyn Completer>> = Vec::new();
        for slot in slots.values() {
            if let Some(completer) = slot.completer.lock().as_ref() {
                if !active.iter().any(|c| Arc::ptr_eq(c, completer)) {
                    active.push(Arc::clone(completer));
                }
            }
        }
        active
    }

    pub fn shutdown_all(&self) {
        for completer in self.active_completers() {
            log::info!("Shutting down {} completer", completer.name());
            completer.shutdown();
        }
    }
}
