//! Mode to handler tables driven by the engine for every inbound record

use crate::command::Mode;
use crate::engine::Engine;
use crate::record::MessageRecord;
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// Callback bound to one mode
pub type Handler = Box<dyn Fn(&MessageRecord, &Engine) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub struct DispatchTable {
    handlers: HashMap<Mode, Handler>,
    debug: bool,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `mode`, replacing any earlier binding
    pub fn register<F>(&mut self, mode: Mode, handler: F)
    where
        F: Fn(&MessageRecord, &Engine) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.insert(mode, Box::new(handler));
    }

    /// Trace every dispatched record before its handler runs
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn registered_modes(&self) -> Vec<Mode> {
        let mut modes: Vec<Mode> = self.handlers.keys().copied().collect();
        modes.sort();
        modes
    }

    /// Run the handler bound to the record's mode.
    ///
    /// Modes without a handler succeed silently.
    pub fn dispatch(&self, record: &MessageRecord, engine: &Engine) -> anyhow::Result<()> {
        let mode = record.command.mode();

        if self.debug {
            info!(
                "Dispatch mode={} key={}",
                mode,
                record.identity_key().as_deref().unwrap_or("-")
            );
        }

        match self.handlers.get(&mode) {
            Some(handler) => handler(record, engine),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTable")
            .field("modes", &self.registered_modes())
            .field("debug", &self.debug)
            .finish()
    }
}
