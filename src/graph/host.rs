//! Host runtime callbacks used by sink, source and clock nodes.
//!
//! Nodes at the graph boundary only know callback *names*; the host registers
//! the matching closures here before running compute.

use std::collections::HashMap;
use std::fmt;

use crate::error::{ForgeResult, GraphForgeError};

use super::port_type::PortData;

type SinkCallback = Box<dyn FnMut(&PortData) -> ForgeResult<()> + Send>;
type SourceCallback = Box<dyn FnMut(&mut PortData) -> ForgeResult<bool> + Send>;
type LagCallback = Box<dyn FnMut(f64) + Send>;

/// Named host callbacks available to a compute pass
#[derive(Default)]
pub struct HostContext {
    sinks: HashMap<String, SinkCallback>,
    sources: HashMap<String, SourceCallback>,
    lag_notifications: HashMap<String, LagCallback>,
}

impl HostContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink: receives the sink node's input whenever its trigger is truthy
    pub fn register_sink<F>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: FnMut(&PortData) -> ForgeResult<()> + Send + 'static,
    {
        self.sinks.insert(name.into(), Box::new(callback));
        self
    }

    /// Register a source: fills the buffer and returns whether new data was produced
    pub fn register_source<F>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: FnMut(&mut PortData) -> ForgeResult<bool> + Send + 'static,
    {
        self.sources.insert(name.into(), Box::new(callback));
        self
    }

    /// Register a lag notification: receives the observed lag in clock units
    pub fn register_lag_notification<F>(
        &mut self,
        name: impl Into<String>,
        callback: F,
    ) -> &mut Self
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.lag_notifications
            .insert(name.into(), Box::new(callback));
        self
    }

    pub(crate) fn call_sink(&mut self, name: &str, data: &PortData) -> ForgeResult<()> {
        let callback = self.sinks.get_mut(name).ok_or_else(|| missing(name, "sink"))?;
        callback(data)
    }

    pub(crate) fn call_source(&mut self, name: &str, buffer: &mut PortData) -> ForgeResult<bool> {
        let callback = self
            .sources
            .get_mut(name)
            .ok_or_else(|| missing(name, "source"))?;
        callback(buffer)
    }

    /// Lag notifications are optional; unregistered names are only traced
    pub(crate) fn notify_lag(&mut self, name: &str, lag: f64) {
        match self.lag_notifications.get_mut(name) {
            Some(callback) => callback(lag),
            None => tracing::trace!(callback = name, lag, "no lag notification registered"),
        }
    }
}

fn missing(name: &str, what: &str) -> GraphForgeError {
    GraphForgeError::Host {
        name: name.to_string(),
        reason: format!("no {} callback registered", what),
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sinks: Vec<_> = self.sinks.keys().collect();
        let mut sources: Vec<_> = self.sources.keys().collect();
        let mut lags: Vec<_> = self.lag_notifications.keys().collect();
        sinks.sort();
        sources.sort();
        lags.sort();
        f.debug_struct("HostContext")
            .field("sinks", &sinks)
            .field("sources", &sources)
            .field("lag_notifications", &lags)
            .finish()
    }
}
