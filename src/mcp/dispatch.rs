//! Tool dispatch
//!
//! Executes exactly one tool invocation per call:
//! 1. look the tool up (`UnknownTool` otherwise)
//! 2. validate the argument map against the declared schema
//! 3. run the handler against the handler set's state
//! 4. render `Ok` blocks as a success and `Err` as an in-band `Error:` block
//!
//! Steps 1 and 2 are protocol errors and never reach a handler.

use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

use super::content::{CallToolResult, Resource, ResourceContents};
use super::registry::Registry;
use crate::error::{ProtocolError, ProtocolResult};

/// A domain's state plus the catalog it declares.
///
/// Implementors are explicit state structs (snippet store, database
/// connection, document index). `declare` runs once when the dispatcher is
/// built; the catalog is immutable afterwards.
pub trait HandlerSet: Sized + 'static {
    /// Reported as `serverInfo.name` during `initialize`
    const SERVER_NAME: &'static str;

    /// Optional usage hint sent to the client during `initialize`
    fn instructions(&self) -> Option<String> {
        None
    }

    fn declare(registry: &mut Registry<Self>) -> ProtocolResult<()>;
}

pub struct Dispatcher<S> {
    registry: Registry<S>,
    state: S,
}

impl<S: HandlerSet> Dispatcher<S> {
    /// Build the registry for `S` and take ownership of its state
    pub fn new(state: S) -> ProtocolResult<Self> {
        let mut registry = Registry::new();
        S::declare(&mut registry)?;
        debug!(
            server = S::SERVER_NAME,
            tools = registry.list_tools().len(),
            schemes = registry.schemes().len(),
            "catalog declared"
        );
        Ok(Self::with_registry(registry, state))
    }
}

impl<S> Dispatcher<S> {
    pub fn with_registry(registry: Registry<S>, state: S) -> Self {
        Self { registry, state }
    }

    pub fn registry(&self) -> &Registry<S> {
        &self.registry
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Invoke `name` with the raw argument payload
    pub fn dispatch(&mut self, name: &str, arguments: Value) -> ProtocolResult<CallToolResult> {
        let entry = self
            .registry
            .tool(name)
            .ok_or_else(|| ProtocolError::UnknownTool(name.to_string()))?;

        let args = entry.schema.validate(arguments)?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            (entry.handler)(&mut self.state, &args)
        }))
        .map_err(|payload| {
            let msg = panic_message(payload.as_ref());
            warn!(tool = name, "handler panicked: {}", msg);
            ProtocolError::Internal(format!("tool '{}' panicked: {}", name, msg))
        })?;

        Ok(match outcome {
            Ok(content) => CallToolResult::success(content),
            Err(failure) => {
                debug!(tool = name, "domain failure: {}", failure);
                CallToolResult::failure(&failure)
            }
        })
    }

    /// `tools/list` payload
    pub fn list_tools(&self) -> Vec<Value> {
        self.registry
            .list_tools()
            .iter()
            .map(|t| t.descriptor())
            .collect()
    }

    pub fn list_resources(&self) -> anyhow::Result<Vec<Resource>> {
        self.registry.list_resources(&self.state).collect()
    }

    pub fn read_resource(&self, uri: &str) -> ProtocolResult<ResourceContents> {
        self.registry.resolve_resource(&self.state, uri)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
