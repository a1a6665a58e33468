//! Tool and resource registry
//!
//! The registry is pure data + lookup. Tools are declared once at startup
//! and kept in declaration order. Resources are never stored: each
//! registered scheme carries an enumerator and a resolver that are called
//! through on every request, so listings always reflect live state.
//!
//! The registry is generic over the handler set's state type `S`; the
//! [`Dispatcher`](super::Dispatcher) owns both and lends the state to
//! handlers.

use serde_json::{json, Value};
use std::collections::HashMap;

use super::content::{Resource, ResourceContents, ToolOutcome};
use super::schema::{Arguments, InputSchema};
use crate::error::{ProtocolError, ProtocolResult};

/// Bound tool handler
pub type ToolHandler<S> = Box<dyn Fn(&mut S, &Arguments) -> ToolOutcome>;

/// Produces the current resources for one scheme
pub type ResourceEnumerator<S> = Box<dyn Fn(&S) -> anyhow::Result<Vec<Resource>>>;

/// Resolves the part of a URI after `<scheme>://` to text.
///
/// `Ok(None)` means the item does not exist.
pub type ResourceResolver<S> = Box<dyn Fn(&S, &str) -> anyhow::Result<Option<String>>>;

/// A declared tool
pub struct ToolEntry<S> {
    pub name: String,
    pub description: String,
    pub schema: InputSchema,
    pub(crate) handler: ToolHandler<S>,
}

impl<S> ToolEntry<S> {
    /// `tools/list` rendering
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.schema.to_json(),
        })
    }
}

/// A registered resource scheme (`code`, `db`, `doc`, ...)
pub struct SchemeEntry<S> {
    pub scheme: String,
    pub mime_type: String,
    /// Optional RFC 6570 template advertised by `resources/templates/list`
    pub uri_template: Option<String>,
    enumerate: ResourceEnumerator<S>,
    resolve: ResourceResolver<S>,
}

pub struct Registry<S> {
    tools: Vec<ToolEntry<S>>,
    by_name: HashMap<String, usize>,
    schemes: Vec<SchemeEntry<S>>,
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
            schemes: Vec::new(),
        }
    }

    /// Declare a tool. Names are unique per registry.
    pub fn declare_tool<F>(
        &mut self,
        name: &str,
        description: &str,
        schema: InputSchema,
        handler: F,
    ) -> ProtocolResult<()>
    where
        F: Fn(&mut S, &Arguments) -> ToolOutcome + 'static,
    {
        if self.by_name.contains_key(name) {
            return Err(ProtocolError::DuplicateToolName(name.to_string()));
        }
        self.by_name.insert(name.to_string(), self.tools.len());
        self.tools.push(ToolEntry {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Register a resource scheme with its enumerator and resolver
    pub fn register_scheme<E, R>(
        &mut self,
        scheme: &str,
        mime_type: &str,
        uri_template: Option<&str>,
        enumerate: E,
        resolve: R,
    ) -> ProtocolResult<()>
    where
        E: Fn(&S) -> anyhow::Result<Vec<Resource>> + 'static,
        R: Fn(&S, &str) -> anyhow::Result<Option<String>> + 'static,
    {
        if self.schemes.iter().any(|s| s.scheme == scheme) {
            return Err(ProtocolError::DuplicateScheme(scheme.to_string()));
        }
        self.schemes.push(SchemeEntry {
            scheme: scheme.to_string(),
            mime_type: mime_type.to_string(),
            uri_template: uri_template.map(str::to_string),
            enumerate: Box::new(enumerate),
            resolve: Box::new(resolve),
        });
        Ok(())
    }

    /// Static tool catalog in declaration order
    pub fn list_tools(&self) -> &[ToolEntry<S>] {
        &self.tools
    }

    pub fn tool(&self, name: &str) -> Option<&ToolEntry<S>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn schemes(&self) -> &[SchemeEntry<S>] {
        &self.schemes
    }

    /// Current resources, scheme by scheme.
    ///
    /// Each call starts over and invokes the enumerators again; nothing is
    /// cached between calls.
    pub fn list_resources<'a>(
        &'a self,
        state: &'a S,
    ) -> impl Iterator<Item = anyhow::Result<Resource>> + 'a {
        self.schemes
            .iter()
            .flat_map(move |entry| match (entry.enumerate)(state) {
                Ok(resources) => resources.into_iter().map(Ok).collect::<Vec<_>>(),
                Err(e) => vec![Err(e.context(format!(
                    "Failed to list {}:// resources",
                    entry.scheme
                )))],
            })
    }

    /// Resolve a URI to its contents
    pub fn resolve_resource(&self, state: &S, uri: &str) -> ProtocolResult<ResourceContents> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| ProtocolError::UnknownResourceScheme(uri.to_string()))?;

        let entry = self
            .schemes
            .iter()
            .find(|s| s.scheme == scheme)
            .ok_or_else(|| ProtocolError::UnknownResourceScheme(uri.to_string()))?;

        match (entry.resolve)(state, rest) {
            Ok(Some(text)) => Ok(ResourceContents {
                uri: uri.to_string(),
                mime_type: Some(entry.mime_type.clone()),
                text,
            }),
            Ok(None) => Err(ProtocolError::ResourceNotFound(uri.to_string())),
            Err(e) => Err(ProtocolError::Internal(format!("{:#}", e))),
        }
    }
}
