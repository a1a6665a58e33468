//! Document handler set
//!
//! Plain-text documents stored as `<dir>/<name>.txt`, with an in-memory
//! lowercased index used for case-insensitive search. The directory is the
//! source of truth; the index catches up lazily.

use anyhow::{Context, Result};
use glob::Pattern;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ProtocolResult;
use crate::mcp::{
    ArgType, Arguments, Content, HandlerSet, InputSchema, Registry, Resource, ToolFailure,
    ToolOutcome,
};
use crate::paths::{self, DOCUMENT_EXT};

const SCHEME: &str = "doc";
const MIME_TYPE: &str = "text/plain";

pub struct DocumentServer {
    dir: PathBuf,
    /// name → lowercased content
    index: HashMap<String, String>,
}

impl DocumentServer {
    /// Create the directory if needed and index every document already in it
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create documents directory {}", dir.display()))?;

        let mut server = Self {
            dir,
            index: HashMap::new(),
        };
        for name in server.stored_names()? {
            let content = server.read(&name)?;
            server.index_document(&name, &content);
        }

        info!(
            dir = %server.dir.display(),
            indexed = server.index.len(),
            "document server initialized"
        );
        Ok(server)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        paths::document_file(&self.dir, name)
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.path_for(name);
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn index_document(&mut self, name: &str, content: &str) {
        self.index.insert(name.to_string(), content.to_lowercase());
    }

    /// Names of all `.txt` files in the directory, sorted
    pub fn stored_names(&self) -> Result<Vec<String>> {
        let pattern = Path::new(&Pattern::escape(&self.dir.to_string_lossy()))
            .join(format!("*.{}", DOCUMENT_EXT));
        let entries = glob::glob(&pattern.to_string_lossy())
            .with_context(|| format!("Failed to list {}", self.dir.display()))?;

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Document names map straight onto file names, so anything that could
/// escape the directory is refused.
fn check_name(name: &str) -> Result<(), ToolFailure> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ToolFailure::new(format!("Invalid document name: '{}'", name)));
    }
    Ok(())
}

impl HandlerSet for DocumentServer {
    const SERVER_NAME: &'static str = "document-server";

    fn instructions(&self) -> Option<String> {
        Some(format!(
            "Text documents stored in {}. Each document is readable as doc://<name>.",
            self.dir.display()
        ))
    }

    fn declare(registry: &mut Registry<Self>) -> ProtocolResult<()> {
        registry.declare_tool(
            "create_document",
            "Create a new document",
            InputSchema::empty()
                .required("name", ArgType::String, "Name of the document")
                .required("content", ArgType::String, "Content of the document"),
            create_document,
        )?;
        registry.declare_tool(
            "read_document",
            "Read a document by name",
            InputSchema::empty().required("name", ArgType::String, "Name of the document to read"),
            read_document,
        )?;
        registry.declare_tool(
            "list_documents",
            "List all available documents",
            InputSchema::empty(),
            list_documents,
        )?;
        registry.declare_tool(
            "search_documents",
            "Search for documents containing specific text",
            InputSchema::empty().required("query", ArgType::String, "Text to search for"),
            search_documents,
        )?;
        registry.declare_tool(
            "append_to_document",
            "Append content to an existing document",
            InputSchema::empty()
                .required("name", ArgType::String, "Name of the document")
                .required("content", ArgType::String, "Content to append"),
            append_to_document,
        )?;
        registry.declare_tool(
            "delete_document",
            "Delete a document",
            InputSchema::empty().required("name", ArgType::String, "Name of the document to delete"),
            delete_document,
        )?;

        registry.register_scheme(
            SCHEME,
            MIME_TYPE,
            Some("doc://{name}"),
            |state: &DocumentServer| {
                Ok(state
                    .stored_names()?
                    .into_iter()
                    .map(|name| {
                        Resource::new(format!("{SCHEME}://{name}"), format!("Document: {name}"))
                            .with_description(format!("Text document: {name}"))
                            .with_mime_type(MIME_TYPE)
                    })
                    .collect())
            },
            |state: &DocumentServer, name: &str| {
                if check_name(name).is_err() || !state.path_for(name).is_file() {
                    return Ok(None);
                }
                state.read(name).map(Some)
            },
        )
    }
}

fn create_document(state: &mut DocumentServer, args: &Arguments) -> ToolOutcome {
    let name = args.str("name")?;
    let content = args.str("content")?;
    check_name(name)?;

    let path = state.path_for(name);
    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    state.index_document(name, content);

    Ok(vec![Content::text(format!(
        "Document '{}' created successfully ({} characters)",
        name,
        content.chars().count()
    ))])
}

fn read_document(state: &mut DocumentServer, args: &Arguments) -> ToolOutcome {
    let name = args.str("name")?;
    check_name(name)?;

    if !state.path_for(name).is_file() {
        return Err(ToolFailure::new(format!("Document '{}' not found", name)));
    }
    Ok(vec![Content::text(state.read(name)?)])
}

fn list_documents(state: &mut DocumentServer, _: &Arguments) -> ToolOutcome {
    let names = state.stored_names()?;
    if names.is_empty() {
        return Ok(vec![Content::text("No documents found")]);
    }

    let listing: Vec<String> = names.iter().map(|n| format!("- {}", n)).collect();
    Ok(vec![Content::text(format!(
        "Available documents ({}):\n{}",
        names.len(),
        listing.join("\n")
    ))])
}

fn search_documents(state: &mut DocumentServer, args: &Arguments) -> ToolOutcome {
    let query = args.str("query")?;
    if query.is_empty() {
        return Err(ToolFailure::new("query must not be empty"));
    }
    let needle = query.to_lowercase();

    // Catch up with the directory: pick up new files, forget removed ones
    let stored = state.stored_names()?;
    state.index.retain(|name, _| stored.binary_search(name).is_ok());
    for name in &stored {
        if !state.index.contains_key(name) {
            let content = state.read(name)?;
            debug!(document = %name, "indexing on demand");
            state.index_document(name, &content);
        }
    }

    let mut matches: Vec<(&str, usize)> = state
        .index
        .iter()
        .map(|(name, text)| (name.as_str(), text.matches(needle.as_str()).count()))
        .filter(|(_, count)| *count > 0)
        .collect();
    matches.sort();

    if matches.is_empty() {
        return Ok(vec![Content::text(format!(
            "No documents found containing '{}'",
            query
        ))]);
    }

    let results: Vec<String> = matches
        .iter()
        .map(|(name, count)| format!("- {} ({} occurrence(s))", name, count))
        .collect();
    Ok(vec![Content::text(format!(
        "Search results for '{}':\n{}",
        query,
        results.join("\n")
    ))])
}

fn append_to_document(state: &mut DocumentServer, args: &Arguments) -> ToolOutcome {
    let name = args.str("name")?;
    let content = args.str("content")?;
    check_name(name)?;

    if !state.path_for(name).is_file() {
        return Err(ToolFailure::new(format!(
            "Document '{}' not found. Use create_document first.",
            name
        )));
    }

    let updated = format!("{}\n{}", state.read(name)?, content);
    let path = state.path_for(name);
    fs::write(&path, &updated).with_context(|| format!("Failed to write {}", path.display()))?;
    state.index_document(name, &updated);

    Ok(vec![Content::text(format!(
        "Appended {} characters to '{}'",
        content.chars().count(),
        name
    ))])
}

fn delete_document(state: &mut DocumentServer, args: &Arguments) -> ToolOutcome {
    let name = args.str("name")?;
    check_name(name)?;

    let path = state.path_for(name);
    if !path.is_file() {
        return Err(ToolFailure::new(format!("Document '{}' not found", name)));
    }
    fs::remove_file(&path).with_context(|| format!("Failed to delete {}", path.display()))?;
    state.index.remove(name);

    Ok(vec![Content::text(format!(
        "Document '{}' deleted successfully",
        name
    ))])
}
