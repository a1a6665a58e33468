use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use toolhost::mcp::{self, Dispatcher, HandlerSet};
use toolhost::{CodeServer, DatabaseServer, DocumentServer, ServerConfig};

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "MCP tool servers over stdio", long_about = None)]
struct Cli {
    /// Config file (defaults to ./toolhost.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// File access, Python execution and code snippets
    Code {
        /// Python interpreter to run code with
        #[arg(long)]
        python: Option<String>,

        /// Execution timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// SQLite database with users and products
    Database {
        /// Database file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Text documents with search
    Document {
        /// Documents directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries JSON-RPC, logs go to stderr
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = ServerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Code {
            python,
            timeout_secs,
        } => {
            if let Some(python) = python {
                config.code.python = python;
            }
            if let Some(secs) = timeout_secs {
                config.code.timeout_secs = secs;
            }
            serve(CodeServer::new(&config.code))
        }
        Commands::Database { db } => {
            if let Some(db) = db {
                config.database.path = db;
            }
            serve(DatabaseServer::open(config.database.resolved_path())?)
        }
        Commands::Document { dir } => {
            if let Some(dir) = dir {
                config.document.dir = dir;
            }
            serve(DocumentServer::open(config.document.resolved_dir())?)
        }
    }
}

fn serve<S: HandlerSet>(state: S) -> Result<()> {
    let mut dispatcher = Dispatcher::new(state)?;
    info!(
        server = S::SERVER_NAME,
        version = env!("CARGO_PKG_VERSION"),
        "serving MCP over stdio"
    );
    mcp::run_stdio(&mut dispatcher)
}
