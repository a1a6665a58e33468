//! Code handler set
//!
//! File read/write, Python execution in a fresh subprocess with a hard
//! wall-clock timeout, and an in-memory snippet store exposed as
//! `code://<name>` resources.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::CodeSection;
use crate::error::ProtocolResult;
use crate::mcp::{
    ArgType, Arguments, Content, HandlerSet, InputSchema, Registry, Resource, ToolFailure,
    ToolOutcome,
};

const SCHEME: &str = "code";
const MIME_TYPE: &str = "text/x-python";

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct CodeServer {
    snippets: BTreeMap<String, String>,
    interpreter: PathBuf,
    timeout: Duration,
}

impl CodeServer {
    pub fn new(config: &CodeSection) -> Self {
        let interpreter = resolve_interpreter(&config.python);
        info!(
            interpreter = %interpreter.display(),
            timeout_secs = config.timeout().as_secs(),
            "code server initialized"
        );
        Self {
            snippets: BTreeMap::new(),
            interpreter,
            timeout: config.timeout(),
        }
    }
}

/// Find the interpreter on PATH, falling back to `python` when the
/// configured name is missing. Unresolvable names are kept as-is so the
/// failure surfaces on first use.
fn resolve_interpreter(name: &str) -> PathBuf {
    which::which(name)
        .or_else(|_| which::which("python"))
        .unwrap_or_else(|_| {
            warn!("interpreter '{}' not found on PATH", name);
            PathBuf::from(name)
        })
}

impl HandlerSet for CodeServer {
    const SERVER_NAME: &'static str = "code-server";

    fn instructions(&self) -> Option<String> {
        Some(format!(
            "File access, Python execution (max {} seconds) and saved snippets readable as code://<name>.",
            self.timeout.as_secs()
        ))
    }

    fn declare(registry: &mut Registry<Self>) -> ProtocolResult<()> {
        registry.declare_tool(
            "read_file",
            "Read the contents of a file",
            InputSchema::empty().required("file_path", ArgType::String, "Path to the file to read"),
            read_file,
        )?;
        registry.declare_tool(
            "write_file",
            "Write content to a file",
            InputSchema::empty()
                .required("file_path", ArgType::String, "Path to the file to write")
                .required("content", ArgType::String, "Content to write to the file"),
            write_file,
        )?;
        registry.declare_tool(
            "execute_code",
            "Execute Python code and return the result",
            InputSchema::empty().required("code", ArgType::String, "Python code to execute"),
            execute_code,
        )?;
        registry.declare_tool(
            "save_code_snippet",
            "Save a code snippet for later retrieval",
            InputSchema::empty()
                .required("name", ArgType::String, "Name for the code snippet")
                .required("code", ArgType::String, "Code snippet to save"),
            save_code_snippet,
        )?;
        registry.declare_tool(
            "list_code_snippets",
            "List all saved code snippets",
            InputSchema::empty(),
            list_code_snippets,
        )?;

        registry.register_scheme(
            SCHEME,
            MIME_TYPE,
            Some("code://{name}"),
            |state: &CodeServer| {
                Ok(state
                    .snippets
                    .keys()
                    .map(|name| {
                        Resource::new(format!("{SCHEME}://{name}"), format!("Code: {name}"))
                            .with_description(format!("Stored code snippet: {name}"))
                            .with_mime_type(MIME_TYPE)
                    })
                    .collect())
            },
            |state: &CodeServer, name: &str| Ok(state.snippets.get(name).cloned()),
        )
    }
}

fn read_file(_: &mut CodeServer, args: &Arguments) -> ToolOutcome {
    let file_path = args.str("file_path")?;
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(ToolFailure::new(format!("File not found: {}", file_path)));
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", file_path))?;
    Ok(vec![Content::text(content)])
}

fn write_file(_: &mut CodeServer, args: &Arguments) -> ToolOutcome {
    let file_path = args.str("file_path")?;
    let content = args.str("content")?;
    let path = Path::new(file_path);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", file_path))?;

    Ok(vec![Content::text(format!(
        "Successfully wrote {} characters to {}",
        content.chars().count(),
        file_path
    ))])
}

fn execute_code(state: &mut CodeServer, args: &Arguments) -> ToolOutcome {
    let code = args.str("code")?;

    let mut cmd = Command::new(&state.interpreter);
    cmd.arg("-c").arg(code);

    let started = Instant::now();
    let outcome = run_with_timeout(cmd, state.timeout)
        .with_context(|| format!("Failed to run {}", state.interpreter.display()))?;
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "execute_code finished");

    match outcome {
        ExecOutcome::Finished {
            status,
            stdout,
            stderr,
        } => Ok(vec![Content::text(format!(
            "Execution result:\n{}",
            format_execution(status, &stdout, &stderr)
        ))]),
        ExecOutcome::TimedOut { pid } => {
            warn!(pid, "execute_code timed out, child killed");
            Err(ToolFailure::new(format!(
                "Code execution timed out (max {} seconds)",
                state.timeout.as_secs()
            )))
        }
    }
}

fn format_execution(status: ExitStatus, stdout: &str, stderr: &str) -> String {
    let mut output = stdout.to_string();
    if !stderr.is_empty() {
        output.push_str("\n[stderr]\n");
        output.push_str(stderr);
    }

    if !status.success() {
        let marker = match status.code() {
            Some(code) => format!("[Error - exit code {}]", code),
            None => "[Error - terminated by signal]".to_string(),
        };
        output = format!("{}\n{}", marker, output);
    }
    output
}

fn save_code_snippet(state: &mut CodeServer, args: &Arguments) -> ToolOutcome {
    let name = args.str("name")?;
    let code = args.str("code")?;
    if name.is_empty() {
        return Err(ToolFailure::new("Snippet name must not be empty"));
    }

    state.snippets.insert(name.to_string(), code.to_string());
    Ok(vec![Content::text(format!(
        "Code snippet '{}' saved successfully",
        name
    ))])
}

fn list_code_snippets(state: &mut CodeServer, _: &Arguments) -> ToolOutcome {
    if state.snippets.is_empty() {
        return Ok(vec![Content::text("No code snippets saved yet")]);
    }

    let listing: Vec<String> = state.snippets.keys().map(|n| format!("- {}", n)).collect();
    Ok(vec![Content::text(format!(
        "Saved code snippets:\n{}",
        listing.join("\n")
    ))])
}

// =============================================================================
// Subprocess execution
// =============================================================================

#[derive(Debug)]
pub enum ExecOutcome {
    Finished {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    /// The child (and its process group on Unix) was killed and reaped
    TimedOut { pid: u32 },
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Run `cmd` to completion or until `timeout` elapses.
///
/// Output pipes are drained on helper threads so a chatty child cannot
/// block on a full pipe. The deadline covers both the child and the
/// drains: a background process that keeps the pipes open past it is a
/// timeout too. Whatever is left in the child's process group is killed
/// before returning, so nothing outlives the call.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<ExecOutcome> {
    let deadline = Instant::now()
        .checked_add(timeout)
        .context("Execution timeout out of range")?;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own process group, so a timeout can take down anything it spawned
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().context("Failed to spawn process")?;
    let pid = child.id();

    let (tx, rx) = mpsc::channel();
    let mut pending = 0;
    if let Some(pipe) = child.stdout.take() {
        drain(pipe, Stream::Stdout, tx.clone());
        pending += 1;
    }
    if let Some(pipe) = child.stderr.take() {
        drain(pipe, Stream::Stderr, tx.clone());
        pending += 1;
    }
    drop(tx);

    let status = loop {
        if let Some(status) = child.try_wait().context("Failed to poll child process")? {
            break status;
        }
        if Instant::now() >= deadline {
            terminate(&mut child)?;
            return Ok(ExecOutcome::TimedOut { pid });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let mut stdout = String::new();
    let mut stderr = String::new();
    while pending > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, text)) => stdout = text,
            Ok((Stream::Stderr, text)) => stderr = text,
            Err(RecvTimeoutError::Timeout) => {
                // Child exited but something it started still holds a pipe
                kill_group(pid);
                return Ok(ExecOutcome::TimedOut { pid });
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
        pending -= 1;
    }

    // Background processes that let go of the pipes are still in the group
    kill_group(pid);
    Ok(ExecOutcome::Finished {
        status,
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R, stream: Stream, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

/// SIGKILL the process group led by `pid`. An empty group is not an error.
#[cfg(unix)]
fn kill_group(pid: u32) {
    // Negative pid addresses the whole group
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

fn terminate(child: &mut Child) -> Result<()> {
    kill_group(child.id());

    // Already dead is fine; reaping is what matters
    let _ = child.kill();
    child.wait().context("Failed to reap timed out process")?;
    Ok(())
}
