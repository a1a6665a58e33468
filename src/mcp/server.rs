//! MCP server - stdio transport
//!
//! Newline-delimited JSON-RPC. One request is read, handled and answered
//! (response written and flushed) before the next line is read.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use tracing::{debug, error, info, warn};

use super::dispatch::{Dispatcher, HandlerSet};
use super::protocol::{CallToolParams, ReadResourceParams, Request, Response, PROTOCOL_VERSION};
use crate::error::{codes, ProtocolError};

/// Serve `dispatcher` over stdin/stdout until stdin closes
pub fn run_stdio<S: HandlerSet>(dispatcher: &mut Dispatcher<S>) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(dispatcher, stdin.lock(), stdout.lock())
}

/// Drive the request loop over any line-oriented reader and writer.
///
/// Returns `Ok(())` on end of input. Only I/O failures on the stream end
/// the loop with an error; everything the dispatcher reports becomes a
/// JSON-RPC error response and the loop keeps reading.
pub fn serve<S, R, W>(dispatcher: &mut Dispatcher<S>, mut reader: R, mut writer: W) -> Result<()>
where
    S: HandlerSet,
    R: BufRead,
    W: Write,
{
    info!(server = S::SERVER_NAME, "MCP server ready");

    let mut handled = 0usize;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("Failed to read request from input stream")?;
        if read == 0 {
            break;
        }

        // A frame that is not UTF-8 is a parse error, not a broken stream
        let response = match std::str::from_utf8(&buf) {
            Ok(text) => {
                let line = text.trim();
                if line.is_empty() {
                    continue;
                }
                debug!("received: {}", line);
                handle_line(dispatcher, line)
            }
            Err(e) => {
                warn!("request is not valid UTF-8: {}", e);
                Some(Response::error(
                    None,
                    codes::PARSE_ERROR,
                    &format!("Parse error: {}", e),
                ))
            }
        };

        if let Some(response) = response {
            write_response(&mut writer, &response)?;
        }
        handled += 1;
    }

    writer.flush().context("Failed to flush output stream")?;
    info!(server = S::SERVER_NAME, handled, "input closed, shutting down");
    Ok(())
}

/// Decode one framed message and produce its response, if it needs one
pub fn handle_line<S: HandlerSet>(dispatcher: &mut Dispatcher<S>, line: &str) -> Option<Response> {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!("unparseable request: {}", e);
            return Some(Response::error(
                None,
                codes::PARSE_ERROR,
                &format!("Parse error: {}", e),
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        let err = ProtocolError::InvalidRequest(format!(
            "expected jsonrpc 2.0, got {}",
            request.jsonrpc
        ));
        return Some(Response::from_error(request.id, &err));
    }

    if request.is_notification() {
        handle_notification(&request);
        return None;
    }

    let id = request.id.clone();
    let response = match dispatch(dispatcher, &request) {
        Ok(result) => Response::success(id, result),
        Err(err) => {
            debug!(method = %request.method, code = err.code(), "request failed: {}", err);
            Response::from_error(id, &err)
        }
    };
    Some(response)
}

fn dispatch<S: HandlerSet>(
    dispatcher: &mut Dispatcher<S>,
    req: &Request,
) -> Result<Value, ProtocolError> {
    match req.method.as_str() {
        "initialize" => Ok(handle_initialize(dispatcher, req)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": dispatcher.list_tools() })),
        "tools/call" => handle_tool_call(dispatcher, req),
        "resources/list" => handle_list_resources(dispatcher),
        "resources/read" => handle_read_resource(dispatcher, req),
        "resources/templates/list" => Ok(handle_list_templates(dispatcher)),
        other => Err(ProtocolError::MethodNotFound(other.to_string())),
    }
}

fn handle_notification(req: &Request) {
    match req.method.as_str() {
        "notifications/initialized" => info!("client initialized"),
        "notifications/cancelled" => debug!("cancellation ignored, requests run to completion"),
        other => debug!("ignoring notification {}", other),
    }
}

fn handle_initialize<S: HandlerSet>(dispatcher: &Dispatcher<S>, req: &Request) -> Value {
    let version = req
        .params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);

    let client = req
        .params
        .pointer("/clientInfo/name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    info!(client, version, "initialize");

    let mut result = json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false },
            "resources": { "subscribe": false, "listChanged": false }
        },
        "serverInfo": {
            "name": S::SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    });
    if let Some(instructions) = dispatcher.state().instructions() {
        result["instructions"] = Value::String(instructions);
    }
    result
}

fn handle_tool_call<S: HandlerSet>(
    dispatcher: &mut Dispatcher<S>,
    req: &Request,
) -> Result<Value, ProtocolError> {
    let params: CallToolParams = serde_json::from_value(req.params.clone())
        .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;

    info!(tool = %params.name, "tools/call");
    let result = dispatcher.dispatch(&params.name, params.arguments)?;
    serde_json::to_value(result).map_err(|e| ProtocolError::Internal(e.to_string()))
}

fn handle_list_resources<S: HandlerSet>(
    dispatcher: &Dispatcher<S>,
) -> Result<Value, ProtocolError> {
    let resources = dispatcher.list_resources().map_err(|e| {
        error!("resource listing failed: {:#}", e);
        ProtocolError::Internal(format!("{:#}", e))
    })?;
    Ok(json!({ "resources": resources }))
}

fn handle_read_resource<S: HandlerSet>(
    dispatcher: &Dispatcher<S>,
    req: &Request,
) -> Result<Value, ProtocolError> {
    let params: ReadResourceParams = serde_json::from_value(req.params.clone())
        .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;

    let contents = dispatcher.read_resource(&params.uri)?;
    Ok(json!({ "contents": [contents] }))
}

fn handle_list_templates<S: HandlerSet>(dispatcher: &Dispatcher<S>) -> Value {
    let templates: Vec<Value> = dispatcher
        .registry()
        .schemes()
        .iter()
        .filter_map(|s| {
            s.uri_template.as_ref().map(|template| {
                json!({
                    "uriTemplate": template,
                    "name": format!("{} resources", s.scheme),
                    "mimeType": s.mime_type,
                })
            })
        })
        .collect();
    json!({ "resourceTemplates": templates })
}

fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    let encoded = serde_json::to_string(response).context("Failed to encode response")?;
    writeln!(writer, "{}", encoded).context("Failed to write response")?;
    writer.flush().context("Failed to flush response")?;
    Ok(())
}
