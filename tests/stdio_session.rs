//! End-to-end sessions: newline-delimited JSON-RPC in, responses out

use serde_json::{json, Value};
use std::io::Cursor;
use tempfile::TempDir;
use toolhost::mcp::{serve, Dispatcher, HandlerSet};
use toolhost::{DatabaseServer, DocumentServer};

/// Feed `requests` one per line and collect the parsed responses
fn session<S: HandlerSet>(dispatcher: &mut Dispatcher<S>, requests: &[Value]) -> Vec<Value> {
    let input: String = requests
        .iter()
        .map(|r| format!("{}\n", r))
        .collect();
    let mut output = Vec::new();
    serve(dispatcher, Cursor::new(input), &mut output).unwrap();

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn call(id: u64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    })
}

fn text_of(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

#[test]
fn test_document_session() {
    let temp_dir = TempDir::new().unwrap();
    let mut dispatcher =
        Dispatcher::new(DocumentServer::open(temp_dir.path().join("documents")).unwrap()).unwrap();

    let responses = session(
        &mut dispatcher,
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
                "protocolVersion": "2024-11-05",
                "clientInfo": {"name": "test", "version": "0"}
            }}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            call(3, "create_document", json!({"name": "a", "content": "hello world"})),
            call(4, "create_document", json!({"name": "b", "content": "goodbye"})),
            call(5, "search_documents", json!({"query": "hello"})),
            json!({"jsonrpc": "2.0", "id": 6, "method": "resources/list"}),
            json!({"jsonrpc": "2.0", "id": 7, "method": "resources/read", "params": {"uri": "doc://a"}}),
            call(8, "read_document", json!({"name": "zzz"})),
        ],
    );

    // The notification gets no reply
    assert_eq!(responses.len(), 8);
    let ids: Vec<u64> = responses.iter().map(|r| r["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8]);

    let init = &responses[0]["result"];
    assert_eq!(init["protocolVersion"], "2024-11-05");
    assert_eq!(init["serverInfo"]["name"], "document-server");
    assert!(init["capabilities"]["tools"].is_object());
    assert!(init["capabilities"]["resources"].is_object());

    let tools: Vec<&str> = responses[1]["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        tools,
        vec![
            "create_document",
            "read_document",
            "list_documents",
            "search_documents",
            "append_to_document",
            "delete_document"
        ]
    );

    assert_eq!(
        text_of(&responses[4]),
        "Search results for 'hello':\n- a (1 occurrence(s))"
    );

    let uris: Vec<&str> = responses[5]["result"]["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["uri"].as_str().unwrap())
        .collect();
    assert_eq!(uris, vec!["doc://a", "doc://b"]);

    let contents = &responses[6]["result"]["contents"][0];
    assert_eq!(contents["uri"], "doc://a");
    assert_eq!(contents["mimeType"], "text/plain");
    assert_eq!(contents["text"], "hello world");

    // Domain failure stays in-band
    assert!(responses[7]["error"].is_null());
    assert_eq!(responses[7]["result"]["isError"], true);
    assert_eq!(text_of(&responses[7]), "Error: Document 'zzz' not found");
}

#[test]
fn test_database_session() {
    let temp_dir = TempDir::new().unwrap();
    let mut dispatcher =
        Dispatcher::new(DatabaseServer::open(temp_dir.path().join("example.db")).unwrap()).unwrap();

    let responses = session(
        &mut dispatcher,
        &[
            call(1, "insert_user", json!({"name": "Dana", "email": "dana@example.com", "age": 41})),
            call(2, "get_user", json!({"email": "dana@example.com"})),
            call(3, "insert_user", json!({"name": "Dana", "email": "dana@example.com", "age": 41})),
            call(4, "execute_query", json!({"query": "DROP TABLE users"})),
            call(5, "execute_query", json!({"query": "SELECT COUNT(*) AS n FROM users"})),
            call(6, "list_tables", json!({})),
            call(7, "list_tables", json!({})),
            call(8, "insert_user", json!({"name": "Eve"})),
            json!({"jsonrpc": "2.0", "id": 9, "method": "resources/read", "params": {"uri": "db://tables"}}),
        ],
    );
    assert_eq!(responses.len(), 9);

    assert!(text_of(&responses[0]).starts_with("User 'Dana' inserted successfully with ID "));
    assert!(text_of(&responses[1]).contains("\"name\": \"Dana\""));

    assert_eq!(responses[2]["result"]["isError"], true);
    assert!(text_of(&responses[2]).contains("UNIQUE constraint failed"));

    assert_eq!(responses[3]["result"]["isError"], true);

    let count = text_of(&responses[4]);
    assert!(count.starts_with("Query results (1 rows):"));
    assert!(count.contains("\"n\": 4"));

    assert_eq!(responses[5]["result"], responses[6]["result"]);

    // Missing required arguments never reach the handler
    assert_eq!(responses[7]["error"]["code"], -32602);
    assert!(responses[7]["result"].is_null());

    let tables: Vec<String> =
        serde_json::from_str(responses[8]["result"]["contents"][0]["text"].as_str().unwrap())
            .unwrap();
    assert!(tables.contains(&"products".to_string()));
}

#[test]
fn test_protocol_errors_keep_the_loop_alive() {
    let temp_dir = TempDir::new().unwrap();
    let mut dispatcher =
        Dispatcher::new(DocumentServer::open(temp_dir.path()).unwrap()).unwrap();

    let input = [
        "{not json".to_string(),
        json!({"jsonrpc": "2.0", "id": 1, "method": "bogus/method"}).to_string(),
        call(2, "no_such_tool", json!({})).to_string(),
        json!({"jsonrpc": "2.0", "id": 3, "method": "resources/read", "params": {"uri": "ftp://x"}})
            .to_string(),
        json!({"jsonrpc": "2.0", "id": 4, "method": "resources/read", "params": {"uri": "doc://none"}})
            .to_string(),
        String::new(),
        json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}).to_string(),
    ]
    .join("\n");

    let mut output = Vec::new();
    serve(&mut dispatcher, Cursor::new(input), &mut output).unwrap();
    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(responses.len(), 6);
    assert_eq!(responses[0]["error"]["code"], -32700);
    assert!(responses[0]["id"].is_null());
    assert_eq!(responses[1]["error"]["code"], -32601);
    assert_eq!(responses[2]["error"]["code"], -32602);
    assert_eq!(responses[3]["error"]["code"], -32602);
    assert_eq!(responses[4]["error"]["code"], -32002);
    assert_eq!(responses[5]["id"], 5);
    assert_eq!(responses[5]["result"], json!({}));
}
