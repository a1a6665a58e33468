//! Database handler set
//!
//! SQLite store with a fixed `users`/`products` schema, seeded on first
//! start. Exposes `db://schema` and `db://tables` as JSON resources.

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, Params};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::info;

use crate::error::ProtocolResult;
use crate::mcp::{
    ArgType, Arguments, Content, HandlerSet, InputSchema, Registry, Resource, ToolFailure,
    ToolOutcome,
};

const SCHEME: &str = "db";
const MIME_TYPE: &str = "application/json";

/// Statement verbs `execute_query` accepts
const ALLOWED_VERBS: [&str; 4] = ["SELECT", "INSERT", "UPDATE", "DELETE"];

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        age INTEGER,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        price REAL NOT NULL,
        category TEXT,
        stock INTEGER DEFAULT 0
    );
";

const SEED_USERS: [(&str, &str, i64); 3] = [
    ("Alice Johnson", "alice@example.com", 30),
    ("Bob Smith", "bob@example.com", 25),
    ("Charlie Brown", "charlie@example.com", 35),
];

const SEED_PRODUCTS: [(&str, f64, &str, i64); 3] = [
    ("Laptop", 999.99, "Electronics", 10),
    ("Mouse", 29.99, "Electronics", 50),
    ("Desk Chair", 199.99, "Furniture", 15),
];

pub struct DatabaseServer {
    conn: Connection,
    location: String,
}

impl DatabaseServer {
    /// Open or create the database file, then ensure schema and seed rows
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        Self::initialize(conn, path.display().to_string())
    }

    /// In-memory database for testing
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to create in-memory database")?;
        Self::initialize(conn, ":memory:".to_string())
    }

    fn initialize(mut conn: Connection, location: String) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create schema")?;

        let tx = conn.transaction()?;
        let users: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        if users == 0 {
            for (name, email, age) in SEED_USERS {
                tx.execute(
                    "INSERT INTO users (name, email, age) VALUES (?1, ?2, ?3)",
                    params![name, email, age],
                )?;
            }
        }
        let products: i64 = tx.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        if products == 0 {
            for (name, price, category, stock) in SEED_PRODUCTS {
                tx.execute(
                    "INSERT INTO products (name, price, category, stock) VALUES (?1, ?2, ?3, ?4)",
                    params![name, price, category, stock],
                )?;
            }
        }
        tx.commit().context("Failed to seed database")?;

        info!(database = %location, seeded = users == 0, "database server initialized");
        Ok(Self { conn, location })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Table names in name order
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Table name → CREATE statement
    pub fn schema_json(&self) -> Result<Value> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, sql FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let mut tables = Map::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;
        for row in rows {
            let (name, sql) = row?;
            tables.insert(name, sql.map(Value::String).unwrap_or(Value::Null));
        }
        Ok(Value::Object(tables))
    }
}

impl HandlerSet for DatabaseServer {
    const SERVER_NAME: &'static str = "database-server";

    fn instructions(&self) -> Option<String> {
        Some(format!(
            "SQLite database at {} with users and products tables. Read db://schema for table definitions.",
            self.location
        ))
    }

    fn declare(registry: &mut Registry<Self>) -> ProtocolResult<()> {
        registry.declare_tool(
            "execute_query",
            "Execute a SQL query and return results",
            InputSchema::empty().required(
                "query",
                ArgType::String,
                "SQL query to execute (SELECT, INSERT, UPDATE, DELETE)",
            ),
            execute_query,
        )?;
        registry.declare_tool(
            "list_tables",
            "List all tables in the database",
            InputSchema::empty(),
            list_tables,
        )?;
        registry.declare_tool(
            "describe_table",
            "Get schema information for a specific table",
            InputSchema::empty().required("table_name", ArgType::String, "Name of the table to describe"),
            describe_table,
        )?;
        registry.declare_tool(
            "insert_user",
            "Insert a new user into the users table",
            InputSchema::empty()
                .required("name", ArgType::String, "User's name")
                .required("email", ArgType::String, "User's email")
                .required("age", ArgType::Integer, "User's age"),
            insert_user,
        )?;
        registry.declare_tool(
            "get_user",
            "Get a user by email",
            InputSchema::empty().required("email", ArgType::String, "User's email"),
            get_user,
        )?;

        registry.register_scheme(
            SCHEME,
            MIME_TYPE,
            None,
            |_: &DatabaseServer| {
                Ok(vec![
                    Resource::new("db://schema", "Database Schema")
                        .with_description("Schema information for the database")
                        .with_mime_type(MIME_TYPE),
                    Resource::new("db://tables", "Database Tables")
                        .with_description("List of all tables in the database")
                        .with_mime_type(MIME_TYPE),
                ])
            },
            |state: &DatabaseServer, name: &str| {
                let value = match name {
                    "schema" => state.schema_json()?,
                    "tables" => Value::from(state.table_names()?),
                    _ => return Ok(None),
                };
                Ok(Some(serde_json::to_string_pretty(&value)?))
            },
        )
    }
}

/// The allowed verb a statement starts with, if any
fn statement_verb(query: &str) -> Option<&'static str> {
    let upper = query.trim().to_uppercase();
    ALLOWED_VERBS.into_iter().find(|verb| upper.starts_with(verb))
}

fn execute_query(state: &mut DatabaseServer, args: &Arguments) -> ToolOutcome {
    let query = args.str("query")?;
    let verb = statement_verb(query).ok_or_else(|| {
        ToolFailure::new("Only SELECT, INSERT, UPDATE, DELETE queries are allowed")
    })?;

    if verb == "SELECT" {
        let rows = query_json(&state.conn, query, []).context("Query failed")?;
        if rows.is_empty() {
            return Ok(vec![Content::text(
                "Query executed successfully, but returned no results",
            )]);
        }
        let json = serde_json::to_string_pretty(&rows).context("Failed to encode rows")?;
        return Ok(vec![Content::text(format!(
            "Query results ({} rows):\n{}",
            rows.len(),
            json
        ))]);
    }

    // Dropping an uncommitted transaction rolls it back
    let tx = state.conn.transaction().context("Failed to begin transaction")?;
    let affected = tx.execute(query, []).context("Query failed")?;
    tx.commit().context("Failed to commit")?;

    Ok(vec![Content::text(format!(
        "Query executed successfully. Rows affected: {}",
        affected
    ))])
}

fn list_tables(state: &mut DatabaseServer, _: &Arguments) -> ToolOutcome {
    let names = state.table_names().context("Failed to list tables")?;
    let listing: Vec<String> = names.iter().map(|t| format!("- {}", t)).collect();
    Ok(vec![Content::text(format!(
        "Database tables:\n{}",
        listing.join("\n")
    ))])
}

fn describe_table(state: &mut DatabaseServer, args: &Arguments) -> ToolOutcome {
    let table = args.str("table_name")?;

    let mut stmt = state
        .conn
        .prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1)")
        .context("Failed to describe table")?;
    let columns = stmt
        .query_map([table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })
        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
        .context("Failed to describe table")?;

    if columns.is_empty() {
        return Err(ToolFailure::new(format!("Table '{}' not found", table)));
    }

    let lines: Vec<String> = columns
        .iter()
        .map(|(name, kind, not_null)| {
            let mut line = format!("- {} ({})", name, kind);
            if *not_null {
                line.push_str(" NOT NULL");
            }
            line
        })
        .collect();
    Ok(vec![Content::text(format!(
        "Table '{}' schema:\n{}",
        table,
        lines.join("\n")
    ))])
}

fn insert_user(state: &mut DatabaseServer, args: &Arguments) -> ToolOutcome {
    let name = args.str("name")?;
    let email = args.str("email")?;
    let age = args.i64("age")?;

    match state.conn.execute(
        "INSERT INTO users (name, email, age) VALUES (?1, ?2, ?3)",
        params![name, email, age],
    ) {
        Ok(_) => Ok(vec![Content::text(format!(
            "User '{}' inserted successfully with ID {}",
            name,
            state.conn.last_insert_rowid()
        ))]),
        Err(e) if is_constraint_violation(&e) => Err(ToolFailure::new(e.to_string())),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to insert user").into()),
    }
}

fn get_user(state: &mut DatabaseServer, args: &Arguments) -> ToolOutcome {
    let email = args.str("email")?;

    let rows = query_json(
        &state.conn,
        "SELECT id, name, email, age, created_at FROM users WHERE email = ?1",
        [email],
    )
    .context("Failed to look up user")?;

    match rows.into_iter().next() {
        Some(user) => {
            let json = serde_json::to_string_pretty(&user).context("Failed to encode user")?;
            Ok(vec![Content::text(format!("User found:\n{}", json))])
        }
        None => Ok(vec![Content::text(format!(
            "No user found with email: {}",
            email
        ))]),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Run a query and turn every row into a column → value object
fn query_json<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<Map<String, Value>>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut object = Map::new();
        for (i, column) in columns.iter().enumerate() {
            object.insert(column.clone(), value_to_json(row.get_ref(i)?));
        }
        out.push(object);
    }
    Ok(out)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::Dispatcher;
    use serde_json::json;
    use tempfile::TempDir;

    fn server() -> Dispatcher<DatabaseServer> {
        Dispatcher::new(DatabaseServer::open_in_memory().unwrap()).unwrap()
    }

    fn user_count(d: &Dispatcher<DatabaseServer>) -> i64 {
        d.state()
            .connection()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_seeded_on_first_open() {
        let d = server();
        assert_eq!(user_count(&d), 3);
    }

    #[test]
    fn test_reopen_does_not_reseed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data/example.db");

        {
            let mut d = Dispatcher::new(DatabaseServer::open(&path).unwrap()).unwrap();
            d.dispatch("execute_query", json!({"query": "DELETE FROM users WHERE age < 30"}))
                .unwrap();
        }

        let d = Dispatcher::new(DatabaseServer::open(&path).unwrap()).unwrap();
        assert_eq!(user_count(&d), 2);
    }

    #[test]
    fn test_statement_verb() {
        assert_eq!(statement_verb("  select * from users"), Some("SELECT"));
        assert_eq!(statement_verb("\nInsert into x values (1)"), Some("INSERT"));
        assert_eq!(statement_verb("DROP TABLE users"), None);
        assert_eq!(statement_verb("PRAGMA table_info(users)"), None);
        assert_eq!(statement_verb(""), None);
    }

    #[test]
    fn test_drop_is_rejected() {
        let mut d = server();
        let result = d
            .dispatch("execute_query", json!({"query": "DROP TABLE users"}))
            .unwrap();
        assert!(result.is_error);
        assert_eq!(
            result.text(),
            "Error: Only SELECT, INSERT, UPDATE, DELETE queries are allowed"
        );
        assert!(d.state().table_names().unwrap().contains(&"users".to_string()));
        assert_eq!(user_count(&d), 3);
    }

    #[test]
    fn test_select_returns_rows() {
        let mut d = server();
        let result = d
            .dispatch(
                "execute_query",
                json!({"query": "SELECT name, price FROM products WHERE category = 'Electronics' ORDER BY id"}),
            )
            .unwrap();
        let text = result.text();
        assert!(text.starts_with("Query results (2 rows):\n"));

        let body = text.split_once('\n').unwrap().1;
        let rows: Vec<Value> = serde_json::from_str(body).unwrap();
        assert_eq!(rows[0]["name"], "Laptop");
        approx::assert_relative_eq!(rows[1]["price"].as_f64().unwrap(), 29.99, epsilon = 1e-9);
    }

    #[test]
    fn test_select_no_rows() {
        let mut d = server();
        let result = d
            .dispatch("execute_query", json!({"query": "SELECT * FROM users WHERE age > 100"}))
            .unwrap();
        assert_eq!(
            result.text(),
            "Query executed successfully, but returned no results"
        );
    }

    #[test]
    fn test_update_reports_affected_rows() {
        let mut d = server();
        let result = d
            .dispatch(
                "execute_query",
                json!({"query": "UPDATE products SET stock = stock + 1 WHERE category = 'Electronics'"}),
            )
            .unwrap();
        assert_eq!(result.text(), "Query executed successfully. Rows affected: 2");
    }

    #[test]
    fn test_sql_error_is_in_band() {
        let mut d = server();
        let result = d
            .dispatch("execute_query", json!({"query": "SELECT * FROM nowhere"}))
            .unwrap();
        assert!(result.is_error);
        assert!(result.text().starts_with("Error: Query failed"));
        assert!(result.text().contains("no such table"));
    }

    #[test]
    fn test_failed_write_is_rolled_back() {
        let mut d = server();
        let result = d
            .dispatch(
                "execute_query",
                json!({"query": "UPDATE users SET email = 'alice@example.com'"}),
            )
            .unwrap();
        assert!(result.is_error);

        let emails: i64 = d
            .state()
            .connection()
            .query_row("SELECT COUNT(DISTINCT email) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(emails, 3);
    }

    #[test]
    fn test_list_tables_is_idempotent() {
        let mut d = server();
        let first = d.dispatch("list_tables", json!({})).unwrap();
        let second = d.dispatch("list_tables", json!({})).unwrap();
        assert_eq!(first, second);
        assert!(first.text().starts_with("Database tables:\n"));
        assert!(first.text().contains("- products"));
        assert!(first.text().contains("- users"));
    }

    #[test]
    fn test_describe_table() {
        let mut d = server();
        let result = d
            .dispatch("describe_table", json!({"table_name": "users"}))
            .unwrap();
        let text = result.text();
        assert!(text.starts_with("Table 'users' schema:\n"));
        assert!(text.contains("- id (INTEGER)"));
        assert!(text.contains("- email (TEXT) NOT NULL"));
    }

    #[test]
    fn test_describe_missing_table() {
        let mut d = server();
        let result = d
            .dispatch("describe_table", json!({"table_name": "ghosts"}))
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.text(), "Error: Table 'ghosts' not found");
    }

    #[test]
    fn test_insert_then_get_user() {
        let mut d = server();
        let inserted = d
            .dispatch(
                "insert_user",
                json!({"name": "Dana", "email": "dana@example.com", "age": 41}),
            )
            .unwrap();
        assert!(!inserted.is_error);
        assert_eq!(inserted.text(), "User 'Dana' inserted successfully with ID 4");

        let found = d
            .dispatch("get_user", json!({"email": "dana@example.com"}))
            .unwrap();
        let text = found.text();
        assert!(text.starts_with("User found:\n"));
        let user: Value = serde_json::from_str(text.split_once('\n').unwrap().1).unwrap();
        assert_eq!(user["name"], "Dana");
        assert_eq!(user["age"], 41);
        assert_eq!(user["id"], 4);
    }

    #[test]
    fn test_duplicate_email_is_integrity_failure() {
        let mut d = server();
        let args = json!({"name": "Dana", "email": "dana@example.com", "age": 41});
        d.dispatch("insert_user", args.clone()).unwrap();
        let before = user_count(&d);

        let second = d.dispatch("insert_user", args).unwrap();
        assert!(second.is_error);
        assert!(second.text().contains("UNIQUE constraint failed: users.email"));
        assert_eq!(user_count(&d), before);
    }

    #[test]
    fn test_insert_user_requires_integer_age() {
        let mut d = server();
        let err = d
            .dispatch(
                "insert_user",
                json!({"name": "Eve", "email": "eve@example.com", "age": "old"}),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ProtocolError::InvalidArgumentType { .. }
        ));
        assert_eq!(user_count(&d), 3);
    }

    #[test]
    fn test_get_unknown_user() {
        let mut d = server();
        let result = d
            .dispatch("get_user", json!({"email": "nobody@example.com"}))
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "No user found with email: nobody@example.com");
    }

    #[test]
    fn test_resources() {
        let d = server();
        let resources = d.list_resources().unwrap();
        let uris: Vec<&str> = resources.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["db://schema", "db://tables"]);

        let tables: Vec<String> =
            serde_json::from_str(&d.read_resource("db://tables").unwrap().text).unwrap();
        assert!(tables.contains(&"users".to_string()));

        let schema: Value =
            serde_json::from_str(&d.read_resource("db://schema").unwrap().text).unwrap();
        assert!(schema["users"].as_str().unwrap().contains("CREATE TABLE"));

        assert!(matches!(
            d.read_resource("db://views"),
            Err(crate::error::ProtocolError::ResourceNotFound(_))
        ));
    }
}
