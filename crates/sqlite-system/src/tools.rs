use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;

use sqlmate::models::tool::Tool;

const READ_PREFIXES: [&str; 4] = ["SELECT", "PRAGMA", "EXPLAIN", "WITH"];

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("SQL Error: {0}")]
    Sql(String),

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),
}

impl From<rusqlite::Error> for ToolError {
    /// Keep only SQLite's own message, without the statement text and offset
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(_, Some(message)) => ToolError::Sql(message),
            rusqlite::Error::SqlInputError { msg, .. } => ToolError::Sql(msg),
            other => ToolError::Sql(other.to_string()),
        }
    }
}

impl ToolError {
    /// Errors in the request itself, reported as JSON-RPC errors rather than tool output
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ToolError::UnknownTool(_) | ToolError::InvalidArguments(_)
        )
    }
}

/// The database tools served to the assistant, backed by one SQLite connection
pub struct SqliteTools {
    conn: Connection,
}

impl SqliteTools {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "database file does not exist, creating it");
        }
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    #[cfg(test)]
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new(
                "query_data",
                "Execute a SQL query against the SQLite database and return the results as a markdown table",
                json!({
                    "type": "object",
                    "properties": {
                        "sql": {
                            "type": "string",
                            "description": "The SQL query to execute"
                        }
                    },
                    "required": ["sql"]
                }),
            ),
            Tool::new(
                "get_schema",
                "Get the columns of every table in the database",
                json!({"type": "object", "properties": {}}),
            ),
            Tool::new(
                "analyze_table",
                "Summarize a table: row count, null counts per column and min/max/average of numeric columns",
                json!({
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "description": "Name of the table to analyze"
                        }
                    },
                    "required": ["table_name"]
                }),
            ),
        ]
    }

    pub fn call(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        match name {
            "query_data" => self.query_data(string_argument(arguments, "sql")?),
            "get_schema" => self.get_schema(),
            "analyze_table" => self.analyze_table(string_argument(arguments, "table_name")?),
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    pub fn query_data(&self, sql: &str) -> Result<String, ToolError> {
        tracing::info!(sql = %sql, "executing query");
        let keyword = sql.trim_start().to_uppercase();

        if !READ_PREFIXES.iter().any(|p| keyword.starts_with(p)) {
            let affected = self.conn.execute(sql, [])?;
            return Ok(format!(
                "Query executed successfully. {} rows affected.",
                affected
            ));
        }

        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut table = markdown_header(&columns);
        let mut count = 0;

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                cells.push(render_value(row.get_ref(i)?));
            }
            table.push_str(&markdown_row(&cells));
            count += 1;
        }

        if count == 0 {
            return Ok("Query executed successfully. No results returned.".to_string());
        }
        Ok(format!("Query results ({} rows):\n\n{}", count, table))
    }

    pub fn get_schema(&self) -> Result<String, ToolError> {
        let tables = self.table_names()?;
        if tables.is_empty() {
            return Ok("Database is empty (no tables found).".to_string());
        }

        let mut schema = String::from("Database Schema:\n\n");
        for table in tables {
            schema.push_str(&format!("## Table: {}\n", table));
            schema.push_str("| Column | Type | Not Null | Default | Primary Key |\n");
            schema.push_str("|--------|------|----------|---------|-------------|\n");
            for column in self.columns(&table)? {
                schema.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    column.name,
                    column.declared_type,
                    yes_no(column.not_null),
                    column.default.as_deref().unwrap_or("NULL"),
                    yes_no(column.primary_key),
                ));
            }
            schema.push('\n');
        }
        Ok(schema)
    }

    pub fn analyze_table(&self, table_name: &str) -> Result<String, ToolError> {
        if !is_identifier(table_name) {
            return Err(ToolError::InvalidTableName(table_name.to_string()));
        }
        let exists = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [table_name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(ToolError::TableNotFound(table_name.to_string()));
        }

        let quoted = quote_identifier(table_name);
        let total: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", quoted), [], |row| {
                row.get(0)
            })?;

        let mut report = format!(
            "Table Analysis: {}\n\nTotal rows: {}\n\n",
            table_name, total
        );
        report.push_str(&markdown_header(&[
            "Column", "Type", "Non-Null", "Null", "Min", "Max", "Average",
        ]));

        for column in self.columns(table_name)? {
            let col = quote_identifier(&column.name);
            let non_null: i64 = self.conn.query_row(
                &format!("SELECT COUNT({}) FROM {}", col, quoted),
                [],
                |row| row.get(0),
            )?;

            let (min, max, avg) = if is_numeric_type(&column.declared_type) {
                self.conn.query_row(
                    &format!(
                        "SELECT MIN({col}), MAX({col}), AVG({col}) FROM {table}",
                        col = col,
                        table = quoted
                    ),
                    [],
                    |row| {
                        Ok((
                            render_value(row.get_ref(0)?),
                            render_value(row.get_ref(1)?),
                            row.get::<_, Option<f64>>(2)?
                                .map(|avg| format!("{:.2}", avg))
                                .unwrap_or_else(|| "NULL".to_string()),
                        ))
                    },
                )?
            } else {
                ("-".to_string(), "-".to_string(), "-".to_string())
            };

            report.push_str(&markdown_row(&[
                column.name.clone(),
                column.declared_type.clone(),
                non_null.to_string(),
                (total - non_null).to_string(),
                min,
                max,
                avg,
            ]));
        }

        Ok(report)
    }

    fn table_names(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn columns(&self, table: &str) -> rusqlite::Result<Vec<ColumnInfo>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    not_null: row.get::<_, i64>(3)? != 0,
                    default: row.get(4)?,
                    primary_key: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }
}

struct ColumnInfo {
    name: String,
    declared_type: String,
    not_null: bool,
    default: Option<String>,
    primary_key: bool,
}

fn string_argument<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument `{}`", key)))
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format!("{:?}", f),
        ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
        ValueRef::Blob(blob) => format!("<blob {} bytes>", blob.len()),
    }
}

fn markdown_header<S: AsRef<str>>(columns: &[S]) -> String {
    let names: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    format!(
        "| {} |\n| {} |\n",
        names.join(" | "),
        vec!["---"; names.len()].join(" | ")
    )
}

fn markdown_row(cells: &[String]) -> String {
    format!("| {} |\n", cells.join(" | "))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_numeric_type(declared: &str) -> bool {
    let declared = declared.to_uppercase();
    ["INT", "REAL", "FLOA", "DOUB", "NUM", "DEC"]
        .iter()
        .any(|marker| declared.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop() -> SqliteTools {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                 id INTEGER PRIMARY KEY,
                 name TEXT NOT NULL,
                 email TEXT DEFAULT 'unknown',
                 balance REAL
             );
             INSERT INTO users (name, email, balance) VALUES ('Ada', 'ada@example.com', 10.5);
             INSERT INTO users (name, email, balance) VALUES ('Grace', NULL, 20.0);
             INSERT INTO users (name, email, balance) VALUES ('Linus', 'linus@example.com', NULL);",
        )
        .unwrap();
        SqliteTools::from_connection(conn)
    }

    #[test]
    fn test_select_renders_markdown_table() {
        let tools = shop();
        let result = tools
            .query_data("SELECT name, email FROM users ORDER BY id")
            .unwrap();
        assert_eq!(
            result,
            "Query results (3 rows):\n\n| name | email |\n| --- | --- |\n| Ada | ada@example.com |\n| Grace | NULL |\n| Linus | linus@example.com |\n"
        );
    }

    #[test]
    fn test_reals_keep_their_decimal_point() {
        let tools = shop();
        let result = tools
            .query_data("select balance from users where name = 'Grace'")
            .unwrap();
        assert!(result.contains("| 20.0 |"));
    }

    #[test]
    fn test_select_without_rows() {
        let tools = shop();
        assert_eq!(
            tools
                .query_data("SELECT * FROM users WHERE id > 100")
                .unwrap(),
            "Query executed successfully. No results returned."
        );
    }

    #[test]
    fn test_with_clause_is_a_read() {
        let tools = shop();
        let result = tools
            .query_data("WITH rich AS (SELECT * FROM users WHERE balance > 15) SELECT COUNT(*) AS n FROM rich")
            .unwrap();
        assert!(result.starts_with("Query results (1 rows):"));
        assert!(result.contains("| 1 |"));
    }

    #[test]
    fn test_write_reports_affected_rows() {
        let tools = shop();
        assert_eq!(
            tools
                .query_data("UPDATE users SET balance = 0 WHERE balance IS NOT NULL")
                .unwrap(),
            "Query executed successfully. 2 rows affected."
        );
        assert_eq!(
            tools
                .query_data("CREATE TABLE orders (id INTEGER PRIMARY KEY, total REAL)")
                .unwrap(),
            "Query executed successfully. 0 rows affected."
        );
    }

    #[test]
    fn test_sql_error() {
        let tools = shop();
        let err = tools.query_data("SELECT * FROM nope").unwrap_err();
        assert!(!err.is_protocol_error());
        assert!(err.to_string().starts_with("SQL Error:"));
        assert!(err.to_string().contains("no such table: nope"));
    }

    #[test]
    fn test_schema() {
        let tools = shop();
        let schema = tools.get_schema().unwrap();
        assert!(schema.starts_with("Database Schema:\n\n## Table: users\n"));
        assert!(schema.contains("| Column | Type | Not Null | Default | Primary Key |"));
        assert!(schema.contains("| id | INTEGER | No | NULL | Yes |"));
        assert!(schema.contains("| name | TEXT | Yes | NULL | No |"));
        assert!(schema.contains("| email | TEXT | No | 'unknown' | No |"));
    }

    #[test]
    fn test_empty_schema() {
        let tools = SqliteTools::from_connection(Connection::open_in_memory().unwrap());
        assert_eq!(
            tools.get_schema().unwrap(),
            "Database is empty (no tables found)."
        );
    }

    #[test]
    fn test_analyze_table() {
        let tools = shop();
        let report = tools.analyze_table("users").unwrap();
        assert!(report.starts_with("Table Analysis: users\n\nTotal rows: 3\n"));
        assert!(report.contains("| id | INTEGER | 3 | 0 | 1 | 3 | 2.00 |"));
        assert!(report.contains("| email | TEXT | 2 | 1 | - | - | - |"));
        assert!(report.contains("| balance | REAL | 2 | 1 | 10.5 | 20.0 | 15.25 |"));
    }

    #[test]
    fn test_analyze_rejects_bad_names() {
        let tools = shop();
        assert!(matches!(
            tools.analyze_table("users; DROP TABLE users"),
            Err(ToolError::InvalidTableName(_))
        ));
        assert!(matches!(
            tools.analyze_table("customers"),
            Err(ToolError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_call_dispatch() {
        let tools = shop();
        assert!(tools
            .call("query_data", &json!({"sql": "SELECT 1"}))
            .unwrap()
            .contains("| 1 |"));
        assert!(matches!(
            tools.call("drop_everything", &json!({})),
            Err(ToolError::UnknownTool(_))
        ));
        let err = tools.call("query_data", &json!({"query": "SELECT 1"})).unwrap_err();
        assert!(err.is_protocol_error());
        assert_eq!(tools.tools().len(), 3);
    }
}
