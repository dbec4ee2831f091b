//! # Dot Commands
//!
//! Lines starting with `.` are CLI commands, not SQL.
//!
//! | Command              | Description                          |
//! |----------------------|--------------------------------------|
//! | `.quit` / `.exit`    | Exit the CLI                         |
//! | `.tables`            | List all tables                      |
//! | `.schema [table]`    | Show CREATE statements               |
//! | `.help`              | Show available commands              |
//!
//! Command names are case-insensitive; arguments are whitespace-separated.

use crate::schema::{Constraint, DefaultValue, IndexDef, IndexKind, TableDef};
use crate::Database;

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    Output(String),
    Exit,
    Continue,
    Error(String),
}

pub struct CommandHandler;

impl CommandHandler {
    pub fn is_command(input: &str) -> bool {
        input.trim().starts_with('.')
    }

    pub fn execute(input: &str, db: &Database) -> CommandResult {
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some(first) = parts.first() else {
            return CommandResult::Continue;
        };
        let args = &parts[1..];

        match first.to_ascii_lowercase().as_str() {
            ".quit" | ".exit" | ".q" => CommandResult::Exit,
            ".help" | ".h" | ".?" => CommandResult::Output(help_text()),
            ".tables" => list_tables(db),
            ".schema" => show_schema(db, args),
            cmd => CommandResult::Error(format!(
                "Unknown command: {}. Type .help for available commands.",
                cmd
            )),
        }
    }
}

fn help_text() -> String {
    r#"emberdb CLI commands:

  .quit, .exit, .q     Exit the CLI
  .help, .h, .?        Show this help message
  .tables              List all tables in the database
  .schema [TABLE]      Show CREATE statements for TABLE (or all tables)

SQL statements end with a semicolon (;) and may span several lines.
Ctrl+C cancels the statement being typed; Ctrl+D or .quit exits."#
        .to_string()
}

fn list_tables(db: &Database) -> CommandResult {
    let names = db.shared.store.read().catalog().table_names();
    if names.is_empty() {
        CommandResult::Output("No tables found.".to_string())
    } else {
        CommandResult::Output(names.join("\n"))
    }
}

fn show_schema(db: &Database, args: &[&str]) -> CommandResult {
    let store = db.shared.store.read();
    let catalog = store.catalog();

    if let Some(name) = args.first() {
        return match catalog.get_table(name) {
            Some(table) => CommandResult::Output(format_table(&table)),
            None => CommandResult::Error(format!("Table '{}' not found.", name)),
        };
    }

    let statements: Vec<String> = catalog.tables().map(|t| format_table(t)).collect();
    if statements.is_empty() {
        CommandResult::Output("No tables found.".to_string())
    } else {
        CommandResult::Output(statements.join("\n\n"))
    }
}

/// The table's CREATE TABLE statement followed by its CREATE INDEX
/// statements.
fn format_table(table: &TableDef) -> String {
    let single_pk = table.primary_key().len() == 1;
    let mut columns: Vec<String> = table
        .columns()
        .iter()
        .map(|column| {
            let mut text = format!("  {} {}", column.name(), column.data_type());
            if single_pk && column.has_constraint(Constraint::PrimaryKey) {
                text.push_str(" PRIMARY KEY");
            }
            if column.has_constraint(Constraint::NotNull) && !column.has_constraint(Constraint::PrimaryKey) {
                text.push_str(" NOT NULL");
            }
            if column.has_constraint(Constraint::Unique) {
                text.push_str(" UNIQUE");
            }
            match column.default_value() {
                Some(DefaultValue::Literal(value)) => text.push_str(&format!(" DEFAULT {}", value)),
                Some(DefaultValue::CurrentTimestamp) => text.push_str(" DEFAULT CURRENT_TIMESTAMP"),
                None => {}
            }
            text
        })
        .collect();
    if !single_pk && !table.primary_key().is_empty() {
        columns.push(format!("  PRIMARY KEY ({})", table.primary_key().join(", ")));
    }

    let mut out = format!("CREATE TABLE {} (\n{}\n);", table.name(), columns.join(",\n"));
    for index in table.indexes() {
        out.push('\n');
        out.push_str(&format_index(table.name(), index));
    }
    out
}

fn format_index(table: &str, index: &IndexDef) -> String {
    let unique = if index.is_unique() { "UNIQUE " } else { "" };
    let mut out = format!(
        "CREATE {}INDEX {} ON {}({})",
        unique,
        index.name(),
        table,
        index.columns().join(", ")
    );
    if let IndexKind::Hnsw { metric, .. } = index.kind() {
        out.push_str(&format!(" USING HNSW WITH (metric = '{}')", metric));
    }
    out.push(';');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.exec(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score FLOAT DEFAULT 1.5);
             CREATE UNIQUE INDEX users_name ON users(name);",
        )
        .unwrap();
        db
    }

    #[test]
    fn quit_and_unknown_commands() {
        let db = db();
        assert_eq!(CommandHandler::execute(".QUIT", &db), CommandResult::Exit);
        assert!(matches!(CommandHandler::execute(".bogus", &db), CommandResult::Error(_)));
        assert!(CommandHandler::is_command("  .tables"));
        assert!(!CommandHandler::is_command("SELECT 1;"));
    }

    #[test]
    fn tables_and_schema() {
        let db = db();
        assert_eq!(
            CommandHandler::execute(".tables", &db),
            CommandResult::Output("users".to_string())
        );
        let CommandResult::Output(schema) = CommandHandler::execute(".schema users", &db) else {
            panic!("expected schema output");
        };
        assert!(schema.contains("id INTEGER PRIMARY KEY"));
        assert!(schema.contains("name TEXT NOT NULL"));
        assert!(schema.contains("CREATE UNIQUE INDEX users_name ON users(name);"));
    }
}
