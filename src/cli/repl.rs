//! # REPL
//!
//! Reads lines with rustyline and dispatches them:
//!
//! ```text
//! read line ──► starts with '.' ? ──yes──► CommandHandler
//!                     │ no
//!                     ▼
//!              append to buffer ──► complete statement? ──no──► continuation prompt
//!                                         │ yes
//!                                         ▼
//!                               run each statement, print result
//! ```
//!
//! A statement is complete when its last token is `;`, so a semicolon
//! inside a string literal does not end input. SQL errors are printed and
//! the loop continues; `.quit` or Ctrl+D exits.

use std::time::{Duration, Instant};

use eyre::{Result, WrapErr};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::cli::commands::{CommandHandler, CommandResult};
use crate::cli::history::history_path;
use crate::cli::table::TableFormatter;
use crate::database::script::{is_complete, split_statements};
use crate::database::ExecuteResult;
use crate::Database;

const PRIMARY_PROMPT: &str = "emberdb> ";
const CONTINUATION_PROMPT: &str = "      -> ";

pub struct Repl {
    db: Database,
    editor: DefaultEditor,
    sql_buffer: String,
}

impl Repl {
    pub fn new(db: Database) -> Result<Self> {
        let mut editor = DefaultEditor::new().wrap_err("failed to initialize line editor")?;

        if let Some(history_file) = history_path() {
            let _ = editor.load_history(&history_file);
        }

        Ok(Self {
            db,
            editor,
            sql_buffer: String::new(),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        self.print_welcome();

        loop {
            let prompt = if self.sql_buffer.is_empty() {
                PRIMARY_PROMPT
            } else {
                CONTINUATION_PROMPT
            };

            match self.editor.readline(prompt) {
                Ok(line) => {
                    if !self.handle_line(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    self.sql_buffer.clear();
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!("Bye");
                    break;
                }
                Err(err) => {
                    eprintln!("Error reading input: {}", err);
                    break;
                }
            }
        }

        self.save_history();
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return true;
        }

        if self.sql_buffer.is_empty() && CommandHandler::is_command(trimmed) {
            self.editor.add_history_entry(trimmed).ok();
            return self.execute_command(trimmed);
        }

        if !self.sql_buffer.is_empty() {
            self.sql_buffer.push('\n');
        }
        self.sql_buffer.push_str(trimmed);

        if is_complete(&self.sql_buffer) {
            let sql = std::mem::take(&mut self.sql_buffer);
            self.editor.add_history_entry(sql.as_str()).ok();
            for statement in split_statements(&sql) {
                if !self.execute_sql(statement) {
                    break;
                }
            }
        }

        true
    }

    fn execute_command(&mut self, input: &str) -> bool {
        match CommandHandler::execute(input, &self.db) {
            CommandResult::Exit => false,
            CommandResult::Output(text) => {
                println!("{}", text);
                true
            }
            CommandResult::Continue => true,
            CommandResult::Error(msg) => {
                eprintln!("Error: {}", msg);
                true
            }
        }
    }

    /// Runs one statement; false when it failed.
    fn execute_sql(&mut self, sql: &str) -> bool {
        let start = Instant::now();
        match self.db.run(sql, ()) {
            Ok(result) => {
                print_result(result, start.elapsed());
                true
            }
            Err(err) => {
                eprintln!("Error: {}", err);
                false
            }
        }
    }

    fn print_welcome(&self) {
        println!("emberdb version {}", env!("CARGO_PKG_VERSION"));
        println!("Enter \".help\" for usage hints.");
        match self.db.path() {
            Some(path) => println!("Connected to: {}", path.display()),
            None => println!("Connected to a transient in-memory database."),
        }
        println!();
    }

    fn save_history(&mut self) {
        if let Some(history_file) = history_path() {
            if let Err(e) = self.editor.save_history(&history_file) {
                eprintln!("Warning: could not save history: {}", e);
            }
        }
    }
}

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn print_result(result: ExecuteResult, elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    match result {
        ExecuteResult::Rows(result) => {
            if result.is_empty() {
                println!("Empty set ({:.3} sec)", secs);
            } else {
                let formatter = TableFormatter::new(&result);
                print!("{}", formatter.render());
                let n = formatter.row_count() as u64;
                println!("{} row{} in set ({:.3} sec)", n, plural(n), secs);
            }
        }
        ExecuteResult::Affected(n) => {
            println!("Query OK, {} row{} affected ({:.3} sec)", n, plural(n), secs);
        }
        ExecuteResult::CreateTable { created } => {
            let what = if created { "Table created" } else { "Table already exists" };
            println!("{} ({:.3} sec)", what, secs);
        }
        ExecuteResult::CreateIndex { created } => {
            let what = if created { "Index created" } else { "Index already exists" };
            println!("{} ({:.3} sec)", what, secs);
        }
        ExecuteResult::DropTable { dropped } => {
            let what = if dropped { "Table dropped" } else { "Table does not exist" };
            println!("{} ({:.3} sec)", what, secs);
        }
        ExecuteResult::DropIndex { dropped } => {
            let what = if dropped { "Index dropped" } else { "Index does not exist" };
            println!("{} ({:.3} sec)", what, secs);
        }
        ExecuteResult::Begin => println!("Transaction started ({:.3} sec)", secs),
        ExecuteResult::Commit => println!("Transaction committed ({:.3} sec)", secs),
        ExecuteResult::Rollback => println!("Transaction rolled back ({:.3} sec)", secs),
    }
}
