//! # emberdb CLI Entry Point
//!
//! ```bash
//! emberdb [OPTIONS] [DSN]
//! ```
//!
//! Without a DSN the shell opens an in-memory database. Diagnostics go to
//! stderr, filtered by `EMBERDB_LOG` (for example `EMBERDB_LOG=emberdb=debug`).

use std::env;

use emberdb::cli::Repl;
use emberdb::Database;
use eyre::{bail, Result, WrapErr};
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut dsn: Option<String> = None;

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("emberdb {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other if other.starts_with('-') => bail!("Unknown option: {}", other),
            other => {
                if dsn.is_some() {
                    bail!("Multiple databases specified");
                }
                dsn = Some(other.to_string());
            }
        }
    }

    init_tracing();

    let dsn = dsn.unwrap_or_else(|| ":memory:".to_string());
    let db = Database::open(&dsn).wrap_err_with(|| format!("failed to open database {:?}", dsn))?;

    let mut repl = Repl::new(db)?;
    repl.run()
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EMBERDB_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_usage() {
    println!("emberdb - embedded SQL database with vector search");
    println!();
    println!("USAGE:");
    println!("    emberdb [OPTIONS] [DSN]");
    println!();
    println!("ARGS:");
    println!("    <DSN>    Database directory, file://PATH[?options], or :memory: (default)");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
    println!();
    println!("EXAMPLES:");
    println!("    emberdb ./data");
    println!("    emberdb \"file://./data?sync=normal&checkpoint_threshold=1048576\"");
}
