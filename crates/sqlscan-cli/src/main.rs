//! sqlscan CLI
//!
//! Analyzes one SELECT statement against a catalog and prints what the
//! scanner learned as JSON: columns, tables, keys and updatability.

mod fixture;
mod report;

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;

use sqlscan_core::cache::DEFAULT_RECYCLE_THRESHOLD;
use sqlscan_core::{CatalogService, Connection, ConnectionOptions, ParseStatus, Statement};
use sqlscan_postgres::PgCatalog;

use crate::fixture::FixtureCatalog;
use crate::report::Report;

/// Updatable result set analysis for PostgreSQL SELECT statements.
#[derive(Parser)]
#[command(name = "sqlscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Statement to analyze (read from stdin if not specified).
    sql: Option<String>,

    /// JSON catalog fixture to resolve against instead of a server.
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// PostgreSQL connection string.
    #[arg(short, long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Client encoding name (asked from the catalog if not specified).
    #[arg(short, long)]
    encoding: Option<String>,

    /// Treat backslash as an escape inside string literals.
    #[arg(long)]
    backslash_escapes: bool,

    /// Insert `AS` before bare column aliases.
    #[arg(long)]
    bare_alias: bool,

    /// Unreferenced cache entries kept before recycling.
    #[arg(long, default_value_t = DEFAULT_RECYCLE_THRESHOLD)]
    recycle_threshold: usize,

    /// Check row identity columns (oid or unique key) of the table.
    #[arg(long)]
    oid_check: bool,

    /// Pretty-print the JSON report.
    #[arg(long)]
    pretty: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> ConnectionOptions {
        let mut options = ConnectionOptions::default()
            .backslash_escapes(self.backslash_escapes)
            .bare_alias_compat(self.bare_alias)
            .cache_recycle_threshold(self.recycle_threshold);
        if let Some(encoding) = &self.encoding {
            options = options.client_encoding(encoding.as_str());
        }
        options
    }

    fn statement_text(&self) -> io::Result<String> {
        if let Some(sql) = &self.sql {
            return Ok(sql.clone());
        }
        let mut sql = String::new();
        io::stdin().read_to_string(&mut sql)?;
        Ok(sql)
    }
}

fn analyze<C: CatalogService>(catalog: C, cli: &Cli, sql: &str) -> anyhow::Result<ExitCode> {
    let conn = Connection::new(catalog, cli.options());
    let mut stmt = Statement::new();
    let status = stmt.parse(&conn, sql, cli.oid_check);
    debug!(?status, updatable = stmt.is_updatable(), "Analyzed statement");

    let report = Report::new(&stmt, conn.cache_stats());
    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");

    Ok(if status == ParseStatus::Fatal {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging; stdout carries the report
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let sql = cli.statement_text()?;

    if let Some(path) = &cli.catalog {
        let catalog = FixtureCatalog::load(path)?;
        info!(path = %path.display(), "Using catalog fixture");
        return analyze(catalog, &cli, &sql);
    }
    if let Some(url) = &cli.database_url {
        let catalog = PgCatalog::connect(url)?;
        return analyze(catalog, &cli, &sql);
    }
    anyhow::bail!("no catalog: pass --catalog <FILE> or --database-url <URL>")
}
