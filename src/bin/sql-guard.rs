use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::Level;

use sql_guard::sqlite::SqliteConnector;
use sql_guard::{
    ConnectionConfig, Database, DbRow, Dialect, ExecutionRecord, ManagerOptions, SqlArg,
    SqlGuardError, compile_with,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compile and run typed-placeholder SQL templates")]
struct Cli {
    /// Log level for diagnostics written to stderr
    #[arg(long, default_value = "warn")]
    log_level: Level,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the SQL a template compiles to
    Compile {
        /// Quoting rules for string literals: mysql or sqlite
        #[arg(long, default_value = "mysql")]
        dialect: Dialect,
        template: String,
        /// One JSON value per placeholder; text that is not valid JSON is taken as a string
        args: Vec<String>,
    },
    /// Compile a template and run it against a SQLite database
    Exec {
        /// Database file; an in-memory database when omitted
        #[arg(long)]
        db: Option<String>,
        template: String,
        args: Vec<String>,
    },
}

#[derive(Serialize)]
struct ExecOutput<'a> {
    rows: &'a [DbRow],
    rows_affected: usize,
    last_insert_id: i64,
    execution: Option<&'a ExecutionRecord>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(cli.log_level)
        .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), SqlGuardError> {
    match command {
        Command::Compile {
            dialect,
            template,
            args,
        } => {
            let sql = compile_with(dialect, &template, &parse_args(&args)?)?;
            println!("{sql}");
        }
        Command::Exec { db, template, args } => {
            let mut config = ConnectionConfig::new("localhost", "", "");
            if let Some(path) = db {
                config = config.with_database(path);
            }
            let mut database =
                Database::with_options(SqliteConnector::new(), config, ManagerOptions::default());
            let result_set = database.query(&template, &parse_args(&args)?)?;
            let output = ExecOutput {
                rows: &result_set.results,
                rows_affected: result_set.rows_affected,
                last_insert_id: database.last_insert_id(),
                execution: database.stats_buffer().last(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn parse_args(raw: &[String]) -> Result<Vec<SqlArg>, SqlGuardError> {
    raw.iter()
        .map(|arg| {
            let value = serde_json::from_str(arg)
                .unwrap_or_else(|_| serde_json::Value::String(arg.clone()));
            SqlArg::try_from(value)
        })
        .collect()
}
