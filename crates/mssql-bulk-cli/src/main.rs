//! mssql-bulk CLI - staging-table bulk writes for SQL Server.

mod records;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use mssql_bulk::{
    BulkError, BulkWriter, Config, Connector, FillOptions, MssqlConnector, ReadFacade, Session,
    WriteOperation,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "mssql-bulk")]
#[command(about = "Staging-table bulk INSERT/UPDATE/UPSERT/DELETE for SQL Server")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the catalog columns of a table
    Describe {
        /// Table name
        #[arg(short, long)]
        table: String,
    },

    /// Show the statements a write would run, without running them
    Plan {
        #[command(flatten)]
        target: WriteTarget,
    },

    /// Bulk write rows from a JSON file
    Load {
        #[command(flatten)]
        target: WriteTarget,

        /// JSON file holding an array of row objects
        #[arg(short, long)]
        input: PathBuf,

        /// Rows per bulk load round trip
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run a read query and print its rows
    Query {
        /// Query text; `{0}`, `{1}`, ... are replaced by --param values
        #[arg(short, long)]
        sql: String,

        /// Name of the result table
        #[arg(long, default_value = "Result")]
        name: String,

        /// Positional query parameter (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,

        /// Override the configured command timeout, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Test the database connection
    HealthCheck,
}

#[derive(Clone, Copy, ValueEnum)]
enum Operation {
    Insert,
    Update,
    Upsert,
    Delete,
}

#[derive(clap::Args)]
struct WriteTarget {
    /// Destination table
    #[arg(short, long)]
    table: String,

    /// Write operation
    #[arg(short, long, value_enum)]
    operation: Operation,

    /// Primary key columns, comma separated
    #[arg(long, value_delimiter = ',')]
    primary_keys: Vec<String>,

    /// Columns to update (update) or to match on (upsert), comma separated
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,
}

impl WriteTarget {
    fn operation<'a>(
        &self,
        primary_keys: &'a [&'a str],
        fields: &'a [&'a str],
    ) -> WriteOperation<'a> {
        match self.operation {
            Operation::Insert => WriteOperation::Insert,
            Operation::Update => WriteOperation::Update {
                primary_keys,
                fields_to_update: fields,
            },
            Operation::Upsert => WriteOperation::Upsert {
                primary_keys,
                fields_to_match: fields,
            },
            Operation::Delete => WriteOperation::Delete { primary_keys },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), BulkError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(BulkError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let connector = MssqlConnector::new(config.connection.clone());

    match cli.command {
        Commands::Describe { table } => {
            let writer = BulkWriter::with_settings(connector, config.writer)?;
            let columns = writer.describe(&table).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else {
                println!("{} ({} columns)", table, columns.len());
                for c in &columns {
                    let mut sql_type = c.sql_type.clone();
                    match c.max_length {
                        Some(-1) => sql_type.push_str("(max)"),
                        Some(len) => sql_type.push_str(&format!("({})", len)),
                        None => {}
                    }
                    println!(
                        "  {:<30} {:<20} {}",
                        c.name,
                        sql_type,
                        if c.nullable { "NULL" } else { "NOT NULL" }
                    );
                }
            }
        }

        Commands::Plan { target } => {
            let pks: Vec<&str> = target.primary_keys.iter().map(String::as_str).collect();
            let fields: Vec<&str> = target.fields.iter().map(String::as_str).collect();
            let writer = BulkWriter::with_settings(connector, config.writer)?;
            let plan = writer
                .plan(target.operation(&pks, &fields), &target.table)
                .await?;

            if cli.output_json {
                let json = serde_json::json!({
                    "operation": plan.operation,
                    "table": plan.table,
                    "staging_ddl": plan.staging_ddl(),
                    "copy_destination": plan.copy_destination,
                    "final_statement": plan.final_statement,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                println!("Plan for {} into {}:", plan.operation, plan.table);
                if let Some(ddl) = plan.staging_ddl() {
                    println!("  1. {}", ddl);
                }
                println!("  -> bulk copy into {}", plan.copy_destination);
                if let Some(sql) = &plan.final_statement {
                    println!("  2. {}", sql);
                }
            }
        }

        Commands::Load {
            target,
            input,
            batch_size,
        } => {
            let pks: Vec<&str> = target.primary_keys.iter().map(String::as_str).collect();
            let fields: Vec<&str> = target.fields.iter().map(String::as_str).collect();
            let operation = target.operation(&pks, &fields);
            operation.validate(&target.table)?;

            let json = std::fs::read_to_string(&input)?;
            let writer = BulkWriter::with_settings(connector, config.writer)?;
            let columns = writer.describe(&target.table).await?;
            if columns.is_empty() {
                return Err(BulkError::introspection(
                    &target.table,
                    "no columns found in target table",
                ));
            }
            let buffer = records::json_to_buffer(&json, &columns)?;
            info!("Read {} rows from {:?}", buffer.len(), input);

            let summary = writer
                .write_buffer(operation, &target.table, &buffer, batch_size)
                .await?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("Bulk {} completed!", summary.operation);
                println!("  Table: {}", summary.table);
                println!("  Rows copied: {}", summary.rows_copied);
                println!("  Rows affected: {}", summary.rows_affected);
                println!("  Duration: {:.2}s", summary.elapsed_ms as f64 / 1000.0);
            }
        }

        Commands::Query {
            sql,
            name,
            params,
            timeout,
        } => {
            let facade = ReadFacade::with_settings(connector, config.reader);
            let options = FillOptions {
                parameters: params,
                command_timeout: timeout.map(Duration::from_secs),
            };
            let buffer = facade.fill_table_with(&sql, &name, &options).await?;

            if cli.output_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&records::buffer_to_json(&buffer))?
                );
            } else {
                let header: Vec<&str> = buffer.columns().iter().map(|c| c.name.as_str()).collect();
                println!("{}", header.join("\t"));
                for row in buffer.rows() {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|v| v.to_text().unwrap_or_else(|| "NULL".to_string()))
                        .collect();
                    println!("{}", cells.join("\t"));
                }
                println!("({} rows)", buffer.len());
            }
        }

        Commands::HealthCheck => {
            let start = Instant::now();
            let result = async {
                let mut session = connector.connect().await?;
                let version = session.query("SELECT @@VERSION AS version").await;
                session.close().await?;
                version
            }
            .await;
            let latency_ms = start.elapsed().as_millis() as u64;

            let (healthy, version, error) = match result {
                Ok(rows) => (
                    true,
                    rows.iter().next().and_then(|r| r.text("version")),
                    None,
                ),
                Err(e) => (false, None, Some(e.to_string())),
            };

            if cli.output_json {
                let json = serde_json::json!({
                    "healthy": healthy,
                    "latency_ms": latency_ms,
                    "server_version": version,
                    "error": error,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  SQL Server {}:{}/{}: {} ({}ms)",
                    config.connection.host,
                    config.connection.port,
                    config.connection.database,
                    if healthy { "OK" } else { "FAILED" },
                    latency_ms
                );
                if let Some(v) = &version {
                    println!("    Version: {}", v.lines().next().unwrap_or_default());
                }
                if let Some(e) = &error {
                    println!("    Error: {}", e);
                }
            }

            if !healthy {
                return Err(BulkError::connection(
                    "Health check failed",
                    format!("{}:{}", config.connection.host, config.connection.port),
                ));
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}', expected text or json", other)),
    }

    Ok(())
}
