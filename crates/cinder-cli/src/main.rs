//! Cinder command-line interface
//!
//! Inspects the catalog of a Cinder cluster.
//!
//! # Usage
//!
//! ```bash
//! # List every table
//! cinder --endpoint 10.0.0.1:10800 tables list
//!
//! # Look up one table, trying two nodes
//! cinder -e 10.0.0.1:10800 -e 10.0.0.2:10800 tables get pub.orders
//!
//! # Output as JSON, endpoints from the environment
//! CINDER_ENDPOINTS=10.0.0.1:10800 cinder tables list --format json
//!
//! # Show the session a node hands out
//! cinder --config client.toml ping
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cinder_client::{Client, ClientConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod formatter;

use formatter::OutputFormat;

/// Cinder command-line interface
#[derive(Parser, Debug)]
#[command(
    name = "cinder",
    version,
    about = "Command-line interface for Cinder clusters",
    long_about = "Connects to a Cinder cluster and inspects its table catalog.\n\n\
                  Endpoints are tried in order until one completes the handshake."
)]
struct Args {
    /// Node endpoint (host:port); repeat to give several
    #[arg(
        short = 'e',
        long = "endpoint",
        env = "CINDER_ENDPOINTS",
        value_delimiter = ','
    )]
    endpoints: Vec<String>,

    /// Configuration file path (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Deadline for connecting to the cluster
    #[arg(short = 't', long, default_value = "5s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Table catalog commands
    Tables {
        #[command(subcommand)]
        command: TablesCommand,
    },
    /// Connect and print the session the node hands out
    Ping,
}

#[derive(Subcommand, Debug)]
enum TablesCommand {
    /// List every table
    List {
        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "table")]
        format: OutputFormatArg,
    },
    /// Look up one table by name (SCHEMA.NAME or NAME)
    Get {
        /// Table name; quote components to keep their case
        name: String,

        /// Output format
        #[arg(short = 'f', long, value_enum, default_value = "table")]
        format: OutputFormatArg,
    },
}

/// Output format argument
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    /// Display results in a formatted table
    Table,
    /// Display results as JSON
    Json,
    /// Display one canonical name per line
    Plain,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Plain => OutputFormat::Plain,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let config = load_config(&args)?;
    info!("connecting to {:?}", config.endpoints);

    let client = Client::start_deferred(config, args.timeout)
        .await
        .context("failed to start session")?;

    let result = execute(&client, &args.command).await;
    client.close();
    result
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("cinder_cli=debug,cinder_client=debug")
    } else {
        EnvFilter::new("cinder_cli=warn,cinder_client=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ClientConfig::default(),
    };

    // Command-line endpoints replace the file's list.
    if !args.endpoints.is_empty() {
        config = config.endpoints(args.endpoints.iter().map(|e| e.trim()));
    }

    config.validate()?;
    Ok(config)
}

async fn execute(client: &Client, command: &Command) -> Result<()> {
    match command {
        Command::Tables {
            command: TablesCommand::List { format },
        } => {
            let mut tables = client.tables().list_tables().await?;
            tables.sort_by(|a, b| a.qualified_name().cmp(b.qualified_name()));
            println!("{}", formatter::format_tables(&tables, (*format).into()));
        }
        Command::Tables {
            command: TablesCommand::Get { name, format },
        } => match client.tables().get_table(name).await? {
            Some(table) => println!("{}", formatter::format_tables(&[table], (*format).into())),
            None => anyhow::bail!("table {name} not found"),
        },
        Command::Ping => {
            println!("{}", formatter::format_session(client));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tables_list() {
        let args = Args::try_parse_from([
            "cinder",
            "--endpoint",
            "127.0.0.1:10800",
            "--timeout",
            "250ms",
            "tables",
            "list",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.endpoints, vec!["127.0.0.1:10800"]);
        assert_eq!(args.timeout, Duration::from_millis(250));
        assert!(matches!(
            args.command,
            Command::Tables {
                command: TablesCommand::List {
                    format: OutputFormatArg::Json
                }
            }
        ));
    }

    #[test]
    fn test_parse_comma_separated_endpoints() {
        let args =
            Args::try_parse_from(["cinder", "-e", "a:1,b:2", "tables", "get", "pub.t"]).unwrap();
        assert_eq!(args.endpoints, vec!["a:1", "b:2"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.endpoints, vec!["a:1", "b:2"]);
    }

    #[test]
    fn test_missing_endpoints_rejected() {
        // Built directly so CINDER_ENDPOINTS in the environment cannot leak in.
        let args = Args {
            endpoints: Vec::new(),
            config: None,
            timeout: Duration::from_secs(5),
            verbose: false,
            command: Command::Ping,
        };
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("invalid configuration"), "{err:#}");
    }
}
