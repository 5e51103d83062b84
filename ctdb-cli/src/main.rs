use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ctdb_client::{Client, ClientConfig, DEFAULT_PORT};
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;
mod shell;
mod table;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    Table,
    /// Pretty JSON
    Json,
}

#[derive(Parser)]
#[command(name = "ctdb")]
#[command(about = "Cottontail DB shell", long_about = None, version)]
struct Cli {
    /// Server host name or IP address
    host: String,
    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Output format (table, json)
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,
    /// Run the whole session inside one transaction, committed on exit
    #[arg(long)]
    transaction: bool,
    /// Run this command and exit instead of starting the shell
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(&cli.host, cli.port).with_transaction(cli.transaction);
    let endpoint = config.endpoint();

    let mut client = Client::connect(config)
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))?;
    client
        .ping()
        .await
        .with_context(|| format!("Server at {} did not answer", endpoint))?;
    debug!("Connected to {}", endpoint);

    let outcome = if cli.command.is_empty() {
        match shell::Shell::new(endpoint, cli.output) {
            Ok(mut shell) => shell.run(&mut client).await,
            Err(e) => Err(e),
        }
    } else {
        let words: Vec<&str> = cli.command.iter().map(String::as_str).collect();
        commands::execute(&mut client, cli.output, &words)
            .await
            .map(|output| {
                if let Some(output) = output {
                    println!("{}", output);
                }
            })
    };

    // Commit a session transaction even when the command failed
    let closed = client.close().await.context("Failed to close session");
    match (outcome, closed) {
        (Err(e), Err(close_err)) => {
            eprintln!("{} {:#}", "Error:".red().bold(), close_err);
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), closed) => closed,
    }
}
