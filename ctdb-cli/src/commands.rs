/// Shell command grammar and dispatch
///
/// A shell line is split on whitespace and parsed with clap, so every command
/// gets usage errors and `--help` for free. Parsing errors are returned to the
/// caller, which reports them and keeps the session alive.

use crate::table::{format_details, format_names, format_records};
use crate::OutputFormat;
use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ColorChoice, Parser, Subcommand};
use ctdb_client::names::split_entity;
use ctdb_client::Client;

#[derive(Parser, Debug, PartialEq)]
#[command(
    name = "ctdb",
    no_binary_name = true,
    color = ColorChoice::Never,
    disable_version_flag = true
)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ShellCommand {
    /// Schema operations
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
    /// Entity operations, entities are named <schema>.<entity>
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },
    /// Server state
    System {
        #[command(subcommand)]
        action: SystemAction,
    },
    /// Transaction control for this session
    Transaction {
        #[command(subcommand)]
        action: TransactionAction,
    },
    /// Check that the server answers
    Ping,
    /// Leave the shell
    #[command(visible_aliases = ["quit", "exit"])]
    Stop,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SchemaAction {
    /// List all schemas
    All,
    /// Create a schema
    Create { name: String },
    /// Drop a schema and everything in it
    Drop { name: String },
    /// List the entities of a schema
    List { name: String },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum EntityAction {
    /// Show columns, indexes and row count
    About { entity: String },
    /// Drop an entity
    Drop { entity: String },
    /// Remove all rows of an entity
    Truncate { entity: String },
    /// Refresh statistics of an entity
    Analyze { entity: String },
    /// Show the first rows of an entity
    Preview {
        entity: String,
        /// Maximum number of rows, at least 1
        #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        limit: u64,
        /// Number of rows to skip
        #[arg(short, long, default_value_t = 0)]
        skip: u64,
    },
    /// Count the rows of an entity
    Count { entity: String },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SystemAction {
    /// List active transactions
    Transactions,
    /// List held locks
    Locks,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum TransactionAction {
    Begin,
    Commit,
    Rollback,
}

/// Words accepted in first position, for completion
pub const COMMANDS: &[&str] = &[
    "schema",
    "entity",
    "system",
    "transaction",
    "ping",
    "help",
    "stop",
    "quit",
    "exit",
];

/// Words accepted after a command, for completion
pub fn actions(command: &str) -> &'static [&'static str] {
    match command {
        "schema" => &["all", "create", "drop", "list"],
        "entity" => &["about", "drop", "truncate", "analyze", "preview", "count"],
        "system" => &["transactions", "locks"],
        "transaction" => &["begin", "commit", "rollback"],
        _ => &[],
    }
}

/// Parse a tokenized line; `Ok(Err(text))` carries help output
pub fn parse(words: &[&str]) -> Result<std::result::Result<ShellCommand, String>> {
    match ShellLine::try_parse_from(words.iter().copied()) {
        Ok(line) => Ok(Ok(line.command)),
        Err(e)
            if matches!(
                e.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            Ok(Err(e.to_string()))
        }
        Err(e) => Err(anyhow::anyhow!("{}", e.to_string().trim_end())),
    }
}

/// Execute one shell line
///
/// Returns the text to print, or `None` when the user asked to leave.
pub async fn execute(client: &mut Client, format: OutputFormat, words: &[&str]) -> Result<Option<String>> {
    let command = match parse(words)? {
        Ok(command) => command,
        Err(help) => return Ok(Some(help)),
    };

    let output = match command {
        ShellCommand::Stop => return Ok(None),
        ShellCommand::Ping => {
            client.ping().await.context("Ping failed")?;
            "pong".to_string()
        }
        ShellCommand::Schema { action } => schema(client, format, action).await?,
        ShellCommand::Entity { action } => entity(client, format, action).await?,
        ShellCommand::System { action } => {
            let records = match action {
                SystemAction::Transactions => client.list_transactions().await?,
                SystemAction::Locks => client.list_locks().await?,
            };
            format_records(&records, format)?
        }
        ShellCommand::Transaction { action } => match action {
            TransactionAction::Begin => {
                let tx = client.start_transaction().await?;
                format!("Transaction {} started", tx)
            }
            TransactionAction::Commit => {
                client.commit_transaction().await?;
                "Transaction committed".to_string()
            }
            TransactionAction::Rollback => {
                client.abort_transaction().await?;
                "Transaction rolled back".to_string()
            }
        },
    };
    Ok(Some(output))
}

async fn schema(client: &mut Client, format: OutputFormat, action: SchemaAction) -> Result<String> {
    match action {
        SchemaAction::All => {
            let schemas = client.list_schemas().await?;
            format_names("schema", &schemas, format)
        }
        SchemaAction::Create { name } => {
            let records = client.create_schema(&name, false).await?;
            format_records(&records, format)
        }
        SchemaAction::Drop { name } => {
            let records = client.drop_schema(&name, false).await?;
            format_records(&records, format)
        }
        SchemaAction::List { name } => {
            let entities = client.list_entities(&name).await?;
            format_names("entity", &entities, format)
        }
    }
}

async fn entity(client: &mut Client, format: OutputFormat, action: EntityAction) -> Result<String> {
    match action {
        EntityAction::About { entity } => {
            let (schema, entity) = split_entity(&entity)?;
            let details = client.entity_details(schema, entity).await?;
            format_details(&details, format)
        }
        EntityAction::Drop { entity } => {
            let (schema, entity) = split_entity(&entity)?;
            let records = client.drop_entity(schema, entity, false).await?;
            format_records(&records, format)
        }
        EntityAction::Truncate { entity } => {
            let (schema, entity) = split_entity(&entity)?;
            let records = client.truncate_entity(schema, entity).await?;
            format_records(&records, format)
        }
        EntityAction::Analyze { entity } => {
            let (schema, entity) = split_entity(&entity)?;
            let records = client.analyze_entity(schema, entity).await?;
            format_records(&records, format)
        }
        EntityAction::Preview { entity, limit, skip } => {
            let (schema, entity) = split_entity(&entity)?;
            let records = client.sample(schema, entity, limit, skip).await?;
            format_records(&records, format)
        }
        EntityAction::Count { entity } => {
            let (schema, entity) = split_entity(&entity)?;
            Ok(client.count(schema, entity).await?.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctdb_client::{BatchInsert, ClientConfig, ColumnDef, Type, Value};
    use ctdb_test_utils::{TestServer, TEST_ENTITY, TEST_SCHEMA};

    fn command(line: &str) -> ShellCommand {
        let words: Vec<&str> = line.split_whitespace().collect();
        parse(&words).unwrap().unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            command("schema all"),
            ShellCommand::Schema {
                action: SchemaAction::All
            }
        );
        assert_eq!(
            command("schema create s"),
            ShellCommand::Schema {
                action: SchemaAction::Create {
                    name: "s".to_string()
                }
            }
        );
        assert_eq!(
            command("entity preview s.e --limit 5"),
            ShellCommand::Entity {
                action: EntityAction::Preview {
                    entity: "s.e".to_string(),
                    limit: 5,
                    skip: 0
                }
            }
        );
        assert_eq!(
            command("system locks"),
            ShellCommand::System {
                action: SystemAction::Locks
            }
        );
    }

    #[test]
    fn test_exit_aliases() {
        for word in ["stop", "quit", "exit"] {
            assert_eq!(command(word), ShellCommand::Stop);
        }
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse(&["schema", "frobnicate"]).is_err());
        assert!(parse(&["schema", "create"]).is_err());
        assert!(parse(&["entity", "preview", "s.e", "--limit", "many"]).is_err());
        assert!(parse(&["entity", "preview", "s.e", "--limit", "0"]).is_err());
        assert!(parse(&["bogus"]).is_err());
    }

    #[test]
    fn test_help_is_output() {
        let help = parse(&["help"]).unwrap().unwrap_err();
        assert!(help.contains("schema"));
        assert!(help.contains("entity"));
    }

    #[test]
    fn test_completion_words() {
        for command in COMMANDS {
            for action in actions(command) {
                assert!(!action.is_empty());
            }
        }
        assert!(actions("entity").contains(&"preview"));
        assert!(actions("ping").is_empty());
    }

    async fn run(client: &mut Client, line: &str) -> Result<Option<String>> {
        let words: Vec<&str> = line.split_whitespace().collect();
        execute(client, OutputFormat::Table, &words).await
    }

    #[tokio::test]
    async fn test_session_commands() {
        let server = TestServer::start().await;
        let mut client = Client::connect(ClientConfig::new(server.host(), server.port()))
            .await
            .unwrap();

        run(&mut client, "schema create schema_test").await.unwrap();
        let schemas = run(&mut client, "schema all").await.unwrap().unwrap();
        assert!(schemas.contains("warren.schema_test"));

        client
            .create_entity(
                TEST_SCHEMA,
                TEST_ENTITY,
                vec![
                    ColumnDef::new("id", Type::String),
                    ColumnDef::new("value", Type::Integer),
                ],
                false,
            )
            .await
            .unwrap();
        client
            .insert_batch(
                BatchInsert::new(TEST_SCHEMA, TEST_ENTITY)
                    .columns(["id", "value"])
                    .row(vec![Value::from("test_0"), Value::Int(0)])
                    .row(vec![Value::from("test_1"), Value::Int(1)]),
            )
            .await
            .unwrap();

        let count = run(&mut client, "entity count schema_test.entity_test").await.unwrap();
        assert_eq!(count.as_deref(), Some("2"));

        let about = run(&mut client, "entity about warren.schema_test.entity_test")
            .await
            .unwrap()
            .unwrap();
        assert!(about.contains("Rows: 2"));

        let preview = run(&mut client, "entity preview schema_test.entity_test --limit 1")
            .await
            .unwrap()
            .unwrap();
        assert!(preview.contains("test_0"));
        assert!(!preview.contains("test_1"));

        // Remote errors surface as errors, the session stays usable
        assert!(run(&mut client, "schema drop missing").await.is_err());
        assert_eq!(run(&mut client, "ping").await.unwrap().as_deref(), Some("pong"));

        assert!(run(&mut client, "quit").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_commands() {
        let server = TestServer::start().await;
        let mut client = Client::connect(ClientConfig::new(server.host(), server.port()))
            .await
            .unwrap();

        let started = run(&mut client, "transaction begin").await.unwrap().unwrap();
        assert!(started.starts_with("Transaction"));
        assert!(run(&mut client, "transaction begin").await.is_err());

        let listed = execute(&mut client, OutputFormat::Json, &["system", "transactions"])
            .await
            .unwrap()
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(1));

        run(&mut client, "transaction rollback").await.unwrap();
        assert!(run(&mut client, "transaction commit").await.is_err());
        assert!(server.service().open_transactions().is_empty());
    }
}
