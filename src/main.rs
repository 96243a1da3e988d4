use anyhow::Context;
use brand_command_center_lib::config::AppConfig;
use brand_command_center_lib::credentials::CredentialCipher;
use brand_command_center_lib::models::{IntegrationConfig, NewClient};
use brand_command_center_lib::orchestrator::{parse_provider, SyncOrchestrator};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "brand-command-center")]
#[command(about = "Syncs client integrations into the Brand Command Center database")]
struct Cli {
    /// Optional YAML config file; environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sync queue with the periodic cron pass until ctrl-c
    Serve,
    /// Sync one client, or a single provider of it
    Sync {
        #[arg(long)]
        client_id: i64,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Sync every client with an enabled integration
    SyncAll,
    /// Portal refresh: sync only if the last sync is stale
    Refresh {
        #[arg(long)]
        token: String,
    },
    #[command(subcommand)]
    Integration(IntegrationCommand),
    #[command(subcommand)]
    Client(ClientCommand),
    /// Recompute guest happiness from stored reviews
    Analyze {
        #[arg(long)]
        client_id: i64,
    },
    /// Print a fresh INTEGRATION_ENCRYPTION_KEY
    Keygen,
}

#[derive(Subcommand)]
enum IntegrationCommand {
    /// Create or replace a provider's credentials
    Set {
        #[arg(long)]
        client_id: i64,
        #[arg(long)]
        provider: String,
        /// Config entry as key=value; repeatable
        #[arg(long = "set", value_parser = parse_pair)]
        values: Vec<(String, String)>,
        #[arg(long)]
        disabled: bool,
    },
    List {
        #[arg(long)]
        client_id: i64,
    },
    Toggle {
        #[arg(long)]
        client_id: i64,
        #[arg(long)]
        provider: String,
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    Remove {
        #[arg(long)]
        client_id: i64,
        #[arg(long)]
        provider: String,
    },
}

#[derive(Subcommand)]
enum ClientCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        tagline: Option<String>,
    },
    List,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Command::Keygen = cli.command {
        println!("{}", CredentialCipher::generate_key_hex());
        return Ok(());
    }

    let log_dir = match cli.command {
        Command::Serve => config.log_dir.as_deref(),
        _ => None,
    };
    brand_command_center_lib::init_tracing(log_dir)?;

    if let Command::Serve = cli.command {
        brand_command_center_lib::serve(&config).await?;
        return Ok(());
    }

    let orchestrator = SyncOrchestrator::from_config(&config)?;
    match cli.command {
        Command::Sync {
            client_id,
            provider: Some(provider),
        } => {
            let provider = parse_provider(&provider)?;
            print_json(&orchestrator.sync_provider(client_id, provider).await?)?;
        }
        Command::Sync {
            client_id,
            provider: None,
        } => print_json(&orchestrator.sync_client(client_id).await?)?,
        Command::SyncAll => print_json(&orchestrator.sync_all_clients().await?)?,
        Command::Refresh { token } => print_json(&orchestrator.refresh_if_stale(&token).await?)?,
        Command::Integration(command) => run_integration(&orchestrator, command)?,
        Command::Client(command) => run_client(&orchestrator, command)?,
        Command::Analyze { client_id } => {
            print_json(&orchestrator.analyze_guest_happiness(client_id).await?)?
        }
        Command::Serve | Command::Keygen => {}
    }
    Ok(())
}

fn run_integration(orchestrator: &SyncOrchestrator, command: IntegrationCommand) -> anyhow::Result<()> {
    match command {
        IntegrationCommand::Set {
            client_id,
            provider,
            values,
            disabled,
        } => {
            let config: IntegrationConfig = values.into_iter().collect();
            print_json(&orchestrator.upsert_integration(client_id, &provider, &config, !disabled)?)
        }
        IntegrationCommand::List { client_id } => {
            print_json(&orchestrator.list_integrations(client_id)?)
        }
        IntegrationCommand::Toggle {
            client_id,
            provider,
            enabled,
        } => {
            let provider = parse_provider(&provider)?;
            orchestrator.set_integration_enabled(client_id, provider, enabled)?;
            print_json(&json!({ "clientId": client_id, "provider": provider, "enabled": enabled }))
        }
        IntegrationCommand::Remove {
            client_id,
            provider,
        } => {
            let provider = parse_provider(&provider)?;
            orchestrator.delete_integration(client_id, provider)?;
            print_json(&json!({ "clientId": client_id, "provider": provider, "removed": true }))
        }
    }
}

fn run_client(orchestrator: &SyncOrchestrator, command: ClientCommand) -> anyhow::Result<()> {
    let db = orchestrator.db();
    match command {
        ClientCommand::Create {
            name,
            slug,
            location,
            tagline,
        } => {
            let client = db.create_client(&NewClient {
                name,
                slug,
                location,
                tagline,
                ..NewClient::default()
            })?;
            print_json(&json!({
                "id": client.id,
                "slug": client.slug,
                "portalToken": client.portal_token,
            }))
        }
        ClientCommand::List => {
            let clients: Vec<_> = db
                .list_clients()?
                .into_iter()
                .map(|client| {
                    json!({
                        "id": client.id,
                        "name": client.name,
                        "slug": client.slug,
                        "syncStatus": client.sync_status,
                        "lastSyncAt": client.last_sync_at,
                    })
                })
                .collect();
            print_json(&clients)
        }
    }
}
