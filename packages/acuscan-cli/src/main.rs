//! AcuScan CLI - Inventory barcode lookup agent for Acumatica-style ERPs
//!
//! This binary provides a terminal companion for barcode scanners:
//! - Authenticate against an ERP instance (OAuth or cookie session)
//! - Resolve scanned identifiers to stock items with filter escalation
//! - Keep a local SQLite cache of resolved items for offline review

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::time::Duration;

use acuscan_core::auth::{self, StoredMode, StoredSecret, StoredSettings};
use acuscan_core::erp::client::AuthMode;
use acuscan_core::erp::lookup::LookupError;
use acuscan_core::{config, InventoryAgent, ItemCache, SearchHit};

#[derive(Parser)]
#[command(name = "acuscan")]
#[command(author = "AcuPower LTD")]
#[command(version)]
#[command(about = "Inventory barcode lookup agent for Acumatica-style ERPs")]
#[command(long_about = "
AcuScan CLI resolves scanned inventory identifiers against an ERP
instance's contract-based REST API, escalating from exact match to
broader searches, and keeps a local cache of everything it finds.

Quick start:
  1. Log in:          acuscan login --url https://erp.example.com --username scanner
  2. Look up an item: acuscan find AALEGO500
  3. Review cache:    acuscan cached
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in to an ERP instance
    Login {
        /// Instance base URL (e.g. https://erp.example.com/entity-site)
        #[arg(long)]
        url: Option<String>,

        /// Tenant / company name
        #[arg(long)]
        tenant: Option<String>,

        /// Username
        #[arg(short, long)]
        username: Option<String>,

        /// Password (prompted interactively if omitted)
        #[arg(short, long)]
        password: Option<String>,

        /// OAuth connected-application client id
        #[arg(long)]
        client_id: Option<String>,

        /// OAuth connected-application client secret
        #[arg(long)]
        client_secret: Option<String>,

        /// Contract-based endpoint version
        #[arg(long)]
        api_version: Option<String>,

        /// Remember the session secret (keyring/file) for later runs
        #[arg(short, long)]
        remember: bool,
    },

    /// Resolve a scanned identifier to a stock item
    Find {
        /// Barcode / inventory id / description fragment to resolve
        identifier: String,

        /// Overall lookup deadline in seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },

    /// Show login status
    Status,

    /// List locally cached items
    Cached {
        /// Delete all cached items instead of listing them
        #[arg(long)]
        clear: bool,
    },

    /// List endpoint versions advertised by the instance
    Versions,

    /// Log out and clear the stored session
    Logout,

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("acuscan={},acuscan_core={}", log_level, log_level).into()),
        )
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Login {
            url,
            tenant,
            username,
            password,
            client_id,
            client_secret,
            api_version,
            remember,
        } => {
            cmd_login(
                &cli,
                url.clone(),
                tenant.clone(),
                username.clone(),
                password.clone(),
                client_id.clone(),
                client_secret.clone(),
                api_version.clone(),
                *remember,
            )
            .await
        }
        Commands::Find { identifier, timeout_secs } => {
            cmd_find(&cli, identifier, *timeout_secs).await
        }
        Commands::Status => cmd_status(&cli).await,
        Commands::Cached { clear } => cmd_cached(&cli, *clear),
        Commands::Versions => cmd_versions(&cli).await,
        Commands::Logout => cmd_logout(&cli).await,
        Commands::Config => cmd_config(&cli),
    }
}

#[allow(clippy::too_many_arguments)]
async fn cmd_login(
    cli: &Cli,
    url: Option<String>,
    tenant: Option<String>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    api_version: Option<String>,
    remember: bool,
) -> Result<()> {
    // Fill gaps from config and previously stored settings
    let instance = config::load_instance_config();
    let stored = auth::load_settings().unwrap_or_default().unwrap_or_default();

    let url = url
        .or(instance.url)
        .or_else(|| (!stored.instance_url.is_empty()).then(|| stored.instance_url.clone()))
        .ok_or_else(|| {
            anyhow::anyhow!("No instance URL. Pass --url or configure {}", config::get_config_file_path_string())
        })?;
    let tenant = tenant
        .or(instance.tenant)
        .unwrap_or_else(|| stored.tenant.clone());
    let username = username
        .or_else(|| (!stored.username.is_empty()).then(|| stored.username.clone()))
        .ok_or_else(|| anyhow::anyhow!("No username. Pass --username"))?;
    let api_version = api_version.unwrap_or(instance.api_version);

    let password = match password {
        Some(p) => p,
        None => dialoguer::Password::new()
            .with_prompt(format!("Password for {}", username))
            .interact()?,
    };

    match cli.format {
        OutputFormat::Text => println!("Logging in to {} ...", url),
        OutputFormat::Json => {}
    }

    let params = auth::LoginParams {
        base_url: url.clone(),
        tenant: tenant.clone(),
        username: username.clone(),
        password,
        client_id,
        client_secret,
        api_version: api_version.clone(),
    };
    let client = auth::login(&params).await?;
    let mode = client.mode().describe().to_string();

    // Settings are always persisted; the secret only with --remember
    auth::save_settings(&StoredSettings {
        instance_url: client.base_url().to_string(),
        tenant,
        username: username.clone(),
        api_version,
        remember_secret: remember,
        last_login: Some(chrono::Utc::now()),
    })?;

    if remember {
        let secret = match client.mode() {
            AuthMode::Bearer(token) => StoredSecret {
                mode: StoredMode::Bearer { access_token: token.clone() },
                expires_at: None,
            },
            AuthMode::Cookie => StoredSecret { mode: StoredMode::Cookie, expires_at: None },
        };
        auth::save_secret(&secret)?;
    } else {
        auth::delete_secret();
    }

    match cli.format {
        OutputFormat::Text => {
            println!("Logged in as {} ({})", username, mode);
            if remember {
                if matches!(client.mode(), AuthMode::Cookie) {
                    println!("Note: cookie sessions cannot be remembered across runs.");
                } else {
                    println!("Session stored: {}", auth::get_credential_storage_info());
                }
            }
            println!();
            println!("Look up an item with: acuscan find <identifier>");
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "logged_in",
                "instance_url": client.base_url(),
                "username": username,
                "auth_mode": mode,
                "remembered": remember,
            }));
        }
    }

    Ok(())
}

async fn cmd_find(cli: &Cli, identifier: &str, timeout_secs: u64) -> Result<()> {
    let client = match auth::restore_session()? {
        Some(c) => c,
        None => {
            match cli.format {
                OutputFormat::Text => {
                    println!("Not logged in (or the session was not remembered).");
                    println!("Run 'acuscan login --remember' first.");
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "error": "not_logged_in" }));
                }
            }
            std::process::exit(1);
        }
    };

    let agent = InventoryAgent::with_budget(
        ItemCache::open_default()?,
        Duration::from_secs(timeout_secs),
    );
    agent.install_session(client).await;

    match agent.find(identifier).await {
        Ok(hit) => print_hit(cli, identifier, &hit),
        Err(LookupError::NotFound) => {
            match cli.format {
                OutputFormat::Text => println!("No item matches '{}'.", identifier),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({
                        "identifier": identifier,
                        "error": "not_found",
                    }));
                }
            }
            std::process::exit(1);
        }
        Err(LookupError::AuthExpired) => {
            // The server rejected the session; the remembered secret is stale
            auth::delete_secret();
            match cli.format {
                OutputFormat::Text => {
                    println!("Session expired. Run 'acuscan login' again.");
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "error": "auth_expired" }));
                }
            }
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn print_hit(cli: &Cli, identifier: &str, hit: &SearchHit) -> Result<()> {
    let item = &hit.item;
    match cli.format {
        OutputFormat::Text => {
            println!("{}  ({} match)", item.inventory_id(), hit.strategy);
            println!("  Description: {}", item.description());
            println!("  Class:       {}", item.item_class());
            println!("  Status:      {}", item.item_status());
            println!("  Base unit:   {}", item.base_unit());
            println!("  Base price:  {:.2}", item.base_price());
            println!("  On hand:     {}", item.total_qty_on_hand());

            let warehouses = item.flatten_warehouse_rows();
            if !warehouses.is_empty() {
                println!();
                println!("  Warehouses:");
                for row in &warehouses {
                    let marker = if row.is_default { " (default)" } else { "" };
                    println!(
                        "    {:10} on hand {:>8}  available {:>8}{}",
                        row.warehouse_id, row.qty_on_hand, row.qty_available, marker
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "identifier": identifier,
                "strategy": hit.strategy.to_string(),
                "inventory_id": item.inventory_id(),
                "description": item.description(),
                "item_class": item.item_class(),
                "item_status": item.item_status(),
                "base_unit": item.base_unit(),
                "base_price": item.base_price(),
                "qty_on_hand": item.total_qty_on_hand(),
                "warehouses": item.flatten_warehouse_rows(),
            }));
        }
    }
    Ok(())
}

async fn cmd_status(cli: &Cli) -> Result<()> {
    let auth_status = auth::check_auth().await?;

    match cli.format {
        OutputFormat::Text => {
            if auth_status.authenticated {
                println!("Status: Logged in");
                println!("Instance: {}", auth_status.instance_url.unwrap_or_else(|| "-".to_string()));
                println!("Tenant:   {}", auth_status.tenant.unwrap_or_else(|| "-".to_string()));
                println!("User:     {}", auth_status.username.unwrap_or_else(|| "-".to_string()));
                println!("Endpoint: {}", auth_status.api_version.unwrap_or_else(|| "-".to_string()));
                println!("Auth:     {}", auth_status.auth_mode.unwrap_or_else(|| "-".to_string()));
                println!();
                println!("Storage: {}", auth::get_credential_storage_info());
            } else {
                println!("Status: Not logged in");
                println!();
                println!("Run 'acuscan login' to authenticate.");
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "authenticated": auth_status.authenticated,
                "instance_url": auth_status.instance_url,
                "tenant": auth_status.tenant,
                "username": auth_status.username,
                "api_version": auth_status.api_version,
                "auth_mode": auth_status.auth_mode,
                "storage_info": auth::get_credential_storage_info(),
            }));
        }
    }

    Ok(())
}

fn cmd_cached(cli: &Cli, clear: bool) -> Result<()> {
    let cache = ItemCache::open_default()?;

    if clear {
        let removed = cache.clear()?;
        match cli.format {
            OutputFormat::Text => println!("Removed {} cached item(s).", removed),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "status": "cleared", "removed": removed }));
            }
        }
        return Ok(());
    }

    let items = cache.all()?;
    match cli.format {
        OutputFormat::Text => {
            if items.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }
            println!("{} cached item(s):", items.len());
            println!();
            for item in &items {
                println!(
                    "  {:20} {:>10.2} {:>10}  {}",
                    item.inventory_id,
                    item.base_price,
                    item.qty_on_hand,
                    item.description
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "items": items }));
        }
    }

    Ok(())
}

async fn cmd_versions(cli: &Cli) -> Result<()> {
    let client = match auth::restore_session()? {
        Some(c) => c,
        None => {
            anyhow::bail!("Not logged in. Run 'acuscan login --remember' first.");
        }
    };

    let endpoints = client.endpoints().await?;

    match cli.format {
        OutputFormat::Text => {
            if let Some(version) = &endpoints.version {
                println!(
                    "Server build: {}",
                    version.build_version.as_deref().unwrap_or("-")
                );
            }
            match &endpoints.endpoints {
                Some(list) if !list.is_empty() => {
                    println!("Endpoints:");
                    for ep in list {
                        println!(
                            "  {:12} {}",
                            ep.name.as_deref().unwrap_or("-"),
                            ep.version.as_deref().unwrap_or("-")
                        );
                    }
                }
                _ => println!("No endpoints advertised."),
            }
        }
        OutputFormat::Json => {
            let list: Vec<_> = endpoints
                .endpoints
                .unwrap_or_default()
                .into_iter()
                .map(|ep| {
                    serde_json::json!({
                        "name": ep.name,
                        "version": ep.version,
                        "href": ep.href,
                    })
                })
                .collect();
            println!("{}", serde_json::json!({
                "build_version": endpoints.version.and_then(|v| v.build_version),
                "endpoints": list,
            }));
        }
    }

    Ok(())
}

async fn cmd_logout(cli: &Cli) -> Result<()> {
    let had_session = auth::restore_session()?.is_some();

    if !had_session {
        match cli.format {
            OutputFormat::Text => println!("Not logged in."),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "status": "not_logged_in" }));
            }
        }
        // Clear any stale marker anyway
        auth::delete_secret();
        return Ok(());
    }

    auth::logout().await?;

    // Cached items are session data too
    let removed = match ItemCache::open_default().and_then(|c| c.clear()) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("Failed to clear item cache: {:#}", e);
            0
        }
    };

    match cli.format {
        OutputFormat::Text => {
            println!("Logged out.");
            if removed > 0 {
                println!("Removed {} cached item(s).", removed);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "logged_out",
                "cache_items_removed": removed,
            }));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let instance = config::load_instance_config();
    let config_path = config::get_config_file_path_string();

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!(
                "Instance URL:     {} (from {})",
                instance.url.as_deref().unwrap_or("(not set)"),
                instance.source
            );
            println!("Tenant:           {}", instance.tenant.as_deref().unwrap_or("(not set)"));
            println!("Endpoint version: {}", instance.api_version);
            println!("Credential store: {}", auth::get_credential_storage_info());
            println!();
            println!("Environment variables:");
            println!("  ACUSCAN_INSTANCE_URL - Override instance URL");
            println!("  ACUSCAN_TENANT       - Override tenant");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "instance_url": instance.url,
                "instance_source": format!("{}", instance.source),
                "tenant": instance.tenant,
                "api_version": instance.api_version,
                "credential_storage": auth::get_credential_storage_info(),
            }));
        }
    }

    Ok(())
}
