use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use shared::metrics::{self, ClientFilter, HealthFilter, PullStatusFilter};
use shared::timestamp::parse_timestamp;
use shared::{Client, CreateClientRequest, PullEntryRequest, UpdateClientRequest};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod export;
mod notifications;
mod tui;
mod view;

use api::ApiClient;
use export::ExportFormat;
use notifications::{NotificationCenter, NotificationKind};

#[derive(Parser)]
#[command(name = "gsos")]
#[command(about = "GSOS client roster: track deployments, credentials and pull history")]
#[command(version)]
struct Cli {
    /// Server API base URL (overrides config)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Case-insensitive search over name, domain, client id, puller and version
    #[arg(short, long)]
    search: Option<String>,

    /// Only clients whose GSOS version contains this text
    #[arg(long)]
    gsos_version: Option<String>,

    /// Pull status: all, recent, outdated, never
    #[arg(long, default_value = "all")]
    pull: PullStatusFilter,

    /// Health: all, healthy, warning, critical
    #[arg(long, default_value = "all")]
    health: HealthFilter,
}

impl FilterArgs {
    fn to_filter(&self) -> ClientFilter {
        ClientFilter {
            search: self.search.clone().unwrap_or_default(),
            version: self.gsos_version.clone().unwrap_or_default(),
            pull_status: self.pull,
            health: self.health,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List clients
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Show one client, including its stored password
    Show { id: i64 },
    /// Add a client
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        password: String,
        /// Latest pull date (e.g. 2024-06-01 or 2024-06-01T09:30)
        #[arg(long, value_parser = parse_timestamp)]
        pull_date: Option<DateTime<Utc>>,
        #[arg(long)]
        pulled_by: Option<String>,
        #[arg(long)]
        gsos_version: Option<String>,
    },
    /// Edit a client. Pass an empty string to clear pull date, puller or version.
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        client_id: Option<String>,
        /// New password; omit to keep the current one
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        pull_date: Option<String>,
        #[arg(long)]
        pulled_by: Option<String>,
        #[arg(long)]
        gsos_version: Option<String>,
    },
    /// Delete a client and its pull history
    Delete {
        id: i64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show a client's pull history
    History { id: i64 },
    /// Record a pull for a client
    Pull {
        id: i64,
        /// Who performed the pull
        #[arg(long)]
        by: String,
        /// When the pull happened (defaults to now)
        #[arg(long, value_parser = parse_timestamp)]
        date: Option<DateTime<Utc>>,
        /// GSOS version that was pulled
        #[arg(long)]
        gsos_version: Option<String>,
    },
    /// Fleet analytics
    Analytics,
    /// Export the (filtered) roster
    Export {
        /// xlsx, csv or pdf
        #[arg(short, long, default_value = "xlsx")]
        format: ExportFormat,
        /// Output file name without extension
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Local activity log
    Notifications {
        #[command(subcommand)]
        action: Option<NotificationAction>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Interactive dashboard
    Dashboard,
}

#[derive(Subcommand)]
enum NotificationAction {
    /// Show notifications, newest first
    List,
    /// Mark one notification as read
    Read {
        /// Notification id (or its first characters)
        id: String,
    },
    /// Mark every notification as read
    ReadAll,
    /// Delete all notifications
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (server, dark_mode, theme_color, table_page_size, notifications, language)
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Show all configuration
    Show,
    /// Get the config file path
    Path,
    /// Restore default settings
    Reset,
}

/// Maps an edit flag to the tri-state update field: absent leaves the value,
/// empty clears it.
fn patch(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| if v.trim().is_empty() { None } else { Some(v) })
}

fn patch_date(value: Option<String>) -> Result<Option<Option<DateTime<Utc>>>> {
    match patch(value) {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(raw)) => Ok(Some(Some(parse_timestamp(&raw)?))),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Records a roster event when notifications are enabled. Failures to write
/// the log never fail the command.
fn notify(config: &config::Config, kind: NotificationKind, subject: &str) {
    if !config.settings.notifications {
        return;
    }
    let result = NotificationCenter::open_default().and_then(|mut center| center.add(kind, subject).map(|_| ()));
    if let Err(e) = result {
        tracing::warn!("Failed to record notification: {}", e);
    }
}

async fn fetch_client(api: &ApiClient, id: i64) -> Result<Client> {
    match api.client_details(id).await {
        Ok(client) => Ok(client),
        Err(e) if e.is_not_found() => bail!("No client with id {}", id),
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gsos=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = config::Config::load().unwrap_or_default();
    let api = ApiClient::new(&config.server_url(cli.server));
    tracing::debug!("Using server {}", api.base_url());
    let now = Utc::now();

    match cli.command {
        Commands::Config { action } => handle_config_command(action)?,
        Commands::Notifications { action } => handle_notifications_command(action)?,
        Commands::List { filter } => {
            let clients = filter.to_filter().apply(&api.list_clients().await?, now);
            let page_size = config.settings.table_page_size.max(1);
            for (i, page) in clients.chunks(page_size).enumerate() {
                if i > 0 {
                    println!();
                }
                view::print_clients(page, now);
            }
            if clients.is_empty() {
                view::print_clients(&[], now);
            }
        }
        Commands::Show { id } => {
            let client = fetch_client(&api, id).await?;
            view::print_client(&client, now);
        }
        Commands::Add {
            name,
            domain,
            client_id,
            password,
            pull_date,
            pulled_by,
            gsos_version,
        } => {
            let req = CreateClientRequest {
                client_name: name,
                domain_url: domain,
                client_id,
                password,
                latest_pull_date: pull_date,
                latest_pull_by: patch(pulled_by).flatten(),
                gsos_version: patch(gsos_version).flatten(),
            };
            req.validate()?;
            let created = api.create_client(&req).await?;
            println!("\x1b[32m✅ {} (id {})\x1b[0m", created.message, created.id);
            notify(&config, NotificationKind::ClientCreated, &req.client_name);
        }
        Commands::Edit {
            id,
            name,
            domain,
            client_id,
            password,
            pull_date,
            pulled_by,
            gsos_version,
        } => {
            let req = UpdateClientRequest {
                client_name: name,
                domain_url: domain,
                client_id,
                password: password.filter(|p| !p.is_empty()),
                latest_pull_date: patch_date(pull_date)?,
                latest_pull_by: patch(pulled_by),
                gsos_version: patch(gsos_version),
            };
            if req.is_empty() {
                bail!("Nothing to change. Pass at least one field to edit.");
            }
            req.validate()?;
            let resp = api.update_client(id, &req).await?;
            println!("\x1b[32m✅ {}\x1b[0m", resp.message);
            let display_name = match &req.client_name {
                Some(name) => name.clone(),
                None => api.client_details(id).await.map(|c| c.client_name).unwrap_or_else(|_| format!("#{}", id)),
            };
            notify(&config, NotificationKind::ClientEdited, &display_name);
        }
        Commands::Delete { id, yes } => {
            let client = fetch_client(&api, id).await?;
            if !yes && !confirm(&format!("Delete \"{}\" and all of its pull history?", client.client_name))? {
                println!("Cancelled.");
                return Ok(());
            }
            let resp = api.delete_client(id).await?;
            println!("\x1b[32m✅ {}\x1b[0m", resp.message);
            notify(&config, NotificationKind::ClientDeleted, &client.client_name);
        }
        Commands::History { id } => {
            let entries = api.history(id).await?;
            view::print_history(&entries);
        }
        Commands::Pull {
            id,
            by,
            date,
            gsos_version,
        } => {
            let req = PullEntryRequest {
                pull_date: date.unwrap_or(now),
                pull_by: by,
                version: patch(gsos_version).flatten(),
            };
            req.validate()?;
            let client = fetch_client(&api, id).await?;
            let resp = api.add_history(id, &req).await?;
            println!("\x1b[32m✅ {}\x1b[0m", resp.message);
            notify(&config, NotificationKind::PullRecorded, &client.client_name);
        }
        Commands::Analytics => {
            let clients = api.list_clients().await?;
            view::print_analytics(&metrics::analytics(&clients, now));
        }
        Commands::Export {
            format,
            output,
            filter,
        } => {
            let clients = filter.to_filter().apply(&api.list_clients().await?, now);
            let bytes = export::render(format, &clients, now)?;
            let stem = output.unwrap_or_else(|| PathBuf::from(export::default_filename(now)));
            let path = stem.with_extension(format.extension());
            std::fs::write(&path, bytes)?;
            println!("\x1b[32m✅ Exported {} clients to {}\x1b[0m", clients.len(), path.display());
            notify(
                &config,
                NotificationKind::System,
                &format!("Exported {} clients to {}", clients.len(), path.display()),
            );
        }
        Commands::Dashboard => {
            let notifications = if config.settings.notifications {
                NotificationCenter::open_default()
                    .map_err(|e| tracing::warn!("Notification log unavailable: {}", e))
                    .ok()
            } else {
                None
            };
            tui::run(api, notifications).await?
        }
    }

    Ok(())
}

fn handle_notifications_command(action: Option<NotificationAction>) -> Result<()> {
    let mut center = NotificationCenter::open_default()?;
    match action.unwrap_or(NotificationAction::List) {
        NotificationAction::List => {
            view::print_notifications(center.list());
            println!("\x1b[90m{} unread\x1b[0m", center.unread_count());
        }
        NotificationAction::Read { id } => {
            if !center.mark_read(&id)? {
                bail!("No notification matches {}", id);
            }
            println!("Marked as read");
        }
        NotificationAction::ReadAll => {
            center.mark_all_read()?;
            println!("All notifications marked as read");
        }
        NotificationAction::Clear => {
            center.clear()?;
            println!("Notifications cleared");
        }
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value } => {
            let mut config = config::Config::load().unwrap_or_default();
            config.set(&key, &value)?;
            config.save()?;
            println!("Configuration saved");
        }
        ConfigAction::Get { key } => {
            let config = config::Config::load()?;
            println!("{}", config.get(&key)?);
        }
        ConfigAction::Show => {
            let config = config::Config::load()?;
            for key in config::KEYS {
                println!("{}: {}", key, config.get(key)?);
            }
        }
        ConfigAction::Path => {
            let path = config::Config::config_path()?;
            println!("{}", path.display());
        }
        ConfigAction::Reset => {
            config::Config::default().save()?;
            println!("Configuration reset to defaults");
        }
    }
    Ok(())
}
