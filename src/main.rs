use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nostr_core::{IdentifierCodec, Nip19Codec};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quotefeed::config::DEFAULT_CONFIG_PATH;
use quotefeed::engine::FeedItem;
use quotefeed::{Config, Engine, FeedView, Notification, WsConnector};

/// How often a changed feed is re-rendered.
const RENDER_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "quotefeed")]
#[command(about = "Follow a Nostr author's quote posts and resolve what they quote")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path (defaults to ./quotefeed.toml when present)
    #[arg(short, long)]
    config: Option<String>,

    /// Relay endpoint, repeatable; replaces the configured list
    #[arg(short, long = "relay")]
    relays: Vec<String>,

    /// Author to track (npub or hex)
    #[arg(short, long)]
    author: Option<String>,

    /// Print feed snapshots as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the feed until interrupted
    Run,
    /// Validate configuration and decode the tracked author
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    config.apply_overrides(&cli.relays, cli.author.as_deref());

    init_logging(&config.logging.level)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_feed(config, cli.json).await,
        Commands::Check => check_config(config),
    }
}

fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {path}")),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load_from_file(DEFAULT_CONFIG_PATH)
        }
        None => Ok(Config::default()),
    }
}

async fn run_feed(config: Config, json: bool) -> Result<()> {
    tracing::info!("Starting quotefeed v{}", env!("CARGO_PKG_VERSION"));

    let codec = Arc::new(Nip19Codec);
    let settings = config
        .into_settings(codec.as_ref())
        .context("Configuration validation failed")?;

    let engine = Engine::new(settings, Arc::new(WsConnector), codec);
    let mut notifications = engine.notifications();
    engine.start().await;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(RENDER_INTERVAL);
    let mut dirty = false;

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                if dirty {
                    render(&engine.view(), json)?;
                    dirty = false;
                }
            }
            notification = notifications.recv() => match notification {
                Ok(Notification::FeedChanged) | Ok(Notification::ProfileResolved(_)) => {
                    dirty = true;
                }
                Ok(Notification::StatusChanged(status)) => tracing::info!("{status}"),
                Ok(Notification::Counts { relays, notes }) => {
                    tracing::debug!("{relays} relays, {notes} notes");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {skipped} notifications");
                    dirty = true;
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    tracing::info!("Received shutdown signal, stopping...");
    let view = engine.view();
    engine.stop().await;
    println!(
        "\n{} notes stored, {} shown, {} relays were connected",
        view.notes,
        view.item_count(),
        view.relays
    );
    Ok(())
}

fn check_config(config: Config) -> Result<()> {
    println!("Checking configuration...");
    config.validate().context("Configuration validation failed")?;
    println!("✓ Configuration is valid");

    let author = config.tracking.author.as_deref().unwrap_or_default();
    let hex = Nip19Codec
        .decode_identity(author)
        .context("Failed to decode tracked author")?;
    println!("✓ Tracked author decodes");
    println!("  Public key: {hex}");

    println!("  Relays:");
    for url in &config.relays.urls {
        println!("    {url}");
    }
    println!(
        "  Feed order: {:?}, max displayed: {}",
        config.feed.order, config.feed.max_displayed
    );
    Ok(())
}

fn render(view: &FeedView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(view).context("Failed to serialize feed")?);
        return Ok(());
    }

    println!("── {} relays · {} notes ──", view.relays, view.notes);
    for item in &view.items {
        print_item(item, 0);
    }
    Ok(())
}

fn print_item(item: &FeedItem, depth: usize) {
    let indent = "  ".repeat(depth);
    let marker = if depth == 0 { "•" } else { "↳" };
    println!("{indent}{marker} {} ({})", item.author_label, item.timestamp);
    if !item.preview.is_empty() {
        println!("{indent}  {}", item.preview);
    }
    for child in &item.children {
        print_item(child, depth + 1);
    }
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .context("Failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        },
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        },
        _ = signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C");
        }
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter.to_string())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();

    Ok(())
}
