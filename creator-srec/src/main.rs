use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use creator_srec::api::{ApiClient, LiveProber};
use creator_srec::chat::{ChatService, ChatSettings, WsTransport};
use creator_srec::config::AppConfig;
use creator_srec::media_store::SqliteMediaStore;
use creator_srec::monitor::{MonitorService, WatchList};
use creator_srec::notification::{FanoutSink, Notifier};
use creator_srec::recorder::{FfmpegEngine, LockDir, Recorder, RecorderDeps};
use creator_srec::utils::fs;
use creator_srec::{logging, panic_hook};

/// Time given to post-processing after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
const CHAT_ORIGIN: &str = "https://fansly.com";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch creators and record their broadcasts until Ctrl-C
    Monitor,
    /// Start or stop watching a creator (account id or username)
    Watch {
        creator: String,
        /// Display name used for folders and notifications
        #[arg(long)]
        name: Option<String>,
    },
    /// List watched creators
    List,
    /// Check whether a creator is live right now
    Check { creator: String },
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration with secrets redacted
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = Arc::new(
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?,
    );

    let log_dir = config.paths.log_dir();
    let (logging_config, _guard) = logging::init_logging(&log_dir)?;
    panic_hook::install(&log_dir);

    let background = CancellationToken::new();
    logging_config.start_retention_cleanup(background.clone());

    let result = match args.command {
        Command::Monitor => run_monitor(config).await,
        Command::Watch { creator, name } => toggle_watch(&config, &creator, name).await,
        Command::List => list_watched(&config).await,
        Command::Check { creator } => check_creator(&config, &creator).await,
        Command::Config {
            action: ConfigAction::Show,
        } => {
            println!("{}", config.show()?);
            Ok(())
        }
    };

    background.cancel();
    result
}

async fn run_monitor(config: Arc<AppConfig>) -> anyhow::Result<()> {
    fs::ensure_dir_all_with_op("creating state directory", &config.paths.state_dir).await?;

    let api = Arc::new(ApiClient::from_config(&config));
    let store = SqliteMediaStore::connect(&config.paths.database_url())
        .await
        .context("Failed to open media store")?;
    let notifier = Notifier::new(Arc::new(FanoutSink::from_config(&config.notifications)));

    let transport = Arc::new(WsTransport::new(
        CHAT_ORIGIN,
        config.account.user_agent.clone(),
    ));
    let chat = Arc::new(ChatService::new(
        ChatSettings {
            ws_url: config.api.chat_ws_url.clone(),
            token: config.account.token.clone(),
            timings: config.livestream.chat.clone(),
            dedupe_by_id: config.livestream.dedupe_chat_by_id,
        },
        transport,
    ));

    let recorder = Arc::new(Recorder::new(RecorderDeps {
        prober: api.clone(),
        engine: Arc::new(FfmpegEngine::new(config.livestream.ffmpeg_path.clone())),
        store: Arc::new(store),
        notifier,
        chat,
        locks: LockDir::new(config.paths.lock_dir()),
    }));

    let watchlist = WatchList::load(config.paths.watchlist_file()).await?;
    let monitor = MonitorService::new(config.clone(), api, recorder, watchlist);

    if monitor.start().await? == 0 {
        warn!("Watch-list is empty; add creators with `creator-srec watch <creator>`");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");

    monitor.shutdown(SHUTDOWN_GRACE).await;
    Ok(())
}

/// Toggle the creator in the persisted watch-list.
///
/// A running `monitor` picks the change up on its next rescan.
async fn toggle_watch(config: &AppConfig, creator: &str, name: Option<String>) -> anyhow::Result<()> {
    let api = ApiClient::from_config(config);
    let (creator_id, display_name) = resolve_creator(&api, creator, name).await?;

    let mut watchlist = WatchList::load(config.paths.watchlist_file()).await?;
    let watching = if watchlist.remove(&creator_id).is_some() {
        false
    } else {
        watchlist.insert(&creator_id, &display_name);
        true
    };
    watchlist
        .persist()
        .await
        .context("Failed to save the watch-list")?;

    if watching {
        println!("Now watching {} ({})", display_name, creator_id);
    } else {
        println!("Stopped watching {} ({})", display_name, creator_id);
    }
    Ok(())
}

async fn list_watched(config: &AppConfig) -> anyhow::Result<()> {
    let watchlist = WatchList::load(config.paths.watchlist_file()).await?;
    if watchlist.is_empty() {
        println!("No creators are being watched");
        return Ok(());
    }
    for entry in watchlist.entries() {
        println!("{}\t{}", entry.creator_id, entry.display_name);
    }
    Ok(())
}

async fn check_creator(config: &AppConfig, creator: &str) -> anyhow::Result<()> {
    let api = ApiClient::from_config(config);
    let (creator_id, display_name) = resolve_creator(&api, creator, None).await?;
    let status = api
        .check_live(&creator_id)
        .await
        .with_context(|| format!("Liveness check failed for {}", display_name))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Account ids are used as-is; anything else is looked up as a username.
async fn resolve_creator(
    api: &ApiClient,
    creator: &str,
    name: Option<String>,
) -> anyhow::Result<(String, String)> {
    if is_account_id(creator) {
        let display_name = name.unwrap_or_else(|| creator.to_string());
        return Ok((creator.to_string(), display_name));
    }
    let account = api
        .account_by_username(creator)
        .await
        .with_context(|| format!("Failed to resolve username {}", creator))?;
    let display_name = name.unwrap_or_else(|| account.preferred_name().to_string());
    Ok((account.id, display_name))
}

fn is_account_id(creator: &str) -> bool {
    !creator.is_empty() && creator.chars().all(|c| c.is_ascii_digit())
}
