//! Timebot Telegram binary.
//!
//! Start the bot with:
//! ```bash
//! TELEGRAM_BOT_TOKEN=xxx cargo run -p timebot-telegram
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use teloxide::prelude::*;
use timebot_core::config;
use timebot_persistence::{DbStore, FileSessionStore};
use timebot_telegram::{
    builtin_registry, BotConfig, Context, Dispatcher, LinkTokens, Sessions, TeloxideClient,
    TimeBot,
};
use tracing_subscriber::EnvFilter;

/// Timebot Telegram Bot - log and review working hours from Telegram
#[derive(Parser, Debug)]
#[command(name = "timebot-telegram")]
#[command(about = "Telegram bot for Timebot time tracking")]
struct Args {
    /// Serve a webhook instead of long polling
    #[arg(short, long)]
    webhook: bool,

    /// Webhook port (overrides TIMEBOT_WEBHOOK_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Data store file (overrides TIMEBOT_DATA_FILE)
    #[arg(long, env = "TIMEBOT_DATA_FILE")]
    data_file: Option<String>,

    /// Verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from config directory first
    let env_path = config::env_file();
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    let _ = dotenvy::from_filename(".env.local").or_else(|_| dotenvy::dotenv());

    let args = Args::parse();

    let filter = match args.verbose {
        0 => "timebot_telegram=info,timebot_persistence=info,teloxide=warn",
        1 => "timebot_telegram=debug,timebot_persistence=debug,teloxide=info",
        2 => "timebot_telegram=trace,timebot_persistence=trace,teloxide=debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = config::ensure_all_dirs() {
        tracing::warn!(error = %e, "Failed to create all directories");
    }

    let mut cfg = BotConfig::from_env()?;
    if let Some(port) = args.port {
        cfg.webhook.port = port;
    }
    if let Some(path) = &args.data_file {
        cfg.data_file = PathBuf::from(shellexpand::tilde(path).into_owned());
    }

    let bot = Bot::new(&cfg.token);
    let client = Arc::new(TeloxideClient::new(bot.clone(), cfg.dispatch.external_timeout));

    let store = Arc::new(DbStore::open(&cfg.data_file)?);
    let session_store = FileSessionStore::new(&cfg.sessions_dir);
    match session_store.purge_expired() {
        Ok(0) => {}
        Ok(n) => tracing::info!(purged = n, "Removed expired sessions"),
        Err(e) => tracing::warn!(error = %e, "Failed to purge expired sessions"),
    }

    // The session key defaults to the bot username.
    let username = match bot.get_me().await {
        Ok(me) => me.username().to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to get bot info");
            return Err(e.into());
        }
    };
    if !cfg.bot_id_explicit {
        cfg.dispatch.bot_id = username.clone();
    }

    let links = Arc::new(LinkTokens::new(
        &cfg.link_secret,
        cfg.dispatch.link_ttl,
        cfg.dispatch.link_base_url.clone(),
    )?);
    let registry = Arc::new(builtin_registry()?);
    let sessions = Sessions::new(Arc::new(session_store), cfg.dispatch.session_ttl);
    let ctx = Arc::new(Context::new(store, cfg.dispatch.clone(), links, registry));
    let dispatcher = Arc::new(Dispatcher::new(ctx, sessions, client));
    let timebot = TimeBot::new(bot, dispatcher);

    tracing::info!(username = %username, bot_id = %cfg.dispatch.bot_id, "Bot initialized successfully");
    println!("\n[clock] Timebot Telegram Bot");
    println!("   Bot: @{}", username);
    println!("   Data: {}", cfg.data_file.display());
    println!("   Mode: {}", if args.webhook { "webhook" } else { "polling" });

    if let Err(e) = timebot.publish_commands().await {
        tracing::warn!(error = %e, "Failed to publish command menu");
    }

    println!("\n[phone] Open Telegram and send /start to begin");
    println!("   Press Ctrl+C to stop\n");

    if args.webhook {
        timebot
            .start_webhook(&cfg.webhook, cfg.link_api_secret.clone())
            .await?;
    } else {
        timebot.start_polling().await?;
    }

    Ok(())
}
