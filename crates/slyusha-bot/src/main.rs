use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use slyusha_agent::gemini::GeminiProvider;
use slyusha_agent::pipeline::TurnRunner;
use slyusha_core::config::SlyushaConfig;
use slyusha_store::{MessageStore, StoreLimits};
use slyusha_telegram::{TelegramAdapter, TelegramApi, TelegramContext, TelegramFetcher};

#[derive(Parser)]
#[command(name = "slyusha-bot", about = "Slyusha group-chat bot")]
struct Cli {
    /// Config file (default ~/.slyusha/slyusha.toml).
    #[arg(long, env = "SLYUSHA_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "slyusha_bot=info,slyusha_agent=info,slyusha_telegram=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = SlyushaConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        SlyushaConfig::default()
    });

    let db_path = &config.store.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let conn = Connection::open(db_path)?;
    slyusha_store::db::init_db(&conn)?;
    let store = Arc::new(MessageStore::load(&conn, StoreLimits::from(&config.store))?);
    let conn = Arc::new(Mutex::new(conn));

    let provider = Arc::new(GeminiProvider::from_config(&config.model)?);
    let (bot, identity) = TelegramAdapter::connect(&config.telegram.bot_token).await?;

    let runner = Arc::new(TurnRunner::new(
        &config,
        identity,
        Arc::clone(&store),
        Arc::new(TelegramApi::new(bot.clone())),
        Arc::new(TelegramFetcher::new(bot.clone())),
        provider,
    ));
    let ctx = Arc::new(TelegramContext::new(&config, runner));
    let adapter = TelegramAdapter::new(bot, ctx);

    // periodic persistence
    let interval = Duration::from_secs(config.store.save_interval_secs.max(1));
    let saver = {
        let store = Arc::clone(&store);
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                save(&store, &conn);
            }
        })
    };

    tokio::select! {
        _ = adapter.run() => warn!("Telegram dispatcher stopped"),
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutting down");
        }
    }

    saver.abort();
    save(&store, &conn);
    Ok(())
}

fn save(store: &MessageStore, conn: &Mutex<Connection>) {
    let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
    match store.save(&conn) {
        Ok(chats) => debug!(chats, "chat states persisted"),
        Err(e) => warn!(error = %e, "failed to persist chat states"),
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
