use anyhow::anyhow;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quandary::app::moderation::QueueFilter;
use quandary::config::ClientConfig;
use quandary::domain::advice::{AdviceItem, AdviceStatus};
use quandary::infra::{
    notify::TracingNotifier,
    session::Session,
    token_store::FileTokenStore,
};
use quandary::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;

    let session = match &config.token_store_dir {
        Some(dir) => Session::restore(Arc::new(FileTokenStore::new(dir))),
        None => Session::in_memory(),
    };
    let state = AppState::new(config.clone(), Arc::new(session), Arc::new(TracingNotifier))?;
    tracing::info!(bases = ?state.gateway.policy().bases(), mode = %config.app_mode, "client ready");

    let now = OffsetDateTime::now_utc();
    match config.app_mode.as_str() {
        "feed" => {
            let items = state.advice().ranked_feed(None, now).await?;
            print_items(&items, now);
        }
        "queue" => {
            let filter = AdviceStatus::parse(&config.queue_status)
                .and_then(QueueFilter::from_status)
                .ok_or_else(|| anyhow!("invalid QUEUE_STATUS: {}", config.queue_status))?;
            let queue = state.moderation_queue();
            queue.set_filter(filter).await?;
            print_items(&queue.items(), now);
        }
        "watchlist" => {
            let follows = state.follows();
            let snapshot = follows.refresh().await?;
            print_items(&snapshot.watchlist, now);
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

fn print_items(items: &[AdviceItem], now: OffsetDateTime) {
    if items.is_empty() {
        println!("(nothing to show)");
        return;
    }
    for item in items {
        match item.boost_label(now) {
            Some(label) => println!("{}  [{}]  {}  ({})", item.id, item.status, item.title, label),
            None => println!("{}  [{}]  {}", item.id, item.status, item.title),
        }
    }
}
