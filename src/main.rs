//! BattleScope — killmail ingestion, battle clustering, and enrichment
//! service.
//!
//! Reads config from environment (see `settings::Settings`); the important
//! one is `DATABASE_URL`. A `.env` file is loaded if present.

mod enrichment_source;
mod feed;
mod settings;

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use battlescope_core::ingest::validate;
use battlescope_core::{
    ClustererService, CoreErrorKind, EnrichmentStore, EnrichmentWorker, EventSink, KillmailStore,
    NullEventSink, Ruleset, RulesetCache,
};
use battlescope_store::{connect, PgBattleStore, PgEnrichmentStore, PgKillmailStore, PgRulesetStore};

use enrichment_source::HttpEnrichmentSource;
use feed::FeedClient;
use settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,battlescope=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();

    tracing::info!("connecting to database");
    let pool = connect(&settings.database_url, settings.max_connections).await?;

    let ruleset_cache = Arc::new(RulesetCache::new(Ruleset::default()));
    ruleset_cache
        .refresh(&PgRulesetStore::new(pool.clone()))
        .await?;

    let event_sink: Arc<dyn EventSink> = Arc::new(NullEventSink);

    let ingestion = tokio::spawn(run_ingestion_loop(settings.clone(), pool.clone(), event_sink.clone()));
    let enrichment = tokio::spawn(run_enrichment_loop(settings.clone(), pool.clone(), event_sink.clone()));
    let clusterer = tokio::spawn(run_clusterer_loop(settings, pool, ruleset_cache, event_sink));

    let _ = tokio::join!(ingestion, enrichment, clusterer);
    Ok(())
}

/// Long-polls the inbound feed, validating and storing each killmail, then
/// enqueueing it for enrichment. Runs forever.
async fn run_ingestion_loop(settings: Settings, pool: sqlx::PgPool, event_sink: Arc<dyn EventSink>) {
    let feed = FeedClient::new(settings.feed_url.clone(), settings.feed_min_poll_interval);
    let killmail_store = PgKillmailStore::new(pool.clone());
    let enrichment_store = PgEnrichmentStore::new(pool);

    feed.run(move |raw| {
        let killmail_store = &killmail_store;
        let enrichment_store = &enrichment_store;
        let event_sink = &event_sink;
        async move {
            let event = match validate(raw, chrono::Utc::now()) {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "rejected malformed killmail");
                    return;
                }
            };
            let killmail_id = event.killmail_id;
            match killmail_store.insert(event).await {
                Ok(()) => {
                    event_sink.killmail_received(killmail_id);
                    if let Err(err) = enrichment_store.ensure_pending(killmail_id).await {
                        tracing::warn!(killmail_id, error = %err, "failed to enqueue enrichment");
                    }
                }
                Err(err) if err.kind() == CoreErrorKind::Duplicate => {
                    tracing::trace!(killmail_id, "duplicate killmail ignored");
                }
                Err(err) => {
                    tracing::warn!(killmail_id, error = %err, "failed to store killmail");
                }
            }
        }
    })
    .await;
}

/// Ticks the enrichment worker on `settings.enrichment_tick_interval`.
async fn run_enrichment_loop(settings: Settings, pool: sqlx::PgPool, event_sink: Arc<dyn EventSink>) {
    let source = HttpEnrichmentSource::new(settings.enrichment_source_url.clone());
    let worker = EnrichmentWorker::new(
        PgEnrichmentStore::new(pool),
        source,
        event_sink,
        settings.enrichment_batch_size,
        settings.enrichment_min_call_interval,
    );

    let mut interval = tokio::time::interval(settings.enrichment_tick_interval);
    loop {
        interval.tick().await;
        match worker.run_once().await {
            Ok(n) => tracing::debug!(succeeded = n, "enrichment tick complete"),
            Err(err) => tracing::error!(error = %err, "enrichment tick failed"),
        }
    }
}

/// Ticks the clustering batch on `settings.clusterer_tick_interval`.
async fn run_clusterer_loop(
    settings: Settings,
    pool: sqlx::PgPool,
    ruleset_cache: Arc<RulesetCache>,
    event_sink: Arc<dyn EventSink>,
) {
    let service = ClustererService::new(
        PgKillmailStore::new(pool.clone()),
        PgBattleStore::new(pool.clone()),
        PgRulesetStore::new(pool),
        ruleset_cache,
        event_sink,
        settings.cluster_params,
        chrono::Duration::from_std(settings.processing_delay).expect("processing delay fits in chrono::Duration"),
        settings.clusterer_batch_size,
    );

    let mut interval = tokio::time::interval(settings.clusterer_tick_interval);
    loop {
        interval.tick().await;
        match service.run_once(chrono::Utc::now()).await {
            Ok(stats) => tracing::info!(?stats, "clusterer tick complete"),
            Err(err) => tracing::error!(error = %err, "clusterer tick failed"),
        }
    }
}
