//! Storage port traits — implemented against Postgres by `battlescope-store`.
//! The clustering core depends only on these traits, never on `sqlx` itself,
//! so `ClustererService`/`EnrichmentWorker` are unit-testable against
//! in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::BattlePlan;
use crate::error::Result;
use crate::types::{KillmailEnrichment, KillmailEvent, Ruleset, RulesetPatch};

#[async_trait]
pub trait KillmailStore: Send + Sync {
    /// Durable append. Returns `CoreError::Duplicate` if `killmail_id` is
    /// already present — never overwrites.
    async fn insert(&self, event: KillmailEvent) -> Result<()>;

    /// Up to `limit` events where `processed_at IS NULL` and
    /// `occurred_at <= max_occurred_at`, ordered by `(occurred_at,
    /// killmail_id)` ascending.
    async fn fetch_unprocessed(
        &self,
        limit: i64,
        max_occurred_at: DateTime<Utc>,
    ) -> Result<Vec<KillmailEvent>>;

    /// All events in `system_id` within `[window_start, window_end]`,
    /// regardless of `processed_at`, ordered by `occurred_at`. Used by
    /// retroactive attribution.
    async fn fetch_recent_for_backfill(
        &self,
        system_id: i64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<KillmailEvent>>;

    /// Sets `processed_at = now()` and `battle_id` atomically for the given
    /// ids. Idempotent.
    async fn mark_processed(&self, killmail_ids: &[i64], battle_id: Option<Uuid>) -> Result<()>;
}

#[async_trait]
pub trait EnrichmentStore: Send + Sync {
    /// Upsert a `pending` row; a no-op if one already exists in `failed`
    /// (the only terminal-but-retryable state).
    async fn ensure_pending(&self, killmail_id: i64) -> Result<()>;

    async fn mark_processing(&self, killmail_id: i64) -> Result<()>;

    async fn mark_succeeded(&self, killmail_id: i64, payload: serde_json::Value) -> Result<()>;

    async fn mark_failed(&self, killmail_id: i64, error: &str) -> Result<()>;

    async fn get(&self, killmail_id: i64) -> Result<Option<KillmailEnrichment>>;

    /// Killmails whose enrichment is `pending` or retryable `failed`, oldest
    /// first, bounded by `limit`.
    async fn fetch_due(&self, limit: i64) -> Result<Vec<i64>>;
}

/// A candidate existing battle for retroactive attribution — just enough of
/// `Battle` for the clusterer's span check, avoiding a full row fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BattleSpan {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[async_trait]
pub trait BattleStore: Send + Sync {
    /// Persist a newly clustered battle plan (membership + participants) in
    /// one transaction. Returns the assigned battle id (the plan's own
    /// `Uuid`, echoed back for caller convenience).
    async fn create_battle(&self, plan: &BattlePlan) -> Result<Uuid>;

    /// Existing battles in `system_id` whose `[start_time, end_time]` span,
    /// expanded by `delta`, could admit a killmail at `occurred_at` — i.e.
    /// `start_time - delta <= occurred_at <= end_time + delta`. Ordered by
    /// nearest `end_time` first.
    async fn find_attribution_candidates(
        &self,
        system_id: i64,
        occurred_at: DateTime<Utc>,
        delta_minutes: i64,
    ) -> Result<Vec<BattleSpan>>;

    /// Attach one killmail to an existing battle: insert the membership row,
    /// extend `start_time`/`end_time` if needed, bump `total_kills`/
    /// `total_isk_destroyed`, and upsert participants — all atomically, under
    /// a row lock on the battle.
    async fn append_killmail(
        &self,
        battle_id: Uuid,
        event: &KillmailEvent,
        window_minutes: i64,
    ) -> Result<()>;
}

#[async_trait]
pub trait RulesetStore: Send + Sync {
    async fn get(&self) -> Result<Ruleset>;
    async fn update(&self, patch: RulesetPatch) -> Result<Ruleset>;
}

/// Outbound event bus — optional; if none is configured, the core keeps
/// running against a no-op sink. Modelled as an injectable sink so the
/// clusterer/ingestion code never branches on whether a real broker is
/// configured.
pub trait EventSink: Send + Sync {
    fn killmail_received(&self, killmail_id: i64);
    fn killmail_enriched(&self, killmail_id: i64);
    fn battle_detected(&self, battle_id: Uuid);
    fn battle_updated(&self, battle_id: Uuid);
}

/// Default sink used when no real event bus is configured.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn killmail_received(&self, killmail_id: i64) {
        tracing::trace!(killmail_id, "killmail.received (no event bus configured)");
    }

    fn killmail_enriched(&self, killmail_id: i64) {
        tracing::trace!(killmail_id, "killmail.enriched (no event bus configured)");
    }

    fn battle_detected(&self, battle_id: Uuid) {
        tracing::trace!(%battle_id, "battle.detected (no event bus configured)");
    }

    fn battle_updated(&self, battle_id: Uuid) {
        tracing::trace!(%battle_id, "battle.updated (no event bus configured)");
    }
}
