//! Postgres adapter for BattleScope's storage ports.

pub mod battle_store;
pub mod enrichment_store;
pub mod killmail_store;
pub mod pool;
pub mod ruleset_store;
pub mod sqlx_types;

pub use battle_store::PgBattleStore;
pub use enrichment_store::PgEnrichmentStore;
pub use killmail_store::PgKillmailStore;
pub use pool::connect;
pub use ruleset_store::PgRulesetStore;
