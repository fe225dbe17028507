//! Pure clustering engine and storage-port contracts for BattleScope.
//!
//! This crate has no `sqlx` dependency by design — `battlescope-store`
//! implements the ports defined here against Postgres, and `battlescope-core`
//! stays unit-testable with plain in-memory fakes.

pub mod clusterer;
pub mod engine;
pub mod enrichment;
pub mod error;
pub mod ingest;
pub mod ports;
pub mod ruleset;
pub mod space;
pub mod types;

pub use clusterer::{BatchStats, ClustererService};
pub use engine::{cluster, BattlePlan, ClusterOutput, ClusterParams, ParticipantPlan};
pub use enrichment::{EnrichmentSource, EnrichmentWorker};
pub use error::{CoreError, CoreErrorKind, Result};
pub use ports::{BattleSpan, BattleStore, EnrichmentStore, EventSink, KillmailStore, NullEventSink, RulesetStore};
pub use ruleset::RulesetCache;
pub use types::{
    Battle, BattleKillmail, BattleParticipant, EnrichmentStatus, KillmailEnrichment, KillmailEvent,
    Ruleset, RulesetPatch, SecurityType, SpaceType,
};
