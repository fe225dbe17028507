//! Real-Postgres tests. Gated behind `#[ignore]` and a `DATABASE_URL` env
//! var — run explicitly with `cargo test -- --ignored` against a scratch
//! database, per the harness convention this workspace otherwise uses for
//! isolated test databases.

use battlescope_core::{KillmailEvent, KillmailStore};
use battlescope_store::PgKillmailStore;
use bigdecimal::BigDecimal;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;

async fn test_pool() -> sqlx::PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    pool
}

fn sample_event(killmail_id: i64) -> KillmailEvent {
    let now = Utc::now();
    KillmailEvent {
        killmail_id,
        system_id: 30000142,
        occurred_at: now,
        fetched_at: now,
        victim_alliance_id: Some(1),
        victim_corp_id: Some(2),
        victim_character_id: Some(3),
        victim_ship_type_id: Some(600),
        attacker_alliance_ids: vec![4],
        attacker_corp_ids: vec![5],
        attacker_character_ids: vec![6],
        isk_value: BigDecimal::from(1_000_000),
        zkb_url: format!("https://zkillboard.com/kill/{killmail_id}/"),
        processed_at: None,
        battle_id: None,
    }
}

#[tokio::test]
#[ignore]
async fn insert_then_duplicate_is_rejected() {
    let pool = test_pool().await;
    let store = PgKillmailStore::new(pool);

    store.insert(sample_event(900001)).await.unwrap();
    let err = store.insert(sample_event(900001)).await.unwrap_err();
    assert_eq!(err.kind(), battlescope_core::CoreErrorKind::Duplicate);
}

#[tokio::test]
#[ignore]
async fn fetch_unprocessed_respects_cutoff() {
    let pool = test_pool().await;
    let store = PgKillmailStore::new(pool);

    store.insert(sample_event(900002)).await.unwrap();
    let far_past = Utc::now() - chrono::Duration::days(365);
    let due = store.fetch_unprocessed(10, far_past).await.unwrap();
    assert!(due.iter().all(|e| e.killmail_id != 900002));

    let now = Utc::now();
    let due = store.fetch_unprocessed(10, now).await.unwrap();
    assert!(due.iter().any(|e| e.killmail_id == 900002));
}
