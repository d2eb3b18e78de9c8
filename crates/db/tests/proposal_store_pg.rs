//! PostgreSQL store tests.
//!
//! These need a reachable `DATABASE_URL` and are ignored by default:
//! `cargo test -p tribunal-db -- --ignored`.

use assert_matches::assert_matches;
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tribunal_core::blocks::{build_blocks, BlockType, NewBlock};
use tribunal_core::proposal::{
    AuthorSnapshot, Category, Proposal, ProposalPatch, ProposalStatus, ProposalTimestamps, Votes,
};
use tribunal_core::types::{new_id, EntityId};
use tribunal_db::repositories::IntegrationRunRepo;
use tribunal_db::store::{PgProposalStore, ProposalFilter, ProposalStore, StoreError};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn draft(author_id: &str, title: &str) -> Proposal {
    Proposal {
        id: new_id(),
        title: title.to_string(),
        description: "Subtitulo".to_string(),
        category: Category::Theoretical,
        target_level: 3,
        target_proposal_id: None,
        content: build_blocks(vec![
            NewBlock {
                block_type: BlockType::Heading,
                content: json!(title),
                metadata: None,
            },
            NewBlock {
                block_type: BlockType::Subheading,
                content: json!("Subtitulo"),
                metadata: None,
            },
        ]),
        author: AuthorSnapshot {
            id: author_id.to_string(),
            name: "Autor".to_string(),
            email: format!("{author_id}@tribunal.dev"),
            level: 5,
        },
        status: ProposalStatus::Draft,
        timestamps: ProposalTimestamps::created(Utc::now()),
        rejection_reason: None,
        votes: Votes::default(),
        version: 1,
    }
}

// ---------------------------------------------------------------------------
// Test: create / get round trip
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_create_and_get(pool: PgPool) {
    let store = PgProposalStore::new(pool);
    let created = store.create(draft("a", "Optica")).await.unwrap();
    assert_eq!(created.version, 1);

    let fetched = store.get(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.title, "Optica");
    assert_eq!(fetched.content, created.content);
    assert_eq!(fetched.author, created.author);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_id_is_rejected(pool: PgPool) {
    let store = PgProposalStore::new(pool);
    let p = draft("a", "Optica");
    store.create(p.clone()).await.unwrap();
    assert_matches!(store.create(p).await, Err(StoreError::Duplicate(_)));
}

// ---------------------------------------------------------------------------
// Test: versioned writes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_stale_update_conflicts(pool: PgPool) {
    let store = PgProposalStore::new(pool);
    let created = store.create(draft("a", "Optica")).await.unwrap();

    let patch = ProposalPatch {
        title: Some("Ondas".to_string()),
        ..Default::default()
    };
    let updated = store.update(created.id, &patch, Some(1)).await.unwrap();
    assert_eq!(updated.version, 2);

    let stale = store.update(created.id, &patch, Some(1)).await;
    assert_matches!(
        stale,
        Err(StoreError::VersionConflict { expected: 1, actual: 2, .. })
    );

    let mut replaced = updated.clone();
    replaced.status = ProposalStatus::Pending;
    assert_matches!(
        store.save(&replaced, Some(1)).await,
        Err(StoreError::VersionConflict { .. })
    );
    let saved = store.save(&replaced, Some(2)).await.unwrap();
    assert_eq!(saved.version, 3);
    assert_eq!(saved.status, ProposalStatus::Pending);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_save_missing_is_not_found(pool: PgPool) {
    let store = PgProposalStore::new(pool);
    let ghost = draft("a", "Fantasma");
    assert_matches!(store.save(&ghost, None).await, Err(StoreError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Test: list and delete
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_list_filters_in_insertion_order(pool: PgPool) {
    let store = PgProposalStore::new(pool);
    let one = store.create(draft("a", "Uno")).await.unwrap();
    let two = store.create(draft("b", "Dos")).await.unwrap();
    let three = store.create(draft("a", "Tres")).await.unwrap();

    let all = store.list(&ProposalFilter::default()).await.unwrap();
    let ids: Vec<EntityId> = all.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![one.id, two.id, three.id]);

    let by_a = store
        .list(&ProposalFilter {
            status: Some(ProposalStatus::Draft),
            author_id: Some("a".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(by_a.len(), 2);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_is_idempotent(pool: PgPool) {
    let store = PgProposalStore::new(pool);
    let created = store.create(draft("a", "Uno")).await.unwrap();
    assert!(store.delete(created.id).await.unwrap());
    assert!(!store.delete(created.id).await.unwrap());
    assert!(store.get(created.id).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Test: integration run rows
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_integration_run_upsert(pool: PgPool) {
    let id = new_id();
    IntegrationRunRepo::upsert(&pool, id, "running", &json!({"attempts": 1}))
        .await
        .unwrap();
    IntegrationRunRepo::upsert(&pool, id, "completed", &json!({"attempts": 2}))
        .await
        .unwrap();

    let row = IntegrationRunRepo::find_by_proposal(&pool, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, "completed");
    assert_eq!(row.run["attempts"], 2);
}
