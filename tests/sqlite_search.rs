mod common;

use std::sync::Arc;
use std::time::Duration;

use edgepress::application::repos::{ContentStore, FullTextBackend};
use edgepress::application::search::{
    FullTextSearchEngine, LexicalIndexBuilder, SearchBackendError, scorer,
};
use edgepress::cache::{CacheConfig, KvStore, TAG_SEARCH, TagVersionedCache};
use edgepress::domain::types::ContentStatus;
use edgepress::infra::db::SqliteKvStore;

use common::{open_db, post};

fn kv_cache(db: &common::TestDb) -> TagVersionedCache {
    let store: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(db.repos.pool().clone()));
    TagVersionedCache::new(store, &CacheConfig::default())
}

#[tokio::test]
async fn lexical_index_is_cached_until_search_tag_is_invalidated() {
    let db = open_db().await;
    db.repos
        .save_content(&post("older", "TypeScript Guide", "types", &["ts"], 48))
        .await
        .unwrap();
    db.repos
        .save_content(&post("newer", "Rust Notes", "TypeScript mentioned", &[], 2))
        .await
        .unwrap();

    let cache = kv_cache(&db);
    let store: Arc<dyn ContentStore> = db.repos.clone();
    let builder = LexicalIndexBuilder::new(
        store,
        cache.clone(),
        &CacheConfig::default(),
        Duration::from_secs(2),
    );

    let index = builder.build_cached(500).await.unwrap();
    let slugs: Vec<_> = index.iter().map(|item| item.slug.as_str()).collect();
    assert_eq!(slugs, vec!["newer", "older"]);
    assert_eq!(index[1].tags, vec!["ts".to_string()]);
    assert_eq!(index[0].excerpt, "TypeScript mentioned");

    let ranked = scorer::search("typescript", &index, 10);
    let order: Vec<_> = ranked.iter().map(|result| result.item.slug.as_str()).collect();
    assert_eq!(order, vec!["older", "newer"]);
    let scores: Vec<_> = ranked.iter().map(|result| result.score).collect();
    assert_eq!(scores, vec![4.0, 2.0]);

    db.repos
        .save_content(&post("newest", "Fresh", "just landed", &[], 1))
        .await
        .unwrap();
    assert_eq!(builder.build_cached(500).await.unwrap().len(), 2);

    cache.invalidate(TAG_SEARCH).await;
    assert_eq!(builder.build_cached(500).await.unwrap().len(), 3);
}

#[tokio::test]
async fn fulltext_search_ranks_live_posts_only() {
    let db = open_db().await;
    db.repos
        .save_content(&post(
            "deep",
            "Caching in depth",
            "cache cache cache invalidation strategies",
            &[],
            5,
        ))
        .await
        .unwrap();
    db.repos
        .save_content(&post(
            "brief",
            "Notes",
            "a short aside about one cache",
            &[],
            4,
        ))
        .await
        .unwrap();
    let mut draft = post("draft", "Cache draft", "cache cache cache", &[], 3);
    draft.status = ContentStatus::Draft;
    db.repos.save_content(&draft).await.unwrap();
    let scheduled = post("scheduled", "Cache later", "cache", &[], -24);
    db.repos.save_content(&scheduled).await.unwrap();

    let engine = FullTextSearchEngine::new(
        db.repos.clone(),
        kv_cache(&db),
        &CacheConfig::default(),
        Duration::from_secs(2),
    );

    let results = engine.search("cach", 10).await.unwrap();
    let slugs: Vec<_> = results.iter().map(|result| result.item.slug.as_str()).collect();
    assert_eq!(slugs, vec!["deep", "brief"]);
    assert!(results[0].score <= results[1].score);
    assert!(results[0].highlight.contains("cache"));

    assert!(engine.search("\"\"", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn fulltext_cache_serves_repeat_queries_until_ttl() {
    let db = open_db().await;
    db.repos
        .save_content(&post("axum", "Axum routing", "handlers and routers", &[], 2))
        .await
        .unwrap();

    let engine = FullTextSearchEngine::new(
        db.repos.clone(),
        kv_cache(&db),
        &CacheConfig::default(),
        Duration::from_secs(2),
    );

    let first = engine.search_cached("  Axum  ", 20).await.unwrap();
    assert_eq!(first.len(), 1);

    let removed = db
        .repos
        .delete_content(db.repos.content_by_slug("axum").await.unwrap().unwrap().id)
        .await
        .unwrap();
    assert!(removed.is_some());

    // Same normalized key: still served from the KV entry.
    let cached = engine.search_cached("axum", 20).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].item.slug, first[0].item.slug);
    assert!(engine.search("axum", 20).await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_match_expression_is_an_error_not_an_empty_result() {
    let db = open_db().await;
    db.repos
        .save_content(&post("rust", "Rust notes", "ownership and borrowing", &[], 2))
        .await
        .unwrap();
    let engine = FullTextSearchEngine::new(
        db.repos.clone(),
        kv_cache(&db),
        &CacheConfig::default(),
        Duration::from_secs(2),
    );

    let err = engine
        .search("rust )", 10)
        .await
        .expect_err("a stray parenthesis is an FTS5 syntax error");
    assert!(
        matches!(err, SearchBackendError::Query { .. }),
        "unexpected error: {err}"
    );

    let direct = db.repos.match_published("rust AND", 10).await;
    assert!(direct.is_err(), "dangling AND should be rejected: {direct:?}");
}
