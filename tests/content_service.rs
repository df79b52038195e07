use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;
use tempfile::TempDir;

use scrigno::application::content::ContentService;
use scrigno::application::error::ServiceError;
use scrigno::infra::attachments::AttachmentStore;
use scrigno::infra::cache::{CacheKey, ResponseCache};
use scrigno::infra::index::SearchIndexManager;
use scrigno::infra::store::{ContentRegistry, ContentStore};

struct Fixture {
    service: ContentService,
    cache: ResponseCache,
    dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("tempdir");
    let registry = ContentRegistry::new(
        vec!["article".to_string(), "page".to_string()],
        vec!["en".to_string(), "zh".to_string()],
    );
    let store =
        ContentStore::open(&dir.path().join("content.redb"), registry.clone()).expect("store");
    let index = SearchIndexManager::new(&registry).expect("index");
    let cache = ResponseCache::new(Duration::from_secs(300));
    let attachments = Arc::new(AttachmentStore::new(dir.path().join("files")).expect("files"));
    let service = ContentService::new(store, index, cache.clone(), attachments);
    Fixture {
        service,
        cache,
        dir,
    }
}

#[test]
fn created_documents_are_readable_and_searchable() {
    let fx = fixture();

    let created = fx
        .service
        .create(
            "article",
            "en",
            "",
            "Why the Borrow Checker Exists",
            Some(json!({
                "title": "Why the Borrow Checker Exists",
                "body": "aliasing and mutation do not mix"
            })),
        )
        .expect("create");
    let slug = created["slug"].as_str().expect("slug").to_string();
    assert_eq!(slug, "why-the-borrow-checker-exists");

    let read = fx.service.read("article", "en", &slug).expect("read");
    assert_eq!(read["title"], created["title"]);

    let found = fx
        .service
        .search("article", "en", "aliasing", None, None)
        .expect("search");
    assert_eq!(found.total, 1);
    assert_eq!(found.hits[0]["slug"], json!(slug));
}

#[test]
fn partitions_are_isolated_by_type_and_language() {
    let fx = fixture();

    fx.service
        .create("article", "en", "", "Shared Title", Some(json!({"title": "Shared Title"})))
        .expect("en create");
    fx.service
        .create("article", "zh", "", "Shared Title", Some(json!({"title": "Shared Title"})))
        .expect("zh create");

    // Same slug lives independently in both language partitions.
    assert!(fx.service.read("article", "en", "shared-title").is_ok());
    assert!(fx.service.read("article", "zh", "shared-title").is_ok());
    assert!(matches!(
        fx.service.read("page", "en", "shared-title"),
        Err(ServiceError::NotFound)
    ));

    let zh_only = fx
        .service
        .search("page", "en", "shared", None, None)
        .expect("search");
    assert_eq!(zh_only.total, 0);
}

#[test]
fn derived_slugs_step_past_an_explicit_one() {
    let fx = fixture();

    let explicit = fx
        .service
        .create("article", "en", "alpha", "", Some(json!({"title": "Explicit"})))
        .expect("explicit create");
    assert_eq!(explicit["slug"], json!("alpha"));

    let second = fx
        .service
        .create("article", "en", "", "Alpha", Some(json!({"title": "Derived"})))
        .expect("derived create");
    let third = fx
        .service
        .create("article", "en", "", "Alpha", Some(json!({"title": "Derived again"})))
        .expect("derived create");

    assert_eq!(second["slug"], json!("alpha-2"));
    assert_eq!(third["slug"], json!("alpha-3"));

    // A repeated explicit claim fails instead of suffixing.
    assert!(matches!(
        fx.service
            .create("article", "en", "alpha", "", Some(json!({"title": "Again"}))),
        Err(ServiceError::DuplicateSlug(s)) if s == "alpha"
    ));
}

#[test]
fn index_follows_commit_order_under_racing_updates() {
    let fx = fixture();
    fx.service
        .create("article", "en", "contended", "", Some(json!({"title": "Contended", "body": "seed"})))
        .expect("create");

    // Two writers hammer the same document. Index mutations happen inside
    // the store's write transaction, so whichever update commits last is
    // also the last one projected into the index.
    let svc = &fx.service;
    std::thread::scope(|scope| {
        for body in ["alpha rhythm", "beta rhythm"] {
            scope.spawn(move || {
                for _ in 0..10 {
                    svc.update("article", "en", "contended", Some(json!({"body": body})))
                        .expect("update");
                }
            });
        }
    });

    fx.cache
        .invalidate(&CacheKey::new("en", "article", "contended"));
    let stored = fx.service.read("article", "en", "contended").expect("read");
    let winner = stored["body"]
        .as_str()
        .and_then(|body| body.split(' ').next())
        .expect("body term");
    let loser = if winner == "alpha" { "beta" } else { "alpha" };

    let hit = fx
        .service
        .search("article", "en", winner, None, None)
        .expect("search");
    assert_eq!(hit.total, 1);
    assert_eq!(hit.hits[0]["slug"], json!("contended"));

    let miss = fx
        .service
        .search("article", "en", loser, None, None)
        .expect("search");
    assert_eq!(miss.total, 0);
}

#[test]
fn chinese_titles_produce_ascii_slugs() {
    let fx = fixture();

    let created = fx
        .service
        .create("article", "zh", "", "Rust 基础教程", Some(json!({"title": "Rust 基础教程"})))
        .expect("create");
    assert_eq!(created["slug"], json!("rust-ji-chu-jiao-cheng"));
}

#[test]
fn attachments_land_on_disk_and_lose_their_payload() {
    let fx = fixture();

    let payload = b"tiny png";
    let created = fx
        .service
        .create(
            "article",
            "en",
            "",
            "Illustrated Post",
            Some(json!({
                "title": "Illustrated Post",
                "file:cover": {
                    "name": "cover.png",
                    "size": payload.len(),
                    "bytes": BASE64.encode(payload)
                }
            })),
        )
        .expect("create");

    let field = created["file:cover"].as_object().expect("field");
    assert_eq!(field["uri"], json!("/files/article/en/1/cover.png"));
    assert!(!field.contains_key("bytes"));

    let on_disk = std::fs::read(fx.dir.path().join("files/article/en/1/cover.png"))
        .expect("materialized file");
    assert_eq!(on_disk, payload);

    // The stored copy carries the URI, not the payload.
    let read = fx.service.read("article", "en", "illustrated-post").expect("read");
    assert!(!read["file:cover"].as_object().expect("field").contains_key("bytes"));
}

#[test]
fn update_refreshes_cache_write_through() {
    let fx = fixture();

    let created = fx
        .service
        .create(
            "article",
            "en",
            "",
            "Cached Post",
            Some(json!({"title": "Cached Post", "status": "draft"})),
        )
        .expect("create");
    let created_at = created["updated_at"].as_i64().expect("timestamp");

    let key = CacheKey::new("en", "article", "cached-post");
    assert!(fx.cache.get(&key).is_some());

    fx.service
        .update("article", "en", "cached-post", Some(json!({"status": "published"})))
        .expect("update");

    // The cached copy already reflects the update, no store read needed.
    let cached = fx.cache.get(&key).expect("cached entry");
    assert_eq!(cached["status"], json!("published"));
    assert_eq!(cached["title"], json!("Cached Post"));
    assert!(cached["updated_at"].as_i64().expect("timestamp") >= created_at);

    let read = fx.service.read("article", "en", "cached-post").expect("read");
    assert_eq!(read["status"], json!("published"));
}

#[test]
fn read_populates_cache_on_miss() {
    let fx = fixture();

    fx.service
        .create("article", "en", "", "Warm Me", Some(json!({"title": "Warm Me"})))
        .expect("create");

    let key = CacheKey::new("en", "article", "warm-me");
    fx.cache.invalidate(&key);
    assert!(fx.cache.get(&key).is_none());

    fx.service.read("article", "en", "warm-me").expect("read");
    assert!(fx.cache.get(&key).is_some());
}

#[test]
fn delete_scrubs_store_index_and_cache() {
    let fx = fixture();

    fx.service
        .create("article", "en", "", "Short Lived", Some(json!({"title": "Short Lived"})))
        .expect("create");

    let removed = fx.service.delete("article", "en", "short-lived").expect("delete");
    assert_eq!(removed["status"], json!("deleted"));
    assert_eq!(removed["title"], json!("Short Lived"));

    let key = CacheKey::new("en", "article", "short-lived");
    assert!(fx.cache.get(&key).is_none());
    assert!(matches!(
        fx.service.read("article", "en", "short-lived"),
        Err(ServiceError::NotFound)
    ));
    let gone = fx
        .service
        .search("article", "en", "short", None, None)
        .expect("search");
    assert_eq!(gone.total, 0);

    // A freed slug can be claimed again.
    let recreated = fx
        .service
        .create("article", "en", "", "Short Lived", Some(json!({"title": "Second"})))
        .expect("recreate");
    assert_eq!(recreated["slug"], json!("short-lived"));
}

#[test]
fn expired_cache_entries_fall_back_to_the_store() {
    let dir = TempDir::new().expect("tempdir");
    let registry = ContentRegistry::new(vec!["article".to_string()], vec!["en".to_string()]);
    let store =
        ContentStore::open(&dir.path().join("content.redb"), registry.clone()).expect("store");
    let index = SearchIndexManager::new(&registry).expect("index");
    let cache = ResponseCache::new(Duration::from_millis(10));
    let attachments = Arc::new(AttachmentStore::new(dir.path().join("files")).expect("files"));
    let service = ContentService::new(store, index, cache.clone(), attachments);

    service
        .create("article", "en", "", "Fleeting", Some(json!({"title": "Fleeting"})))
        .expect("create");

    std::thread::sleep(Duration::from_millis(25));
    let key = CacheKey::new("en", "article", "fleeting");
    assert!(cache.get(&key).is_none());

    // The store keeps serving after expiry, repopulating the cache.
    let read = service.read("article", "en", "fleeting").expect("read");
    assert_eq!(read["title"], json!("Fleeting"));
    assert!(cache.get(&key).is_some());
}

#[test]
fn state_survives_restart_via_store_and_rebuild() {
    let dir = TempDir::new().expect("tempdir");
    let registry = ContentRegistry::new(vec!["article".to_string()], vec!["en".to_string()]);

    {
        let store =
            ContentStore::open(&dir.path().join("content.redb"), registry.clone()).expect("store");
        let index = SearchIndexManager::new(&registry).expect("index");
        let cache = ResponseCache::new(Duration::from_secs(300));
        let attachments = Arc::new(AttachmentStore::new(dir.path().join("files")).expect("files"));
        let service = ContentService::new(store, index, cache, attachments);
        service
            .create("article", "en", "", "Durable Post", Some(json!({"title": "Durable Post"})))
            .expect("create");
    }

    let store =
        ContentStore::open(&dir.path().join("content.redb"), registry.clone()).expect("reopen");
    let index = SearchIndexManager::new(&registry).expect("index");
    let cache = ResponseCache::new(Duration::from_secs(300));
    let attachments = Arc::new(AttachmentStore::new(dir.path().join("files")).expect("files"));
    let service = ContentService::new(store, index, cache, attachments);
    service.rebuild_index().expect("rebuild");

    let read = service.read("article", "en", "durable-post").expect("read");
    assert_eq!(read["title"], json!("Durable Post"));
    let found = service
        .search("article", "en", "durable", None, None)
        .expect("search");
    assert_eq!(found.total, 1);

    // Sequences continue rather than restart.
    let next = service
        .create("article", "en", "", "Another Post", Some(json!({"title": "Another Post"})))
        .expect("create");
    assert_eq!(next["id"], json!(2));
}
