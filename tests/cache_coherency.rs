//! Cache coherency at the service level: read-through population,
//! invalidate-on-write, and graceful degradation without a backend.

mod common;

use std::sync::Arc;

use common::{MemoryPhraseStore, MemorySettingsRepo, make_phrase};
use rondo::application::catalog::PhraseCatalogService;
use rondo::application::settings::{DigestSettingsService, UpdateDigestSettings};
use rondo::cache::{CacheBackend, CacheLayer, MemoryBackend};
use rondo::domain::entities::DigestSettingsRecord;

fn cache_pair() -> (CacheLayer, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    (CacheLayer::new(backend.clone() as Arc<dyn CacheBackend>), backend)
}

#[tokio::test]
async fn settings_reads_are_served_through_the_cache() {
    let repo = Arc::new(MemorySettingsRepo::with_row(DigestSettingsRecord {
        header: "*Morning phrases*".to_string(),
        ..DigestSettingsRecord::defaults()
    }));
    let (cache, _backend) = cache_pair();
    let service = DigestSettingsService::new(repo.clone(), cache);

    let first = service.get().await.unwrap();
    let second = service.get().await.unwrap();
    assert_eq!(first.header, "*Morning phrases*");
    assert_eq!(first, second);
    assert_eq!(repo.loads(), 1, "second read came from the cache");
}

#[tokio::test]
async fn missing_settings_row_resolves_to_defaults() {
    let repo = Arc::new(MemorySettingsRepo::new());
    let (cache, _backend) = cache_pair();
    let service = DigestSettingsService::new(repo, cache);

    let settings = service.get().await.unwrap();
    assert_eq!(settings, DigestSettingsRecord::defaults());
}

#[tokio::test]
async fn update_invalidates_before_acknowledging() {
    let repo = Arc::new(MemorySettingsRepo::new());
    let (cache, backend) = cache_pair();
    let service = DigestSettingsService::new(repo.clone(), cache);

    service.get().await.unwrap();
    assert!(backend.get("digest:settings").await.unwrap().is_some());

    service
        .update(UpdateDigestSettings {
            header: "*Evening phrases*".to_string(),
            show_tags: false,
            show_notes: true,
            show_replies: true,
        })
        .await
        .unwrap();

    // The stale entry is gone by the time update returns, and the next
    // read observes the new row.
    assert!(backend.get("digest:settings").await.unwrap().is_none());
    let reloaded = service.get().await.unwrap();
    assert_eq!(reloaded.header, "*Evening phrases*");
    assert!(!reloaded.show_tags);
    assert_eq!(repo.loads(), 2);
}

#[tokio::test]
async fn empty_header_update_is_rejected_and_leaves_cache_intact() {
    let repo = Arc::new(MemorySettingsRepo::new());
    let (cache, backend) = cache_pair();
    let service = DigestSettingsService::new(repo, cache);

    service.get().await.unwrap();
    let err = service
        .update(UpdateDigestSettings {
            header: "   ".to_string(),
            show_tags: true,
            show_notes: true,
            show_replies: true,
        })
        .await
        .expect_err("blank header must fail validation");
    assert!(matches!(
        err,
        rondo::application::settings::SettingsError::Domain(_)
    ));
    assert!(backend.get("digest:settings").await.unwrap().is_some());
}

#[tokio::test]
async fn settings_degrade_to_defaults_when_everything_is_down() {
    let repo = Arc::new(MemorySettingsRepo::new());
    let (cache, backend) = cache_pair();
    backend.set_available(false);
    let service = DigestSettingsService::new(repo.clone(), cache);

    // The loader still runs on every call; the cache never interferes.
    for _ in 0..2 {
        let settings = service.get_or_default().await;
        assert_eq!(settings, DigestSettingsRecord::defaults());
    }
    assert_eq!(repo.loads(), 2);
}

#[tokio::test]
async fn phrase_lookups_populate_and_invalidate_per_key() {
    let store = MemoryPhraseStore::new();
    let mut phrase = make_phrase(7);
    phrase.replies.push(common::make_reply(70, 7));
    store.insert(phrase);

    let (cache, backend) = cache_pair();
    let catalog = PhraseCatalogService::new(Arc::new(store.clone()), cache);

    let loaded = catalog.get_phrase(7).await.unwrap().expect("phrase exists");
    assert_eq!(loaded.replies.len(), 1);
    assert!(backend.get("phrase:7").await.unwrap().is_some());

    // A stale snapshot survives a store change until invalidated.
    let mut changed = make_phrase(7);
    changed.text = "updated".to_string();
    store.insert(changed);
    let cached = catalog.get_phrase(7).await.unwrap().expect("phrase exists");
    assert_eq!(cached.text, "phrase 7");

    assert!(catalog.phrases_changed(&[7]).await);
    let fresh = catalog.get_phrase(7).await.unwrap().expect("phrase exists");
    assert_eq!(fresh.text, "updated");
}

#[tokio::test]
async fn invalidating_uncached_phrases_is_a_success() {
    let (cache, _backend) = cache_pair();
    let catalog = PhraseCatalogService::new(Arc::new(MemoryPhraseStore::new()), cache);
    assert!(catalog.phrases_changed(&[404, 405]).await);
}

#[tokio::test]
async fn missing_phrase_is_not_cached_as_an_error() {
    let (cache, _backend) = cache_pair();
    let store = MemoryPhraseStore::new();
    let catalog = PhraseCatalogService::new(Arc::new(store.clone()), cache);

    assert!(catalog.get_phrase(1).await.unwrap().is_none());

    // Once the phrase appears, the earlier miss must not mask it forever:
    // the cached `None` ages out with its TTL, and an explicit change
    // notification clears it immediately.
    store.insert(make_phrase(1));
    catalog.phrases_changed(&[1]).await;
    assert!(catalog.get_phrase(1).await.unwrap().is_some());
}
