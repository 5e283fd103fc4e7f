// tests/store_sqlite.rs
use chrono::{Duration, Utc};

use card_sync::listing::{ListingEntity, ListingKey};
use card_sync::store::memory::InMemoryListingRepository;
use card_sync::store::sqlite::SqliteListingRepository;
use card_sync::store::ListingRepository;

fn entity(surrogate: &str, link: &str, price: &str) -> ListingEntity {
    let t = Utc::now() - Duration::days(3);
    ListingEntity {
        surrogate_id: surrogate.into(),
        source: "gamestore".into(),
        title: format!("Sobre {surrogate}"),
        price: price.into(),
        link: link.into(),
        image_url: String::new(),
        first_seen_at: t,
        last_synced_at: t,
    }
}

fn key(link: &str) -> ListingKey {
    ListingKey {
        source: "gamestore".into(),
        link: link.into(),
    }
}

async fn sqlite() -> SqliteListingRepository {
    SqliteListingRepository::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite")
}

#[tokio::test]
async fn saving_the_same_batch_twice_is_idempotent() {
    let repo = sqlite().await;
    let batch = vec![
        entity("a", "https://www.game.es/a", "4,99 €"),
        entity("b", "https://www.game.es/b", "9,99 €"),
    ];

    let first = repo.save(&batch).await.unwrap();
    assert_eq!((first.inserted, first.updated), (2, 0));
    let a1 = repo.get(&key("https://www.game.es/a")).await.unwrap().unwrap();
    assert_eq!(a1.first_seen_at, a1.last_synced_at);

    // the stored timestamps keep sub-second precision
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = repo.save(&batch).await.unwrap();
    assert_eq!((second.inserted, second.updated), (0, 2));
    assert_eq!(repo.count().await.unwrap(), 2);

    let a2 = repo.get(&key("https://www.game.es/a")).await.unwrap().unwrap();
    assert!(a2.same_content(&a1));
    assert_eq!(a2.first_seen_at, a1.first_seen_at);
    assert!(a2.last_synced_at > a1.last_synced_at);
    assert!(a2.last_synced_at > a2.first_seen_at);
}

#[tokio::test]
async fn timestamps_come_from_save_time_not_the_entity() {
    let repo = sqlite().await;
    let e = entity("a", "https://www.game.es/a", "1 €");
    let before = Utc::now();
    repo.save(std::slice::from_ref(&e)).await.unwrap();
    let stored = repo.get(&e.key()).await.unwrap().unwrap();
    assert!(stored.first_seen_at >= before);
    assert!(stored.last_synced_at >= before);
}

#[tokio::test]
async fn dedup_uses_natural_key_not_surrogate_id() {
    let repo = sqlite().await;
    repo.save(&[entity("old-slug", "https://www.game.es/x", "5 €")])
        .await
        .unwrap();
    let s = repo
        .save(&[entity("new-slug", "https://www.game.es/x", "6 €")])
        .await
        .unwrap();
    assert_eq!((s.inserted, s.updated), (0, 1));
    assert_eq!(repo.count().await.unwrap(), 1);

    let row = repo.get(&key("https://www.game.es/x")).await.unwrap().unwrap();
    assert_eq!(row.surrogate_id, "new-slug");
    assert_eq!(row.price, "6 €");

    // Same surrogate id but different links are distinct listings.
    repo.save(&[
        entity("dup", "https://www.game.es/y", "1 €"),
        entity("dup", "https://www.game.es/z", "1 €"),
    ])
    .await
    .unwrap();
    assert_eq!(repo.count().await.unwrap(), 3);
}

#[tokio::test]
async fn duplicate_keys_in_one_batch_last_write_wins() {
    let repo = sqlite().await;
    let s = repo
        .save(&[
            entity("a", "https://www.game.es/a", "1 €"),
            entity("b", "https://www.game.es/b", "2 €"),
            entity("a2", "https://www.game.es/a", "3 €"),
        ])
        .await
        .unwrap();
    assert_eq!(s.inserted, 2);
    assert_eq!(s.collapsed, 1);
    let a = repo.get(&key("https://www.game.es/a")).await.unwrap().unwrap();
    assert_eq!(a.price, "3 €");
    assert_eq!(a.surrogate_id, "a2");
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let repo = sqlite().await;
    let s = repo.save(&[]).await.unwrap();
    assert_eq!(s.written(), 0);
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn same_link_under_another_source_is_a_separate_row() {
    let repo = sqlite().await;
    let mut other = entity("a", "https://www.game.es/a", "1 €");
    other.source = "otherstore".into();
    repo.save(&[entity("a", "https://www.game.es/a", "1 €"), other])
        .await
        .unwrap();
    assert_eq!(repo.count().await.unwrap(), 2);
}

#[tokio::test]
async fn file_backed_store_survives_reconnect() {
    let tmp = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", tmp.path().join("cards.db").display());

    let repo = SqliteListingRepository::connect(&url).await.unwrap();
    repo.save(&[entity("a", "https://www.game.es/a", "1 €")])
        .await
        .unwrap();
    let first = repo.get(&key("https://www.game.es/a")).await.unwrap().unwrap();
    repo.pool().close().await;

    let reopened = SqliteListingRepository::connect(&url).await.unwrap();
    let s = reopened
        .save(&[entity("a", "https://www.game.es/a", "2 €")])
        .await
        .unwrap();
    assert_eq!(s.updated, 1);
    let again = reopened.get(&key("https://www.game.es/a")).await.unwrap().unwrap();
    assert_eq!(again.first_seen_at, first.first_seen_at);
    assert_eq!(again.price, "2 €");
}

#[tokio::test]
async fn memory_store_matches_sqlite_semantics() {
    let mem = InMemoryListingRepository::new();
    let sql = sqlite().await;
    let batch = vec![
        entity("a", "https://www.game.es/a", "1 €"),
        entity("a-bis", "https://www.game.es/a", "2 €"),
        entity("b", "https://www.game.es/b", "3 €"),
    ];
    for _ in 0..2 {
        let m = mem.save(&batch).await.unwrap();
        let s = sql.save(&batch).await.unwrap();
        assert_eq!((m.inserted, m.updated, m.collapsed), (s.inserted, s.updated, s.collapsed));
    }
    assert_eq!(mem.count().await.unwrap(), sql.count().await.unwrap());
    let m = mem.get(&key("https://www.game.es/a")).await.unwrap().unwrap();
    let s = sql.get(&key("https://www.game.es/a")).await.unwrap().unwrap();
    assert!(m.same_content(&s));
}
