//! Integration tests for the SQLite stores using an in-memory database

use chrono::{DateTime, Duration, TimeZone, Utc};

use vaultsync_core::domain::{
    BlobId, BlobRecord, BlobStatus, Cursor, DeviceId, ItemId, OpType, QuotaDelta, QuotaLimits,
    SyncItemInput, SyncSession, UserId,
};
use vaultsync_store::{
    AppendOutcome, BlobMetaStore, DatabasePool, ItemStore, KeyringStore, OplogStore, QuotaStore,
    SessionStore, UpsertOutcome,
};

async fn pool() -> DatabasePool {
    DatabasePool::in_memory()
        .await
        .expect("in-memory pool should initialize")
}

fn user() -> UserId {
    UserId::new("user-1").unwrap()
}

fn device(id: &str) -> DeviceId {
    DeviceId::new(id).unwrap()
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + secs, 0).single().unwrap()
}

fn upsert_input(item_id: &str, op_seq: i64, size: i64, updated_at: DateTime<Utc>) -> SyncItemInput {
    SyncItemInput {
        item_id: item_id.into(),
        item_type: "note".into(),
        schema_version: 1,
        payload_enc: Some("ciphertext".into()),
        payload_ref: None,
        meta_plain: None,
        payload_size: Some(size),
        updated_at,
        deleted_at: None,
        op_seq,
        op_hash: format!("hash-{item_id}-{op_seq}"),
        op_type: OpType::Upsert,
    }
}

fn delete_input(item_id: &str, op_seq: i64, updated_at: DateTime<Utc>) -> SyncItemInput {
    SyncItemInput {
        op_type: OpType::Delete,
        payload_enc: None,
        payload_size: None,
        ..upsert_input(item_id, op_seq, 0, updated_at)
    }
}

// --- oplog ---

#[tokio::test]
async fn append_assigns_increasing_cursors() {
    let pool = pool().await;
    let oplog = OplogStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    let first = oplog.append(&user, &dev, &upsert_input("n1", 1, 10, ts(0))).await.unwrap();
    let second = oplog.append(&user, &dev, &upsert_input("n2", 2, 10, ts(1))).await.unwrap();

    let AppendOutcome::Applied(c1) = first else {
        panic!("expected applied, got {first:?}")
    };
    let AppendOutcome::Applied(c2) = second else {
        panic!("expected applied, got {second:?}")
    };
    assert!(c2 > c1);
    assert_eq!(oplog.head_cursor(&user).await.unwrap(), c2);
}

#[tokio::test]
async fn append_is_idempotent_per_device_seq() {
    let pool = pool().await;
    let oplog = OplogStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));
    let item = upsert_input("n1", 1, 10, ts(0));

    assert!(matches!(
        oplog.append(&user, &dev, &item).await.unwrap(),
        AppendOutcome::Applied(_)
    ));
    // Exact retransmit consumes no cursor
    assert_eq!(
        oplog.append(&user, &dev, &item).await.unwrap(),
        AppendOutcome::Duplicate
    );
    assert_eq!(oplog.head_cursor(&user).await.unwrap(), Cursor::new(1));

    // Same key, different content
    let mut reused = upsert_input("n1", 1, 10, ts(5));
    reused.op_hash = "different".into();
    assert_eq!(
        oplog.append(&user, &dev, &reused).await.unwrap(),
        AppendOutcome::HashMismatch
    );
}

#[tokio::test]
async fn stored_hash_reports_the_recorded_fingerprint() {
    let pool = pool().await;
    let oplog = OplogStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    assert!(oplog.stored_hash(&user, &dev, 1).await.unwrap().is_none());

    let item = upsert_input("n1", 1, 10, ts(0));
    oplog.append(&user, &dev, &item).await.unwrap();

    assert_eq!(
        oplog.stored_hash(&user, &dev, 1).await.unwrap().as_deref(),
        Some(item.op_hash.as_str())
    );
    // Other devices' keys are independent
    assert!(oplog
        .stored_hash(&user, &device("device-b"), 1)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn same_seq_different_devices_both_apply() {
    let pool = pool().await;
    let oplog = OplogStore::new(pool.pool().clone());
    let user = user();

    assert!(matches!(
        oplog
            .append(&user, &device("device-a"), &upsert_input("n1", 1, 10, ts(0)))
            .await
            .unwrap(),
        AppendOutcome::Applied(_)
    ));
    assert!(matches!(
        oplog
            .append(&user, &device("device-b"), &upsert_input("n2", 1, 10, ts(1)))
            .await
            .unwrap(),
        AppendOutcome::Applied(_)
    ));
}

#[tokio::test]
async fn range_pages_in_cursor_order() {
    let pool = pool().await;
    let oplog = OplogStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    for seq in 1..=5 {
        oplog
            .append(&user, &dev, &upsert_input(&format!("n{seq}"), seq, 10, ts(seq)))
            .await
            .unwrap();
    }

    let page = oplog.range(&user, Cursor::ORIGIN, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].cursor, Cursor::new(1));
    assert_eq!(page[1].cursor, Cursor::new(2));

    let rest = oplog.range(&user, page[1].cursor, 100).await.unwrap();
    assert_eq!(rest.len(), 3);
    assert_eq!(rest[0].cursor, Cursor::new(3));

    // Zero limit is clamped up to one
    let one = oplog.range(&user, Cursor::ORIGIN, 0).await.unwrap();
    assert_eq!(one.len(), 1);
}

#[tokio::test]
async fn range_is_scoped_per_user() {
    let pool = pool().await;
    let oplog = OplogStore::new(pool.pool().clone());
    let dev = device("device-a");
    let alice = UserId::new("alice").unwrap();
    let bob = UserId::new("bob").unwrap();

    oplog.append(&alice, &dev, &upsert_input("n1", 1, 10, ts(0))).await.unwrap();
    oplog.append(&bob, &dev, &upsert_input("n1", 1, 10, ts(0))).await.unwrap();

    let entries = oplog.range(&alice, Cursor::ORIGIN, 100).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(oplog.head_cursor(&bob).await.unwrap(), Cursor::new(2));
}

// --- items ---

#[tokio::test]
async fn apply_reports_deltas_through_item_lifecycle() {
    let pool = pool().await;
    let items = ItemStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    // New item: +size, +1 object
    let outcome = items.apply(&user, &dev, &upsert_input("n1", 1, 10, ts(0))).await.unwrap();
    let UpsertOutcome::Applied { delta } = outcome else {
        panic!("expected applied")
    };
    assert_eq!(delta, QuotaDelta::new(10, 1));

    // Resize 10 -> 15: +5, no object change
    let outcome = items.apply(&user, &dev, &upsert_input("n1", 2, 15, ts(1))).await.unwrap();
    let UpsertOutcome::Applied { delta } = outcome else {
        panic!("expected applied")
    };
    assert_eq!(delta, QuotaDelta::new(5, 0));

    // Delete: -15, -1
    let outcome = items.apply(&user, &dev, &delete_input("n1", 3, ts(2))).await.unwrap();
    let UpsertOutcome::Applied { delta } = outcome else {
        panic!("expected applied")
    };
    assert_eq!(delta, QuotaDelta::new(-15, -1));

    // Delete of the tombstone: zero delta
    let outcome = items.apply(&user, &dev, &delete_input("n1", 4, ts(3))).await.unwrap();
    let UpsertOutcome::Applied { delta } = outcome else {
        panic!("expected applied")
    };
    assert!(delta.is_zero());

    // Revive: counts as a new object again
    let outcome = items.apply(&user, &dev, &upsert_input("n1", 5, 7, ts(4))).await.unwrap();
    let UpsertOutcome::Applied { delta } = outcome else {
        panic!("expected applied")
    };
    assert_eq!(delta, QuotaDelta::new(7, 1));
}

#[tokio::test]
async fn stale_write_reports_conflict_and_leaves_row() {
    let pool = pool().await;
    let items = ItemStore::new(pool.pool().clone());
    let user = user();

    items
        .apply(&user, &device("device-b"), &upsert_input("n1", 1, 10, ts(100)))
        .await
        .unwrap();

    let outcome = items
        .apply(&user, &device("device-a"), &upsert_input("n1", 1, 20, ts(50)))
        .await
        .unwrap();
    let UpsertOutcome::Conflict(info) = outcome else {
        panic!("expected conflict")
    };
    assert_eq!(info.item_id, ItemId::new("n1"));
    assert_eq!(info.server_updated_at, ts(100));
    assert_eq!(info.server_device_id, Some(device("device-b")));

    let rows = items.fetch_many(&user, &[ItemId::new("n1")]).await.unwrap();
    assert_eq!(rows[0].payload_size, Some(10));
    assert_eq!(rows[0].device_id, Some(device("device-b")));
}

#[tokio::test]
async fn equal_timestamps_break_ties_on_device_id() {
    let pool = pool().await;
    let items = ItemStore::new(pool.pool().clone());
    let user = user();
    let at = ts(100);

    items
        .apply(&user, &device("device-b"), &upsert_input("n1", 1, 10, at))
        .await
        .unwrap();

    // Lexicographically smaller device loses the tie
    assert!(matches!(
        items
            .apply(&user, &device("device-a"), &upsert_input("n1", 1, 20, at))
            .await
            .unwrap(),
        UpsertOutcome::Conflict(_)
    ));
    // Larger device wins it
    assert!(matches!(
        items
            .apply(&user, &device("device-c"), &upsert_input("n1", 1, 20, at))
            .await
            .unwrap(),
        UpsertOutcome::Applied { .. }
    ));
}

#[tokio::test]
async fn delete_tombstones_with_operation_timestamp() {
    let pool = pool().await;
    let items = ItemStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    items.apply(&user, &dev, &upsert_input("n1", 1, 10, ts(0))).await.unwrap();
    items.apply(&user, &dev, &delete_input("n1", 2, ts(5))).await.unwrap();

    let rows = items.fetch_many(&user, &[ItemId::new("n1")]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].deleted_at, Some(ts(5)));
    assert!(!rows[0].is_live());
}

#[tokio::test]
async fn get_head_summarizes_the_stored_row() {
    let pool = pool().await;
    let items = ItemStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    assert!(items
        .get_head(&user, &ItemId::new("n1"))
        .await
        .unwrap()
        .is_none());

    items.apply(&user, &dev, &upsert_input("n1", 1, 10, ts(0))).await.unwrap();
    let head = items.get_head(&user, &ItemId::new("n1")).await.unwrap().unwrap();
    assert!(head.is_live());
    assert_eq!(head.accounted_size(), 10);
    assert_eq!(head.device_id, Some(dev.clone()));

    items.apply(&user, &dev, &delete_input("n1", 2, ts(1))).await.unwrap();
    let head = items.get_head(&user, &ItemId::new("n1")).await.unwrap().unwrap();
    assert!(!head.is_live());
    assert_eq!(head.accounted_size(), 0);
}

#[tokio::test]
async fn fetch_many_roundtrips_meta_plain() {
    let pool = pool().await;
    let items = ItemStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    let mut input = upsert_input("n1", 1, 10, ts(0));
    input.meta_plain = Some(serde_json::json!({"title": "groceries", "pinned": true}));
    items.apply(&user, &dev, &input).await.unwrap();

    let rows = items.fetch_many(&user, &[ItemId::new("n1")]).await.unwrap();
    assert_eq!(
        rows[0].meta_plain,
        Some(serde_json::json!({"title": "groceries", "pinned": true}))
    );

    assert!(items.fetch_many(&user, &[]).await.unwrap().is_empty());
}

// --- quota ---

#[tokio::test]
async fn quota_initializes_with_defaults_and_reconciles_devices() {
    let pool = pool().await;
    let quota = QuotaStore::new(pool.pool().clone());
    let user = user();
    let defaults = QuotaLimits::default();

    let info = quota.get_or_init(&user, 2, &defaults).await.unwrap();
    assert_eq!(info.limits, defaults);
    assert_eq!(info.usage.used_storage_bytes, 0);
    assert_eq!(info.usage.used_devices, 2);

    // Device count follows the registry, not a stored delta
    let info = quota.get_or_init(&user, 3, &defaults).await.unwrap();
    assert_eq!(info.usage.used_devices, 3);
}

#[tokio::test]
async fn quota_delta_accumulates_and_clamps_at_zero() {
    let pool = pool().await;
    let quota = QuotaStore::new(pool.pool().clone());
    let user = user();
    let defaults = QuotaLimits::default();

    quota.get_or_init(&user, 1, &defaults).await.unwrap();
    quota.apply_delta(&user, QuotaDelta::new(100, 2)).await.unwrap();
    quota.apply_delta(&user, QuotaDelta::new(-30, -1)).await.unwrap();

    let info = quota.get_or_init(&user, 1, &defaults).await.unwrap();
    assert_eq!(info.usage.used_storage_bytes, 70);
    assert_eq!(info.usage.used_objects, 1);

    // Replayed delete cannot drive usage negative
    quota.apply_delta(&user, QuotaDelta::new(-500, -10)).await.unwrap();
    let info = quota.get_or_init(&user, 1, &defaults).await.unwrap();
    assert_eq!(info.usage.used_storage_bytes, 0);
    assert_eq!(info.usage.used_objects, 0);
}

#[tokio::test]
async fn set_limits_overwrites_without_touching_usage() {
    let pool = pool().await;
    let quota = QuotaStore::new(pool.pool().clone());
    let user = user();
    let defaults = QuotaLimits::default();

    quota.get_or_init(&user, 1, &defaults).await.unwrap();
    quota.apply_delta(&user, QuotaDelta::new(42, 1)).await.unwrap();

    let bigger = QuotaLimits {
        storage_limit_bytes: 10 * 1024 * 1024 * 1024,
        ..defaults
    };
    quota.set_limits(&user, &bigger).await.unwrap();

    let info = quota.get_or_init(&user, 1, &defaults).await.unwrap();
    assert_eq!(info.limits.storage_limit_bytes, 10 * 1024 * 1024 * 1024);
    assert_eq!(info.usage.used_storage_bytes, 42);
}

// --- sessions ---

#[tokio::test]
async fn session_upsert_replaces_previous_token() {
    let pool = pool().await;
    let sessions = SessionStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    let mut session = SyncSession {
        user_id: user.clone(),
        device_id: dev.clone(),
        sync_token: "token-1".into(),
        expires_at: ts(0) + Duration::days(7),
        last_cursor: Cursor::ORIGIN,
    };
    sessions.upsert(&session).await.unwrap();

    session.sync_token = "token-2".into();
    session.last_cursor = Cursor::new(9);
    sessions.upsert(&session).await.unwrap();

    let loaded = sessions.get(&user, &dev).await.unwrap().unwrap();
    assert_eq!(loaded.sync_token, "token-2");
    assert_eq!(loaded.last_cursor, Cursor::new(9));
}

#[tokio::test]
async fn session_cursor_never_regresses() {
    let pool = pool().await;
    let sessions = SessionStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    sessions
        .upsert(&SyncSession {
            user_id: user.clone(),
            device_id: dev.clone(),
            sync_token: "token".into(),
            expires_at: ts(0) + Duration::days(7),
            last_cursor: Cursor::new(5),
        })
        .await
        .unwrap();

    sessions.advance_cursor(&user, &dev, Cursor::new(8)).await.unwrap();
    sessions.advance_cursor(&user, &dev, Cursor::new(3)).await.unwrap();

    let loaded = sessions.get(&user, &dev).await.unwrap().unwrap();
    assert_eq!(loaded.last_cursor, Cursor::new(8));
}

#[tokio::test]
async fn missing_session_returns_none() {
    let pool = pool().await;
    let sessions = SessionStore::new(pool.pool().clone());
    assert!(sessions.get(&user(), &device("device-a")).await.unwrap().is_none());
}

// --- blobs ---

#[tokio::test]
async fn blob_metadata_roundtrips() {
    let pool = pool().await;
    let blobs = BlobMetaStore::new(pool.pool().clone());
    let user = user();

    let record = BlobRecord {
        blob_id: BlobId::new(),
        object_key: format!("{}/{}", user, BlobId::new()),
        sha256: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824".into(),
        size_bytes: 5,
        content_type: Some("application/octet-stream".into()),
        created_at: ts(0),
        status: BlobStatus::Ready,
    };
    blobs.insert(&user, &record).await.unwrap();

    let loaded = blobs.get(&user, &record.blob_id).await.unwrap().unwrap();
    assert_eq!(loaded.object_key, record.object_key);
    assert_eq!(loaded.sha256, record.sha256);
    assert_eq!(loaded.size_bytes, 5);
    assert_eq!(loaded.status, BlobStatus::Ready);

    // Unknown blob, and blobs of other users, are absent
    assert!(blobs.get(&user, &BlobId::new()).await.unwrap().is_none());
    let other = UserId::new("user-2").unwrap();
    assert!(blobs.get(&other, &record.blob_id).await.unwrap().is_none());
}

// --- keyring ---

#[tokio::test]
async fn keyring_register_preserves_recovery_hash_on_reregister() {
    let pool = pool().await;
    let keyring = KeyringStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    keyring
        .register(&user, &dev, "master", "wrapped-v1", Some("recovery-hash"))
        .await
        .unwrap();

    // Reinstall re-registers without a recovery hash
    keyring
        .register(&user, &dev, "master", "wrapped-v2", None)
        .await
        .unwrap();

    let entry = keyring.get(&user, &dev, "master").await.unwrap().unwrap();
    assert_eq!(entry.encrypted_key, "wrapped-v2");
    assert_eq!(entry.recovery_code_hash.as_deref(), Some("recovery-hash"));
    assert!(entry.rotated_at.is_none());
}

#[tokio::test]
async fn keyring_rotate_stamps_timestamp_and_requires_existing_key() {
    let pool = pool().await;
    let keyring = KeyringStore::new(pool.pool().clone());
    let (user, dev) = (user(), device("device-a"));

    assert!(!keyring
        .rotate(&user, &dev, "master", "wrapped-v2", None)
        .await
        .unwrap());

    keyring
        .register(&user, &dev, "master", "wrapped-v1", Some("recovery-hash"))
        .await
        .unwrap();
    assert!(keyring
        .rotate(&user, &dev, "master", "wrapped-v2", None)
        .await
        .unwrap());

    let entry = keyring.get(&user, &dev, "master").await.unwrap().unwrap();
    assert_eq!(entry.encrypted_key, "wrapped-v2");
    assert_eq!(entry.recovery_code_hash.as_deref(), Some("recovery-hash"));
    assert!(entry.rotated_at.is_some());
}
