//! The sync protocol coordinator
//!
//! Owns the order of operations for every protocol call and nothing else:
//! persistence lives in `vaultsync-store`, object bytes behind the
//! `ObjectStore` port, device enrollment behind `DeviceRegistry`. The
//! engine is stateless between calls; any instance can serve any request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use vaultsync_blob::sha256_hex;
use vaultsync_core::config::EngineConfig;
use vaultsync_core::domain::{
    candidate_wins, BlobId, BlobRecord, BlobStatus, Cursor, DeviceId, ItemId, KeyringEntry,
    OpType, QuotaDelta, QuotaInfo, SyncItemInput, SyncSession, UserId,
};
use vaultsync_core::ports::{DeviceRegistry, ObjectStore};
use vaultsync_core::{SyncError, SyncResult};
use vaultsync_store::{
    AppendOutcome, BlobMetaStore, DatabasePool, ItemHead, ItemStore, KeyringStore, OplogStore,
    QuotaStore, SessionStore, StoreError, UpsertOutcome,
};

use crate::messages::{
    BlobDownload, BlobUploadResponse, HandshakeResponse, PullResponse, PushResponse,
};

fn storage_err(e: StoreError) -> SyncError {
    SyncError::Storage(e.to_string())
}

/// The replication engine, one instance per deployment
pub struct SyncEngine {
    config: EngineConfig,
    oplog: OplogStore,
    items: ItemStore,
    quota: QuotaStore,
    sessions: SessionStore,
    blobs: BlobMetaStore,
    keyring: KeyringStore,
    objects: Arc<dyn ObjectStore>,
    devices: Arc<dyn DeviceRegistry>,
}

impl SyncEngine {
    /// Wires the engine over a database pool and the two external ports
    pub fn new(
        pool: &DatabasePool,
        objects: Arc<dyn ObjectStore>,
        devices: Arc<dyn DeviceRegistry>,
        config: EngineConfig,
    ) -> Self {
        let sqlite = pool.pool().clone();
        Self {
            config,
            oplog: OplogStore::new(sqlite.clone()),
            items: ItemStore::new(sqlite.clone()),
            quota: QuotaStore::new(sqlite.clone()),
            sessions: SessionStore::new(sqlite.clone()),
            blobs: BlobMetaStore::new(sqlite.clone()),
            keyring: KeyringStore::new(sqlite),
            objects,
            devices,
        }
    }

    /// Opens (or refreshes) a device's sync session.
    ///
    /// The device-limit check runs first and is fatal; a blocked device
    /// gets no token. A fresh token replaces whatever was outstanding.
    /// `server_cursor` tells the device where the log currently ends - a
    /// fresh device still pulls from cursor 0 to receive history.
    ///
    /// # Errors
    /// `QuotaDeviceExceeded` when the user has more active devices than
    /// allowed; backend variants on store or registry failure.
    pub async fn handshake(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
    ) -> SyncResult<HandshakeResponse> {
        let quota = self.quota_snapshot(user_id).await?;
        if quota.usage.used_devices > quota.limits.device_limit {
            tracing::warn!(
                user_id = %user_id,
                device_id = %device_id,
                used = quota.usage.used_devices,
                limit = quota.limits.device_limit,
                "handshake blocked by device limit"
            );
            return Err(SyncError::QuotaDeviceExceeded);
        }

        let server_cursor = self
            .oplog
            .head_cursor(user_id)
            .await
            .map_err(storage_err)?;

        let session = SyncSession {
            user_id: user_id.clone(),
            device_id: device_id.clone(),
            sync_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + self.config.token_ttl(),
            last_cursor: server_cursor,
        };
        self.sessions.upsert(&session).await.map_err(storage_err)?;

        tracing::info!(
            user_id = %user_id,
            device_id = %device_id,
            server_cursor = %server_cursor,
            "sync session opened"
        );

        Ok(HandshakeResponse {
            device_id: device_id.clone(),
            sync_token: session.sync_token,
            expires_at: session.expires_at,
            server_cursor,
            quota,
        })
    }

    /// Applies a batch of operations from one device.
    ///
    /// The whole batch is checked before anything is written: field
    /// validation, reused (device, op_seq) keys, and quota admission all
    /// run up front, and any failure rejects the batch with nothing
    /// applied. Items then apply strictly in batch order: oplog append
    /// (retransmits skip), last-writer-wins check, item write. Losing
    /// items become `conflicts` entries, not errors. The accumulated usage
    /// delta lands on the quota ledger once, after the batch.
    ///
    /// # Errors
    /// `InvalidPayload` for a malformed item or an op_seq reused with
    /// different content; `Quota*Exceeded` when the batch cannot fit;
    /// backend variants on store failure.
    pub async fn push(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        items: &[SyncItemInput],
    ) -> SyncResult<PushResponse> {
        for item in items {
            item.validate()?;
        }
        self.admit_batch(user_id, device_id, items).await?;

        let mut conflicts = Vec::new();
        let mut applied = QuotaDelta::ZERO;

        for item in items {
            match self
                .oplog
                .append(user_id, device_id, item)
                .await
                .map_err(storage_err)?
            {
                AppendOutcome::Applied(_) => {}
                // Exact retransmit: already applied in a prior call
                AppendOutcome::Duplicate => continue,
                AppendOutcome::HashMismatch => {
                    // Admission already screened reused keys; reaching this
                    // arm means a concurrent push claimed the key in
                    // between. Settle what applied, then refuse the rest.
                    self.quota
                        .apply_delta(user_id, applied)
                        .await
                        .map_err(storage_err)?;
                    return Err(SyncError::InvalidPayload(format!(
                        "op_seq {} already used with different content",
                        item.op_seq
                    )));
                }
            }

            match self
                .items
                .apply(user_id, device_id, item)
                .await
                .map_err(storage_err)?
            {
                UpsertOutcome::Applied { delta } => applied.accumulate(delta),
                UpsertOutcome::Conflict(info) => conflicts.push(info),
            }
        }

        self.quota
            .apply_delta(user_id, applied)
            .await
            .map_err(storage_err)?;

        let ack_cursor = self
            .oplog
            .head_cursor(user_id)
            .await
            .map_err(storage_err)?;

        tracing::debug!(
            user_id = %user_id,
            device_id = %device_id,
            batch = items.len(),
            conflicts = conflicts.len(),
            ack_cursor = %ack_cursor,
            "push batch applied"
        );

        Ok(PushResponse {
            ack_cursor,
            conflicts,
            applied_storage_delta: applied.storage_bytes,
            applied_objects_delta: applied.objects,
        })
    }

    /// Returns one page of changes after `after_cursor`.
    ///
    /// Entries come back in cursor order together with the current rows of
    /// the items they touch. `next_cursor` never regresses: an empty page
    /// echoes the request cursor. The caller's session bookmark is advanced
    /// as bookkeeping; it is informational, pull is driven entirely by the
    /// client-held cursor.
    ///
    /// # Errors
    /// `InvalidCursor` for a negative cursor; backend variants on store
    /// failure.
    pub async fn pull(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        after_cursor: Cursor,
        limit: u32,
    ) -> SyncResult<PullResponse> {
        if after_cursor.value() < 0 {
            return Err(SyncError::InvalidCursor(after_cursor.value()));
        }

        let limit = limit.min(self.config.pull_page_limit);
        let oplog = self
            .oplog
            .range(user_id, after_cursor, limit)
            .await
            .map_err(storage_err)?;

        let next_cursor = oplog.last().map_or(after_cursor, |entry| entry.cursor);

        let mut item_ids: Vec<ItemId> = Vec::new();
        for entry in &oplog {
            if !item_ids.contains(&entry.item_id) {
                item_ids.push(entry.item_id.clone());
            }
        }
        let items = self
            .items
            .fetch_many(user_id, &item_ids)
            .await
            .map_err(storage_err)?;

        if next_cursor > after_cursor {
            self.sessions
                .advance_cursor(user_id, device_id, next_cursor)
                .await
                .map_err(storage_err)?;
        }

        tracing::debug!(
            user_id = %user_id,
            device_id = %device_id,
            after_cursor = %after_cursor,
            entries = oplog.len(),
            next_cursor = %next_cursor,
            "pull page served"
        );

        Ok(PullResponse {
            oplog,
            items,
            next_cursor,
        })
    }

    /// Current limits and usage for the user, lazily initialized
    ///
    /// # Errors
    /// Backend variants on store or registry failure.
    pub async fn get_quota(&self, user_id: &UserId) -> SyncResult<QuotaInfo> {
        self.quota_snapshot(user_id).await
    }

    /// Checks a prospective mutation against the user's quota
    ///
    /// # Errors
    /// The `Quota*Exceeded` variant of the first violated limit; backend
    /// variants on store or registry failure.
    pub async fn validate_quota(
        &self,
        user_id: &UserId,
        storage_delta: i64,
        objects_delta: i64,
        item_size: Option<i64>,
    ) -> SyncResult<()> {
        self.quota_snapshot(user_id)
            .await?
            .validate_delta(storage_delta, objects_delta, item_size)
    }

    /// Stores an opaque blob and records its metadata.
    ///
    /// The digest is computed server-side over the received bytes; the
    /// object is written before the metadata row, so a recorded blob always
    /// has its bytes.
    ///
    /// # Errors
    /// `QuotaItemExceeded`/`QuotaStorageExceeded`/`QuotaObjectExceeded`
    /// when the blob does not fit; backend variants on object-store or
    /// store failure.
    pub async fn upload_blob(
        &self,
        user_id: &UserId,
        data: &[u8],
        content_type: Option<&str>,
    ) -> SyncResult<BlobUploadResponse> {
        let size_bytes = data.len() as i64;
        self.quota_snapshot(user_id)
            .await?
            .validate_delta(size_bytes, 1, Some(size_bytes))?;

        let blob_id = BlobId::new();
        let object_key = format!("{user_id}/{blob_id}");
        let sha256 = sha256_hex(data);

        self.objects
            .put(&object_key, data, content_type)
            .await
            .map_err(|e| SyncError::ObjectStore(e.to_string()))?;

        let record = BlobRecord {
            blob_id,
            object_key: object_key.clone(),
            sha256: sha256.clone(),
            size_bytes,
            content_type: content_type.map(str::to_string),
            created_at: Utc::now(),
            status: BlobStatus::Ready,
        };
        self.blobs
            .insert(user_id, &record)
            .await
            .map_err(storage_err)?;
        self.quota
            .apply_delta(user_id, QuotaDelta::new(size_bytes, 1))
            .await
            .map_err(storage_err)?;

        tracing::info!(
            user_id = %user_id,
            blob_id = %blob_id,
            size_bytes,
            "blob uploaded"
        );

        Ok(BlobUploadResponse {
            blob_id,
            object_key,
            sha256,
            size_bytes,
        })
    }

    /// Returns a blob's bytes and recorded digest. Requires a valid sync
    /// token for the requesting device.
    ///
    /// # Errors
    /// `InvalidToken` when the token is wrong or expired; `BlobNotFound`
    /// for an unknown blob; backend variants otherwise.
    pub async fn download_blob(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        sync_token: &str,
        blob_id: &BlobId,
    ) -> SyncResult<BlobDownload> {
        self.validate_token(user_id, device_id, sync_token).await?;

        let record = self
            .blobs
            .get(user_id, blob_id)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| SyncError::BlobNotFound(blob_id.to_string()))?;

        let data = self
            .objects
            .get(&record.object_key)
            .await
            .map_err(|e| SyncError::ObjectStore(e.to_string()))?
            .ok_or_else(|| {
                // Metadata without bytes means the backend lost the object
                SyncError::ObjectStore(format!("object missing for blob {blob_id}"))
            })?;

        Ok(BlobDownload {
            data,
            sha256: record.sha256,
            content_type: record.content_type,
        })
    }

    /// Checks a presented sync token for a device
    ///
    /// # Errors
    /// `InvalidToken` when no session exists, the token differs, or the
    /// session expired; backend variants on store failure.
    pub async fn validate_token(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        sync_token: &str,
    ) -> SyncResult<()> {
        let session = self
            .sessions
            .get(user_id, device_id)
            .await
            .map_err(storage_err)?
            .ok_or(SyncError::InvalidToken)?;

        if !session.token_matches(sync_token) || session.is_expired(Utc::now()) {
            return Err(SyncError::InvalidToken);
        }
        Ok(())
    }

    /// Registers a device's wrapped key material.
    ///
    /// The recovery code never touches disk in the clear: it is hashed,
    /// salted with the user id, before storage. Re-registering without a
    /// recovery code keeps the stored hash.
    ///
    /// # Errors
    /// `InvalidPayload` for empty key type or material; backend variants
    /// on store failure.
    pub async fn register_key(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        key_type: &str,
        encrypted_key: &str,
        recovery_code: Option<&str>,
    ) -> SyncResult<()> {
        if key_type.is_empty() || encrypted_key.is_empty() {
            return Err(SyncError::InvalidPayload(
                "key_type and encrypted_key are required".into(),
            ));
        }

        let recovery_hash = recovery_code.map(|code| Self::hash_recovery_code(user_id, code));
        self.keyring
            .register(
                user_id,
                device_id,
                key_type,
                encrypted_key,
                recovery_hash.as_deref(),
            )
            .await
            .map_err(storage_err)?;

        tracing::info!(
            user_id = %user_id,
            device_id = %device_id,
            key_type,
            "device key registered"
        );
        Ok(())
    }

    /// Replaces a device's wrapped key material and stamps the rotation
    ///
    /// # Errors
    /// `InvalidPayload` when no key of this type is registered for the
    /// device; backend variants on store failure.
    pub async fn rotate_key(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        key_type: &str,
        encrypted_key: &str,
        recovery_code: Option<&str>,
    ) -> SyncResult<()> {
        if encrypted_key.is_empty() {
            return Err(SyncError::InvalidPayload("encrypted_key is required".into()));
        }

        let recovery_hash = recovery_code.map(|code| Self::hash_recovery_code(user_id, code));
        let rotated = self
            .keyring
            .rotate(
                user_id,
                device_id,
                key_type,
                encrypted_key,
                recovery_hash.as_deref(),
            )
            .await
            .map_err(storage_err)?;

        if !rotated {
            return Err(SyncError::InvalidPayload(format!(
                "no {key_type} key registered for this device"
            )));
        }

        tracing::info!(
            user_id = %user_id,
            device_id = %device_id,
            key_type,
            "device key rotated"
        );
        Ok(())
    }

    /// Loads a device's wrapped key material, if registered
    ///
    /// # Errors
    /// Backend variants on store failure.
    pub async fn get_key(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        key_type: &str,
    ) -> SyncResult<Option<KeyringEntry>> {
        self.keyring
            .get(user_id, device_id, key_type)
            .await
            .map_err(storage_err)
    }

    /// Pre-write batch screening: reused-key detection plus quota
    /// admission.
    ///
    /// The admitted delta is computed from actual prior state, so the
    /// check stays truthful where a gross count would not: exact
    /// retransmits contribute nothing (an identical retry admits cleanly
    /// even at the limit), resizes contribute their net change, and items
    /// predicted to lose the conflict check contribute nothing. Per-item
    /// size is still checked against every item in the batch. A reused
    /// (device, op_seq) key with different content fails here, before any
    /// write.
    ///
    /// The check remains advisory with respect to concurrent pushes; the
    /// ledger is settled from the deltas the item store actually reports.
    async fn admit_batch(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        items: &[SyncItemInput],
    ) -> SyncResult<()> {
        let quota = self.quota_snapshot(user_id).await?;

        let mut max_item_size: Option<i64> = None;
        let mut admitted = QuotaDelta::ZERO;
        // Heads as they will stand mid-batch, so later ops on the same
        // item are judged against the earlier ones
        let mut pending: HashMap<ItemId, ItemHead> = HashMap::new();

        for item in items {
            let size = item.accounted_size();
            max_item_size = Some(max_item_size.map_or(size, |m| m.max(size)));

            match self
                .oplog
                .stored_hash(user_id, device_id, item.op_seq)
                .await
                .map_err(storage_err)?
            {
                // Exact retransmit: already counted when it first applied
                Some(hash) if hash == item.op_hash => continue,
                Some(_) => {
                    return Err(SyncError::InvalidPayload(format!(
                        "op_seq {} already used with different content",
                        item.op_seq
                    )));
                }
                None => {}
            }

            let head = match pending.get(&item.item_id) {
                Some(head) => Some(head.clone()),
                None => self
                    .items
                    .get_head(user_id, &item.item_id)
                    .await
                    .map_err(storage_err)?,
            };

            let wins = head.as_ref().map_or(true, |head| {
                candidate_wins(
                    item.updated_at,
                    device_id,
                    head.updated_at,
                    head.device_id.as_ref(),
                )
            });
            if !wins {
                continue;
            }

            admitted.accumulate(ItemStore::delta_for(head.as_ref(), item));
            pending.insert(
                item.item_id.clone(),
                ItemHead {
                    updated_at: item.updated_at,
                    device_id: Some(device_id.clone()),
                    payload_size: item.payload_size,
                    deleted_at: match item.op_type {
                        OpType::Delete => Some(item.deleted_at.unwrap_or(item.updated_at)),
                        OpType::Upsert => item.deleted_at,
                    },
                },
            );
        }

        quota.validate_delta(admitted.storage_bytes, admitted.objects, max_item_size)
    }

    /// Quota row with `used_devices` reconciled from the device registry
    async fn quota_snapshot(&self, user_id: &UserId) -> SyncResult<QuotaInfo> {
        let devices = self
            .devices
            .count_active_devices(user_id)
            .await
            .map_err(|e| SyncError::DeviceRegistry(e.to_string()))?;
        self.quota
            .get_or_init(user_id, devices, &self.config.default_limits)
            .await
            .map_err(storage_err)
    }

    fn hash_recovery_code(user_id: &UserId, code: &str) -> String {
        sha256_hex(format!("{}:{code}", user_id.as_str()).as_bytes())
    }
}
