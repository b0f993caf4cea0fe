//! Credential store backed by in-process maps.

use super::kv::{Kv, KvError, KvResult};
use crate::models::record::{KeyHash, Record};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct Entries {
    records: HashMap<KeyHash, Record>,
    invalid: HashMap<KeyHash, String>,
}

/// Both maps sit behind one lock; `delete` clears a record and its
/// invalidation together.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<Entries>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Kv for MemoryKv {
    async fn put(&self, key_hash: KeyHash, record: Record) -> KvResult<()> {
        let mut entries = self.entries.lock();
        if entries.records.contains_key(&key_hash) {
            return Err(KvError::AlreadyExists);
        }
        entries.records.insert(key_hash, record);
        Ok(())
    }

    async fn get(&self, key_hash: KeyHash) -> KvResult<Option<Record>> {
        let entries = self.entries.lock();
        if let Some(reason) = entries.invalid.get(&key_hash) {
            return Err(KvError::Invalid(reason.clone()));
        }
        Ok(entries.records.get(&key_hash).cloned())
    }

    async fn delete(&self, key_hash: KeyHash) -> KvResult<()> {
        let mut entries = self.entries.lock();
        entries.records.remove(&key_hash);
        entries.invalid.remove(&key_hash);
        Ok(())
    }

    async fn invalidate(&self, key_hash: KeyHash, reason: &str) -> KvResult<()> {
        self.entries
            .lock()
            .invalid
            .entry(key_hash)
            .or_insert_with(|| reason.to_string());
        Ok(())
    }

    async fn ping(&self) -> KvResult<()> {
        drop(self.entries.lock());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str) -> Record {
        Record {
            satellite_address: format!("sat-{tag}"),
            macaroon_head: tag.as_bytes().to_vec(),
            encrypted_secret_key: vec![1, 2, 3],
            encrypted_access_grant: tag.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn put_then_get() {
        let kv = MemoryKv::new();
        let hash = KeyHash([1; 32]);
        kv.put(hash, record("a")).await.expect("put");
        assert_eq!(kv.get(hash).await.expect("get"), Some(record("a")));
        assert_eq!(kv.get(KeyHash([2; 32])).await.expect("get"), None);
    }

    #[tokio::test]
    async fn second_put_is_rejected_and_keeps_first() {
        let kv = MemoryKv::new();
        let hash = KeyHash([1; 32]);
        kv.put(hash, record("a")).await.expect("put");
        assert!(matches!(
            kv.put(hash, record("b")).await,
            Err(KvError::AlreadyExists)
        ));
        assert_eq!(kv.get(hash).await.expect("get"), Some(record("a")));
    }

    #[tokio::test]
    async fn first_invalidation_reason_wins() {
        let kv = MemoryKv::new();
        let hash = KeyHash([1; 32]);
        kv.put(hash, record("a")).await.expect("put");
        kv.invalidate(hash, "reason-A").await.expect("invalidate");
        kv.invalidate(hash, "reason-B").await.expect("invalidate");
        match kv.get(hash).await {
            Err(KvError::Invalid(reason)) => assert_eq!(reason, "reason-A"),
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalidating_an_unknown_hash_still_blocks_get() {
        let kv = MemoryKv::new();
        let hash = KeyHash([3; 32]);
        kv.invalidate(hash, "revoked").await.expect("invalidate");
        assert!(matches!(kv.get(hash).await, Err(KvError::Invalid(_))));
    }

    #[tokio::test]
    async fn delete_clears_invalidation() {
        let kv = MemoryKv::new();
        let hash = KeyHash([1; 32]);
        kv.put(hash, record("a")).await.expect("put");
        kv.invalidate(hash, "revoked").await.expect("invalidate");
        kv.delete(hash).await.expect("delete");
        assert_eq!(kv.get(hash).await.expect("get"), None);

        kv.put(hash, record("b")).await.expect("put again");
        assert_eq!(kv.get(hash).await.expect("get"), Some(record("b")));
    }

    #[tokio::test]
    async fn delete_of_missing_hash_is_ok() {
        let kv = MemoryKv::new();
        kv.delete(KeyHash([9; 32])).await.expect("delete");
        kv.ping().await.expect("ping");
    }
}
