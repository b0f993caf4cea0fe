//! Key/value contract for credential records.
//!
//! Implementations store [`Record`]s under a [`KeyHash`] and keep a separate,
//! per-hash invalidation reason. They know nothing about encryption.

use crate::models::record::{KeyHash, Record};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("record already exists")]
    AlreadyExists,
    #[error("record is invalid: {0}")]
    Invalid(String),
    #[error("stored record is corrupt: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type KvResult<T> = Result<T, KvError>;

#[async_trait]
pub trait Kv: Send + Sync {
    /// Store `record` under `key_hash`. Fails with
    /// [`KvError::AlreadyExists`] if a live record is present.
    async fn put(&self, key_hash: KeyHash, record: Record) -> KvResult<()>;

    /// Fetch the record. An invalidated hash fails with
    /// [`KvError::Invalid`] whether or not a record exists; a missing
    /// record is `Ok(None)`.
    async fn get(&self, key_hash: KeyHash) -> KvResult<Option<Record>>;

    /// Remove the record and any invalidation. Missing hashes are not an
    /// error.
    async fn delete(&self, key_hash: KeyHash) -> KvResult<()>;

    /// Mark the hash invalid. The first reason recorded is kept.
    async fn invalidate(&self, key_hash: KeyHash, reason: &str) -> KvResult<()>;

    /// Round-trip to the backing store.
    async fn ping(&self) -> KvResult<()>;
}
