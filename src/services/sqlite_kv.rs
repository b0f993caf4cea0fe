//! Durable credential store on SQLite.
//!
//! Records and invalidations live in separate tables so that an
//! invalidation can exist for a hash without a record, matching the
//! in-memory store.

use super::kv::{Kv, KvError, KvResult};
use crate::models::record::{KeyHash, Record};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct SqliteKv {
    db: Arc<SqlitePool>,
}

impl SqliteKv {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> KvResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Kv for SqliteKv {
    async fn put(&self, key_hash: KeyHash, record: Record) -> KvResult<()> {
        let result = sqlx::query(
            "INSERT INTO records (
                key_hash, satellite_address, macaroon_head,
                encrypted_secret_key, encrypted_access_grant, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&key_hash.as_bytes()[..])
        .bind(&record.satellite_address)
        .bind(&record.macaroon_head)
        .bind(&record.encrypted_secret_key)
        .bind(&record.encrypted_access_grant)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(KvError::AlreadyExists),
            Err(err) => Err(KvError::Sqlx(err)),
        }
    }

    async fn get(&self, key_hash: KeyHash) -> KvResult<Option<Record>> {
        let mut tx = self.db.begin().await?;

        let reason = sqlx::query_scalar::<_, String>(
            "SELECT reason FROM invalid_records WHERE key_hash = ?",
        )
        .bind(&key_hash.as_bytes()[..])
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(reason) = reason {
            return Err(KvError::Invalid(reason));
        }

        let record = sqlx::query_as::<_, Record>(
            "SELECT satellite_address, macaroon_head, encrypted_secret_key, encrypted_access_grant
             FROM records WHERE key_hash = ?",
        )
        .bind(&key_hash.as_bytes()[..])
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn delete(&self, key_hash: KeyHash) -> KvResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM records WHERE key_hash = ?")
            .bind(&key_hash.as_bytes()[..])
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM invalid_records WHERE key_hash = ?")
            .bind(&key_hash.as_bytes()[..])
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn invalidate(&self, key_hash: KeyHash, reason: &str) -> KvResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO invalid_records (key_hash, reason, invalidated_at)
             VALUES (?, ?, ?)",
        )
        .bind(&key_hash.as_bytes()[..])
        .bind(reason)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> KvResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(KvError::Corrupt(format!("ping returned {}", one)));
        }
        Ok(())
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
