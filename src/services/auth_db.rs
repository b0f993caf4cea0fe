//! Credential database: seals access grants and secrets with the caller's
//! encryption key and files them in a [`Kv`] under the key's hash.

use super::kv::{Kv, KvError};
use crate::models::{
    access::{AccessError, AccessGrant},
    record::{EncryptionKey, KEY_LEN, KeyHash, Record, SecretKey},
};
use aes_gcm::aead::{Aead, KeyInit, OsRng, rand_core::RngCore};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no record for key hash {0}")]
    NotFound(KeyHash),
    #[error("credential is invalid: {0}")]
    Invalid(String),
    #[error("a record already exists for this key")]
    AlreadyExists,
    #[error("failed to {0} record")]
    Crypto(&'static str),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Kv(KvError),
}

impl From<KvError> for AuthError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::AlreadyExists => AuthError::AlreadyExists,
            KvError::Invalid(reason) => AuthError::Invalid(reason),
            other => AuthError::Kv(other),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Clone)]
pub struct Database {
    kv: Arc<dyn Kv>,
}

impl Database {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn Kv> {
        &self.kv
    }

    /// Seal `access` with `key` and store it under `key.hash()`, returning
    /// the freshly generated secret key for the credential pair.
    ///
    /// Fails with [`AuthError::AlreadyExists`] if the hash is taken.
    pub async fn put(&self, key: &EncryptionKey, access: &AccessGrant) -> AuthResult<SecretKey> {
        let serialized = access.serialize()?;
        let secret_key = SecretKey::generate();

        let record = Record {
            satellite_address: access.satellite_address.clone(),
            macaroon_head: access.macaroon_head(),
            encrypted_secret_key: seal(key, &secret_key.0)?,
            encrypted_access_grant: seal(key, serialized.as_bytes())?,
        };

        let key_hash = key.hash();
        self.kv.put(key_hash, record).await?;
        debug!(%key_hash, satellite = %access.satellite_address, "stored credential");
        Ok(secret_key)
    }

    /// Look up and unseal the access grant and secret key for `key`.
    ///
    /// Invalidated credentials are rejected by the store before anything is
    /// decrypted.
    pub async fn get(&self, key: &EncryptionKey) -> AuthResult<(AccessGrant, SecretKey)> {
        let key_hash = key.hash();
        let record = self
            .kv
            .get(key_hash)
            .await?
            .ok_or(AuthError::NotFound(key_hash))?;

        let secret: [u8; KEY_LEN] = open(key, &record.encrypted_secret_key)?
            .try_into()
            .map_err(|_| AuthError::Crypto("decode"))?;
        let serialized = String::from_utf8(open(key, &record.encrypted_access_grant)?)
            .map_err(|_| AuthError::Crypto("decode"))?;

        let access = AccessGrant::parse(&serialized)?;
        Ok((access, SecretKey(secret)))
    }
}

/// AES-256-GCM with a random nonce prepended to the ciphertext.
fn seal(key: &EncryptionKey, plaintext: &[u8]) -> AuthResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let mut ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| AuthError::Crypto("encrypt"))?;

    let mut out = nonce_bytes.to_vec();
    out.append(&mut ciphertext);
    Ok(out)
}

fn open(key: &EncryptionKey, sealed: &[u8]) -> AuthResult<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(AuthError::Crypto("decrypt"));
    }
    let (nonce_bytes, data) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), data)
        .map_err(|_| AuthError::Crypto("decrypt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_kv::MemoryKv;

    fn grant(satellite: &str) -> AccessGrant {
        AccessGrant {
            satellite_address: satellite.into(),
            api_key: b"api-key".to_vec(),
            root_secret: vec![3; 32],
            prefixes: Vec::new(),
        }
    }

    fn database() -> (Database, Arc<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        (Database::new(kv.clone()), kv)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (db, _) = database();
        let key = EncryptionKey::generate();
        let secret = db.put(&key, &grant("sat-1")).await.expect("put");

        let (access, got_secret) = db.get(&key).await.expect("get");
        assert_eq!(access, grant("sat-1"));
        assert_eq!(got_secret, secret);
    }

    #[tokio::test]
    async fn record_is_sealed_at_rest() {
        let (db, kv) = database();
        let key = EncryptionKey::generate();
        db.put(&key, &grant("sat-1")).await.expect("put");

        let record = kv.get(key.hash()).await.expect("get").expect("record");
        assert_eq!(record.satellite_address, "sat-1");
        assert_eq!(record.macaroon_head, b"api-key");
        let serialized = grant("sat-1").serialize().expect("serialize");
        assert_ne!(record.encrypted_access_grant, serialized.as_bytes());
    }

    #[tokio::test]
    async fn duplicate_put_keeps_original() {
        let (db, _) = database();
        let key = EncryptionKey::generate();
        db.put(&key, &grant("sat-1")).await.expect("put");
        assert!(matches!(
            db.put(&key, &grant("sat-2")).await,
            Err(AuthError::AlreadyExists)
        ));
        let (access, _) = db.get(&key).await.expect("get");
        assert_eq!(access.satellite_address, "sat-1");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let (db, _) = database();
        let key = EncryptionKey::generate();
        match db.get(&key).await {
            Err(AuthError::NotFound(hash)) => assert_eq!(hash, key.hash()),
            other => panic!("expected not found, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn invalidated_key_reports_first_reason() {
        let (db, kv) = database();
        let key = EncryptionKey::generate();
        db.put(&key, &grant("sat-1")).await.expect("put");
        kv.invalidate(key.hash(), "reason-A").await.expect("invalidate");
        kv.invalidate(key.hash(), "reason-B").await.expect("invalidate");

        match db.get(&key).await {
            Err(AuthError::Invalid(reason)) => assert_eq!(reason, "reason-A"),
            other => panic!("expected invalid, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn delete_lifts_invalidation() {
        let (db, kv) = database();
        let key = EncryptionKey::generate();
        db.put(&key, &grant("sat-1")).await.expect("put");
        kv.invalidate(key.hash(), "revoked").await.expect("invalidate");
        kv.delete(key.hash()).await.expect("delete");
        assert!(matches!(db.get(&key).await, Err(AuthError::NotFound(_))));

        db.put(&key, &grant("sat-2")).await.expect("put again");
        let (access, _) = db.get(&key).await.expect("get");
        assert_eq!(access.satellite_address, "sat-2");
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let key = EncryptionKey::new([5; KEY_LEN]);
        let mut sealed = seal(&key, b"payload").expect("seal");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(open(&key, &sealed), Err(AuthError::Crypto(_))));
        assert!(matches!(open(&key, &[0; 4]), Err(AuthError::Crypto(_))));
    }
}
