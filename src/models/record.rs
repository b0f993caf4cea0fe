//! Credential records and the keys they are stored under.

use aes_gcm::aead::{OsRng, rand_core::RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Length in bytes of encryption keys, key hashes and secret keys.
pub const KEY_LEN: usize = 32;

/// Returned when a hex string does not decode to exactly [`KEY_LEN`] bytes.
#[derive(Debug, thiserror::Error)]
#[error("expected {KEY_LEN} hex-encoded bytes")]
pub struct ParseKeyError;

fn decode_key_bytes(s: &str) -> Result<[u8; KEY_LEN], ParseKeyError> {
    let bytes = hex::decode(s).map_err(|_| ParseKeyError)?;
    bytes.try_into().map_err(|_| ParseKeyError)
}

/// Symmetric key that a record's access grant and secret are encrypted with.
///
/// The hex form of this key is what clients hold as their access key id;
/// the service itself only ever persists its [`KeyHash`].
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh key from the OS random number generator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Lookup key for this encryption key. Unsalted, so the same key always
    /// lands on the same record.
    pub fn hash(&self) -> KeyHash {
        KeyHash(Sha256::digest(self.0).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for EncryptionKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_key_bytes(s).map(Self)
    }
}

// Keep key material out of logs.
impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Digest of an [`EncryptionKey`], used as the credential store's key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyHash(pub [u8; KEY_LEN]);

impl KeyHash {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for KeyHash {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_key_bytes(s).map(Self)
    }
}

impl TryFrom<&[u8]> for KeyHash {
    type Error = ParseKeyError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; KEY_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| ParseKeyError)
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({})", self.to_hex())
    }
}

/// Secret half of an S3 credential pair, handed out once at registration.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(pub [u8; KEY_LEN]);

impl SecretKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// Value persisted for a [`KeyHash`].
///
/// The store treats every field as opaque; encryption and decryption happen
/// in [`crate::services::auth_db::Database`].
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Record {
    /// Address of the satellite the access grant belongs to.
    pub satellite_address: String,

    /// Head of the macaroon (API key) inside the access grant.
    pub macaroon_head: Vec<u8>,

    /// Secret key, sealed with the record's encryption key.
    pub encrypted_secret_key: Vec<u8>,

    /// Serialized access grant, sealed with the record's encryption key.
    pub encrypted_access_grant: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn key_hash_is_deterministic() {
        let key = EncryptionKey::new([9u8; KEY_LEN]);
        assert_eq!(key.hash(), key.clone().hash());
        assert_eq!(key.hash(), EncryptionKey::new([9u8; KEY_LEN]).hash());
    }

    #[test]
    fn hex_forms_round_trip() {
        let key = EncryptionKey::generate();
        let parsed: EncryptionKey = key.to_hex().parse().expect("parse key");
        assert_eq!(parsed, key);

        let hash = key.hash();
        let parsed: KeyHash = hash.to_string().parse().expect("parse hash");
        assert_eq!(parsed, hash);
    }

    #[test]
    fn malformed_hex_is_rejected() {
        assert!("zz".parse::<KeyHash>().is_err());
        assert!("abcd".parse::<EncryptionKey>().is_err());
        assert!(KeyHash::try_from(&[1u8; 31][..]).is_err());
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = EncryptionKey::new([0xab; KEY_LEN]);
        assert!(!format!("{:?}", key).contains("ab"));
    }

    proptest! {
        #[test]
        fn distinct_keys_have_distinct_hashes(
            keys in proptest::collection::vec(any::<[u8; KEY_LEN]>(), 1..256)
        ) {
            let unique: HashSet<[u8; KEY_LEN]> = keys.iter().copied().collect();
            let hashes: HashSet<KeyHash> = unique
                .iter()
                .map(|bytes| EncryptionKey::new(*bytes).hash())
                .collect();
            prop_assert_eq!(hashes.len(), unique.len());
        }

        #[test]
        fn hash_is_pure(bytes in any::<[u8; KEY_LEN]>()) {
            prop_assert_eq!(
                EncryptionKey::new(bytes).hash(),
                EncryptionKey::new(bytes).hash()
            );
        }
    }
}
