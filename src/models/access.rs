//! Access grants: the portable, self-contained credential a storage network
//! client needs to open a project.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("access grant is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("access grant is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("access grant is missing a satellite address")]
    MissingSatellite,
}

/// A grant authorizing operations against one project on one satellite.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AccessGrant {
    /// Satellite responsible for the project's metadata.
    pub satellite_address: String,

    /// Serialized API key (macaroon).
    pub api_key: Vec<u8>,

    /// Root secret that object encryption keys are derived from.
    pub root_secret: Vec<u8>,

    /// Bucket/prefix restrictions; empty means the whole project.
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl AccessGrant {
    /// Textual form: URL-safe base64 of the JSON encoding.
    pub fn serialize(&self) -> Result<String, AccessError> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn parse(serialized: &str) -> Result<Self, AccessError> {
        let json = URL_SAFE_NO_PAD.decode(serialized.trim())?;
        let access: AccessGrant = serde_json::from_slice(&json)?;
        if access.satellite_address.is_empty() {
            return Err(AccessError::MissingSatellite);
        }
        Ok(access)
    }

    /// First 32 bytes of the API key; enough to identify it for revocation
    /// without storing the whole macaroon in clear.
    pub fn macaroon_head(&self) -> Vec<u8> {
        self.api_key.iter().take(32).copied().collect()
    }
}
