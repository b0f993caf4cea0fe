//! HTTP handlers for the credential service.
//!
//! `/v1/access` registers and resolves access grants by access key id;
//! `/v1/records` exposes the raw key/value contract for administration.

use crate::{
    errors::AppError,
    models::{
        access::AccessGrant,
        record::{EncryptionKey, KeyHash, Record},
    },
    services::auth_db::Database,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct RegisterAccessReq {
    pub access_grant: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterAccessResp {
    pub access_key_id: String,
    pub secret_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessResp {
    pub access_grant: String,
    pub secret_key: String,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateReq {
    pub reason: String,
}

/// `POST /v1/access`: store an access grant under a fresh key.
pub async fn register_access(
    State(db): State<Database>,
    Json(req): Json<RegisterAccessReq>,
) -> Result<Json<RegisterAccessResp>, AppError> {
    let access = AccessGrant::parse(&req.access_grant)?;
    let key = EncryptionKey::generate();
    let secret_key = db.put(&key, &access).await?;

    info!(key_hash = %key.hash(), satellite = %access.satellite_address, "registered access");
    Ok(Json(RegisterAccessResp {
        access_key_id: key.to_hex(),
        secret_key: secret_key.to_hex(),
    }))
}

/// `GET /v1/access/{access_key_id}`
pub async fn get_access(
    State(db): State<Database>,
    Path(access_key_id): Path<String>,
) -> Result<Json<AccessResp>, AppError> {
    let key: EncryptionKey = access_key_id
        .parse()
        .map_err(|_| AppError::bad_request("malformed access key id"))?;
    let (access, secret_key) = db.get(&key).await?;

    Ok(Json(AccessResp {
        access_grant: access.serialize()?,
        secret_key: secret_key.to_hex(),
    }))
}

/// `PUT /v1/records/{key_hash}`, 409 if a record exists.
pub async fn put_record(
    State(db): State<Database>,
    Path(key_hash): Path<String>,
    Json(record): Json<Record>,
) -> Result<StatusCode, AppError> {
    let key_hash = parse_key_hash(&key_hash)?;
    db.kv().put(key_hash, record).await?;
    Ok(StatusCode::OK)
}

/// `GET /v1/records/{key_hash}`
pub async fn get_record(
    State(db): State<Database>,
    Path(key_hash): Path<String>,
) -> Result<Json<Record>, AppError> {
    let key_hash = parse_key_hash(&key_hash)?;
    db.kv()
        .get(key_hash)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no record for key hash {}", key_hash)))
}

/// `DELETE /v1/records/{key_hash}`, idempotent.
pub async fn delete_record(
    State(db): State<Database>,
    Path(key_hash): Path<String>,
) -> Result<StatusCode, AppError> {
    let key_hash = parse_key_hash(&key_hash)?;
    db.kv().delete(key_hash).await?;
    info!(%key_hash, "deleted record");
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/records/{key_hash}/invalidate`, first reason wins.
pub async fn invalidate_record(
    State(db): State<Database>,
    Path(key_hash): Path<String>,
    Json(req): Json<InvalidateReq>,
) -> Result<StatusCode, AppError> {
    let key_hash = parse_key_hash(&key_hash)?;
    db.kv().invalidate(key_hash, &req.reason).await?;
    info!(%key_hash, reason = %req.reason, "invalidated record");
    Ok(StatusCode::NO_CONTENT)
}

fn parse_key_hash(raw: &str) -> Result<KeyHash, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request("malformed key hash"))
}
