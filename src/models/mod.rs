//! Core data models of the gateway.
//!
//! Credential records and access grants are persisted through the key/value
//! store; the multipart types mirror the S3 responses the gateway builds.

pub mod access;
pub mod multipart;
pub mod record;
