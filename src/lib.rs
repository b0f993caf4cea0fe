//! S3 multipart upload gateway over a stream-oriented storage network,
//! with the credential service that resolves access keys to grants.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod network;
pub mod routes;
pub mod services;
