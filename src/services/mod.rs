pub mod auth_db;
pub mod etag;
pub mod gateway_errors;
pub mod kv;
pub mod listing;
pub mod memory_kv;
pub mod multipart;
pub mod sqlite_kv;
