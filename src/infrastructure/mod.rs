pub mod backend_client;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod schedule_cache;
pub mod storage;
