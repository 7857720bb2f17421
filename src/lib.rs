// Library for tests to access modules

pub mod config;
pub mod error;
pub mod keys;
pub mod kv_store;
pub mod models;
pub mod stats_repo;
