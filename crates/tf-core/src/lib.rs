pub mod config;
pub mod seed;
pub mod sqlite_store;
pub mod store;
pub mod types;
