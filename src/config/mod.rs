// src/config/mod.rs
pub mod sync;

pub use sync::{
    SyncConfig, DEFAULT_CONFIG_PATH, DEFAULT_DATABASE_URL, ENV_CONFIG_PATH, MEMORY_DATABASE_URL,
};
