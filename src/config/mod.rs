// src/config/mod.rs
pub mod workbench;

pub use workbench::{
    source_weights_path, StorageBackend, StorageConfig, WorkbenchConfig,
    DEFAULT_SOURCE_WEIGHTS_PATH, DEFAULT_WORKBENCH_CONFIG_PATH,
};
