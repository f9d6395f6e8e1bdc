//! Shared types, error model, and configuration for xnatkit.
//!
//! This crate is the foundation depended on by all other xnatkit crates.
//! It provides:
//! - [`XnatKitError`]: the unified error type
//! - Domain types ([`EntityType`], [`ScanRole`], the XNAT listing records)
//! - Configuration ([`AppConfig`], [`ServerConfig`], config loading)
//! - Name normalization helpers ([`normalize_name`], [`normalize_parrec_name`])

pub mod config;
pub mod error;
pub mod naming;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, LauncherConfig, ServerConfig, UploadConfig, config_dir, config_file_path,
    init_config, init_config_at, load_config, load_config_from, normalize_host,
};
pub use error::{Result, XnatKitError};
pub use naming::{normalize_name, normalize_parrec_name};
pub use types::{
    EntityType, ExperimentRecord, PipelineRecord, ProjectRecord, ReconstructionRecord,
    ResourceRecord, ScanRecord, ScanRole, SessionRecord, SubjectRecord, parse_insert_date,
};
