//! Shared types, error model, and configuration for ocwharvest.
//!
//! This crate is the foundation depended on by all other ocwharvest crates.
//! It provides:
//! - [`HarvestError`], the unified error type
//! - Domain types ([`CourseInfo`], [`ResourceDescriptor`], [`ProblemSolutionPair`], [`RecordId`])
//! - Configuration ([`AppConfig`], [`CatalogConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, CatalogSection, DefaultsConfig, FetchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{HarvestError, Result};
pub use types::{CourseInfo, ProblemSolutionPair, RecordId, ResourceDescriptor, RunSummary};
