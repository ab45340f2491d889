//! Course archive manifests, resource classification, and assignment pairing.
//!
//! This crate provides:
//! - [`manifest`]: reads the root course manifest and per-resource descriptors
//! - [`classifier`]: splits descriptors into assignment / lecture / reading buckets
//! - [`pairer`]: matches problem files to solution files by assignment number

pub mod classifier;
pub mod manifest;
pub mod pairer;

pub use classifier::{Bucket, ResourceBuckets, classify};
pub use manifest::{read_course_info, read_descriptors};
pub use pairer::{AssignmentRole, Pairing, classify_name, pair_assignments, pair_assignments_with_report};
