//! Harvest orchestration for ocwharvest.
//!
//! [`course`] runs the per-course sequence (download, extract, classify,
//! pair, persist, combine) and [`pipeline`] drives it over every course the
//! catalog returns.

pub mod course;
pub mod pipeline;

pub use course::{CourseOptions, CourseOutcome, Harvester, course_slug, remote_url};
pub use pipeline::{ProgressReporter, SilentProgress, run_pipeline};

#[cfg(test)]
pub(crate) mod testutil;
