//! Core domain types for harvested courses.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for persisted record identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a new time-sortable record identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CourseInfo
// ---------------------------------------------------------------------------

/// Course metadata read from the archive's root `data.json`.
///
/// Every field tolerates an absent key, an explicit `null`, or an unexpected
/// shape by falling back to its empty value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseInfo {
    #[serde(default, deserialize_with = "lenient::string")]
    pub course_title: String,

    #[serde(default, deserialize_with = "lenient::string")]
    pub course_description: String,

    /// Offering year. Integers in the manifest are stringified.
    #[serde(default, deserialize_with = "lenient::string")]
    pub year: String,

    /// Course levels, e.g. `["Undergraduate"]`.
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub level: Vec<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub term: String,

    /// Topic paths, broadest first, e.g. `[["Engineering", "Mechanical Engineering"]]`.
    #[serde(default, deserialize_with = "lenient::topics")]
    pub topics: Vec<Vec<String>>,

    /// Instructor display names.
    #[serde(default, deserialize_with = "lenient::people")]
    pub instructors: Vec<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub primary_course_number: String,

    #[serde(default, deserialize_with = "lenient::string_list")]
    pub learning_resource_types: Vec<String>,
}

impl CourseInfo {
    /// First listed level, if any.
    pub fn primary_level(&self) -> Option<&str> {
        self.level.first().map(String::as_str)
    }
}

/// Deserializers that never fail on shape mismatches.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(super) fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(value_to_string(Value::deserialize(d)?).unwrap_or_default())
    }

    pub(super) fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items.into_iter().filter_map(value_to_string).collect(),
            other => value_to_string(other).into_iter().collect(),
        })
    }

    pub(super) fn topics<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<String>>, D::Error> {
        let Value::Array(items) = Value::deserialize(d)? else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Array(path) => {
                    let path: Vec<String> = path.into_iter().filter_map(value_to_string).collect();
                    (!path.is_empty()).then_some(path)
                }
                other => value_to_string(other).map(|s| vec![s]),
            })
            .collect())
    }

    pub(super) fn people<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let Value::Array(items) = Value::deserialize(d)? else {
            return Ok(Vec::new());
        };
        Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => {
                    if let Some(title) = map.get("title").and_then(Value::as_str) {
                        if !title.trim().is_empty() {
                            return Some(title.trim().to_string());
                        }
                    }
                    let name = ["first_name", "middle_initial", "last_name"]
                        .iter()
                        .filter_map(|k| map.get(*k).and_then(Value::as_str))
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ");
                    (!name.is_empty()).then_some(name)
                }
                other => value_to_string(other),
            })
            .collect())
    }

    fn value_to_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ResourceDescriptor
// ---------------------------------------------------------------------------

/// One downloadable resource, as described by a per-resource manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Bare file name (last path segment of the manifest's `file`), may be empty.
    pub file_name: String,
    /// Learning-resource-type tags (`"Assignments"`, `"Lecture Notes"`, ...).
    pub learning_resource_types: BTreeSet<String>,
    /// Lower-cased extension including the dot, or empty.
    pub extension: String,
}

impl ResourceDescriptor {
    /// Build a descriptor from the manifest's `file` path and tag list.
    pub fn new<I, S>(file: Option<&str>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let file_name = file
            .and_then(|f| f.rsplit('/').next())
            .unwrap_or_default()
            .to_string();
        let extension = match file_name.rfind('.') {
            Some(idx) if idx > 0 => file_name[idx..].to_ascii_lowercase(),
            _ => String::new(),
        };

        Self {
            file_name,
            learning_resource_types: tags.into_iter().map(Into::into).collect(),
            extension,
        }
    }

    /// Whether the descriptor carries `tag` (exact match).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.learning_resource_types.contains(tag)
    }

    /// Whether the file is a PDF (extension compared case-insensitively).
    pub fn is_pdf(&self) -> bool {
        !self.file_name.is_empty() && self.extension == ".pdf"
    }
}

// ---------------------------------------------------------------------------
// ProblemSolutionPair
// ---------------------------------------------------------------------------

/// A problem file and the solution file sharing its assignment number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSolutionPair {
    /// Two-digit zero-padded assignment number, e.g. `"03"`.
    pub id: String,
    pub problem_file: String,
    pub solution_file: String,
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Aggregate outcome of a full harvesting run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub total_courses: usize,
    pub successful: usize,
    pub failed: usize,
    /// Course URLs that failed, in processing order.
    pub failed_courses: Vec<String>,
}

impl RunSummary {
    /// Start a new, empty summary stamped with the current time.
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            total_courses: 0,
            successful: 0,
            failed: 0,
            failed_courses: Vec::new(),
        }
    }

    pub fn record_success(&mut self) {
        self.successful += 1;
    }

    pub fn record_failure(&mut self, course_url: impl Into<String>) {
        self.failed += 1;
        self.failed_courses.push(course_url.into());
    }

    /// Stamp the end time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
