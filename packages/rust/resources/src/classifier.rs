//! Resource classification into named buckets.
//!
//! A descriptor lands in a bucket when its tag set contains the bucket's tag
//! (exact match) and its file is a PDF (extension compared case-insensitively).
//! Buckets keep descriptor encounter order and are not deduplicated against
//! each other.

use ocwharvest_shared::ResourceDescriptor;

/// A named classification group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Assignments,
    LectureNotes,
    Readings,
}

impl Bucket {
    /// Every bucket, in reporting order.
    pub const ALL: [Bucket; 3] = [Bucket::Assignments, Bucket::LectureNotes, Bucket::Readings];

    /// The learning-resource-type tag that selects this bucket.
    pub fn tag(self) -> &'static str {
        match self {
            Bucket::Assignments => "Assignments",
            Bucket::LectureNotes => "Lecture Notes",
            Bucket::Readings => "Readings",
        }
    }

    /// Whether `descriptor` belongs in this bucket.
    pub fn accepts(self, descriptor: &ResourceDescriptor) -> bool {
        descriptor.is_pdf() && descriptor.has_tag(self.tag())
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// File names per bucket for one course.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceBuckets {
    pub assignments: Vec<String>,
    pub lecture_notes: Vec<String>,
    pub readings: Vec<String>,
}

impl ResourceBuckets {
    /// File names in `bucket`.
    pub fn get(&self, bucket: Bucket) -> &[String] {
        match bucket {
            Bucket::Assignments => &self.assignments,
            Bucket::LectureNotes => &self.lecture_notes,
            Bucket::Readings => &self.readings,
        }
    }

    fn get_mut(&mut self, bucket: Bucket) -> &mut Vec<String> {
        match bucket {
            Bucket::Assignments => &mut self.assignments,
            Bucket::LectureNotes => &mut self.lecture_notes,
            Bucket::Readings => &mut self.readings,
        }
    }

    /// Total number of entries across buckets (a file in two buckets counts twice).
    pub fn len(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.get(*b).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `descriptors` into assignment, lecture-note, and reading buckets.
pub fn classify(descriptors: &[ResourceDescriptor]) -> ResourceBuckets {
    let mut buckets = ResourceBuckets::default();

    for descriptor in descriptors {
        for bucket in Bucket::ALL {
            if bucket.accepts(descriptor) {
                buckets.get_mut(bucket).push(descriptor.file_name.clone());
            }
        }
    }

    tracing::debug!(
        assignments = buckets.assignments.len(),
        lecture_notes = buckets.lecture_notes.len(),
        readings = buckets.readings.len(),
        "resources classified"
    );

    buckets
}
