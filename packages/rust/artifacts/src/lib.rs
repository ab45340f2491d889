//! Combined PDF artifacts for a harvested course.
//!
//! A course produces up to three kinds of file in its output directory:
//! - `combined_lectures.pdf`: every lecture-notes PDF, in order
//! - `combined_readings.pdf`: every readings PDF, in order
//! - `problem_set_NN.pdf`: one per problem/solution pair, problem first
//!
//! Sources that are missing or unreadable are skipped with a warning.
//! A group with no usable pages writes no file.

use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId, dictionary};
use tracing::{debug, info, instrument, warn};

use ocwharvest_shared::{HarvestError, ProblemSolutionPair, Result};

/// Output name for the combined lecture notes.
pub const LECTURES_FILE: &str = "combined_lectures.pdf";

/// Output name for the combined readings.
pub const READINGS_FILE: &str = "combined_readings.pdf";

/// Output name of the `index`-th problem set (1-based).
pub fn problem_set_file_name(index: usize) -> String {
    format!("problem_set_{index:02}.pdf")
}

/// Outcome of combining one group of PDFs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineReport {
    /// Path of the written file, `None` when nothing was written.
    pub output: Option<PathBuf>,
    /// Sources whose pages were included.
    pub included: usize,
    /// Sources that were skipped, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
    /// Total pages in the written file.
    pub pages: usize,
}

/// Files written for one course.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseArtifacts {
    pub lectures: Option<PathBuf>,
    pub readings: Option<PathBuf>,
    pub problem_sets: Vec<PathBuf>,
}

impl CourseArtifacts {
    /// Number of files written.
    pub fn len(&self) -> usize {
        usize::from(self.lectures.is_some())
            + usize::from(self.readings.is_some())
            + self.problem_sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Course-level output
// ---------------------------------------------------------------------------

/// Write every combined PDF for a course into `out_dir`.
///
/// File names in `lectures`, `readings`, and `pairs` are resolved against
/// `static_dir`. Problem sets are numbered by their position in `pairs`.
/// A group that fails to merge or save is logged and left out; the other
/// groups are still written. Only failing to create `out_dir` is an error.
#[instrument(skip_all, fields(out_dir = %out_dir.display()))]
pub fn write_course_pdfs(
    static_dir: &Path,
    out_dir: &Path,
    lectures: &[String],
    readings: &[String],
    pairs: &[ProblemSolutionPair],
) -> Result<CourseArtifacts> {
    std::fs::create_dir_all(out_dir).map_err(|e| HarvestError::io(out_dir, e))?;

    let resolve = |names: &[String]| -> Vec<PathBuf> {
        names.iter().map(|name| static_dir.join(name)).collect()
    };

    let mut artifacts = CourseArtifacts {
        lectures: combine_group(&resolve(lectures), &out_dir.join(LECTURES_FILE)),
        readings: combine_group(&resolve(readings), &out_dir.join(READINGS_FILE)),
        problem_sets: Vec::with_capacity(pairs.len()),
    };

    for (i, pair) in pairs.iter().enumerate() {
        let sources = [
            static_dir.join(&pair.problem_file),
            static_dir.join(&pair.solution_file),
        ];
        let target = out_dir.join(problem_set_file_name(i + 1));
        if let Some(path) = combine_group(&sources, &target) {
            artifacts.problem_sets.push(path);
        }
    }

    info!(files = artifacts.len(), "course pdfs written");
    Ok(artifacts)
}

/// Combine one group, logging a failure instead of returning it.
fn combine_group(sources: &[PathBuf], output: &Path) -> Option<PathBuf> {
    match combine_pdfs(sources, output) {
        Ok(report) => report.output,
        Err(e) => {
            warn!(output = %output.display(), error = %e, "combined pdf not written");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Concatenate the pages of `sources`, in order, into `output`.
///
/// Each source's page tree is hung under a new root so inherited page
/// attributes survive. Only a failure to write `output` is an error.
pub fn combine_pdfs(sources: &[PathBuf], output: &Path) -> Result<CombineReport> {
    let mut report = CombineReport {
        output: None,
        included: 0,
        skipped: Vec::new(),
        pages: 0,
    };

    let mut documents = Vec::with_capacity(sources.len());
    for source in sources {
        if !source.is_file() {
            warn!(path = %source.display(), "pdf source missing, skipping");
            report.skipped.push((source.clone(), "file does not exist".into()));
            continue;
        }
        match Document::load(source) {
            Ok(doc) if !doc.get_pages().is_empty() => documents.push(doc),
            Ok(_) => {
                warn!(path = %source.display(), "pdf source has no pages, skipping");
                report.skipped.push((source.clone(), "no pages".into()));
            }
            Err(e) => {
                warn!(path = %source.display(), error = %e, "pdf source unreadable, skipping");
                report.skipped.push((source.clone(), e.to_string()));
            }
        }
    }

    if documents.is_empty() {
        debug!(output = %output.display(), "no pages to combine");
        return Ok(report);
    }

    report.included = documents.len();
    let mut merged = merge_documents(documents)
        .map_err(|e| HarvestError::Pdf(format!("{}: {e}", output.display())))?;
    report.pages = merged.get_pages().len();

    merged.compress();
    merged
        .save(output)
        .map_err(|e| HarvestError::Pdf(format!("{}: {e}", output.display())))?;

    debug!(output = %output.display(), pages = report.pages, "pdf written");
    report.output = Some(output.to_path_buf());
    Ok(report)
}

fn merge_documents(documents: Vec<Document>) -> lopdf::Result<Document> {
    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut kids: Vec<ObjectId> = Vec::with_capacity(documents.len());
    let mut page_count: i64 = 0;

    for mut doc in documents {
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let catalog_id = doc.trailer.get(b"Root")?.as_reference()?;
        let pages_id = doc
            .get_object(catalog_id)?
            .as_dict()?
            .get(b"Pages")?
            .as_reference()?;

        page_count += doc.get_pages().len() as i64;
        kids.push(pages_id);

        doc.objects.remove(&catalog_id);
        merged.objects.extend(doc.objects);
    }

    merged.max_id = next_id;
    let root_pages_id = merged.new_object_id();

    for kid in &kids {
        if let Some(Object::Dictionary(dict)) = merged.objects.get_mut(kid) {
            dict.set("Parent", Object::Reference(root_pages_id));
        }
    }

    merged.objects.insert(
        root_pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => page_count,
        }),
    );

    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(root_pages_id),
    });
    merged.trailer.set("Root", Object::Reference(catalog_id));

    Ok(merged)
}
