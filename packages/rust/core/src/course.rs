//! Per-course harvesting.
//!
//! One course is processed start to finish before the next begins. The
//! corpus directory belongs to the course in progress and is cleared first.
//!
//! Errors split three ways:
//! - archive download/extraction, the root manifest, and the course record
//!   are fatal for the course
//! - a missing resource file, a failed extraction, or a failed record write
//!   skips that resource with a log line
//! - unpaired assignment numbers are dropped without a log line

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument, warn};

use ocwharvest_artifacts::{CourseArtifacts, write_course_pdfs};
use ocwharvest_fetcher::{CourseDownload, Fetcher, extract_archive};
use ocwharvest_resources::{classify, pair_assignments, read_course_info, read_descriptors};
use ocwharvest_shared::{AppConfig, FetchConfig, HarvestError, ProblemSolutionPair, RecordId, Result};
use ocwharvest_storage::{DocumentKind, NewCourse, NewDocument, NewProblemSet, Storage};
use ocwharvest_text::TextExtractor;

/// Name of the downloaded archive inside the corpus directory.
const ARCHIVE_FILE: &str = "download.zip";

/// Directory of resource payloads inside an extracted archive.
const STATIC_RESOURCES_DIR: &str = "static_resources";

// ---------------------------------------------------------------------------
// Options and outcome
// ---------------------------------------------------------------------------

/// Runtime per-course settings.
#[derive(Debug, Clone)]
pub struct CourseOptions {
    /// Staging directory, cleared at the start of each course.
    pub corpus_dir: PathBuf,
    /// Combined PDFs go to `<out_dir>/<slug>/`.
    pub out_dir: PathBuf,
    pub combine_pdfs: bool,
    pub max_text_lines: usize,
}

impl From<&AppConfig> for CourseOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            corpus_dir: PathBuf::from(&config.defaults.corpus_dir),
            out_dir: PathBuf::from(&config.defaults.out_dir),
            combine_pdfs: config.defaults.combine_pdfs,
            max_text_lines: config.defaults.max_text_lines,
        }
    }
}

/// What one course produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOutcome {
    pub course_id: RecordId,
    pub course_number: String,
    pub slug: String,
    /// Archive SHA-256, lower-case hex.
    pub archive_sha256: String,
    pub problem_sets: usize,
    pub lectures: usize,
    pub readings: usize,
    /// Resources left out because a file was missing or a step failed.
    pub skipped: usize,
    pub artifacts: CourseArtifacts,
}

/// Last path segment of a course URL.
pub fn course_slug(course_url: &str) -> String {
    course_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Public URL of a resource file: `<course_url>/<file_name>`.
pub fn remote_url(course_url: &str, file_name: &str) -> String {
    format!("{}/{file_name}", course_url.trim_end_matches('/'))
}

/// Remove everything inside `dir`, creating it if needed.
fn clear_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| HarvestError::io(dir, e))?;

    for entry in std::fs::read_dir(dir).map_err(|e| HarvestError::io(dir, e))? {
        let entry = entry.map_err(|e| HarvestError::io(dir, e))?;
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .map_err(|e| HarvestError::io(&path, e))?
            .is_dir();

        if is_dir {
            std::fs::remove_dir_all(&path).map_err(|e| HarvestError::io(&path, e))?;
        } else {
            std::fs::remove_file(&path).map_err(|e| HarvestError::io(&path, e))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Runs the per-course sequence against one store.
pub struct Harvester {
    options: CourseOptions,
    fetcher: Fetcher,
    extractor: TextExtractor,
}

impl Harvester {
    /// Build a harvester from the application config.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let options = CourseOptions::from(config);
        let extractor = TextExtractor::new(options.max_text_lines);
        Ok(Self {
            options,
            fetcher: Fetcher::new(FetchConfig::from(config))?,
            extractor,
        })
    }

    /// Replace the text extractor.
    pub fn with_text_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Override whether combined PDFs are written.
    pub fn with_combine_pdfs(mut self, combine: bool) -> Self {
        self.options.combine_pdfs = combine;
        self
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Download, classify, persist, and combine one course.
    #[instrument(skip_all, fields(course = %course.course_url))]
    pub async fn harvest(&self, storage: &Storage, course: &CourseDownload) -> Result<CourseOutcome> {
        let slug = course_slug(&course.course_url);
        let corpus = &self.options.corpus_dir;

        clear_dir(corpus)?;
        let archive = self
            .fetcher
            .download_archive(&course.download_url, &corpus.join(ARCHIVE_FILE))
            .await?;
        extract_archive(&archive.path, corpus)?;

        let info = read_course_info(corpus)?;
        let descriptors = read_descriptors(corpus)?;
        let buckets = classify(&descriptors);
        let pairs = pair_assignments(&buckets.assignments);

        info!(
            %slug,
            title = %info.course_title,
            assignments = buckets.assignments.len(),
            pairs = pairs.len(),
            lectures = buckets.lecture_notes.len(),
            readings = buckets.readings.len(),
            "course classified"
        );

        let course_number = if info.primary_course_number.trim().is_empty() {
            warn!(%slug, "course manifest has no course number, using slug");
            slug.clone()
        } else {
            info.primary_course_number.clone()
        };

        let course_id = storage
            .upsert_course(&NewCourse {
                course_number: &course_number,
                info: &info,
                url: &course.course_url,
                download_url: &course.download_url,
                archive_sha256: Some(archive.sha256.as_str()),
            })
            .await?;

        let mut outcome = CourseOutcome {
            course_id,
            course_number,
            slug,
            archive_sha256: archive.sha256,
            problem_sets: 0,
            lectures: 0,
            readings: 0,
            skipped: 0,
            artifacts: CourseArtifacts::default(),
        };
        let static_dir = corpus.join(STATIC_RESOURCES_DIR);

        for pair in &pairs {
            match self
                .store_problem_set(storage, &outcome.course_id, &course.course_url, &static_dir, pair)
                .await
            {
                Ok(true) => outcome.problem_sets += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    error!(id = %pair.id, error = %e, "problem set not stored");
                    outcome.skipped += 1;
                }
            }
        }

        for (kind, names) in [
            (DocumentKind::Lecture, &buckets.lecture_notes),
            (DocumentKind::Reading, &buckets.readings),
        ] {
            for name in names {
                match self
                    .store_document(storage, kind, &outcome.course_id, &course.course_url, &static_dir, name)
                    .await
                {
                    Ok(true) if kind == DocumentKind::Lecture => outcome.lectures += 1,
                    Ok(true) => outcome.readings += 1,
                    Ok(false) => outcome.skipped += 1,
                    Err(e) => {
                        error!(file = %name, error = %e, "document not stored");
                        outcome.skipped += 1;
                    }
                }
            }
        }

        if self.options.combine_pdfs {
            let out_dir = self.options.out_dir.join(&outcome.slug);
            let written = clear_dir(&out_dir).and_then(|()| {
                write_course_pdfs(
                    &static_dir,
                    &out_dir,
                    &buckets.lecture_notes,
                    &buckets.readings,
                    &pairs,
                )
            });
            match written {
                Ok(artifacts) => outcome.artifacts = artifacts,
                Err(e) => warn!(out_dir = %out_dir.display(), error = %e, "combined pdfs not written"),
            }
        }

        info!(
            course_number = %outcome.course_number,
            problem_sets = outcome.problem_sets,
            lectures = outcome.lectures,
            readings = outcome.readings,
            skipped = outcome.skipped,
            "course harvested"
        );
        Ok(outcome)
    }

    /// Store one problem set. `Ok(false)` means a file was missing.
    async fn store_problem_set(
        &self,
        storage: &Storage,
        course_id: &RecordId,
        course_url: &str,
        static_dir: &Path,
        pair: &ProblemSolutionPair,
    ) -> Result<bool> {
        let problem_path = static_dir.join(&pair.problem_file);
        let solution_path = static_dir.join(&pair.solution_file);
        for path in [&problem_path, &solution_path] {
            if !path.is_file() {
                warn!(file = %path.display(), "resource file missing, skipping problem set");
                return Ok(false);
            }
        }

        let problem_text = self.extractor.extract(&problem_path)?;
        let solution_text = self.extractor.extract(&solution_path)?;
        let remote_problem_url = remote_url(course_url, &pair.problem_file);
        let remote_solution_url = remote_url(course_url, &pair.solution_file);

        storage
            .upsert_problem_set(&NewProblemSet {
                course_id,
                problem_text: &problem_text,
                solution_text: &solution_text,
                remote_problem_url: &remote_problem_url,
                remote_solution_url: &remote_solution_url,
            })
            .await?;
        debug!(id = %pair.id, "problem set stored");
        Ok(true)
    }

    /// Store one lecture or reading. `Ok(false)` means the file was missing.
    async fn store_document(
        &self,
        storage: &Storage,
        kind: DocumentKind,
        course_id: &RecordId,
        course_url: &str,
        static_dir: &Path,
        file_name: &str,
    ) -> Result<bool> {
        let path = static_dir.join(file_name);
        if !path.is_file() {
            warn!(file = %path.display(), ?kind, "resource file missing, skipping");
            return Ok(false);
        }

        let text = self.extractor.extract(&path)?;
        let url = remote_url(course_url, file_name);
        storage
            .upsert_document(
                kind,
                &NewDocument {
                    course_id,
                    llm_text: &text,
                    remote_url: &url,
                },
            )
            .await?;
        debug!(file = %file_name, ?kind, "document stored");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, FixedPdf};
    use ocwharvest_artifacts::{LECTURES_FILE, READINGS_FILE};
    use wiremock::MockServer;

    #[test]
    fn slug_is_last_segment() {
        assert_eq!(course_slug("https://ocw.mit.edu/courses/2-003sc-fall-2011"), "2-003sc-fall-2011");
        assert_eq!(course_slug("https://ocw.mit.edu/courses/x/"), "x");
    }

    #[test]
    fn remote_url_joins_file_name() {
        assert_eq!(
            remote_url("https://ocw.mit.edu/courses/x", "hw01.pdf"),
            "https://ocw.mit.edu/courses/x/hw01.pdf"
        );
    }

    #[test]
    fn clear_dir_empties_and_creates() {
        let dir = testutil::temp_dir().join("corpus");
        std::fs::create_dir_all(dir.join("nested/deeper")).unwrap();
        std::fs::write(dir.join("a.txt"), "a").unwrap();
        std::fs::write(dir.join("nested/b.txt"), "b").unwrap();

        clear_dir(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        let fresh = dir.join("fresh");
        clear_dir(&fresh).unwrap();
        assert!(fresh.is_dir());
    }

    #[tokio::test]
    async fn course_is_persisted_and_combined() {
        let server = MockServer::start().await;
        testutil::mount_course(&server, "dyn", testutil::sample_course_zip(Some("2.003SC"))).await;

        let root = testutil::temp_dir();
        let config = testutil::test_config(&root, &server.uri());
        let storage = Storage::open(&root.join("harvest.db")).await.unwrap();
        let harvester = Harvester::new(&config)
            .unwrap()
            .with_text_extractor(TextExtractor::default().with_pdf_converter(FixedPdf("page text")));

        // stale files from a previous course must not survive
        std::fs::create_dir_all(root.join("corpus")).unwrap();
        std::fs::write(root.join("corpus/stale.txt"), "old").unwrap();

        let course = testutil::download_for(&server, "dyn");
        let outcome = harvester.harvest(&storage, &course).await.unwrap();

        assert_eq!(outcome.course_number, "2.003SC");
        assert_eq!(outcome.slug, "dyn");
        assert_eq!(outcome.problem_sets, 1);
        assert_eq!(outcome.lectures, 2);
        assert_eq!(outcome.readings, 0);
        assert_eq!(outcome.skipped, 1);
        assert!(!root.join("corpus/stale.txt").exists());

        let stored = storage.get_course_by_number("2.003SC").await.unwrap().unwrap();
        assert_eq!(stored.title, "Engineering Dynamics");
        assert_eq!(stored.year, "2011");
        assert_eq!(stored.archive_sha256.as_deref(), Some(outcome.archive_sha256.as_str()));

        let sets = storage.list_problem_sets(&outcome.course_id).await.unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].remote_problem_url, format!("{}/hw01.pdf", course.course_url));
        assert_eq!(sets[0].remote_solution_url, format!("{}/hw01_sol.pdf", course.course_url));
        assert_eq!(sets[0].character_count, 20);

        let lectures = storage
            .list_documents(DocumentKind::Lecture, &outcome.course_id)
            .await
            .unwrap();
        assert_eq!(lectures.len(), 2);
        assert_eq!(lectures[0].llm_text, "page text\n");

        let out = root.join("out/dyn");
        assert!(out.join(LECTURES_FILE).is_file());
        assert!(!out.join(READINGS_FILE).exists());
        assert!(out.join("problem_set_01.pdf").is_file());
        assert!(!out.join("problem_set_02.pdf").exists());
        assert_eq!(outcome.artifacts.len(), 2);
    }

    #[tokio::test]
    async fn harvesting_twice_does_not_duplicate_records() {
        let server = MockServer::start().await;
        testutil::mount_course(&server, "dyn", testutil::sample_course_zip(Some("2.003SC"))).await;

        let root = testutil::temp_dir();
        let config = testutil::test_config(&root, &server.uri());
        let storage = Storage::open(&root.join("harvest.db")).await.unwrap();
        let harvester = Harvester::new(&config)
            .unwrap()
            .with_combine_pdfs(false)
            .with_text_extractor(TextExtractor::default().with_pdf_converter(FixedPdf("x")));

        let course = testutil::download_for(&server, "dyn");
        let first = harvester.harvest(&storage, &course).await.unwrap();
        let second = harvester.harvest(&storage, &course).await.unwrap();

        assert_eq!(first.course_id, second.course_id);
        assert_eq!(storage.list_courses().await.unwrap().len(), 1);
        assert_eq!(storage.list_problem_sets(&first.course_id).await.unwrap().len(), 1);
        assert!(second.artifacts.is_empty());
        assert!(!root.join("out/dyn").exists());
    }

    #[tokio::test]
    async fn missing_course_number_falls_back_to_slug() {
        let server = MockServer::start().await;
        testutil::mount_course(&server, "no-number", testutil::sample_course_zip(None)).await;

        let root = testutil::temp_dir();
        let config = testutil::test_config(&root, &server.uri());
        let storage = Storage::open(&root.join("harvest.db")).await.unwrap();
        let harvester = Harvester::new(&config)
            .unwrap()
            .with_combine_pdfs(false)
            .with_text_extractor(TextExtractor::default().with_pdf_converter(FixedPdf("x")));

        let outcome = harvester
            .harvest(&storage, &testutil::download_for(&server, "no-number"))
            .await
            .unwrap();
        assert_eq!(outcome.course_number, "no-number");
    }

    #[tokio::test]
    async fn missing_root_manifest_fails_the_course() {
        let server = MockServer::start().await;
        let zip = testutil::zip_bytes(&[(
            "resources/a/data.json",
            testutil::resource_manifest("a.pdf", &["Readings"]),
        )]);
        testutil::mount_course(&server, "broken", zip).await;

        let root = testutil::temp_dir();
        let config = testutil::test_config(&root, &server.uri());
        let storage = Storage::open(&root.join("harvest.db")).await.unwrap();
        let harvester = Harvester::new(&config).unwrap();

        let err = harvester
            .harvest(&storage, &testutil::download_for(&server, "broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::MissingManifest { .. }));
        assert!(storage.list_courses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_archive_fails_the_course() {
        let server = MockServer::start().await;
        testutil::mount_course(&server, "html", b"<html>maintenance</html>".to_vec()).await;

        let root = testutil::temp_dir();
        let config = testutil::test_config(&root, &server.uri());
        let storage = Storage::open(&root.join("harvest.db")).await.unwrap();
        let harvester = Harvester::new(&config).unwrap();

        let err = harvester
            .harvest(&storage, &testutil::download_for(&server, "html"))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::Archive(_)));
    }
}
