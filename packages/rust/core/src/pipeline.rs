//! Whole-run pipeline: catalog search → download links → per-course harvest.

use tracing::{error, info, instrument};

use ocwharvest_catalog::search_courses;
use ocwharvest_shared::{AppConfig, CatalogConfig, HarvestError, Result, RunSummary};
use ocwharvest_storage::Storage;

use crate::course::{CourseOutcome, Harvester};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a course is harvested.
    fn course_started(&self, course_url: &str, current: usize, total: usize);
    /// Called after a course, with its outcome when it succeeded.
    fn course_finished(&self, course_url: &str, outcome: Option<&CourseOutcome>);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn course_started(&self, _course_url: &str, _current: usize, _total: usize) {}
    fn course_finished(&self, _course_url: &str, _outcome: Option<&CourseOutcome>) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Harvest every course the catalog returns.
///
/// A course failure is recorded in the summary and the run moves on. An
/// empty catalog result, or no course with a usable archive link, is an error.
#[instrument(skip_all, fields(department = %config.catalog.department))]
pub async fn run_pipeline(
    config: &AppConfig,
    harvester: &Harvester,
    storage: &Storage,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let mut summary = RunSummary::start();

    progress.phase("Searching catalog");
    let course_urls = search_courses(&CatalogConfig::from(config)).await?;
    if course_urls.is_empty() {
        return Err(HarvestError::validation("catalog search returned no course urls"));
    }

    progress.phase("Locating course archives");
    let downloads = harvester.fetcher().scrape_download_links(&course_urls).await;
    if downloads.is_empty() {
        return Err(HarvestError::validation(format!(
            "none of {} courses had a downloadable archive",
            course_urls.len()
        )));
    }

    summary.total_courses = downloads.len();
    progress.phase("Harvesting courses");

    for (i, course) in downloads.iter().enumerate() {
        progress.course_started(&course.course_url, i + 1, downloads.len());

        match harvester.harvest(storage, course).await {
            Ok(outcome) => {
                summary.record_success();
                progress.course_finished(&course.course_url, Some(&outcome));
            }
            Err(e) => {
                error!(course = %course.course_url, error = %e, "course failed");
                summary.record_failure(course.course_url.clone());
                progress.course_finished(&course.course_url, None);
            }
        }
    }

    summary.finish();
    info!(
        total = summary.total_courses,
        successful = summary.successful,
        failed = summary.failed,
        "run complete"
    );
    progress.done(&summary);
    Ok(summary)
}
