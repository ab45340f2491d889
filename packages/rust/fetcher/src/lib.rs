//! Course download-page scraping and archive retrieval.
//!
//! For each course URL the fetcher reads `<course_url>/download`, finds the
//! course zip link, and can stream that archive to disk while hashing it.

mod archive;
mod links;

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use ocwharvest_shared::{FetchConfig, HarvestError, Result};

pub use archive::{DownloadedArchive, extract_archive};
pub use links::{extract_zip_link, resolve_href};

/// Browser-like User-Agent; the courseware site serves a reduced page otherwise.
const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) ocwharvest/",
    env!("CARGO_PKG_VERSION")
);

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// A course paired with its resolved archive link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDownload {
    pub course_url: String,
    pub download_url: String,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP client for download pages and course archives.
pub struct Fetcher {
    config: FetchConfig,
    client: Client,
}

impl Fetcher {
    /// Create a fetcher with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        // idle timeouts only; page requests add their own total deadline
        let idle = Duration::from_secs(config.archive_timeout_secs);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(idle)
            .read_timeout(idle)
            .build()
            .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Resolve the archive link of one course, `None` if the page has none.
    #[instrument(skip(self))]
    pub async fn find_download_url(&self, course_url: &str) -> Result<Option<String>> {
        let page_url = format!("{}/download", course_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&page_url)
            .timeout(Duration::from_secs(self.config.page_timeout_secs))
            .send()
            .await
            .map_err(|e| HarvestError::Network(format!("{page_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Network(format!("{page_url}: HTTP {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| HarvestError::Network(format!("{page_url}: failed to read body: {e}")))?;

        Ok(extract_zip_link(&html, course_url, &self.config.site_host))
    }

    /// Resolve archive links for `course_urls`, in order.
    ///
    /// Courses whose page fails to load or has no zip link are logged and
    /// left out. Consecutive requests are separated by the configured delay.
    #[instrument(skip_all, fields(courses = course_urls.len()))]
    pub async fn scrape_download_links(&self, course_urls: &[String]) -> Vec<CourseDownload> {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        let mut downloads = Vec::with_capacity(course_urls.len());

        for (i, course_url) in course_urls.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.find_download_url(course_url).await {
                Ok(Some(download_url)) => {
                    debug!(%course_url, %download_url, "zip link found");
                    downloads.push(CourseDownload {
                        course_url: course_url.clone(),
                        download_url,
                    });
                }
                Ok(None) => warn!(%course_url, "no zip link on download page"),
                Err(e) => warn!(%course_url, error = %e, "download page failed, skipping course"),
            }
        }

        info!(found = downloads.len(), "download links scraped");
        downloads
    }

    /// Stream the archive at `url` to `dest`, hashing it on the way.
    ///
    /// There is no overall deadline: the download fails only when connecting
    /// or a single read takes longer than `archive_timeout_secs`.
    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    pub async fn download_archive(&self, url: &str, dest: &Path) -> Result<DownloadedArchive> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HarvestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HarvestError::io(parent, e))?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| HarvestError::io(dest, e))?;
        let mut sink = archive::HashingSink::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| HarvestError::Network(format!("{url}: {e}")))?
        {
            sink.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| HarvestError::io(dest, e))?;
        }
        file.flush().await.map_err(|e| HarvestError::io(dest, e))?;

        let archive = sink.finish(dest.to_path_buf());
        info!(bytes = archive.bytes, sha256 = %archive.sha256, "archive downloaded");
        Ok(archive)
    }
}
