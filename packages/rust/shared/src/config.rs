//! Application configuration for ocwharvest.
//!
//! User config lives at `~/.ocwharvest/ocwharvest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ocwharvest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ocwharvest";

// ---------------------------------------------------------------------------
// Config structs (matching ocwharvest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local paths and per-course behaviour.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Catalog search and download settings.
    #[serde(default)]
    pub catalog: CatalogSection,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Staging directory, cleared at the start of every course.
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: String,

    /// Root directory for combined PDFs (one subdirectory per course).
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    /// Path to the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Write combined lecture/reading/problem-set PDFs.
    #[serde(default = "default_true")]
    pub combine_pdfs: bool,

    /// Non-PDF, non-JSON resources are truncated after this many lines.
    #[serde(default = "default_max_text_lines")]
    pub max_text_lines: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            corpus_dir: default_corpus_dir(),
            out_dir: default_out_dir(),
            database_path: default_database_path(),
            combine_pdfs: true,
            max_text_lines: default_max_text_lines(),
        }
    }
}

fn default_corpus_dir() -> String {
    "corpus".into()
}
fn default_out_dir() -> String {
    "out".into()
}
fn default_database_path() -> String {
    "var/ocwharvest.db".into()
}
fn default_true() -> bool {
    true
}
fn default_max_text_lines() -> usize {
    10_000
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Search API endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Courseware site root; run slugs are joined onto it.
    #[serde(default = "default_site_host")]
    pub site_host: String,

    /// Department (and topic) filter.
    #[serde(default = "default_department")]
    pub department: String,

    /// Course feature tags, any of which qualifies a course.
    #[serde(default = "default_feature_tags")]
    pub feature_tags: Vec<String>,

    /// Results requested per search page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Stop after this many course URLs (unbounded when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_courses: Option<usize>,

    /// Pause between consecutive download-page requests.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Timeout for a search request.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Timeout for a download-page request.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,

    /// Timeout for an archive download.
    #[serde(default = "default_archive_timeout")]
    pub archive_timeout_secs: u64,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            site_host: default_site_host(),
            department: default_department(),
            feature_tags: default_feature_tags(),
            page_size: default_page_size(),
            max_courses: None,
            request_delay_ms: default_request_delay(),
            search_timeout_secs: default_search_timeout(),
            page_timeout_secs: default_page_timeout(),
            archive_timeout_secs: default_archive_timeout(),
        }
    }
}

fn default_api_url() -> String {
    "https://open.mit.edu/api/v0/search/".into()
}
fn default_site_host() -> String {
    "https://ocw.mit.edu/".into()
}
fn default_department() -> String {
    "Mechanical Engineering".into()
}
fn default_feature_tags() -> Vec<String> {
    vec![
        "Lecture Notes".into(),
        "Problem Sets with Solutions".into(),
        "Readings".into(),
    ]
}
fn default_page_size() -> u32 {
    100
}
fn default_request_delay() -> u64 {
    1000
}
fn default_search_timeout() -> u64 {
    30
}
fn default_page_timeout() -> u64 {
    10
}
fn default_archive_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime catalog search configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Search API endpoint.
    pub api_url: String,
    /// Courseware site root.
    pub site_host: String,
    /// Department filter.
    pub department: String,
    /// Feature tags (OR-ed).
    pub feature_tags: Vec<String>,
    /// Page size for `from`/`size` pagination.
    pub page_size: u32,
    /// Upper bound on returned course URLs.
    pub max_courses: Option<usize>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl From<&AppConfig> for CatalogConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_url: config.catalog.api_url.clone(),
            site_host: config.catalog.site_host.clone(),
            department: config.catalog.department.clone(),
            feature_tags: config.catalog.feature_tags.clone(),
            page_size: config.catalog.page_size,
            max_courses: config.catalog.max_courses,
            timeout_secs: config.catalog.search_timeout_secs,
        }
    }
}

/// Runtime download configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Courseware site root, used to resolve root-relative zip links.
    pub site_host: String,
    /// Pause between consecutive download-page requests, in ms.
    pub request_delay_ms: u64,
    /// Download-page request timeout in seconds.
    pub page_timeout_secs: u64,
    /// Archive download timeout in seconds.
    pub archive_timeout_secs: u64,
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            site_host: config.catalog.site_host.clone(),
            request_delay_ms: config.catalog.request_delay_ms,
            page_timeout_secs: config.catalog.page_timeout_secs,
            archive_timeout_secs: config.catalog.archive_timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ocwharvest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| HarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ocwharvest/ocwharvest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| HarvestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| HarvestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| HarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
