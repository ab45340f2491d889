//! Plain-text extraction for course resources.
//!
//! The extraction strategy is picked by file extension:
//! - `.json`: re-serialized with two-space indentation
//! - `.pdf`: converted through a [`PdfConverter`], then cleaned up
//! - anything else: read as UTF-8 (lossy) and truncated after `max_lines`

mod cleanup;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

use tracing::{debug, instrument, warn};

use ocwharvest_shared::{HarvestError, Result};

/// Default line limit for plain-text resources.
pub const DEFAULT_MAX_LINES: usize = 10_000;

// ---------------------------------------------------------------------------
// PDF conversion seam
// ---------------------------------------------------------------------------

/// Converts a PDF file on disk into text.
pub trait PdfConverter: Send + Sync {
    fn convert(&self, path: &Path) -> Result<String>;
}

/// [`PdfConverter`] backed by the `pdf-extract` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractConverter;

impl PdfConverter for PdfExtractConverter {
    fn convert(&self, path: &Path) -> Result<String> {
        // pdf-extract panics on some malformed inputs
        match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(HarvestError::Pdf(format!("{}: {e}", path.display()))),
            Err(_) => Err(HarvestError::Pdf(format!(
                "{}: converter panicked",
                path.display()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Reads resource files into text suitable for storage.
pub struct TextExtractor {
    max_lines: usize,
    pdf: Box<dyn PdfConverter>,
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

impl TextExtractor {
    /// Create an extractor using [`PdfExtractConverter`] for PDFs.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            pdf: Box::new(PdfExtractConverter),
        }
    }

    /// Replace the PDF converter.
    pub fn with_pdf_converter(mut self, converter: impl PdfConverter + 'static) -> Self {
        self.pdf = Box::new(converter);
        self
    }

    /// Extract the text of the file at `path`.
    ///
    /// A missing file is an error. A PDF that fails to convert yields empty
    /// text with a warning, so the resource is still recorded.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn extract(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(HarvestError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => read_json_pretty(path),
            "pdf" => Ok(self.read_pdf(path)),
            _ => read_truncated(path, self.max_lines),
        }
    }

    fn read_pdf(&self, path: &Path) -> String {
        match self.pdf.convert(path) {
            Ok(raw) => {
                let text = cleanup::run_pipeline(&raw);
                debug!(chars = text.chars().count(), "pdf converted");
                text
            }
            Err(e) => {
                warn!(error = %e, "pdf conversion failed, storing empty text");
                String::new()
            }
        }
    }
}

fn read_json_pretty(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| HarvestError::parse(format!("{}: {e}", path.display())))?;
    serde_json::to_string_pretty(&value)
        .map_err(|e| HarvestError::parse(format!("{}: {e}", path.display())))
}

fn read_truncated(path: &Path, max_lines: usize) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| HarvestError::io(path, e))?;
    Ok(truncate_lines(&String::from_utf8_lossy(&bytes), max_lines))
}

/// Keep the first `max_lines` lines of `text`, appending a marker if any were cut.
pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    let mut lines = text.split_inclusive('\n');
    let kept: String = lines.by_ref().take(max_lines).collect();

    if lines.next().is_some() {
        format!("{kept}\n... (truncated at {max_lines} lines)")
    } else {
        kept
    }
}
