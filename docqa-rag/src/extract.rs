//! Turning uploaded bytes into plain text.
//!
//! An [`ExtractorRegistry`] maps lowercase file extensions to
//! [`TextExtractor`]s and falls back to UTF-8 decoding for anything it does
//! not recognise.
//!
//! | Extension   | Extractor             | Requires                      |
//! |-------------|-----------------------|-------------------------------|
//! | `pdf`       | [`PdfExtractor`]      | `pdftotext` (poppler) on PATH |
//! | `docx`      | `DocxExtractor`       | `docx` feature                |
//! | `txt`, `md` | [`PlainTextExtractor`]| nothing                       |

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{RagError, Result};

/// Extracts plain text from the raw bytes of one document format.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Short format name used in logs and errors.
    fn format(&self) -> &str;

    /// Return the document text.
    async fn extract(&self, bytes: &[u8]) -> Result<String>;
}

fn extraction_error(extension: &str, message: impl Into<String>) -> RagError {
    RagError::Extraction { extension: extension.to_string(), message: message.into() }
}

/// Decodes UTF-8 text, dropping a leading byte-order mark.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn format(&self) -> &str {
        "txt"
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| extraction_error("txt", format!("content is not valid UTF-8: {e}")))?;
        Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
    }
}

/// Extracts PDF text with the `pdftotext` binary from poppler.
///
/// The bytes are written to a temporary file which is removed when
/// extraction finishes.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    program: String,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self { program: "pdftotext".into() }
    }
}

impl PdfExtractor {
    /// Use `program` instead of `pdftotext` from PATH.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    fn format(&self) -> &str {
        "pdf"
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        let mut file = tempfile::Builder::new()
            .prefix("docqa-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| extraction_error("pdf", format!("failed to create temp file: {e}")))?;
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .map_err(|e| extraction_error("pdf", format!("failed to write temp file: {e}")))?;

        let output = tokio::process::Command::new(&self.program)
            .arg("-enc")
            .arg("UTF-8")
            .arg(file.path())
            .arg("-")
            .output()
            .await
            .map_err(|e| {
                warn!(program = %self.program, error = %e, "failed to run pdf extractor");
                extraction_error(
                    "pdf",
                    format!("failed to run {}: {e} (is poppler installed?)", self.program),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(program = %self.program, status = %output.status, "pdf extraction failed");
            return Err(extraction_error("pdf", format!("{} failed: {}", self.program, stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            warn!("pdf contained no extractable text");
        }
        debug!(chars = text.chars().count(), "extracted pdf text");
        Ok(text)
    }
}

/// Extracts the paragraphs of a Word document, one per line.
///
/// Reads `word/document.xml` from the archive and keeps the text runs of
/// every `<w:p>` element. Formatting, tables of contents, headers, and
/// footers are ignored.
#[cfg(feature = "docx")]
#[derive(Debug, Clone)]
pub struct DocxExtractor {
    paragraph: regex::Regex,
    run: regex::Regex,
}

#[cfg(feature = "docx")]
impl DocxExtractor {
    /// Create the extractor.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the built-in patterns fail to
    /// compile.
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            regex::Regex::new(pattern).map_err(|e| RagError::Configuration(e.to_string()))
        };
        Ok(Self {
            paragraph: compile(r"(?s)<w:p(?: [^>]*)?/>|<w:p(?: [^>]*)?>.*?</w:p>")?,
            run: compile(r"(?s)<w:t(?: [^>]*)?>(.*?)</w:t>")?,
        })
    }

    fn paragraphs(&self, xml: &str) -> Vec<String> {
        self.paragraph
            .find_iter(xml)
            .map(|paragraph| {
                self.run
                    .captures_iter(paragraph.as_str())
                    .filter_map(|run| run.get(1))
                    .map(|text| unescape_xml(text.as_str()))
                    .collect::<String>()
            })
            .collect()
    }
}

#[cfg(feature = "docx")]
fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(feature = "docx")]
#[async_trait]
impl TextExtractor for DocxExtractor {
    fn format(&self) -> &str {
        "docx"
    }

    async fn extract(&self, bytes: &[u8]) -> Result<String> {
        use std::io::Read;

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| extraction_error("docx", format!("not a zip archive: {e}")))?;
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| extraction_error("docx", format!("missing word/document.xml: {e}")))?
            .read_to_string(&mut xml)
            .map_err(|e| extraction_error("docx", format!("failed to read document.xml: {e}")))?;

        let paragraphs = self.paragraphs(&xml);
        debug!(paragraphs = paragraphs.len(), "extracted docx text");
        Ok(paragraphs.join("\n"))
    }
}

/// Chooses a [`TextExtractor`] by file extension.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::ExtractorRegistry;
///
/// let registry = ExtractorRegistry::with_defaults()?;
/// let text = registry.extract("notes.md", b"# Notes\n\nFirst point.").await?;
/// ```
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn TextExtractor>>,
    fallback: Arc<dyn TextExtractor>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl ExtractorRegistry {
    /// A registry with no extractors; everything goes through the UTF-8
    /// fallback.
    pub fn empty() -> Self {
        Self { extractors: HashMap::new(), fallback: Arc::new(PlainTextExtractor) }
    }

    /// A registry handling `pdf`, `txt`, `md`, and (with the `docx` feature)
    /// `docx`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if an extractor cannot be built.
    pub fn with_defaults() -> Result<Self> {
        let plain: Arc<dyn TextExtractor> = Arc::new(PlainTextExtractor);
        #[allow(unused_mut)]
        let mut registry = Self::empty()
            .register("pdf", Arc::new(PdfExtractor::default()))
            .register("txt", plain.clone())
            .register("md", plain);
        #[cfg(feature = "docx")]
        {
            registry = registry.register("docx", Arc::new(DocxExtractor::new()?));
        }
        Ok(registry)
    }

    /// Handle files ending in `.{extension}` (case-insensitive) with
    /// `extractor`, replacing any previous registration.
    pub fn register(mut self, extension: &str, extractor: Arc<dyn TextExtractor>) -> Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        self.extractors.insert(extension, extractor);
        self
    }

    /// Replace the extractor used for unknown extensions.
    pub fn with_fallback(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.fallback = extractor;
        self
    }

    /// Whether an extractor is registered for `filename`'s extension.
    pub fn supports(&self, filename: &str) -> bool {
        extension_of(filename).is_some_and(|ext| self.extractors.contains_key(&ext))
    }

    /// Extract the text of `bytes`, choosing the extractor from `filename`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Extraction`] if the chosen extractor fails.
    pub async fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let extension = extension_of(filename).unwrap_or_default();
        let text = match self.extractors.get(&extension) {
            Some(extractor) => extractor.extract(bytes).await?,
            None => {
                debug!(filename, extension = %extension, "no extractor registered, using fallback");
                self.fallback.extract(bytes).await.map_err(|e| {
                    extraction_error(
                        &extension,
                        format!("unsupported file type and fallback failed: {e}"),
                    )
                })?
            }
        };
        info!(filename, chars = text.chars().count(), "extracted document text");
        Ok(text)
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename).extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase)
}
