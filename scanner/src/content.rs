//! Per-format content extraction.
//!
//! The scanner treats extraction as a capability keyed by file extension:
//! an [`ExtractorSet`] maps lower-case extensions to pluggable
//! [`ContentExtractor`] strategies. Files whose extension nobody claims are
//! skipped silently; claimed files that fail produce a recorded
//! [`ExtractionError`] instead of aborting the scan.
//!
//! Built-ins cover plain text, images, and Jupyter notebooks. Heavier office
//! formats (PDF, DOCX, PPTX) are left to external extractors registered by
//! the caller.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use crate::error::ExtractionError;

/// One unit of extracted content handed to the grading model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text { text: String },
    Image { data: Vec<u8>, mime: String },
}

/// A pluggable extraction strategy for a family of file extensions.
pub trait ContentExtractor: Send + Sync {
    /// Lower-case extensions (without the dot) this extractor claims.
    fn extensions(&self) -> &'static [&'static str];

    /// Extract the file's content. An empty part list means "nothing worth
    /// grading here" and the file is skipped without being an error.
    fn extract(&self, path: &Path) -> Result<Vec<ContentPart>, ExtractionError>;
}

/// Registry of extractors keyed by extension.
#[derive(Default, Clone)]
pub struct ExtractorSet {
    by_extension: HashMap<&'static str, Arc<dyn ContentExtractor>>,
}

impl ExtractorSet {
    /// The built-in capability set: plain text, images, notebooks.
    pub fn builtin() -> Self {
        let mut set = Self::default();
        set.register(Arc::new(TextExtractor));
        set.register(Arc::new(ImageExtractor));
        set.register(Arc::new(NotebookExtractor));
        set
    }

    /// Register an extractor for every extension it claims. Later
    /// registrations win, so callers can override the built-ins.
    pub fn register(&mut self, extractor: Arc<dyn ContentExtractor>) {
        for ext in extractor.extensions() {
            self.by_extension.insert(ext, Arc::clone(&extractor));
        }
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.by_extension
            .contains_key(extension.to_ascii_lowercase().as_str())
    }

    /// Dispatch by extension. `None` means no extractor claims the file.
    pub fn extract(&self, path: &Path) -> Option<Result<Vec<ContentPart>, ExtractionError>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        let extractor = self.by_extension.get(ext.as_str())?;
        Some(extractor.extract(path))
    }
}

// ---------------- built-in extractors ----------------

const TEXT_EXTENSIONS: &[&str] = &[
    "py", "txt", "md", "json", "xml", "html", "htm", "csv", "yaml", "yml",
];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

fn image_mime(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Plain text and code files.
pub struct TextExtractor;

impl ContentExtractor for TextExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        TEXT_EXTENSIONS
    }

    fn extract(&self, path: &Path) -> Result<Vec<ContentPart>, ExtractionError> {
        let raw = fs::read(path).map_err(ExtractionError::io)?;
        // Strict UTF-8 first; legacy encodings fall back to lossy decoding
        // rather than failing the file.
        let text = match String::from_utf8(raw) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![ContentPart::Text { text }])
    }
}

/// Standalone image files, passed through as bytes + mime.
pub struct ImageExtractor;

impl ContentExtractor for ImageExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        IMAGE_EXTENSIONS
    }

    fn extract(&self, path: &Path) -> Result<Vec<ContentPart>, ExtractionError> {
        let data = fs::read(path).map_err(ExtractionError::io)?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Ok(vec![ContentPart::Image {
            data,
            mime: image_mime(&ext).to_string(),
        }])
    }
}

/// Jupyter notebooks: code cells become one text part, embedded output
/// images become image parts. Markdown and raw cells are dropped so the
/// grader sees only the student's code and its rendered results.
pub struct NotebookExtractor;

const NOTEBOOK_IMAGE_MIMES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

impl ContentExtractor for NotebookExtractor {
    fn extensions(&self) -> &'static [&'static str] {
        &["ipynb"]
    }

    fn extract(&self, path: &Path) -> Result<Vec<ContentPart>, ExtractionError> {
        let raw = fs::read_to_string(path).map_err(ExtractionError::io)?;
        let notebook: Value = serde_json::from_str(&raw)
            .map_err(|e| ExtractionError::corrupt(format!("invalid notebook json: {e}")))?;

        let cells = notebook
            .get("cells")
            .and_then(Value::as_array)
            .ok_or_else(|| ExtractionError::corrupt("notebook has no cells array"))?;

        let mut code_parts: Vec<String> = Vec::new();
        let mut images: Vec<ContentPart> = Vec::new();

        for cell in cells {
            if cell.get("cell_type").and_then(Value::as_str) != Some("code") {
                continue;
            }

            let source = join_source(cell.get("source"));
            if !source.trim().is_empty() {
                code_parts.push(source.trim_end().to_string());
            }

            let Some(outputs) = cell.get("outputs").and_then(Value::as_array) else {
                continue;
            };
            for output in outputs {
                let Some(data) = output.get("data").and_then(Value::as_object) else {
                    continue;
                };
                for mime in NOTEBOOK_IMAGE_MIMES {
                    let Some(encoded) = data.get(*mime) else {
                        continue;
                    };
                    let encoded = join_source(Some(encoded));
                    let compact: String = encoded.split_whitespace().collect();
                    if let Ok(bytes) = BASE64.decode(compact.as_bytes()) {
                        images.push(ContentPart::Image {
                            data: bytes,
                            mime: (*mime).to_string(),
                        });
                    }
                }
            }
        }

        let mut parts = Vec::new();
        if !code_parts.is_empty() {
            parts.push(ContentPart::Text {
                text: code_parts.join("\n\n"),
            });
        }
        parts.extend(images);
        Ok(parts)
    }
}

/// Notebook fields may hold a string or a list of line strings.
fn join_source(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .concat(),
        _ => String::new(),
    }
}
