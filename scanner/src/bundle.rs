//! Bundle types: the ordered, extracted representation of one submission.

use std::path::{Path, PathBuf};

use crate::content::ContentPart;
use crate::error::ScanFailure;

/// One top-level submission folder. Identity is the folder name, which must
/// be unique within a run; the feedback artifact name is derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub name: String,
    pub path: PathBuf,
}

impl Submission {
    /// Build from a directory path; `None` when the path has no usable name.
    pub fn from_dir(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        Some(Self {
            name,
            path: path.to_path_buf(),
        })
    }
}

/// One extracted unit of context. A single source file may produce several
/// items (a notebook yields its code and each output image) with consecutive
/// ordinals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextItem {
    /// Path relative to the submission root, with `/` separators.
    pub relative_path: String,
    /// Position in deterministic traversal order, independent of how
    /// extraction was scheduled.
    pub ordinal: usize,
    pub part: ContentPart,
}

/// The assembled context for one submission, owned by one scan invocation.
///
/// Zero items is valid: a submission with nothing extractable still yields a
/// bundle, and the orchestrator decides whether that is gradable. Per-file
/// and per-archive failures are data here, not raised errors.
#[derive(Debug)]
pub struct ContextBundle {
    pub submission: Submission,
    pub items: Vec<ContextItem>,
    pub errors: Vec<ScanFailure>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
