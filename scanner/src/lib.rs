//! # Submission Scanner
//!
//! Turns one submission folder into an ordered [`ContextBundle`] ready for
//! grading: archives are expanded in place, ignore rules are applied, and each
//! surviving file is dispatched to a content extractor by extension.
//!
//! ## Key Concepts
//! - **IgnoreMatcher**: gitignore-style exclusion rules from the CLI and the
//!   submission's own `.graderignore`/`.gitignore`, last match wins.
//! - **ArchiveExpander**: depth-bounded in-place expansion of `.zip` files.
//! - **ContentExtractor**: pluggable per-extension extraction into text and
//!   image parts.
//! - **ContextBundle**: the deterministic, ordered result; per-file failures
//!   are recorded in it rather than raised.

pub mod archive;
pub mod bundle;
pub mod content;
pub mod error;
pub mod ignore;
pub mod scan;

pub use archive::{ArchiveLimits, expand_archives};
pub use bundle::{ContextBundle, ContextItem, Submission};
pub use content::{ContentExtractor, ContentPart, ExtractorSet};
pub use error::{ArchiveError, ExtractionError, ExtractionErrorKind, ScanFailure};
pub use ignore::{IgnoreMatcher, RuleSource};
pub use scan::{ScanOptions, scan_submission};
