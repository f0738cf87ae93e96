//! Submission tree traversal and bundle assembly.

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::archive::{ArchiveLimits, expand_archives};
use crate::bundle::{ContextBundle, ContextItem, Submission};
use crate::content::ExtractorSet;
use crate::error::{ExtractionError, ScanFailure};
use crate::ignore::matcher_for_submission;

/// Options for scanning one submission tree.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Extra gitignore-style patterns from the CLI, lowest precedence.
    pub cli_patterns: Vec<String>,
    pub archive_limits: ArchiveLimits,
}

/// Scan one submission folder into a [`ContextBundle`].
///
/// 1. Expand archives in place (always before ignore filtering, since an
///    ignored archive may contain files that are not).
/// 2. Compile ignore rules: CLI patterns, then the submission's `.gitignore`,
///    then `.graderignore`.
/// 3. Walk the tree in lexicographic order, pruning ignored directories and
///    skipping ignored files.
/// 4. Dispatch each surviving file to an extractor by extension; unsupported
///    extensions are skipped silently, failures are recorded per file.
/// 5. Re-sort by relative path and assign ordinals, so item order is
///    reproducible regardless of extraction scheduling.
pub fn scan_submission(
    submission: &Submission,
    extractors: &ExtractorSet,
    options: &ScanOptions,
) -> ContextBundle {
    let mut errors: Vec<ScanFailure> = Vec::new();

    let expansion = expand_archives(&submission.path, &options.archive_limits);
    for (path, error) in expansion.failures {
        errors.push(ScanFailure::Archive {
            relative_path: relative_to(&submission.path, &path),
            error,
        });
    }

    let matcher = matcher_for_submission(&submission.path, &options.cli_patterns);

    let mut collected: Vec<(String, Vec<crate::content::ContentPart>)> = Vec::new();
    let walker = WalkDir::new(&submission.path)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let relative = relative_to(&submission.path, entry.path());
            !matcher.matches(&relative, entry.file_type().is_dir())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let relative = err
                    .path()
                    .map(|p| relative_to(&submission.path, p))
                    .unwrap_or_default();
                warn!("cannot read {relative:?} in {}: {err}", submission.name);
                errors.push(ScanFailure::Extraction {
                    relative_path: relative,
                    error: ExtractionError::io(err),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_to(&submission.path, entry.path());
        match extractors.extract(entry.path()) {
            None => debug!("skipping unsupported file {relative}"),
            Some(Ok(parts)) if parts.is_empty() => debug!("skipping empty file {relative}"),
            Some(Ok(parts)) => collected.push((relative, parts)),
            Some(Err(error)) => {
                warn!("failed to extract {relative}: {error}");
                errors.push(ScanFailure::Extraction {
                    relative_path: relative,
                    error,
                });
            }
        }
    }

    // Deterministic item order: lexicographic by relative path, then part
    // position within the file.
    collected.sort_by(|a, b| a.0.cmp(&b.0));
    let mut items = Vec::new();
    for (relative_path, parts) in collected {
        for part in parts {
            items.push(ContextItem {
                relative_path: relative_path.clone(),
                ordinal: items.len(),
                part,
            });
        }
    }

    debug!(
        "scanned {} ({} items, {} errors)",
        submission.name,
        items.len(),
        errors.len()
    );

    ContextBundle {
        submission: submission.clone(),
        items,
        errors,
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
