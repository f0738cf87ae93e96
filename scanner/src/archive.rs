//! In-place archive expansion.
//!
//! Runs as a pre-pass before traversal so the walk itself stays read-only.
//! Every `.zip` under the submission root is extracted into its containing
//! directory and then deleted; extraction repeats until no archives remain,
//! bounded by a maximum nesting depth. Failed archives are recorded once and
//! left on disk, and the scan continues without their contents.

use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::ArchiveError;

/// Limits applied while expanding archives in place.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    /// Maximum number of expansion passes (one pass per nesting level).
    pub max_depth: u32,
    /// Cap on the combined uncompressed size of one archive's entries.
    pub max_unpacked_bytes: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_unpacked_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Outcome of expanding a submission tree to its zip-free fixed point.
#[derive(Debug, Default)]
pub struct ExpansionReport {
    /// Archives that were extracted and removed, in the order processed.
    pub expanded: Vec<PathBuf>,
    /// Archives that could not be expanded, with why.
    pub failures: Vec<(PathBuf, ArchiveError)>,
}

/// Expand every `.zip` under `root` to a fixed point.
///
/// Idempotent: re-running on a tree with no `.zip` files is a no-op.
pub fn expand_archives(root: &Path, limits: &ArchiveLimits) -> ExpansionReport {
    let mut report = ExpansionReport::default();
    let mut failed: Vec<PathBuf> = Vec::new();

    for _pass in 0..limits.max_depth {
        let pending: Vec<PathBuf> = find_archives(root)
            .into_iter()
            .filter(|p| !failed.contains(p))
            .collect();
        if pending.is_empty() {
            return report;
        }

        for archive_path in pending {
            match extract_in_place(&archive_path, limits.max_unpacked_bytes) {
                Ok(()) => {
                    debug!("extracted and removed {}", archive_path.display());
                    report.expanded.push(archive_path);
                }
                Err(err) => {
                    warn!("failed to expand {}: {err}", archive_path.display());
                    failed.push(archive_path.clone());
                    report.failures.push((archive_path, err));
                }
            }
        }
    }

    // Anything still present after the last pass is nested too deeply.
    for leftover in find_archives(root) {
        if !failed.contains(&leftover) {
            warn!("archive nesting limit reached at {}", leftover.display());
            report.failures.push((
                leftover,
                ArchiveError::DepthExceeded {
                    max_depth: limits.max_depth,
                },
            ));
        }
    }
    report
}

fn find_archives(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("zip"))
        .map(|entry| entry.into_path())
        .collect()
}

/// Extract one archive into its containing directory, then delete it.
///
/// Entries whose paths would escape the containing directory are rejected,
/// and the combined uncompressed size is capped.
fn extract_in_place(archive_path: &Path, max_unpacked_bytes: u64) -> Result<(), ArchiveError> {
    let bytes = fs::read(archive_path)?;
    let dest = archive_path.parent().unwrap_or_else(|| Path::new("."));

    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

    let mut total_uncompressed: u64 = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
        };
        let outpath = dest.join(relative);

        total_uncompressed += entry.size();
        if total_uncompressed > max_unpacked_bytes {
            return Err(ArchiveError::TooLarge {
                limit: max_unpacked_bytes,
            });
        }

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;
        }
    }

    fs::remove_file(archive_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn create_test_zip(files: Vec<(&str, &[u8])>, zip_path: &Path) {
        let file = File::create(zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        for (name, content) in files {
            zip.start_file(name, options).unwrap();
            zip.write_all(content).unwrap();
        }

        zip.finish().unwrap();
    }

    fn zip_bytes(files: Vec<(&str, &[u8])>) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = SimpleFileOptions::default();
            for (name, content) in files {
                zip.start_file(name, options).unwrap();
                zip.write_all(content).unwrap();
            }
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn expands_and_removes_archive() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("submission.zip");
        create_test_zip(
            vec![("answer.txt", b"42".as_slice()), ("src/main.py", b"print()")],
            &zip_path,
        );

        let report = expand_archives(dir.path(), &ArchiveLimits::default());

        assert_eq!(report.expanded, vec![zip_path.clone()]);
        assert!(report.failures.is_empty());
        assert!(!zip_path.exists());
        assert_eq!(fs::read_to_string(dir.path().join("answer.txt")).unwrap(), "42");
        assert!(dir.path().join("src/main.py").exists());
    }

    #[test]
    fn expands_nested_archives_to_fixed_point() {
        let dir = tempdir().unwrap();
        let inner = zip_bytes(vec![("inner.txt", b"deep".as_slice())]);
        let outer = dir.path().join("outer.zip");
        create_test_zip(vec![("nested.zip", inner.as_slice())], &outer);

        let report = expand_archives(dir.path(), &ArchiveLimits::default());

        assert_eq!(report.expanded.len(), 2);
        assert!(report.failures.is_empty());
        assert!(dir.path().join("inner.txt").exists());
        assert!(!dir.path().join("nested.zip").exists());
    }

    #[test]
    fn rerun_on_expanded_tree_is_a_noop() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("a.zip");
        create_test_zip(vec![("a.txt", b"a".as_slice())], &zip_path);

        expand_archives(dir.path(), &ArchiveLimits::default());
        let second = expand_archives(dir.path(), &ArchiveLimits::default());

        assert!(second.expanded.is_empty());
        assert!(second.failures.is_empty());
    }

    #[test]
    fn corrupt_archive_is_recorded_once_and_left_on_disk() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("broken.zip");
        fs::write(&bad, b"this is not a zip").unwrap();
        let good = dir.path().join("good.zip");
        create_test_zip(vec![("ok.txt", b"fine".as_slice())], &good);

        let report = expand_archives(dir.path(), &ArchiveLimits::default());

        assert_eq!(report.expanded, vec![good]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, bad);
        assert!(matches!(report.failures[0].1, ArchiveError::Corrupt(_)));
        assert!(bad.exists());
        assert!(dir.path().join("ok.txt").exists());
    }

    #[test]
    fn oversized_archive_is_rejected() {
        let dir = tempdir().unwrap();
        let zip_path = dir.path().join("big.zip");
        create_test_zip(vec![("blob.txt", vec![0u8; 2048].as_slice())], &zip_path);

        let limits = ArchiveLimits {
            max_unpacked_bytes: 1024,
            ..Default::default()
        };
        let report = expand_archives(dir.path(), &limits);

        assert!(report.expanded.is_empty());
        assert!(matches!(
            report.failures.as_slice(),
            [(_, ArchiveError::TooLarge { .. })]
        ));
    }

    #[test]
    fn nesting_beyond_the_depth_bound_is_reported() {
        let dir = tempdir().unwrap();
        let mut bytes = zip_bytes(vec![("core.txt", b"x".as_slice())]);
        for level in 0..4 {
            bytes = zip_bytes(vec![(format!("level{level}.zip").as_str(), bytes.as_slice())]);
        }
        let outer = dir.path().join("outer.zip");
        fs::write(&outer, &bytes).unwrap();

        let limits = ArchiveLimits {
            max_depth: 2,
            ..Default::default()
        };
        let report = expand_archives(dir.path(), &limits);

        assert!(
            report
                .failures
                .iter()
                .any(|(_, err)| matches!(err, ArchiveError::DepthExceeded { .. }))
        );
        // The innermost payload never surfaced.
        assert!(!dir.path().join("core.txt").exists());
    }
}
