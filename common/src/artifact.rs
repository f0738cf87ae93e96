//! Persisted feedback artifact contract.
//!
//! Every submission ends up with exactly one file at
//! `<output_root>/<folder_name>_feedback.md`. Successful gradings contain the
//! model's feedback; failures contain a machine-parseable marker line followed
//! by a human-readable error block, so downstream statistics can tell graded
//! and failed submissions apart from file contents alone.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

/// Suffix appended to the submission folder name to derive its artifact name.
pub const FEEDBACK_SUFFIX: &str = "_feedback.md";

/// First characters of the marker line that opens every error artifact.
pub const ERROR_MARKER_PREFIX: &str = "<!-- grading-error";

/// A failed attempt to persist an artifact. Fatal to its task only.
#[derive(Debug, Error)]
#[error("failed to write {}: {message}", .path.display())]
pub struct WriteError {
    pub path: PathBuf,
    pub message: String,
}

/// Path of the artifact for a submission folder name.
pub fn feedback_path(output_root: &Path, submission_name: &str) -> PathBuf {
    output_root.join(format!("{submission_name}{FEEDBACK_SUFFIX}"))
}

/// Recover the submission folder name from an artifact file name, if it is one.
pub fn submission_name(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(FEEDBACK_SUFFIX)
}

/// The stable marker line. Stage and kind are lowercase tokens.
pub fn error_marker(stage: &str, kind: &str) -> String {
    format!("<!-- grading-error stage=\"{stage}\" kind=\"{kind}\" -->")
}

/// Full contents of an error artifact.
pub fn render_error_artifact(
    submission_name: &str,
    stage: &str,
    kind: &str,
    message: &str,
) -> String {
    format!(
        "{marker}\n\n# Grading error\n\nSubmission `{submission_name}` was not graded.\n\n\
         - stage: {stage}\n- kind: {kind}\n- message: {message}\n\n\
         Re-run the grader for this folder or grade it manually.\n",
        marker = error_marker(stage, kind),
    )
}

/// True when the contents open with the error marker.
pub fn is_error_artifact(contents: &str) -> bool {
    contents.trim_start().starts_with(ERROR_MARKER_PREFIX)
}

/// Write `contents` to `path` atomically: a temp file in the destination
/// directory, then a rename. A crashed or cancelled writer never leaves a
/// partial artifact behind.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), WriteError> {
    let fail = |message: String| WriteError {
        path: path.to_path_buf(),
        message,
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| fail(e.to_string()))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| fail(e.to_string()))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|e| fail(e.to_string()))?;
    tmp.persist(path).map_err(|e| fail(e.to_string()))?;
    Ok(())
}
