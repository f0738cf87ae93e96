//! Run orchestration.
//!
//! Discovers submission folders under the data root, then runs one grading
//! task per submission under a global concurrency ceiling. Tasks are fully
//! independent: each owns its bundle, holds one semaphore permit for its whole
//! scan → grade → write sequence, and a failure in any stage terminates only
//! that task. The run returns once every discovered submission has reached a
//! terminal state.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::{artifact, config};
use scanner::{ArchiveLimits, ContextBundle, ExtractorSet, ScanOptions, Submission, scan_submission};

use crate::client::GradingClient;
use crate::error::RunError;
use crate::guardrails::{GradeBounds, apply_grade_guardrails};
use crate::task::{RunResult, TaskError, TaskFailure, TaskOutcome, TaskStage};

/// Folder name at the data root that never counts as a submission (the
/// holding pen for material that has already been processed).
const ARCHIVE_FOLDER: &str = "Archive";

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum number of tasks simultaneously in any active stage.
    pub concurrency: usize,
    /// Extra gitignore-style exclude patterns, applied to every submission.
    pub exclude_patterns: Vec<String>,
    /// Grade clamping; `None` disables the guardrails.
    pub grade_bounds: Option<GradeBounds>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: config::default_concurrency(),
            exclude_patterns: Vec::new(),
            grade_bounds: Some(GradeBounds::default()),
        }
    }
}

/// Grade every submission folder under `data_root`, writing one artifact per
/// submission into `output_root`.
///
/// Configuration problems (missing data root, unreadable rubric) fail the
/// whole run before any task starts; everything after that is isolated per
/// task. Cancelling `cancel` stops admitting new tasks but lets in-flight
/// tasks finish cleanly.
pub async fn run(
    data_root: &Path,
    rubric_path: &Path,
    output_root: &Path,
    client: Arc<dyn GradingClient>,
    options: RunOptions,
    cancel: CancellationToken,
) -> Result<RunResult, RunError> {
    if !data_root.is_dir() {
        return Err(RunError::DataRootMissing(data_root.to_path_buf()));
    }
    let rubric = fs::read_to_string(rubric_path)
        .map_err(|source| RunError::Rubric {
            path: rubric_path.to_path_buf(),
            source,
        })?
        .trim()
        .to_string();
    fs::create_dir_all(output_root).map_err(|source| RunError::OutputRoot {
        path: output_root.to_path_buf(),
        source,
    })?;

    let submissions = discover_submissions(data_root)?;
    if submissions.is_empty() {
        warn!("no submission folders found under {}", data_root.display());
        return Ok(RunResult::default());
    }

    let concurrency = options.concurrency.max(1);
    info!(
        "grading {} submission(s) with concurrency={concurrency}",
        submissions.len()
    );

    let ctx = Arc::new(TaskContext {
        rubric: rubric.into(),
        output_root: output_root.to_path_buf(),
        client,
        extractors: ExtractorSet::builtin(),
        scan_options: Arc::new(ScanOptions {
            cli_patterns: options.exclude_patterns.clone(),
            archive_limits: ArchiveLimits {
                max_depth: config::max_archive_depth(),
                max_unpacked_bytes: config::max_archive_unpacked_bytes(),
            },
        }),
        grade_bounds: options.grade_bounds,
        semaphore: Semaphore::new(concurrency),
        cancel,
    });

    let mut tasks = FuturesUnordered::new();
    for submission in submissions {
        let name = submission.name.clone();
        let handle = tokio::spawn(grade_one(submission, Arc::clone(&ctx)));
        tasks.push(async move { (name, handle.await) });
    }

    // Single-threaded aggregation at the join point: each task contributes
    // exactly once, in completion order.
    let mut result = RunResult::default();
    while let Some((name, joined)) = tasks.next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("task for {name} aborted: {err}");
                TaskOutcome::Failed(TaskFailure {
                    submission: name,
                    stage: TaskStage::Scanning,
                    error: TaskError::Aborted(err.to_string()),
                })
            }
        };
        result.record(outcome);
    }

    info!(
        "run complete: {} succeeded, {} failed",
        result.succeeded, result.failed
    );
    Ok(result)
}

/// Immediate subdirectories of the data root, sorted by name. Recursion
/// happens inside the scanner, not here.
fn discover_submissions(data_root: &Path) -> Result<Vec<Submission>, RunError> {
    let mut submissions = Vec::new();
    for entry in fs::read_dir(data_root).map_err(RunError::Discovery)? {
        let entry = entry.map_err(RunError::Discovery)?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(submission) = Submission::from_dir(&path) else {
            warn!("skipping folder with unusable name: {}", path.display());
            continue;
        };
        if submission.name == ARCHIVE_FOLDER {
            continue;
        }
        submissions.push(submission);
    }
    submissions.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(submissions)
}

/// Everything a task needs beyond its own submission. Shared read-only
/// across tasks; the only synchronization is the semaphore itself.
struct TaskContext {
    rubric: Arc<str>,
    output_root: PathBuf,
    client: Arc<dyn GradingClient>,
    extractors: ExtractorSet,
    scan_options: Arc<ScanOptions>,
    grade_bounds: Option<GradeBounds>,
    semaphore: Semaphore,
    cancel: CancellationToken,
}

/// Run one submission through the full stage sequence while holding a single
/// concurrency permit. Always returns a terminal outcome.
async fn grade_one(submission: Submission, ctx: Arc<TaskContext>) -> TaskOutcome {
    let _permit = ctx
        .semaphore
        .acquire()
        .await
        .expect("grading semaphore closed");

    // Admission gate: a cancelled run stops starting new tasks. Nothing has
    // been written for this task yet, so there is no partial artifact.
    if ctx.cancel.is_cancelled() {
        debug!("skipping {} after cancellation", submission.name);
        return TaskOutcome::Failed(TaskFailure {
            submission: submission.name,
            stage: TaskStage::Discovered,
            error: TaskError::Cancelled,
        });
    }

    // Scanning: sync filesystem work off the async runtime.
    let scan_submission_dir = submission.clone();
    let scan_extractors = ctx.extractors.clone();
    let scan_opts = Arc::clone(&ctx.scan_options);
    let bundle = match tokio::task::spawn_blocking(move || {
        scan_submission(&scan_submission_dir, &scan_extractors, &scan_opts)
    })
    .await
    {
        Ok(bundle) => bundle,
        Err(err) => {
            error!("scan of {} aborted: {err}", submission.name);
            return TaskOutcome::Failed(TaskFailure {
                submission: submission.name,
                stage: TaskStage::Scanning,
                error: TaskError::Aborted(err.to_string()),
            });
        }
    };
    for failure in &bundle.errors {
        warn!("{}: {failure}", submission.name);
    }

    if bundle.is_empty() {
        // Policy: don't burn a grading call on an empty payload; surface the
        // submission for manual attention instead.
        warn!("{} has no extractable content", submission.name);
        let error = TaskError::NoContent;
        write_error_artifact(&ctx.output_root, &submission.name, TaskStage::Scanning, &error);
        return TaskOutcome::Failed(TaskFailure {
            submission: submission.name,
            stage: TaskStage::Scanning,
            error,
        });
    }

    // Grading.
    let feedback = match ctx.client.grade(&ctx.rubric, &bundle).await {
        Ok(feedback) => feedback,
        Err(err) => {
            error!("grading failed for {}: {err}", submission.name);
            let error = TaskError::Grading(err);
            write_error_artifact(&ctx.output_root, &submission.name, TaskStage::Grading, &error);
            return TaskOutcome::Failed(TaskFailure {
                submission: submission.name,
                stage: TaskStage::Grading,
                error,
            });
        }
    };
    let feedback = match ctx.grade_bounds {
        Some(bounds) => apply_grade_guardrails(&feedback, &bounds),
        None => feedback,
    };

    // Writing.
    let contents = compose_feedback(&feedback, &bundle);
    let path = artifact::feedback_path(&ctx.output_root, &submission.name);
    match artifact::write_atomic(&path, &contents) {
        Ok(()) => {
            info!("graded {} -> {}", submission.name, path.display());
            TaskOutcome::Succeeded {
                submission: submission.name,
            }
        }
        Err(err) => {
            error!("failed to persist feedback for {}: {err}", submission.name);
            TaskOutcome::Failed(TaskFailure {
                submission: submission.name,
                stage: TaskStage::Writing,
                error: TaskError::Write(err),
            })
        }
    }
}

/// Feedback text, plus a warnings section when the scan recorded per-file
/// failures the instructor should know about.
fn compose_feedback(feedback: &str, bundle: &ContextBundle) -> String {
    if bundle.errors.is_empty() {
        let mut out = feedback.trim_end().to_string();
        out.push('\n');
        return out;
    }

    let mut out = feedback.trim_end().to_string();
    out.push_str("\n\n## Extraction warnings\n\n");
    for failure in &bundle.errors {
        out.push_str(&format!("- {failure}\n"));
    }
    out
}

/// Best effort: a failed task should still leave a marked artifact behind.
/// If even that write fails, the failure is already recorded in the run
/// result, so just log it.
fn write_error_artifact(output_root: &Path, name: &str, stage: TaskStage, error: &TaskError) {
    let contents = artifact::render_error_artifact(
        name,
        stage.as_str(),
        error.marker_kind(),
        &error.to_string(),
    );
    let path = artifact::feedback_path(output_root, name);
    if let Err(err) = artifact::write_atomic(&path, &contents) {
        error!("failed to write error artifact for {name}: {err}");
    }
}
