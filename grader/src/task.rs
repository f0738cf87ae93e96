//! Grading task state machine and run aggregation types.

use std::fmt;

use thiserror::Error;

use common::artifact::WriteError;

use crate::error::GradingError;

/// Stages of one grading task. A task moves through them in order and ends
/// in exactly one of `Succeeded` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Discovered,
    Scanning,
    Grading,
    Writing,
}

impl TaskStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStage::Discovered => "discovered",
            TaskStage::Scanning => "scanning",
            TaskStage::Grading => "grading",
            TaskStage::Writing => "writing",
        }
    }
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one task ended in `Failed`. Fatal to that task only.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Grading(#[from] GradingError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("submission produced no extractable content")]
    NoContent,

    #[error("run cancelled before grading started")]
    Cancelled,

    #[error("task aborted: {0}")]
    Aborted(String),
}

impl TaskError {
    /// Lowercase token used in the artifact error marker.
    pub fn marker_kind(&self) -> &'static str {
        match self {
            TaskError::Grading(err) => err.kind.as_str(),
            TaskError::Write(_) => "write",
            TaskError::NoContent => "no-content",
            TaskError::Cancelled => "cancelled",
            TaskError::Aborted(_) => "aborted",
        }
    }
}

/// Record of one failed submission in the final run result.
#[derive(Debug)]
pub struct TaskFailure {
    /// Submission folder name.
    pub submission: String,
    /// Stage the task was in when it failed.
    pub stage: TaskStage,
    pub error: TaskError,
}

/// What one task reports back when it reaches a terminal state.
#[derive(Debug)]
pub(crate) enum TaskOutcome {
    Succeeded { submission: String },
    Failed(TaskFailure),
}

/// Aggregate outcome of a full run. Mutated only at the orchestrator's join
/// point, one contribution per task; immutable once the run ends.
#[derive(Debug, Default)]
pub struct RunResult {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<TaskFailure>,
}

impl RunResult {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub(crate) fn record(&mut self, outcome: TaskOutcome) {
        match outcome {
            TaskOutcome::Succeeded { .. } => self.succeeded += 1,
            TaskOutcome::Failed(failure) => {
                self.failed += 1;
                self.failures.push(failure);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_outcome_contributes_exactly_once() {
        let mut result = RunResult::default();
        result.record(TaskOutcome::Succeeded {
            submission: "a".to_string(),
        });
        result.record(TaskOutcome::Failed(TaskFailure {
            submission: "b".to_string(),
            stage: TaskStage::Grading,
            error: TaskError::Grading(GradingError::timeout("deadline exceeded")),
        }));

        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.total(), 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].submission, "b");
        assert_eq!(result.failures[0].error.marker_kind(), "timeout");
    }
}
