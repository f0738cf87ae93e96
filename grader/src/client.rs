//! Grading backend seam.

use async_trait::async_trait;
use scanner::ContextBundle;

use crate::error::GradingError;

/// A grading backend: turns a rubric and an assembled context bundle into
/// feedback text.
///
/// Implementations must pass the rubric through verbatim and serialize bundle
/// items in their ordinal order, keeping text and image items distinguishable.
#[async_trait]
pub trait GradingClient: Send + Sync {
    async fn grade(&self, rubric: &str, bundle: &ContextBundle) -> Result<String, GradingError>;
}
