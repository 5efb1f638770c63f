//! Trait seam between the orchestrator and the remote model.

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::types::dag::DagOutput;

/// Extracts a structured DAG from a single guideline image.
///
/// Implementations wrap a specific vision model and handle prompting and
/// response decoding. No retry happens at this seam — retry policy
/// belongs to the batch orchestrator (re-runs with a mode flag).
#[async_trait]
pub trait DagExtractor: Send + Sync {
    /// Extract the decision tree from `image`.
    ///
    /// Fails with `Upstream` when the remote call errors and with
    /// `MalformedResponse` when the payload does not match the schema.
    async fn extract(&self, image: &Path) -> Result<DagOutput>;
}
