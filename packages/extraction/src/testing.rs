//! Testing utilities including a mock extractor.
//!
//! Useful for exercising the batch orchestrator without real model or
//! network calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{ExtractionError, Result};
use crate::traits::DagExtractor;
use crate::types::dag::{DagOutput, NodeData};

/// Build a small, well-formed DAG output for tests.
pub fn sample_dag(node_count: usize, confidence: f64) -> DagOutput {
    let nodes = (1..=node_count)
        .map(|i| NodeData {
            id: format!("node_{:03}", i),
            content: format!("Node {} content", i),
            parent_ids: if i > 1 {
                vec![format!("node_{:03}", i - 1)]
            } else {
                vec![]
            },
            children_ids: if i < node_count {
                vec![format!("node_{:03}", i + 1)]
            } else {
                vec![]
            },
            tree_ids: vec![],
            footnote_labels: vec![],
        })
        .collect();

    DagOutput {
        nodes,
        tree_references: vec![],
        footnotes: vec![],
        extraction_confidence: confidence,
        image_title: Some("NCCN Guidelines Version 3.2025".to_string()),
        tree_id: Some("NSCLC-10".to_string()),
        keywords: None,
    }
}

/// A mock extractor with configurable per-filename outcomes.
///
/// Files without a configured outcome succeed with a default sample DAG.
/// Calls are recorded so tests can assert exactly which inputs were
/// attempted.
#[derive(Default)]
pub struct MockExtractor {
    outcomes: RwLock<HashMap<String, MockOutcome>>,
    calls: RwLock<Vec<String>>,
}

enum MockOutcome {
    Success(DagOutput),
    Malformed(String),
    Upstream(String),
}

impl MockExtractor {
    /// Create a mock where every file succeeds with a default DAG.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a successful output for a filename.
    pub fn with_output(self, filename: impl Into<String>, output: DagOutput) -> Self {
        self.outcomes
            .write()
            .unwrap()
            .insert(filename.into(), MockOutcome::Success(output));
        self
    }

    /// Configure a malformed-response failure for a filename.
    pub fn with_malformed(self, filename: impl Into<String>, message: impl Into<String>) -> Self {
        self.outcomes
            .write()
            .unwrap()
            .insert(filename.into(), MockOutcome::Malformed(message.into()));
        self
    }

    /// Configure an upstream failure for a filename.
    pub fn with_upstream_error(
        self,
        filename: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.outcomes
            .write()
            .unwrap()
            .insert(filename.into(), MockOutcome::Upstream(message.into()));
        self
    }

    /// Filenames that were passed to `extract`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Number of extract calls made.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

#[async_trait]
impl DagExtractor for MockExtractor {
    async fn extract(&self, image: &Path) -> Result<DagOutput> {
        let name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        self.calls.write().unwrap().push(name.clone());

        match self.outcomes.read().unwrap().get(&name) {
            Some(MockOutcome::Success(output)) => Ok(output.clone()),
            Some(MockOutcome::Malformed(msg)) => {
                Err(ExtractionError::MalformedResponse(msg.clone()))
            }
            Some(MockOutcome::Upstream(msg)) => Err(ExtractionError::Upstream(
                gemini_client::GeminiError::Api(msg.clone()),
            )),
            None => Ok(sample_dag(3, 0.95)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_mock_default_success_and_tracking() {
        let mock = MockExtractor::new();
        let dag = mock.extract(&PathBuf::from("dir/p1.jpg")).await.unwrap();
        assert_eq!(dag.node_count(), 3);
        assert_eq!(mock.calls(), vec!["p1.jpg"]);
    }

    #[tokio::test]
    async fn test_mock_configured_failure() {
        let mock = MockExtractor::new().with_malformed("p2.jpg", "unexpected EOF");
        let err = mock.extract(&PathBuf::from("p2.jpg")).await.unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedResponse(_)));
    }

    #[test]
    fn test_sample_dag_edges_resolve() {
        let dag = sample_dag(5, 0.9);
        assert!(dag.unresolved_edge_ids().is_empty());
    }
}
