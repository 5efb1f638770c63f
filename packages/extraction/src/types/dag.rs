//! DAG output types for clinical decision tree extraction.
//!
//! These mirror the JSON schema the model is prompted to produce. List
//! fields are optional on the wire and default to empty; `nodes` and
//! `extraction_confidence` are required, and their absence makes the
//! response malformed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Confidence below this is flagged as a soft warning (manual review
/// suggested); it is never treated as an error.
pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.80;

/// A single node in a clinical decision tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Unique node identifier (e.g. `node_001`)
    pub id: String,

    /// Full text content of the decision node, verbatim from the image
    pub content: String,

    /// IDs of parent nodes this node connects from
    #[serde(default)]
    pub parent_ids: Vec<String>,

    /// IDs of child nodes this node connects to
    #[serde(default)]
    pub children_ids: Vec<String>,

    /// Cross-references to other trees (e.g. `NSCL-16`)
    #[serde(default)]
    pub tree_ids: Vec<String>,

    /// Footnote labels referenced by this node (e.g. `["a", "1"]`)
    #[serde(default)]
    pub footnote_labels: Vec<String>,
}

/// A footnote found in the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footnote {
    /// Footnote label (e.g. `a`, `1`, `I`)
    pub label: String,

    /// Full text content of the footnote
    pub content: String,
}

/// A cross-tree reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeReference {
    /// Source tree identifier
    pub from_tree: String,

    /// Destination tree identifier
    pub to_tree: String,

    /// What the reference represents
    #[serde(default)]
    pub description: String,
}

/// Complete DAG extraction output for a single guideline image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagOutput {
    /// All nodes extracted from the image
    pub nodes: Vec<NodeData>,

    /// Cross-tree references found
    #[serde(default)]
    pub tree_references: Vec<TreeReference>,

    /// All footnotes found in the image
    #[serde(default)]
    pub footnotes: Vec<Footnote>,

    /// Self-reported confidence score in [0, 1]
    pub extraction_confidence: f64,

    /// Title/header of the guideline, if visible
    #[serde(default)]
    pub image_title: Option<String>,

    /// Tree identifier from the lower right of the image (e.g. `NSCLC-10`)
    #[serde(default)]
    pub tree_id: Option<String>,

    /// Keywords added by the tagging pass, absent on fresh extractions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

impl DagOutput {
    /// Number of extracted nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the self-reported confidence is below the review threshold.
    pub fn is_low_confidence(&self) -> bool {
        self.extraction_confidence < LOW_CONFIDENCE_THRESHOLD
    }

    /// Edge IDs referenced in `parent_ids`/`children_ids` that do not
    /// correspond to any node in this result.
    ///
    /// Resolution is a soft invariant of the model output: unresolved IDs
    /// are reported for logging but the result is passed through as-is.
    pub fn unresolved_edge_ids(&self) -> Vec<String> {
        let known: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let mut unresolved: Vec<String> = self
            .nodes
            .iter()
            .flat_map(|n| n.parent_ids.iter().chain(n.children_ids.iter()))
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();
        unresolved.sort();
        unresolved.dedup();
        unresolved
    }
}
