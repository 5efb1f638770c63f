//! Fixed prompt contracts for the remote model.
//!
//! The prompts are part of the wire contract: the decoder in this crate
//! expects exactly the JSON shapes described here.

/// Prompt for extracting a decision-tree DAG from a guideline image.
pub const DAG_EXTRACTION_PROMPT: &str = r#"You are an expert at analyzing clinical decision tree images from NCCN guidelines.

Your task is to extract the complete decision tree from this image as a structured DAG (Directed Acyclic Graph).

EXTRACTION GUIDELINES:
1. **Nodes**: Each decision point, condition, treatment, or action is a node
2. **Parent-Child Relationships**: Trace edges (arrows, lines) to determine hierarchy
3. **Node IDs**: Assign sequential IDs (node_001, node_002, etc.) in top-to-bottom, left-to-right order
4. **Cross-Tree References**: Look for mentions of other guidelines (e.g., "See NSCL-16", "Refer to AML-7")
5. **Footnotes**: Extract all footnotes from the image (bottom of page, superscript references, etc.)
   - Identify footnote labels (letters like 'a', 'b', 'c' or numbers like '1', '2', 'I', 'II', etc.)
   - Map each footnote label to its full content
   - For each node, list any footnote labels that appear as superscripts or references within that node
6. **Tree ID**: Look for the tree identifier in the lower right corner of the image (e.g., "DIAG-1", "NSCLC-10")
7. **Confidence**: Rate your extraction confidence 0.0-1.0 based on image clarity and complexity

Return ONLY valid JSON matching this exact schema:
{
  "nodes": [
    {
      "id": "node_001",
      "content": "Exact text from image",
      "parent_ids": [],
      "children_ids": ["node_002"],
      "tree_ids": ["NSCL-16"] if cross-references exist,
      "footnote_labels": ["a", "b"] if footnotes are referenced
    }
  ],
  "tree_references": [
    {
      "from_tree": "Current guideline ID if visible",
      "to_tree": "Referenced guideline ID",
      "description": "What the reference means"
    }
  ],
  "footnotes": [
    {
      "label": "a",
      "content": "Full text of footnote from image"
    }
  ],
  "extraction_confidence": 0.95,
  "image_title": "Title if visible at top of image",
  "tree_id": "NSCLC-10"
}"#;

/// Prompt for annotating one pruned clinical-trial record.
///
/// The pruned trial JSON is appended after this template.
pub const TRIAL_ANNOTATION_PROMPT: &str = r#"You are an expert oncologist and data curator. Extract key data from this NSCLC clinical trial.

TASKS:
1. Experimental Drugs: Identify the specific drug being tested. Ignore standard chemo backbones. Return as a list.
2. Biomarkers: Look at eligibility criteria. Extract genes (EGFR, ALK, KRAS, ROS1, PD-L1). If none, return ["Unselected"]. Return as a list.
3. Efficacy Analysis:
   - POSITIVE: Primary endpoint met significance (p < 0.05).
   - NEGATIVE: Primary endpoint failed (p >= 0.05) or CI crosses 1.0/0.
   - MIXED: Contradictory primary endpoints.
   - UNCERTAIN: No results reported.

Return ONLY valid JSON with these exact keys:
{
  "experimental_drugs": ["string"],
  "biomarkers": ["string"],
  "primary_outcomes_summary": "string summary of outcomes",
  "efficacy_status": "POSITIVE|NEGATIVE|MIXED|UNCERTAIN",
  "reasoning": "brief explanation"
}

Input Data:"#;
