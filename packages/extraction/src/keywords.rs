//! Keyword tagging for extracted decision-tree files.
//!
//! Scans each `.dag.json` artifact for known biomarkers, drugs, and
//! clinical terms, then writes the sorted keyword list back into the
//! file under a top-level `keywords` field. Tagging is idempotent: a
//! re-run recomputes and overwrites the field.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ExtractionError, Result};

/// Default tagging concurrency.
pub const DEFAULT_WORKERS: usize = 8;

/// Biomarkers matched by case-insensitive substring.
const BIOMARKERS: [&str; 24] = [
    "EGFR", "ALK", "ROS1", "BRAF", "KRAS", "MET", "PD-L1", "NTRK", "TP53", "STK11", "KEAP1",
    "NF1", "SMARCA4", "PTEN", "ERBB2", "HER2", "PDL1", "TMB", "MSI", "dMMR", "PD-L2", "FISH",
    "IHC", "NGS",
];

/// Drugs and drug classes matched by case-insensitive substring.
const DRUGS: [&str; 34] = [
    "erlotinib",
    "gefitinib",
    "afatinib",
    "dacomitinib",
    "osimertinib",
    "crizotinib",
    "ceritinib",
    "alectinib",
    "brigatinib",
    "ensartinib",
    "entrectinib",
    "larotrectinib",
    "pembrolitumab",
    "nivolumab",
    "atezolizumab",
    "durvalumab",
    "avelumab",
    "ipilimumab",
    "CTLA-4",
    "bevacizumab",
    "angiogenesis",
    "pemetrexed",
    "gemcitabine",
    "docetaxel",
    "paclitaxel",
    "cisplatin",
    "carboplatin",
    "vinorelbine",
    "etoposide",
    "ifosfamide",
    "ramucirumab",
    "VEGFR",
    "TKI",
    "checkpoint inhibitor",
];

// Therapy types, histology, and staging terms matched by pattern
fn common_terms() -> &'static [(&'static str, Regex)] {
    static TERMS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    TERMS.get_or_init(|| {
        [
            ("squamous cell carcinoma", r"\bsquamous\b"),
            ("adenocarcinoma", r"\badenocarcinoma\b"),
            ("large cell", r"\blarge cell\b"),
            ("immunotherapy", r"\bimmunotherapy\b"),
            ("chemotherapy", r"\bchemotherapy\b"),
            ("radiation therapy", r"\bradiation\b"),
            ("surgery", r"\bsurgery\b|resection"),
            ("stage I", r"\bstage I[A-C]?\b"),
            ("stage II", r"\bstage II[A-C]?\b"),
            ("stage III", r"\bstage III[A-C]?\b"),
            ("stage IV", r"\bstage IV\b"),
            ("metastatic", r"\bmetastatic\b"),
            ("advanced", r"\badvanced\b"),
            ("screening", r"\bscreening\b"),
            ("diagnostic", r"\bdiagnostic\b"),
            ("LDCT", r"\bLDCT\b"),
        ]
        .into_iter()
        .map(|(term, pattern)| {
            let re = Regex::new(&format!("(?i){}", pattern)).expect("valid term pattern");
            (term, re)
        })
        .collect()
    })
}

/// Extract the sorted keyword list for a decision-tree document.
pub fn extract_keywords(data: &Value) -> Vec<String> {
    let haystack = data.to_string().to_lowercase();

    let mut keywords: Vec<String> = BIOMARKERS
        .iter()
        .chain(DRUGS.iter())
        .filter(|term| haystack.contains(&term.to_lowercase()))
        .map(|term| term.to_string())
        .collect();

    for (term, pattern) in common_terms() {
        if pattern.is_match(&haystack) {
            keywords.push((*term).to_string());
        }
    }

    keywords.sort();
    keywords.dedup();
    keywords
}

/// Tag a single file in place, returning the number of keywords written.
pub fn tag_file(path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let mut data: Value = serde_json::from_str(&content)?;

    let keywords = extract_keywords(&data);

    let Some(object) = data.as_object_mut() else {
        return Err(ExtractionError::MalformedResponse(format!(
            "{}: expected a JSON object at the top level",
            path.display()
        )));
    };
    object.insert(
        "keywords".to_string(),
        Value::Array(keywords.iter().cloned().map(Value::String).collect()),
    );

    let mut serialized = serde_json::to_string_pretty(&data)?;
    serialized.push('\n');
    std::fs::write(path, serialized)?;

    Ok(keywords.len())
}

/// Summary of a directory tagging run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagReport {
    pub tagged: usize,
    pub failed: usize,
    pub total: usize,
}

/// Tag every `.dag.json` file under `dir` with bounded concurrency.
///
/// Per-file failures are logged and counted; they never abort the run.
pub async fn tag_directory(dir: &Path, workers: usize) -> Result<TagReport> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(".dag.json"))
        })
        .collect();
    files.sort();

    info!(count = files.len(), dir = %dir.display(), "Tagging extracted files");

    let mut report = TagReport {
        total: files.len(),
        ..Default::default()
    };

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();

    for path in files {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))?;

        set.spawn(async move {
            let _permit = permit;
            let display = path.display().to_string();
            let result = tokio::task::spawn_blocking(move || tag_file(&path))
                .await
                .map_err(|e| ExtractionError::Task(e.to_string()))
                .and_then(|r| r);
            (display, result)
        });
    }

    while let Some(joined) = set.join_next().await {
        let (file, result) = joined.map_err(|e| ExtractionError::Task(e.to_string()))?;
        match result {
            Ok(count) => {
                debug!(file = %file, keywords = count, "Tagged");
                report.tagged += 1;
            }
            Err(e) => {
                warn!(file = %file, error = %e, "Tagging failed");
                report.failed += 1;
            }
        }
    }

    info!(
        tagged = report.tagged,
        failed = report.failed,
        total = report.total,
        "Tagging complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_extract_keywords_biomarkers_and_drugs() {
        let data = json!({
            "nodes": [
                {"id": "n1", "content": "EGFR mutation positive"},
                {"id": "n2", "content": "Osimertinib 80 mg"}
            ]
        });
        let keywords = extract_keywords(&data);
        assert!(keywords.contains(&"EGFR".to_string()));
        assert!(keywords.contains(&"osimertinib".to_string()));
    }

    #[test]
    fn test_extract_keywords_staging_terms() {
        let data = json!({"nodes": [{"content": "Stage IIIA: chemoradiation, then surgery"}]});
        let keywords = extract_keywords(&data);
        assert!(keywords.contains(&"stage III".to_string()));
        assert!(keywords.contains(&"surgery".to_string()));
        assert!(!keywords.contains(&"stage IV".to_string()));
    }

    #[test]
    fn test_extract_keywords_sorted_deduped() {
        let data = json!({"a": "EGFR EGFR ALK"});
        let keywords = extract_keywords(&data);
        let mut sorted = keywords.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(keywords, sorted);
    }

    #[test]
    fn test_tag_file_writes_keywords_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.dag.json");
        std::fs::write(&path, json!({"nodes": [{"content": "ALK rearrangement"}]}).to_string())
            .unwrap();

        let count = tag_file(&path).unwrap();
        assert!(count >= 1);

        let data: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let tagged = data["keywords"].as_array().unwrap();
        assert!(tagged.iter().any(|k| k == "ALK"));
    }

    #[test]
    fn test_tag_file_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.dag.json");
        std::fs::write(&path, json!({"content": "pemetrexed"}).to_string()).unwrap();

        tag_file(&path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        tag_file(&path).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_tag_directory_isolates_failures() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("good.dag.json"),
            json!({"content": "carboplatin"}).to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.dag.json"), "{truncated").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "not json").unwrap();

        let report = tag_directory(dir.path(), 4).await.unwrap();
        assert_eq!(
            report,
            TagReport {
                tagged: 1,
                failed: 1,
                total: 2
            }
        );
    }
}
