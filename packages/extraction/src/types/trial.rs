//! Trial record types: pruned ClinicalTrials.gov input and the model's
//! annotation output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ExtractionError, Result};

/// Identification fields kept from a trial record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialIdInfo {
    pub nct_id: Option<String>,
    pub brief_title: Option<String>,
    pub official_title: Option<String>,
}

/// Eligibility fields kept from a trial record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialEligibility {
    pub criteria: Option<String>,
    pub gender: Option<String>,
    pub min_age: Option<String>,
}

/// A trial record stripped down to the sections the model needs.
///
/// Dropping administrative data, safety tables, and detailed flows cuts
/// roughly 70% of the tokens without losing the drugs, biomarkers, or
/// outcomes the annotation asks about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrunedTrial {
    pub id_info: TrialIdInfo,
    pub arms: Option<Value>,
    pub interventions: Option<Value>,
    pub eligibility: TrialEligibility,
    pub outcomes: Vec<Value>,
}

impl PrunedTrial {
    /// Prune a raw ClinicalTrials.gov JSON record.
    ///
    /// Fails with a validation error when the record has no NCT ID, since
    /// results cannot be matched back without one.
    pub fn from_record(record: &Value) -> Result<Self> {
        let proto = &record["protocolSection"];
        let ident = &proto["identificationModule"];

        let nct_id = ident["nctId"].as_str().map(str::to_string);
        if nct_id.is_none() {
            return Err(ExtractionError::Validation {
                field: "protocolSection.identificationModule.nctId".to_string(),
            });
        }

        let arms_module = &proto["armsInterventionsModule"];
        let elig = &proto["eligibilityModule"];

        // Keep primary endpoints plus anything survival/progression/response
        // flavored; other outcome measures are noise for efficacy calls.
        let all_outcomes = record["resultsSection"]["outcomeMeasuresModule"]["outcomeMeasures"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        let outcomes = all_outcomes
            .into_iter()
            .filter(|out| {
                let title = out["title"].as_str().unwrap_or("").to_uppercase();
                out["type"].as_str() == Some("PRIMARY")
                    || title.contains("SURVIVAL")
                    || title.contains("PROGRESSION")
                    || title.contains("RESPONSE")
            })
            .collect();

        Ok(Self {
            id_info: TrialIdInfo {
                nct_id,
                brief_title: ident["briefTitle"].as_str().map(str::to_string),
                official_title: ident["officialTitle"].as_str().map(str::to_string),
            },
            arms: non_null(&arms_module["armGroups"]),
            interventions: non_null(&arms_module["interventions"]),
            eligibility: TrialEligibility {
                criteria: elig["eligibilityCriteria"].as_str().map(str::to_string),
                gender: elig["sex"].as_str().map(str::to_string),
                min_age: elig["minimumAge"].as_str().map(str::to_string),
            },
            outcomes,
        })
    }

    /// The trial's NCT identifier.
    pub fn nct_id(&self) -> &str {
        self.id_info.nct_id.as_deref().unwrap_or("UNKNOWN")
    }

    /// The trial's official title, if present.
    pub fn official_title(&self) -> &str {
        self.id_info.official_title.as_deref().unwrap_or("UNKNOWN")
    }
}

fn non_null(value: &Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value.clone())
    }
}

/// The model's efficacy verdict for a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EfficacyStatus {
    /// Primary endpoint met significance (p < 0.05)
    Positive,
    /// Primary endpoint failed or CI crosses the null
    Negative,
    /// Contradictory primary endpoints
    Mixed,
    /// No results reported
    Uncertain,
}

impl EfficacyStatus {
    /// Wire-format string (uppercase).
    pub fn as_str(&self) -> &'static str {
        match self {
            EfficacyStatus::Positive => "POSITIVE",
            EfficacyStatus::Negative => "NEGATIVE",
            EfficacyStatus::Mixed => "MIXED",
            EfficacyStatus::Uncertain => "UNCERTAIN",
        }
    }
}

/// Structured annotation the model returns for one trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialAnnotation {
    #[serde(default)]
    pub experimental_drugs: Vec<String>,

    #[serde(default)]
    pub biomarkers: Vec<String>,

    #[serde(default)]
    pub primary_outcomes_summary: String,

    pub efficacy_status: EfficacyStatus,

    #[serde(default)]
    pub reasoning: String,
}

/// A finished table row: annotation joined back to trial identity.
#[derive(Debug, Clone)]
pub struct TrialRow {
    pub nct_id: String,
    pub official_title: String,
    pub annotation: TrialAnnotation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> Value {
        json!({
            "protocolSection": {
                "identificationModule": {
                    "nctId": "NCT01234567",
                    "briefTitle": "Short title",
                    "officialTitle": "A Phase III Study of Osimertinib"
                },
                "armsInterventionsModule": {
                    "armGroups": [{"label": "Arm A"}],
                    "interventions": [{"name": "Osimertinib"}]
                },
                "eligibilityModule": {
                    "eligibilityCriteria": "EGFR mutation positive",
                    "sex": "ALL",
                    "minimumAge": "18 Years"
                }
            },
            "resultsSection": {
                "outcomeMeasuresModule": {
                    "outcomeMeasures": [
                        {"type": "PRIMARY", "title": "Progression-Free Survival"},
                        {"type": "SECONDARY", "title": "Overall Survival"},
                        {"type": "SECONDARY", "title": "Quality of Life"}
                    ]
                }
            }
        })
    }

    #[test]
    fn test_prune_keeps_primary_and_survival_outcomes() {
        let pruned = PrunedTrial::from_record(&sample_record()).unwrap();
        assert_eq!(pruned.nct_id(), "NCT01234567");
        assert_eq!(pruned.official_title(), "A Phase III Study of Osimertinib");
        // Quality of Life is neither primary nor survival/progression/response
        assert_eq!(pruned.outcomes.len(), 2);
        assert_eq!(
            pruned.eligibility.criteria.as_deref(),
            Some("EGFR mutation positive")
        );
    }

    #[test]
    fn test_prune_requires_nct_id() {
        let record = json!({"protocolSection": {"identificationModule": {}}});
        assert!(matches!(
            PrunedTrial::from_record(&record),
            Err(ExtractionError::Validation { .. })
        ));
    }

    #[test]
    fn test_annotation_decodes_wire_format() {
        let json = r#"{
            "experimental_drugs": ["Osimertinib"],
            "biomarkers": ["EGFR"],
            "primary_outcomes_summary": "PFS improved vs chemo",
            "efficacy_status": "POSITIVE",
            "reasoning": "HR 0.46, p < 0.001"
        }"#;

        let annotation: TrialAnnotation = serde_json::from_str(json).unwrap();
        assert_eq!(annotation.efficacy_status, EfficacyStatus::Positive);
        assert_eq!(annotation.efficacy_status.as_str(), "POSITIVE");
    }

    #[test]
    fn test_annotation_requires_efficacy_status() {
        let json = r#"{"experimental_drugs": [], "biomarkers": []}"#;
        assert!(serde_json::from_str::<TrialAnnotation>(json).is_err());
    }
}
