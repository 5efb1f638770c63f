//! Citation stripping and search-term extraction for node text.
//!
//! Guideline text arrives peppered with superscript citation marks and
//! cross-references to other pages ("See NSCL-5", "(AML-A)"). Cleaning
//! removes those while keeping the clinical content intact, so node
//! labels render and index well downstream.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

// Superscripts, subscripts, and the unicode blocks the source PDFs use
// as citation marks. Greek and Canadian syllabics show up as renderer
// artifacts of superscript glyphs.
fn citation_marks() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            "[\\x{00b0}-\\x{00bf}\
             \\x{00aa}\\x{00ba}\
             \\x{02b0}-\\x{02ff}\
             \\x{1d00}-\\x{1dff}\
             \\x{2070}-\\x{209f}\
             \\x{1400}-\\x{167f}\
             \\x{a720}-\\x{a7ff}\
             \\x{0370}-\\x{03ff}]+",
        )
        .expect("valid citation-mark pattern")
    })
}

fn see_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*See\s+[A-Z]+-\d+\s*").expect("valid see-reference pattern"))
}

fn paren_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\s*\([A-Z]+-[A-Z0-9]+\)").expect("valid paren-reference pattern")
    })
}

fn bracket_reference() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\[[A-Z]+-\d+\]").expect("valid bracket-reference pattern"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

/// Remove citation markers from guideline text.
///
/// Strips unicode superscript marks, "See ABC-1" cross-references, and
/// citation-style parentheticals/brackets like "(AML-A)" or "[NSCL-7]".
/// Meaningful parenthetical content is untouched.
pub fn clean_text(text: &str) -> String {
    let cleaned = citation_marks().replace_all(text, "");
    let cleaned = see_reference().replace_all(&cleaned, "");
    let cleaned = paren_reference().replace_all(&cleaned, "");
    let cleaned = bracket_reference().replace_all(&cleaned, "");

    let cleaned = whitespace_runs().replace_all(cleaned.trim(), " ");
    cleaned
        .trim_end_matches([',', ':', ';'])
        .trim()
        .to_string()
}

fn known_drugs() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| {
        HashSet::from([
            "cytarabine",
            "midostaurin",
            "quizartinib",
            "gemtuzumab",
            "daunorubicin",
            "idarubicin",
            "mitoxantrone",
            "venetoclax",
            "azacitidine",
            "decitabine",
            "cpx-351",
            "flag-ida",
            "hct",
            "chemotherapy",
            "radiation",
            "immunotherapy",
            "cabazitaxel",
            "docetaxel",
            "paclitaxel",
            "pembrolizumab",
            "nivolumab",
            "atezolizumab",
            "durvalumab",
            "trastuzumab",
            "pertuzumab",
            "lapatinib",
            "erlotinib",
            "gefitinib",
            "afatinib",
            "osimertinib",
            "alectinib",
            "crizotinib",
            "ceritinib",
            "bevacizumab",
            "ramucirumab",
            "lenvatinib",
            "sunitinib",
            "sorafenib",
            "regorafenib",
            "imatinib",
            "dasatinib",
            "nilotinib",
            "bortezomib",
            "carfilzomib",
            "ixazomib",
            "lenalidomide",
            "pomalidomide",
            "thalidomide",
            "capecitabine",
            "fluorouracil",
            "5-fu",
            "oxaliplatin",
            "irinotecan",
            "cisplatin",
            "carboplatin",
            "rituximab",
            "ofatumumab",
            "obinutuzumab",
            "alemtuzumab",
            "blincyomab",
            "blinatumomab",
        ])
    })
}

const STOPWORDS: [&str; 26] = [
    "the", "a", "an", "and", "or", "but", "in", "of", "to", "for", "with", "by", "from", "at",
    "on", "if", "is", "as", "per", "y", "other", "only", "not", "no", "use", "consideration",
];

const CONDITION_KEYWORDS: [&str; 6] = [
    "eligible",
    "risk",
    "mutation",
    "abnormality",
    "criteria",
    "ineligible",
];

// Disease abbreviations that capitalize like drug names but are not
// search-worthy on their own
const DISEASE_ABBREVIATIONS: [&str; 6] = ["aml", "cml", "nsclc", "sclc", "hcc", "cnl"];

/// Extract core drug or intervention names from node text.
///
/// Returns `None` for pure condition/decision nodes (text with
/// eligibility or risk language and no recognizable treatment).
pub fn extract_search_terms(text: &str) -> Option<String> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return None;
    }

    let lower = cleaned.to_lowercase();
    let has_condition_keyword = CONDITION_KEYWORDS.iter().any(|k| lower.contains(k));
    let has_known_drug = known_drugs().iter().any(|d| lower.contains(d));

    if has_condition_keyword && !has_known_drug {
        return None;
    }

    let mut terms = Vec::new();
    for word in cleaned.split_whitespace() {
        let lower_word = word.to_lowercase();

        if known_drugs().contains(lower_word.as_str()) {
            terms.push(word);
        } else if word.chars().next().is_some_and(char::is_uppercase)
            && !STOPWORDS.contains(&lower_word.as_str())
            && !CONDITION_KEYWORDS.contains(&lower_word.as_str())
            && !DISEASE_ABBREVIATIONS.contains(&lower_word.as_str())
        {
            terms.push(word);
        }
    }

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
