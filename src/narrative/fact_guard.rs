//! Mechanical check that a stylistic rewrite kept every fact.
//!
//! Numbers are compared in normalized form so that `07` matches `7`,
//! `98.60` matches `98.6` and `1,200` matches `1200`. Signs and units are
//! ignored; `142/88` contributes `142` and `88`.
//!
//! Clinical terms come from the encounter's records. A term is checked in
//! its short form: the trailing semantic tag (`(disorder)`) and everything
//! from the first dose token on are dropped, so `lisinopril 10 MG Oral
//! Tablet` is checked as `lisinopril`. Only terms the synthesized document
//! mentions are required in the refined one, matched case-insensitively on
//! word boundaries.

use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;

use crate::{
    error::{PipelineError, reasoning_engine},
    narrative::types::{
        FactDriftPolicy, GeneratedDocument, KeptText, RefinedDocument, RefinerOutput,
    },
};

static NUMBER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?").expect("numeric pattern compiles")
});

/// Normalized numeric tokens appearing in `text`.
pub fn numeric_facts(text: &str) -> BTreeSet<String> {
    NUMBER_PATTERN
        .find_iter(text)
        .map(|found| normalize_number(found.as_str()))
        .collect()
}

/// Values of `original` that no longer appear in `refined`, in ascending
/// normalized order.
pub fn missing_facts(original: &str, refined: &str) -> Vec<String> {
    let kept = numeric_facts(refined);
    numeric_facts(original)
        .into_iter()
        .filter(|value| !kept.contains(value))
        .collect()
}

fn normalize_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    let (integer, fraction) = match digits.split_once('.') {
        Some((integer, fraction)) => (integer, fraction.trim_end_matches('0')),
        None => (digits.as_str(), ""),
    };
    let integer = integer.trim_start_matches('0');
    let integer = if integer.is_empty() { "0" } else { integer };
    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{integer}.{fraction}")
    }
}

/// Short forms of `clinical_terms` mentioned in `original` but absent from
/// `refined`, in ascending order.
pub fn missing_terms(original: &str, refined: &str, clinical_terms: &[String]) -> Vec<String> {
    let original = original.to_lowercase();
    let refined = refined.to_lowercase();
    clinical_terms
        .iter()
        .filter_map(|term| short_form(term))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|term| mentions(&original, term) && !mentions(&refined, term))
        .collect()
}

fn short_form(term: &str) -> Option<String> {
    let term = term.trim();
    let untagged = term
        .strip_suffix(')')
        .and_then(|rest| rest.rfind('(').map(|open| &rest[..open]))
        .unwrap_or(term);
    let name = untagged
        .split_whitespace()
        .take_while(|word| !word.starts_with(|c: char| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    (name.chars().filter(|c| c.is_alphanumeric()).count() >= 3).then_some(name)
}

fn mentions(text: &str, term: &str) -> bool {
    text.match_indices(term).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + term.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Applies the configured drift policy to one refiner result. Drift lists
/// missing numbers first, then missing clinical terms.
pub fn guard_refinement(
    policy: FactDriftPolicy,
    generated: &GeneratedDocument,
    clinical_terms: &[String],
    refined: RefinerOutput,
) -> Result<RefinedDocument, PipelineError> {
    let mut fact_drift = missing_facts(&generated.content, &refined.realistic_document);
    fact_drift.extend(missing_terms(
        &generated.content,
        &refined.realistic_document,
        clinical_terms,
    ));
    if fact_drift.is_empty() {
        return Ok(RefinedDocument {
            document_type: generated.document_type.clone(),
            content: refined.realistic_document,
            applied_transformations: refined.applied_transformations,
            fact_drift,
            kept: KeptText::Refined,
        });
    }

    match policy {
        FactDriftPolicy::Fail => Err(reasoning_engine(format!(
            "refined '{}' dropped facts: {}",
            generated.document_type,
            fact_drift.join(", ")
        ))),
        FactDriftPolicy::Warn => {
            tracing::warn!(
                target: "refiner",
                document_type = %generated.document_type,
                missing = ?fact_drift,
                "fact_drift_kept_refined"
            );
            Ok(RefinedDocument {
                document_type: generated.document_type.clone(),
                content: refined.realistic_document,
                applied_transformations: refined.applied_transformations,
                fact_drift,
                kept: KeptText::Refined,
            })
        }
        FactDriftPolicy::KeepOriginal => {
            tracing::warn!(
                target: "refiner",
                document_type = %generated.document_type,
                missing = ?fact_drift,
                "fact_drift_kept_original"
            );
            Ok(RefinedDocument {
                document_type: generated.document_type.clone(),
                content: generated.content.clone(),
                applied_transformations: Vec::new(),
                fact_drift,
                kept: KeptText::Original,
            })
        }
    }
}
