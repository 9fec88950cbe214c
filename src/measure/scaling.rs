//! Validation of sub-market scaling attribution.

use crate::measure::spec::ScalingSource;

/// Outcome of checking a scaling source.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalingCheck {
    /// Complete attribution; the fractions apply as given.
    Valid,
    /// Incomplete or invalid attribution; scaling falls back to 1.
    Degraded(Vec<String>),
    /// No usable attribution at all; the measure is marked for removal.
    Unusable,
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// Checks the attribution of a measure's sub-market scaling fractions.
pub fn check_scaling_source(source: Option<&ScalingSource>) -> ScalingCheck {
    let Some(src) = source else {
        return ScalingCheck::Unusable;
    };
    let citation = [
        ("title", present(&src.title)),
        ("author", present(&src.author)),
        ("organization", present(&src.organization)),
        ("year", src.year.is_some()),
    ];
    let has_url = present(&src.url);
    let has_derivation = present(&src.fraction_derivation);
    if citation.iter().all(|(_, ok)| !ok) && !has_url && !has_derivation {
        return ScalingCheck::Unusable;
    }

    let mut warnings: Vec<String> = citation
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(field, _)| format!("scaling source is missing its {field}"))
        .collect();
    match src.url.as_deref() {
        Some(url) if url.trim().starts_with("http") => {}
        Some(url) if !url.trim().is_empty() => {
            warnings.push(format!("scaling source url \"{url}\" is not a web address"))
        }
        _ => warnings.push("scaling source is missing its url".to_string()),
    }
    if !has_derivation {
        warnings.push("scaling source does not explain the fraction derivation".to_string());
    }

    if warnings.is_empty() {
        ScalingCheck::Valid
    } else {
        ScalingCheck::Degraded(warnings)
    }
}
