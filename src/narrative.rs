//! Best-effort tag extraction from instructor narrative text, used to
//! annotate semesters where a course intervention happened. This is a
//! text-mining heuristic with no correctness guarantees; none of the
//! statistical modules depend on it.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::AssessmentRecord;
use crate::semester::short_tag;

static VERB_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(added|introduced|implemented|redesigned|revised|flipped|created|adopted|launched|updated|expanded|removed|deployed)\b",
    )
    .expect("verb pattern is valid")
});

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "for", "in", "on", "with", "by", "and", "all",
    "each", "every", "this", "that", "these", "those", "have", "has", "was",
    "were", "is", "are", "be", "been",
];

/// Distill narrative text into a short "Verb Word Word" tag, or `None`
/// when nothing descriptive is found (short text, no action verb, or only
/// stop words after the verb).
pub fn intervention_tag(text: &str) -> Option<String> {
    let text = text.trim();
    if text.len() < 12 {
        return None;
    }
    let matched = VERB_RE.find(text)?;
    let verb = title_case(matched.as_str());
    let tail = &text[matched.end()..];

    let mut kept = pick_words(tail, 3, true);
    if kept.is_empty() {
        kept = pick_words(tail, 2, false);
    }
    if kept.is_empty() {
        return None;
    }

    let mut parts = vec![verb];
    parts.extend(kept);
    Some(parts.join(" "))
}

/// Tags grouped by semester short tag, from each record's combined
/// narrative columns. Duplicate tags within a semester are collapsed.
pub fn tags_by_semester(records: &[AssessmentRecord]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for record in records {
        let narrative = format!("{} {}", record.observations, record.explanation);
        if let Some(tag) = intervention_tag(&narrative) {
            let entry = grouped.entry(short_tag(&record.semester)).or_default();
            if !entry.contains(&tag) {
                entry.push(tag);
            }
        }
    }
    grouped
}

fn pick_words(tail: &str, max_keep: usize, min_length: bool) -> Vec<String> {
    tail.split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|w| !w.is_empty())
        .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .filter(|w| !min_length || w.len() > 2)
        .take(max_keep)
        .map(title_case)
        .collect()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_or_verbless_text_yields_nothing() {
        assert_eq!(intervention_tag(""), None);
        assert_eq!(intervention_tag("added quiz"), None); // below length floor
        assert_eq!(
            intervention_tag("Students struggled with the final exam material"),
            None
        );
    }

    #[test]
    fn verb_plus_descriptive_words_make_a_tag() {
        assert_eq!(
            intervention_tag("We added a new quiz on vector statics"),
            Some("Added New Quiz Vector".to_string())
        );
        assert_eq!(
            intervention_tag("Instructor redesigned the lab rubric this term."),
            Some("Redesigned Lab Rubric Term".to_string())
        );
    }

    #[test]
    fn verb_with_only_stop_words_after_yields_nothing() {
        assert_eq!(intervention_tag("It was added to all of these"), None);
    }

    #[test]
    fn tags_group_by_semester_tag() {
        let record = AssessmentRecord {
            course: "MECE 1101".to_string(),
            slo: "SLO1".to_string(),
            indicator: "PI-1".to_string(),
            bloom_level: "Apply".to_string(),
            semester: "Fall 2021".to_string(),
            expert: 40.0,
            practitioner: 30.0,
            apprentice: 20.0,
            novice: 10.0,
            explanation: String::new(),
            observations: "Introduced weekly solver sessions".to_string(),
        };
        let other = AssessmentRecord {
            observations: String::new(),
            ..record.clone()
        };

        let tags = tags_by_semester(&[record, other]);
        assert_eq!(tags.len(), 1);
        assert_eq!(
            tags["F21"],
            vec!["Introduced Weekly Solver Sessions".to_string()]
        );
    }
}
