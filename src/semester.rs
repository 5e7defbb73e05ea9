use std::collections::HashMap;

use crate::models::AssessmentRecord;

/// Sort key for labels that fail tag derivation: they fail open at the
/// end of the chronology instead of breaking the ordering of good labels.
pub const UNORDERED_KEY: u32 = u32::MAX;

/// Canonical short tag for a "Season Year" semester label.
///
/// "Fall 2021" -> "F21", "Spring 2021" -> "Sp21". Any season that does not
/// start with "f" (case-insensitive) is treated as spring. Malformed labels
/// (not exactly two tokens, non-numeric or too-short year) come back
/// unchanged as their own tag.
pub fn short_tag(label: &str) -> String {
    let tokens: Vec<&str> = label.split_whitespace().collect();
    if tokens.len() != 2 {
        return label.to_string();
    }
    let (season, year) = (tokens[0], tokens[1]);
    if year.len() < 2 || !year.chars().all(|c| c.is_ascii_digit()) {
        return label.to_string();
    }
    let prefix = if season.to_lowercase().starts_with('f') {
        "F"
    } else {
        "Sp"
    };
    format!("{}{}", prefix, &year[year.len() - 2..])
}

/// Chronological key for a short tag: `key(Fall Y) = 2Y + 1`,
/// `key(Spring Y) = 2Y`, so Fall of year Y sorts after Spring of year Y
/// and before Spring of year Y + 1. Tags that do not parse get
/// [`UNORDERED_KEY`].
pub fn chronological_key(tag: &str) -> u32 {
    if let Some(digits) = tag.strip_prefix("Sp") {
        if let Ok(yy) = digits.parse::<u32>() {
            return (2000 + yy) * 2;
        }
    } else if let Some(digits) = tag.strip_prefix('F') {
        if let Ok(yy) = digits.parse::<u32>() {
            return (2000 + yy) * 2 + 1;
        }
    }
    UNORDERED_KEY
}

/// Bijection from the distinct short tags in a dataset to a zero-based
/// chronological index. Ordering is global chronology, not discovery order.
#[derive(Debug, Clone)]
pub struct SemesterIndex {
    tags: Vec<String>,
    index: HashMap<String, usize>,
}

impl SemesterIndex {
    pub fn from_records(records: &[AssessmentRecord]) -> Self {
        Self::from_labels(records.iter().map(|r| r.semester.as_str()))
    }

    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut tags: Vec<String> = Vec::new();
        for label in labels {
            let tag = short_tag(label);
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        // Secondary sort by tag keeps unmapped labels deterministic.
        tags.sort_by(|a, b| {
            chronological_key(a)
                .cmp(&chronological_key(b))
                .then_with(|| a.cmp(b))
        });
        let index = tags
            .iter()
            .enumerate()
            .map(|(i, tag)| (tag.clone(), i))
            .collect();
        SemesterIndex { tags, index }
    }

    pub fn index_of(&self, tag: &str) -> Option<usize> {
        self.index.get(tag).copied()
    }

    /// Distinct short tags in chronological order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_tags_follow_season_convention() {
        assert_eq!(short_tag("Fall 2021"), "F21");
        assert_eq!(short_tag("Spring 2021"), "Sp21");
        assert_eq!(short_tag("fall 2019"), "F19");
        assert_eq!(short_tag("Summer 2022"), "Sp22");
    }

    #[test]
    fn malformed_labels_pass_through() {
        assert_eq!(short_tag("Fall2021"), "Fall2021");
        assert_eq!(short_tag("Fall of 2021"), "Fall of 2021");
        assert_eq!(short_tag("Fall 20x1"), "Fall 20x1");
        assert_eq!(short_tag(""), "");
    }

    #[test]
    fn keys_interleave_spring_and_fall() {
        assert_eq!(chronological_key("Sp21"), 4042);
        assert_eq!(chronological_key("F21"), 4043);
        assert!(chronological_key("Sp21") < chronological_key("F21"));
        assert!(chronological_key("F21") < chronological_key("Sp22"));
    }

    #[test]
    fn keys_increase_across_consecutive_terms() {
        let mut labels = Vec::new();
        for year in 2020..=2030 {
            labels.push(format!("Spring {year}"));
            labels.push(format!("Fall {year}"));
        }
        let keys: Vec<u32> = labels
            .iter()
            .map(|l| chronological_key(&short_tag(l)))
            .collect();
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn unmapped_tags_sort_last() {
        assert_eq!(chronological_key("whenever"), UNORDERED_KEY);
        let index =
            SemesterIndex::from_labels(["whenever", "Fall 2021", "Spring 2020"]);
        assert_eq!(index.tags(), &["Sp20", "F21", "whenever"]);
    }

    #[test]
    fn index_is_chronological_not_discovery_order() {
        let index = SemesterIndex::from_labels([
            "Fall 2021",
            "Fall 2020",
            "Spring 2021",
            "Fall 2020",
        ]);
        assert_eq!(index.tags(), &["F20", "Sp21", "F21"]);
        assert_eq!(index.index_of("F20"), Some(0));
        assert_eq!(index.index_of("Sp21"), Some(1));
        assert_eq!(index.index_of("F21"), Some(2));
        assert_eq!(index.index_of("Sp22"), None);
        assert_eq!(index.len(), 3);
    }
}
