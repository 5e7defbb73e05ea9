use std::path::Path;

use anyhow::Context;
use log::info;

use crate::models::AssessmentRecord;

/// Load assessment rows from a CSV export. Expected header:
/// course,slo,indicator,bloom_level,semester,expert,practitioner,
/// apprentice,novice[,explanation,observations]
pub fn load_csv(path: &Path) -> anyhow::Result<Vec<AssessmentRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut records = Vec::new();
    for result in reader.deserialize::<AssessmentRecord>() {
        let record = result.with_context(|| format!("bad row in {}", path.display()))?;
        records.push(record);
    }
    info!("loaded {} rows from {}", records.len(), path.display());
    Ok(records)
}

/// Normalize a user-supplied label: non-breaking spaces become plain
/// spaces, surrounding whitespace goes.
pub fn normalize_label(label: &str) -> String {
    label.replace('\u{00A0}', " ").trim().to_string()
}

pub fn filter_course_slo(
    records: &[AssessmentRecord],
    course: &str,
    slo: &str,
) -> Vec<AssessmentRecord> {
    let course = normalize_label(course);
    let slo = normalize_label(slo);
    records
        .iter()
        .filter(|r| r.course == course && r.slo == slo)
        .cloned()
        .collect()
}

pub fn filter_slo(records: &[AssessmentRecord], slo: &str) -> Vec<AssessmentRecord> {
    let slo = normalize_label(slo);
    records.iter().filter(|r| r.slo == slo).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_rows_deserialize_with_optional_narrative() {
        let file = tempfile_path("slo-attainment-load");
        let data = "\
course,slo,indicator,bloom_level,semester,expert,practitioner,apprentice,novice
MECE 1101,SLO1,PI-1: Identify,Apply,Fall 2021,40,30,20,10
MECE 1101,SLO1,PI-2: Design,Create,Spring 2022,35,25,25,15
";
        std::fs::File::create(&file)
            .unwrap()
            .write_all(data.as_bytes())
            .unwrap();

        let records = load_csv(&file).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].course, "MECE 1101");
        assert_eq!(records[0].attain(), 70.0);
        assert_eq!(records[0].observations, "");
        std::fs::remove_file(&file).ok();
    }

    #[test]
    fn labels_normalize_nbsp_and_whitespace() {
        assert_eq!(normalize_label(" MECE\u{00A0}1101 "), "MECE 1101");
    }

    #[test]
    fn filters_match_normalized_labels() {
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
            observations: String::new(),
        };
        let records = vec![record];
        assert_eq!(filter_course_slo(&records, "MECE\u{00A0}1101 ", "SLO1").len(), 1);
        assert_eq!(filter_course_slo(&records, "MECE 1101", "SLO2").len(), 0);
        assert_eq!(filter_slo(&records, " SLO1").len(), 1);
    }

    fn tempfile_path(prefix: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("{prefix}-{}.csv", std::process::id()));
        path
    }
}
