use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{self, AxisOrder};
use crate::classify::{classify, Attainment, DivergingScale};
use crate::models::{
    AssessmentRecord, PivotTable, TrendFit, ATTAINMENT_TARGET, BLOOM_ORDER,
};
use crate::narrative;
use crate::semester::{short_tag, SemesterIndex};
use crate::signif;
use crate::trend::{self, TrendObs};

/// "PI-1: Able to ..." -> "PI-1".
pub fn short_indicator(text: &str) -> String {
    text.split(':').next().unwrap_or(text).trim().to_string()
}

/// Omnibus and pairwise verdicts over Bloom levels. `None` means the test
/// was unavailable for this dataset, not that it came out zero.
#[derive(Debug, Clone, Serialize)]
pub struct BloomTests {
    /// Kruskal-Wallis p-value across the ordered Bloom levels present.
    pub kruskal_p: Option<f64>,
    /// Rank-biserial effect size of "Analyze" rows against all others.
    pub analyze_delta: Option<f64>,
}

/// Mean attainment per semester, in chronological order, with the
/// three-way target classification.
#[derive(Debug, Clone, Serialize)]
pub struct SemesterPoint {
    pub tag: String,
    pub index: usize,
    pub mean_attain: f64,
    pub count: usize,
    pub classification: Attainment,
}

/// Everything the reporting layer needs for one course + SLO.
#[derive(Debug, Clone, Serialize)]
pub struct CourseAnalysis {
    pub course: String,
    pub slo: String,
    pub semesters: Vec<String>,
    pub semester_series: Vec<SemesterPoint>,
    /// rows = semester tags, cols = indicators.
    pub by_semester: PivotTable,
    /// rows = "PI-n (Bloom)" combos, cols = semester tags.
    pub by_indicator_bloom: PivotTable,
    pub trend: Option<TrendFit>,
    pub bloom: BloomTests,
    /// Diverging scale over the random-intercept estimates; `None` when
    /// the fit had no usable group spread.
    pub effect_scale: Option<DivergingScale>,
}

/// Per-course attainment for a cross-course SLO analysis.
#[derive(Debug, Clone, Serialize)]
pub struct CourseStat {
    pub course: String,
    pub mean: f64,
    pub std_error: f64,
    /// Upper end of the 95% interval on the mean (z-based, as rendered on
    /// the course bars). NaN when the standard error is undefined.
    pub ci_high: f64,
    pub count: usize,
    pub classification: Attainment,
}

/// Everything the reporting layer needs for one SLO across courses.
#[derive(Debug, Clone, Serialize)]
pub struct SloAnalysis {
    pub slo: String,
    /// Sorted best-first by mean attainment.
    pub courses: Vec<CourseStat>,
    /// Attainment values per Bloom level present, in taxonomy order,
    /// for the external box-plot renderer.
    pub bloom_groups: Vec<(String, Vec<f64>)>,
    pub bloom: BloomTests,
    /// OLS trend over per-semester mean attainment.
    pub trend: Option<TrendFit>,
    /// Row-level trend fit per indicator tag.
    pub indicator_trends: Vec<(String, TrendFit)>,
    /// Heuristic intervention tags per semester tag.
    pub interventions: BTreeMap<String, Vec<String>>,
}

/// Analyze one course + SLO slice: pivots, mixed-effects trend, Bloom
/// significance tests, and per-semester classifications. Unusable rows are
/// dropped, degenerate models fall back internally, and an empty slice
/// yields an empty (not erroneous) result.
pub fn analyze_course(course: &str, slo: &str, records: &[AssessmentRecord]) -> CourseAnalysis {
    let rows = aggregate::clean_records(records);
    let index = SemesterIndex::from_records(&rows);

    let by_semester = aggregate::pivot(
        &rows,
        |r| short_tag(&r.semester),
        AxisOrder::Chronological,
        |r| r.indicator.clone(),
        AxisOrder::Lexicographic,
    );
    let by_indicator_bloom = aggregate::pivot(
        &rows,
        |r| format!("{} ({})", short_indicator(&r.indicator), r.bloom_level),
        AxisOrder::Lexicographic,
        |r| short_tag(&r.semester),
        AxisOrder::Chronological,
    );

    let trend = trend::fit(&trend_points(&rows, &index));
    let effect_scale = trend.as_ref().and_then(|fit| {
        let effects: Vec<f64> = fit.random_effects.iter().map(|(_, u)| *u).collect();
        DivergingScale::from_effects(&effects)
    });

    CourseAnalysis {
        course: course.to_string(),
        slo: slo.to_string(),
        semesters: index.tags().to_vec(),
        semester_series: semester_series(&rows, &index),
        by_semester,
        by_indicator_bloom,
        trend,
        bloom: bloom_tests(&rows),
        effect_scale,
    }
}

/// Analyze one SLO across all courses: per-course attainment ranking,
/// Bloom-level distributions and tests, the semester-mean OLS trend,
/// per-indicator trends, and intervention tags.
pub fn analyze_slo(slo: &str, records: &[AssessmentRecord]) -> SloAnalysis {
    let rows = aggregate::clean_records(records);
    let index = SemesterIndex::from_records(&rows);

    let mut courses: Vec<CourseStat> = aggregate::aggregate(&rows, |r| vec![r.course.clone()])
        .into_iter()
        .map(|stat| CourseStat {
            course: stat.key[0].clone(),
            mean: stat.mean,
            std_error: stat.std_error,
            ci_high: stat.mean + 1.96 * stat.std_error,
            count: stat.count,
            classification: classify(stat.mean, ATTAINMENT_TARGET),
        })
        .collect();
    courses.sort_by(|a, b| b.mean.partial_cmp(&a.mean).unwrap_or(std::cmp::Ordering::Equal));

    // One point per semester: mean attainment against the chronological
    // index, fit by plain OLS (a per-semester random intercept would have
    // nothing to estimate on a means-only series).
    let semester_means: Vec<TrendObs> = semester_series(&rows, &index)
        .into_iter()
        .map(|point| TrendObs {
            semester_idx: point.index,
            attain: point.mean_attain,
            semester: point.tag,
        })
        .collect();
    let trend = trend::fit_ols(&semester_means);

    let mut indicator_tags: Vec<String> = rows
        .iter()
        .map(|r| short_indicator(&r.indicator))
        .collect();
    indicator_tags.sort();
    indicator_tags.dedup();
    let indicator_trends = indicator_tags
        .into_iter()
        .filter_map(|tag| {
            let subset: Vec<AssessmentRecord> = rows
                .iter()
                .filter(|r| short_indicator(&r.indicator) == tag)
                .cloned()
                .collect();
            trend::fit(&trend_points(&subset, &index)).map(|fit| (tag, fit))
        })
        .collect();

    SloAnalysis {
        slo: slo.to_string(),
        courses,
        bloom_groups: bloom_groups(&rows),
        bloom: bloom_tests(&rows),
        trend,
        indicator_trends,
        interventions: narrative::tags_by_semester(&rows),
    }
}

fn trend_points(rows: &[AssessmentRecord], index: &SemesterIndex) -> Vec<TrendObs> {
    rows.iter()
        .filter_map(|r| {
            let tag = short_tag(&r.semester);
            index.index_of(&tag).map(|semester_idx| TrendObs {
                semester_idx,
                attain: r.attain(),
                semester: tag,
            })
        })
        .collect()
}

fn semester_series(rows: &[AssessmentRecord], index: &SemesterIndex) -> Vec<SemesterPoint> {
    let stats = aggregate::aggregate(rows, |r| vec![short_tag(&r.semester)]);
    let mut series: Vec<SemesterPoint> = stats
        .into_iter()
        .filter_map(|stat| {
            let tag = stat.key[0].clone();
            index.index_of(&tag).map(|idx| SemesterPoint {
                index: idx,
                mean_attain: stat.mean,
                count: stat.count,
                classification: classify(stat.mean, ATTAINMENT_TARGET),
                tag,
            })
        })
        .collect();
    series.sort_by_key(|point| point.index);
    series
}

/// Attainment values per Bloom level present, in taxonomy order.
/// Unrecognized levels stay off the ordered axis.
fn bloom_groups(rows: &[AssessmentRecord]) -> Vec<(String, Vec<f64>)> {
    BLOOM_ORDER
        .iter()
        .filter_map(|level| {
            let values: Vec<f64> = rows
                .iter()
                .filter(|r| r.bloom_level == *level)
                .map(|r| r.attain())
                .collect();
            if values.is_empty() {
                None
            } else {
                Some((level.to_string(), values))
            }
        })
        .collect()
}

fn bloom_tests(rows: &[AssessmentRecord]) -> BloomTests {
    let groups: Vec<Vec<f64>> = bloom_groups(rows)
        .into_iter()
        .map(|(_, values)| values)
        .collect();
    let kruskal_p = signif::kruskal_wallis(&groups);

    let analyze: Vec<f64> = rows
        .iter()
        .filter(|r| r.bloom_level == "Analyze")
        .map(|r| r.attain())
        .collect();
    let others: Vec<f64> = rows
        .iter()
        .filter(|r| r.bloom_level != "Analyze")
        .map(|r| r.attain())
        .collect();
    let analyze_delta = signif::rank_biserial(&analyze, &others);

    BloomTests {
        kruskal_p,
        analyze_delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FitMethod;

    fn record(
        course: &str,
        indicator: &str,
        bloom: &str,
        semester: &str,
        attain: f64,
    ) -> AssessmentRecord {
        AssessmentRecord {
            course: course.to_string(),
            slo: "SLO1".to_string(),
            indicator: indicator.to_string(),
            bloom_level: bloom.to_string(),
            semester: semester.to_string(),
            expert: attain,
            practitioner: 0.0,
            apprentice: 0.0,
            novice: 0.0,
            explanation: String::new(),
            observations: String::new(),
        }
    }

    #[test]
    fn short_indicator_strips_description() {
        assert_eq!(short_indicator("PI-1: Able to identify"), "PI-1");
        assert_eq!(short_indicator("PI-2"), "PI-2");
    }

    #[test]
    fn three_semester_course_scenario() {
        let records = vec![
            record("MECE 1101", "PI-1: Identify", "Apply", "Fall 2020", 60.0),
            record("MECE 1101", "PI-1: Identify", "Apply", "Spring 2021", 70.0),
            record("MECE 1101", "PI-1: Identify", "Apply", "Fall 2021", 80.0),
        ];
        let analysis = analyze_course("MECE 1101", "SLO1", &records);

        assert_eq!(analysis.semesters, vec!["F20", "Sp21", "F21"]);

        let trend = analysis.trend.unwrap();
        assert!(trend.slope > 0.0);
        // n = 1 per semester, so each group mean is the observation itself
        // and every fitted interval must cover it.
        for (point, observed) in trend.points.iter().zip([60.0, 70.0, 80.0]) {
            assert!(point.low - 1e-9 <= observed && observed <= point.high + 1e-9);
        }

        let series = &analysis.semester_series;
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].classification, Attainment::BelowTarget);
        assert_eq!(series[1].classification, Attainment::MeetsTarget);
        assert_eq!(series[2].classification, Attainment::MeetsTarget);
    }

    #[test]
    fn pivot_keeps_unobserved_combinations_missing() {
        let records = vec![
            record("MECE 1101", "PI-1: Identify", "Apply", "Fall 2021", 80.0),
            record("MECE 1101", "PI-2: Design", "Create", "Spring 2022", 65.0),
        ];
        let analysis = analyze_course("MECE 1101", "SLO1", &records);
        assert_eq!(
            analysis.by_semester.cell("F21", "PI-1: Identify"),
            Some(80.0)
        );
        assert_eq!(analysis.by_semester.cell("Sp22", "PI-1: Identify"), None);
        assert_eq!(
            analysis.by_indicator_bloom.cell("PI-2 (Create)", "Sp22"),
            Some(65.0)
        );
    }

    #[test]
    fn empty_and_cleaned_away_input_is_not_an_error() {
        let analysis = analyze_course("MECE 1101", "SLO1", &[]);
        assert!(analysis.trend.is_none());
        assert!(analysis.by_semester.is_empty());
        assert_eq!(analysis.bloom.kruskal_p, None);
        assert_eq!(analysis.bloom.analyze_delta, None);

        let blank = vec![record("MECE 1101", "   ", "Apply", "Fall 2021", 75.0)];
        let analysis = analyze_course("MECE 1101", "SLO1", &blank);
        assert!(analysis.trend.is_none());
        assert!(analysis.semester_series.is_empty());
    }

    #[test]
    fn slo_analysis_ranks_and_classifies_courses() {
        let records = vec![
            record("MECE 1101", "PI-1: Identify", "Apply", "Fall 2020", 80.0),
            record("MECE 1101", "PI-1: Identify", "Apply", "Spring 2021", 84.0),
            record("MECE 2302", "PI-1: Identify", "Analyze", "Fall 2020", 58.0),
            record("MECE 2302", "PI-1: Identify", "Analyze", "Spring 2021", 62.0),
        ];
        let analysis = analyze_slo("SLO1", &records);

        assert_eq!(analysis.courses.len(), 2);
        assert_eq!(analysis.courses[0].course, "MECE 1101");
        assert_eq!(analysis.courses[0].classification, Attainment::MeetsTarget);
        assert_eq!(analysis.courses[1].course, "MECE 2302");
        assert_eq!(analysis.courses[1].classification, Attainment::BelowTarget);

        // Analyze rows sit strictly below all others: full negative dominance.
        assert_eq!(analysis.bloom.analyze_delta, Some(-1.0));

        let trend = analysis.trend.unwrap();
        assert_eq!(trend.method, FitMethod::OlsFallback);
        assert_eq!(trend.points.len(), 2);

        assert_eq!(analysis.indicator_trends.len(), 1);
        assert_eq!(analysis.indicator_trends[0].0, "PI-1");
    }
}
