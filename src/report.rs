use std::fmt::Write;

use crate::analysis::{CourseAnalysis, SloAnalysis};
use crate::classify::Attainment;
use crate::models::{FitMethod, PivotTable, TrendFit, ATTAINMENT_TARGET};

fn fmt_value(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{value:.1}")
    }
}

fn fmt_p(p: f64) -> String {
    if p.is_nan() {
        "n/a".to_string()
    } else {
        format!("{p:.3}")
    }
}

fn verdict(classification: Attainment) -> &'static str {
    match classification {
        Attainment::MeetsTarget => "meets target",
        Attainment::BelowTarget => "below target",
        Attainment::Neutral => "no signal",
    }
}

fn method_label(method: FitMethod) -> &'static str {
    match method {
        FitMethod::RandomIntercept => "random-intercept (REML)",
        FitMethod::OlsFallback => "ordinary least squares",
        FitMethod::DegenerateMean => "single-semester mean",
    }
}

fn write_pivot(output: &mut String, table: &PivotTable) {
    if table.is_empty() {
        let _ = writeln!(output, "No data.");
        return;
    }
    let _ = write!(output, "| |");
    for col in &table.cols {
        let _ = write!(output, " {col} |");
    }
    let _ = writeln!(output);
    let _ = write!(output, "|---|");
    for _ in &table.cols {
        let _ = write!(output, "---|");
    }
    let _ = writeln!(output);
    for (row, cells) in table.rows.iter().zip(&table.cells) {
        let _ = write!(output, "| {row} |");
        for cell in cells {
            // absent combinations stay blank, never zero
            match cell {
                Some(value) => {
                    let _ = write!(output, " {} |", fmt_value(*value));
                }
                None => {
                    let _ = write!(output, " - |");
                }
            }
        }
        let _ = writeln!(output);
    }
}

fn write_trend(output: &mut String, trend: Option<&TrendFit>, semesters: &[String]) {
    let trend = match trend {
        Some(trend) => trend,
        None => {
            let _ = writeln!(output, "No usable rows for trend fitting.");
            return;
        }
    };
    let _ = writeln!(
        output,
        "Model: {}. Slope {:+.2} pp/term, p = {}.",
        method_label(trend.method),
        trend.slope,
        fmt_p(trend.p_value)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "| Semester | Fitted | 95% low | 95% high |");
    let _ = writeln!(output, "|---|---|---|---|");
    for point in &trend.points {
        let label = semesters
            .get(point.semester_idx)
            .map(String::as_str)
            .unwrap_or("?");
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} |",
            label,
            fmt_value(point.fitted),
            fmt_value(point.low),
            fmt_value(point.high)
        );
    }
    if !trend.random_effects.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Semester baselines (random intercepts):");
        for (tag, effect) in &trend.random_effects {
            let _ = writeln!(output, "- {tag}: {effect:+.2}");
        }
    }
}

fn write_bloom_tests(output: &mut String, kruskal_p: Option<f64>, delta: Option<f64>) {
    match kruskal_p {
        Some(p) => {
            let _ = writeln!(output, "- Kruskal-Wallis p = {}", fmt_p(p));
        }
        None => {
            let _ = writeln!(output, "- Kruskal-Wallis: n/a");
        }
    }
    match delta {
        Some(delta) => {
            let _ = writeln!(output, "- Cliff's delta (Analyze vs others) = {delta:+.2}");
        }
        None => {
            let _ = writeln!(output, "- Cliff's delta: n/a");
        }
    }
}

pub fn build_course_report(analysis: &CourseAnalysis) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# Attainment analysis: {} / {}",
        analysis.course, analysis.slo
    );
    let _ = writeln!(
        output,
        "Target: {ATTAINMENT_TARGET:.0}% expert + practitioner."
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attainment by semester");
    write_pivot(&mut output, &analysis.by_semester);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attainment by indicator and Bloom level");
    write_pivot(&mut output, &analysis.by_indicator_bloom);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend");
    write_trend(&mut output, analysis.trend.as_ref(), &analysis.semesters);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Bloom-level tests");
    write_bloom_tests(
        &mut output,
        analysis.bloom.kruskal_p,
        analysis.bloom.analyze_delta,
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Semester summary");
    if analysis.semester_series.is_empty() {
        let _ = writeln!(output, "No usable rows.");
    } else {
        for point in &analysis.semester_series {
            let _ = writeln!(
                output,
                "- {}: mean {} over {} rows ({})",
                point.tag,
                fmt_value(point.mean_attain),
                point.count,
                verdict(point.classification)
            );
        }
    }

    output
}

pub fn build_slo_report(analysis: &SloAnalysis) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# SLO attainment analysis: {}", analysis.slo);
    let _ = writeln!(
        output,
        "Target: {ATTAINMENT_TARGET:.0}% expert + practitioner."
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attainment per course");
    if analysis.courses.is_empty() {
        let _ = writeln!(output, "No usable rows.");
    } else {
        let _ = writeln!(output, "| Course | Mean | SE | 95% high | n | Verdict |");
        let _ = writeln!(output, "|---|---|---|---|---|---|");
        for course in &analysis.courses {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} |",
                course.course,
                fmt_value(course.mean),
                fmt_value(course.std_error),
                fmt_value(course.ci_high),
                course.count,
                verdict(course.classification)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Bloom-level distribution");
    if analysis.bloom_groups.is_empty() {
        let _ = writeln!(output, "No rows on the ordered Bloom axis.");
    } else {
        for (level, values) in &analysis.bloom_groups {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            let _ = writeln!(
                output,
                "- {}: {} rows, mean {}",
                level,
                values.len(),
                fmt_value(mean)
            );
        }
    }
    write_bloom_tests(
        &mut output,
        analysis.bloom.kruskal_p,
        analysis.bloom.analyze_delta,
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Semester trend (all courses)");
    match analysis.trend.as_ref() {
        Some(trend) => {
            // The SLO trend is fit on semester means; the fitted points
            // carry the chronological tags via their index order.
            let labels: Vec<String> = trend
                .points
                .iter()
                .map(|p| format!("term {}", p.semester_idx))
                .collect();
            write_trend(&mut output, Some(trend), &labels);
        }
        None => {
            let _ = writeln!(output, "No usable rows for trend fitting.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Indicator trends");
    if analysis.indicator_trends.is_empty() {
        let _ = writeln!(output, "No indicators with usable rows.");
    } else {
        for (tag, fit) in &analysis.indicator_trends {
            let _ = writeln!(
                output,
                "- {}: slope {:+.2} pp/term, p = {} ({})",
                tag,
                fit.slope,
                fmt_p(fit.p_value),
                method_label(fit.method)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Interventions (heuristic)");
    if analysis.interventions.is_empty() {
        let _ = writeln!(output, "No intervention tags detected.");
    } else {
        for (semester, tags) in &analysis.interventions {
            let _ = writeln!(output, "- {}: {}", semester, tags.join("; "));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{analyze_course, analyze_slo};
    use crate::models::AssessmentRecord;

    fn record(course: &str, bloom: &str, semester: &str, attain: f64) -> AssessmentRecord {
        AssessmentRecord {
            course: course.to_string(),
            slo: "SLO1".to_string(),
            indicator: "PI-1: Identify".to_string(),
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
    fn course_report_renders_unavailable_tests_as_na() {
        // One Bloom level only: the omnibus test is unavailable.
        let records = vec![
            record("MECE 1101", "Apply", "Fall 2020", 60.0),
            record("MECE 1101", "Apply", "Spring 2021", 70.0),
        ];
        let report = build_course_report(&analyze_course("MECE 1101", "SLO1", &records));
        assert!(report.contains("Kruskal-Wallis: n/a"));
        assert!(report.contains("Cliff's delta: n/a"));
        assert!(report.contains("# Attainment analysis: MECE 1101 / SLO1"));
    }

    #[test]
    fn course_report_marks_missing_pivot_cells() {
        let records = vec![
            record("MECE 1101", "Apply", "Fall 2020", 80.0),
            record("MECE 1101", "Create", "Spring 2021", 65.0),
        ];
        let report = build_course_report(&analyze_course("MECE 1101", "SLO1", &records));
        assert!(report.contains("## Attainment by indicator and Bloom level"));
        // the Create row has no Fall 2020 observation
        assert!(report.contains("| PI-1 (Create) | - |"));
    }

    #[test]
    fn slo_report_lists_courses_best_first() {
        let records = vec![
            record("MECE 2302", "Analyze", "Fall 2020", 55.0),
            record("MECE 1101", "Apply", "Fall 2020", 85.0),
        ];
        let report = build_slo_report(&analyze_slo("SLO1", &records));
        let first = report.find("MECE 1101").unwrap();
        let second = report.find("MECE 2302").unwrap();
        assert!(first < second);
        assert!(report.contains("meets target"));
        assert!(report.contains("below target"));
    }

    #[test]
    fn empty_input_still_renders_a_report() {
        let report = build_slo_report(&analyze_slo("SLO9", &[]));
        assert!(report.contains("No usable rows."));
        assert!(report.contains("No intervention tags detected."));
    }
}
