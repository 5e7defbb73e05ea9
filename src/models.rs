use serde::{Deserialize, Serialize};

/// Institutional attainment target (% expert + practitioner).
pub const ATTAINMENT_TARGET: f64 = 70.0;

/// Bloom's taxonomy in its fixed pedagogical order. Levels outside this
/// list still group for display but stay off the ordered axis.
pub const BLOOM_ORDER: [&str; 6] = [
    "Remember",
    "Understand",
    "Apply",
    "Analyze",
    "Evaluate",
    "Create",
];

/// One submitted rubric row. The four band percentages are constrained to
/// sum to 100 at entry time; that invariant is enforced upstream and is
/// neither re-checked nor clamped here.
#[derive(Debug, Clone, Deserialize)]
pub struct AssessmentRecord {
    pub course: String,
    pub slo: String,
    pub indicator: String,
    pub bloom_level: String,
    pub semester: String,
    pub expert: f64,
    pub practitioner: f64,
    pub apprentice: f64,
    pub novice: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub observations: String,
}

impl AssessmentRecord {
    /// Attainment metric: expert + practitioner, exact, no rounding.
    pub fn attain(&self) -> f64 {
        self.expert + self.practitioner
    }
}

/// Aggregate over one group key tuple.
#[derive(Debug, Clone, Serialize)]
pub struct GroupStat {
    pub key: Vec<String>,
    pub mean: f64,
    pub count: usize,
    /// Sample standard deviation / sqrt(n); NaN for n <= 1.
    pub std_error: f64,
}

/// Two-axis pivot of mean attainment. A `None` cell means that
/// row/column combination has no observations; it is never zero and
/// downstream consumers skip it.
#[derive(Debug, Clone, Serialize)]
pub struct PivotTable {
    pub rows: Vec<String>,
    pub cols: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

impl PivotTable {
    pub fn cell(&self, row: &str, col: &str) -> Option<f64> {
        let r = self.rows.iter().position(|v| v == row)?;
        let c = self.cols.iter().position(|v| v == col)?;
        self.cells[r][c]
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }
}

/// Which path produced a [`TrendFit`]. Callers distinguish a full mixed
/// model from its fallbacks by this tag, not by sniffing field presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FitMethod {
    /// Random-intercept-by-semester model fit by profiled REML.
    RandomIntercept,
    /// Ordinary least squares, used when the mixed fit is degenerate.
    OlsFallback,
    /// Single distinct semester: no time variation to model.
    DegenerateMean,
}

/// Fitted value and two-sided 95% confidence interval at one semester index.
#[derive(Debug, Clone, Serialize)]
pub struct TrendPoint {
    pub semester_idx: usize,
    pub fitted: f64,
    pub low: f64,
    pub high: f64,
}

/// One trend model per analysis call: fitted series plus the slope of the
/// semester-index term and its two-sided p-value.
#[derive(Debug, Clone, Serialize)]
pub struct TrendFit {
    pub method: FitMethod,
    pub slope: f64,
    pub p_value: f64,
    pub points: Vec<TrendPoint>,
    /// Estimated random intercept per semester tag. Empty (not zero) on
    /// the fallback paths so "no meaningful groups" stays distinguishable
    /// from "group effect is exactly zero".
    pub random_effects: Vec<(String, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(expert: f64, practitioner: f64) -> AssessmentRecord {
        AssessmentRecord {
            course: "MECE 1101".to_string(),
            slo: "SLO1".to_string(),
            indicator: "PI-1: Able to identify engineering problem".to_string(),
            bloom_level: "Apply".to_string(),
            semester: "Fall 2021".to_string(),
            expert,
            practitioner,
            apprentice: 0.0,
            novice: 0.0,
            explanation: String::new(),
            observations: String::new(),
        }
    }

    #[test]
    fn attain_is_exact_band_sum() {
        let record = sample_record(42.5, 31.25);
        assert_eq!(record.attain(), 73.75);
    }

    #[test]
    fn attain_tolerates_out_of_range_bands() {
        // Upstream validates the 100% invariant; the core never clamps.
        let record = sample_record(90.0, 60.0);
        assert_eq!(record.attain(), 150.0);
    }

    #[test]
    fn pivot_lookup_misses_are_none() {
        let pivot = PivotTable {
            rows: vec!["F21".to_string()],
            cols: vec!["PI-1".to_string()],
            cells: vec![vec![Some(80.0)]],
        };
        assert_eq!(pivot.cell("F21", "PI-1"), Some(80.0));
        assert_eq!(pivot.cell("Sp22", "PI-1"), None);
    }
}
