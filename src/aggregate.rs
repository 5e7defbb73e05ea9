use std::collections::HashMap;

use log::debug;

use crate::models::{AssessmentRecord, GroupStat, PivotTable, BLOOM_ORDER};
use crate::semester::chronological_key;

/// How a pivot axis is ordered for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrder {
    Lexicographic,
    /// Semester short tags by chronological key; unmapped tags last.
    Chronological,
    /// Bloom taxonomy order; unrecognized levels after it.
    Bloom,
}

/// Normalize indicator text and drop rows that are unusable for analysis
/// (blank indicator after stripping). This is a silent drop; the caller's
/// analysis continues with whatever remains.
pub fn clean_records(records: &[AssessmentRecord]) -> Vec<AssessmentRecord> {
    let mut kept = Vec::with_capacity(records.len());
    let mut dropped = 0usize;
    for record in records {
        let indicator = record.indicator.trim();
        if indicator.is_empty() {
            dropped += 1;
            continue;
        }
        let mut record = record.clone();
        record.indicator = indicator.to_string();
        record.bloom_level = record.bloom_level.trim().to_string();
        kept.push(record);
    }
    if dropped > 0 {
        debug!("dropped {dropped} rows with blank indicator text");
    }
    kept
}

/// Group rows by an arbitrary key tuple and compute mean attainment,
/// count, and standard error per group. Groups come back sorted by key.
pub fn aggregate<F>(records: &[AssessmentRecord], key_fn: F) -> Vec<GroupStat>
where
    F: Fn(&AssessmentRecord) -> Vec<String>,
{
    let mut values: HashMap<Vec<String>, Vec<f64>> = HashMap::new();
    for record in records {
        values.entry(key_fn(record)).or_default().push(record.attain());
    }

    let mut stats: Vec<GroupStat> = values
        .into_iter()
        .map(|(key, attains)| {
            let (mean, std_error) = mean_and_se(&attains);
            GroupStat {
                key,
                mean,
                count: attains.len(),
                std_error,
            }
        })
        .collect();

    stats.sort_by(|a, b| a.key.cmp(&b.key));
    stats
}

/// Mean and standard error of a non-empty sample. The standard error is
/// sample standard deviation over sqrt(n), undefined (NaN) for n <= 1.
pub fn mean_and_se(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() <= 1 {
        return (mean, f64::NAN);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, (var / n).sqrt())
}

/// Pivot mean attainment over two label axes. Combinations with no
/// observations stay `None`; they are never filled with zero.
pub fn pivot<R, C>(
    records: &[AssessmentRecord],
    row_fn: R,
    row_order: AxisOrder,
    col_fn: C,
    col_order: AxisOrder,
) -> PivotTable
where
    R: Fn(&AssessmentRecord) -> String,
    C: Fn(&AssessmentRecord) -> String,
{
    let mut sums: HashMap<(String, String), (f64, usize)> = HashMap::new();
    let mut rows: Vec<String> = Vec::new();
    let mut cols: Vec<String> = Vec::new();

    for record in records {
        let row = row_fn(record);
        let col = col_fn(record);
        if !rows.contains(&row) {
            rows.push(row.clone());
        }
        if !cols.contains(&col) {
            cols.push(col.clone());
        }
        let entry = sums.entry((row, col)).or_insert((0.0, 0));
        entry.0 += record.attain();
        entry.1 += 1;
    }

    sort_axis(&mut rows, row_order);
    sort_axis(&mut cols, col_order);

    let cells = rows
        .iter()
        .map(|row| {
            cols.iter()
                .map(|col| {
                    sums.get(&(row.clone(), col.clone()))
                        .map(|(sum, count)| sum / *count as f64)
                })
                .collect()
        })
        .collect();

    PivotTable { rows, cols, cells }
}

fn sort_axis(labels: &mut [String], order: AxisOrder) {
    match order {
        AxisOrder::Lexicographic => labels.sort(),
        AxisOrder::Chronological => labels.sort_by(|a, b| {
            chronological_key(a)
                .cmp(&chronological_key(b))
                .then_with(|| a.cmp(b))
        }),
        AxisOrder::Bloom => labels.sort_by(|a, b| {
            bloom_rank(a).cmp(&bloom_rank(b)).then_with(|| a.cmp(b))
        }),
    }
}

/// Position on the ordered Bloom axis; unrecognized levels sort after it.
pub fn bloom_rank(level: &str) -> usize {
    BLOOM_ORDER
        .iter()
        .position(|l| *l == level)
        .unwrap_or(BLOOM_ORDER.len())
}
