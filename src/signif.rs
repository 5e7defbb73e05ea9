use statrs::distribution::{ChiSquared, ContinuousCDF};

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

fn all_equal(values: &[f64]) -> bool {
    values
        .first()
        .map_or(true, |first| values.iter().all(|v| approx_eq(*v, *first)))
}

/// Midranks of `values` (1-based, ties get the average rank).
fn midranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + 1 + j + 1) as f64 / 2.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Kruskal-Wallis omnibus p-value across categorical groups, with tie
/// correction, against a chi-squared reference with k - 1 degrees of
/// freedom. `None` (unavailable, not a fabricated value) when fewer than
/// two groups are non-empty or the pooled values have no variation.
pub fn kruskal_wallis(groups: &[Vec<f64>]) -> Option<f64> {
    let groups: Vec<&Vec<f64>> = groups.iter().filter(|g| !g.is_empty()).collect();
    if groups.len() < 2 {
        return None;
    }
    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    if all_equal(&pooled) {
        return None;
    }

    let n = pooled.len() as f64;
    let ranks = midranks(&pooled);

    let mut h = 0.0;
    let mut offset = 0;
    for group in &groups {
        let rank_sum: f64 = ranks[offset..offset + group.len()].iter().sum();
        h += rank_sum * rank_sum / group.len() as f64;
        offset += group.len();
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    // Tie correction: 1 - sum(t^3 - t) / (N^3 - N)
    let mut sorted = pooled.clone();
    sorted.sort_by(f64::total_cmp);
    let mut tie_sum = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1] == sorted[i] {
            j += 1;
        }
        let t = (j - i + 1) as f64;
        tie_sum += t * t * t - t;
        i = j + 1;
    }
    let correction = 1.0 - tie_sum / (n * n * n - n);
    if correction <= 0.0 {
        return None;
    }
    h /= correction;

    let df = (groups.len() - 1) as f64;
    let dist = ChiSquared::new(df).ok()?;
    Some(1.0 - dist.cdf(h))
}

/// Rank-biserial effect size (Cliff's delta via the Mann-Whitney U of `a`):
/// `2U / (|a| * |b|) - 1`, in [-1, 1]. `None` when either sample is empty.
/// When both samples are internally constant at the same value, the delta
/// is exactly 0: no directional dominance, not a degenerate rank failure.
pub fn rank_biserial(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if all_equal(a) && all_equal(b) && approx_eq(a[0], b[0]) {
        return Some(0.0);
    }

    let pooled: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    let ranks = midranks(&pooled);
    let rank_sum_a: f64 = ranks[..a.len()].iter().sum();

    let n_a = a.len() as f64;
    let n_b = b.len() as f64;
    let u = rank_sum_a - n_a * (n_a + 1.0) / 2.0;
    Some(2.0 * u / (n_a * n_b) - 1.0)
}
