use std::collections::BTreeSet;

use log::debug;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::models::{FitMethod, TrendFit, TrendPoint};
use crate::semester::chronological_key;

/// One row-level observation for trend fitting.
#[derive(Debug, Clone)]
pub struct TrendObs {
    pub semester_idx: usize,
    pub attain: f64,
    pub semester: String,
}

/// Fit attainment against the chronological semester index.
///
/// Primary model is a random-intercept-by-semester linear regression, fit
/// by profiling the REML criterion over the variance ratio sigma_u^2 /
/// sigma_e^2 with a deterministic bounded search. When that fit is
/// degenerate (singular normal equations, residual variance collapsing to
/// zero) the model falls back to ordinary least squares; with a single
/// distinct semester there is no time variation and the convention is
/// slope 0, p-value 1, fitted value = observed mean.
pub fn fit(points: &[TrendObs]) -> Option<TrendFit> {
    if points.is_empty() {
        return None;
    }
    let indices = distinct_indices(points);
    if indices.len() < 2 {
        return Some(degenerate_mean(points, indices[0]));
    }
    if let Some(fit) = fit_random_intercept(points, &indices) {
        return Some(fit);
    }
    debug!("mixed-effects fit degenerate; falling back to OLS");
    Some(fit_ols_at(points, &indices))
}

/// Fit ordinary least squares directly, skipping the mixed model. Used for
/// series that carry one value per semester (e.g. semester means), where a
/// per-semester random intercept has nothing to estimate.
pub fn fit_ols(points: &[TrendObs]) -> Option<TrendFit> {
    if points.is_empty() {
        return None;
    }
    let indices = distinct_indices(points);
    if indices.len() < 2 {
        return Some(degenerate_mean(points, indices[0]));
    }
    Some(fit_ols_at(points, &indices))
}

fn distinct_indices(points: &[TrendObs]) -> Vec<usize> {
    let set: BTreeSet<usize> = points.iter().map(|p| p.semester_idx).collect();
    set.into_iter().collect()
}

fn degenerate_mean(points: &[TrendObs], index: usize) -> TrendFit {
    let values: Vec<f64> = points.iter().map(|p| p.attain).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    let (low, high) = if values.len() > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let se = (var / n).sqrt();
        let crit = t_critical(n - 1.0);
        (mean - crit * se, mean + crit * se)
    } else {
        (mean, mean)
    };

    TrendFit {
        method: FitMethod::DegenerateMean,
        slope: 0.0,
        p_value: 1.0,
        points: vec![TrendPoint {
            semester_idx: index,
            fitted: mean,
            low,
            high,
        }],
        random_effects: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Random-intercept model, profiled REML
// ---------------------------------------------------------------------------

/// Per-semester-group sufficient statistics.
struct Group {
    tag: String,
    n: f64,
    sx: f64,
    sxx: f64,
    sy: f64,
    sxy: f64,
    syy: f64,
}

/// Profiled quantities at one value of the variance ratio lambda.
struct Profile {
    beta: [f64; 2],
    /// Unscaled normal-equation matrix X' W X (W = (I + lambda Z Z')^-1).
    a: [[f64; 2]; 2],
    det: f64,
    sigma2: f64,
    objective: f64,
}

fn fit_random_intercept(points: &[TrendObs], indices: &[usize]) -> Option<TrendFit> {
    let n = points.len() as f64;
    if n - 2.0 < 1.0 {
        return None;
    }
    let groups = collect_groups(points);

    // Coarse deterministic grid over ln(lambda), then golden-section
    // refinement around the best cell. lambda = 0 covers the boundary.
    let mut best: Option<(f64, f64)> = None; // (lambda, objective)
    let mut consider = |lambda: f64| {
        if let Some(profile) = profile_at(&groups, n, lambda) {
            if profile.objective.is_finite()
                && best.map_or(true, |(_, obj)| profile.objective < obj)
            {
                best = Some((lambda, profile.objective));
            }
        }
    };

    consider(0.0);
    let mut u: f64 = -12.0;
    while u <= 8.0 {
        consider(u.exp());
        u += 0.25;
    }
    let (mut lambda, _) = best?;
    if lambda > 0.0 {
        lambda = golden_refine(&groups, n, lambda);
    }

    let profile = profile_at(&groups, n, lambda)?;
    let [intercept, slope] = profile.beta;

    // Cov(beta) = sigma^2 * A^-1
    let var_intercept = profile.sigma2 * profile.a[1][1] / profile.det;
    let var_slope = profile.sigma2 * profile.a[0][0] / profile.det;
    let cov = -profile.sigma2 * profile.a[0][1] / profile.det;

    let z = slope / var_slope.sqrt();
    let p_value = normal_two_sided(z);
    let crit = t_critical(n - 2.0);

    let points_out = fitted_series(indices, intercept, slope, var_intercept, var_slope, cov, crit);

    // BLUP per group: u_j = c_j * (sum of fixed-effects residuals in j)
    let random_effects = groups
        .iter()
        .map(|g| {
            let c = lambda / (1.0 + g.n * lambda);
            let residual_sum = g.sy - intercept * g.n - slope * g.sx;
            (g.tag.clone(), c * residual_sum)
        })
        .collect();

    Some(TrendFit {
        method: FitMethod::RandomIntercept,
        slope,
        p_value,
        points: points_out,
        random_effects,
    })
}

fn collect_groups(points: &[TrendObs]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for p in points {
        let x = p.semester_idx as f64;
        let y = p.attain;
        match groups.iter_mut().find(|g| g.tag == p.semester) {
            Some(g) => {
                g.n += 1.0;
                g.sx += x;
                g.sxx += x * x;
                g.sy += y;
                g.sxy += x * y;
                g.syy += y * y;
            }
            None => groups.push(Group {
                tag: p.semester.clone(),
                n: 1.0,
                sx: x,
                sxx: x * x,
                sy: y,
                sxy: x * y,
                syy: y * y,
            }),
        }
    }
    groups.sort_by(|a, b| {
        chronological_key(&a.tag)
            .cmp(&chronological_key(&b.tag))
            .then_with(|| a.tag.cmp(&b.tag))
    });
    groups
}

/// Evaluate the profiled REML criterion at one lambda. Grouped Woodbury
/// identity: W is block diagonal with I - c_j 1 1' per group, where
/// c_j = lambda / (1 + n_j lambda). Returns None when the normal equations
/// are singular or the residual variance is not positive.
fn profile_at(groups: &[Group], n: f64, lambda: f64) -> Option<Profile> {
    let mut a = [[0.0f64; 2]; 2];
    let mut b = [0.0f64; 2];
    let mut ywy = 0.0f64;
    let mut log_det_v = 0.0f64;

    for g in groups {
        let c = lambda / (1.0 + g.n * lambda);
        a[0][0] += g.n - c * g.n * g.n;
        a[0][1] += g.sx - c * g.n * g.sx;
        a[1][1] += g.sxx - c * g.sx * g.sx;
        b[0] += g.sy - c * g.n * g.sy;
        b[1] += g.sxy - c * g.sx * g.sy;
        ywy += g.syy - c * g.sy * g.sy;
        log_det_v += (1.0 + g.n * lambda).ln();
    }
    a[1][0] = a[0][1];

    let det = a[0][0] * a[1][1] - a[0][1] * a[0][1];
    if !det.is_finite() || det <= 1e-10 {
        return None;
    }
    let beta = [
        (a[1][1] * b[0] - a[0][1] * b[1]) / det,
        (a[0][0] * b[1] - a[0][1] * b[0]) / det,
    ];
    let rss = ywy - beta[0] * b[0] - beta[1] * b[1];
    let sigma2 = rss / (n - 2.0);
    // Residual variance at rounding-noise level counts as collapsed, or the
    // profiled objective would chase an exact fit to -infinity.
    if !sigma2.is_finite() || sigma2 <= 1e-10 * ywy.abs().max(1.0) {
        return None;
    }

    let objective = (n - 2.0) * sigma2.ln() + log_det_v + det.ln();
    Some(Profile {
        beta,
        a,
        det,
        sigma2,
        objective,
    })
}

fn golden_refine(groups: &[Group], n: f64, center: f64) -> f64 {
    let ratio = 0.618_033_988_749_895_f64;
    let objective = |u: f64| -> f64 {
        profile_at(groups, n, u.exp())
            .map(|p| p.objective)
            .unwrap_or(f64::INFINITY)
    };

    let mut lo = center.ln() - 0.25;
    let mut hi = center.ln() + 0.25;
    let mut m1 = hi - ratio * (hi - lo);
    let mut m2 = lo + ratio * (hi - lo);
    let mut f1 = objective(m1);
    let mut f2 = objective(m2);
    for _ in 0..40 {
        if f1 <= f2 {
            hi = m2;
            m2 = m1;
            f2 = f1;
            m1 = hi - ratio * (hi - lo);
            f1 = objective(m1);
        } else {
            lo = m1;
            m1 = m2;
            f1 = f2;
            m2 = lo + ratio * (hi - lo);
            f2 = objective(m2);
        }
    }
    (0.5 * (lo + hi)).exp()
}

// ---------------------------------------------------------------------------
// Ordinary least squares
// ---------------------------------------------------------------------------

fn fit_ols_at(points: &[TrendObs], indices: &[usize]) -> TrendFit {
    let n = points.len() as f64;
    let (mut sx, mut sy, mut sxx, mut sxy) = (0.0, 0.0, 0.0, 0.0);
    for p in points {
        let x = p.semester_idx as f64;
        sx += x;
        sy += p.attain;
        sxx += x * x;
        sxy += x * p.attain;
    }
    let x_mean = sx / n;
    let y_mean = sy / n;
    let s_xx = sxx - n * x_mean * x_mean;
    let s_xy = sxy - n * x_mean * y_mean;

    let slope = s_xy / s_xx;
    let intercept = y_mean - slope * x_mean;

    let rss: f64 = points
        .iter()
        .map(|p| {
            let r = p.attain - intercept - slope * p.semester_idx as f64;
            r * r
        })
        .sum();
    let df = n - 2.0;
    let sigma2 = rss / df; // NaN/inf for df <= 0; propagated, never a panic
    let var_slope = sigma2 / s_xx;
    let var_intercept = sigma2 * (1.0 / n + x_mean * x_mean / s_xx);
    let cov = -sigma2 * x_mean / s_xx;

    let t = slope / var_slope.sqrt();
    let p_value = student_t_two_sided(t, df);
    let crit = t_critical(df);

    TrendFit {
        method: FitMethod::OlsFallback,
        slope,
        p_value,
        points: fitted_series(indices, intercept, slope, var_intercept, var_slope, cov, crit),
        random_effects: Vec::new(),
    }
}

/// Fitted mean and 95% band at each observed index: the fixed-effects
/// covariance propagated through the design vector [1, idx], scaled by the
/// Student-t critical value rather than a fixed 1.96.
fn fitted_series(
    indices: &[usize],
    intercept: f64,
    slope: f64,
    var_intercept: f64,
    var_slope: f64,
    cov: f64,
    crit: f64,
) -> Vec<TrendPoint> {
    indices
        .iter()
        .map(|&idx| {
            let x = idx as f64;
            let fitted = intercept + slope * x;
            let se = (var_intercept + 2.0 * x * cov + x * x * var_slope).sqrt();
            TrendPoint {
                semester_idx: idx,
                fitted,
                low: fitted - crit * se,
                high: fitted + crit * se,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reference distributions
// ---------------------------------------------------------------------------

fn t_critical(df: f64) -> f64 {
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => dist.inverse_cdf(0.975),
        Err(_) => f64::NAN,
    }
}

fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if t.is_nan() {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    }
}

fn normal_two_sided(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z.is_infinite() {
        return 0.0;
    }
    match Normal::new(0.0, 1.0) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(z.abs())),
        Err(_) => f64::NAN,
    }
}
