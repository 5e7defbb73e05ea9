use serde::Serialize;

/// Three-way visual classification used by the external rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Attainment {
    MeetsTarget,
    BelowTarget,
    /// No signal (NaN input); rendered without a verdict color.
    Neutral,
}

/// Classify a scalar against the attainment target. Total and
/// deterministic: every real input including NaN gets a category.
pub fn classify(value: f64, threshold: f64) -> Attainment {
    if value.is_nan() {
        Attainment::Neutral
    } else if value >= threshold {
        Attainment::MeetsTarget
    } else {
        Attainment::BelowTarget
    }
}

/// Continuous diverging classification for per-group effects (random
/// intercepts): a two-slope normalization mapping [vmin, vcenter, vmax]
/// onto [0, 0.5, 1]. Centered at zero when the effects straddle it,
/// otherwise at their midpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DivergingScale {
    pub vmin: f64,
    pub vcenter: f64,
    pub vmax: f64,
}

impl DivergingScale {
    /// Build a scale over a set of effects. Returns `None` when there is
    /// no usable spread (empty input, effectively identical effects, or a
    /// collapsed ordering) so callers render those groups as neutral.
    pub fn from_effects(effects: &[f64]) -> Option<Self> {
        let finite: Vec<f64> = effects.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if (hi - lo).abs() <= 1e-9 + 1e-6 * hi.abs() {
            return None;
        }
        let center = if lo < 0.0 && 0.0 < hi {
            0.0
        } else {
            0.5 * (lo + hi)
        };
        if !(lo < center && center < hi) {
            return None;
        }
        Some(DivergingScale {
            vmin: lo,
            vcenter: center,
            vmax: hi,
        })
    }

    /// Map an effect to an intensity in [0, 1]; 0.5 is the neutral center,
    /// which NaN also maps to.
    pub fn intensity(&self, value: f64) -> f64 {
        if value.is_nan() {
            return 0.5;
        }
        if value <= self.vcenter {
            let t = (value - self.vmin) / (self.vcenter - self.vmin);
            0.5 * t.clamp(0.0, 1.0)
        } else {
            let t = (value - self.vcenter) / (self.vmax - self.vcenter);
            0.5 + 0.5 * t.clamp(0.0, 1.0)
        }
    }
}
