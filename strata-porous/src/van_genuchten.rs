//! The van Genuchten saturation, capillary-pressure and relative-permeability relations.
//!
//! The free functions implement the classic expressions in terms of the effective saturation
//! $S_{\mathrm{eff}}$ and the exponent $m = 1 - 1/n$:
//! $$
//! S_{\mathrm{eff}}(p) = \left(1 + (-\alpha p)^n\right)^{-m}, \qquad
//! P_c(S_{\mathrm{eff}}) = \frac{1}{\alpha} \left(S_{\mathrm{eff}}^{-1/m} - 1\right)^{1 - m}.
//! $$
//!
//! [`HysteresisCurve`] works with the liquid saturation $S_l$ instead and rescales it with a
//! minimum liquid saturation and a residual gas saturation. It optionally extends the curve below
//! a low saturation and above a high saturation, so that it stays finite and smooth where the
//! plain relation diverges or flattens out.
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use strata::Real;

/// The largest finite value of `T`, used as the default maximum capillary pressure.
pub fn max_value<T: Real>() -> T {
    T::from_f64(f64::MAX).expect("literal must fit in T")
}

/// Effective saturation as a function of the porepressure `p`.
///
/// The medium is fully saturated for non-negative porepressure.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn effective_saturation<T: Real>(p: T, alpha: T, m: T) -> T {
    if p >= 0.0 {
        return 1.0;
    }
    let n = 1.0 / (1.0 - m);
    let a = (-alpha * p).powf(n);
    (1.0 + a).powf(-m)
}

/// Derivative of [`effective_saturation`] with respect to the porepressure.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn deffective_saturation<T: Real>(p: T, alpha: T, m: T) -> T {
    if p >= 0.0 {
        return 0.0;
    }
    let n = 1.0 / (1.0 - m);
    let x = -alpha * p;
    let a = x.powf(n);
    let da = -n * alpha * x.powf(n - 1.0);
    -m * (1.0 + a).powf(-m - 1.0) * da
}

/// Second derivative of [`effective_saturation`] with respect to the porepressure.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn d2effective_saturation<T: Real>(p: T, alpha: T, m: T) -> T {
    if p >= 0.0 {
        return 0.0;
    }
    let n = 1.0 / (1.0 - m);
    let x = -alpha * p;
    let a = x.powf(n);
    let da = -n * alpha * x.powf(n - 1.0);
    let d2a = n * (n - 1.0) * alpha * alpha * x.powf(n - 2.0);
    -m * (-m - 1.0) * (1.0 + a).powf(-m - 2.0) * da * da - m * (1.0 + a).powf(-m - 1.0) * d2a
}

/// Capillary pressure as a function of the effective saturation, capped at `pc_max`.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn capillary_pressure<T: Real>(seff: T, alpha: T, m: T, pc_max: T) -> T {
    if seff >= 1.0 {
        0.0
    } else if seff <= 0.0 {
        pc_max
    } else {
        let a = seff.powf(-1.0 / m) - 1.0;
        (a.powf(1.0 - m) / alpha).min(pc_max)
    }
}

/// Derivative of [`capillary_pressure`] with respect to the effective saturation.
///
/// Zero wherever the capillary pressure is capped.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn dcapillary_pressure<T: Real>(seff: T, alpha: T, m: T, pc_max: T) -> T {
    if seff >= 1.0 || seff <= 0.0 || capillary_pressure(seff, alpha, m, pc_max) >= pc_max {
        return 0.0;
    }
    let a = seff.powf(-1.0 / m) - 1.0;
    let da = -1.0 / m * seff.powf(-1.0 / m - 1.0);
    (1.0 - m) * a.powf(-m) * da / alpha
}

/// Second derivative of [`capillary_pressure`] with respect to the effective saturation.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn d2capillary_pressure<T: Real>(seff: T, alpha: T, m: T, pc_max: T) -> T {
    if seff >= 1.0 || seff <= 0.0 || capillary_pressure(seff, alpha, m, pc_max) >= pc_max {
        return 0.0;
    }
    let a = seff.powf(-1.0 / m) - 1.0;
    let da = -1.0 / m * seff.powf(-1.0 / m - 1.0);
    let d2a = (-1.0 / m) * (-1.0 / m - 1.0) * seff.powf(-1.0 / m - 2.0);
    (1.0 - m) / alpha * (-m * a.powf(-m - 1.0) * da * da + a.powf(-m) * d2a)
}

/// Mualem relative permeability of the wetting phase,
/// $k_r = \sqrt{S} \left(1 - (1 - S^{1/m})^m\right)^2$.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn relative_permeability<T: Real>(seff: T, m: T) -> T {
    if seff <= 0.0 {
        return 0.0;
    }
    if seff >= 1.0 {
        return 1.0;
    }
    let a = 1.0 - seff.powf(1.0 / m);
    let b = 1.0 - a.powf(m);
    seff.sqrt() * b * b
}

#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn drelative_permeability<T: Real>(seff: T, m: T) -> T {
    if seff <= 0.0 || seff >= 1.0 {
        return 0.0;
    }
    let c = seff.powf(1.0 / m);
    let dc = c / (m * seff);
    let a = 1.0 - c;
    let b = 1.0 - a.powf(m);
    let db = m * a.powf(m - 1.0) * dc;
    0.5 / seff.sqrt() * b * b + 2.0 * seff.sqrt() * b * db
}

#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn d2relative_permeability<T: Real>(seff: T, m: T) -> T {
    if seff <= 0.0 || seff >= 1.0 {
        return 0.0;
    }
    let c = seff.powf(1.0 / m);
    let dc = c / (m * seff);
    let d2c = c / m * (1.0 / m - 1.0) / (seff * seff);
    let a = 1.0 - c;
    let b = 1.0 - a.powf(m);
    let db = m * a.powf(m - 1.0) * dc;
    let d2b = -m * (m - 1.0) * a.powf(m - 2.0) * dc * dc + m * a.powf(m - 1.0) * d2c;
    let sqrt = seff.sqrt();
    -0.25 * seff.powf(-1.5) * b * b + 2.0 / sqrt * b * db + 2.0 * sqrt * (db * db + b * d2b)
}

/// Relative permeability of the non-wetting phase,
/// $k_r = \sqrt{S} \left(1 - (1 - S)^{1/m}\right)^{2m}$.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn relative_permeability_nw<T: Real>(seff: T, m: T) -> T {
    if seff <= 0.0 {
        return 0.0;
    }
    if seff >= 1.0 {
        return 1.0;
    }
    let c = (1.0 - seff).powf(1.0 / m);
    seff.sqrt() * (1.0 - c).powf(2.0 * m)
}

#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn drelative_permeability_nw<T: Real>(seff: T, m: T) -> T {
    if seff <= 0.0 || seff >= 1.0 {
        return 0.0;
    }
    let c = (1.0 - seff).powf(1.0 / m);
    let dc = -c / m / (1.0 - seff);
    let b = (1.0 - c).powf(2.0 * m);
    let db = -2.0 * m * (1.0 - c).powf(2.0 * m - 1.0) * dc;
    0.5 / seff.sqrt() * b + seff.sqrt() * db
}

#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn d2relative_permeability_nw<T: Real>(seff: T, m: T) -> T {
    if seff <= 0.0 || seff >= 1.0 {
        return 0.0;
    }
    let c = (1.0 - seff).powf(1.0 / m);
    let dc = -c / m / (1.0 - seff);
    let d2c = c / m * (1.0 / m - 1.0) / ((1.0 - seff) * (1.0 - seff));
    let b = (1.0 - c).powf(2.0 * m);
    let db = -2.0 * m * (1.0 - c).powf(2.0 * m - 1.0) * dc;
    let d2b = 2.0 * m * (2.0 * m - 1.0) * (1.0 - c).powf(2.0 * m - 2.0) * dc * dc
        - 2.0 * m * (1.0 - c).powf(2.0 * m - 1.0) * d2c;
    let sqrt = seff.sqrt();
    -0.25 * seff.powf(-1.5) * b + db / sqrt + sqrt * d2b
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VanGenuchtenParameters<T> {
    pub alpha: T,
    pub n: T,
}

impl<T: Real> VanGenuchtenParameters<T> {
    pub fn new(alpha: T, n: T) -> Self {
        Self { alpha, n }
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn m(&self) -> T {
        1.0 - 1.0 / self.n
    }
}

/// How a [`HysteresisCurve`] continues below its low saturation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LowExtensionStrategy {
    /// The capillary pressure stays at its value at the low saturation.
    None,
    /// A parabola with zero slope at zero saturation.
    Quadratic,
    /// An exponential matching the value and slope at the low saturation.
    #[default]
    Exponential,
}

/// How a [`HysteresisCurve`] continues above its high saturation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighExtensionStrategy {
    /// The capillary pressure is zero above the high saturation.
    None,
    /// A power law in $1 - S_l$ matching the value and slope at the high saturation and
    /// vanishing at full saturation.
    #[default]
    Power,
}

/// The point where a curve switches to its low extension, with the value and slope there.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LowExtension<T> {
    pub strategy: LowExtensionStrategy,
    pub saturation: T,
    pub capillary_pressure: T,
    pub slope: T,
}

impl<T: Real> Default for LowExtension<T> {
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn default() -> Self {
        Self {
            strategy: LowExtensionStrategy::None,
            saturation: 0.0,
            capillary_pressure: max_value(),
            slope: 0.0,
        }
    }
}

/// The point where a curve switches to its high extension, with the value and slope there.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighExtension<T> {
    pub strategy: HighExtensionStrategy,
    pub saturation: T,
    pub capillary_pressure: T,
    pub slope: T,
}

impl<T: Real> Default for HighExtension<T> {
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn default() -> Self {
        Self {
            strategy: HighExtensionStrategy::None,
            saturation: 1.0,
            capillary_pressure: 0.0,
            slope: 0.0,
        }
    }
}

impl<T: Real> HighExtension<T> {
    /// Exponent of the power-law extension.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn exponent(&self) -> T {
        -self.slope / self.capillary_pressure * (1.0 - self.saturation)
    }
}

/// Which derivative of a curve to evaluate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Derivative {
    Value,
    First,
    Second,
}

impl Derivative {
    pub(crate) fn order(&self) -> i32 {
        match self {
            Derivative::Value => 0,
            Derivative::First => 1,
            Derivative::Second => 2,
        }
    }
}

/// A van Genuchten capillary-pressure curve in terms of liquid saturation.
///
/// The effective saturation is
/// $$
/// S_{\mathrm{eff}} = \frac{S_l - S_{l,\min}}{1 - S_{gr}^\Delta - S_{l,\min}},
/// $$
/// where $S_{gr}^\Delta$ is the residual gas saturation of the curve (zero for primary drying).
/// Below the low saturation and above the high saturation the curve follows its extensions.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HysteresisCurve<T> {
    pub s_l_min: T,
    pub s_gr_del: T,
    pub params: VanGenuchtenParameters<T>,
    pub low: LowExtension<T>,
    pub high: HighExtension<T>,
}

impl<T: Real> HysteresisCurve<T> {
    /// A curve without extensions.
    pub fn new(s_l_min: T, s_gr_del: T, params: VanGenuchtenParameters<T>) -> Self {
        Self {
            s_l_min,
            s_gr_del,
            params,
            low: LowExtension::default(),
            high: HighExtension::default(),
        }
    }

    pub fn with_low_extension(self, low: LowExtension<T>) -> Self {
        Self { low, ..self }
    }

    pub fn with_high_extension(self, high: HighExtension<T>) -> Self {
        Self { high, ..self }
    }

    /// The low extension of this curve, starting where it reaches `pc_max`.
    pub fn low_extension(&self, strategy: LowExtensionStrategy, pc_max: T) -> LowExtension<T> {
        let saturation = self.saturation(pc_max);
        LowExtension {
            strategy,
            saturation,
            capillary_pressure: pc_max,
            slope: self.dcapillary_pressure(saturation),
        }
    }

    /// The high extension of this curve, starting at `saturation`.
    pub fn high_extension(&self, strategy: HighExtensionStrategy, saturation: T) -> HighExtension<T> {
        HighExtension {
            strategy,
            saturation,
            capillary_pressure: self.capillary_pressure(saturation),
            slope: self.dcapillary_pressure(saturation),
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn span(&self) -> T {
        1.0 - self.s_gr_del - self.s_l_min
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn capillary_pressure(&self, sl: T) -> T {
        let low = &self.low;
        let high = &self.high;
        if sl < low.saturation {
            return match low.strategy {
                LowExtensionStrategy::None => low.capillary_pressure,
                LowExtensionStrategy::Quadratic => {
                    let x = sl.max(0.0);
                    low.capillary_pressure
                        + low.slope * 0.5 * (x * x - low.saturation * low.saturation) / low.saturation
                }
                LowExtensionStrategy::Exponential => {
                    low.capillary_pressure * (low.slope * (sl - low.saturation) / low.capillary_pressure).exp()
                }
            };
        }
        if sl > high.saturation {
            return match high.strategy {
                HighExtensionStrategy::None => 0.0,
                HighExtensionStrategy::Power if sl >= 1.0 => 0.0,
                HighExtensionStrategy::Power => {
                    high.capillary_pressure * ((1.0 - sl) / (1.0 - high.saturation)).powf(high.exponent())
                }
            };
        }
        let seff = (sl - self.s_l_min) / self.span();
        if seff >= 1.0 {
            0.0
        } else if seff <= 0.0 {
            low.capillary_pressure
        } else {
            let m = self.params.m();
            let a = seff.powf(-1.0 / m) - 1.0;
            a.powf(1.0 / self.params.n) / self.params.alpha
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn dcapillary_pressure(&self, sl: T) -> T {
        let low = &self.low;
        let high = &self.high;
        if sl < low.saturation {
            return match low.strategy {
                LowExtensionStrategy::None => 0.0,
                LowExtensionStrategy::Quadratic => low.slope * sl.max(0.0) / low.saturation,
                LowExtensionStrategy::Exponential => {
                    low.slope * (low.slope * (sl - low.saturation) / low.capillary_pressure).exp()
                }
            };
        }
        if sl > high.saturation {
            return match high.strategy {
                HighExtensionStrategy::None => 0.0,
                HighExtensionStrategy::Power if sl >= 1.0 => 0.0,
                HighExtensionStrategy::Power => {
                    let ratio = (1.0 - sl) / (1.0 - high.saturation);
                    high.slope * ratio.powf(high.exponent() - 1.0)
                }
            };
        }
        let seff = (sl - self.s_l_min) / self.span();
        if seff >= 1.0 || seff <= 0.0 {
            return 0.0;
        }
        let (n, m, alpha) = (self.params.n, self.params.m(), self.params.alpha);
        let a = seff.powf(-1.0 / m) - 1.0;
        let da = -1.0 / m * seff.powf(-1.0 / m - 1.0);
        a.powf(1.0 / n - 1.0) * da / (n * alpha) / self.span()
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn d2capillary_pressure(&self, sl: T) -> T {
        let low = &self.low;
        let high = &self.high;
        if sl < low.saturation {
            return match low.strategy {
                LowExtensionStrategy::None => 0.0,
                LowExtensionStrategy::Quadratic if sl <= 0.0 => 0.0,
                LowExtensionStrategy::Quadratic => low.slope / low.saturation,
                LowExtensionStrategy::Exponential => {
                    low.slope * low.slope / low.capillary_pressure
                        * (low.slope * (sl - low.saturation) / low.capillary_pressure).exp()
                }
            };
        }
        if sl > high.saturation {
            return match high.strategy {
                HighExtensionStrategy::None => 0.0,
                HighExtensionStrategy::Power if sl >= 1.0 => 0.0,
                HighExtensionStrategy::Power => {
                    let e = high.exponent();
                    let ratio = (1.0 - sl) / (1.0 - high.saturation);
                    -high.slope * (e - 1.0) / (1.0 - high.saturation) * ratio.powf(e - 2.0)
                }
            };
        }
        let seff = (sl - self.s_l_min) / self.span();
        if seff >= 1.0 || seff <= 0.0 {
            return 0.0;
        }
        let (n, m, alpha) = (self.params.n, self.params.m(), self.params.alpha);
        let a = seff.powf(-1.0 / m) - 1.0;
        let da = -1.0 / m * seff.powf(-1.0 / m - 1.0);
        let d2a = (-1.0 / m) * (-1.0 / m - 1.0) * seff.powf(-1.0 / m - 2.0);
        let ds = 1.0 / self.span();
        ((1.0 / n - 1.0) * a.powf(1.0 / n - 2.0) * da * da + a.powf(1.0 / n - 1.0) * d2a) / (n * alpha) * ds * ds
    }

    /// The liquid saturation at capillary pressure `pc`, the inverse of
    /// [`capillary_pressure`](Self::capillary_pressure).
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn saturation(&self, pc: T) -> T {
        let low = &self.low;
        let high = &self.high;
        if pc <= 0.0 {
            return 1.0;
        }
        if pc >= low.capillary_pressure {
            return match low.strategy {
                LowExtensionStrategy::None => low.saturation,
                LowExtensionStrategy::Quadratic => {
                    let s2 = low.saturation * low.saturation
                        + 2.0 * low.saturation * (pc - low.capillary_pressure) / low.slope;
                    if s2 <= 0.0 {
                        0.0
                    } else {
                        s2.sqrt()
                    }
                }
                LowExtensionStrategy::Exponential => {
                    let s = low.saturation + low.capillary_pressure / low.slope * (pc / low.capillary_pressure).ln();
                    s.max(0.0)
                }
            };
        }
        if pc < high.capillary_pressure {
            return match high.strategy {
                HighExtensionStrategy::None => high.saturation,
                HighExtensionStrategy::Power => {
                    1.0 - (1.0 - high.saturation) * (pc / high.capillary_pressure).powf(1.0 / high.exponent())
                }
            };
        }
        let (n, m, alpha) = (self.params.n, self.params.m(), self.params.alpha);
        self.s_l_min + self.span() * (1.0 + (alpha * pc).powf(n)).powf(-m)
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn dsaturation(&self, pc: T) -> T {
        let low = &self.low;
        let high = &self.high;
        if pc <= 0.0 {
            return 0.0;
        }
        if pc >= low.capillary_pressure {
            return match low.strategy {
                LowExtensionStrategy::None => 0.0,
                LowExtensionStrategy::Quadratic => {
                    let s2 = low.saturation * low.saturation
                        + 2.0 * low.saturation * (pc - low.capillary_pressure) / low.slope;
                    if s2 <= 0.0 {
                        0.0
                    } else {
                        low.saturation / (low.slope * s2.sqrt())
                    }
                }
                LowExtensionStrategy::Exponential => {
                    if self.saturation(pc) <= 0.0 {
                        0.0
                    } else {
                        low.capillary_pressure / (low.slope * pc)
                    }
                }
            };
        }
        if pc < high.capillary_pressure {
            return match high.strategy {
                HighExtensionStrategy::None => 0.0,
                HighExtensionStrategy::Power => {
                    let e = high.exponent();
                    -(1.0 - high.saturation) / (e * high.capillary_pressure)
                        * (pc / high.capillary_pressure).powf(1.0 / e - 1.0)
                }
            };
        }
        let (n, m, alpha) = (self.params.n, self.params.m(), self.params.alpha);
        let x = alpha * pc;
        self.span() * (-m * n * alpha * x.powf(n - 1.0) * (1.0 + x.powf(n)).powf(-m - 1.0))
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn d2saturation(&self, pc: T) -> T {
        let low = &self.low;
        let high = &self.high;
        if pc <= 0.0 {
            return 0.0;
        }
        if pc >= low.capillary_pressure {
            return match low.strategy {
                LowExtensionStrategy::None => 0.0,
                LowExtensionStrategy::Quadratic => {
                    let s2 = low.saturation * low.saturation
                        + 2.0 * low.saturation * (pc - low.capillary_pressure) / low.slope;
                    if s2 <= 0.0 {
                        0.0
                    } else {
                        -low.saturation * low.saturation / (low.slope * low.slope * s2.powf(1.5))
                    }
                }
                LowExtensionStrategy::Exponential => {
                    if self.saturation(pc) <= 0.0 {
                        0.0
                    } else {
                        -low.capillary_pressure / (low.slope * pc * pc)
                    }
                }
            };
        }
        if pc < high.capillary_pressure {
            return match high.strategy {
                HighExtensionStrategy::None => 0.0,
                HighExtensionStrategy::Power => {
                    let e = high.exponent();
                    -(1.0 - high.saturation) / (e * high.capillary_pressure * high.capillary_pressure)
                        * (1.0 / e - 1.0)
                        * (pc / high.capillary_pressure).powf(1.0 / e - 2.0)
                }
            };
        }
        let (n, m, alpha) = (self.params.n, self.params.m(), self.params.alpha);
        let x = alpha * pc;
        let y = 1.0 + x.powf(n);
        let d2 = (n - 1.0) * x.powf(n - 2.0) * y.powf(-m - 1.0)
            + x.powf(n - 1.0) * (-m - 1.0) * y.powf(-m - 2.0) * n * x.powf(n - 1.0);
        self.span() * (-m * n * alpha * alpha * d2)
    }

    pub(crate) fn capillary_pressure_derivative(&self, sl: T, derivative: Derivative) -> T {
        match derivative {
            Derivative::Value => self.capillary_pressure(sl),
            Derivative::First => self.dcapillary_pressure(sl),
            Derivative::Second => self.d2capillary_pressure(sl),
        }
    }

    pub(crate) fn saturation_derivative(&self, pc: T, derivative: Derivative) -> T {
        match derivative {
            Derivative::Value => self.saturation(pc),
            Derivative::First => self.dsaturation(pc),
            Derivative::Second => self.d2saturation(pc),
        }
    }
}
