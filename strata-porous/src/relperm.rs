//! Hysteretic relative permeabilities of the liquid and gas phases.
//!
//! On the primary drying curve (hysteresis order zero) both phases follow van Genuchten-Mualem
//! relations of the scaled saturation $\bar S = (S_l - S_{lr}) / (1 - S_{lr})$. After a reversal
//! to wetting at the turning point $S_l^\Delta$, part of the gas is trapped: Land's relation
//! gives the residual gas saturation $S_{gr}^\Delta$ and the trapped gas saturation grows
//! linearly from zero at $S_l^\Delta$ to $S_{gr}^\Delta$ at $1 - S_{gr}^\Delta$.
use crate::hysteresis::{land_residual_gas_saturation, HysteresisState};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use strata::error::ConfigurationError;
use strata::Real;

/// How the gas relative permeability continues below the residual liquid saturation, where it
/// rises from `k_rg_max` to one at zero liquid saturation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasLowExtension {
    /// A cubic whose slope at the residual saturation matches the drying curve.
    Cubic,
    /// A cubic whose slope at the residual saturation is that of the straight line to one.
    #[default]
    LinearLike,
}

fn default_gamma<T: Real>() -> T {
    T::from_f64(1.0 / 3.0).expect("literal must fit in T")
}

fn default_k_rg_max<T: Real>() -> T {
    T::one()
}

fn default_upper_liquid_param<T: Real>() -> T {
    T::from_f64(0.9).expect("literal must fit in T")
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Real"))]
pub struct HystereticRelativePermeabilityParameters<T> {
    /// Residual liquid saturation.
    pub s_lr: T,
    /// Residual gas saturation after wetting from the residual liquid saturation.
    pub s_gr_max: T,
    /// The van Genuchten exponent.
    pub m: T,
    /// Exponent of the gas relative permeability.
    #[serde(default = "default_gamma")]
    pub gamma: T,
    /// Gas relative permeability at the residual liquid saturation.
    #[serde(default = "default_k_rg_max")]
    pub k_rg_max: T,
    /// Wetting liquid curves blend into the drying curve above
    /// `upper_liquid_param * (1 - S_gr)`.
    #[serde(default = "default_upper_liquid_param")]
    pub upper_liquid_param: T,
    #[serde(default)]
    pub gas_low_extension: GasLowExtension,
}

impl<T: Real> HystereticRelativePermeabilityParameters<T> {
    pub fn new(s_lr: T, s_gr_max: T, m: T) -> Self {
        Self {
            s_lr,
            s_gr_max,
            m,
            gamma: default_gamma(),
            k_rg_max: default_k_rg_max(),
            upper_liquid_param: default_upper_liquid_param(),
            gas_low_extension: GasLowExtension::default(),
        }
    }
}

/// The cubic Hermite interpolant through `(x0, y0)` and `(x1, y1)` with slopes `y0p` and `y1p`,
/// evaluated at `x`. Returns the value and the derivative.
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn cubic_hermite<T: Real>(x: T, x0: T, y0: T, y0p: T, x1: T, y1: T, y1p: T) -> (T, T) {
    let d = x1 - x0;
    let t = (x - x0) / d;
    let (t2, t3) = (t * t, t * t * t);
    let value = (2.0 * t3 - 3.0 * t2 + 1.0) * y0
        + (t3 - 2.0 * t2 + t) * d * y0p
        + (-2.0 * t3 + 3.0 * t2) * y1
        + (t3 - t2) * d * y1p;
    let derivative = (6.0 * t2 - 6.0 * t) / d * y0
        + (3.0 * t2 - 4.0 * t + 1.0) * y0p
        + (-6.0 * t2 + 6.0 * t) / d * y1
        + (3.0 * t2 - 2.0 * t) * y1p;
    (value, derivative)
}

/// The liquid saturation a wetting curve started from, and its residual gas saturation.
#[derive(Copy, Clone, Debug, PartialEq)]
struct WettingBranch<T> {
    s_l_del: T,
    s_gr_del: T,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HystereticRelativePermeability<T> {
    params: HystereticRelativePermeabilityParameters<T>,
}

impl<T: Real> HystereticRelativePermeability<T> {
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn new(object: &str, params: HystereticRelativePermeabilityParameters<T>) -> eyre::Result<Self> {
        let invalid = |parameter: &str, reason: &str| -> eyre::Report {
            ConfigurationError::InvalidParameter {
                object: object.to_string(),
                parameter: parameter.to_string(),
                reason: reason.to_string(),
            }
            .into()
        };
        if params.s_lr < 0.0 || params.s_lr >= 1.0 {
            return Err(invalid("s_lr", "must lie in [0, 1)"));
        }
        if params.s_gr_max < 0.0 || params.s_gr_max >= 1.0 - params.s_lr {
            return Err(invalid("s_gr_max", "must lie in [0, 1 - s_lr)"));
        }
        if params.m <= 0.0 || params.m > 1.0 {
            return Err(invalid("m", "must lie in (0, 1]"));
        }
        if params.gamma <= 0.0 {
            return Err(invalid("gamma", "must be positive"));
        }
        if params.k_rg_max <= 0.0 || params.k_rg_max > 1.0 {
            return Err(invalid("k_rg_max", "must lie in (0, 1]"));
        }
        if params.upper_liquid_param <= 0.0 || params.upper_liquid_param > 1.0 {
            return Err(invalid("upper_liquid_param", "must lie in (0, 1]"));
        }
        Ok(Self { params })
    }

    pub fn parameters(&self) -> &HystereticRelativePermeabilityParameters<T> {
        &self.params
    }

    /// The wetting curve selected by `state`, or `None` on the primary drying curve.
    ///
    /// Turning points below the residual liquid saturation behave as if they were at the residual
    /// saturation.
    fn wetting_branch(&self, state: &HysteresisState<T>) -> Option<WettingBranch<T>> {
        let s_l_del = state.turning_point(0)?;
        let p = &self.params;
        Some(if s_l_del < p.s_lr {
            WettingBranch {
                s_l_del: p.s_lr,
                s_gr_del: p.s_gr_max,
            }
        } else {
            WettingBranch {
                s_l_del,
                s_gr_del: land_residual_gas_saturation(s_l_del, p.s_lr, p.s_gr_max),
            }
        })
    }

    pub fn liquid(&self, sl: T, state: &HysteresisState<T>) -> T {
        self.liquid_with_derivative(sl, state).0
    }

    /// Derivative of the liquid relative permeability with respect to the liquid saturation.
    pub fn dliquid(&self, sl: T, state: &HysteresisState<T>) -> T {
        self.liquid_with_derivative(sl, state).1
    }

    pub fn gas(&self, sl: T, state: &HysteresisState<T>) -> T {
        self.gas_with_derivative(sl, state).0
    }

    /// Derivative of the gas relative permeability with respect to the liquid saturation.
    pub fn dgas(&self, sl: T, state: &HysteresisState<T>) -> T {
        self.gas_with_derivative(sl, state).1
    }

    /// The liquid relative permeability and its derivative.
    ///
    /// Close to full saturation, wetting curves are joined to the drying curve with a cubic that
    /// matches value and slope at both ends.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn liquid_with_derivative(&self, sl: T, state: &HysteresisState<T>) -> (T, T) {
        if sl < self.params.s_lr {
            return (0.0, 0.0);
        }
        if sl >= 1.0 {
            return (1.0, 0.0);
        }
        let branch = match self.wetting_branch(state) {
            Some(branch) if branch.s_gr_del > 0.0 => branch,
            _ => return self.drying_liquid(sl),
        };
        let x0 = self.params.upper_liquid_param * (1.0 - branch.s_gr_del);
        let x1 = 1.0 - 0.5 * branch.s_gr_del;
        if sl <= branch.s_l_del || sl >= x1 {
            return self.drying_liquid(sl);
        }
        if sl > x0 {
            let (y0, y0p) = if x0 <= branch.s_l_del || x0 >= x1 {
                self.drying_liquid(x0)
            } else {
                self.wetting_liquid(x0, &branch)
            };
            let (y1, y1p) = self.drying_liquid(x1);
            return cubic_hermite(sl, x0, y0, y0p, x1, y1, y1p);
        }
        self.wetting_liquid(sl, &branch)
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn drying_liquid(&self, sl: T) -> (T, T) {
        let drying = WettingBranch {
            s_l_del: self.params.s_lr,
            s_gr_del: 0.0,
        };
        self.wetting_liquid(sl, &drying)
    }

    /// The liquid relative permeability with trapped gas,
    /// $k_{rl} = \sqrt{\bar S} \left(1 - a - b\right)^2$ with
    /// $a = (1 - \bar S_{gt} / (1 - \bar S^\Delta)) (1 - (\bar S + \bar S_{gt})^{1/m})^m$ and
    /// $b = \bar S_{gt} / (1 - \bar S^\Delta) (1 - (\bar S^\Delta)^{1/m})^m$.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn wetting_liquid(&self, sl: T, branch: &WettingBranch<T>) -> (T, T) {
        let (s_lr, m) = (self.params.s_lr, self.params.m);
        let sb = (sl - s_lr) / (1.0 - s_lr);
        if sb <= 0.0 {
            return (0.0, 0.0);
        }
        let sbp = 1.0 / (1.0 - s_lr);
        let sbd = (branch.s_l_del - s_lr) / (1.0 - s_lr);
        let sgtp = branch.s_gr_del / (1.0 - s_lr) / (1.0 - branch.s_l_del - branch.s_gr_del);
        let sgt = sgtp * (sl - branch.s_l_del);

        let x = sb + sgt;
        let c = x.powf(1.0 / m);
        let cp = c / m / x * (sbp + sgtp);
        let f = 1.0 - sgt / (1.0 - sbd);
        let fp = -sgtp / (1.0 - sbd);
        let a = f * (1.0 - c).powf(m);
        let ap = fp * (1.0 - c).powf(m) - f * m * (1.0 - c).powf(m - 1.0) * cp;
        let bd = (1.0 - sbd.powf(1.0 / m)).powf(m);
        let b = sgt / (1.0 - sbd) * bd;
        let bp = sgtp / (1.0 - sbd) * bd;

        let r = 1.0 - a - b;
        let kr = sb.sqrt() * r * r;
        (kr, 0.5 * kr / sb * sbp - sb.sqrt() * 2.0 * r * (ap + bp))
    }

    /// The gas relative permeability and its derivative,
    /// $k_{rg} = k_{rg,\max} (1 - x)^\gamma (1 - x^{1/m})^{2m}$ with $x = \bar S + \bar S_{gt}$.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn gas_with_derivative(&self, sl: T, state: &HysteresisState<T>) -> (T, T) {
        let p = &self.params;
        if sl < p.s_lr {
            if p.k_rg_max >= 1.0 {
                return (1.0, 0.0);
            }
            let slope = match p.gas_low_extension {
                GasLowExtension::LinearLike => (p.k_rg_max - 1.0) / p.s_lr,
                GasLowExtension::Cubic => self.drying_gas(p.s_lr).1,
            };
            return cubic_hermite(sl, 0.0, 1.0, 0.0, p.s_lr, p.k_rg_max, slope);
        }
        match self.wetting_branch(state) {
            Some(branch) if branch.s_gr_del > 0.0 && sl >= branch.s_l_del => self.wetting_gas(sl, &branch),
            _ => self.drying_gas(sl),
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn drying_gas(&self, sl: T) -> (T, T) {
        let drying = WettingBranch {
            s_l_del: self.params.s_lr,
            s_gr_del: 0.0,
        };
        self.wetting_gas(sl, &drying)
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn wetting_gas(&self, sl: T, branch: &WettingBranch<T>) -> (T, T) {
        let p = &self.params;
        let (m, gamma) = (p.m, p.gamma);
        let sbp = 1.0 / (1.0 - p.s_lr);
        let sgtp = branch.s_gr_del / (1.0 - p.s_lr) / (1.0 - branch.s_l_del - branch.s_gr_del);
        let sb = (sl - p.s_lr) * sbp;
        let sgt = sgtp * (sl - branch.s_l_del);
        let x = sb + sgt;
        if x >= 1.0 {
            return (0.0, 0.0);
        }
        let xp = sbp + sgtp;
        let a = (1.0 - x).powf(gamma);
        let ap = -gamma * a / (1.0 - x) * xp;
        let c = x.powf(1.0 / m);
        let cp = 1.0 / m * x.powf(1.0 / m - 1.0) * xp;
        let b = (1.0 - c).powf(2.0 * m);
        let bp = -2.0 * m * b / (1.0 - c) * cp;
        (p.k_rg_max * a * b, p.k_rg_max * (a * bp + ap * b))
    }
}
