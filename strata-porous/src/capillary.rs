//! Hysteretic capillary pressure.
//!
//! The liquid saturation starts out on the primary drying curve. A reversal to wetting at the
//! turning point $S^{(0)}$ switches to a first-order wetting scanning curve, built from the
//! wetting van Genuchten curve with the residual gas saturation predicted by Land's relation and
//! rescaled so that it passes through the turning point. A second reversal switches to a
//! second-order drying curve, the drying curve rescaled through both turning points. Higher
//! orders interpolate between the first- and second-order curves in log capillary pressure.
use crate::hysteresis::{land_residual_gas_saturation, HysteresisState};
use crate::van_genuchten::{
    max_value, Derivative, HighExtensionStrategy, HysteresisCurve, LowExtensionStrategy, VanGenuchtenParameters,
};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use strata::error::ConfigurationError;
use strata::Real;

fn default_high_ratio<T: Real>() -> T {
    T::from_f64(0.9).expect("literal must fit in T")
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Real"))]
pub struct HysteresisParameters<T> {
    /// The primary drying curve.
    pub drying: VanGenuchtenParameters<T>,
    /// The primary wetting curve.
    pub wetting: VanGenuchtenParameters<T>,
    /// Liquid saturation at which the drying curve reaches infinite capillary pressure.
    pub s_l_min: T,
    /// Residual liquid saturation, used in Land's relation.
    #[serde(default)]
    pub s_lr: T,
    /// Residual gas saturation after wetting from the minimum saturation.
    pub s_gr_max: T,
    /// The capillary pressure where the low extensions start.
    #[serde(default = "max_value")]
    pub pc_max: T,
    /// The high extensions of wetting curves start at `high_ratio * (1 - S_gr)`.
    #[serde(default = "default_high_ratio")]
    pub high_ratio: T,
    #[serde(default)]
    pub low_extension: LowExtensionStrategy,
    #[serde(default)]
    pub high_extension: HighExtensionStrategy,
}

impl<T: Real> HysteresisParameters<T> {
    /// Parameters with default residual liquid saturation, maximum capillary pressure and
    /// extensions.
    pub fn new(
        drying: VanGenuchtenParameters<T>,
        wetting: VanGenuchtenParameters<T>,
        s_l_min: T,
        s_gr_max: T,
    ) -> Self {
        Self {
            drying,
            wetting,
            s_l_min,
            s_lr: T::zero(),
            s_gr_max,
            pc_max: max_value(),
            high_ratio: default_high_ratio(),
            low_extension: LowExtensionStrategy::default(),
            high_extension: HighExtensionStrategy::default(),
        }
    }
}

fn invalid(object: &str, parameter: &str, reason: impl Into<String>) -> eyre::Report {
    ConfigurationError::InvalidParameter {
        object: object.to_string(),
        parameter: parameter.to_string(),
        reason: reason.into(),
    }
    .into()
}

/// The hysteretic capillary-pressure model.
///
/// The model itself is stateless. The [`HysteresisState`] of a quadrature point selects the
/// scanning curve, see [`scanning_curves`](Self::scanning_curves).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HystereticCapillaryPressure<T> {
    params: HysteresisParameters<T>,
    drying: HysteresisCurve<T>,
}

impl<T: Real> HystereticCapillaryPressure<T> {
    /// Validate the parameters of `object` and precompute the primary drying curve.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn new(object: &str, params: HysteresisParameters<T>) -> eyre::Result<Self> {
        for (name, curve) in [("drying", &params.drying), ("wetting", &params.wetting)] {
            if curve.alpha <= 0.0 {
                return Err(invalid(object, &format!("{name}.alpha"), "must be positive"));
            }
            if curve.n <= 1.0 {
                return Err(invalid(object, &format!("{name}.n"), "must be greater than 1"));
            }
        }
        if params.s_l_min < 0.0 || params.s_l_min >= 1.0 {
            return Err(invalid(object, "s_l_min", "must lie in [0, 1)"));
        }
        if params.s_lr < 0.0 || params.s_lr >= 1.0 {
            return Err(invalid(object, "s_lr", "must lie in [0, 1)"));
        }
        if params.s_gr_max < 0.0 || params.s_gr_max >= 1.0 - params.s_l_min {
            return Err(invalid(object, "s_gr_max", "must lie in [0, 1 - s_l_min)"));
        }
        if params.pc_max <= 0.0 {
            return Err(invalid(object, "pc_max", "must be positive"));
        }
        if params.high_ratio <= 0.0 || params.high_ratio >= 1.0 {
            return Err(invalid(object, "high_ratio", "must lie in (0, 1)"));
        }
        if params.s_lr <= params.s_l_min {
            log::warn!(
                "{object}: residual liquid saturation {:?} does not exceed the minimum liquid saturation {:?}",
                params.s_lr,
                params.s_l_min
            );
        }

        let drying = HysteresisCurve::new(params.s_l_min, 0.0, params.drying);
        let drying = drying.with_low_extension(drying.low_extension(params.low_extension, params.pc_max));
        let model = Self { params, drying };

        let wetting = model.wetting_curve(params.s_gr_max);
        let s_high = params.high_ratio * (1.0 - params.s_gr_max);
        if s_high < wetting.low.saturation {
            return Err(invalid(
                object,
                "high_ratio",
                format!(
                    "the high extension would start at saturation {s_high:?}, below the start of the \
                     low extension at {:?}",
                    wetting.low.saturation
                ),
            ));
        }
        Ok(model)
    }

    pub fn parameters(&self) -> &HysteresisParameters<T> {
        &self.params
    }

    /// The primary drying curve, including its low extension.
    pub fn drying_curve(&self) -> &HysteresisCurve<T> {
        &self.drying
    }

    /// The wetting curve with residual gas saturation `s_gr`, including its low extension.
    pub fn wetting_curve(&self, s_gr: T) -> HysteresisCurve<T> {
        let curve = HysteresisCurve::new(self.params.s_l_min, s_gr, self.params.wetting);
        curve.with_low_extension(curve.low_extension(self.params.low_extension, self.params.pc_max))
    }

    /// Residual gas saturation of a wetting curve starting at liquid saturation `s_l_del`.
    pub fn residual_gas_saturation(&self, s_l_del: T) -> T {
        land_residual_gas_saturation(s_l_del, self.params.s_lr, self.params.s_gr_max)
    }

    /// The scanning curves selected by `state`.
    pub fn scanning_curves(&self, state: &HysteresisState<T>) -> ScanningCurves<'_, T> {
        let mut curves = ScanningCurves {
            model: self,
            state: *state,
            turning_points: Vec::with_capacity(3),
        };
        for (index, &saturation) in state.turning_points().iter().take(3).enumerate() {
            // The capillary pressure at a turning point lies on the curve it reversed from
            let pc = match index {
                0 => self.drying.capillary_pressure(saturation),
                1 => curves.first_wetting(saturation, Derivative::Value),
                _ => curves.second_drying(saturation, Derivative::Value),
            };
            let turning_point = self.turning_point(saturation, pc);
            curves.turning_points.push(turning_point);
        }
        curves
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn turning_point(&self, saturation: T, pc: T) -> TurningPoint<T> {
        let s_gr = self.residual_gas_saturation(saturation);
        let wetting = self.wetting_curve(s_gr);
        let (high_saturation, max_saturation) = match self.params.high_extension {
            HighExtensionStrategy::None => (1.0 - s_gr, 1.0 - s_gr),
            HighExtensionStrategy::Power => (self.params.high_ratio * (1.0 - s_gr), 1.0),
        };
        let wetting = wetting.with_high_extension(wetting.high_extension(self.params.high_extension, high_saturation));
        TurningPoint {
            pc,
            drying_saturation: self.drying.saturation(pc),
            wetting_saturation: wetting.saturation(self.drying.capillary_pressure(saturation)),
            max_saturation,
            wetting,
        }
    }
}

/// The curves through one turning point.
#[derive(Copy, Clone, Debug, PartialEq)]
struct TurningPoint<T> {
    /// Capillary pressure at the turning point.
    pc: T,
    /// Saturation on the primary drying curve at `pc`.
    drying_saturation: T,
    /// Saturation on the wetting curve at the primary drying capillary pressure of the turning
    /// point.
    wetting_saturation: T,
    /// The saturation where the wetting curve ends.
    max_saturation: T,
    wetting: HysteresisCurve<T>,
}

/// Capillary pressure and saturation of one quadrature point, as functions of each other.
#[derive(Clone, Debug)]
pub struct ScanningCurves<'a, T> {
    model: &'a HystereticCapillaryPressure<T>,
    state: HysteresisState<T>,
    turning_points: Vec<TurningPoint<T>>,
}

impl<'a, T: Real> ScanningCurves<'a, T> {
    pub fn state(&self) -> &HysteresisState<T> {
        &self.state
    }

    pub fn capillary_pressure(&self, sl: T) -> T {
        self.capillary_pressure_derivative(sl, Derivative::Value)
    }

    /// Derivative of the capillary pressure with respect to the liquid saturation.
    pub fn dcapillary_pressure(&self, sl: T) -> T {
        self.capillary_pressure_derivative(sl, Derivative::First)
    }

    pub fn d2capillary_pressure(&self, sl: T) -> T {
        self.capillary_pressure_derivative(sl, Derivative::Second)
    }

    pub fn saturation(&self, pc: T) -> T {
        self.saturation_derivative(pc, Derivative::Value)
    }

    /// Derivative of the liquid saturation with respect to the capillary pressure.
    pub fn dsaturation(&self, pc: T) -> T {
        self.saturation_derivative(pc, Derivative::First)
    }

    pub fn d2saturation(&self, pc: T) -> T {
        self.saturation_derivative(pc, Derivative::Second)
    }

    fn turning_point_saturation(&self, index: usize) -> T {
        self.state
            .turning_point(index)
            .expect("Internal error: turning point beyond the hysteresis order")
    }

    fn capillary_pressure_derivative(&self, sl: T, derivative: Derivative) -> T {
        match self.state.order() {
            0 => self.model.drying.capillary_pressure_derivative(sl, derivative),
            1 => self.first_wetting(sl, derivative),
            2 => self.second_drying(sl, derivative),
            _ => self.third_order(sl, derivative),
        }
    }

    fn saturation_derivative(&self, pc: T, derivative: Derivative) -> T {
        match self.state.order() {
            0 => self.model.drying.saturation_derivative(pc, derivative),
            1 => self.first_wetting_saturation(pc, derivative),
            2 => self.second_drying_saturation(pc, derivative),
            _ => self.third_order_saturation(pc, derivative),
        }
    }

    /// The wetting curve through the first turning point, rescaled to end at the maximum
    /// saturation of the wetting curve.
    fn first_wetting(&self, sl: T, derivative: Derivative) -> T {
        let tp = &self.turning_points[0];
        let s0 = self.turning_point_saturation(0);
        let ds = (tp.max_saturation - tp.wetting_saturation) / (tp.max_saturation - s0);
        let su = tp.wetting_saturation + ds * (sl - s0);
        tp.wetting.capillary_pressure_derivative(su, derivative) * ds.powi(derivative.order())
    }

    /// The drying curve rescaled to pass through the first two turning points.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn second_drying(&self, sl: T, derivative: Derivative) -> T {
        let s0 = self.turning_point_saturation(0);
        let (su, ds) = if sl >= s0 {
            let s1 = self.turning_point_saturation(1);
            let ds = (self.turning_points[1].drying_saturation - s0) / (s1 - s0);
            (s0 + (sl - s0) * ds, ds)
        } else {
            (sl, 1.0)
        };
        self.model.drying.capillary_pressure_derivative(su, derivative) * ds.powi(derivative.order())
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn third_order(&self, sl: T, derivative: Derivative) -> T {
        let s1 = self.turning_point_saturation(1);
        let s2 = self.turning_point_saturation(2);
        if sl < s2 {
            return self.second_drying(sl, derivative);
        }
        if sl > s1 {
            return self.first_wetting(sl, derivative);
        }
        let pc1 = self.first_wetting(sl, Derivative::Value);
        let pc2 = self.second_drying(sl, Derivative::Value);
        if pc1 >= pc2 {
            return self.first_wetting(sl, derivative);
        }
        if pc1 <= 0.0 || pc2 <= 0.0 {
            return 0.0;
        }

        let span = s2 - s1;
        let log_slope = (pc2.ln() - pc1.ln()) / span;
        let pc = (pc1.ln() + (sl - s1) * log_slope).exp();
        if derivative == Derivative::Value {
            return pc;
        }
        let dpc1 = self.first_wetting(sl, Derivative::First);
        let dpc2 = self.second_drying(sl, Derivative::First);
        let (g1, g2) = (dpc1 / pc1, dpc2 / pc2);
        let g = g1 + log_slope + (sl - s1) * (g2 - g1) / span;
        if derivative == Derivative::First {
            return pc * g;
        }
        let d2pc1 = self.first_wetting(sl, Derivative::Second);
        let d2pc2 = self.second_drying(sl, Derivative::Second);
        let (h1, h2) = (d2pc1 / pc1 - g1 * g1, d2pc2 / pc2 - g2 * g2);
        let dg = h1 + 2.0 * (g2 - g1) / span + (sl - s1) * (h2 - h1) / span;
        pc * g * g + pc * dg
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn first_wetting_saturation(&self, pc: T, derivative: Derivative) -> T {
        let tp = &self.turning_points[0];
        let s0 = self.turning_point_saturation(0);
        let su = tp.wetting.saturation(pc);
        if su > tp.max_saturation {
            return match derivative {
                Derivative::Value => tp.max_saturation,
                _ => 0.0,
            };
        }
        let scale = (tp.max_saturation - s0) / (tp.max_saturation - tp.wetting_saturation);
        match derivative {
            Derivative::Value => (su - tp.wetting_saturation) * scale + s0,
            _ => tp.wetting.saturation_derivative(pc, derivative) * scale,
        }
    }

    fn second_drying_saturation(&self, pc: T, derivative: Derivative) -> T {
        let s0 = self.turning_point_saturation(0);
        let s1 = self.turning_point_saturation(1);
        let drying = &self.model.drying;
        let su = drying.saturation(pc);
        if su >= s0 {
            let scale = (s1 - s0) / (self.turning_points[1].drying_saturation - s0);
            match derivative {
                Derivative::Value => (su - s0) * scale + s0,
                _ => drying.saturation_derivative(pc, derivative) * scale,
            }
        } else {
            drying.saturation_derivative(pc, derivative)
        }
    }

    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    fn third_order_saturation(&self, pc: T, derivative: Derivative) -> T {
        let p1 = self.turning_points[1].pc;
        let p2 = self.turning_points[2].pc;
        if p1 <= 0.0 || pc <= 0.0 || p2 <= 0.0 || pc > p2 {
            return self.second_drying_saturation(pc, derivative);
        }
        if pc < p1 {
            return self.first_wetting_saturation(pc, derivative);
        }

        let log_span = (p2 / p1).ln();
        let weight = (pc.ln() - p1.ln()) / log_span;
        let s1 = self.first_wetting_saturation(pc, Derivative::Value);
        let s2 = self.second_drying_saturation(pc, Derivative::Value);
        if derivative == Derivative::Value {
            return s1 + weight * (s2 - s1);
        }
        let ds1 = self.first_wetting_saturation(pc, Derivative::First);
        let ds2 = self.second_drying_saturation(pc, Derivative::First);
        if derivative == Derivative::First {
            return ds1 + (s2 - s1) / (pc * log_span) + weight * (ds2 - ds1);
        }
        let d2s1 = self.first_wetting_saturation(pc, Derivative::Second);
        let d2s2 = self.second_drying_saturation(pc, Derivative::Second);
        d2s1 - (s2 - s1) / (pc * pc * log_span) + 2.0 / pc * (ds2 - ds1) / log_span + weight * (d2s2 - d2s1)
    }
}
