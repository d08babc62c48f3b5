//! Turning-point bookkeeping for hysteretic saturation histories.
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};
use strata::Real;

/// The maximum number of turning points that are remembered.
pub const MAX_HYSTERESIS_ORDER: usize = 4;

/// The hysteresis order and the saturations at which the history reversed.
///
/// Order zero is the primary drying curve. Every reversal from drying to wetting (odd orders) or
/// from wetting to drying (even orders) records a turning point and increases the order. When
/// the saturation passes the turning point that opened the current scanning curve pair, both
/// turning points are forgotten and the history continues on the enclosing curve.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HysteresisState<T> {
    order: usize,
    turning_points: [T; MAX_HYSTERESIS_ORDER],
}

impl<T: Real> HysteresisState<T> {
    /// The state at the given turning points, or `None` if there are more than
    /// [`MAX_HYSTERESIS_ORDER`] of them.
    pub fn from_turning_points(turning_points: &[T]) -> Option<Self> {
        if turning_points.len() > MAX_HYSTERESIS_ORDER {
            return None;
        }
        let mut state = Self::default();
        state.turning_points[..turning_points.len()].copy_from_slice(turning_points);
        state.order = turning_points.len();
        Some(state)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// The active turning points, oldest first.
    pub fn turning_points(&self) -> &[T] {
        &self.turning_points[..self.order]
    }

    pub fn turning_point(&self, index: usize) -> Option<T> {
        self.turning_points().get(index).copied()
    }

    /// Whether the current scanning curve is a drying curve.
    pub fn is_drying(&self) -> bool {
        self.order % 2 == 0
    }

    /// Advance the history from saturation `previous` to `current`.
    ///
    /// An update that would need more than [`MAX_HYSTERESIS_ORDER`] turning points is ignored.
    /// Returns whether the state changed.
    #[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
    pub fn update(&mut self, previous: T, current: T) -> bool {
        let mut points = [0.0; MAX_HYSTERESIS_ORDER + 1];
        points[..MAX_HYSTERESIS_ORDER].copy_from_slice(&self.turning_points);
        let mut order = self.order;

        let reversed = if order % 2 == 0 {
            current > previous
        } else {
            current < previous
        };
        if reversed {
            points[order] = previous;
            order += 1;
        }
        while order > 1 {
            let enclosing = points[order - 2];
            let closed = if order % 2 == 0 {
                current <= enclosing
            } else {
                current >= enclosing
            };
            if closed {
                order -= 2;
            } else {
                break;
            }
        }

        if order > MAX_HYSTERESIS_ORDER {
            log::debug!("Ignoring saturation reversal at {previous:?}: hysteresis order would exceed {MAX_HYSTERESIS_ORDER}");
            return false;
        }
        for point in &mut points[order..] {
            *point = 0.0;
        }
        let mut turning_points = [0.0; MAX_HYSTERESIS_ORDER];
        turning_points.copy_from_slice(&points[..MAX_HYSTERESIS_ORDER]);
        let updated = Self { order, turning_points };
        let changed = updated != *self;
        *self = updated;
        changed
    }
}

/// Residual gas saturation after wetting from the liquid saturation `s_l_del`, following Land's
/// trapping relation
/// $$
/// S_{gr}^\Delta = \frac{1 - S_l^\Delta}{1 + a (1 - S_l^\Delta)}, \qquad
/// a = \frac{1}{S_{gr,\max}} - \frac{1}{1 - S_{lr}}.
/// $$
#[replace_float_literals(T::from_f64(literal).expect("literal must fit in T"))]
pub fn land_residual_gas_saturation<T: Real>(s_l_del: T, s_lr: T, s_gr_max: T) -> T {
    if s_gr_max <= 0.0 {
        return 0.0;
    }
    let a = 1.0 / s_gr_max - 1.0 / (1.0 - s_lr);
    (1.0 - s_l_del) / (1.0 + a * (1.0 - s_l_del))
}
