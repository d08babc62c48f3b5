use matrixcompare::assert_scalar_eq;
use proptest::collection::vec;
use proptest::prelude::*;
use strata_porous::hysteresis::land_residual_gas_saturation;
use strata_porous::{HysteresisState, MAX_HYSTERESIS_ORDER};

/// Feeds a saturation history into the state, starting from the saturation `previous`.
struct History {
    state: HysteresisState<f64>,
    previous: f64,
}

impl History {
    fn new(initial: f64) -> Self {
        Self {
            state: HysteresisState::default(),
            previous: initial,
        }
    }

    fn feed(&mut self, saturations: &[f64]) -> (usize, Vec<f64>) {
        for &saturation in saturations {
            self.state.update(self.previous, saturation);
            self.previous = saturation;
        }
        (self.state.order(), self.state.turning_points().to_vec())
    }
}

#[test]
fn order_follows_reversals_of_the_saturation() {
    let mut history = History::new(1.0);
    assert_eq!(history.feed(&[1.0]), (0, vec![]));
    // Drying on the primary curve
    assert_eq!(history.feed(&[0.9, 0.8, 0.7, 0.6, 0.5]), (0, vec![]));
    // Wetting from 0.5
    assert_eq!(history.feed(&[0.6, 0.7]), (1, vec![0.5]));
    assert_eq!(history.feed(&[0.7, 0.8, 0.9]), (1, vec![0.5]));
    // Drying from 0.9
    assert_eq!(history.feed(&[0.8, 0.7, 0.6]), (2, vec![0.5, 0.9]));
    // Passing the first turning point returns to the primary drying curve
    assert_eq!(history.feed(&[0.5]), (0, vec![]));
    assert_eq!(history.feed(&[0.4]), (0, vec![]));
    assert_eq!(history.feed(&[0.9, 0.6, 0.8, 0.7]), (4, vec![0.4, 0.9, 0.6, 0.8]));
    // Wetting beyond 0.8 closes the innermost loop
    assert_eq!(history.feed(&[0.85]), (3, vec![0.4, 0.9, 0.6]));
    assert_eq!(history.feed(&[0.2]), (0, vec![]));
}

#[test]
fn reversal_beyond_the_maximum_order_is_ignored() {
    let mut state = HysteresisState::from_turning_points(&[0.4, 0.9, 0.6, 0.8]).unwrap();
    assert_eq!(state.order(), MAX_HYSTERESIS_ORDER);
    assert!(state.is_drying());
    // A reversal to wetting at 0.7 would need a fifth turning point
    assert!(!state.update(0.7, 0.75));
    assert_eq!(state.turning_points(), &[0.4, 0.9, 0.6, 0.8]);
    // Unless it immediately passes an earlier turning point
    assert!(state.update(0.7, 0.85));
    assert_eq!(state.turning_points(), &[0.4, 0.9, 0.6]);
}

#[test]
fn unchanged_saturation_keeps_the_state() {
    let mut state = HysteresisState::from_turning_points(&[0.3]).unwrap();
    assert!(!state.update(0.5, 0.5));
    assert_eq!(state.order(), 1);
    assert!(!state.is_drying());
    assert_eq!(state.turning_point(0), Some(0.3));
    assert_eq!(state.turning_point(1), None);
}

#[test]
fn too_many_turning_points_are_rejected() {
    assert!(HysteresisState::from_turning_points(&[0.1, 0.9, 0.2, 0.8, 0.3]).is_none());
    assert_eq!(
        HysteresisState::<f64>::from_turning_points(&[]),
        Some(HysteresisState::default())
    );
}

#[test]
fn state_round_trips_through_json() {
    let state = HysteresisState::from_turning_points(&[0.4, 0.9]).unwrap();
    let json = serde_json::to_string(&state).unwrap();
    let parsed: HysteresisState<f64> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, state);
}

#[test]
fn land_expression() {
    assert_scalar_eq!(land_residual_gas_saturation(0.2, 0.2, 0.3), 0.3, comp = abs, tol = 1e-12);
    assert_scalar_eq!(
        land_residual_gas_saturation(0.5, 0.2, 0.3),
        0.24489795918367344,
        comp = abs,
        tol = 1e-12
    );
    assert_eq!(land_residual_gas_saturation(1.0, 0.2, 0.3), 0.0);
    assert_eq!(land_residual_gas_saturation(0.5, 0.2, 0.0), 0.0);
}

proptest! {
    #[test]
    fn turning_points_alternate_around_the_current_saturation(
        saturations in vec(0.0..1.0f64, 1..40),
    ) {
        let mut state = HysteresisState::default();
        let mut previous = 1.0;
        for saturation in saturations {
            state.update(previous, saturation);
            previous = saturation;

            let points = state.turning_points();
            prop_assert!(points.len() <= MAX_HYSTERESIS_ORDER);
            // Wetting turning points are minima, drying turning points maxima, and every scanning
            // curve is nested inside the previous one.
            for (i, pair) in points.windows(2).enumerate() {
                if i % 2 == 0 {
                    prop_assert!(pair[0] < pair[1]);
                } else {
                    prop_assert!(pair[0] > pair[1]);
                }
            }
            for (i, &point) in points.iter().enumerate().skip(2) {
                if i % 2 == 0 {
                    prop_assert!(point > points[i - 2]);
                } else {
                    prop_assert!(point < points[i - 2]);
                }
            }
        }
    }
}
