//! Test helpers shared by the crates in the workspace.

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::{catch_unwind, AssertUnwindSafe};
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _ = $e;
        }));
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Compares a finite-difference estimate against an analytic derivative.
///
/// Steep derivatives (`|fd| > 10`) are compared by their ratio, which must be within `tol` of one.
/// Everything else is compared with the absolute tolerance `tol`.
#[macro_export]
macro_rules! assert_derivative_eq {
    ($fd:expr, $analytic:expr, tol = $tol:expr) => {{
        let fd: f64 = $fd;
        let analytic: f64 = $analytic;
        let tol: f64 = $tol;
        if fd.abs() > 10.0 {
            let ratio = fd / analytic;
            assert!(
                (ratio - 1.0).abs() <= tol,
                "finite difference {fd:e} and analytic derivative {analytic:e} differ by ratio {ratio}"
            );
        } else {
            assert!(
                (fd - analytic).abs() <= tol,
                "finite difference {fd:e} and analytic derivative {analytic:e} differ by more than {tol:e}"
            );
        }
    }};
}

/// Central difference approximation of `f'(x)`.
pub fn central_difference(f: impl Fn(f64) -> f64, x: f64, h: f64) -> f64 {
    0.5 * (f(x + h) - f(x - h)) / h
}

/// Forward difference approximation of `f'(x)`.
pub fn forward_difference(f: impl Fn(f64) -> f64, x: f64, h: f64) -> f64 {
    (f(x + h) - f(x)) / h
}
