//! Hysteretic van Genuchten capillary-pressure and relative-permeability models.
//!
//! The models are plain functions of the liquid saturation (or the capillary pressure) and a
//! [`HysteresisState`] recording the turning points of the saturation history. The
//! [`materials`] module wires them into the `strata` property system.
pub mod capillary;
pub mod hysteresis;
pub mod materials;
pub mod relperm;
pub mod van_genuchten;

pub use capillary::{HystereticCapillaryPressure, HysteresisParameters, ScanningCurves};
pub use hysteresis::{HysteresisState, MAX_HYSTERESIS_ORDER};
pub use relperm::{HystereticRelativePermeability, HystereticRelativePermeabilityParameters};
