//! Material-property resolution and tagged residual/Jacobian assembly.
//!
//! The crate is organized around a two-phase life cycle. During *construction*, every object
//! (material, kernel, reducer) obtains a [`PropertyResolver`](properties::PropertyResolver)
//! from the [`PropertyRegistry`](properties::PropertyRegistry) and declares or requests the
//! per-quadrature-point properties it produces or consumes. [`resolve`](properties::PropertyRegistry::resolve)
//! then verifies the configuration, binds every deferred request and fixes the evaluation order of
//! materials. In the *evaluation* phase, the [`ElementLoopScheduler`](scheduler::ElementLoopScheduler)
//! splits the mesh entities across worker threads, and each worker evaluates materials and kernels
//! entity by entity into private buffers that are merged in a sequential join.
use nalgebra::RealField;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub mod error;
pub mod objects;
pub mod properties;
pub mod scheduler;
pub mod tags;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Identifier of a mesh entity (element, boundary element or node) within its loop range.
pub type EntityId = usize;

/// Identifier of a mesh subdomain (block).
pub type SubdomainId = u32;

/// Scalar type used for all assembled quantities.
///
/// Used as a trait alias for the traits frequently needed by generic `strata` routines.
pub trait Real: RealField + Copy + Default + Debug + Send + Sync + Serialize + DeserializeOwned {}

impl<T> Real for T where T: RealField + Copy + Default + Debug + Send + Sync + Serialize + DeserializeOwned {}
