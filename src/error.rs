//! Error types raised during configuration and resolution.
//!
//! All fallible operations in `strata` return [`eyre::Result`]. The typed errors below are wrapped
//! in the report, so callers that need to react to a specific failure can use
//! `report.downcast_ref::<ConfigurationError>()`.
//!
//! Violations of internal invariants in the hot loop (out-of-range tag ids, misuse of local
//! contribution buffers, reading a deferred property before resolution) are not represented here:
//! they indicate a bug and panic with an `"Internal error: ..."` message.
use crate::properties::{SpatialClass, TimeState};
use thiserror::Error;

/// A mistake in how objects, properties or tags were configured.
///
/// Every variant names the offending object and the property, tag or parameter involved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("object `{object}` declares property `{property}` ({class:?}), which is already declared by `{existing}` on overlapping blocks")]
    DuplicateDeclaration {
        object: String,
        property: String,
        class: SpatialClass,
        existing: String,
    },

    #[error("object `{object}` requests property `{property}` ({class:?}), but no object declares it")]
    MissingProperty {
        object: String,
        property: String,
        class: SpatialClass,
    },

    #[error("object `{object}` requests property `{property}` on blocks that are not covered by its producers")]
    BlockRestrictionMismatch { object: String, property: String },

    #[error("object `{object}` requests the {state:?} state of property `{property}`, but stateful properties are disabled for this object")]
    StatefulnessDisabled {
        object: String,
        property: String,
        state: TimeState,
    },

    #[error("object `{object}` requests derivatives of the {state:?} state of property `{property}`; only the current state carries derivatives")]
    DerivativesOfHistoryRequested {
        object: String,
        property: String,
        state: TimeState,
    },

    #[error("object `{object}` uses property `{property}` as `{requested}`, but it is declared as `{declared}`")]
    TypeMismatch {
        object: String,
        property: String,
        requested: &'static str,
        declared: &'static str,
    },

    #[error("object `{object}` uses property `{property}` with a different representation than it was declared with")]
    RepresentationMismatch { object: String, property: String },

    #[error("object `{object}` refers to unknown tag `{tag}`")]
    UnknownTag { object: String, tag: String },

    #[error("tag `{tag}` not found")]
    TagNotFound { tag: String },

    #[error("tag `{tag}` is already registered as a {existing} tag, not as a {requested} tag")]
    TagKindMismatch {
        tag: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("tag `{tag}` is reserved for solution states")]
    ReservedTag { tag: String },

    #[error("materials on {class:?} have a cyclic property dependency: {objects:?}")]
    DependencyCycle {
        class: SpatialClass,
        objects: Vec<String>,
    },

    #[error("an object named `{object}` is already registered")]
    DuplicateObject { object: String },

    #[error("object `{object}` was never registered with the property registry")]
    UnknownObject { object: String },

    #[error("object `{object}` cannot be registered: property resolution has already completed")]
    OutsideConstruction { object: String },

    #[error("object `{object}`: invalid parameter `{parameter}`: {reason}")]
    InvalidParameter {
        object: String,
        parameter: String,
        reason: String,
    },
}

/// A violation of an internal invariant that is detected outside the hot loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    #[error("Internal error: properties have already been resolved")]
    AlreadyResolved,

    #[error("Internal error: deferred property `{property}` requested by `{object}` was resolved twice")]
    ProxyResolvedTwice { object: String, property: String },

    #[error("Internal error: no stateful history recorded for entity {entity} on {class:?}")]
    MissingHistory { entity: usize, class: SpatialClass },

    #[error("Internal error: restart data refers to unknown property `{property}` on {class:?}")]
    UnknownRestartProperty { property: String, class: SpatialClass },
}
