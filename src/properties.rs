//! Per-quadrature-point material properties.
//!
//! Properties are declared by producing objects and requested by consuming objects through a
//! [`PropertyResolver`] during construction. Once every object exists,
//! [`PropertyRegistry::resolve`] validates the configuration and freezes it into a
//! [`PropertyLayout`], from which per-thread [`PropertyStore`]s and the global
//! [`StatefulStorage`] are created.
mod buffer;
mod deferred;
mod layout;
mod ordering;
mod registry;
mod stateful;
mod store;
mod types;

pub use buffer::ErasedBuffer;
pub use deferred::{OptionalProperty, OptionalValues};
pub use layout::PropertyLayout;
pub use registry::{ObjectParameters, PropertyRegistry, PropertyResolver};
pub use stateful::{Checkpoint, CheckpointRecord, EntityHistory, StatefulRecord, StatefulStorage};
pub use store::PropertyStore;
pub use types::*;
