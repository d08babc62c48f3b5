//! Tagged residual vectors and Jacobian matrices.
//!
//! A tag is a named slot that local contributions are routed into. Objects select the tags they
//! contribute to by name; the names are resolved against the [`TagRegistry`] when the object is
//! added to a warehouse, so that unknown tags never reach the element loop.
mod assembler;
mod pattern;
mod registry;
mod selection;
mod storage;

pub use assembler::{LocalAssembly, LocalState, TaggingAssembler};
pub use pattern::{assemble_pattern, DofConnectivity};
pub use registry::*;
pub use selection::{ResolvedTags, TagSelection};
pub use storage::{TaggedContributions, TaggedStorage};
