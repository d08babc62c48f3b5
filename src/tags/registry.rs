use crate::error::ConfigurationError;
use crate::properties::TimeState;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Tag of the current solution vector.
pub const SOLUTION_TAG: &str = "SOLUTION";
/// Tag of the solution vector at the previous time step.
pub const OLD_SOLUTION_TAG: &str = "SOLUTION_STATE_1";
/// Tag of the solution vector two time steps back.
pub const OLDER_SOLUTION_TAG: &str = "SOLUTION_STATE_2";

/// Residual tag for time-derivative contributions.
pub const TIME_TAG: &str = "TIME";
/// Residual tag for all other contributions.
pub const NONTIME_TAG: &str = "NONTIME";
/// Matrix tag of the system Jacobian.
pub const SYSTEM_TAG: &str = "SYSTEM";

const RESERVED_TAGS: [&str; 3] = [SOLUTION_TAG, OLD_SOLUTION_TAG, OLDER_SOLUTION_TAG];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VectorTagId(pub(crate) usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatrixTagId(pub(crate) usize);

impl VectorTagId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl MatrixTagId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorTagType {
    Residual,
    Solution,
}

impl VectorTagType {
    fn description(&self) -> &'static str {
        match self {
            VectorTagType::Residual => "residual",
            VectorTagType::Solution => "solution",
        }
    }
}

#[derive(Debug, Clone)]
struct VectorTag {
    name: String,
    kind: VectorTagType,
}

/// Dense, stable enumeration of the vector and matrix tags of a simulation.
///
/// Tag names are case-insensitive and stored in upper case. The solution tags
/// [`SOLUTION_TAG`], [`OLD_SOLUTION_TAG`] and [`OLDER_SOLUTION_TAG`] are registered on creation
/// and cannot be used as residual tags.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    vector_tags: Vec<VectorTag>,
    matrix_tags: Vec<String>,
    vector_index: FxHashMap<String, VectorTagId>,
    matrix_index: FxHashMap<String, MatrixTagId>,
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TagRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            vector_tags: Vec::new(),
            matrix_tags: Vec::new(),
            vector_index: FxHashMap::default(),
            matrix_index: FxHashMap::default(),
        };
        for name in RESERVED_TAGS {
            registry.insert_vector_tag(name.to_string(), VectorTagType::Solution);
        }
        registry
    }

    /// A registry that additionally holds the [`TIME_TAG`] and [`NONTIME_TAG`] residual tags and
    /// the [`SYSTEM_TAG`] and [`TIME_TAG`] matrix tags.
    pub fn with_standard_tags() -> Self {
        let mut registry = Self::new();
        for name in [TIME_TAG, NONTIME_TAG] {
            registry.insert_vector_tag(name.to_string(), VectorTagType::Residual);
        }
        registry.get_or_create_matrix_tag(SYSTEM_TAG);
        registry.get_or_create_matrix_tag(TIME_TAG);
        registry
    }

    /// Return the id of the vector tag `name`, registering it if necessary.
    pub fn get_or_create_vector_tag(&mut self, name: &str, kind: VectorTagType) -> eyre::Result<VectorTagId> {
        let name = name.to_uppercase();
        if kind == VectorTagType::Residual && RESERVED_TAGS.contains(&name.as_str()) {
            return Err(ConfigurationError::ReservedTag { tag: name }.into());
        }
        match self.vector_index.get(&name) {
            Some(&id) => {
                let existing = self.vector_tags[id.0].kind;
                if existing != kind {
                    return Err(ConfigurationError::TagKindMismatch {
                        tag: name,
                        existing: existing.description(),
                        requested: kind.description(),
                    }
                    .into());
                }
                Ok(id)
            }
            None => Ok(self.insert_vector_tag(name, kind)),
        }
    }

    /// Return the id of the matrix tag `name`, registering it if necessary.
    pub fn get_or_create_matrix_tag(&mut self, name: &str) -> MatrixTagId {
        let name = name.to_uppercase();
        if let Some(&id) = self.matrix_index.get(&name) {
            return id;
        }
        let id = MatrixTagId(self.matrix_tags.len());
        self.matrix_tags.push(name.clone());
        self.matrix_index.insert(name, id);
        id
    }

    pub fn vector_tag_id(&self, name: &str) -> eyre::Result<VectorTagId> {
        let name = name.to_uppercase();
        self.vector_index
            .get(&name)
            .copied()
            .ok_or_else(|| ConfigurationError::TagNotFound { tag: name }.into())
    }

    pub fn matrix_tag_id(&self, name: &str) -> eyre::Result<MatrixTagId> {
        let name = name.to_uppercase();
        self.matrix_index
            .get(&name)
            .copied()
            .ok_or_else(|| ConfigurationError::TagNotFound { tag: name }.into())
    }

    pub fn has_vector_tag(&self, name: &str) -> bool {
        self.vector_index.contains_key(&name.to_uppercase())
    }

    pub fn has_matrix_tag(&self, name: &str) -> bool {
        self.matrix_index.contains_key(&name.to_uppercase())
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn vector_tag_name(&self, id: VectorTagId) -> &str {
        &self.vector_tag(id).name
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn vector_tag_type(&self, id: VectorTagId) -> VectorTagType {
        self.vector_tag(id).kind
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this registry.
    pub fn matrix_tag_name(&self, id: MatrixTagId) -> &str {
        self.matrix_tags
            .get(id.0)
            .unwrap_or_else(|| panic!("Internal error: matrix tag id {} is out of bounds", id.0))
    }

    pub fn num_vector_tags(&self) -> usize {
        self.vector_tags.len()
    }

    pub fn num_matrix_tags(&self) -> usize {
        self.matrix_tags.len()
    }

    /// Ids of all vector tags of the given type, in increasing order.
    pub fn vector_tags_of_type(&self, kind: VectorTagType) -> impl Iterator<Item = VectorTagId> + '_ {
        self.vector_tags
            .iter()
            .enumerate()
            .filter(move |(_, tag)| tag.kind == kind)
            .map(|(idx, _)| VectorTagId(idx))
    }

    /// The solution tag holding the solution at the given time state.
    pub fn solution_tag(&self, state: TimeState) -> VectorTagId {
        // The reserved tags are registered first, in time-state order.
        VectorTagId(state.index())
    }

    pub fn is_reserved(name: &str) -> bool {
        RESERVED_TAGS.contains(&name.to_uppercase().as_str())
    }

    fn vector_tag(&self, id: VectorTagId) -> &VectorTag {
        self.vector_tags
            .get(id.0)
            .unwrap_or_else(|| panic!("Internal error: vector tag id {} is out of bounds", id.0))
    }

    fn insert_vector_tag(&mut self, name: String, kind: VectorTagType) -> VectorTagId {
        let id = VectorTagId(self.vector_tags.len());
        self.vector_tags.push(VectorTag { name: name.clone(), kind });
        self.vector_index.insert(name, id);
        id
    }
}
