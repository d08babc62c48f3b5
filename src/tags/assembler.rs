use crate::tags::{MatrixTagId, ResolvedTags, TaggedContributions, VectorTagId};
use crate::{EntityId, Real};
use nalgebra::{DMatrix, DVector};

/// State of a local contribution buffer during the evaluation of one entity.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LocalState {
    Idle,
    Prepared,
    Evaluated,
    Flushed,
}

impl LocalState {
    fn is_pending(&self) -> bool {
        matches!(self, LocalState::Prepared | LocalState::Evaluated)
    }
}

/// Local residual and Jacobian buffers of one worker.
///
/// For each entity, an object prepares the buffers for its local dofs, writes its contributions
/// and flushes them into a [`TaggedContributions`] for every tag it selected. The buffers follow
/// the cycle `Idle -> Prepared -> Evaluated -> Flushed`; writing before preparing or flushing
/// twice is a programming error and panics.
#[derive(Debug, Clone)]
pub struct TaggingAssembler<T: Real> {
    residual: DVector<T>,
    residual_dofs: Vec<usize>,
    residual_state: LocalState,
    jacobian: DMatrix<T>,
    jacobian_rows: Vec<usize>,
    jacobian_cols: Vec<usize>,
    jacobian_state: LocalState,
    cached_jacobian: Vec<(MatrixTagId, usize, usize, T)>,
}

impl<T: Real> Default for TaggingAssembler<T> {
    fn default() -> Self {
        Self {
            residual: DVector::zeros(0),
            residual_dofs: Vec::new(),
            residual_state: LocalState::Idle,
            jacobian: DMatrix::zeros(0, 0),
            jacobian_rows: Vec::new(),
            jacobian_cols: Vec::new(),
            jacobian_state: LocalState::Idle,
            cached_jacobian: Vec::new(),
        }
    }
}

impl<T: Real> TaggingAssembler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn residual_state(&self) -> LocalState {
        self.residual_state
    }

    pub fn jacobian_state(&self) -> LocalState {
        self.jacobian_state
    }

    /// Whether contributions were prepared or cached but never flushed.
    pub fn has_pending(&self) -> bool {
        self.residual_state.is_pending() || self.jacobian_state.is_pending() || !self.cached_jacobian.is_empty()
    }

    /// Return both buffers to `Idle`, discarding cached Jacobian entries.
    pub fn reset(&mut self) {
        self.residual_state = LocalState::Idle;
        self.jacobian_state = LocalState::Idle;
        self.cached_jacobian.clear();
    }

    /// Zero the local residual and size it to `dofs`.
    pub fn prepare_vector(&mut self, dofs: &[usize]) {
        assert!(
            !self.residual_state.is_pending(),
            "Internal error: local residual prepared again before it was flushed"
        );
        self.residual_dofs.clear();
        self.residual_dofs.extend_from_slice(dofs);
        self.residual.resize_vertically_mut(dofs.len(), T::zero());
        self.residual.fill(T::zero());
        self.residual_state = LocalState::Prepared;
    }

    pub fn residual_dofs(&self) -> &[usize] {
        &self.residual_dofs
    }

    /// The local residual, for writing.
    pub fn residual_mut(&mut self) -> &mut DVector<T> {
        assert!(
            self.residual_state.is_pending(),
            "Internal error: local residual written before it was prepared"
        );
        self.residual_state = LocalState::Evaluated;
        &mut self.residual
    }

    pub fn residual(&self) -> &DVector<T> {
        &self.residual
    }

    /// Add the scaled local residual to every vector tag in `tags`.
    ///
    /// The absolute values of the entries are added to the absolute-value tags.
    pub fn accumulate(&mut self, tags: &ResolvedTags<T>, out: &mut TaggedContributions<T>) {
        self.accumulate_tags(tags, tags.vector_tags(), out);
    }

    /// Add the scaled local residual to the vector tags in `subset`.
    pub fn accumulate_tags(&mut self, tags: &ResolvedTags<T>, subset: &[VectorTagId], out: &mut TaggedContributions<T>) {
        self.begin_residual_flush();
        let scaling = tags.scaling();
        for &tag in subset {
            out.add_vector(tag, &self.residual_dofs, &self.residual, scaling, false);
        }
        for &tag in tags.abs_value_vector_tags() {
            out.add_vector(tag, &self.residual_dofs, &self.residual, scaling, true);
        }
    }

    /// Overwrite the global entries of every vector tag in `tags` with the scaled local residual.
    pub fn assign(&mut self, tags: &ResolvedTags<T>, out: &mut TaggedContributions<T>) {
        self.begin_residual_flush();
        let scaling = tags.scaling();
        for &tag in tags.vector_tags() {
            out.assign_vector(tag, &self.residual_dofs, &self.residual, scaling);
        }
    }

    /// Zero the local Jacobian and size it to `rows x cols`.
    pub fn prepare_matrix(&mut self, rows: &[usize], cols: &[usize]) {
        assert!(
            !self.jacobian_state.is_pending(),
            "Internal error: local Jacobian prepared again before it was flushed"
        );
        self.jacobian_rows.clear();
        self.jacobian_rows.extend_from_slice(rows);
        self.jacobian_cols.clear();
        self.jacobian_cols.extend_from_slice(cols);
        self.jacobian.resize_mut(rows.len(), cols.len(), T::zero());
        self.jacobian.fill(T::zero());
        self.jacobian_state = LocalState::Prepared;
    }

    /// The local Jacobian, for writing.
    pub fn jacobian_mut(&mut self) -> &mut DMatrix<T> {
        assert!(
            self.jacobian_state.is_pending(),
            "Internal error: local Jacobian written before it was prepared"
        );
        self.jacobian_state = LocalState::Evaluated;
        &mut self.jacobian
    }

    pub fn jacobian(&self) -> &DMatrix<T> {
        &self.jacobian
    }

    /// Add the scaled local Jacobian to every matrix tag in `tags`.
    pub fn accumulate_jacobian(&mut self, tags: &ResolvedTags<T>, out: &mut TaggedContributions<T>) {
        assert!(
            self.jacobian_state.is_pending(),
            "Internal error: local Jacobian flushed without being prepared, or flushed twice"
        );
        self.jacobian_state = LocalState::Flushed;
        let scaling = tags.scaling();
        for &tag in tags.matrix_tags() {
            out.add_matrix(tag, &self.jacobian_rows, &self.jacobian_cols, &self.jacobian, scaling);
        }
    }

    /// Cache a single Jacobian entry for every matrix tag in `tags`.
    ///
    /// Cached entries are added to the contributions by [`add_cached_jacobian`](Self::add_cached_jacobian).
    pub fn process_jacobian_element(&mut self, tags: &ResolvedTags<T>, row: usize, col: usize, value: T, scaling: T) {
        for &tag in tags.matrix_tags() {
            self.cached_jacobian.push((tag, row, col, value * scaling));
        }
    }

    pub fn add_cached_jacobian(&mut self, out: &mut TaggedContributions<T>) {
        for (tag, row, col, value) in self.cached_jacobian.drain(..) {
            out.add_matrix_entry(tag, row, col, value);
        }
    }

    fn begin_residual_flush(&mut self) {
        assert!(
            self.residual_state.is_pending(),
            "Internal error: local residual flushed without being prepared, or flushed twice"
        );
        self.residual_state = LocalState::Flushed;
    }
}

/// What an object sees of the tagging machinery while it evaluates one entity.
///
/// Bundles the worker's [`TaggingAssembler`], the object's resolved tags and the worker's
/// contributions, so objects never handle tag ids themselves.
pub struct LocalAssembly<'a, T: Real> {
    assembler: &'a mut TaggingAssembler<T>,
    tags: &'a ResolvedTags<T>,
    contributions: &'a mut TaggedContributions<T>,
    entity: EntityId,
}

impl<'a, T: Real> LocalAssembly<'a, T> {
    pub fn new(
        assembler: &'a mut TaggingAssembler<T>,
        tags: &'a ResolvedTags<T>,
        contributions: &'a mut TaggedContributions<T>,
        entity: EntityId,
    ) -> Self {
        Self {
            assembler,
            tags,
            contributions,
            entity,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn tags(&self) -> &ResolvedTags<T> {
        self.tags
    }

    pub fn prepare_vector(&mut self, dofs: &[usize]) {
        self.assembler.prepare_vector(dofs);
    }

    pub fn residual_mut(&mut self) -> &mut DVector<T> {
        self.assembler.residual_mut()
    }

    pub fn accumulate(&mut self) {
        self.assembler.accumulate(self.tags, self.contributions);
    }

    pub fn accumulate_tags(&mut self, subset: &[VectorTagId]) {
        self.assembler
            .accumulate_tags(self.tags, subset, self.contributions);
    }

    pub fn assign(&mut self) {
        self.assembler.assign(self.tags, self.contributions);
    }

    pub fn prepare_matrix(&mut self, rows: &[usize], cols: &[usize]) {
        self.assembler.prepare_matrix(rows, cols);
    }

    pub fn jacobian_mut(&mut self) -> &mut DMatrix<T> {
        self.assembler.jacobian_mut()
    }

    pub fn accumulate_jacobian(&mut self) {
        self.assembler
            .accumulate_jacobian(self.tags, self.contributions);
    }

    pub fn process_jacobian_element(&mut self, row: usize, col: usize, value: T, scaling: T) {
        self.assembler
            .process_jacobian_element(self.tags, row, col, value, scaling);
    }

    pub fn add_cached_jacobian(&mut self) {
        self.assembler.add_cached_jacobian(self.contributions);
    }
}
