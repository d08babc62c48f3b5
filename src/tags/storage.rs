use crate::tags::{MatrixTagId, TagRegistry, VectorTagId};
use crate::Real;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;

/// Global tagged vectors and matrices.
///
/// Storage is allocated per tag on demand: the solver layer allocates exactly the tags its
/// current solve needs, and contributions to tags without storage are dropped.
#[derive(Debug, Clone)]
pub struct TaggedStorage<T: Real> {
    num_dofs: usize,
    vectors: Vec<Option<DVector<T>>>,
    matrices: Vec<Option<CsrMatrix<T>>>,
}

impl<T: Real> TaggedStorage<T> {
    /// Storage for all tags currently in `registry`, none of them allocated.
    pub fn new(registry: &TagRegistry, num_dofs: usize) -> Self {
        Self {
            num_dofs,
            vectors: vec![None; registry.num_vector_tags()],
            matrices: vec![None; registry.num_matrix_tags()],
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Allocate a zero vector for `tag`. An existing vector is zeroed.
    pub fn allocate_vector(&mut self, tag: VectorTagId) {
        let num_dofs = self.num_dofs;
        *self.vector_slot_mut(tag) = Some(DVector::zeros(num_dofs));
    }

    /// Allocate a zero matrix with the given pattern for `tag`.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is not `num_dofs x num_dofs`.
    pub fn allocate_matrix(&mut self, tag: MatrixTagId, pattern: SparsityPattern) {
        assert_eq!(pattern.major_dim(), self.num_dofs, "Pattern must have one row per dof");
        assert_eq!(pattern.minor_dim(), self.num_dofs, "Pattern must have one column per dof");
        let values = vec![T::zero(); pattern.nnz()];
        let matrix = CsrMatrix::try_from_pattern_and_values(pattern, values)
            .expect("Internal error: value count matches the pattern by construction");
        *self.matrix_slot_mut(tag) = Some(matrix);
    }

    pub fn has_vector(&self, tag: VectorTagId) -> bool {
        self.vector_slot(tag).is_some()
    }

    pub fn has_matrix(&self, tag: MatrixTagId) -> bool {
        self.matrix_slot(tag).is_some()
    }

    pub fn vector(&self, tag: VectorTagId) -> Option<&DVector<T>> {
        self.vector_slot(tag).as_ref()
    }

    pub fn vector_mut(&mut self, tag: VectorTagId) -> Option<&mut DVector<T>> {
        self.vector_slot_mut(tag).as_mut()
    }

    pub fn matrix(&self, tag: MatrixTagId) -> Option<&CsrMatrix<T>> {
        self.matrix_slot(tag).as_ref()
    }

    /// Zero every allocated vector and matrix.
    pub fn zero(&mut self) {
        for vector in self.vectors.iter_mut().flatten() {
            vector.fill(T::zero());
        }
        for matrix in self.matrices.iter_mut().flatten() {
            matrix.values_mut().fill(T::zero());
        }
    }

    /// Zeroed worker-private buffers mirroring the allocated tags.
    pub fn new_contributions(&self) -> TaggedContributions<T> {
        TaggedContributions {
            vectors: self
                .vectors
                .iter()
                .map(|vector| vector.as_ref().map(|v| DVector::zeros(v.len())))
                .collect(),
            matrices: self
                .matrices
                .iter()
                .map(|matrix| {
                    matrix.as_ref().map(|m| {
                        let mut zero = m.clone();
                        zero.values_mut().fill(T::zero());
                        zero
                    })
                })
                .collect(),
            assignments: Vec::new(),
        }
    }

    /// Add the summed contributions of `contributions` to the global storage.
    ///
    /// Assignments are not applied, see [`apply_assignments`](Self::apply_assignments).
    pub fn add_contributions(&mut self, contributions: &TaggedContributions<T>) {
        assert_eq!(contributions.vectors.len(), self.vectors.len(), "Internal error: contribution vector tag count");
        assert_eq!(contributions.matrices.len(), self.matrices.len(), "Internal error: contribution matrix tag count");
        for (global, partial) in self.vectors.iter_mut().zip(&contributions.vectors) {
            if let (Some(global), Some(partial)) = (global, partial) {
                *global += partial;
            }
        }
        for (global, partial) in self.matrices.iter_mut().zip(&contributions.matrices) {
            if let (Some(global), Some(partial)) = (global, partial) {
                for (a, b) in global.values_mut().iter_mut().zip(partial.values()) {
                    *a += *b;
                }
            }
        }
    }

    /// Overwrite entries with the assignments recorded in `contributions`, in recording order.
    pub fn apply_assignments(&mut self, contributions: &TaggedContributions<T>) {
        for &(tag, dof, value) in &contributions.assignments {
            if let Some(vector) = self.vector_slot_mut(tag) {
                vector[dof] = value;
            }
        }
    }

    fn vector_slot(&self, tag: VectorTagId) -> &Option<DVector<T>> {
        self.vectors
            .get(tag.0)
            .unwrap_or_else(|| panic!("Internal error: vector tag id {} is out of bounds", tag.0))
    }

    fn vector_slot_mut(&mut self, tag: VectorTagId) -> &mut Option<DVector<T>> {
        self.vectors
            .get_mut(tag.0)
            .unwrap_or_else(|| panic!("Internal error: vector tag id {} is out of bounds", tag.0))
    }

    fn matrix_slot(&self, tag: MatrixTagId) -> &Option<CsrMatrix<T>> {
        self.matrices
            .get(tag.0)
            .unwrap_or_else(|| panic!("Internal error: matrix tag id {} is out of bounds", tag.0))
    }

    fn matrix_slot_mut(&mut self, tag: MatrixTagId) -> &mut Option<CsrMatrix<T>> {
        self.matrices
            .get_mut(tag.0)
            .unwrap_or_else(|| panic!("Internal error: matrix tag id {} is out of bounds", tag.0))
    }
}

/// Contributions gathered by one worker, merged into [`TaggedStorage`] in the join.
#[derive(Debug, Clone)]
pub struct TaggedContributions<T: Real> {
    vectors: Vec<Option<DVector<T>>>,
    matrices: Vec<Option<CsrMatrix<T>>>,
    assignments: Vec<(VectorTagId, usize, T)>,
}

impl<T: Real> TaggedContributions<T> {
    pub fn vector(&self, tag: VectorTagId) -> Option<&DVector<T>> {
        self.vectors
            .get(tag.0)
            .unwrap_or_else(|| panic!("Internal error: vector tag id {} is out of bounds", tag.0))
            .as_ref()
    }

    pub fn num_assignments(&self) -> usize {
        self.assignments.len()
    }

    pub(crate) fn add_vector(&mut self, tag: VectorTagId, dofs: &[usize], local: &DVector<T>, scaling: T, abs: bool) {
        assert_eq!(dofs.len(), local.len(), "Internal error: local residual does not match its dofs");
        if let Some(vector) = self.vector_slot_mut(tag) {
            for (&dof, &value) in dofs.iter().zip(local.iter()) {
                let value = if abs { value.abs() } else { value };
                vector[dof] += scaling * value;
            }
        }
    }

    pub(crate) fn assign_vector(&mut self, tag: VectorTagId, dofs: &[usize], local: &DVector<T>, scaling: T) {
        assert_eq!(dofs.len(), local.len(), "Internal error: local residual does not match its dofs");
        if self.vector_slot_mut(tag).is_some() {
            self.assignments
                .extend(dofs.iter().zip(local.iter()).map(|(&dof, &value)| (tag, dof, scaling * value)));
        }
    }

    pub(crate) fn add_matrix(
        &mut self,
        tag: MatrixTagId,
        row_dofs: &[usize],
        col_dofs: &[usize],
        local: &DMatrix<T>,
        scaling: T,
    ) {
        assert_eq!(local.nrows(), row_dofs.len(), "Internal error: local Jacobian does not match its rows");
        assert_eq!(local.ncols(), col_dofs.len(), "Internal error: local Jacobian does not match its columns");
        if let Some(matrix) = self.matrix_slot_mut(tag) {
            for (local_row, &row) in row_dofs.iter().enumerate() {
                let mut csr_row = matrix.row_mut(row);
                let (columns, values) = csr_row.cols_and_values_mut();
                for (local_col, &col) in col_dofs.iter().enumerate() {
                    let idx = columns
                        .binary_search(&col)
                        .unwrap_or_else(|_| panic!("Internal error: entry ({row}, {col}) is not in the sparsity pattern"));
                    values[idx] += scaling * local[(local_row, local_col)];
                }
            }
        }
    }

    pub(crate) fn add_matrix_entry(&mut self, tag: MatrixTagId, row: usize, col: usize, value: T) {
        if let Some(matrix) = self.matrix_slot_mut(tag) {
            let mut csr_row = matrix.row_mut(row);
            let (columns, values) = csr_row.cols_and_values_mut();
            let idx = columns
                .binary_search(&col)
                .unwrap_or_else(|_| panic!("Internal error: entry ({row}, {col}) is not in the sparsity pattern"));
            values[idx] += value;
        }
    }

    fn vector_slot_mut(&mut self, tag: VectorTagId) -> Option<&mut DVector<T>> {
        self.vectors
            .get_mut(tag.0)
            .unwrap_or_else(|| panic!("Internal error: vector tag id {} is out of bounds", tag.0))
            .as_mut()
    }

    fn matrix_slot_mut(&mut self, tag: MatrixTagId) -> Option<&mut CsrMatrix<T>> {
        self.matrices
            .get_mut(tag.0)
            .unwrap_or_else(|| panic!("Internal error: matrix tag id {} is out of bounds", tag.0))
            .as_mut()
    }
}
