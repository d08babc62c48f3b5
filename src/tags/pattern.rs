use nalgebra_sparse::pattern::SparsityPattern;
use std::collections::BTreeSet;

/// Entity-to-dof connectivity, used to build the sparsity pattern of tagged matrices.
pub trait DofConnectivity {
    fn num_dofs(&self) -> usize;

    fn num_entities(&self) -> usize;

    fn entity_dof_count(&self, entity_index: usize) -> usize;

    /// Write the global dof indices of the entity into `dofs`, which has length
    /// `entity_dof_count(entity_index)`.
    fn populate_entity_dofs(&self, dofs: &mut [usize], entity_index: usize);
}

/// Build the square sparsity pattern coupling every pair of dofs that share an entity.
pub fn assemble_pattern(connectivity: &dyn DofConnectivity) -> SparsityPattern {
    // Each entry is stored exactly once, which keeps memory bounded on meshes where many
    // entities share dofs.
    let mut matrix_entries = BTreeSet::new();
    let mut entity_dofs = Vec::new();
    for i in 0..connectivity.num_entities() {
        entity_dofs.resize(connectivity.entity_dof_count(i), usize::MAX);
        connectivity.populate_entity_dofs(&mut entity_dofs, i);

        for &dof_i in &entity_dofs {
            for &dof_j in &entity_dofs {
                matrix_entries.insert((dof_i, dof_j));
            }
        }
    }

    let num_rows = connectivity.num_dofs();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());

    offsets.push(0);
    for (i, j) in matrix_entries {
        // A while loop, so that consecutive empty rows get their offsets too
        while i + 1 > offsets.len() {
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }

    while offsets.len() < (num_rows + 1) {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
        .expect("Internal error: pattern built from sorted entries must be valid")
}
