use crate::properties::SpatialClass;
use crate::{EntityId, Real, SubdomainId};
use nalgebra::{DMatrix, DVector};

/// Shape function data of one variable on one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableData<T: Real> {
    /// Global dof indices of the variable on the entity.
    pub dofs: Vec<usize>,
    /// Shape function values, `n_dofs x n_qp`.
    pub phi: DMatrix<T>,
    /// Shape function gradients at every quadrature point, each `dim x n_dofs`.
    pub grad_phi: Vec<DMatrix<T>>,
    /// Interpolated values at the quadrature points.
    pub values: Vec<T>,
    /// Interpolated gradients at the quadrature points.
    pub gradients: Vec<DVector<T>>,
}

impl<T: Real> Default for VariableData<T> {
    fn default() -> Self {
        Self {
            dofs: Vec::new(),
            phi: DMatrix::zeros(0, 0),
            grad_phi: Vec::new(),
            values: Vec::new(),
            gradients: Vec::new(),
        }
    }
}

impl<T: Real> VariableData<T> {
    pub fn num_dofs(&self) -> usize {
        self.dofs.len()
    }
}

/// Geometry, quadrature and variable data of the entity being evaluated.
///
/// One instance lives in the scratch of every worker and is overwritten by
/// [`EntitySource::reinit`] for each entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityData<T: Real> {
    pub id: EntityId,
    pub subdomain: SubdomainId,
    /// Quadrature weights times the Jacobian determinant.
    pub jxw: Vec<T>,
    pub variables: Vec<VariableData<T>>,
}

impl<T: Real> Default for EntityData<T> {
    fn default() -> Self {
        Self {
            id: 0,
            subdomain: 0,
            jxw: Vec::new(),
            variables: Vec::new(),
        }
    }
}

impl<T: Real> EntityData<T> {
    pub fn num_qp(&self) -> usize {
        self.jxw.len()
    }

    /// # Panics
    ///
    /// Panics if the entity has no variable with the given index.
    pub fn variable(&self, index: usize) -> &VariableData<T> {
        self.variables
            .get(index)
            .unwrap_or_else(|| panic!("entity {} has no variable {index}", self.id))
    }
}

/// A range of mesh entities of one spatial class.
///
/// The source is the only way the element loop learns about the mesh: it reports how many
/// entities there are and fills in the data of the entity at a given position in the range.
pub trait EntitySource<T: Real>: Sync {
    fn num_entities(&self) -> usize;

    fn spatial_class(&self) -> SpatialClass;

    /// Fill `data` with the geometry, quadrature and variable data of the entity at `index`.
    fn reinit(&self, index: usize, data: &mut EntityData<T>) -> eyre::Result<()>;
}
