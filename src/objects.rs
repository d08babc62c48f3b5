//! Capability traits of the objects evaluated in the element loop.
//!
//! Objects do not inherit from a framework base class. They are constructed with a
//! [`PropertyResolver`](crate::properties::PropertyResolver) from which they obtain typed
//! property handles, and they receive a [`LocalAssembly`] when they have local contributions to
//! tag.
use crate::error::ConfigurationError;
use crate::properties::{ObjectParameters, PropertyLayout, PropertyStore, SpatialClass};
use crate::scheduler::EntityData;
use crate::tags::{LocalAssembly, ResolvedTags, TagRegistry, TagSelection};
use crate::{Real, SubdomainId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything an object may read while evaluating one entity.
pub struct EvaluationContext<'a, T: Real> {
    pub entity: &'a EntityData<T>,
    pub properties: &'a PropertyStore,
}

impl<'a, T: Real> EvaluationContext<'a, T> {
    pub fn num_qp(&self) -> usize {
        self.entity.num_qp()
    }
}

/// An object producing properties at quadrature points.
pub trait Material<T: Real>: Send + Sync {
    fn params(&self) -> &ObjectParameters;

    fn compute_qp_properties(&self, context: &EvaluationContext<'_, T>, qp: usize) -> eyre::Result<()>;

    /// Set the initial values of the stateful properties this material produces.
    fn init_qp_stateful_properties(&self, _context: &EvaluationContext<'_, T>, _qp: usize) -> eyre::Result<()> {
        Ok(())
    }

    fn compute_properties(&self, context: &EvaluationContext<'_, T>) -> eyre::Result<()> {
        for qp in 0..context.num_qp() {
            self.compute_qp_properties(context, qp)?;
        }
        Ok(())
    }
}

/// An object contributing to tagged residuals and Jacobians.
pub trait Kernel<T: Real>: Send + Sync {
    fn params(&self) -> &ObjectParameters;

    fn tags(&self) -> &TagSelection;

    fn compute_residual(&self, context: &EvaluationContext<'_, T>, local: &mut LocalAssembly<'_, T>) -> eyre::Result<()>;

    fn compute_jacobian(&self, _context: &EvaluationContext<'_, T>, _local: &mut LocalAssembly<'_, T>) -> eyre::Result<()> {
        Ok(())
    }
}

/// How the per-entity values of a [`Reducer`] are combined.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    Sum,
    Min,
    Max,
}

impl Reduction {
    pub fn combine<T: Real>(&self, a: T, b: T) -> T {
        match self {
            Reduction::Sum => a + b,
            Reduction::Min => a.min(b),
            Reduction::Max => a.max(b),
        }
    }

    /// Combine two optional partial results. `None` means that no entity contributed.
    pub fn combine_partial<T: Real>(&self, a: Option<T>, b: Option<T>) -> Option<T> {
        match (a, b) {
            (Some(a), Some(b)) => Some(self.combine(a, b)),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

/// An object computing a global scalar (a postprocessor).
pub trait Reducer<T: Real>: Send + Sync {
    fn params(&self) -> &ObjectParameters;

    fn reduction(&self) -> Reduction;

    /// The value of this entity, or `None` if it does not contribute.
    fn execute(&self, context: &EvaluationContext<'_, T>) -> eyre::Result<Option<T>>;
}

/// The objects taking part in element loops, in evaluation order.
pub struct ObjectWarehouse<T: Real> {
    layout: Arc<PropertyLayout>,
    materials: Vec<Box<dyn Material<T>>>,
    kernels: Vec<(Box<dyn Kernel<T>>, ResolvedTags<T>)>,
    reducers: Vec<Box<dyn Reducer<T>>>,
}

impl<T: Real> std::fmt::Debug for ObjectWarehouse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let materials: Vec<_> = self.materials.iter().map(|m| &m.params().name).collect();
        let kernels: Vec<_> = self.kernels.iter().map(|(k, _)| &k.params().name).collect();
        let reducers: Vec<_> = self.reducers.iter().map(|r| &r.params().name).collect();
        f.debug_struct("ObjectWarehouse")
            .field("materials", &materials)
            .field("kernels", &kernels)
            .field("reducers", &reducers)
            .finish()
    }
}

impl<T: Real> ObjectWarehouse<T> {
    pub fn new(layout: Arc<PropertyLayout>) -> Self {
        Self {
            layout,
            materials: Vec::new(),
            kernels: Vec::new(),
            reducers: Vec::new(),
        }
    }

    pub fn layout(&self) -> &Arc<PropertyLayout> {
        &self.layout
    }

    /// Add a material. It must have been registered with the property registry the layout was
    /// resolved from.
    pub fn add_material(&mut self, material: Box<dyn Material<T>>) -> eyre::Result<()> {
        let params = material.params();
        if self.layout.object_class(&params.name) != Some(params.class) {
            return Err(ConfigurationError::UnknownObject {
                object: params.name.clone(),
            }
            .into());
        }
        self.materials.push(material);
        let layout = &self.layout;
        // Stable, so materials that produce nothing keep their insertion order at the end.
        self.materials.sort_by_key(|material| {
            let params = material.params();
            layout
                .evaluation_rank(params.class, &params.name)
                .unwrap_or(usize::MAX)
        });
        Ok(())
    }

    /// Add a kernel, resolving its tag selection against `tags`.
    pub fn add_kernel(&mut self, kernel: Box<dyn Kernel<T>>, tags: &TagRegistry) -> eyre::Result<()> {
        let resolved = kernel.tags().resolve(&kernel.params().name, tags)?;
        self.kernels.push((kernel, resolved));
        Ok(())
    }

    pub fn add_reducer(&mut self, reducer: Box<dyn Reducer<T>>) {
        self.reducers.push(reducer);
    }

    pub fn num_reducers(&self) -> usize {
        self.reducers.len()
    }

    /// Materials active on `subdomain` of `class`, in evaluation order.
    pub fn materials(&self, class: SpatialClass, subdomain: SubdomainId) -> impl Iterator<Item = &dyn Material<T>> {
        self.materials
            .iter()
            .map(|material| -> &dyn Material<T> { material.as_ref() })
            .filter(move |material| is_active(material.params(), class, subdomain))
    }

    pub fn kernels(
        &self,
        class: SpatialClass,
        subdomain: SubdomainId,
    ) -> impl Iterator<Item = (&dyn Kernel<T>, &ResolvedTags<T>)> {
        self.kernels
            .iter()
            .map(|(kernel, tags)| -> (&dyn Kernel<T>, &ResolvedTags<T>) { (kernel.as_ref(), tags) })
            .filter(move |(kernel, _)| is_active(kernel.params(), class, subdomain))
    }

    /// All reducers, active or not. Results are reported per reducer index.
    pub(crate) fn reducers(&self) -> &[Box<dyn Reducer<T>>] {
        &self.reducers
    }
}

fn is_active(params: &ObjectParameters, class: SpatialClass, subdomain: SubdomainId) -> bool {
    params.class == class && params.blocks.contains(subdomain)
}
