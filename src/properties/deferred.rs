use crate::error::InternalError;
use crate::properties::{PropertyId, PropertyRef, PropertyStore, PropertyValue, SpatialClass, TimeState};
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::cell::Ref;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

/// A property requested optionally.
///
/// The handle is created during construction, before it is known whether any object produces
/// the property. When the registry is resolved, it is bound either to the real property or to a
/// shared all-zero buffer. Reading values before resolution is a programming error and panics.
pub struct OptionalProperty<V> {
    slot: Arc<DeferredSlot<V>>,
}

impl<V> Clone for OptionalProperty<V> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<V: PropertyValue> fmt::Debug for OptionalProperty<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionalProperty")
            .field("object", &self.slot.object)
            .field("property", &self.slot.property)
            .field("state", &self.slot.state)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

enum Binding<V> {
    Property(PropertyRef<V>),
    Zero(Arc<Vec<V>>),
}

struct DeferredSlot<V> {
    object: String,
    property: String,
    class: SpatialClass,
    state: TimeState,
    binding: OnceLock<Binding<V>>,
}

impl<V: PropertyValue> OptionalProperty<V> {
    pub(crate) fn new(object: &str, property: &str, class: SpatialClass, state: TimeState) -> Self {
        Self {
            slot: Arc::new(DeferredSlot {
                object: object.to_string(),
                property: property.to_string(),
                class,
                state,
                binding: OnceLock::new(),
            }),
        }
    }

    pub(crate) fn resolver(&self) -> Arc<dyn DeferredResolve> {
        self.slot.clone()
    }

    pub fn property_name(&self) -> &str {
        &self.slot.property
    }

    pub fn state(&self) -> TimeState {
        self.slot.state
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.binding.get().is_some()
    }

    /// Whether the property was bound to the shared zero buffer.
    ///
    /// # Panics
    ///
    /// Panics if the property has not been resolved yet.
    pub fn is_zero(&self) -> bool {
        matches!(self.binding(), Binding::Zero(_))
    }

    /// The underlying property, if a producer was found during resolution.
    pub fn property(&self) -> Option<PropertyRef<V>> {
        match self.binding() {
            Binding::Property(property) => Some(*property),
            Binding::Zero(_) => None,
        }
    }

    /// Values of the property at the quadrature points of the entity currently loaded in `store`.
    pub fn values<'a>(&'a self, store: &'a PropertyStore) -> OptionalValues<'a, V> {
        match self.binding() {
            Binding::Property(property) => OptionalValues::Property(store.get(property)),
            Binding::Zero(zeros) => {
                let n_qp = store.num_qp();
                assert!(
                    n_qp <= zeros.len(),
                    "Internal error: store holds {n_qp} quadrature points, but zero buffers only hold {}",
                    zeros.len()
                );
                OptionalValues::Zero(&zeros[..n_qp])
            }
        }
    }

    fn binding(&self) -> &Binding<V> {
        self.slot.binding.get().unwrap_or_else(|| {
            panic!(
                "Internal error: optional property `{}` requested by `{}` was read before properties were resolved",
                self.slot.property, self.slot.object
            )
        })
    }
}

/// Values of an [`OptionalProperty`], borrowed either from a store or from a zero buffer.
pub enum OptionalValues<'a, V> {
    Property(Ref<'a, [V]>),
    Zero(&'a [V]),
}

impl<'a, V> Deref for OptionalValues<'a, V> {
    type Target = [V];

    fn deref(&self) -> &[V] {
        match self {
            OptionalValues::Property(values) => values,
            OptionalValues::Zero(values) => values,
        }
    }
}

/// Zero-filled buffers shared by every optional property of the same value type.
#[derive(Debug)]
pub(crate) struct ZeroBuffers {
    len: usize,
    buffers: FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ZeroBuffers {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            len,
            buffers: FxHashMap::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buffers.len()
    }

    fn get_or_create<V: PropertyValue>(&mut self) -> Arc<Vec<V>> {
        let len = self.len;
        let erased = self
            .buffers
            .entry(TypeId::of::<V>())
            .or_insert_with(|| Arc::new(vec![V::default(); len]))
            .clone();
        erased
            .downcast::<Vec<V>>()
            .unwrap_or_else(|_| panic!("Internal error: zero buffer registered under the wrong type"))
    }
}

/// Type-erased view of a deferred slot, used by the registry to bind it.
pub(crate) trait DeferredResolve: Send + Sync {
    fn property(&self) -> &str;

    fn state(&self) -> TimeState;

    fn bind_property(&self, id: PropertyId) -> eyre::Result<()>;

    fn bind_zero(&self, zeros: &mut ZeroBuffers) -> eyre::Result<()>;
}

impl<V: PropertyValue> DeferredSlot<V> {
    fn bind(&self, binding: Binding<V>) -> eyre::Result<()> {
        self.binding.set(binding).map_err(|_| InternalError::ProxyResolvedTwice {
            object: self.object.clone(),
            property: self.property.clone(),
        })?;
        Ok(())
    }
}

impl<V: PropertyValue> DeferredResolve for DeferredSlot<V> {
    fn property(&self) -> &str {
        &self.property
    }

    fn state(&self) -> TimeState {
        self.state
    }

    fn bind_property(&self, id: PropertyId) -> eyre::Result<()> {
        self.bind(Binding::Property(PropertyRef::new(id, self.class, self.state)))
    }

    fn bind_zero(&self, zeros: &mut ZeroBuffers) -> eyre::Result<()> {
        self.bind(Binding::Zero(zeros.get_or_create::<V>()))
    }
}
