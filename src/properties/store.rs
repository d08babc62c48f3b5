use crate::properties::buffer::{downcast_values, downcast_values_mut, ErasedBuffer};
use crate::properties::{
    EntityHistory, PropertyId, PropertyLayout, PropertyRef, PropertyValue, Representation, SpatialClass,
    StatefulRecord, TimeState, WritableProperty,
};
use std::cell::{Ref, RefCell, RefMut};
use std::sync::Arc;

/// Per-quadrature-point values of every property on one spatial class, for one entity at a time.
///
/// A store is worker-private scratch: the scheduler keeps one per thread and spatial class and
/// reuses it for every entity the worker evaluates. Each buffer sits behind its own `RefCell`, so
/// any number of readers or exactly one writer may access a buffer at any time. Violations are
/// programming errors and panic.
#[derive(Debug)]
pub struct PropertyStore {
    layout: Arc<PropertyLayout>,
    class: SpatialClass,
    num_qp: usize,
    // Indexed by property id. `None` for properties on other spatial classes.
    slots: Vec<Option<Vec<RefCell<Box<dyn ErasedBuffer>>>>>,
}

impl PropertyStore {
    pub fn new(layout: Arc<PropertyLayout>, class: SpatialClass) -> Self {
        let slots = layout
            .entries
            .iter()
            .map(|entry| {
                (entry.class == class).then(|| {
                    (0..entry.num_states())
                        .map(|_| RefCell::new((entry.factory)()))
                        .collect()
                })
            })
            .collect();
        Self {
            layout,
            class,
            num_qp: 0,
            slots,
        }
    }

    pub fn class(&self) -> SpatialClass {
        self.class
    }

    pub fn layout(&self) -> &Arc<PropertyLayout> {
        &self.layout
    }

    pub fn num_qp(&self) -> usize {
        self.num_qp
    }

    /// Resize every buffer to `num_qp` quadrature points.
    ///
    /// Newly added entries are zero. Existing entries keep their values.
    ///
    /// # Panics
    ///
    /// Panics if `num_qp` exceeds the maximum number of quadrature points of the layout.
    pub fn resize(&mut self, num_qp: usize) {
        assert!(
            num_qp <= self.layout.max_qp(),
            "Internal error: {num_qp} quadrature points exceed the maximum of {} given at resolution",
            self.layout.max_qp()
        );
        self.num_qp = num_qp;
        for states in self.slots.iter_mut().flatten() {
            for buffer in states {
                buffer.get_mut().resize(num_qp);
            }
        }
    }

    /// Read the values of a property.
    ///
    /// # Panics
    ///
    /// Panics if the property is currently being written, if it belongs to another spatial class
    /// or if the requested time state is not retained.
    pub fn get<V, R>(&self, property: &PropertyRef<V, R>) -> Ref<'_, [R::Value<V>]>
    where
        V: PropertyValue,
        R: Representation,
    {
        let cell = self.cell(property.id, property.class, property.state);
        let buffer = cell.try_borrow().unwrap_or_else(|_| {
            panic!(
                "Internal error: property `{}` is read while it is being written",
                self.layout.property_name(property.id)
            )
        });
        Ref::map(buffer, |buffer| {
            downcast_values::<R::Value<V>>(&**buffer)
                .expect("Internal error: property buffer holds a different value type")
        })
    }

    /// Write the current values of a property.
    ///
    /// # Panics
    ///
    /// Panics if the property is currently being read or written, or if it belongs to another
    /// spatial class.
    pub fn get_mut<V, R>(&self, property: &WritableProperty<V, R>) -> RefMut<'_, [R::Value<V>]>
    where
        V: PropertyValue,
        R: Representation,
    {
        let cell = self.cell(property.id, property.class, TimeState::Current);
        let buffer = cell.try_borrow_mut().unwrap_or_else(|_| {
            panic!(
                "Internal error: property `{}` is written while it is being accessed",
                self.layout.property_name(property.id)
            )
        });
        RefMut::map(buffer, |buffer| {
            downcast_values_mut::<R::Value<V>>(&mut **buffer)
                .expect("Internal error: property buffer holds a different value type")
        })
    }

    /// Snapshot of the current values of every property that retains history.
    pub fn current_record(&self) -> StatefulRecord {
        let buffers = self
            .layout
            .stateful_properties(self.class)
            .map(|id| {
                let buffer = self
                    .cell(id, self.class, TimeState::Current)
                    .try_borrow()
                    .expect("Internal error: property buffer is borrowed outside of evaluation");
                (id, buffer.clone_boxed())
            })
            .collect();
        StatefulRecord { buffers }
    }

    /// Load the Old and Older values of the entity described by `history`.
    pub(crate) fn load_history(&mut self, history: &EntityHistory) {
        let num_qp = self.num_qp;
        for (state, record) in [(TimeState::Old, &history.old), (TimeState::Older, &history.older)] {
            for (id, values) in &record.buffers {
                if let Some(cell) = self.slot_mut(*id).get_mut(state.index()) {
                    let buffer = cell.get_mut();
                    buffer.copy_from(&**values);
                    buffer.resize(num_qp);
                }
            }
        }
    }

    fn cell(&self, id: PropertyId, class: SpatialClass, state: TimeState) -> &RefCell<Box<dyn ErasedBuffer>> {
        assert_eq!(
            class, self.class,
            "Internal error: property `{}` accessed in a store for another spatial class",
            self.layout.property_name(id)
        );
        let states = self.slots[id.0]
            .as_ref()
            .expect("Internal error: property is not part of this store");
        states.get(state.index()).unwrap_or_else(|| {
            panic!(
                "Internal error: the {state:?} state of property `{}` is not retained",
                self.layout.property_name(id)
            )
        })
    }

    fn slot_mut(&mut self, id: PropertyId) -> &mut Vec<RefCell<Box<dyn ErasedBuffer>>> {
        self.slots[id.0]
            .as_mut()
            .expect("Internal error: property is not part of this store")
    }
}
