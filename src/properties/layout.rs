use crate::properties::buffer::ErasedBuffer;
use crate::properties::{PropertyId, RepresentationKind, SpatialClass, TimeState};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone)]
pub(crate) struct LayoutEntry {
    pub(crate) name: String,
    pub(crate) class: SpatialClass,
    pub(crate) value_type_name: &'static str,
    pub(crate) representation: RepresentationKind,
    pub(crate) factory: fn() -> Box<dyn ErasedBuffer>,
    pub(crate) produced: bool,
    /// The oldest time state anyone reads, if any history is retained.
    pub(crate) history: Option<TimeState>,
}

impl LayoutEntry {
    /// Number of time states that must be stored for this property.
    pub(crate) fn num_states(&self) -> usize {
        match self.history {
            None => 1,
            Some(state) => state.index() + 1,
        }
    }
}

impl fmt::Debug for LayoutEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutEntry")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("value_type_name", &self.value_type_name)
            .field("representation", &self.representation)
            .field("produced", &self.produced)
            .field("history", &self.history)
            .finish()
    }
}

/// The frozen result of property resolution.
///
/// The layout describes every property known to the registry, which of them retain history,
/// and the order in which materials must be evaluated on each spatial class. It is shared
/// (through an `Arc`) by all stores, the stateful storage and the scheduler.
#[derive(Debug, Clone)]
pub struct PropertyLayout {
    pub(crate) entries: Vec<LayoutEntry>,
    pub(crate) index: FxHashMap<(String, SpatialClass), PropertyId>,
    pub(crate) evaluation_order: BTreeMap<SpatialClass, Vec<String>>,
    pub(crate) objects: FxHashMap<String, SpatialClass>,
    pub(crate) max_qp: usize,
}

impl PropertyLayout {
    pub fn num_properties(&self) -> usize {
        self.entries.len()
    }

    /// The maximum number of quadrature points per entity that stores may be sized to.
    pub fn max_qp(&self) -> usize {
        self.max_qp
    }

    /// The spatial class of an object registered with the registry.
    pub fn object_class(&self, object: &str) -> Option<SpatialClass> {
        self.objects.get(object).copied()
    }

    pub fn property_id(&self, name: &str, class: SpatialClass) -> Option<PropertyId> {
        self.index.get(&(name.to_string(), class)).copied()
    }

    pub fn property_name(&self, id: PropertyId) -> &str {
        &self.entry(id).name
    }

    pub fn property_class(&self, id: PropertyId) -> SpatialClass {
        self.entry(id).class
    }

    pub fn value_type_name(&self, id: PropertyId) -> &'static str {
        self.entry(id).value_type_name
    }

    pub fn representation(&self, id: PropertyId) -> RepresentationKind {
        self.entry(id).representation
    }

    pub fn is_produced(&self, id: PropertyId) -> bool {
        self.entry(id).produced
    }

    /// Whether Old (and possibly Older) values of the property are retained.
    pub fn is_stateful(&self, id: PropertyId) -> bool {
        self.entry(id).history.is_some()
    }

    /// The oldest time state retained for the property.
    pub fn oldest_state(&self, id: PropertyId) -> TimeState {
        self.entry(id).history.unwrap_or(TimeState::Current)
    }

    /// Properties on `class` that retain history, in increasing id order.
    pub fn stateful_properties(&self, class: SpatialClass) -> impl Iterator<Item = PropertyId> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(move |(_, entry)| entry.class == class && entry.history.is_some())
            .map(|(idx, _)| PropertyId(idx))
    }

    pub fn has_stateful_properties(&self, class: SpatialClass) -> bool {
        self.stateful_properties(class).next().is_some()
    }

    /// Names of the producing objects on `class`, in the order they must be evaluated.
    pub fn evaluation_order(&self, class: SpatialClass) -> &[String] {
        self.evaluation_order
            .get(&class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Position of `object` in the evaluation order of `class`.
    pub fn evaluation_rank(&self, class: SpatialClass, object: &str) -> Option<usize> {
        self.evaluation_order(class)
            .iter()
            .position(|name| name == object)
    }

    pub(crate) fn entry(&self, id: PropertyId) -> &LayoutEntry {
        self.entries
            .get(id.0)
            .unwrap_or_else(|| panic!("Internal error: property id {} is not part of the layout", id.0))
    }
}
