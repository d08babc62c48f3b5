use crate::error::{ConfigurationError, InternalError};
use crate::properties::buffer::{ErasedBuffer, TypedBuffer};
use crate::properties::deferred::{DeferredResolve, ZeroBuffers};
use crate::properties::layout::{LayoutEntry, PropertyLayout};
use crate::properties::ordering::topological_order;
use crate::properties::{
    BlockRestriction, OptionalProperty, Plain, PropertyId, PropertyRef, PropertyValue, Representation,
    RepresentationKind, SpatialClass, TimeState, WithDerivatives, WritableProperty,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Construction parameters shared by every object that uses properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectParameters {
    pub name: String,
    pub class: SpatialClass,
    #[serde(default)]
    pub blocks: BlockRestriction,
    /// Whether the object may read Old and Older property values.
    #[serde(default = "default_allow_stateful")]
    pub allow_stateful: bool,
    /// Appended as `_<suffix>` to the name of every property the object declares.
    #[serde(default)]
    pub declare_suffix: Option<String>,
}

fn default_allow_stateful() -> bool {
    true
}

impl ObjectParameters {
    pub fn new(name: impl Into<String>, class: SpatialClass) -> Self {
        Self {
            name: name.into(),
            class,
            blocks: BlockRestriction::All,
            allow_stateful: true,
            declare_suffix: None,
        }
    }

    pub fn with_blocks(self, blocks: BlockRestriction) -> Self {
        Self { blocks, ..self }
    }

    pub fn with_stateful(self, allow_stateful: bool) -> Self {
        Self { allow_stateful, ..self }
    }

    pub fn with_declare_suffix(self, suffix: impl Into<String>) -> Self {
        Self {
            declare_suffix: Some(suffix.into()),
            ..self
        }
    }
}

struct PropertyEntry {
    name: String,
    class: SpatialClass,
    value_type: TypeId,
    value_type_name: &'static str,
    representation: RepresentationKind,
    factory: fn() -> Box<dyn ErasedBuffer>,
    /// Indices of the declaring objects.
    producers: Vec<usize>,
    history: Option<TimeState>,
}

struct ObjectRecord {
    params: ObjectParameters,
    supplied: BTreeSet<PropertyId>,
    requested: BTreeSet<(PropertyId, TimeState)>,
    optional: BTreeSet<String>,
}

struct DeferredRequest {
    object: usize,
    value_type: TypeId,
    value_type_name: &'static str,
    slot: Arc<dyn DeferredResolve>,
}

/// The registry of all properties declared and requested during construction.
///
/// The registry has two phases. While it is under construction, objects obtain a
/// [`PropertyResolver`] through [`resolver`](Self::resolver) and declare or request properties.
/// [`resolve`](Self::resolve) ends the construction phase: it checks that every request can be
/// satisfied, binds every [`OptionalProperty`], decides which properties retain history and
/// computes the evaluation order of producers. Afterwards, the registry is frozen.
#[derive(Default)]
pub struct PropertyRegistry {
    entries: Vec<PropertyEntry>,
    index: FxHashMap<(String, SpatialClass), PropertyId>,
    objects: Vec<ObjectRecord>,
    object_index: FxHashMap<String, usize>,
    deferred: Vec<DeferredRequest>,
    layout: Option<Arc<PropertyLayout>>,
}

impl std::fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("num_properties", &self.entries.len())
            .field("num_objects", &self.objects.len())
            .field("num_deferred", &self.deferred.len())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.layout.is_some()
    }

    /// The layout computed by [`resolve`](Self::resolve), if the registry has been resolved.
    pub fn layout(&self) -> Option<&Arc<PropertyLayout>> {
        self.layout.as_ref()
    }

    /// Register a new object and return its resolver.
    pub fn resolver(&mut self, params: ObjectParameters) -> eyre::Result<PropertyResolver<'_>> {
        if self.is_resolved() {
            return Err(ConfigurationError::OutsideConstruction {
                object: params.name,
            }
            .into());
        }
        if self.object_index.contains_key(&params.name) {
            return Err(ConfigurationError::DuplicateObject { object: params.name }.into());
        }

        let object = self.objects.len();
        self.object_index.insert(params.name.clone(), object);
        self.objects.push(ObjectRecord {
            params,
            supplied: BTreeSet::new(),
            requested: BTreeSet::new(),
            optional: BTreeSet::new(),
        });
        Ok(PropertyResolver { registry: self, object })
    }

    /// Names of the properties declared by `object`.
    pub fn supplied_properties(&self, object: &str) -> eyre::Result<BTreeSet<String>> {
        let record = self.object(object)?;
        Ok(record
            .supplied
            .iter()
            .map(|id| self.entries[id.0].name.clone())
            .collect())
    }

    /// Names of the properties requested by `object`, including optional requests.
    pub fn requested_properties(&self, object: &str) -> eyre::Result<BTreeSet<String>> {
        let record = self.object(object)?;
        Ok(record
            .requested
            .iter()
            .map(|(id, _)| self.entries[id.0].name.clone())
            .chain(record.optional.iter().cloned())
            .collect())
    }

    /// Whether Old or Older values of the property are requested by anyone.
    ///
    /// Before resolution, only direct requests are taken into account. Optional requests for
    /// history are only known once they are bound.
    pub fn is_stateful(&self, name: &str, class: SpatialClass) -> bool {
        match &self.layout {
            Some(layout) => layout
                .property_id(name, class)
                .map(|id| layout.is_stateful(id))
                .unwrap_or(false),
            None => self
                .index
                .get(&(name.to_string(), class))
                .map(|id| self.entries[id.0].history.is_some())
                .unwrap_or(false),
        }
    }

    /// End the construction phase.
    ///
    /// `max_qp` is the largest number of quadrature points any entity may have. Stores and the
    /// zero buffers of optional properties are sized to it.
    pub fn resolve(&mut self, max_qp: usize) -> eyre::Result<Arc<PropertyLayout>> {
        if self.is_resolved() {
            return Err(InternalError::AlreadyResolved.into());
        }

        self.check_requests()?;
        let bindings = self.match_deferred()?;
        let evaluation_order = self.evaluation_order(&bindings)?;

        // Everything has been validated, so binding can no longer fail half-way through.
        let mut zeros = ZeroBuffers::new(max_qp);
        let mut num_bound = 0;
        for (request, binding) in self.deferred.iter().zip(&bindings) {
            match binding {
                Some(id) => {
                    request.slot.bind_property(*id)?;
                    num_bound += 1;
                }
                None => request.slot.bind_zero(&mut zeros)?,
            }
        }
        for (request, binding) in self.deferred.iter().zip(&bindings) {
            let state = request.slot.state();
            if let (Some(id), true) = (binding, state.is_stateful()) {
                let entry = &mut self.entries[id.0];
                entry.history = entry.history.max(Some(state));
            }
        }

        let entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| LayoutEntry {
                name: entry.name.clone(),
                class: entry.class,
                value_type_name: entry.value_type_name,
                representation: entry.representation,
                factory: entry.factory,
                produced: !entry.producers.is_empty(),
                history: entry.history,
            })
            .collect();
        let num_stateful = entries
            .iter()
            .filter(|entry| entry.history.is_some())
            .count();

        let layout = Arc::new(PropertyLayout {
            entries,
            index: self.index.clone(),
            evaluation_order,
            objects: self
                .objects
                .iter()
                .map(|record| (record.params.name.clone(), record.params.class))
                .collect(),
            max_qp,
        });
        self.layout = Some(Arc::clone(&layout));

        log::debug!(
            "Resolved {} properties ({} stateful) for {} objects, {} optional properties bound, {} zero",
            layout.num_properties(),
            num_stateful,
            self.objects.len(),
            num_bound,
            self.deferred.len() - num_bound
        );
        if zeros.len() > 0 {
            log::debug!("Allocated {} shared zero buffers of length {}", zeros.len(), max_qp);
        }

        Ok(layout)
    }

    fn object(&self, name: &str) -> eyre::Result<&ObjectRecord> {
        let idx = self
            .object_index
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownObject { object: name.to_string() })?;
        Ok(&self.objects[*idx])
    }

    fn check_requests(&self) -> eyre::Result<()> {
        for record in &self.objects {
            for (id, _) in &record.requested {
                let entry = &self.entries[id.0];
                if entry.producers.is_empty() {
                    return Err(ConfigurationError::MissingProperty {
                        object: record.params.name.clone(),
                        property: entry.name.clone(),
                        class: entry.class,
                    }
                    .into());
                }
                if !self.is_covered(record, entry) {
                    return Err(ConfigurationError::BlockRestrictionMismatch {
                        object: record.params.name.clone(),
                        property: entry.name.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Decide, for every deferred request, which property (if any) it binds to.
    fn match_deferred(&self) -> eyre::Result<Vec<Option<PropertyId>>> {
        let mut bindings = Vec::with_capacity(self.deferred.len());
        for request in &self.deferred {
            let record = &self.objects[request.object];
            let key = (request.slot.property().to_string(), record.params.class);
            let binding = match self.index.get(&key) {
                None => None,
                Some(&id) => {
                    let entry = &self.entries[id.0];
                    if entry.value_type != request.value_type {
                        return Err(ConfigurationError::TypeMismatch {
                            object: record.params.name.clone(),
                            property: entry.name.clone(),
                            requested: request.value_type_name,
                            declared: entry.value_type_name,
                        }
                        .into());
                    }
                    if entry.representation != RepresentationKind::Plain {
                        return Err(ConfigurationError::RepresentationMismatch {
                            object: record.params.name.clone(),
                            property: entry.name.clone(),
                        }
                        .into());
                    }
                    let available = !entry.producers.is_empty() && self.is_covered(record, entry);
                    available.then_some(id)
                }
            };
            bindings.push(binding);
        }
        Ok(bindings)
    }

    fn is_covered(&self, record: &ObjectRecord, entry: &PropertyEntry) -> bool {
        let producer_blocks = entry
            .producers
            .iter()
            .map(|&producer| &self.objects[producer].params.blocks);
        record.params.blocks.is_covered_by(producer_blocks)
    }

    /// Order the producing objects of every spatial class so that each runs after the producers
    /// of the Current-state properties it reads.
    fn evaluation_order(&self, bindings: &[Option<PropertyId>]) -> eyre::Result<BTreeMap<SpatialClass, Vec<String>>> {
        let mut current_reads: Vec<BTreeSet<PropertyId>> = self
            .objects
            .iter()
            .map(|record| {
                record
                    .requested
                    .iter()
                    .filter(|(_, state)| *state == TimeState::Current)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .collect();
        for (request, binding) in self.deferred.iter().zip(bindings) {
            if let (Some(id), TimeState::Current) = (binding, request.slot.state()) {
                current_reads[request.object].insert(*id);
            }
        }

        let mut order = BTreeMap::new();
        for class in SpatialClass::ALL {
            // Producers on this class, in registration order.
            let producers: Vec<usize> = (0..self.objects.len())
                .filter(|&idx| {
                    let record = &self.objects[idx];
                    record.params.class == class && !record.supplied.is_empty()
                })
                .collect();
            if producers.is_empty() {
                continue;
            }
            let local_index: FxHashMap<usize, usize> = producers
                .iter()
                .enumerate()
                .map(|(local, &global)| (global, local))
                .collect();

            let mut edges = BTreeSet::new();
            for (consumer_local, &consumer) in producers.iter().enumerate() {
                for id in &current_reads[consumer] {
                    for producer in &self.entries[id.0].producers {
                        if let Some(&producer_local) = local_index.get(producer) {
                            edges.insert((producer_local, consumer_local));
                        }
                    }
                }
            }

            let names = |locals: Vec<usize>| -> Vec<String> {
                locals
                    .into_iter()
                    .map(|local| self.objects[producers[local]].params.name.clone())
                    .collect()
            };
            match topological_order(producers.len(), &edges) {
                Ok(sorted) => {
                    order.insert(class, names(sorted));
                }
                Err(remaining) => {
                    return Err(ConfigurationError::DependencyCycle {
                        class,
                        objects: names(remaining),
                    }
                    .into())
                }
            }
        }
        Ok(order)
    }
}

/// The view of the [`PropertyRegistry`] held by one object during construction.
///
/// All declarations and requests are recorded under the object's name and in the object's
/// spatial class. Requests are not checked against producers until the registry is resolved,
/// so objects may be constructed in any order.
pub struct PropertyResolver<'a> {
    registry: &'a mut PropertyRegistry,
    object: usize,
}

impl<'a> std::fmt::Debug for PropertyResolver<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyResolver")
            .field("object", &self.params().name)
            .finish()
    }
}

impl<'a> PropertyResolver<'a> {
    pub fn object_name(&self) -> &str {
        &self.params().name
    }

    pub fn class(&self) -> SpatialClass {
        self.params().class
    }

    pub fn blocks(&self) -> &BlockRestriction {
        &self.params().blocks
    }

    /// Declare a property produced by this object.
    pub fn declare<V: PropertyValue>(&mut self, name: &str) -> eyre::Result<WritableProperty<V>> {
        self.declare_generic::<V, Plain>(name)
    }

    /// Declare a property produced together with its derivatives.
    pub fn declare_with_derivatives<V: PropertyValue>(
        &mut self,
        name: &str,
    ) -> eyre::Result<WritableProperty<V, WithDerivatives>> {
        self.declare_generic::<V, WithDerivatives>(name)
    }

    pub fn declare_generic<V, R>(&mut self, name: &str) -> eyre::Result<WritableProperty<V, R>>
    where
        V: PropertyValue,
        R: Representation,
    {
        let name = match &self.params().declare_suffix {
            Some(suffix) => format!("{name}_{suffix}"),
            None => name.to_string(),
        };
        let id = self.entry_for::<V, R>(&name)?;

        let registry = &mut *self.registry;
        let record = &registry.objects[self.object];
        let entry = &registry.entries[id.0];
        if let Some(&existing) = entry
            .producers
            .iter()
            .find(|&&producer| registry.objects[producer].params.blocks.overlaps(&record.params.blocks))
        {
            return Err(ConfigurationError::DuplicateDeclaration {
                object: record.params.name.clone(),
                property: name,
                class: record.params.class,
                existing: registry.objects[existing].params.name.clone(),
            }
            .into());
        }

        registry.entries[id.0].producers.push(self.object);
        registry.objects[self.object].supplied.insert(id);
        Ok(WritableProperty::new(id, self.class()))
    }

    /// Request the current value of a property.
    pub fn get<V: PropertyValue>(&mut self, name: &str) -> eyre::Result<PropertyRef<V>> {
        self.get_generic::<V, Plain>(name, TimeState::Current)
    }

    /// Request the value of a property at the previous time step.
    pub fn get_old<V: PropertyValue>(&mut self, name: &str) -> eyre::Result<PropertyRef<V>> {
        self.get_generic::<V, Plain>(name, TimeState::Old)
    }

    /// Request the value of a property two time steps back.
    pub fn get_older<V: PropertyValue>(&mut self, name: &str) -> eyre::Result<PropertyRef<V>> {
        self.get_generic::<V, Plain>(name, TimeState::Older)
    }

    /// Request the current value of a property together with its derivatives.
    pub fn get_with_derivatives<V: PropertyValue>(
        &mut self,
        name: &str,
    ) -> eyre::Result<PropertyRef<V, WithDerivatives>> {
        self.get_generic::<V, WithDerivatives>(name, TimeState::Current)
    }

    /// Request a property in the representation `R` at time state `state`.
    ///
    /// Requests for Old or Older values make the property stateful. Derivatives are only
    /// available for the current state.
    pub fn get_generic<V, R>(&mut self, name: &str, state: TimeState) -> eyre::Result<PropertyRef<V, R>>
    where
        V: PropertyValue,
        R: Representation,
    {
        if state.is_stateful() {
            if R::KIND == RepresentationKind::WithDerivatives {
                return Err(ConfigurationError::DerivativesOfHistoryRequested {
                    object: self.object_name().to_string(),
                    property: name.to_string(),
                    state,
                }
                .into());
            }
            self.check_stateful_allowed(name, state)?;
        }

        let id = self.entry_for::<V, R>(name)?;
        if state.is_stateful() {
            let entry = &mut self.registry.entries[id.0];
            entry.history = entry.history.max(Some(state));
        }
        self.registry.objects[self.object]
            .requested
            .insert((id, state));
        Ok(PropertyRef::new(id, self.class(), state))
    }

    /// Request a property that may not be produced by anyone.
    ///
    /// The returned handle is bound when the registry is resolved: to the property itself if
    /// producers cover all blocks of this object, and to a shared zero buffer otherwise.
    pub fn get_optional<V: PropertyValue>(&mut self, name: &str, state: TimeState) -> eyre::Result<OptionalProperty<V>> {
        if state.is_stateful() {
            self.check_stateful_allowed(name, state)?;
        }
        let property = OptionalProperty::new(self.object_name(), name, self.class(), state);
        self.registry.deferred.push(DeferredRequest {
            object: self.object,
            value_type: TypeId::of::<V>(),
            value_type_name: type_name::<V>(),
            slot: property.resolver(),
        });
        self.registry.objects[self.object]
            .optional
            .insert(name.to_string());
        Ok(property)
    }

    fn params(&self) -> &ObjectParameters {
        &self.registry.objects[self.object].params
    }

    fn check_stateful_allowed(&self, name: &str, state: TimeState) -> eyre::Result<()> {
        if self.params().allow_stateful {
            Ok(())
        } else {
            Err(ConfigurationError::StatefulnessDisabled {
                object: self.object_name().to_string(),
                property: name.to_string(),
                state,
            }
            .into())
        }
    }

    /// Find or create the entry for `name` in this object's spatial class, checking that it
    /// stores values of type `V` in representation `R`.
    fn entry_for<V, R>(&mut self, name: &str) -> eyre::Result<PropertyId>
    where
        V: PropertyValue,
        R: Representation,
    {
        let class = self.class();
        let key = (name.to_string(), class);
        if let Some(&id) = self.registry.index.get(&key) {
            let entry = &self.registry.entries[id.0];
            if entry.value_type != TypeId::of::<V>() {
                return Err(ConfigurationError::TypeMismatch {
                    object: self.object_name().to_string(),
                    property: name.to_string(),
                    requested: type_name::<V>(),
                    declared: entry.value_type_name,
                }
                .into());
            }
            if entry.representation != R::KIND {
                return Err(ConfigurationError::RepresentationMismatch {
                    object: self.object_name().to_string(),
                    property: name.to_string(),
                }
                .into());
            }
            return Ok(id);
        }

        let id = PropertyId(self.registry.entries.len());
        self.registry.entries.push(PropertyEntry {
            name: name.to_string(),
            class,
            value_type: TypeId::of::<V>(),
            value_type_name: type_name::<V>(),
            representation: R::KIND,
            factory: TypedBuffer::<R::Value<V>>::boxed_empty,
            producers: Vec::new(),
            history: None,
        });
        self.registry.index.insert(key, id);
        Ok(id)
    }
}
