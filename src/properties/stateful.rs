use crate::error::InternalError;
use crate::properties::buffer::{downcast_values, ErasedBuffer};
use crate::properties::{
    PropertyId, PropertyLayout, PropertyRef, PropertyStore, PropertyValue, Representation, SpatialClass, TimeState,
};
use crate::EntityId;
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Values of every stateful property on one entity, at one time state.
#[derive(Debug, Clone, Default)]
pub struct StatefulRecord {
    // Sorted by property id.
    pub(crate) buffers: Vec<(PropertyId, Box<dyn ErasedBuffer>)>,
}

impl StatefulRecord {
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn values<V: PropertyValue>(&self, id: PropertyId) -> Option<&[V]> {
        self.buffer(id).and_then(|buffer| downcast_values(buffer))
    }

    fn buffer(&self, id: PropertyId) -> Option<&dyn ErasedBuffer> {
        self.buffers
            .binary_search_by_key(&id, |(id, _)| *id)
            .ok()
            .map(|idx| &*self.buffers[idx].1)
    }

    fn buffer_mut(&mut self, id: PropertyId) -> Option<&mut Box<dyn ErasedBuffer>> {
        self.buffers
            .binary_search_by_key(&id, |(id, _)| *id)
            .ok()
            .map(move |idx| &mut self.buffers[idx].1)
    }

    fn empty(layout: &PropertyLayout, class: SpatialClass) -> Self {
        let buffers = layout
            .stateful_properties(class)
            .map(|id| (id, (layout.entry(id).factory)()))
            .collect();
        Self { buffers }
    }
}

/// Current, Old and Older values of the stateful properties of one entity.
#[derive(Debug, Clone)]
pub struct EntityHistory {
    pub(crate) current: StatefulRecord,
    pub(crate) old: StatefulRecord,
    pub(crate) older: StatefulRecord,
}

impl EntityHistory {
    pub fn record(&self, state: TimeState) -> &StatefulRecord {
        match state {
            TimeState::Current => &self.current,
            TimeState::Old => &self.old,
            TimeState::Older => &self.older,
        }
    }

    fn record_mut(&mut self, state: TimeState) -> &mut StatefulRecord {
        match state {
            TimeState::Current => &mut self.current,
            TimeState::Old => &mut self.old,
            TimeState::Older => &mut self.older,
        }
    }

    /// The values of `property` at the time state of the reference.
    pub fn values<V, R>(&self, property: &PropertyRef<V, R>) -> Option<&[R::Value<V>]>
    where
        V: PropertyValue,
        R: Representation,
    {
        self.record(property.state).values(property.id)
    }
}

/// One stateful buffer in a [`Checkpoint`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub property: String,
    pub state: TimeState,
    pub class: SpatialClass,
    pub entity: EntityId,
    pub values: serde_json::Value,
}

/// Restart data for all stateful properties.
///
/// Records are sorted by spatial class, entity, property id and time state, so that two
/// checkpoints of the same history compare equal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub records: Vec<CheckpointRecord>,
}

/// The history of every stateful property on every entity.
///
/// Workers read from the storage while evaluating entities and hand back the current values they
/// computed; the storage is only modified in the sequential join, and shifted forward in time
/// explicitly with [`shift`](Self::shift).
#[derive(Debug, Clone)]
pub struct StatefulStorage {
    layout: Arc<PropertyLayout>,
    histories: BTreeMap<(SpatialClass, EntityId), EntityHistory>,
}

impl StatefulStorage {
    pub fn new(layout: Arc<PropertyLayout>) -> Self {
        Self {
            layout,
            histories: BTreeMap::new(),
        }
    }

    pub fn layout(&self) -> &Arc<PropertyLayout> {
        &self.layout
    }

    /// Number of entities with recorded history.
    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn history(&self, class: SpatialClass, entity: EntityId) -> Option<&EntityHistory> {
        self.histories.get(&(class, entity))
    }

    /// Record the initial values of an entity: Current, Old and Older all equal `record`.
    pub fn commit_initial(&mut self, class: SpatialClass, entity: EntityId, record: StatefulRecord) {
        let history = EntityHistory {
            current: record.clone(),
            old: record.clone(),
            older: record,
        };
        self.histories.insert((class, entity), history);
    }

    /// Replace the current values of an entity.
    pub fn commit(&mut self, class: SpatialClass, entity: EntityId, record: StatefulRecord) -> eyre::Result<()> {
        let history = self
            .histories
            .get_mut(&(class, entity))
            .ok_or(InternalError::MissingHistory { entity, class })?;
        history.current = record;
        Ok(())
    }

    /// Load the Old and Older values of `entity` into `store`.
    pub fn restore(&self, entity: EntityId, store: &mut PropertyStore) -> eyre::Result<()> {
        let class = store.class();
        let history = self
            .history(class, entity)
            .ok_or(InternalError::MissingHistory { entity, class })?;
        store.load_history(history);
        Ok(())
    }

    /// Advance one time step: Older takes the values of Old, Old the values of Current.
    pub fn shift(&mut self) {
        for history in self.histories.values_mut() {
            std::mem::swap(&mut history.older, &mut history.old);
            history.old.clone_from(&history.current);
        }
        log::trace!("Shifted stateful history of {} entities", self.histories.len());
    }

    pub fn checkpoint(&self) -> eyre::Result<Checkpoint> {
        let mut records = Vec::new();
        for (&(class, entity), history) in &self.histories {
            let current_ids = history.current.buffers.iter().map(|(id, _)| *id);
            for id in current_ids {
                for state in TimeState::ALL {
                    if let Some(buffer) = history.record(state).buffer(id) {
                        let property = self.layout.property_name(id).to_string();
                        let values = buffer
                            .to_json()
                            .wrap_err_with(|| format!("failed to checkpoint property `{property}` ({state:?})"))?;
                        records.push(CheckpointRecord {
                            property,
                            state,
                            class,
                            entity,
                            values,
                        });
                    }
                }
            }
        }
        Ok(Checkpoint { records })
    }

    /// Replace the whole history by the contents of `checkpoint`.
    ///
    /// On error, the storage is left unchanged.
    pub fn restore_checkpoint(&mut self, checkpoint: &Checkpoint) -> eyre::Result<()> {
        let mut histories = BTreeMap::new();
        for record in &checkpoint.records {
            let id = self
                .layout
                .property_id(&record.property, record.class)
                .filter(|&id| self.layout.is_stateful(id))
                .ok_or_else(|| InternalError::UnknownRestartProperty {
                    property: record.property.clone(),
                    class: record.class,
                })?;
            let layout = &self.layout;
            let history = histories
                .entry((record.class, record.entity))
                .or_insert_with(|| {
                    let empty = StatefulRecord::empty(layout, record.class);
                    EntityHistory {
                        current: empty.clone(),
                        old: empty.clone(),
                        older: empty,
                    }
                });
            let buffer = history
                .record_mut(record.state)
                .buffer_mut(id)
                .expect("Internal error: stateful record lacks a stateful property");
            buffer.load_json(&record.values).wrap_err_with(|| {
                format!(
                    "failed to restore property `{}` ({:?}) of entity {}",
                    record.property, record.state, record.entity
                )
            })?;
        }
        self.histories = histories;
        log::debug!("Restored stateful history of {} entities", self.histories.len());
        Ok(())
    }
}
