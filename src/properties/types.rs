use crate::SubdomainId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Time level of a property value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeState {
    Current,
    Old,
    Older,
}

impl TimeState {
    pub const ALL: [TimeState; 3] = [TimeState::Current, TimeState::Old, TimeState::Older];

    pub fn index(&self) -> usize {
        match self {
            TimeState::Current => 0,
            TimeState::Old => 1,
            TimeState::Older => 2,
        }
    }

    pub fn is_stateful(&self) -> bool {
        *self != TimeState::Current
    }
}

/// The kind of mesh location at which a property is evaluated.
///
/// Each spatial class has its own property namespace: a property declared on `Block` is
/// unrelated to a property of the same name declared on `Boundary`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpatialClass {
    Block,
    Boundary,
    Face,
    Neighbor,
    Interface,
}

impl SpatialClass {
    pub const ALL: [SpatialClass; 5] = [
        SpatialClass::Block,
        SpatialClass::Boundary,
        SpatialClass::Face,
        SpatialClass::Neighbor,
        SpatialClass::Interface,
    ];
}

/// The set of subdomains an object is active on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockRestriction {
    #[default]
    All,
    Blocks(BTreeSet<SubdomainId>),
}

impl BlockRestriction {
    pub fn blocks(blocks: impl IntoIterator<Item = SubdomainId>) -> Self {
        Self::Blocks(blocks.into_iter().collect())
    }

    pub fn contains(&self, subdomain: SubdomainId) -> bool {
        match self {
            Self::All => true,
            Self::Blocks(blocks) => blocks.contains(&subdomain),
        }
    }

    pub fn overlaps(&self, other: &BlockRestriction) -> bool {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => true,
            (Self::Blocks(a), Self::Blocks(b)) => !a.is_disjoint(b),
        }
    }

    /// Whether the union of `producers` covers every subdomain of `self`.
    pub fn is_covered_by<'a>(&self, producers: impl IntoIterator<Item = &'a BlockRestriction>) -> bool {
        let mut covered = BTreeSet::new();
        for producer in producers {
            match producer {
                Self::All => return true,
                Self::Blocks(blocks) => covered.extend(blocks.iter().copied()),
            }
        }
        match self {
            Self::All => false,
            Self::Blocks(blocks) => blocks.is_subset(&covered),
        }
    }
}

/// A value that can be stored per quadrature point.
///
/// The default value is the zero of the type; it is used to fill freshly sized buffers and the
/// shared zero buffers of unresolved optional properties.
pub trait PropertyValue: Clone + Default + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<V> PropertyValue for V where V: Clone + Default + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepresentationKind {
    Plain,
    WithDerivatives,
}

/// Compile-time selection of how a logical property value is stored.
pub trait Representation: Copy + Debug + Send + Sync + 'static {
    const KIND: RepresentationKind;
    type Value<V: PropertyValue>: PropertyValue;
}

/// Values stored as-is.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Plain;

/// Values stored together with their derivatives with respect to the local degrees of freedom.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WithDerivatives;

impl Representation for Plain {
    const KIND: RepresentationKind = RepresentationKind::Plain;
    type Value<V: PropertyValue> = V;
}

impl Representation for WithDerivatives {
    const KIND: RepresentationKind = RepresentationKind::WithDerivatives;
    type Value<V: PropertyValue> = Dual<V>;
}

/// A value together with its derivatives with respect to the local degrees of freedom.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dual<V> {
    pub value: V,
    pub derivatives: Vec<V>,
}

impl<V> Dual<V> {
    pub fn new(value: V, derivatives: Vec<V>) -> Self {
        Self { value, derivatives }
    }
}

/// Index of a declared property within a [`PropertyLayout`](super::PropertyLayout).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub(crate) usize);

impl PropertyId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Read access to one time state of a property.
pub struct PropertyRef<V, R = Plain> {
    pub(crate) id: PropertyId,
    pub(crate) class: SpatialClass,
    pub(crate) state: TimeState,
    marker: PhantomData<fn() -> (V, R)>,
}

impl<V, R> PropertyRef<V, R> {
    pub(crate) fn new(id: PropertyId, class: SpatialClass, state: TimeState) -> Self {
        Self {
            id,
            class,
            state,
            marker: PhantomData,
        }
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    pub fn class(&self) -> SpatialClass {
        self.class
    }

    pub fn state(&self) -> TimeState {
        self.state
    }
}

impl<V, R> Clone for PropertyRef<V, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V, R> Copy for PropertyRef<V, R> {}

impl<V, R> Debug for PropertyRef<V, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRef")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("state", &self.state)
            .finish()
    }
}

/// Write access to the current state of a property, handed out to its producer.
pub struct WritableProperty<V, R = Plain> {
    pub(crate) id: PropertyId,
    pub(crate) class: SpatialClass,
    marker: PhantomData<fn() -> (V, R)>,
}

impl<V, R> WritableProperty<V, R> {
    pub(crate) fn new(id: PropertyId, class: SpatialClass) -> Self {
        Self {
            id,
            class,
            marker: PhantomData,
        }
    }

    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// Read access to the current state of the same property.
    pub fn reader(&self) -> PropertyRef<V, R> {
        PropertyRef::new(self.id, self.class, TimeState::Current)
    }
}

impl<V, R> Clone for WritableProperty<V, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V, R> Copy for WritableProperty<V, R> {}

impl<V, R> Debug for WritableProperty<V, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableProperty")
            .field("id", &self.id)
            .field("class", &self.class)
            .finish()
    }
}
