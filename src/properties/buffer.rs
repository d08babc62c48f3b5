use crate::properties::PropertyValue;
use eyre::WrapErr;
use std::any::{type_name, Any};
use std::fmt::Debug;

/// A type-erased, resizable per-quadrature-point array.
///
/// Buffers of different value types live side by side in a [`PropertyStore`](super::PropertyStore);
/// the typed handles recover the concrete type by downcasting.
pub trait ErasedBuffer: Any + Send + Sync + Debug {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize to `len` entries, filling new entries with the zero of the value type.
    fn resize(&mut self, len: usize);

    /// Overwrite the contents with those of `other`.
    ///
    /// # Panics
    ///
    /// Panics if `other` stores a different value type.
    fn copy_from(&mut self, other: &dyn ErasedBuffer);

    fn clone_boxed(&self) -> Box<dyn ErasedBuffer>;

    fn value_type_name(&self) -> &'static str;

    fn to_json(&self) -> eyre::Result<serde_json::Value>;

    /// Replace the contents with values deserialized from `value`.
    fn load_json(&mut self, value: &serde_json::Value) -> eyre::Result<()>;
}

impl Clone for Box<dyn ErasedBuffer> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct TypedBuffer<V> {
    pub(crate) values: Vec<V>,
}

impl<V: PropertyValue> TypedBuffer<V> {
    pub(crate) fn boxed_empty() -> Box<dyn ErasedBuffer> {
        Box::new(Self { values: Vec::new() })
    }
}

impl<V: PropertyValue> ErasedBuffer for TypedBuffer<V> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn resize(&mut self, len: usize) {
        self.values.resize(len, V::default());
    }

    fn copy_from(&mut self, other: &dyn ErasedBuffer) {
        let other = downcast_values::<V>(other).unwrap_or_else(|| {
            panic!(
                "Internal error: cannot copy buffer of type `{}` into buffer of type `{}`",
                other.value_type_name(),
                type_name::<V>()
            )
        });
        self.values.clear();
        self.values.extend_from_slice(other);
    }

    fn clone_boxed(&self) -> Box<dyn ErasedBuffer> {
        Box::new(self.clone())
    }

    fn value_type_name(&self) -> &'static str {
        type_name::<V>()
    }

    fn to_json(&self) -> eyre::Result<serde_json::Value> {
        serde_json::to_value(&self.values)
            .wrap_err_with(|| format!("failed to serialize values of type `{}`", type_name::<V>()))
    }

    fn load_json(&mut self, value: &serde_json::Value) -> eyre::Result<()> {
        self.values = serde_json::from_value(value.clone())
            .wrap_err_with(|| format!("failed to deserialize values of type `{}`", type_name::<V>()))?;
        Ok(())
    }
}

/// Recover the typed values of an erased buffer, if it stores values of type `V`.
pub(crate) fn downcast_values<V: PropertyValue>(buffer: &dyn ErasedBuffer) -> Option<&[V]> {
    buffer
        .as_any()
        .downcast_ref::<TypedBuffer<V>>()
        .map(|buffer| buffer.values.as_slice())
}

pub(crate) fn downcast_values_mut<V: PropertyValue>(buffer: &mut dyn ErasedBuffer) -> Option<&mut [V]> {
    buffer
        .as_any_mut()
        .downcast_mut::<TypedBuffer<V>>()
        .map(|buffer| buffer.values.as_mut_slice())
}
