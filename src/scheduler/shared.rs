use crate::Real;
use nalgebra::DVector;
use parking_lot::Mutex;

/// A global vector written by several workers at once.
///
/// Element-local assembly never needs this, since workers hand their contributions to the join.
/// It exists for quantities accumulated at dofs that are shared between entities owned by
/// different workers, such as node-based indicators summed over flux faces. Every operation
/// holds the lock only for a single read-modify-write.
#[derive(Debug)]
pub struct SharedAccumulator<T: Real> {
    values: Mutex<DVector<T>>,
}

impl<T: Real> SharedAccumulator<T> {
    pub fn new(len: usize) -> Self {
        Self {
            values: Mutex::new(DVector::zeros(len)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&self, index: usize, value: T) {
        self.values.lock()[index] += value;
    }

    pub fn set(&self, index: usize, value: T) {
        self.values.lock()[index] = value;
    }

    /// Divide the entry at `index` by `divisor`. Zero divisors leave the entry unchanged.
    pub fn normalize(&self, index: usize, divisor: T) {
        if divisor != T::zero() {
            self.values.lock()[index] /= divisor;
        }
    }

    pub fn get(&self, index: usize) -> T {
        self.values.lock()[index]
    }

    /// Zero every entry.
    pub fn reset(&self) {
        self.values.lock().fill(T::zero());
    }

    pub fn into_inner(self) -> DVector<T> {
        self.values.into_inner()
    }
}
