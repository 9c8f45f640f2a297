//! Models module.
use std::sync::atomic::{AtomicU32, Ordering};

pub mod factorization;
pub mod stripes;

/// A single component of a latent vector.
///
/// Values are kept as `f32` bit patterns in an atomic so that scoring can
/// read vectors which other threads are concurrently updating. Writers
/// serialize among themselves through lock stripes, so relaxed ordering is
/// sufficient.
#[derive(Debug)]
pub struct Component(AtomicU32);

impl Component {
    fn new(value: f32) -> Self {
        Component(AtomicU32::new(value.to_bits()))
    }

    /// Read the current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

/// A fixed-length latent vector belonging to one person or one item.
#[derive(Debug)]
pub struct LatentVector {
    components: Box<[Component]>,
}

impl LatentVector {
    /// Build a vector holding `values`.
    pub fn from_slice(values: &[f32]) -> Self {
        LatentVector {
            components: values.iter().map(|&value| Component::new(value)).collect(),
        }
    }

    /// Dimensionality of the vector.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the vector has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The components of the vector.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Dot product with another vector of the same length.
    pub fn dot(&self, other: &LatentVector) -> f32 {
        self.components
            .iter()
            .zip(other.components.iter())
            .map(|(x, y)| x.get() * y.get())
            .sum()
    }

    /// Copy the current values out.
    pub fn to_vec(&self) -> Vec<f32> {
        self.components.iter().map(Component::get).collect()
    }
}
