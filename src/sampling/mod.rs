//! Samplers of preference triples.
//!
//! Both samplers draw the non-preferred item by rejection sampling over all
//! distinct items, and differ in how the (person, preferred item) pair is
//! chosen:
//!
//! - [`PersonSampler`](struct.PersonSampler.html) picks a person uniformly,
//!   then one of their items uniformly. Every person contributes equally,
//!   which approximately maximizes the average per-person AUC.
//! - [`ItemSampler`](struct.ItemSampler.html) picks an interaction
//!   uniformly. Prolific persons and popular items are over-represented
//!   relative to the person sampler.
//!
//! Samplers are immutable once built and can be shared between threads.
use rand::{self, Rng};

use data::PreferenceTriple;
use SamplingError;

mod item;
mod person;

pub use self::item::ItemSampler;
pub use self::person::PersonSampler;

/// Trait describing sources of preference triples.
pub trait SamplableInteractions {
    /// Draw a triple using the supplied random number generator.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PreferenceTriple, SamplingError>;

    /// Draw a triple using the calling thread's random number generator.
    fn get(&self) -> Result<PreferenceTriple, SamplingError> {
        self.sample(&mut rand::thread_rng())
    }
}
