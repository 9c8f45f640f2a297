#![deny(missing_docs)]
//! # bpr
//!
//! `bpr` learns latent factors for people and items from implicit,
//! positive-only interaction data using Bayesian Personalised Ranking:
//! for every observed (person, item) interaction the model is trained to
//! score that item above a randomly drawn item the person has not
//! interacted with.
//!
//! The crate is split into three parts:
//!
//! - [`interactions`](interactions/index.html) accumulates positive
//!   interactions, either from a single thread or concurrently;
//! - [`sampling`](sampling/index.html) turns a snapshot of those
//!   interactions into samplers of preference triples;
//! - [`models`](models/index.html) holds the factorization model, which can
//!   be updated from many threads at once.
//!
//! ## Example
//!
//! ```rust
//! # extern crate bpr;
//! # extern crate rand;
//! # extern crate rand_xorshift;
//! # use rand::{Rng, SeedableRng};
//! # use rand_xorshift::XorShiftRng;
//! use bpr::interactions::{HashInteractions, InteractionStore};
//! use bpr::models::factorization::Hyperparameters;
//!
//! let mut rng = XorShiftRng::seed_from_u64(42);
//! let mut interactions = HashInteractions::new();
//!
//! for person in 0..100 {
//!     for _ in 0..10 {
//!         let item = rng.gen_range(0..25) * 2 + person % 2;
//!         interactions.add_interaction(person, item);
//!     }
//! }
//!
//! let sampler = interactions.person_sampler().unwrap();
//!
//! let model = Hyperparameters::new(8)
//!     .learning_rate(0.05)
//!     .l2_penalty(0.01)
//!     .num_threads(1)
//!     .rng(rng)
//!     .build()
//!     .unwrap();
//!
//! let loss = model.fit(&sampler, 20_000).unwrap();
//! let auc = model.area_under_curve(&sampler, 1_000).unwrap();
//!
//! println!("Loss {} and AUC {}", loss, auc);
//! ```
extern crate csv;
extern crate dashmap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate itertools;
#[macro_use]
extern crate log;
extern crate parking_lot;
extern crate rand;
extern crate rand_distr;
extern crate rand_xorshift;
extern crate rayon;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate siphasher;

#[cfg(test)]
extern crate serde_json;

pub mod data;
pub mod datasets;
pub mod evaluation;
pub mod interactions;
pub mod models;
pub mod sampling;

/// Alias for person indices.
pub type PersonId = usize;
/// Alias for item indices.
pub type ItemId = usize;

/// Prediction error types.
#[derive(Debug, Fail)]
pub enum PredictionError {
    /// Failed prediction due to numerical issues.
    #[fail(display = "Invalid prediction value: non-finite or not a number.")]
    InvalidPredictionValue,
}

/// Errors raised when drawing preference triples.
#[derive(Debug, Fail, PartialEq, Eq)]
pub enum SamplingError {
    /// There are no persons or no items to sample from.
    #[fail(display = "Cannot sample from an empty domain: no persons or no items.")]
    EmptyDomain,
    /// The person has interacted with every known item, so no
    /// non-preferred item can be drawn for them.
    #[fail(display = "Person {} has interacted with every known item.", person)]
    NoNegativeItems {
        /// The saturated person.
        person: PersonId,
    },
}

/// Errors raised when building a model from invalid hyperparameters.
#[derive(Debug, Fail, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The latent dimensionality must be positive.
    #[fail(display = "Latent dimensionality must be positive.")]
    InvalidLatentDim,
    /// A lock stripe count must be positive.
    #[fail(display = "Number of {} lock stripes must be positive.", kind)]
    InvalidStripeCount {
        /// Which stripe array was misconfigured: `"person"` or `"item"`.
        kind: &'static str,
    },
}

/// Trait describing models that can score items for a person.
pub trait RankingModel {
    /// Score `item_ids` for `person_id`: higher scores mean the person
    /// is more likely to prefer the item.
    fn scores(&self, person_id: PersonId, item_ids: &[ItemId])
        -> Result<Vec<f32>, PredictionError>;
}
