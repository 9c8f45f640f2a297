use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use super::SamplableInteractions;
use data::{CompressedInteractions, PreferenceTriple, Snapshot};
use SamplingError;

/// Samples a person with equal odds, then one of their items with equal
/// odds, then an item they have not interacted with.
#[derive(Clone, Debug)]
pub struct PersonSampler {
    interactions: CompressedInteractions,
    person_range: Uniform<usize>,
    item_range: Uniform<usize>,
}

impl PersonSampler {
    /// Build a sampler from a snapshot of interactions.
    pub fn new(snapshot: &Snapshot) -> Result<Self, SamplingError> {
        let interactions = snapshot.to_compressed();

        if interactions.is_empty() {
            return Err(SamplingError::EmptyDomain);
        }

        debug!(
            "Person sampler over {} persons and {} items",
            interactions.num_persons(),
            interactions.num_items()
        );

        Ok(PersonSampler {
            person_range: Uniform::new(0, interactions.num_persons()),
            item_range: Uniform::new(0, interactions.num_items()),
            interactions,
        })
    }

    /// The interactions this sampler draws from.
    pub fn interactions(&self) -> &CompressedInteractions {
        &self.interactions
    }
}

impl SamplableInteractions for PersonSampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PreferenceTriple, SamplingError> {
        let row = self.interactions.row(self.person_range.sample(rng));
        let preferred_item = row.item_ids[rng.gen_range(0..row.len())];
        let non_preferred_item = self
            .interactions
            .sample_negative(&row, &self.item_range, rng)?;

        Ok(PreferenceTriple::new(
            row.person_id,
            preferred_item,
            non_preferred_item,
        ))
    }
}
