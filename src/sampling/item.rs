use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use super::SamplableInteractions;
use data::{CompressedInteractions, PreferenceTriple, Snapshot};
use SamplingError;

/// Samples a (person, item) interaction with equal odds, then an item the
/// person has not interacted with.
///
/// Popular items and active persons are oversampled relative to
/// [`PersonSampler`](struct.PersonSampler.html).
#[derive(Clone, Debug)]
pub struct ItemSampler {
    interactions: CompressedInteractions,
    // Row of every pair, aligned with the pair positions in `interactions`.
    pair_rows: Vec<usize>,
    pair_range: Uniform<usize>,
    item_range: Uniform<usize>,
}

impl ItemSampler {
    /// Build a sampler from a snapshot of interactions.
    pub fn new(snapshot: &Snapshot) -> Result<Self, SamplingError> {
        let interactions = snapshot.to_compressed();

        if interactions.is_empty() {
            return Err(SamplingError::EmptyDomain);
        }

        debug!(
            "Item sampler over {} interactions of {} persons and {} items",
            interactions.num_interactions(),
            interactions.num_persons(),
            interactions.num_items()
        );

        Ok(ItemSampler {
            pair_rows: interactions.pair_rows(),
            pair_range: Uniform::new(0, interactions.num_interactions()),
            item_range: Uniform::new(0, interactions.num_items()),
            interactions,
        })
    }

    /// The interactions this sampler draws from.
    pub fn interactions(&self) -> &CompressedInteractions {
        &self.interactions
    }
}

impl SamplableInteractions for ItemSampler {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PreferenceTriple, SamplingError> {
        let pair_idx = self.pair_range.sample(rng);
        let row = self.interactions.row(self.pair_rows[pair_idx]);
        let preferred_item = self.interactions.pair_item(pair_idx);
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
