//! Interaction snapshots and the compressed layout samplers draw from.
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::iter::FromIterator;

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

use siphasher::sip::SipHasher;

use super::{ItemId, PersonId, SamplingError};

/// A single training example: `person` prefers `preferred_item`
/// over `non_preferred_item`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreferenceTriple {
    /// The person.
    pub person: PersonId,
    /// An item the person has interacted with.
    pub preferred_item: ItemId,
    /// An item the person has not interacted with.
    pub non_preferred_item: ItemId,
}

impl PreferenceTriple {
    /// Build a new triple.
    pub fn new(person: PersonId, preferred_item: ItemId, non_preferred_item: ItemId) -> Self {
        PreferenceTriple {
            person,
            preferred_item,
            non_preferred_item,
        }
    }
}

/// An immutable copy of the person -> items mapping of an interaction store.
///
/// Snapshots own their data: later ingestion into the store they were
/// taken from does not affect them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    person_items: HashMap<PersonId, HashSet<ItemId>>,
}

impl Snapshot {
    /// Wrap an owned person -> items mapping.
    pub fn new(person_items: HashMap<PersonId, HashSet<ItemId>>) -> Self {
        Snapshot { person_items }
    }

    /// Number of persons with at least one interaction.
    pub fn num_persons(&self) -> usize {
        self.person_items
            .values()
            .filter(|items| !items.is_empty())
            .count()
    }

    /// Number of distinct (person, item) pairs.
    pub fn num_interactions(&self) -> usize {
        self.person_items.values().map(|items| items.len()).sum()
    }

    /// The items a person has interacted with.
    pub fn items(&self, person_id: PersonId) -> Option<&HashSet<ItemId>> {
        self.person_items.get(&person_id)
    }

    /// Iterate over persons and their item sets, in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (PersonId, &HashSet<ItemId>)> {
        self.person_items
            .iter()
            .map(|(&person_id, items)| (person_id, items))
    }

    /// Split the snapshot into train and test parts, assigning roughly
    /// `test_fraction` of each person's interactions to the test part.
    ///
    /// Assignment hashes the (person, item) pair with keys drawn from `rng`,
    /// so a given pair always lands on the same side for a given key.
    pub fn split<R: Rng>(&self, rng: &mut R, test_fraction: f32) -> (Snapshot, Snapshot) {
        let denominator = 100_000;
        let test_cutoff = (test_fraction * denominator as f32) as u64;

        let (key_0, key_1) = (rng.gen::<u64>(), rng.gen::<u64>());

        let is_test = |person_id: PersonId, item_id: ItemId| {
            let mut hasher = SipHasher::new_with_keys(key_0, key_1);
            hasher.write_usize(person_id);
            hasher.write_usize(item_id);
            hasher.finish() % denominator < test_cutoff
        };

        let mut train = HashMap::new();
        let mut test = HashMap::new();

        for (&person_id, items) in &self.person_items {
            let (test_items, train_items): (HashSet<ItemId>, HashSet<ItemId>) =
                items.iter().partition(|&&item_id| is_test(person_id, item_id));

            if !train_items.is_empty() {
                train.insert(person_id, train_items);
            }
            if !test_items.is_empty() {
                test.insert(person_id, test_items);
            }
        }

        (Snapshot::new(train), Snapshot::new(test))
    }

    /// Convert into the compressed layout used by samplers.
    pub fn to_compressed(&self) -> CompressedInteractions {
        CompressedInteractions::from(self)
    }
}

impl FromIterator<(PersonId, ItemId)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (PersonId, ItemId)>>(iter: T) -> Self {
        let mut person_items: HashMap<PersonId, HashSet<ItemId>> = HashMap::new();

        for (person_id, item_id) in iter {
            person_items
                .entry(person_id)
                .or_insert_with(HashSet::new)
                .insert(item_id);
        }

        Snapshot::new(person_items)
    }
}

/// Interactions laid out in compressed rows, one row per person.
///
/// Persons, each row's items, and the distinct items are all sorted, so
/// samplers built from equal snapshots draw identical triples from
/// identically seeded generators.
#[derive(Clone, Debug)]
pub struct CompressedInteractions {
    person_ids: Vec<PersonId>,
    person_pointers: Vec<usize>,
    item_ids: Vec<ItemId>,
    unique_item_ids: Vec<ItemId>,
}

impl<'a> From<&'a Snapshot> for CompressedInteractions {
    fn from(snapshot: &'a Snapshot) -> CompressedInteractions {
        let mut person_ids: Vec<PersonId> = snapshot
            .iter()
            .filter(|&(_, items)| !items.is_empty())
            .map(|(person_id, _)| person_id)
            .collect();
        person_ids.sort_unstable();

        let mut person_pointers = Vec::with_capacity(person_ids.len() + 1);
        let mut item_ids = Vec::with_capacity(snapshot.num_interactions());
        let mut unique_item_ids = HashSet::new();

        person_pointers.push(0);

        for person_id in &person_ids {
            let start = item_ids.len();

            if let Some(items) = snapshot.items(*person_id) {
                item_ids.extend(items.iter().cloned());
                unique_item_ids.extend(items.iter().cloned());
            }

            item_ids[start..].sort_unstable();
            person_pointers.push(item_ids.len());
        }

        let mut unique_item_ids: Vec<ItemId> = unique_item_ids.into_iter().collect();
        unique_item_ids.sort_unstable();

        CompressedInteractions {
            person_ids,
            person_pointers,
            item_ids,
            unique_item_ids,
        }
    }
}

impl CompressedInteractions {
    /// Number of persons with at least one interaction.
    pub fn num_persons(&self) -> usize {
        self.person_ids.len()
    }

    /// Number of distinct items across all persons.
    pub fn num_items(&self) -> usize {
        self.unique_item_ids.len()
    }

    /// Number of (person, item) pairs.
    pub fn num_interactions(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether there is nothing to sample from.
    pub fn is_empty(&self) -> bool {
        self.person_ids.is_empty() || self.unique_item_ids.is_empty()
    }

    /// The sorted distinct items.
    pub fn unique_item_ids(&self) -> &[ItemId] {
        &self.unique_item_ids
    }

    /// The row at position `row_idx`.
    ///
    /// Panics if `row_idx` is out of bounds.
    pub fn row(&self, row_idx: usize) -> CompressedInteractionsPerson<'_> {
        let start = self.person_pointers[row_idx];
        let stop = self.person_pointers[row_idx + 1];

        CompressedInteractionsPerson {
            person_id: self.person_ids[row_idx],
            item_ids: &self.item_ids[start..stop],
        }
    }

    /// The row for `person_id`, if they have any interactions.
    pub fn get_person(&self, person_id: PersonId) -> Option<CompressedInteractionsPerson<'_>> {
        self.person_ids
            .binary_search(&person_id)
            .ok()
            .map(|row_idx| self.row(row_idx))
    }

    /// Iterate over all rows.
    pub fn iter_persons(&self) -> CompressedInteractionsPersonIterator<'_> {
        CompressedInteractionsPersonIterator {
            interactions: self,
            idx: 0,
        }
    }

    /// Build the row index of every stored pair, aligned with the
    /// pair positions used by `pair`.
    pub(crate) fn pair_rows(&self) -> Vec<usize> {
        let mut rows = Vec::with_capacity(self.item_ids.len());

        for row_idx in 0..self.person_ids.len() {
            let count = self.person_pointers[row_idx + 1] - self.person_pointers[row_idx];
            rows.extend(::std::iter::repeat(row_idx).take(count));
        }

        rows
    }

    /// The item stored at pair position `pair_idx`.
    pub(crate) fn pair_item(&self, pair_idx: usize) -> ItemId {
        self.item_ids[pair_idx]
    }

    /// Draw an item the person in `row` has not interacted with,
    /// by rejection sampling over the distinct items.
    pub(crate) fn sample_negative<R: Rng + ?Sized>(
        &self,
        row: &CompressedInteractionsPerson<'_>,
        item_range: &Uniform<usize>,
        rng: &mut R,
    ) -> Result<ItemId, SamplingError> {
        // A row is a subset of the distinct items, so equal length means
        // the person has interacted with all of them.
        if row.item_ids.len() >= self.unique_item_ids.len() {
            return Err(SamplingError::NoNegativeItems {
                person: row.person_id,
            });
        }

        loop {
            let candidate = self.unique_item_ids[item_range.sample(rng)];

            if !row.contains(candidate) {
                return Ok(candidate);
            }
        }
    }
}

/// The interactions of a single person.
#[derive(Debug, Clone, Copy)]
pub struct CompressedInteractionsPerson<'a> {
    /// The person.
    pub person_id: PersonId,
    /// The person's items, sorted.
    pub item_ids: &'a [ItemId],
}

impl<'a> CompressedInteractionsPerson<'a> {
    /// Whether the person has interacted with `item_id`.
    pub fn contains(&self, item_id: ItemId) -> bool {
        self.item_ids.binary_search(&item_id).is_ok()
    }

    /// Number of items in the row.
    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    /// Whether the row has no items.
    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }
}

/// Iterator over the rows of `CompressedInteractions`.
pub struct CompressedInteractionsPersonIterator<'a> {
    interactions: &'a CompressedInteractions,
    idx: usize,
}

impl<'a> Iterator for CompressedInteractionsPersonIterator<'a> {
    type Item = CompressedInteractionsPerson<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= self.interactions.num_persons() {
            return None;
        }

        let value = self.interactions.row(self.idx);
        self.idx += 1;

        Some(value)
    }
}
