//! Accumulating positive interactions before sampling.
//!
//! Two stores are provided. [`HashInteractions`](struct.HashInteractions.html)
//! is a plain hash map and needs exclusive access for every insert.
//! [`ConcurrentInteractions`](struct.ConcurrentInteractions.html) shards its
//! map so that many threads can ingest at once through a shared reference.
//!
//! Neither store is sampled directly: samplers are built from a
//! [`Snapshot`](../data/struct.Snapshot.html), so a store can keep ingesting
//! after a sampler has been built without affecting it.
use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use data::Snapshot;
use sampling::{ItemSampler, PersonSampler};
use {ItemId, PersonId, SamplingError};

/// Trait describing stores of positive person-item interactions.
pub trait InteractionStore {
    /// Record that `person_id` interacted with `item_id`.
    /// Repeated interactions collapse into one.
    fn add_interaction(&mut self, person_id: PersonId, item_id: ItemId);
    /// Remove all records for the person. O(1).
    fn remove_person(&mut self, person_id: PersonId);
    /// Remove all records for the item. O(number of persons), as it
    /// traverses every person's interactions.
    fn remove_item(&mut self, item_id: ItemId);
    /// Copy the current state of the store.
    fn snapshot(&self) -> Snapshot;

    /// Build a sampler that gives every person equal odds.
    fn person_sampler(&self) -> Result<PersonSampler, SamplingError> {
        PersonSampler::new(&self.snapshot())
    }

    /// Build a sampler that gives every interaction equal odds.
    fn item_sampler(&self) -> Result<ItemSampler, SamplingError> {
        ItemSampler::new(&self.snapshot())
    }
}

/// Interaction store backed by a single hash map. Does not support
/// concurrent inserts.
#[derive(Clone, Debug, Default)]
pub struct HashInteractions {
    person_items: HashMap<PersonId, HashSet<ItemId>>,
}

impl HashInteractions {
    /// Build an empty store.
    pub fn new() -> Self {
        HashInteractions::default()
    }

    /// Number of persons with at least one stored interaction.
    pub fn num_persons(&self) -> usize {
        self.person_items
            .values()
            .filter(|items| !items.is_empty())
            .count()
    }
}

impl InteractionStore for HashInteractions {
    fn add_interaction(&mut self, person_id: PersonId, item_id: ItemId) {
        self.person_items
            .entry(person_id)
            .or_insert_with(HashSet::new)
            .insert(item_id);
    }

    fn remove_person(&mut self, person_id: PersonId) {
        self.person_items.remove(&person_id);
    }

    fn remove_item(&mut self, item_id: ItemId) {
        for items in self.person_items.values_mut() {
            items.remove(&item_id);
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.person_items.clone())
    }
}

/// Interaction store that accepts inserts from many threads at once.
///
/// Each person's item set is only ever touched while holding the lock of
/// the map shard it lives in, so readers never observe a half-applied
/// insert or removal.
#[derive(Debug, Default)]
pub struct ConcurrentInteractions {
    person_items: DashMap<PersonId, HashSet<ItemId>>,
}

impl ConcurrentInteractions {
    /// Build an empty store.
    pub fn new() -> Self {
        ConcurrentInteractions::default()
    }

    /// Number of persons with at least one stored interaction.
    pub fn num_persons(&self) -> usize {
        self.person_items
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .count()
    }

    /// Record that `person_id` interacted with `item_id`.
    /// Safe to call from many threads.
    pub fn add_interaction(&self, person_id: PersonId, item_id: ItemId) {
        self.person_items
            .entry(person_id)
            .or_insert_with(HashSet::new)
            .insert(item_id);
    }

    /// Remove all records for the person.
    pub fn remove_person(&self, person_id: PersonId) {
        self.person_items.remove(&person_id);
    }

    /// Remove all records for the item. Locks every shard in turn.
    pub fn remove_item(&self, item_id: ItemId) {
        for mut entry in self.person_items.iter_mut() {
            entry.value_mut().remove(&item_id);
        }
    }

    /// Copy the current state of the store.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(
            self.person_items
                .iter()
                .map(|entry| (*entry.key(), entry.value().clone()))
                .collect(),
        )
    }
}

impl InteractionStore for ConcurrentInteractions {
    fn add_interaction(&mut self, person_id: PersonId, item_id: ItemId) {
        ConcurrentInteractions::add_interaction(self, person_id, item_id)
    }

    fn remove_person(&mut self, person_id: PersonId) {
        ConcurrentInteractions::remove_person(self, person_id)
    }

    fn remove_item(&mut self, item_id: ItemId) {
        ConcurrentInteractions::remove_item(self, item_id)
    }

    fn snapshot(&self) -> Snapshot {
        ConcurrentInteractions::snapshot(self)
    }
}
