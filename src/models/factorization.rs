//! Bayesian Personalised Ranking matrix factorization that can be trained
//! from many threads at once.
//!
//! Every person and item owns a latent vector, created the first time the
//! ID is seen. A person's score for an item is the dot product of their
//! vectors. Each update takes a preference triple and moves the three
//! vectors involved along the gradient of the logistic pairwise loss
//! `-ln sigmoid(score(preferred) - score(non_preferred))`, with an L2 penalty.
//!
//! # Parallelism
//!
//! Updates take `&self` and are safe to run concurrently. Vectors are
//! guarded by two fixed rings of locks (one for persons, one for items).
//! An update holds the person's stripe and the stripes of both items for
//! the duration of the gradient step; item stripes are always acquired
//! higher index first, which rules out deadlock between updates. Updates
//! touching different stripes proceed in parallel without any global
//! ordering, in the style of Hogwild.
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{self, Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_xorshift::XorShiftRng;
use rayon;
use rayon::prelude::*;

use super::stripes::LockStripes;
use super::LatentVector;
use data::PreferenceTriple;
use sampling::SamplableInteractions;
use {ConfigurationError, ItemId, PersonId, PredictionError, RankingModel, SamplingError};

/// Default number of lock stripes for persons and for items.
pub const DEFAULT_STRIPES: usize = 128;

fn logistic_loss(score_diff: f32) -> f32 {
    if score_diff > 0.0 {
        (-score_diff).exp().ln_1p()
    } else {
        -score_diff + score_diff.exp().ln_1p()
    }
}

/// Hyperparameters describing the factorization model.
///
/// The ratio between and scale of the item and person stripe counts
/// determine how much time concurrent fitting spends blocked: more stripes
/// mean fewer unrelated IDs contend for the same lock, at the cost of
/// memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hyperparameters {
    latent_dim: usize,
    learning_rate: f32,
    l2_penalty: f32,
    item_stripes: usize,
    person_stripes: usize,
    num_threads: usize,
    rng: XorShiftRng,
}

impl Hyperparameters {
    /// Build new hyperparameters with latent dimensionality `latent_dim`.
    pub fn new(latent_dim: usize) -> Self {
        Hyperparameters {
            latent_dim,
            learning_rate: 0.05,
            l2_penalty: 0.05,
            item_stripes: DEFAULT_STRIPES,
            person_stripes: DEFAULT_STRIPES,
            num_threads: rayon::current_num_threads(),
            rng: XorShiftRng::from_seed(rand::thread_rng().gen()),
        }
    }

    /// Set the learning rate used by `fit`.
    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the L2 penalty used by `fit`.
    pub fn l2_penalty(mut self, l2_penalty: f32) -> Self {
        self.l2_penalty = l2_penalty;
        self
    }

    /// Set the number of lock stripes covering item vectors.
    pub fn item_stripes(mut self, item_stripes: usize) -> Self {
        self.item_stripes = item_stripes;
        self
    }

    /// Set the number of lock stripes covering person vectors.
    pub fn person_stripes(mut self, person_stripes: usize) -> Self {
        self.person_stripes = person_stripes;
        self
    }

    /// Set the number of threads `fit` spreads updates over.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Set the random number generator. It initializes latent vectors and
    /// seeds the per-thread generators of `fit`.
    pub fn rng(mut self, rng: XorShiftRng) -> Self {
        self.rng = rng;
        self
    }

    /// Build the model.
    pub fn build(self) -> Result<BprFactorization, ConfigurationError> {
        if self.latent_dim == 0 {
            return Err(ConfigurationError::InvalidLatentDim);
        }
        if self.item_stripes == 0 {
            return Err(ConfigurationError::InvalidStripeCount { kind: "item" });
        }
        if self.person_stripes == 0 {
            return Err(ConfigurationError::InvalidStripeCount { kind: "person" });
        }

        Ok(BprFactorization {
            latent_dim: self.latent_dim,
            learning_rate: self.learning_rate,
            l2_penalty: self.l2_penalty,
            num_threads: self.num_threads.max(1),
            rng: Mutex::new(self.rng),
            person_factors: DashMap::new(),
            item_factors: DashMap::new(),
            person_locks: LockStripes::new(self.person_stripes),
            item_locks: LockStripes::new(self.item_stripes),
        })
    }
}

/// Return the vector for `id`, creating it with `init` if absent.
///
/// The map is checked, the covering stripe locked, and the map checked
/// again before inserting, so concurrent callers agree on a single vector.
fn get_or_init<F>(
    factors: &DashMap<usize, Arc<LatentVector>>,
    locks: &LockStripes,
    id: usize,
    init: F,
) -> Arc<LatentVector>
where
    F: FnOnce() -> LatentVector,
{
    if let Some(factor) = factors.get(&id) {
        return Arc::clone(factor.value());
    }

    let _guard = locks.lock(id);

    if let Some(factor) = factors.get(&id) {
        return Arc::clone(factor.value());
    }

    let factor = Arc::new(init());
    factors.insert(id, Arc::clone(&factor));

    factor
}

/// Implicit factorization model trained with Bayesian Personalised Ranking.
#[derive(Debug)]
pub struct BprFactorization {
    latent_dim: usize,
    learning_rate: f32,
    l2_penalty: f32,
    num_threads: usize,
    // Only used to initialize new vectors and seed training threads.
    rng: Mutex<XorShiftRng>,
    person_factors: DashMap<PersonId, Arc<LatentVector>>,
    item_factors: DashMap<ItemId, Arc<LatentVector>>,
    person_locks: LockStripes,
    item_locks: LockStripes,
}

impl BprFactorization {
    /// Build a model with latent dimensionality `latent_dim` and default
    /// hyperparameters.
    pub fn new(latent_dim: usize) -> Result<Self, ConfigurationError> {
        Hyperparameters::new(latent_dim).build()
    }

    /// Latent dimensionality of the model.
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Number of persons with a latent vector.
    pub fn num_persons(&self) -> usize {
        self.person_factors.len()
    }

    /// Number of items with a latent vector.
    pub fn num_items(&self) -> usize {
        self.item_factors.len()
    }

    /// A copy of the person's latent vector, if it has been created.
    pub fn person_vector(&self, person_id: PersonId) -> Option<Vec<f32>> {
        self.person_factors
            .get(&person_id)
            .map(|factor| factor.value().to_vec())
    }

    /// A copy of the item's latent vector, if it has been created.
    pub fn item_vector(&self, item_id: ItemId) -> Option<Vec<f32>> {
        self.item_factors
            .get(&item_id)
            .map(|factor| factor.value().to_vec())
    }

    /// A vector of independent standard-normal values.
    fn new_factor(&self) -> LatentVector {
        let values: Vec<f32> = {
            let mut rng = self.rng.lock();
            (0..self.latent_dim)
                .map(|_| rng.sample::<f32, _>(StandardNormal))
                .collect()
        };

        LatentVector::from_slice(&values)
    }

    fn person_factor(&self, person_id: PersonId) -> Arc<LatentVector> {
        get_or_init(&self.person_factors, &self.person_locks, person_id, || {
            self.new_factor()
        })
    }

    fn item_factor(&self, item_id: ItemId) -> Arc<LatentVector> {
        get_or_init(&self.item_factors, &self.item_locks, item_id, || {
            self.new_factor()
        })
    }

    /// Score `item_id` for `person_id`: higher means more preferred.
    ///
    /// Vectors for unseen IDs are initialized on the way.
    pub fn predict(&self, person_id: PersonId, item_id: ItemId) -> f32 {
        let item = self.item_factor(item_id);
        let person = self.person_factor(person_id);

        person.dot(&item)
    }

    /// Perform one stochastic gradient descent step on `triple`.
    ///
    /// Safe to call from many threads at once.
    pub fn update(&self, triple: &PreferenceTriple, learning_rate: f32, l2_penalty: f32) {
        self.step(triple, learning_rate, l2_penalty);
    }

    /// Gradient step returning the loss before the step.
    fn step(&self, triple: &PreferenceTriple, learning_rate: f32, l2_penalty: f32) -> f32 {
        // Initialization takes the stripes itself and they are not
        // reentrant, so it has to happen before they are held below.
        let person = self.person_factor(triple.person);
        let preferred = self.item_factor(triple.preferred_item);
        let non_preferred = self.item_factor(triple.non_preferred_item);

        // Person stripe strictly before item stripes. Guards release in
        // reverse order of declaration.
        let _person_guard = self.person_locks.lock(triple.person);
        let _item_guard = self
            .item_locks
            .lock_pair(triple.preferred_item, triple.non_preferred_item);

        let score_diff = person.dot(&preferred) - person.dot(&non_preferred);
        let weight = 1.0 / (1.0 + score_diff.exp());

        for (person_component, preferred_component, non_preferred_component) in izip!(
            person.components(),
            preferred.components(),
            non_preferred.components()
        ) {
            let wuf = person_component.get();
            let hpf = preferred_component.get();
            let hnf = non_preferred_component.get();

            person_component.set(wuf - learning_rate * (weight * (hnf - hpf) + l2_penalty * wuf));
            preferred_component.set(hpf - learning_rate * (-weight * wuf + l2_penalty * hpf));
            non_preferred_component.set(hnf - learning_rate * (weight * wuf + l2_penalty * hnf));
        }

        logistic_loss(score_diff)
    }

    /// Run `num_updates` gradient steps on triples drawn from `sampler`,
    /// spread over the configured number of threads, using the configured
    /// learning rate and L2 penalty.
    ///
    /// Each thread draws from its own generator, seeded from the model's
    /// generator, so a single-threaded fit is reproducible. Returns the
    /// mean loss over all steps.
    pub fn fit<S: SamplableInteractions + Sync>(
        &self,
        sampler: &S,
        num_updates: usize,
    ) -> Result<f32, SamplingError> {
        let num_partitions = self.num_threads.min(num_updates).max(1);

        let partitions: Vec<(usize, XorShiftRng)> = {
            let mut rng = self.rng.lock();
            (0..num_partitions)
                .map(|idx| {
                    let remainder = if idx < num_updates % num_partitions {
                        1
                    } else {
                        0
                    };
                    let num_steps = num_updates / num_partitions + remainder;

                    (num_steps, XorShiftRng::from_seed(rng.gen()))
                })
                .collect()
        };

        let losses: Vec<f32> = partitions
            .into_par_iter()
            .enumerate()
            .map(|(partition_idx, (num_steps, mut thread_rng))| {
                let mut loss_value = 0.0;

                for _ in 0..num_steps {
                    let triple = sampler.sample(&mut thread_rng)?;
                    loss_value += self.step(&triple, self.learning_rate, self.l2_penalty);
                }

                debug!(
                    "Partition {} finished {} updates with loss {}",
                    partition_idx, num_steps, loss_value
                );

                Ok::<f32, SamplingError>(loss_value)
            })
            .collect::<Result<_, SamplingError>>()?;

        let loss = losses.iter().sum::<f32>() / num_updates.max(1) as f32;

        info!(
            "Fitted {} updates on {} threads with mean loss {}",
            num_updates, num_partitions, loss
        );

        Ok(loss)
    }

    /// The fraction of `iterations` triples drawn from `sampler` for which
    /// the preferred item scores strictly higher than the non-preferred
    /// one (the area under the ROC curve).
    pub fn area_under_curve<S: SamplableInteractions>(
        &self,
        sampler: &S,
        iterations: usize,
    ) -> Result<f32, SamplingError> {
        self.area_under_curve_with_rng(sampler, iterations, &mut rand::thread_rng())
    }

    /// As `area_under_curve`, drawing triples with the supplied generator.
    pub fn area_under_curve_with_rng<S: SamplableInteractions, R: Rng + ?Sized>(
        &self,
        sampler: &S,
        iterations: usize,
        rng: &mut R,
    ) -> Result<f32, SamplingError> {
        if iterations == 0 {
            return Ok(0.0);
        }

        let mut successes = 0;

        for _ in 0..iterations {
            let triple = sampler.sample(rng)?;

            if self.predict(triple.person, triple.preferred_item)
                > self.predict(triple.person, triple.non_preferred_item)
            {
                successes += 1;
            }
        }

        Ok(successes as f32 / iterations as f32)
    }
}

impl RankingModel for BprFactorization {
    fn scores(
        &self,
        person_id: PersonId,
        item_ids: &[ItemId],
    ) -> Result<Vec<f32>, PredictionError> {
        item_ids
            .iter()
            .map(|&item_id| {
                let prediction = self.predict(person_id, item_id);

                if prediction.is_finite() {
                    Ok(prediction)
                } else {
                    Err(PredictionError::InvalidPredictionValue)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use rayon::prelude::*;
    use serde_json;

    use super::*;
    use interactions::{HashInteractions, InteractionStore};

    fn model(latent_dim: usize, seed: u64) -> BprFactorization {
        Hyperparameters::new(latent_dim)
            .rng(XorShiftRng::seed_from_u64(seed))
            .build()
            .unwrap()
    }

    fn eventually<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);

        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }

        condition()
    }

    fn triple_vectors(model: &BprFactorization) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
        (
            model.person_vector(0).unwrap(),
            model.item_vector(1).unwrap(),
            model.item_vector(2).unwrap(),
        )
    }

    /// Fraction of random (person, even item, odd item) comparisons in
    /// which the model prefers the item matching the person's parity.
    fn parity_agreement(
        model: &BprFactorization,
        num_persons: usize,
        num_items: usize,
        rng: &mut XorShiftRng,
    ) -> f32 {
        let mut successes = 0;
        let mut valid = 0;

        for _ in 0..10_000 {
            let person = rng.gen_range(0..num_persons);
            let first = rng.gen_range(0..num_items);
            let second = rng.gen_range(0..num_items);

            if first % 2 == second % 2 {
                continue;
            }

            valid += 1;

            let (even, odd) = if first % 2 == 0 {
                (first, second)
            } else {
                (second, first)
            };
            let (liked, other) = if person % 2 == 0 {
                (even, odd)
            } else {
                (odd, even)
            };

            if model.predict(person, liked) > model.predict(person, other) {
                successes += 1;
            }
        }

        successes as f32 / valid as f32
    }

    #[test]
    fn invalid_configuration() {
        assert_eq!(
            Hyperparameters::new(0).build().err(),
            Some(ConfigurationError::InvalidLatentDim)
        );
        assert_eq!(
            Hyperparameters::new(4).item_stripes(0).build().err(),
            Some(ConfigurationError::InvalidStripeCount { kind: "item" })
        );
        assert_eq!(
            Hyperparameters::new(4).person_stripes(0).build().err(),
            Some(ConfigurationError::InvalidStripeCount { kind: "person" })
        );
    }

    #[test]
    fn predict_is_dot_product() {
        let model = model(3, 42);

        model
            .person_factors
            .insert(7, Arc::new(LatentVector::from_slice(&[1.0, -2.0, 0.5])));
        model
            .item_factors
            .insert(9, Arc::new(LatentVector::from_slice(&[4.0, 1.0, 2.0])));

        assert_eq!(model.predict(7, 9), 4.0 - 2.0 + 1.0);
    }

    #[test]
    fn lazy_init_happens_once() {
        let model = model(8, 42);

        let first = model.predict(1, 2);
        let second = model.predict(1, 2);

        assert_eq!(first, second);
        assert_eq!(model.num_persons(), 1);
        assert_eq!(model.num_items(), 1);
        assert_eq!(model.person_vector(1).unwrap().len(), 8);
        assert!(model.person_vector(2).is_none());
    }

    #[test]
    fn concurrent_lazy_init_agrees() {
        let model = Hyperparameters::new(4)
            .item_stripes(2)
            .person_stripes(2)
            .build()
            .unwrap();

        let predictions: Vec<f32> = (0..10_000)
            .into_par_iter()
            .map(|_| model.predict(3, 5))
            .collect();

        assert!(predictions.iter().all(|&x| x == predictions[0]));
        assert_eq!(model.num_persons(), 1);
        assert_eq!(model.num_items(), 1);
    }

    #[test]
    fn update_increases_preference() {
        let model = model(8, 42);
        let triple = PreferenceTriple::new(0, 1, 2);

        let before = model.predict(0, 1) - model.predict(0, 2);
        for _ in 0..10 {
            model.update(&triple, 0.01, 0.0);
        }
        let after = model.predict(0, 1) - model.predict(0, 2);

        assert!(after > before, "{} <= {}", after, before);
    }

    #[test]
    fn l2_penalty_shrinks_vectors() {
        let model = model(8, 42);
        let triple = PreferenceTriple::new(0, 1, 2);
        model.predict(0, 1);
        model.predict(0, 2);

        let norm = |values: Vec<f32>| values.iter().map(|x| x * x).sum::<f32>();
        let before = norm(model.item_vector(1).unwrap()) + norm(model.item_vector(2).unwrap());

        // With no learning signal left the penalty dominates.
        for _ in 0..1_000 {
            model.update(&triple, 0.1, 1.0);
        }

        let after = norm(model.item_vector(1).unwrap()) + norm(model.item_vector(2).unwrap());

        assert!(after < before);
    }

    #[test]
    fn concurrent_updates_do_not_deadlock() {
        // Few stripes force heavy contention and shared stripes.
        let model = Hyperparameters::new(8)
            .item_stripes(3)
            .person_stripes(2)
            .rng(XorShiftRng::seed_from_u64(42))
            .build()
            .unwrap();

        (0..200_000usize).into_par_iter().for_each(|idx| {
            let preferred_item = idx % 17;
            let non_preferred_item = (idx / 17 + preferred_item + 1) % 17;

            if preferred_item != non_preferred_item {
                let triple = PreferenceTriple::new(idx % 11, preferred_item, non_preferred_item);
                model.update(&triple, 0.01, 0.01);
            }
        });

        assert_eq!(model.num_persons(), 11);
        assert_eq!(model.num_items(), 17);

        for person_id in 0..11 {
            assert!(model
                .person_vector(person_id)
                .unwrap()
                .iter()
                .all(|x| x.is_finite()));
        }
        for item_id in 0..17 {
            assert!(model
                .item_vector(item_id)
                .unwrap()
                .iter()
                .all(|x| x.is_finite()));
        }
    }

    #[test]
    fn update_waits_for_person_stripe() {
        let model = Arc::new(model(8, 42));
        model.predict(0, 1);
        model.predict(0, 2);
        let before = triple_vectors(&model);

        let person_guard = model.person_locks.lock(0);
        let worker = {
            let model = Arc::clone(&model);
            thread::spawn(move || model.update(&PreferenceTriple::new(0, 1, 2), 0.1, 0.1))
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!model.item_locks.is_locked(1));
        assert!(!model.item_locks.is_locked(2));
        assert_eq!(triple_vectors(&model), before);

        drop(person_guard);
        worker.join().unwrap();

        let after = triple_vectors(&model);
        assert_ne!(after.0, before.0);
        assert_ne!(after.1, before.1);
        assert_ne!(after.2, before.2);
    }

    #[test]
    fn update_holds_person_stripe_while_waiting_for_items() {
        let model = Arc::new(model(8, 42));
        model.predict(0, 1);
        model.predict(0, 2);
        let before = triple_vectors(&model);

        // Stripe 2 is the higher of the pair, so the worker blocks on it
        // after taking the person stripe.
        let item_guard = model.item_locks.lock(2);
        let worker = {
            let model = Arc::clone(&model);
            thread::spawn(move || model.update(&PreferenceTriple::new(0, 1, 2), 0.1, 0.1))
        };

        assert!(eventually(|| model.person_locks.is_locked(0)));
        thread::sleep(Duration::from_millis(50));
        assert!(!model.item_locks.is_locked(1));
        assert_eq!(triple_vectors(&model), before);

        drop(item_guard);
        worker.join().unwrap();

        assert!(!model.person_locks.is_locked(0));
        assert_ne!(triple_vectors(&model).0, before.0);
    }

    #[test]
    fn learns_parity_preference() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        let mut interactions = HashInteractions::new();

        // Even persons are 3x more likely to interact with an even item,
        // and vice versa.
        for person in 0..1_000 {
            for _ in 0..20 {
                let item = if rng.gen::<f32>() < 0.75 {
                    rng.gen_range(0..50) * 2 + person % 2
                } else {
                    rng.gen_range(0..100)
                };

                interactions.add_interaction(person, item);
            }
        }

        let sampler = interactions.person_sampler().unwrap();
        let model = model(10, 42);

        for _ in 0..200_000 {
            let triple = sampler.sample(&mut rng).unwrap();
            model.update(&triple, 0.05, 0.05);
        }

        let agreement = parity_agreement(&model, 1_000, 100, &mut rng);
        println!("Parity agreement {}", agreement);

        assert!(agreement > 0.8);
    }

    #[test]
    fn parallel_fit() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let mut interactions = HashInteractions::new();

        for person in 0..200 {
            for _ in 0..8 {
                interactions.add_interaction(person, rng.gen_range(0..20) * 2 + person % 2);
            }
        }

        let sampler = interactions.item_sampler().unwrap();
        let model = Hyperparameters::new(8)
            .learning_rate(0.05)
            .l2_penalty(0.01)
            .num_threads(4)
            .rng(XorShiftRng::seed_from_u64(7))
            .build()
            .unwrap();

        let initial_loss = model.fit(&sampler, 1_000).unwrap();
        let final_loss = model.fit(&sampler, 100_000).unwrap();

        assert!(final_loss < initial_loss);
        assert!(parity_agreement(&model, 200, 40, &mut rng) > 0.75);

        let auc = model.area_under_curve_with_rng(&sampler, 5_000, &mut rng).unwrap();
        assert!(auc > 0.65, "AUC {}", auc);
        assert!(auc <= 1.0);
    }

    #[test]
    fn single_threaded_fit_is_reproducible() {
        let mut interactions = HashInteractions::new();
        for person in 0..20 {
            for item in 0..5 {
                interactions.add_interaction(person, (person * 3 + item) % 30);
            }
        }
        let sampler = interactions.person_sampler().unwrap();

        let fitted = || {
            let model = Hyperparameters::new(4)
                .num_threads(1)
                .rng(XorShiftRng::seed_from_u64(3))
                .build()
                .unwrap();
            model.fit(&sampler, 5_000).unwrap();
            model.predict(4, 13)
        };

        assert_eq!(fitted(), fitted());
    }

    #[test]
    fn zero_iterations_auc() {
        let mut interactions = HashInteractions::new();
        interactions.add_interaction(0, 0);
        interactions.add_interaction(1, 1);

        let model = model(2, 1);
        let sampler = interactions.person_sampler().unwrap();

        assert_eq!(model.area_under_curve(&sampler, 0), Ok(0.0));
        assert!(model.area_under_curve(&sampler, 100).unwrap() <= 1.0);
    }

    #[test]
    fn hyperparameters_from_json() {
        let hyperparameters = Hyperparameters::new(6)
            .item_stripes(16)
            .person_stripes(32)
            .rng(XorShiftRng::seed_from_u64(11));

        let json = serde_json::to_string(&hyperparameters).unwrap();
        let restored: Hyperparameters = serde_json::from_str(&json).unwrap();

        let original = hyperparameters.build().unwrap();
        let restored = restored.build().unwrap();

        assert_eq!(restored.latent_dim(), 6);
        assert_eq!(restored.item_locks.len(), 16);
        assert_eq!(restored.person_locks.len(), 32);
        assert_eq!(original.predict(1, 2), restored.predict(1, 2));
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let model = model(2, 1);
        model
            .item_factors
            .insert(0, Arc::new(LatentVector::from_slice(&[::std::f32::NAN, 0.0])));

        assert!(model.scores(0, &[1, 2]).is_ok());
        assert!(model.scores(0, &[1, 0]).is_err());
    }
}
