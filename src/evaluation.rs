//! Ranking quality metrics.
use std;

use failure;
use rayon::prelude::*;

use data::CompressedInteractions;
use {ItemId, PredictionError, RankingModel};

/// Mean reciprocal rank of held-out interactions.
///
/// For every person in `test`, all items seen in either `train` or `test`
/// are scored; the person's training items are excluded from the ranking,
/// and the reciprocal ranks of their test items are averaged. The result is
/// the mean of those per-person averages.
pub fn mrr_score<T: RankingModel + Sync>(
    model: &T,
    train: &CompressedInteractions,
    test: &CompressedInteractions,
) -> Result<f32, failure::Error> {
    let mut item_ids: Vec<ItemId> = train
        .unique_item_ids()
        .iter()
        .chain(test.unique_item_ids().iter())
        .cloned()
        .collect();
    item_ids.sort_unstable();
    item_ids.dedup();

    let mrrs = test
        .iter_persons()
        .collect::<Vec<_>>()
        .par_iter()
        .map(|test_person| {
            let mut predictions = model.scores(test_person.person_id, &item_ids)?;

            if let Some(train_person) = train.get_person(test_person.person_id) {
                for train_item_id in train_person.item_ids {
                    if let Ok(idx) = item_ids.binary_search(train_item_id) {
                        predictions[idx] = std::f32::MIN;
                    }
                }
            }

            let mut reciprocal_ranks = 0.0;

            for test_item_id in test_person.item_ids {
                let test_score = match item_ids.binary_search(test_item_id) {
                    Ok(idx) => predictions[idx],
                    Err(_) => continue,
                };

                let rank = predictions
                    .iter()
                    .filter(|&&prediction| prediction >= test_score)
                    .count();

                reciprocal_ranks += 1.0 / rank as f32;
            }

            Ok::<f32, PredictionError>(reciprocal_ranks / test_person.len() as f32)
        })
        .collect::<Result<Vec<f32>, PredictionError>>()?;

    if mrrs.is_empty() {
        bail!("No test interactions to evaluate.");
    }

    Ok(mrrs.iter().sum::<f32>() / mrrs.len() as f32)
}
