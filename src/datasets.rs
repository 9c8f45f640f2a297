//! Loading interaction logs from CSV.
//!
//! Files are expected to carry a header row with at least `person_id` and
//! `item_id` columns; any other columns are ignored.
use std::io::Read;
use std::path::Path;

use csv;
use failure;

use interactions::InteractionStore;
use {ItemId, PersonId};

#[derive(Debug, Deserialize)]
struct InteractionRecord {
    person_id: PersonId,
    item_id: ItemId,
}

/// Read interactions from `reader` into `store`, returning the number of
/// rows read.
pub fn read_interactions<R: Read, S: InteractionStore>(
    reader: R,
    store: &mut S,
) -> Result<usize, failure::Error> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut num_rows = 0;

    for record in reader.deserialize() {
        let record: InteractionRecord = record?;
        store.add_interaction(record.person_id, record.item_id);
        num_rows += 1;
    }

    debug!("Read {} interactions", num_rows);

    Ok(num_rows)
}

/// Read interactions from the CSV file at `path` into `store`.
pub fn load_csv<P: AsRef<Path>, S: InteractionStore>(
    path: P,
    store: &mut S,
) -> Result<usize, failure::Error> {
    let file = ::std::fs::File::open(path)?;

    read_interactions(file, store)
}
