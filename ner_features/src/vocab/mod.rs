//! # Vocabularies
//!
//! Mappings between the tags attached to words in a dataset and the integer
//! ids a token-classification head is trained against.
//!
//! The tag vocabulary is derived from the training split once and then
//! reused for validation and test data, so it can also be written to and read
//! back from disk.

pub mod tag_vocab;

pub use tag_vocab::{TagVocab, VocabError};

use std::collections::BTreeMap;

pub(crate) fn swap_key_values<T: Clone, U: Ord + Copy>(
    input: &BTreeMap<T, U>,
) -> BTreeMap<U, T> {
    input
        .iter()
        .map(|(key, &value)| (value, key.clone()))
        .collect()
}
