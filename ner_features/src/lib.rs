//! Feature encoding for BERT-based named-entity tagging.
//!
//! The pipeline is a straight line:
//!
//! 1. [`dataset::load_splits()`] reads the pre-split `train`, `val` and
//!    `test` datasets
//! 2. [`TagVocab::from_tag_sequences()`] derives the tag vocabulary from the
//!    training split
//! 3. [`convert_examples_to_features()`] splits every word into subwords with
//!    a [`SubwordTokenizer`], aligns the word-level tags with the subwords and
//!    pads everything to a fixed length
//!
//! [`FeatureEncoder`] wires these steps together for the common case.

pub mod config;
pub mod dataset;
mod encoder;
pub mod features;
pub mod tokenizer;
pub mod vocab;

pub use crate::{
    config::{ConfigError, EncoderConfig},
    dataset::{DatasetError, DatasetFormat, Split, SplitKind, Splits},
    encoder::{EncodedSplit, FeatureEncoder, TestData, TrainData},
    features::{
        convert_examples_to_features, encode_example, EncodedExample,
        FeatureError, FeatureOptions, InputFeatures, LabelIds, Sequences,
        TargetFeatures,
    },
    tokenizer::{BertWordPieceTokenizer, SubwordTokenizer},
    vocab::{TagVocab, VocabError},
};
