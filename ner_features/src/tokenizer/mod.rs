//! # Subword tokenizers
//!
//! The feature encoder only needs two things from a tokenizer: splitting a
//! single word into subword pieces and mapping pieces to vocabulary ids. The
//! [`SubwordTokenizer`] trait captures that contract so any compatible
//! implementation can be swapped in. [`BertWordPieceTokenizer`] is the one
//! used in practice.

mod bert_tokenizer;

pub use bert_tokenizer::{BertWordPieceTokenizer, LoadError};

/// Marker token placed at the start of every sequence.
pub const CLS: &str = "[CLS]";
/// Marker token placed after the last real token of every sequence.
pub const SEP: &str = "[SEP]";
/// Token used for words that are known to be out of vocabulary.
pub const UNK: &str = "[UNK]";

pub trait SubwordTokenizer {
    /// Split a word into subword pieces. A non-empty word should produce at
    /// least one piece.
    fn tokenize(&self, word: &str) -> Vec<String>;

    /// Look up the id of each token, including the [`CLS`], [`SEP`] and
    /// [`UNK`] markers. The result has the same length as `tokens`.
    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Vec<i64>;
}

impl<T: SubwordTokenizer + ?Sized> SubwordTokenizer for &T {
    fn tokenize(&self, word: &str) -> Vec<String> { (**self).tokenize(word) }

    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Vec<i64> {
        (**self).convert_tokens_to_ids(tokens)
    }
}
