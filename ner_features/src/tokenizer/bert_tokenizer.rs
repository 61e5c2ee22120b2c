use crate::tokenizer::SubwordTokenizer;
use rust_tokenizers::{
    error::TokenizerError,
    tokenizer::{BertTokenizer, Tokenizer},
};
use std::path::{Path, PathBuf};

/// # BERT WordPiece tokenizer
/// Loads a flat `vocab.txt` (one token per line, the line number being the
/// token id) and performs:
/// - basic tokenization (text cleanup, punctuation splitting, optional
///   lower-casing and accent stripping)
/// - WordPiece tokenization, continuation pieces being prefixed with `##`
pub struct BertWordPieceTokenizer {
    inner: BertTokenizer,
}

impl BertWordPieceTokenizer {
    /// Name of the vocabulary file inside a BERT model directory.
    pub const VOCAB_FILE: &'static str = "vocab.txt";

    // Create a new tokenizer from a vocabulary file.
    //
    // # Parameters
    // - vocab_path: path to a BERT `vocab.txt`
    // - lower_case: flag indicating if the text should be lower-cased as
    //   part of the tokenization (cased models need `false`)
    // - strip_accents: flag indicating if accents should be stripped from
    //   the text
    pub fn from_file(
        vocab_path: &Path,
        lower_case: bool,
        strip_accents: bool,
    ) -> Result<Self, LoadError> {
        let inner = BertTokenizer::from_file(
            vocab_path,
            lower_case,
            strip_accents,
        )
        .map_err(|source| LoadError {
            path: vocab_path.to_path_buf(),
            source,
        })?;

        tracing::debug!(
            path = %vocab_path.display(),
            lower_case,
            strip_accents,
            "Loaded the WordPiece vocabulary",
        );

        Ok(BertWordPieceTokenizer { inner })
    }

    /// Load `vocab.txt` from a BERT model directory.
    pub fn from_dir(
        bert_dir: &Path,
        lower_case: bool,
        strip_accents: bool,
    ) -> Result<Self, LoadError> {
        BertWordPieceTokenizer::from_file(
            &bert_dir.join(BertWordPieceTokenizer::VOCAB_FILE),
            lower_case,
            strip_accents,
        )
    }
}

impl SubwordTokenizer for BertWordPieceTokenizer {
    fn tokenize(&self, word: &str) -> Vec<String> {
        Tokenizer::tokenize(&self.inner, word)
    }

    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Vec<i64> {
        Tokenizer::convert_tokens_to_ids(&self.inner, tokens)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unable to load the WordPiece vocabulary from \"{}\"", .path.display())]
pub struct LoadError {
    path: PathBuf,
    #[source]
    source: TokenizerError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{CLS, SEP, UNK};

    const VOCAB: &str =
        "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\nAs\n##pi\n##rin\ncauses\nrash\n";

    fn tokenizer() -> (tempfile::TempDir, BertWordPieceTokenizer) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vocab.txt"), VOCAB).unwrap();
        let tokenizer =
            BertWordPieceTokenizer::from_dir(dir.path(), false, false).unwrap();

        (dir, tokenizer)
    }

    #[test]
    fn split_a_word_into_word_pieces() {
        let (_dir, tokenizer) = tokenizer();

        let pieces = tokenizer.tokenize("Aspirin");

        assert_eq!(pieces, ["As", "##pi", "##rin"]);
    }

    #[test]
    fn known_words_are_a_single_piece() {
        let (_dir, tokenizer) = tokenizer();

        assert_eq!(tokenizer.tokenize("causes"), ["causes"]);
    }

    #[test]
    fn markers_map_to_their_vocabulary_lines() {
        let (_dir, tokenizer) = tokenizer();
        let tokens: Vec<String> = [CLS, "As", "##pi", "##rin", UNK, SEP]
            .iter()
            .map(|t| t.to_string())
            .collect();

        let ids = tokenizer.convert_tokens_to_ids(&tokens);

        assert_eq!(ids, [2, 5, 6, 7, 1, 3]);
    }

    #[test]
    fn missing_vocabulary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = BertWordPieceTokenizer::from_dir(dir.path(), false, false)
            .err()
            .unwrap();

        assert!(err.to_string().contains("vocab.txt"));
    }
}
