use crate::{
    config::{ConfigError, EncoderConfig},
    dataset::{self, Split, SplitKind, Splits},
    features::{
        convert_examples_to_features, FeatureOptions, InputFeatures,
        TargetFeatures,
    },
    tokenizer::{BertWordPieceTokenizer, SubwordTokenizer},
    vocab::TagVocab,
};
use anyhow::{Context, Error};

/// Model inputs and targets for one split.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSplit {
    pub inputs: InputFeatures,
    pub targets: TargetFeatures,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainData {
    pub train: EncodedSplit,
    pub val: EncodedSplit,
    /// The vocabulary the label ids refer to.
    pub vocab: TagVocab,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestData {
    pub test: EncodedSplit,
    pub vocab: TagVocab,
}

/// Loads a dataset and encodes it for a BERT token-classification model.
///
/// The encoder only holds its configuration. Each call reads the splits from
/// disk, derives the tag vocabulary from the training split and encodes the
/// requested splits with it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEncoder {
    config: EncoderConfig,
}

impl FeatureEncoder {
    pub fn new(config: EncoderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(FeatureEncoder { config })
    }

    pub fn config(&self) -> &EncoderConfig { &self.config }

    /// Read the `train`, `val` and `test` splits.
    pub fn load_data(&self) -> Result<Splits, Error> {
        let EncoderConfig {
            data_dir, format, ..
        } = &self.config;

        let splits = dataset::load_splits(data_dir, *format).with_context(
            || {
                format!(
                    "Unable to load the dataset from \"{}\"",
                    data_dir.display()
                )
            },
        )?;

        splits.train.validate(SplitKind::Train)?;
        splits.val.validate(SplitKind::Val)?;
        splits.test.validate(SplitKind::Test)?;

        Ok(splits)
    }

    /// Build the tag vocabulary from the training split.
    pub fn set_tags(&self, train: &Split) -> Result<TagVocab, Error> {
        let tag_seq = train.tags(SplitKind::Train)?;
        Ok(TagVocab::from_tag_sequences(tag_seq))
    }

    /// Load the WordPiece tokenizer from the configured BERT directory.
    pub fn tokenizer(&self) -> Result<BertWordPieceTokenizer, Error> {
        let tokenizer = BertWordPieceTokenizer::from_file(
            &self.config.vocab_file(),
            self.config.lower_case,
            self.config.strip_accents,
        )?;

        Ok(tokenizer)
    }

    /// Encode a single split with an existing vocabulary.
    pub fn encode_split<T>(
        &self,
        kind: SplitKind,
        split: &Split,
        labelled: bool,
        vocab: &TagVocab,
        tokenizer: &T,
        options: &FeatureOptions,
    ) -> Result<EncodedSplit, Error>
    where
        T: SubwordTokenizer + ?Sized,
    {
        let tag_seq = if labelled { Some(split.tags(kind)?) } else { None };

        let (inputs, targets) = convert_examples_to_features(
            &split.word_seq,
            tag_seq,
            vocab,
            tokenizer,
            options,
        )
        .with_context(|| format!("Unable to encode the {} split", kind))?;

        Ok(EncodedSplit { inputs, targets })
    }

    /// Encode the training and validation splits.
    pub fn get_train_data(
        &self,
        use_max_seq: bool,
        print_ex: usize,
    ) -> Result<TrainData, Error> {
        let tokenizer = self.tokenizer()?;
        self.get_train_data_with(&tokenizer, use_max_seq, print_ex)
    }

    /// Encode the training and validation splits using a custom tokenizer.
    #[tracing::instrument(skip(self, tokenizer))]
    pub fn get_train_data_with<T>(
        &self,
        tokenizer: &T,
        use_max_seq: bool,
        print_ex: usize,
    ) -> Result<TrainData, Error>
    where
        T: SubwordTokenizer + ?Sized,
    {
        let splits = self.load_data()?;
        let vocab = self.set_tags(&splits.train)?;
        let options = self.options(use_max_seq, print_ex);

        let train = self.encode_split(
            SplitKind::Train,
            &splits.train,
            true,
            &vocab,
            tokenizer,
            &options,
        )?;
        let val = self.encode_split(
            SplitKind::Val,
            &splits.val,
            true,
            &vocab,
            tokenizer,
            &options,
        )?;

        Ok(TrainData { train, val, vocab })
    }

    /// Encode the test split. Test examples are unlabelled, so every word
    /// gets the pad tag.
    pub fn get_test_data(
        &self,
        use_max_seq: bool,
        print_ex: usize,
    ) -> Result<TestData, Error> {
        let tokenizer = self.tokenizer()?;
        self.get_test_data_with(&tokenizer, use_max_seq, print_ex)
    }

    #[tracing::instrument(skip(self, tokenizer))]
    pub fn get_test_data_with<T>(
        &self,
        tokenizer: &T,
        use_max_seq: bool,
        print_ex: usize,
    ) -> Result<TestData, Error>
    where
        T: SubwordTokenizer + ?Sized,
    {
        let splits = self.load_data()?;
        let vocab = self.set_tags(&splits.train)?;

        self.encode_test_split(
            &splits,
            vocab,
            tokenizer,
            use_max_seq,
            print_ex,
        )
    }

    /// Encode the test split against a vocabulary saved by an earlier
    /// training run, so the label ids line up with that model's.
    #[tracing::instrument(skip(self, vocab, tokenizer))]
    pub fn get_test_data_with_vocab<T>(
        &self,
        vocab: TagVocab,
        tokenizer: &T,
        use_max_seq: bool,
        print_ex: usize,
    ) -> Result<TestData, Error>
    where
        T: SubwordTokenizer + ?Sized,
    {
        let splits = self.load_data()?;

        self.encode_test_split(
            &splits,
            vocab,
            tokenizer,
            use_max_seq,
            print_ex,
        )
    }

    fn encode_test_split<T>(
        &self,
        splits: &Splits,
        vocab: TagVocab,
        tokenizer: &T,
        use_max_seq: bool,
        print_ex: usize,
    ) -> Result<TestData, Error>
    where
        T: SubwordTokenizer + ?Sized,
    {
        let options = self.options(use_max_seq, print_ex);

        let test = self.encode_split(
            SplitKind::Test,
            &splits.test,
            false,
            &vocab,
            tokenizer,
            &options,
        )?;

        Ok(TestData { test, vocab })
    }

    fn options(&self, use_max_seq: bool, print_ex: usize) -> FeatureOptions {
        FeatureOptions::new(self.config.max_seq_len, use_max_seq)
            .with_print_examples(print_ex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dataset::DatasetFormat,
        features::{FeatureError, LabelIds, Sequences},
    };
    use ndarray::array;
    use std::path::Path;

    const VOCAB: &str =
        "[PAD]\n[UNK]\n[CLS]\n[SEP]\n[MASK]\nAs\n##pi\n##rin\ncauses\nrash\n";

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn json_dataset(val: &str) -> (tempfile::TempDir, FeatureEncoder) {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let bert_dir = dir.path().join("bert");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::create_dir_all(&bert_dir).unwrap();

        write(&bert_dir, "vocab.txt", VOCAB);
        write(
            &data_dir,
            "train.json",
            r#"{
                "word_seq": [["Aspirin", "_w_pad_", "causes", "_unk_"]],
                "tag_seq": [["B-DRUG", "O", "O", "B-EFFECT"]]
            }"#,
        );
        write(&data_dir, "val.json", val);
        write(
            &data_dir,
            "test.json",
            r#"{"word_seq": [["Aspirin", "rash"]]}"#,
        );

        let mut config = EncoderConfig::new(data_dir, bert_dir, 10);
        config.format = DatasetFormat::Json;
        let encoder = FeatureEncoder::new(config).unwrap();

        (dir, encoder)
    }

    const VAL: &str = r#"{
        "word_seq": [["causes", "rash"]],
        "tag_seq": [["O", "B-EFFECT"]]
    }"#;

    #[test]
    fn encode_train_and_validation_splits() {
        let (_dir, encoder) = json_dataset(VAL);

        let TrainData { train, val, vocab } =
            encoder.get_train_data(true, 1).unwrap();

        assert_eq!(vocab.tags().collect::<Vec<_>>(), [
            "_t_pad_", "[INV]", "[CLS]", "[SEP]", "B-DRUG", "B-EFFECT", "O"
        ]);
        assert_eq!(
            train.inputs.input_word_ids,
            Sequences::Padded(array![[2, 5, 6, 7, 8, 1, 3, 0, 0, 0]])
        );
        assert_eq!(
            train.inputs.input_mask,
            Sequences::Padded(array![[1, 1, 1, 1, 1, 1, 1, 0, 0, 0]])
        );
        assert_eq!(
            train.inputs.input_type_ids,
            Sequences::Padded(array![[0, 0, 0, 0, 0, 0, 0, 0, 0, 0]])
        );
        assert_eq!(
            train.targets.label_ids.class_ids(0).unwrap(),
            [2, 4, 1, 1, 6, 5, 3, 0, 0, 0]
        );
        assert_eq!(
            train.targets.label_mask,
            Sequences::Padded(array![[
                false, true, false, false, true, true, false, false, false,
                false
            ]])
        );
        assert_eq!(
            val.inputs.input_word_ids,
            Sequences::Padded(array![[2, 8, 9, 3, 0, 0, 0, 0, 0, 0]])
        );
        assert_eq!(
            val.targets.label_ids.class_ids(0).unwrap(),
            [2, 6, 5, 3, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn encode_the_test_split_without_tags() {
        let (_dir, encoder) = json_dataset(VAL);

        let TestData { test, vocab } = encoder.get_test_data(true, 0).unwrap();

        assert_eq!(vocab.len(), 7);
        assert_eq!(
            test.inputs.input_word_ids,
            Sequences::Padded(array![[2, 5, 6, 7, 9, 3, 0, 0, 0, 0]])
        );
        assert_eq!(
            test.targets.label_ids.class_ids(0).unwrap(),
            [2, 0, 1, 1, 0, 3, 0, 0, 0, 0]
        );
    }

    #[test]
    fn encode_the_test_split_with_a_saved_vocabulary() {
        let (dir, encoder) = json_dataset(VAL);
        let path = dir.path().join("tags.json");
        let saved = TagVocab::from_tag_sequences(&[vec![
            "B-DRUG".to_string(),
            "B-EFFECT".to_string(),
            "I-DRUG".to_string(),
            "O".to_string(),
        ]]);
        saved.save_json(&path).unwrap();
        let vocab = TagVocab::load_json(&path).unwrap();
        let tokenizer = encoder.tokenizer().unwrap();

        let TestData { test, vocab } = encoder
            .get_test_data_with_vocab(vocab, &tokenizer, true, 0)
            .unwrap();

        assert_eq!(vocab, saved);
        assert_eq!(test.targets.label_ids.shape(), [1, 10, 8]);
        assert_eq!(
            test.targets.label_ids.class_ids(0).unwrap(),
            [2, 0, 1, 1, 0, 3, 0, 0, 0, 0]
        );
    }

    #[test]
    fn variable_length_output() {
        let (_dir, encoder) = json_dataset(VAL);

        let TrainData { val, .. } = encoder.get_train_data(false, 0).unwrap();

        assert_eq!(
            val.inputs.input_word_ids,
            Sequences::Ragged(vec![vec![2, 8, 9, 3]])
        );
        assert_eq!(
            val.targets.label_ids,
            LabelIds::Ragged(vec![vec![2, 6, 5, 3]])
        );
    }

    #[test]
    fn validation_tags_must_be_seen_during_training() {
        let (_dir, encoder) = json_dataset(
            r#"{"word_seq": [["rash"]], "tag_seq": [["B-SYMPTOM"]]}"#,
        );

        let err = encoder.get_train_data(true, 0).unwrap_err();

        assert_eq!(
            err.downcast_ref::<FeatureError>(),
            Some(&FeatureError::UnknownTag {
                example: 0,
                tag: "B-SYMPTOM".to_string(),
            })
        );
    }

    #[test]
    fn validation_split_needs_tags() {
        let (_dir, encoder) = json_dataset(r#"{"word_seq": [["rash"]]}"#);

        let err = encoder.get_train_data(true, 0).unwrap_err();

        assert!(err.to_string().contains("val"));
    }

    #[test]
    fn load_pickled_splits() {
        let dir = tempfile::tempdir().unwrap();
        let split = Split {
            word_seq: vec![vec!["causes".to_string(), "rash".to_string()]],
            tag_seq: Some(vec![vec!["O".to_string(), "B-EFFECT".to_string()]]),
        };
        for name in ["train.pkl", "val.pkl", "test.pkl"] {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            serde_pickle::to_writer(
                &mut f,
                &split,
                serde_pickle::SerOptions::new(),
            )
            .unwrap();
        }
        let encoder =
            FeatureEncoder::new(EncoderConfig::new(dir.path(), dir.path(), 8))
                .unwrap();

        let splits = encoder.load_data().unwrap();

        assert_eq!(splits.train, split);
        assert_eq!(splits.test, split);
    }

    #[test]
    fn missing_vocabulary_file() {
        let dir = tempfile::tempdir().unwrap();
        let encoder =
            FeatureEncoder::new(EncoderConfig::new(dir.path(), dir.path(), 8))
                .unwrap();

        assert!(encoder.tokenizer().is_err());
    }

    #[test]
    fn reject_invalid_configs() {
        let config = EncoderConfig::new("data", "bert", 0);

        assert!(FeatureEncoder::new(config).is_err());
    }
}
