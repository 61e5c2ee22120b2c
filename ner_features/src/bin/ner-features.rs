use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use ner_features::{
    DatasetFormat, EncodedSplit, EncoderConfig, FeatureEncoder, TagVocab,
    TestData, TrainData,
};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ner_features=info"));
    tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .without_time()
        .init();

    let cmd = Command::from_args();

    tracing::debug!(?cmd, "Starting");

    match cmd {
        Command::Train(train) => train.execute(),
        Command::Test(test) => test.execute(),
        Command::Vocab(vocab) => vocab.execute(),
    }
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Encode the training and validation splits.
    Train(Train),
    /// Encode the test split.
    Test(Test),
    /// Build the tag vocabulary from the training split and save it.
    Vocab(Vocab),
}

#[derive(Debug, StructOpt)]
pub struct Encoder {
    /// A JSON file to read the settings from. Other flags override it.
    #[structopt(long)]
    config: Option<PathBuf>,
    /// The directory containing the train, val and test splits (defaults to
    /// "./data").
    #[structopt(long)]
    data_dir: Option<PathBuf>,
    /// The directory containing the BERT model's vocab.txt (defaults to
    /// "./bert").
    #[structopt(long)]
    bert_dir: Option<PathBuf>,
    /// The length examples are padded or truncated to.
    #[structopt(long)]
    max_seq_len: Option<usize>,
    /// Lower-case words before splitting them into subwords.
    #[structopt(long, conflicts_with = "no-lower-case")]
    lower_case: bool,
    /// Keep the original casing, even if the config file lower-cases.
    #[structopt(long)]
    no_lower_case: bool,
    /// Strip accents before splitting words into subwords.
    #[structopt(long, conflicts_with = "no-strip-accents")]
    strip_accents: bool,
    /// Keep accents, even if the config file strips them.
    #[structopt(long)]
    no_strip_accents: bool,
    /// How the splits are serialized ("pickle" or "json").
    #[structopt(long)]
    format: Option<DatasetFormat>,
}

impl Encoder {
    fn load(&self) -> Result<FeatureEncoder, Error> {
        let mut config = match &self.config {
            Some(path) => EncoderConfig::from_json_file(path)?,
            None => EncoderConfig::new(
                "data",
                "bert",
                EncoderConfig::DEFAULT_MAX_SEQ_LEN,
            ),
        };

        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(bert_dir) = &self.bert_dir {
            config.bert_dir = bert_dir.clone();
        }
        if let Some(max_seq_len) = self.max_seq_len {
            config.max_seq_len = max_seq_len;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if self.lower_case || self.no_lower_case {
            config.lower_case = self.lower_case;
        }
        if self.strip_accents || self.no_strip_accents {
            config.strip_accents = self.strip_accents;
        }

        tracing::debug!(?config, "Loaded the encoder config");

        FeatureEncoder::new(config).context("Invalid encoder config")
    }
}

#[derive(Debug, StructOpt)]
pub struct Train {
    #[structopt(flatten)]
    encoder: Encoder,
    /// Keep every example at its natural length instead of padding it.
    #[structopt(long)]
    no_pad: bool,
    /// How many encoded examples to log from each split.
    #[structopt(long, default_value = "0")]
    print_examples: usize,
    /// Where to save the tag vocabulary.
    #[structopt(long)]
    vocab_out: Option<PathBuf>,
}

impl Train {
    fn execute(self) -> Result<(), Error> {
        let encoder = self.encoder.load()?;

        let TrainData { train, val, vocab } =
            encoder.get_train_data(!self.no_pad, self.print_examples)?;

        report("train", &train);
        report("val", &val);

        if let Some(path) = &self.vocab_out {
            save_vocab(&vocab, path)?;
        }

        Ok(())
    }
}

#[derive(Debug, StructOpt)]
pub struct Test {
    #[structopt(flatten)]
    encoder: Encoder,
    /// Keep every example at its natural length instead of padding it.
    #[structopt(long)]
    no_pad: bool,
    /// How many encoded examples to log.
    #[structopt(long, default_value = "0")]
    print_examples: usize,
    /// A tag vocabulary saved by `train --vocab-out` or `vocab`. By default
    /// the vocabulary is rebuilt from the training split.
    #[structopt(long)]
    vocab: Option<PathBuf>,
}

impl Test {
    fn execute(self) -> Result<(), Error> {
        let encoder = self.encoder.load()?;
        let use_max_seq = !self.no_pad;

        let TestData { test, .. } = match &self.vocab {
            Some(path) => {
                let vocab = TagVocab::load_json(path).with_context(|| {
                    format!(
                        "Unable to load the tag vocabulary from \"{}\"",
                        path.display()
                    )
                })?;
                let tokenizer = encoder.tokenizer()?;
                encoder.get_test_data_with_vocab(
                    vocab,
                    &tokenizer,
                    use_max_seq,
                    self.print_examples,
                )?
            },
            None => encoder.get_test_data(use_max_seq, self.print_examples)?,
        };

        report("test", &test);

        Ok(())
    }
}

#[derive(Debug, StructOpt)]
pub struct Vocab {
    #[structopt(flatten)]
    encoder: Encoder,
    /// Where to save the tag vocabulary.
    #[structopt(short, long, default_value = "tags.json")]
    out: PathBuf,
}

impl Vocab {
    fn execute(self) -> Result<(), Error> {
        let encoder = self.encoder.load()?;

        let splits = encoder.load_data()?;
        let vocab = encoder.set_tags(&splits.train)?;

        save_vocab(&vocab, &self.out)
    }
}

fn save_vocab(vocab: &TagVocab, path: &Path) -> Result<(), Error> {
    vocab.save_json(path).with_context(|| {
        format!(
            "Unable to save the tag vocabulary to \"{}\"",
            path.display()
        )
    })?;

    tracing::info!(
        path = %path.display(),
        tags = vocab.len(),
        "Saved the tag vocabulary",
    );

    Ok(())
}

fn report(split: &str, encoded: &EncodedSplit) {
    let EncodedSplit { inputs, targets } = encoded;

    tracing::info!(
        split,
        examples = inputs.num_examples(),
        input_word_ids = ?inputs.input_word_ids.shape(),
        input_mask = ?inputs.input_mask.shape(),
        input_type_ids = ?inputs.input_type_ids.shape(),
        label_ids = ?targets.label_ids.shape(),
        label_mask = ?targets.label_mask.shape(),
        "Encoded split",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_file(dir: &Path) -> PathBuf {
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{
                "data_dir": "data",
                "bert_dir": "bert",
                "lower_case": true,
                "strip_accents": true
            }"#,
        )
        .unwrap();

        path
    }

    fn encoder(args: &[&str]) -> FeatureEncoder {
        let args = std::iter::once("ner-features").chain(args.iter().copied());

        Encoder::from_iter_safe(args).unwrap().load().unwrap()
    }

    #[test]
    fn config_file_settings_are_kept_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file(dir.path());

        let encoder = encoder(&["--config", path.to_str().unwrap()]);

        assert!(encoder.config().lower_case);
        assert!(encoder.config().strip_accents);
    }

    #[test]
    fn flags_can_switch_config_settings_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = config_file(dir.path());

        let encoder = encoder(&[
            "--config",
            path.to_str().unwrap(),
            "--no-lower-case",
            "--no-strip-accents",
            "--max-seq-len",
            "16",
        ]);

        assert!(!encoder.config().lower_case);
        assert!(!encoder.config().strip_accents);
        assert_eq!(encoder.config().max_seq_len, 16);
    }

    #[test]
    fn flags_can_switch_settings_on() {
        let encoder = encoder(&["--lower-case"]);

        assert!(encoder.config().lower_case);
        assert!(!encoder.config().strip_accents);
        assert_eq!(encoder.config().data_dir, Path::new("data"));
    }

    #[test]
    fn test_command_accepts_a_saved_vocabulary() {
        let cmd = Command::from_iter_safe([
            "ner-features",
            "test",
            "--vocab",
            "tags.json",
        ])
        .unwrap();

        match cmd {
            Command::Test(test) => {
                assert_eq!(test.vocab, Some(PathBuf::from("tags.json")))
            },
            other => panic!("Unexpected command: {other:?}"),
        }
    }

    #[test]
    fn contradictory_flags_are_rejected() {
        let got = Encoder::from_iter_safe([
            "ner-features",
            "--lower-case",
            "--no-lower-case",
        ]);

        assert!(got.is_err());
    }
}
