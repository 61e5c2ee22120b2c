use crate::{dataset::DatasetFormat, tokenizer::BertWordPieceTokenizer};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

/// Where to find the data and how to encode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Directory containing the `train`, `val` and `test` splits.
    pub data_dir: PathBuf,
    /// Directory containing the BERT model's `vocab.txt`.
    pub bert_dir: PathBuf,
    /// Length every example is padded or truncated to in fixed-length mode,
    /// including the start and end markers.
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    #[serde(default)]
    pub lower_case: bool,
    #[serde(default)]
    pub strip_accents: bool,
    #[serde(default)]
    pub format: DatasetFormat,
}

fn default_max_seq_len() -> usize { EncoderConfig::DEFAULT_MAX_SEQ_LEN }

impl EncoderConfig {
    pub const DEFAULT_MAX_SEQ_LEN: usize = 128;

    /// The smallest sequence length with room for the start and end markers.
    pub const MIN_SEQ_LEN: usize = 2;

    pub fn new(
        data_dir: impl Into<PathBuf>,
        bert_dir: impl Into<PathBuf>,
        max_seq_len: usize,
    ) -> Self {
        EncoderConfig {
            data_dir: data_dir.into(),
            bert_dir: bert_dir.into(),
            max_seq_len,
            lower_case: false,
            strip_accents: false,
            format: DatasetFormat::default(),
        }
    }

    /// Read a config from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let f = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: EncoderConfig = serde_json::from_reader(BufReader::new(f))
            .map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_seq_len < EncoderConfig::MIN_SEQ_LEN {
            return Err(ConfigError::SequenceTooShort {
                max_seq_len: self.max_seq_len,
            });
        }

        Ok(())
    }

    pub fn vocab_file(&self) -> PathBuf {
        self.bert_dir.join(BertWordPieceTokenizer::VOCAB_FILE)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read \"{}\"", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("\"{}\" is not a valid encoder config", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "The maximum sequence length must leave room for the start and end markers, got {max_seq_len}"
    )]
    SequenceTooShort { max_seq_len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"data_dir": "data", "bert_dir": "bert"}"#)
            .unwrap();

        let config = EncoderConfig::from_json_file(&path).unwrap();

        assert_eq!(config, EncoderConfig::new("data", "bert", 128));
        assert_eq!(config.vocab_file(), Path::new("bert").join("vocab.txt"));
    }

    #[test]
    fn parse_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "data_dir": "data",
                "bert_dir": "bert",
                "max_seq_len": 64,
                "lower_case": true,
                "strip_accents": true,
                "format": "json"
            }"#,
        )
        .unwrap();

        let config = EncoderConfig::from_json_file(&path).unwrap();

        assert_eq!(config.max_seq_len, 64);
        assert!(config.lower_case);
        assert!(config.strip_accents);
        assert_eq!(config.format, DatasetFormat::Json);
    }

    #[test]
    fn sequences_need_room_for_markers() {
        let config = EncoderConfig::new("data", "bert", 1);

        let err = config.validate().unwrap_err();

        assert!(matches!(
            err,
            ConfigError::SequenceTooShort { max_seq_len: 1 }
        ));
        assert!(EncoderConfig::new("data", "bert", 2).validate().is_ok());
    }
}
