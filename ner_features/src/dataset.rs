//! Loading the pre-partitioned train, validation and test splits.
//!
//! Each split is a mapping with a `word_seq` key (one list of words per
//! example) and, except for test data, a `tag_seq` key holding the matching
//! tags. Any other keys are reported and ignored.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Serialization format of the split files.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    /// `train.pkl`, `val.pkl` and `test.pkl`, written by Python's `pickle`.
    #[default]
    Pickle,
    /// `train.json`, `val.json` and `test.json`.
    Json,
}

impl DatasetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            DatasetFormat::Pickle => "pkl",
            DatasetFormat::Json => "json",
        }
    }
}

impl FromStr for DatasetFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickle" | "pkl" => Ok(DatasetFormat::Pickle),
            "json" => Ok(DatasetFormat::Json),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown dataset format, \"{0}\" (expected \"pickle\" or \"json\")")]
pub struct UnknownFormat(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitKind {
    Train,
    Val,
    Test,
}

impl SplitKind {
    pub fn name(self) -> &'static str {
        match self {
            SplitKind::Train => "train",
            SplitKind::Val => "val",
            SplitKind::Test => "test",
        }
    }

    pub fn file_name(self, format: DatasetFormat) -> String {
        format!("{}.{}", self.name(), format.extension())
    }
}

impl Display for SplitKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single dataset split.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub word_seq: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_seq: Option<Vec<Vec<String>>>,
}

impl Split {
    pub fn len(&self) -> usize { self.word_seq.len() }

    pub fn is_empty(&self) -> bool { self.word_seq.is_empty() }

    /// The tag sequences, which labelled splits must have.
    pub fn tags(
        &self,
        kind: SplitKind,
    ) -> Result<&[Vec<String>], DatasetError> {
        self.tag_seq
            .as_deref()
            .ok_or(DatasetError::MissingTags { split: kind })
    }

    /// Make sure every example has exactly one tag per word.
    pub fn validate(&self, kind: SplitKind) -> Result<(), DatasetError> {
        let tag_seq = match &self.tag_seq {
            Some(t) => t,
            None => return Ok(()),
        };

        if tag_seq.len() != self.word_seq.len() {
            return Err(DatasetError::ExampleCountMismatch {
                split: kind,
                words: self.word_seq.len(),
                tags: tag_seq.len(),
            });
        }

        for (example, (words, tags)) in
            self.word_seq.iter().zip(tag_seq).enumerate()
        {
            if words.len() != tags.len() {
                return Err(DatasetError::LengthMismatch {
                    split: kind,
                    example,
                    words: words.len(),
                    tags: tags.len(),
                });
            }
        }

        Ok(())
    }
}

/// The three splits of a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Splits {
    pub train: Split,
    pub val: Split,
    pub test: Split,
}

/// Load `train`, `val` and `test` from a directory.
#[tracing::instrument]
pub fn load_splits(
    data_dir: &Path,
    format: DatasetFormat,
) -> Result<Splits, DatasetError> {
    let load = |kind: SplitKind| {
        load_split(&data_dir.join(kind.file_name(format)), kind, format)
    };

    Ok(Splits {
        train: load(SplitKind::Train)?,
        val: load(SplitKind::Val)?,
        test: load(SplitKind::Test)?,
    })
}

/// Load a single split file.
pub fn load_split(
    path: &Path,
    kind: SplitKind,
    format: DatasetFormat,
) -> Result<Split, DatasetError> {
    let f = File::open(path).map_err(|source| DatasetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(f);

    let (keys, split) = match format {
        DatasetFormat::Pickle => read_pickle(reader, path)?,
        DatasetFormat::Json => read_json(reader, path)?,
    };

    tracing::info!(
        split = %kind,
        keys = ?keys,
        examples = split.len(),
        "Loaded a dataset split",
    );

    Ok(split)
}

fn read_pickle(
    reader: impl std::io::Read,
    path: &Path,
) -> Result<(Vec<String>, Split), DatasetError> {
    use serde_pickle::{DeOptions, HashableValue, Value};

    let pickle_error = |source| DatasetError::Pickle {
        path: path.to_path_buf(),
        source,
    };

    let value = serde_pickle::value_from_reader(reader, DeOptions::new())
        .map_err(pickle_error)?;

    let keys = match &value {
        Value::Dict(entries) => entries
            .keys()
            .map(|key| match key {
                HashableValue::String(s) => s.clone(),
                other => format!("{other:?}"),
            })
            .collect(),
        _ => return Err(DatasetError::NotAMapping { path: path.to_path_buf() }),
    };

    let split = serde_pickle::from_value(value).map_err(pickle_error)?;

    Ok((keys, split))
}

fn read_json(
    reader: impl std::io::Read,
    path: &Path,
) -> Result<(Vec<String>, Split), DatasetError> {
    let json_error = |source| DatasetError::Json {
        path: path.to_path_buf(),
        source,
    };

    let value: serde_json::Value =
        serde_json::from_reader(reader).map_err(json_error)?;

    let keys = match &value {
        serde_json::Value::Object(entries) => entries.keys().cloned().collect(),
        _ => return Err(DatasetError::NotAMapping { path: path.to_path_buf() }),
    };

    let split = serde_json::from_value(value).map_err(json_error)?;

    Ok((keys, split))
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Unable to read \"{}\"", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to deserialize the pickled split at \"{}\"", .path.display())]
    Pickle {
        path: PathBuf,
        #[source]
        source: serde_pickle::Error,
    },
    #[error("Unable to deserialize the JSON split at \"{}\"", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("\"{}\" doesn't contain a mapping", .path.display())]
    NotAMapping { path: PathBuf },
    #[error("The {split} split has no \"tag_seq\"")]
    MissingTags { split: SplitKind },
    #[error("The {split} split has {words} word sequences but {tags} tag sequences")]
    ExampleCountMismatch {
        split: SplitKind,
        words: usize,
        tags: usize,
    },
    #[error("Example {example} of the {split} split has {words} words but {tags} tags")]
    LengthMismatch {
        split: SplitKind,
        example: usize,
        words: usize,
        tags: usize,
    },
}
