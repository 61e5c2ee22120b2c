use crate::vocab::swap_key_values;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// # Tag Vocab
/// Bijective mapping between tag strings and label ids. Contains the
/// following reserved values, always at the same ids:
/// - PAD tag (`_t_pad_`, id 0)
/// - INV tag for subword continuations (`[INV]`, id 1)
/// - CLS tag for the sequence start marker (`[CLS]`, id 2)
/// - SEP tag for the sequence end marker (`[SEP]`, id 3)
///
/// Every other tag gets the next free id, in lexicographic order, so the
/// same training data always produces the same vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct TagVocab {
    values: BTreeMap<String, u32>,
    indices: BTreeMap<u32, String>,
}

impl TagVocab {
    /// Tag used for padding positions and unlabelled (test) words.
    pub const PAD: &'static str = "_t_pad_";

    /// Tag given to every subword after the first one of a word.
    pub const INVALID: &'static str = "[INV]";

    /// Tag of the sequence start marker.
    pub const CLS: &'static str = "[CLS]";

    /// Tag of the sequence end marker.
    pub const SEPARATOR: &'static str = "[SEP]";

    pub const PAD_ID: u32 = 0;
    pub const INVALID_ID: u32 = 1;
    pub const CLS_ID: u32 = 2;
    pub const SEPARATOR_ID: u32 = 3;

    /// The reserved tags, indexed by their id.
    pub const RESERVED: &'static [&'static str] = &[
        TagVocab::PAD,
        TagVocab::INVALID,
        TagVocab::CLS,
        TagVocab::SEPARATOR,
    ];

    /// A vocabulary containing only the reserved tags.
    pub fn reserved() -> Self {
        let values: BTreeMap<String, u32> = TagVocab::RESERVED
            .iter()
            .enumerate()
            .map(|(id, tag)| (tag.to_string(), id as u32))
            .collect();
        let indices = swap_key_values(&values);

        TagVocab { values, indices }
    }

    /// Build the vocabulary from the tag sequences of a training split.
    ///
    /// A training tag spelled like one of the reserved tags is merged into
    /// the reserved entry instead of getting an id of its own.
    pub fn from_tag_sequences(tag_seq: &[Vec<String>]) -> Self {
        let _span = tracing::info_span!("Building tag vocabulary").entered();

        let observed: BTreeSet<&str> =
            tag_seq.iter().flatten().map(String::as_str).collect();

        let mut values = TagVocab::reserved().values;

        for tag in observed {
            if let Some(&id) = values.get(tag) {
                if tag == TagVocab::PAD {
                    tracing::debug!(
                        %tag,
                        id,
                        "Training data contains pad tags",
                    );
                } else {
                    tracing::warn!(
                        %tag,
                        id,
                        "A training tag collides with a reserved tag, reusing the reserved id",
                    );
                }
                continue;
            }

            let next_id = values.len() as u32;
            values.insert(tag.to_string(), next_id);
        }

        let indices = swap_key_values(&values);
        let vocab = TagVocab { values, indices };
        tracing::info!(tags = ?vocab.values, "Built the tag vocabulary");

        vocab
    }

    /// Number of tags, including the reserved ones.
    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn tag_to_id(&self, tag: &str) -> Option<u32> {
        self.values.get(tag).copied()
    }

    pub fn id_to_tag(&self, id: u32) -> Option<&str> {
        self.indices.get(&id).map(String::as_str)
    }

    /// Map from tag strings to ids.
    pub fn values(&self) -> &BTreeMap<String, u32> { &self.values }

    /// Map from ids to tag strings.
    pub fn indices(&self) -> &BTreeMap<u32, String> { &self.indices }

    /// All tags, ordered by id.
    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.indices.values().map(String::as_str)
    }

    /// Convert label ids back into tags. Ids outside the vocabulary decode to
    /// the pad tag.
    pub fn decode(&self, ids: &[u32]) -> Vec<&str> {
        ids.iter()
            .map(|&id| self.id_to_tag(id).unwrap_or(TagVocab::PAD))
            .collect()
    }

    /// Save the tag to id mapping as a JSON object.
    #[tracing::instrument(skip(self))]
    pub fn save_json(&self, path: &Path) -> Result<(), VocabError> {
        let write_error = |source| VocabError::Write {
            path: path.to_path_buf(),
            source,
        };

        let f = File::create(path).map_err(write_error)?;
        let mut writer = BufWriter::new(f);

        serde_json::to_writer_pretty(&mut writer, &self.values).map_err(
            |source| VocabError::Json {
                path: path.to_path_buf(),
                source,
            },
        )?;
        writer.flush().map_err(write_error)?;

        tracing::debug!(tags = self.len(), path = %path.display(), "Saved");

        Ok(())
    }

    /// Load a vocabulary previously written by [`TagVocab::save_json()`].
    ///
    /// The reserved tags must hold their usual ids and the ids must run from
    /// 0 to `len - 1` without gaps, since they index the one-hot class axis.
    pub fn load_json(path: &Path) -> Result<Self, VocabError> {
        let f = File::open(path).map_err(|source| VocabError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let values: BTreeMap<String, u32> =
            serde_json::from_reader(BufReader::new(f)).map_err(|source| {
                VocabError::Json {
                    path: path.to_path_buf(),
                    source,
                }
            })?;

        TagVocab::from_values(values)
    }

    fn from_values(values: BTreeMap<String, u32>) -> Result<Self, VocabError> {
        for (expected, &tag) in TagVocab::RESERVED.iter().enumerate() {
            let found = values.get(tag).copied();

            if found != Some(expected as u32) {
                return Err(VocabError::Reserved {
                    tag,
                    expected: expected as u32,
                    found,
                });
            }
        }

        let len = values.len() as u32;
        let mut indices = BTreeMap::new();

        for (tag, &id) in &values {
            if id >= len {
                return Err(VocabError::NonContiguous { id, len });
            }

            if let Some(first) = indices.insert(id, tag.clone()) {
                return Err(VocabError::DuplicateId {
                    id,
                    first,
                    second: tag.clone(),
                });
            }
        }

        Ok(TagVocab { values, indices })
    }
}

impl Default for TagVocab {
    fn default() -> Self { TagVocab::reserved() }
}

#[derive(Debug, thiserror::Error)]
pub enum VocabError {
    #[error("Unable to read \"{}\"", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to write to \"{}\"", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("\"{}\" is not a valid tag vocabulary", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("The reserved tag \"{tag}\" should have id {expected}, found {found:?}")]
    Reserved {
        tag: &'static str,
        expected: u32,
        found: Option<u32>,
    },
    #[error("The tags \"{first}\" and \"{second}\" both have id {id}")]
    DuplicateId {
        id: u32,
        first: String,
        second: String,
    },
    #[error("Tag ids must run from 0 to {}, found {id}", .len - 1)]
    NonContiguous { id: u32, len: u32 },
}
