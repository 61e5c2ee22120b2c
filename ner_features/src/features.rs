//! Turning word-level examples into model inputs.
//!
//! Every word is split into subwords and its tag is attached to the first
//! subword only. The remaining pieces get the [`TagVocab::INVALID`] tag and
//! are masked out of the loss. Each example is then wrapped in the `[CLS]` and
//! `[SEP]` markers and, in fixed-length mode, truncated and padded to
//! `max_seq_length`.

use crate::{
    tokenizer::{SubwordTokenizer, CLS, SEP, UNK},
    vocab::TagVocab,
};
use itertools::Itertools;
use ndarray::{Array2, Array3, Axis};

/// Word marking a token that is known to be out of vocabulary. It always
/// becomes a single [`UNK`] token.
pub const UNKNOWN_WORD: &str = "_unk_";

/// Word marking padding in the source data. It never produces a token.
pub const PAD_WORD: &str = "_w_pad_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureOptions {
    pub max_seq_length: usize,
    /// Truncate and pad every example to `max_seq_length`.
    pub use_max_seq: bool,
    /// Log the encoding of the first `print_examples` examples.
    pub print_examples: usize,
}

impl FeatureOptions {
    pub fn new(max_seq_length: usize, use_max_seq: bool) -> Self {
        FeatureOptions {
            max_seq_length,
            use_max_seq,
            print_examples: 0,
        }
    }

    pub fn with_print_examples(self, print_examples: usize) -> Self {
        FeatureOptions {
            print_examples,
            ..self
        }
    }
}

/// The encoding of a single example.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedExample {
    pub tokens: Vec<String>,
    pub input_ids: Vec<i64>,
    pub input_mask: Vec<i64>,
    pub segment_ids: Vec<i64>,
    pub label_ids: Vec<u32>,
    pub label_mask: Vec<bool>,
}

/// One row per example, either stacked into a matrix (fixed-length mode) or
/// kept at their natural lengths.
#[derive(Debug, Clone, PartialEq)]
pub enum Sequences<T> {
    Padded(Array2<T>),
    Ragged(Vec<Vec<T>>),
}

impl<T: Clone> Sequences<T> {
    /// Number of examples.
    pub fn len(&self) -> usize {
        match self {
            Sequences::Padded(array) => array.nrows(),
            Sequences::Ragged(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Sequences::Padded(array) => array.shape().to_vec(),
            Sequences::Ragged(rows) => vec![rows.len()],
        }
    }

    /// The row for a particular example.
    pub fn get(&self, example: usize) -> Option<Vec<T>> {
        match self {
            Sequences::Padded(array) => {
                (example < array.nrows()).then(|| array.row(example).to_vec())
            },
            Sequences::Ragged(rows) => rows.get(example).cloned(),
        }
    }
}

/// Label ids, one-hot encoded over the tag vocabulary in fixed-length mode.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelIds {
    /// `[examples, max_seq_length, tags]`
    OneHot(Array3<f32>),
    Ragged(Vec<Vec<u32>>),
}

impl LabelIds {
    pub fn len(&self) -> usize {
        match self {
            LabelIds::OneHot(array) => array.len_of(Axis(0)),
            LabelIds::Ragged(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            LabelIds::OneHot(array) => array.shape().to_vec(),
            LabelIds::Ragged(rows) => vec![rows.len()],
        }
    }

    /// The label id at each position of an example, decoding the one-hot
    /// representation if necessary.
    pub fn class_ids(&self, example: usize) -> Option<Vec<u32>> {
        match self {
            LabelIds::OneHot(array) => {
                if example >= array.len_of(Axis(0)) {
                    return None;
                }

                let ids = array
                    .index_axis(Axis(0), example)
                    .outer_iter()
                    .map(|position| {
                        position.iter().position(|&v| v > 0.5).unwrap_or(0)
                            as u32
                    })
                    .collect();

                Some(ids)
            },
            LabelIds::Ragged(rows) => rows.get(example).cloned(),
        }
    }
}

/// The model inputs for a batch of examples.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFeatures {
    pub input_word_ids: Sequences<i64>,
    pub input_mask: Sequences<i64>,
    pub input_type_ids: Sequences<i64>,
}

impl InputFeatures {
    pub fn num_examples(&self) -> usize { self.input_word_ids.len() }
}

/// The training targets for a batch of examples.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFeatures {
    pub label_ids: LabelIds,
    pub label_mask: Sequences<bool>,
}

impl TargetFeatures {
    pub fn num_examples(&self) -> usize { self.label_ids.len() }
}

/// Encode every example in a split.
///
/// When `tag_seq` is `None` (test data) every word is given the
/// [`TagVocab::PAD`] tag.
pub fn convert_examples_to_features<T>(
    word_seq: &[Vec<String>],
    tag_seq: Option<&[Vec<String>]>,
    vocab: &TagVocab,
    tokenizer: &T,
    options: &FeatureOptions,
) -> Result<(InputFeatures, TargetFeatures), FeatureError>
where
    T: SubwordTokenizer + ?Sized,
{
    let _span = tracing::info_span!(
        "Converting examples",
        examples = word_seq.len(),
        fixed_length = options.use_max_seq,
    )
    .entered();

    if let Some(tag_seq) = tag_seq {
        if tag_seq.len() != word_seq.len() {
            return Err(FeatureError::ExampleCountMismatch {
                words: word_seq.len(),
                tags: tag_seq.len(),
            });
        }
    }

    let mut input_ids = Vec::with_capacity(word_seq.len());
    let mut input_mask = Vec::with_capacity(word_seq.len());
    let mut segment_ids = Vec::with_capacity(word_seq.len());
    let mut label_ids = Vec::with_capacity(word_seq.len());
    let mut label_mask = Vec::with_capacity(word_seq.len());

    for (example, words) in word_seq.iter().enumerate() {
        let tags = tag_seq.map(|t| t[example].as_slice());
        let encoded =
            encode_example(example, words, tags, vocab, tokenizer, options)?;

        input_ids.push(encoded.input_ids);
        input_mask.push(encoded.input_mask);
        segment_ids.push(encoded.segment_ids);
        label_ids.push(encoded.label_ids);
        label_mask.push(encoded.label_mask);
    }

    if !options.use_max_seq {
        let inputs = InputFeatures {
            input_word_ids: Sequences::Ragged(input_ids),
            input_mask: Sequences::Ragged(input_mask),
            input_type_ids: Sequences::Ragged(segment_ids),
        };
        let targets = TargetFeatures {
            label_ids: LabelIds::Ragged(label_ids),
            label_mask: Sequences::Ragged(label_mask),
        };
        return Ok((inputs, targets));
    }

    let width = options.max_seq_length;
    let inputs = InputFeatures {
        input_word_ids: Sequences::Padded(stack(input_ids, width)),
        input_mask: Sequences::Padded(stack(input_mask, width)),
        input_type_ids: Sequences::Padded(stack(segment_ids, width)),
    };
    let targets = TargetFeatures {
        label_ids: LabelIds::OneHot(one_hot(
            &stack(label_ids, width),
            vocab.len(),
        )),
        label_mask: Sequences::Padded(stack(label_mask, width)),
    };

    Ok((inputs, targets))
}

/// Encode a single example.
pub fn encode_example<T>(
    example: usize,
    words: &[String],
    tags: Option<&[String]>,
    vocab: &TagVocab,
    tokenizer: &T,
    options: &FeatureOptions,
) -> Result<EncodedExample, FeatureError>
where
    T: SubwordTokenizer + ?Sized,
{
    if options.use_max_seq && options.max_seq_length < 2 {
        return Err(FeatureError::SequenceTooShort {
            max_seq_length: options.max_seq_length,
        });
    }

    let tags: Vec<&str> = match tags {
        Some(tags) if tags.len() != words.len() => {
            return Err(FeatureError::LengthMismatch {
                example,
                words: words.len(),
                tags: tags.len(),
            });
        },
        Some(tags) => tags.iter().map(String::as_str).collect(),
        None => vec![TagVocab::PAD; words.len()],
    };

    let mut tokens = Vec::new();
    let mut labels = Vec::new();
    let mut label_mask = Vec::new();

    for (word, &tag) in words.iter().zip(&tags) {
        match word.as_str() {
            UNKNOWN_WORD => {
                tokens.push(UNK.to_string());
                labels.push(tag);
                label_mask.push(true);
            },
            PAD_WORD => {},
            _ => {
                let pieces = tokenizer.tokenize(word);

                if pieces.is_empty() {
                    tracing::debug!(
                        example,
                        %word,
                        "The tokenizer produced no subwords, dropping the word",
                    );
                }

                for (m, piece) in pieces.into_iter().enumerate() {
                    tokens.push(piece);

                    if m == 0 {
                        labels.push(tag);
                        label_mask.push(true);
                    } else {
                        labels.push(TagVocab::INVALID);
                        label_mask.push(false);
                    }
                }
            },
        }
    }

    // Leave room for the [CLS] and [SEP] markers
    if options.use_max_seq && tokens.len() >= options.max_seq_length - 1 {
        let keep = options.max_seq_length - 2;
        tracing::debug!(example, tokens = tokens.len(), keep, "Truncating");

        tokens.truncate(keep);
        labels.truncate(keep);
        label_mask.truncate(keep);
    }

    let mut ntokens = Vec::with_capacity(tokens.len() + 2);
    let mut label_ids = Vec::with_capacity(tokens.len() + 2);

    ntokens.push(CLS.to_string());
    label_ids.push(TagVocab::CLS_ID);

    for (token, label) in tokens.into_iter().zip(labels) {
        let id = vocab.tag_to_id(label).ok_or_else(|| {
            FeatureError::UnknownTag {
                example,
                tag: label.to_string(),
            }
        })?;

        ntokens.push(token);
        label_ids.push(id);
    }

    ntokens.push(SEP.to_string());
    label_ids.push(TagVocab::SEPARATOR_ID);

    label_mask.insert(0, false);
    label_mask.push(false);

    let mut segment_ids = vec![0; ntokens.len()];
    let mut input_ids = tokenizer.convert_tokens_to_ids(&ntokens);
    assert_eq!(
        input_ids.len(),
        ntokens.len(),
        "The tokenizer should return one id per token",
    );
    let mut input_mask = vec![1; input_ids.len()];

    if options.use_max_seq {
        let len = options.max_seq_length;

        pad(&mut input_ids, len, 0);
        pad(&mut input_mask, len, 0);
        pad(&mut segment_ids, len, 0);
        pad(&mut label_ids, len, 0);
        pad(&mut label_mask, len, false);

        assert_eq!(input_ids.len(), len);
        assert_eq!(input_mask.len(), len);
        assert_eq!(segment_ids.len(), len);
        assert_eq!(label_ids.len(), len);
        assert_eq!(label_mask.len(), len);
    }

    if example < options.print_examples {
        tracing::info!(
            example,
            tokens = %ntokens.join(" "),
            input_ids = %input_ids.iter().join(" "),
            input_mask = %input_mask.iter().join(" "),
            segment_ids = %segment_ids.iter().join(" "),
            label_ids = %label_ids.iter().join(" "),
            labels = %vocab.decode(&label_ids).join(" "),
            "Encoded example",
        );
    }

    Ok(EncodedExample {
        tokens: ntokens,
        input_ids,
        input_mask,
        segment_ids,
        label_ids,
        label_mask,
    })
}

fn pad<T: Clone>(values: &mut Vec<T>, len: usize, value: T) {
    if values.len() < len {
        values.resize(len, value);
    }
}

fn stack<T: Clone>(rows: Vec<Vec<T>>, width: usize) -> Array2<T> {
    let height = rows.len();
    let elements: Vec<T> = rows.into_iter().flatten().collect();

    Array2::from_shape_vec((height, width), elements)
        .expect("Every row is padded to the same width")
}

fn one_hot(label_ids: &Array2<u32>, num_classes: usize) -> Array3<f32> {
    let (examples, positions) = label_ids.dim();
    let mut encoded = Array3::zeros((examples, positions, num_classes));

    for ((example, position), &id) in label_ids.indexed_iter() {
        encoded[[example, position, id as usize]] = 1.0;
    }

    encoded
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeatureError {
    #[error("Example {example} uses the \"{tag}\" tag, which isn't in the tag vocabulary")]
    UnknownTag { example: usize, tag: String },
    #[error("Example {example} has {words} words but {tags} tags")]
    LengthMismatch {
        example: usize,
        words: usize,
        tags: usize,
    },
    #[error("There are {words} word sequences but {tags} tag sequences")]
    ExampleCountMismatch { words: usize, tags: usize },
    #[error("The maximum sequence length must be at least 2, got {max_seq_length}")]
    SequenceTooShort { max_seq_length: usize },
}
