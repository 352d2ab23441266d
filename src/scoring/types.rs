use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{DEFAULT_AFFIRMATIVE_SURFACES, DEFAULT_NEGATIVE_SURFACES};
use crate::inference::{TokenId, VocabularyOracle};

use super::error::ScoringError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
/// Which answer a candidate token stands for.
pub enum Polarity {
    Affirmative,
    Negative,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Affirmative => write!(f, "affirmative"),
            Polarity::Negative => write!(f, "negative"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// One single-token spelling of an answer.
pub struct CandidateEncoding {
    /// Surface form as passed to the tokenizer (leading whitespace included).
    pub surface: String,
    pub token_id: TokenId,
    pub polarity: Polarity,
}

impl CandidateEncoding {
    pub fn new(surface: impl Into<String>, token_id: TokenId, polarity: Polarity) -> Self {
        Self {
            surface: surface.into(),
            token_id,
            polarity,
        }
    }
}

/// Ordered surface forms per polarity.
///
/// Resolution keeps every surface that encodes to exactly one token. The first resolved
/// surface of each polarity is authoritative for scoring, so list order is the selection
/// policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePolicy {
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
}

impl Default for CandidatePolicy {
    fn default() -> Self {
        Self {
            affirmative: DEFAULT_AFFIRMATIVE_SURFACES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            negative: DEFAULT_NEGATIVE_SURFACES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CandidatePolicy {
    pub fn new(affirmative: Vec<String>, negative: Vec<String>) -> Self {
        Self {
            affirmative,
            negative,
        }
    }

    pub fn surfaces(&self, polarity: Polarity) -> &[String] {
        match polarity {
            Polarity::Affirmative => &self.affirmative,
            Polarity::Negative => &self.negative,
        }
    }

    /// Encodes every surface and keeps the single-token ones.
    ///
    /// Uses the first segmentation the oracle returns. Multi-token surfaces are skipped;
    /// a polarity with no single-token surface is an error.
    pub fn resolve<V: VocabularyOracle + ?Sized>(
        &self,
        vocabulary: &V,
    ) -> Result<CandidateSet, ScoringError> {
        let mut encodings = Vec::new();

        for polarity in [Polarity::Affirmative, Polarity::Negative] {
            let surfaces = self.surfaces(polarity);
            let before = encodings.len();

            for surface in surfaces {
                let segmentations = vocabulary.encode(surface)?;
                match segmentations.first().map(Vec::as_slice) {
                    Some(&[token_id]) => {
                        debug!(
                            %polarity,
                            surface = ?surface,
                            token_id,
                            "Resolved candidate encoding"
                        );
                        encodings.push(CandidateEncoding::new(
                            surface.clone(),
                            token_id,
                            polarity,
                        ));
                    }
                    other => {
                        warn!(
                            %polarity,
                            surface = ?surface,
                            tokens = ?other,
                            "Candidate surface is not a single token, skipping"
                        );
                    }
                }
            }

            if encodings.len() == before {
                return Err(ScoringError::NoSingleTokenCandidate {
                    polarity,
                    surfaces: surfaces.to_vec(),
                });
            }
        }

        CandidateSet::new(encodings)
    }
}

/// Every resolved candidate, in policy order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSet {
    encodings: Vec<CandidateEncoding>,
    #[serde(skip)]
    affirmative: usize,
    #[serde(skip)]
    negative: usize,
}

impl CandidateSet {
    /// Requires at least one encoding of each polarity; the first of each is
    /// authoritative.
    pub fn new(encodings: Vec<CandidateEncoding>) -> Result<Self, ScoringError> {
        let first_of = |polarity: Polarity| {
            encodings
                .iter()
                .position(|e| e.polarity == polarity)
                .ok_or(ScoringError::NoSingleTokenCandidate {
                    polarity,
                    surfaces: vec![],
                })
        };
        let affirmative = first_of(Polarity::Affirmative)?;
        let negative = first_of(Polarity::Negative)?;

        Ok(Self {
            encodings,
            affirmative,
            negative,
        })
    }

    pub fn all(&self) -> &[CandidateEncoding] {
        &self.encodings
    }

    pub fn of(&self, polarity: Polarity) -> impl Iterator<Item = &CandidateEncoding> {
        self.encodings.iter().filter(move |e| e.polarity == polarity)
    }

    /// The encoding that enters the two-way softmax for `polarity`.
    pub fn authoritative(&self, polarity: Polarity) -> &CandidateEncoding {
        match polarity {
            Polarity::Affirmative => &self.encodings[self.affirmative],
            Polarity::Negative => &self.encodings[self.negative],
        }
    }
}

/// How a logits tensor maps onto the vocabulary slice for the decision position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogitView {
    /// `[batch, vocab]`: already the next-token distribution.
    DirectVector { vocab_size: usize },
    /// `[batch, seq, vocab]`: the decision slice is the last sequence position.
    LastPositionSlice { seq_len: usize, vocab_size: usize },
}

impl LogitView {
    pub fn from_dims(dims: &[usize]) -> Result<Self, ScoringError> {
        let view = match *dims {
            [_batch, vocab_size] => LogitView::DirectVector { vocab_size },
            [_batch, seq_len, vocab_size] => LogitView::LastPositionSlice {
                seq_len,
                vocab_size,
            },
            _ => {
                return Err(ScoringError::MalformedLogitShape {
                    rank: dims.len(),
                    dims: dims.to_vec(),
                });
            }
        };

        if dims.contains(&0) {
            return Err(ScoringError::EmptyLogits {
                dims: dims.to_vec(),
            });
        }

        Ok(view)
    }

    pub fn vocab_size(&self) -> usize {
        match *self {
            LogitView::DirectVector { vocab_size }
            | LogitView::LastPositionSlice { vocab_size, .. } => vocab_size,
        }
    }

    /// Flat index of the first logit of the decision slice.
    pub fn offset(&self) -> usize {
        match *self {
            LogitView::DirectVector { .. } => 0,
            LogitView::LastPositionSlice {
                seq_len,
                vocab_size,
            } => (seq_len - 1) * vocab_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
/// Probability that the answer is affirmative, given it is one of the two chosen
/// candidates. Not a full-vocabulary probability.
pub struct RelevanceScore(f32);

impl RelevanceScore {
    pub fn new(affirmative: f32) -> Self {
        Self(affirmative)
    }

    pub fn affirmative(&self) -> f32 {
        self.0
    }

    pub fn negative(&self) -> f32 {
        1.0 - self.0
    }

    pub fn is_relevant(&self) -> bool {
        self.0 > 0.5
    }
}

impl fmt::Display for RelevanceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A candidate encoding with the logit read at the decision position.
pub struct CandidateLogit {
    pub encoding: CandidateEncoding,
    pub logit: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Scorer output: the probability plus the logits it was derived from.
pub struct DecisionScore {
    pub relevance: RelevanceScore,
    pub affirmative: CandidateLogit,
    pub negative: CandidateLogit,
    /// Every resolved candidate, authoritative ones included.
    pub candidates: Vec<CandidateLogit>,
    pub logits_dims: Vec<usize>,
}
