use candle_core::{DType, Tensor};
use tracing::{debug, warn};

use super::error::ScoringError;
use super::types::{
    CandidateEncoding, CandidateLogit, CandidateSet, DecisionScore, LogitView, Polarity,
    RelevanceScore,
};

/// Two-way softmax share of `affirmative` against `negative`.
///
/// Both logits are shifted by their maximum before exponentiating, so large magnitudes
/// neither overflow nor underflow to `0/0`. Equal inputs give exactly `0.5`.
pub fn two_way_softmax(affirmative: f32, negative: f32) -> f32 {
    let (a, n) = (f64::from(affirmative), f64::from(negative));
    let max = a.max(n);
    let exp_a = (a - max).exp();
    let exp_n = (n - max).exp();
    (exp_a / (exp_a + exp_n)) as f32
}

/// Turns a logits snapshot into a [`RelevanceScore`] over a fixed [`CandidateSet`].
///
/// Pure: the same logits and candidates always give the same score.
#[derive(Debug, Clone)]
pub struct DecisionScorer {
    candidates: CandidateSet,
}

impl DecisionScorer {
    pub fn new(candidates: CandidateSet) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    /// Scores a rank-2 (`[batch, vocab]`) or rank-3 (`[batch, seq, vocab]`) logits
    /// tensor. Only the first batch row is read.
    pub fn score(&self, logits: &Tensor) -> Result<DecisionScore, ScoringError> {
        let dims = logits.dims().to_vec();
        let view = LogitView::from_dims(&dims)?;

        debug!(dims = ?dims, view = ?view, dtype = ?logits.dtype(), "Scoring logits");

        let flat = logits
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;

        self.score_flat(view, &flat, dims)
    }

    /// Scores an already flattened buffer laid out as `view` describes.
    pub fn score_flat(
        &self,
        view: LogitView,
        flat: &[f32],
        dims: Vec<usize>,
    ) -> Result<DecisionScore, ScoringError> {
        let offset = view.offset();
        let vocab_size = view.vocab_size();
        if flat.len() < offset + vocab_size {
            return Err(ScoringError::EmptyLogits { dims });
        }
        let slice = &flat[offset..offset + vocab_size];

        let candidates = self
            .candidates
            .all()
            .iter()
            .map(|encoding| lookup_logit(slice, encoding))
            .collect::<Result<Vec<_>, _>>()?;

        for candidate in &candidates {
            // Only the authoritative pair feeds the score; other spellings are reported.
            if !candidate.logit.is_finite() {
                warn!(
                    polarity = %candidate.encoding.polarity,
                    surface = ?candidate.encoding.surface,
                    token_id = candidate.encoding.token_id,
                    logit = candidate.logit,
                    "Non-finite candidate logit"
                );
            }
            debug!(
                polarity = %candidate.encoding.polarity,
                surface = ?candidate.encoding.surface,
                token_id = candidate.encoding.token_id,
                logit = candidate.logit,
                "Candidate logit"
            );
        }

        let affirmative =
            read_logit(slice, self.candidates.authoritative(Polarity::Affirmative))?;
        let negative = read_logit(slice, self.candidates.authoritative(Polarity::Negative))?;

        let relevance = RelevanceScore::new(two_way_softmax(affirmative.logit, negative.logit));

        debug!(
            affirmative_logit = affirmative.logit,
            negative_logit = negative.logit,
            relevance = relevance.affirmative(),
            "Computed relevance"
        );

        Ok(DecisionScore {
            relevance,
            affirmative,
            negative,
            candidates,
            logits_dims: dims,
        })
    }
}

fn lookup_logit(
    slice: &[f32],
    encoding: &CandidateEncoding,
) -> Result<CandidateLogit, ScoringError> {
    let logit = slice
        .get(encoding.token_id as usize)
        .copied()
        .ok_or(ScoringError::TokenOutOfRange {
            token_id: encoding.token_id,
            vocab_size: slice.len(),
        })?;

    Ok(CandidateLogit {
        encoding: encoding.clone(),
        logit,
    })
}

/// Like [`lookup_logit`], but a NaN or infinite value is an error.
fn read_logit(
    slice: &[f32],
    encoding: &CandidateEncoding,
) -> Result<CandidateLogit, ScoringError> {
    let candidate = lookup_logit(slice, encoding)?;
    if !candidate.logit.is_finite() {
        return Err(ScoringError::NonFiniteLogit {
            token_id: encoding.token_id,
            logit: candidate.logit,
        });
    }
    Ok(candidate)
}
