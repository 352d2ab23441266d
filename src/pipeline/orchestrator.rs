use tracing::{debug, info, warn};

use crate::constants::LOGITS_TENSOR_NAME;
use crate::decoding::BoundedDecoder;
use crate::inference::{InferenceError, InferenceProvider, VocabularyOracle};
use crate::prompt::build_prompt;

use super::error::PipelineError;
use super::session::JudgeSession;
use super::types::{BatchReport, PairFailure, PairOutcome, PairResult, QueryDocumentPair};

/// Runs pairs one at a time against a borrowed [`JudgeSession`].
///
/// Per pair: build the prompt, encode it, prime the provider, snapshot `"logits"`, score
/// the snapshot, then run the bounded decoder from the same primed context. The
/// generation context is released after every pair, including failed ones.
pub struct PairOrchestrator<'s, P: InferenceProvider, V: VocabularyOracle> {
    session: &'s mut JudgeSession<P, V>,
}

impl<'s, P: InferenceProvider, V: VocabularyOracle> PairOrchestrator<'s, P, V> {
    pub fn new(session: &'s mut JudgeSession<P, V>) -> Self {
        Self { session }
    }

    /// Processes every pair in order. One outcome per input pair; failures do not
    /// stop the batch.
    pub fn run(&mut self, pairs: &[QueryDocumentPair]) -> BatchReport {
        info!(pairs = pairs.len(), "Starting batch");

        let outcomes: Vec<PairOutcome> = pairs
            .iter()
            .enumerate()
            .map(|(index, pair)| self.process_pair(index, pair))
            .collect();

        let report = BatchReport::new(outcomes);
        info!(
            scored = report.results().count(),
            failed = report.failures().count(),
            "Batch finished"
        );
        report
    }

    pub fn process_pair(&mut self, index: usize, pair: &QueryDocumentPair) -> PairOutcome {
        let outcome = self.score_and_decode(index, pair);
        self.session.provider.release();

        outcome.map_err(|err| {
            let failure = PairFailure {
                index,
                query: pair.query.clone(),
                kind: err.failure_kind(),
                message: err.to_string(),
            };
            warn!(index, kind = %failure.kind, error = %err, "Pair failed");
            failure
        })
    }

    fn score_and_decode(
        &mut self,
        index: usize,
        pair: &QueryDocumentPair,
    ) -> Result<PairResult, PipelineError> {
        let session = &mut *self.session;
        let settings = &session.settings;

        let prompt = build_prompt(
            settings.template,
            settings.instruction.as_deref(),
            &pair.query,
            &pair.document,
        );
        let tokens = session
            .vocabulary
            .encode(&prompt)?
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::TokenizationFailed {
                reason: "prompt produced no segmentation".to_string(),
            })?;
        debug!(index, prompt_tokens = tokens.len(), "Priming provider");

        session.provider.prime(&settings.generation, &tokens)?;

        // Snapshot before any token is appended.
        let logits = session.provider.fetch_named_tensor(LOGITS_TENSOR_NAME)?;
        let score = session.scorer.score(&logits)?;

        let stream = session.vocabulary.create_incremental_decoder();
        let transcript =
            BoundedDecoder::new(settings.max_new_tokens).run(&mut session.provider, stream)?;

        info!(
            index,
            relevance = score.relevance.affirmative(),
            response = %transcript.text,
            state = %transcript.state,
            "Pair judged"
        );

        Ok(PairResult {
            index,
            query: pair.query.clone(),
            document: pair.document.clone(),
            score,
            transcript,
        })
    }
}
