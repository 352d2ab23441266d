use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::constants::{REPORT_DOCUMENT_PREVIEW, SUMMARY_DOCUMENT_PREVIEW};
use crate::decoding::GenerationTranscript;
use crate::scoring::{DecisionScore, RelevanceScore};

/// One unit of work: does `document` satisfy `query`?
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryDocumentPair {
    pub query: String,
    pub document: String,
}

impl QueryDocumentPair {
    pub fn new(query: impl Into<String>, document: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            document: document.into(),
        }
    }
}

/// Score and transcript for one pair, both taken from the same primed context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairResult {
    /// Position in the input batch.
    pub index: usize,
    pub query: String,
    pub document: String,
    pub score: DecisionScore,
    pub transcript: GenerationTranscript,
}

impl PairResult {
    pub fn relevance(&self) -> RelevanceScore {
        self.score.relevance
    }

    pub fn response(&self) -> &str {
        &self.transcript.text
    }
}

/// Taxonomy entry a per-pair failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedLogitShape,
    TokenOutOfRange,
    NonFiniteLogit,
    Tokenization,
    ContextExhausted,
    Inference,
    Decoding,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::MalformedLogitShape => "MalformedLogitShape",
            FailureKind::TokenOutOfRange => "TokenOutOfRange",
            FailureKind::NonFiniteLogit => "NonFiniteLogit",
            FailureKind::Tokenization => "Tokenization",
            FailureKind::ContextExhausted => "ContextExhausted",
            FailureKind::Inference => "Inference",
            FailureKind::Decoding => "Decoding",
        };
        f.write_str(name)
    }
}

/// A pair that produced no result. The batch continues past it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("pair {index} failed ({kind}): {message}")]
pub struct PairFailure {
    pub index: usize,
    pub query: String,
    pub kind: FailureKind,
    pub message: String,
}

pub type PairOutcome = Result<PairResult, PairFailure>;

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum OutcomeRecord<'a> {
    Scored(&'a PairResult),
    Failed(&'a PairFailure),
}

/// Outcomes of a batch run, one per input pair, in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<PairOutcome>,
}

impl BatchReport {
    pub fn new(outcomes: Vec<PairOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn results(&self) -> impl Iterator<Item = &PairResult> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &PairFailure> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    /// Per-pair report block: header, query, document preview, probabilities, response.
    pub fn pair_block(&self, position: usize, pair: &QueryDocumentPair) -> String {
        let mut out = format!(
            "=== Processing Pair {}/{} ===\nQuery: {}\nDocument: {}...\n\n",
            position + 1,
            self.len(),
            pair.query,
            preview(&pair.document, REPORT_DOCUMENT_PREVIEW)
        );

        match self.outcomes.get(position) {
            Some(Ok(result)) => {
                out.push_str(&format!(
                    "Relevance probability (yes): {}\nRelevance probability (no): {:.4}\nModel response: {}\n",
                    result.relevance(),
                    result.relevance().negative(),
                    result.response()
                ));
            }
            Some(Err(failure)) => {
                out.push_str(&format!("Failed: {failure}\n"));
            }
            None => {}
        }

        out.push('\n');
        out.push_str(&"-".repeat(80));
        out.push('\n');
        out
    }

    /// Summary section: one entry per pair with a short document preview.
    pub fn summary(&self) -> String {
        let mut out = String::from("=== SUMMARY RESULTS ===\n\n");

        for (position, outcome) in self.outcomes.iter().enumerate() {
            out.push_str(&format!("Pair {}:\n", position + 1));
            match outcome {
                Ok(result) => {
                    out.push_str(&format!(
                        "  Query: {}\n  Document: {}...\n  Yes Probability: {}\n  Model Response: {}\n",
                        result.query,
                        preview(&result.document, SUMMARY_DOCUMENT_PREVIEW),
                        result.relevance(),
                        result.response()
                    ));
                }
                Err(failure) => {
                    out.push_str(&format!(
                        "  Query: {}\n  Failed ({}): {}\n",
                        failure.query, failure.kind, failure.message
                    ));
                }
            }
            out.push('\n');
        }

        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let records: Vec<OutcomeRecord<'_>> = self
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                Ok(result) => OutcomeRecord::Scored(result),
                Err(failure) => OutcomeRecord::Failed(failure),
            })
            .collect();
        serde_json::to_string_pretty(&records)
    }
}

/// First `max_chars` characters of `text`.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
