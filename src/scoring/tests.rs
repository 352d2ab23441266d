use super::*;
use crate::inference::mock::{
    MOCK_NO, MOCK_NO_SPACED, MOCK_VOCAB_SIZE, MOCK_YES, MOCK_YES_SPACED, MockVocabulary,
    yes_no_logits,
};
use candle_core::{Device, Tensor};

fn default_scorer() -> DecisionScorer {
    let candidates = CandidatePolicy::default()
        .resolve(&MockVocabulary::new())
        .expect("default surfaces resolve");
    DecisionScorer::new(candidates)
}

fn score_pair(yes: f32, no: f32) -> f32 {
    default_scorer()
        .score(&yes_no_logits(yes, no, &[1, MOCK_VOCAB_SIZE]).unwrap())
        .expect("score")
        .relevance
        .affirmative()
}

#[test]
fn test_equal_logits_score_one_half() {
    assert_eq!(two_way_softmax(0.0, 0.0), 0.5);
    assert_eq!(two_way_softmax(-37.25, -37.25), 0.5);
    assert_eq!(score_pair(3.5, 3.5), 0.5);
}

#[test]
fn test_swapping_logits_complements_score() {
    for (a, b) in [(2.0f32, -1.0f32), (0.25, 4.0), (-8.0, -9.5)] {
        let forward = two_way_softmax(a, b);
        let backward = two_way_softmax(b, a);
        assert!((forward + backward - 1.0).abs() < 1e-6, "{a}, {b}");
    }
}

#[test]
fn test_score_is_shift_invariant() {
    let base = two_way_softmax(2.0, -1.0);

    for shift in [1.0e6f32, -1.0e6] {
        let shifted = two_way_softmax(2.0 + shift, -1.0 + shift);
        assert!((base - shifted).abs() < 1e-6, "shift {shift}");
    }
}

#[test]
fn test_extreme_logits_stay_finite() {
    let high = two_way_softmax(1.0e30, -1.0e30);
    let low = two_way_softmax(-1.0e30, 1.0e30);

    assert_eq!(high, 1.0);
    assert_eq!(low, 0.0);
}

#[test]
fn test_rank_three_reads_last_position() {
    let scorer = default_scorer();
    let direct = scorer
        .score(&yes_no_logits(4.0, 1.0, &[1, MOCK_VOCAB_SIZE]).unwrap())
        .unwrap();
    let sliced = scorer
        .score(&yes_no_logits(4.0, 1.0, &[1, 5, MOCK_VOCAB_SIZE]).unwrap())
        .unwrap();

    assert_eq!(direct.relevance, sliced.relevance);
    assert!(sliced.relevance.is_relevant());
    assert_eq!(sliced.logits_dims, vec![1, 5, MOCK_VOCAB_SIZE]);
}

#[test]
fn test_rank_three_single_position_matches_direct() {
    let scorer = default_scorer();
    let direct = scorer
        .score(&yes_no_logits(-1.0, 2.0, &[1, MOCK_VOCAB_SIZE]).unwrap())
        .unwrap();
    let single = scorer
        .score(&yes_no_logits(-1.0, 2.0, &[1, 1, MOCK_VOCAB_SIZE]).unwrap())
        .unwrap();

    assert_eq!(direct.relevance, single.relevance);
}

#[test]
fn test_malformed_rank_rejected() {
    let scorer = default_scorer();

    let rank_one = Tensor::zeros(MOCK_VOCAB_SIZE, candle_core::DType::F32, &Device::Cpu).unwrap();
    let err = scorer.score(&rank_one).unwrap_err();
    assert!(matches!(
        err,
        ScoringError::MalformedLogitShape { rank: 1, .. }
    ));

    let rank_four =
        Tensor::zeros((1, 1, 2, MOCK_VOCAB_SIZE), candle_core::DType::F32, &Device::Cpu).unwrap();
    let err = scorer.score(&rank_four).unwrap_err();
    assert!(matches!(
        err,
        ScoringError::MalformedLogitShape { rank: 4, .. }
    ));
}

#[test]
fn test_zero_sized_dimension_rejected() {
    let err = LogitView::from_dims(&[1, 0, 32]).unwrap_err();
    assert!(matches!(err, ScoringError::EmptyLogits { .. }));
}

#[test]
fn test_token_out_of_range() {
    let scorer = default_scorer();
    // Vocabulary of 16 cannot hold MOCK_NO (20).
    let logits = Tensor::zeros((1, 16), candle_core::DType::F32, &Device::Cpu).unwrap();

    let err = scorer.score(&logits).unwrap_err();
    assert!(matches!(
        err,
        ScoringError::TokenOutOfRange {
            token_id: MOCK_NO,
            vocab_size: 16
        }
    ));
}

#[test]
fn test_non_finite_logit_rejected() {
    let scorer = default_scorer();
    let logits = yes_no_logits(f32::NAN, 0.0, &[1, MOCK_VOCAB_SIZE]).unwrap();

    let err = scorer.score(&logits).unwrap_err();
    assert!(matches!(
        err,
        ScoringError::NonFiniteLogit {
            token_id: MOCK_YES,
            ..
        }
    ));
}

#[test]
fn test_non_finite_secondary_candidate_still_scores() {
    let scorer = default_scorer();
    let mut data = vec![0.0f32; MOCK_VOCAB_SIZE];
    data[MOCK_YES as usize] = 2.0;
    data[MOCK_YES_SPACED as usize] = f32::NAN;
    data[MOCK_NO_SPACED as usize] = f32::NEG_INFINITY;
    let logits = Tensor::from_vec(data, (1, MOCK_VOCAB_SIZE), &Device::Cpu).unwrap();

    let score = scorer.score(&logits).unwrap();

    assert_eq!(score.relevance, RelevanceScore::new(two_way_softmax(2.0, 0.0)));
    assert!(score.relevance.is_relevant());
    assert!(score.candidates[1].logit.is_nan());
    assert_eq!(score.candidates[3].logit, f32::NEG_INFINITY);
}

#[test]
fn test_all_candidates_reported() {
    let score = default_scorer()
        .score(&yes_no_logits(1.5, -0.5, &[1, MOCK_VOCAB_SIZE]).unwrap())
        .unwrap();

    let ids: Vec<_> = score
        .candidates
        .iter()
        .map(|c| c.encoding.token_id)
        .collect();
    assert_eq!(ids, vec![MOCK_YES, MOCK_YES_SPACED, MOCK_NO, MOCK_NO_SPACED]);

    assert_eq!(score.affirmative.logit, 1.5);
    assert_eq!(score.negative.logit, -0.5);
    // Spaced variants sit at zero in the mock logits.
    assert_eq!(score.candidates[1].logit, 0.0);
}

#[test]
fn test_unspaced_surface_is_authoritative() {
    let candidates = CandidatePolicy::default()
        .resolve(&MockVocabulary::new())
        .unwrap();

    assert_eq!(candidates.authoritative(Polarity::Affirmative).token_id, MOCK_YES);
    assert_eq!(candidates.authoritative(Polarity::Negative).token_id, MOCK_NO);
    assert_eq!(candidates.of(Polarity::Affirmative).count(), 2);
}

#[test]
fn test_multi_token_surface_skipped() {
    let vocab = MockVocabulary::new().with_piece("Yes", vec![7, 8]);
    let candidates = CandidatePolicy::default().resolve(&vocab).unwrap();

    let affirmative = candidates.authoritative(Polarity::Affirmative);
    assert_eq!(affirmative.surface, " yes");
    assert_eq!(affirmative.token_id, MOCK_YES_SPACED);
}

#[test]
fn test_polarity_without_single_token_surface_fails() {
    let vocab = MockVocabulary::new()
        .with_piece("No", vec![7, 8])
        .with_piece(" no", vec![9, 8]);

    let err = CandidatePolicy::default().resolve(&vocab).unwrap_err();
    assert!(matches!(
        err,
        ScoringError::NoSingleTokenCandidate {
            polarity: Polarity::Negative,
            ..
        }
    ));
}

#[test]
fn test_custom_policy_order_selects_authoritative() {
    let policy = CandidatePolicy::new(
        vec![" yes".to_string(), "Yes".to_string()],
        vec!["No".to_string()],
    );
    let candidates = policy.resolve(&MockVocabulary::new()).unwrap();

    assert_eq!(
        candidates.authoritative(Polarity::Affirmative).token_id,
        MOCK_YES_SPACED
    );
    assert_eq!(candidates.all().len(), 3);
}

#[test]
fn test_relevance_score_accessors() {
    let score = RelevanceScore::new(0.75);

    assert_eq!(score.affirmative(), 0.75);
    assert_eq!(score.negative(), 0.25);
    assert!(score.is_relevant());
    assert!(!RelevanceScore::new(0.5).is_relevant());
    assert_eq!(score.to_string(), "0.7500");
}
