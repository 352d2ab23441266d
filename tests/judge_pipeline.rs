//! Integration tests for the judge pipeline over scripted models.

mod common;

use common::fixtures::{
    DEFAULT_MARGIN, SessionBuilder, affirmative_turn, matching_pair, mismatched_pair,
    negative_turn,
};
use judge::inference::mock::{MOCK_VOCAB_SIZE, yes_no_logits};
use judge::{
    Config, DecoderState, FailureKind, MockTurn, PromptTemplate, QueryDocumentPair,
    SessionSettings,
};

#[test]
fn test_matching_pair_is_relevant() {
    let mut session = SessionBuilder::new()
        .turn(affirmative_turn(DEFAULT_MARGIN))
        .build();

    let result = session
        .orchestrator()
        .process_pair(0, &matching_pair())
        .expect("Pair should be scored");

    assert!(result.relevance().affirmative() > 0.5);
    assert!(result.response().contains("Yes"));
    assert_eq!(result.transcript.state, DecoderState::Done);
}

#[test]
fn test_mismatched_pair_is_not_relevant() {
    let mut session = SessionBuilder::new()
        .turn(negative_turn(DEFAULT_MARGIN))
        .build();

    let result = session
        .orchestrator()
        .process_pair(0, &mismatched_pair())
        .expect("Pair should be scored");

    assert!(result.relevance().affirmative() < 0.5);
    let relevance = result.relevance();
    assert!((relevance.negative() + relevance.affirmative() - 1.0).abs() < 1e-6);
}

#[test]
fn test_small_margin_still_decides() {
    let mut session = SessionBuilder::new().turn(affirmative_turn(0.01)).build();

    let result = session
        .orchestrator()
        .process_pair(0, &matching_pair())
        .unwrap();

    assert!(result.relevance().is_relevant());
}

#[test]
fn test_batch_preserves_order_with_failures() {
    let malformed = yes_no_logits(1.0, 0.0, &[1, 1, 2, MOCK_VOCAB_SIZE]).unwrap();
    let mut session = SessionBuilder::new()
        .turn(negative_turn(DEFAULT_MARGIN))
        .turn(MockTurn::with_logits(malformed))
        .turn(MockTurn::failing())
        .turn(affirmative_turn(DEFAULT_MARGIN))
        .build();

    let pairs = vec![
        mismatched_pair(),
        QueryDocumentPair::new("Explain gravity", "Gravity attracts bodies."),
        QueryDocumentPair::new("Unity developer", "Backend services"),
        matching_pair(),
    ];

    let report = session.orchestrator().run(&pairs);

    assert_eq!(report.len(), pairs.len());
    let kinds: Vec<Option<FailureKind>> = report
        .outcomes
        .iter()
        .map(|o| o.as_ref().err().map(|f| f.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            None,
            Some(FailureKind::MalformedLogitShape),
            Some(FailureKind::Inference),
            None
        ]
    );

    let queries: Vec<&str> = report
        .outcomes
        .iter()
        .map(|o| match o {
            Ok(result) => result.query.as_str(),
            Err(failure) => failure.query.as_str(),
        })
        .collect();
    let expected: Vec<&str> = pairs.iter().map(|p| p.query.as_str()).collect();
    assert_eq!(queries, expected);

    assert_eq!(session.provider().release_count, pairs.len());
}

#[test]
fn test_capped_generation_is_a_valid_result() {
    let mut session = SessionBuilder::new()
        .turn(MockTurn::yes_no(2.0, 0.0).complete_after(None))
        .settings(SessionSettings {
            max_new_tokens: 4,
            ..SessionSettings::default()
        })
        .build();

    let result = session
        .orchestrator()
        .process_pair(0, &matching_pair())
        .expect("Capped generation is not a failure");

    assert!(result.transcript.was_capped());
    assert_eq!(result.transcript.tokens_generated, 4);
    assert_eq!(result.response(), "....");
}

#[test]
fn test_settings_from_config_flow_into_priming() {
    let config = Config {
        max_length: 1024,
        instruction: Some("Answer with yes or no.".to_string()),
        ..Config::default()
    };
    let mut session = SessionBuilder::new()
        .turn(affirmative_turn(DEFAULT_MARGIN))
        .settings(SessionSettings::from_config(&config, PromptTemplate::ChatMl))
        .build();

    session.orchestrator().process_pair(0, &matching_pair()).unwrap();

    let primed = &session.provider().configs;
    assert_eq!(primed.len(), 1);
    assert_eq!(primed[0].max_length, 1024);
    assert!(!primed[0].reuse_output_buffers);
    assert_eq!(session.settings().template, PromptTemplate::ChatMl);
}

#[test]
fn test_report_summary_lists_every_pair() {
    let mut session = SessionBuilder::new()
        .turn(affirmative_turn(DEFAULT_MARGIN))
        .turn(MockTurn::failing())
        .build();

    let report = session
        .orchestrator()
        .run(&[matching_pair(), mismatched_pair()]);
    let summary = report.summary();

    assert!(summary.contains("Pair 1:\n  Query: C# Backend developer\n"));
    assert!(summary.contains("  Model Response: Yes\n"));
    assert!(summary.contains(
        "Pair 2:\n  Query: What is the capital of China?\n  Failed (Inference)"
    ));
}
