//! Test fixtures for integration tests.

use judge::inference::mock::{MOCK_END, MOCK_NO, MOCK_YES};
use judge::{
    CandidatePolicy, JudgeSession, MockInferenceProvider, MockTurn, MockVocabulary,
    QueryDocumentPair, SessionSettings,
};

pub const BACKEND_EXPERIENCE: &str = "Занимался разработкой новых и оптимизацией существующих backend-сервисов для корпоративной системы, обеспечивал интеграцию со сторонними провайдерами данных.¶¶Стек: .NET 6 - 8, EF, MSSQL, PostgreSQL, Swagger";

/// Logit margin between the winning and losing answer in scripted turns.
pub const DEFAULT_MARGIN: f32 = 3.0;

pub type MockSession = JudgeSession<MockInferenceProvider, MockVocabulary>;

/// Model that prefers "Yes" by `margin` and answers "Yes".
pub fn affirmative_turn(margin: f32) -> MockTurn {
    MockTurn::yes_no(margin, 0.0).script(vec![MOCK_YES, MOCK_END])
}

/// Model that prefers "No" by `margin` and answers "No".
pub fn negative_turn(margin: f32) -> MockTurn {
    MockTurn::yes_no(0.0, margin).script(vec![MOCK_NO, MOCK_END])
}

#[derive(Default)]
pub struct SessionBuilder {
    turns: Vec<MockTurn>,
    vocabulary: Option<MockVocabulary>,
    settings: Option<SessionSettings>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turn(mut self, turn: MockTurn) -> Self {
        self.turns.push(turn);
        self
    }

    pub fn vocabulary(mut self, vocabulary: MockVocabulary) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> MockSession {
        JudgeSession::new(
            MockInferenceProvider::new(self.turns),
            self.vocabulary.unwrap_or_default(),
            &CandidatePolicy::default(),
            self.settings.unwrap_or_default(),
        )
        .expect("Mock session should resolve default candidates")
    }
}

pub fn matching_pair() -> QueryDocumentPair {
    QueryDocumentPair::new("C# Backend developer", BACKEND_EXPERIENCE)
}

pub fn mismatched_pair() -> QueryDocumentPair {
    QueryDocumentPair::new("What is the capital of China?", "A CAT LIKE MILK")
}
