use tracing::info;

use crate::config::Config;
use crate::inference::device::select_device;
use crate::inference::{
    CausalLmProvider, GenerationConfig, InferenceError, InferenceProvider, TokenizerOracle,
    VocabularyOracle,
};
use crate::prompt::PromptTemplate;
use crate::scoring::{CandidatePolicy, DecisionScorer};

use super::error::PipelineError;
use super::orchestrator::PairOrchestrator;

/// Per-session prompt and generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub template: PromptTemplate,
    /// System instruction; `None` uses the default.
    pub instruction: Option<String>,
    pub generation: GenerationConfig,
    pub max_new_tokens: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&Config::default(), PromptTemplate::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config, template: PromptTemplate) -> Self {
        Self {
            template,
            instruction: config.instruction.clone(),
            generation: config.generation_config(),
            max_new_tokens: config.max_new_tokens,
        }
    }
}

/// Model and tokenizer loaded once and reused across every pair of a batch.
///
/// Candidates are resolved at construction. Dropping the session releases the
/// provider's generation context.
pub struct JudgeSession<P: InferenceProvider, V: VocabularyOracle> {
    pub(super) provider: P,
    pub(super) vocabulary: V,
    pub(super) scorer: DecisionScorer,
    pub(super) settings: SessionSettings,
}

impl<P: InferenceProvider, V: VocabularyOracle> std::fmt::Debug for JudgeSession<P, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeSession")
            .field("candidates", self.scorer.candidates())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<P: InferenceProvider, V: VocabularyOracle> JudgeSession<P, V> {
    pub fn new(
        provider: P,
        vocabulary: V,
        policy: &CandidatePolicy,
        settings: SessionSettings,
    ) -> Result<Self, PipelineError> {
        let candidates = policy.resolve(&vocabulary)?;

        info!(
            candidates = candidates.all().len(),
            template = %settings.template,
            max_length = settings.generation.max_length,
            max_new_tokens = settings.max_new_tokens,
            "Judge session ready"
        );

        Ok(Self {
            provider,
            vocabulary,
            scorer: DecisionScorer::new(candidates),
            settings,
        })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn vocabulary(&self) -> &V {
        &self.vocabulary
    }

    pub fn scorer(&self) -> &DecisionScorer {
        &self.scorer
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn orchestrator(&mut self) -> PairOrchestrator<'_, P, V> {
        PairOrchestrator::new(self)
    }
}

impl JudgeSession<CausalLmProvider, TokenizerOracle> {
    /// Loads the tokenizer and GGUF model named by `config`.
    ///
    /// The prompt template is taken from `config` or inferred from the model
    /// architecture; its end-of-turn markers become the provider's stop tokens.
    pub fn open(config: &Config) -> Result<Self, PipelineError> {
        let model_load = |source: InferenceError| PipelineError::ModelLoad { source };

        let device = select_device().map_err(model_load)?;
        let vocabulary = TokenizerOracle::load(&config.tokenizer_path()).map_err(model_load)?;
        let provider = CausalLmProvider::load(&config.model_path, config.max_length, &device)
            .map_err(model_load)?;

        let template = config
            .template
            .unwrap_or_else(|| PromptTemplate::for_architecture(provider.architecture()));
        let stop_tokens: Vec<_> = template
            .stop_markers()
            .iter()
            .filter_map(|marker| vocabulary.token_id(marker))
            .collect();

        info!(
            architecture = provider.architecture(),
            template = %template,
            stop_tokens = ?stop_tokens,
            tokenizer_vocab = vocabulary.vocab_size(),
            model_vocab = provider.vocab_size(),
            "Model and tokenizer loaded"
        );

        let provider = provider.with_stop_tokens(stop_tokens);
        let settings = SessionSettings::from_config(config, template);
        Self::new(provider, vocabulary, &config.candidate_policy(), settings)
    }
}

impl<P: InferenceProvider, V: VocabularyOracle> Drop for JudgeSession<P, V> {
    fn drop(&mut self) {
        self.provider.release();
        info!("Judge session released");
    }
}
