//! Prompt construction.
//!
//! A prompt is a system turn carrying the judging instruction, a user turn carrying the
//! quoted `Vacancy` / `JobDescription` framing, and an open assistant turn. Turn markers
//! must match the chat convention the model was instruction-tuned on; pick them through
//! [`PromptTemplate`].

#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::constants::DEFAULT_INSTRUCTION;

/// Chat turn delimiter convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptTemplate {
    /// `<|system|>…<|end|><|user|>…<|end|><|assistant|>` (Phi-3 / Phi-4).
    #[default]
    Phi,
    /// `<|im_start|>role\n…<|im_end|>\n` (Qwen2 and other ChatML models).
    ChatMl,
}

impl PromptTemplate {
    /// Convention for a GGUF `general.architecture` value. Anything but `qwen2` uses Phi.
    pub fn for_architecture(architecture: &str) -> Self {
        match architecture {
            "qwen2" => PromptTemplate::ChatMl,
            _ => PromptTemplate::Phi,
        }
    }

    /// Markers that end the assistant turn; the provider stops on any of them.
    pub fn stop_markers(&self) -> &'static [&'static str] {
        match self {
            PromptTemplate::Phi => &["<|end|>", "<|endoftext|>"],
            PromptTemplate::ChatMl => &["<|im_end|>", "<|endoftext|>"],
        }
    }

    fn turn(&self, role: &str, body: &str) -> String {
        match self {
            PromptTemplate::Phi => format!("<|{role}|>{body}<|end|>"),
            PromptTemplate::ChatMl => format!("<|im_start|>{role}\n{body}<|im_end|>\n"),
        }
    }

    fn assistant_opening(&self) -> &'static str {
        match self {
            PromptTemplate::Phi => "<|assistant|>",
            PromptTemplate::ChatMl => "<|im_start|>assistant\n",
        }
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptTemplate::Phi => write!(f, "phi"),
            PromptTemplate::ChatMl => write!(f, "chatml"),
        }
    }
}

impl FromStr for PromptTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phi" => Ok(PromptTemplate::Phi),
            "chatml" => Ok(PromptTemplate::ChatMl),
            other => Err(format!("unknown prompt template '{other}' (expected phi or chatml)")),
        }
    }
}

/// User-turn framing of a query/document pair.
pub fn format_instruction(query: &str, document: &str) -> String {
    format!("Vacancy:\"\n {query} \"\n JobDescription:\"\n {document} \"\n")
}

/// Full prompt text. `instruction` replaces the default system instruction when it is
/// present and non-empty.
pub fn build_prompt(
    template: PromptTemplate,
    instruction: Option<&str>,
    query: &str,
    document: &str,
) -> String {
    let instruction = instruction
        .filter(|i| !i.is_empty())
        .unwrap_or(DEFAULT_INSTRUCTION);

    let mut prompt = template.turn("system", instruction);
    prompt.push_str(&template.turn("user", &format_instruction(query, document)));
    prompt.push_str(template.assistant_opening());
    prompt
}
