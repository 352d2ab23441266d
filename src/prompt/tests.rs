use super::*;

#[test]
fn test_format_instruction_quotes_both_fields() {
    let framed = format_instruction("Unity developer", "Built games");

    assert_eq!(
        framed,
        "Vacancy:\"\n Unity developer \"\n JobDescription:\"\n Built games \"\n"
    );
}

#[test]
fn test_build_prompt_phi_default_instruction() {
    let prompt = build_prompt(PromptTemplate::Phi, None, "Q", "D");

    let expected = format!(
        "<|system|>{}<|end|><|user|>Vacancy:\"\n Q \"\n JobDescription:\"\n D \"\n<|end|><|assistant|>",
        DEFAULT_INSTRUCTION
    );
    assert_eq!(prompt, expected);
}

#[test]
fn test_build_prompt_empty_instruction_falls_back() {
    let with_empty = build_prompt(PromptTemplate::Phi, Some(""), "Q", "D");
    let with_none = build_prompt(PromptTemplate::Phi, None, "Q", "D");

    assert_eq!(with_empty, with_none);
}

#[test]
fn test_build_prompt_custom_instruction() {
    let prompt = build_prompt(PromptTemplate::Phi, Some("Answer yes or no."), "Q", "D");

    assert!(prompt.starts_with("<|system|>Answer yes or no.<|end|>"));
    assert!(!prompt.contains(DEFAULT_INSTRUCTION));
}

#[test]
fn test_build_prompt_chatml_ends_with_open_assistant_turn() {
    let prompt = build_prompt(PromptTemplate::ChatMl, None, "Q", "D");

    assert!(prompt.starts_with("<|im_start|>system\n"));
    assert!(prompt.contains("<|im_start|>user\nVacancy:"));
    assert!(prompt.ends_with("<|im_end|>\n<|im_start|>assistant\n"));
}

#[test]
fn test_template_for_architecture() {
    assert_eq!(PromptTemplate::for_architecture("qwen2"), PromptTemplate::ChatMl);
    assert_eq!(PromptTemplate::for_architecture("phi3"), PromptTemplate::Phi);
    assert_eq!(PromptTemplate::for_architecture("mystery"), PromptTemplate::Phi);
}

#[test]
fn test_template_parse_and_display() {
    assert_eq!("phi".parse::<PromptTemplate>(), Ok(PromptTemplate::Phi));
    assert_eq!(" ChatML ".parse::<PromptTemplate>(), Ok(PromptTemplate::ChatMl));
    assert!("llama".parse::<PromptTemplate>().is_err());

    assert_eq!(PromptTemplate::ChatMl.to_string(), "chatml");
}

#[test]
fn test_stop_markers_include_turn_end() {
    assert!(PromptTemplate::Phi.stop_markers().contains(&"<|end|>"));
    assert!(PromptTemplate::ChatMl.stop_markers().contains(&"<|im_end|>"));
}
