use super::*;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }

    let result = f();

    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, _) in vars {
        unsafe { env::remove_var(key) };
    }

    result
}

fn clear_judge_env() {
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    unsafe {
        env::remove_var("JUDGE_MODEL_PATH");
        env::remove_var("JUDGE_TOKENIZER_PATH");
        env::remove_var("JUDGE_MAX_LENGTH");
        env::remove_var("JUDGE_MAX_NEW_TOKENS");
        env::remove_var("JUDGE_TEMPLATE");
        env::remove_var("JUDGE_AFFIRMATIVE");
        env::remove_var("JUDGE_NEGATIVE");
        env::remove_var("JUDGE_INSTRUCTION");
    }
}

fn model_dir() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let model = dir.path().join("model.gguf");
    fs::write(&model, b"GGUF").unwrap();
    fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();
    (dir, model)
}

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    assert!(config.tokenizer_path.is_none());
    assert_eq!(config.max_length, 2048);
    assert_eq!(config.max_new_tokens, 10);
    assert!(config.template.is_none());
    assert_eq!(config.affirmative, vec!["Yes".to_string(), " yes".to_string()]);
    assert_eq!(config.negative, vec!["No".to_string(), " no".to_string()]);
    assert!(config.instruction.is_none());
}

#[test]
fn test_generation_config_never_reuses_buffers() {
    let config = Config {
        max_length: 512,
        ..Default::default()
    };

    let generation = config.generation_config();
    assert_eq!(generation.max_length, 512);
    assert!(!generation.reuse_output_buffers);
}

#[test]
fn test_tokenizer_path_defaults_beside_model() {
    let config = Config {
        model_path: PathBuf::from("/models/phi/model.gguf"),
        ..Default::default()
    };
    assert_eq!(
        config.tokenizer_path(),
        PathBuf::from("/models/phi/tokenizer.json")
    );

    let config = Config {
        tokenizer_path: Some(PathBuf::from("/elsewhere/tok.json")),
        ..config
    };
    assert_eq!(config.tokenizer_path(), PathBuf::from("/elsewhere/tok.json"));
}

#[test]
#[serial]
fn test_from_env_with_defaults() {
    clear_judge_env();

    let config = Config::from_env().expect("should parse with defaults");

    assert_eq!(config, Config::default());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_judge_env();

    let config = with_env_vars(
        &[
            ("JUDGE_MODEL_PATH", "/tmp/judge/model.gguf"),
            ("JUDGE_MAX_LENGTH", "1024"),
            ("JUDGE_MAX_NEW_TOKENS", " 4 "),
            ("JUDGE_TEMPLATE", "ChatML"),
            ("JUDGE_INSTRUCTION", "Answer yes or no."),
        ],
        || Config::from_env().expect("should parse overrides"),
    );

    assert_eq!(config.model_path, PathBuf::from("/tmp/judge/model.gguf"));
    assert_eq!(config.max_length, 1024);
    assert_eq!(config.max_new_tokens, 4);
    assert_eq!(config.template, Some(PromptTemplate::ChatMl));
    assert_eq!(config.instruction.as_deref(), Some("Answer yes or no."));
}

#[test]
#[serial]
fn test_surface_lists_keep_leading_space() {
    clear_judge_env();

    let config = with_env_vars(
        &[("JUDGE_AFFIRMATIVE", " Yes,Yes,,yes"), ("JUDGE_NEGATIVE", "No")],
        || Config::from_env().unwrap(),
    );

    assert_eq!(
        config.affirmative,
        vec![" Yes".to_string(), "Yes".to_string(), "yes".to_string()]
    );
    assert_eq!(config.negative, vec!["No".to_string()]);

    let policy = config.candidate_policy();
    assert_eq!(policy.affirmative[0], " Yes");
}

#[test]
#[serial]
fn test_invalid_number_is_reported() {
    clear_judge_env();

    let err = with_env_vars(&[("JUDGE_MAX_LENGTH", "lots")], Config::from_env).unwrap_err();

    assert!(matches!(
        err,
        ConfigError::ParseInt {
            name: "JUDGE_MAX_LENGTH",
            ..
        }
    ));
    assert!(err.to_string().contains("lots"));
}

#[test]
#[serial]
fn test_invalid_template_is_reported() {
    clear_judge_env();

    let err = with_env_vars(&[("JUDGE_TEMPLATE", "llama")], Config::from_env).unwrap_err();

    assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
}

#[test]
#[serial]
fn test_blank_template_means_inferred() {
    clear_judge_env();

    let config = with_env_vars(&[("JUDGE_TEMPLATE", "  ")], || Config::from_env().unwrap());

    assert!(config.template.is_none());
}

#[test]
fn test_validate_accepts_existing_files() {
    let (_dir, model) = model_dir();
    let config = Config {
        model_path: model,
        ..Default::default()
    };

    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_missing_model() {
    let config = Config {
        model_path: PathBuf::from("/nonexistent/judge/model.gguf"),
        ..Default::default()
    };

    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::PathNotFound { .. }));
}

#[test]
fn test_validate_model_directory_is_not_a_file() {
    let (dir, _model) = model_dir();
    let config = Config {
        model_path: dir.path().to_path_buf(),
        tokenizer_path: Some(dir.path().join("tokenizer.json")),
        ..Default::default()
    };

    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::NotAFile { .. }));
}

#[test]
fn test_validate_missing_tokenizer() {
    let (dir, model) = model_dir();
    fs::remove_file(dir.path().join("tokenizer.json")).unwrap();
    let config = Config {
        model_path: model,
        ..Default::default()
    };

    let err = config.validate().unwrap_err();
    assert!(matches!(err, ConfigError::PathNotFound { path } if path.ends_with("tokenizer.json")));
}

#[test]
fn test_validate_rejects_cap_without_prompt_room() {
    let (_dir, model) = model_dir();
    let config = Config {
        model_path: model,
        max_length: 10,
        max_new_tokens: 10,
        ..Default::default()
    };

    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            name: "JUDGE_MAX_NEW_TOKENS",
            ..
        }
    ));
}

#[test]
fn test_validate_rejects_empty_surfaces() {
    let (_dir, model) = model_dir();
    let config = Config {
        model_path: model,
        negative: vec![],
        ..Default::default()
    };

    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            name: "JUDGE_NEGATIVE",
            ..
        }
    ));
}
