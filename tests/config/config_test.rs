//! Config loading, defaults and validation tests.

use std::io::Write;
use std::time::Duration;

use telegram_activities::config::{load_config, load_config_or_default, ParseModeSetting};
use telegram_activities::gateway::TextFormat;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    let mut f = std::fs::File::create(&path).expect("create file");
    f.write_all(contents.as_bytes()).expect("write");
    (dir, path)
}

#[test]
fn parse_complete_config() {
    let (_dir, path) = write_config(
        r#"
[telegram]
bot_token_env = "MY_BOT_TOKEN"
parse_mode = "markdown_v2"

[validation]
default_text = "Choose"
prompt_timeout_secs = 600
max_media_group = 3

[logging]
dir = "/tmp/telegram-activities-logs"
"#,
    );

    let config = load_config(&path).expect("parse config");

    assert_eq!(config.telegram.bot_token_env, "MY_BOT_TOKEN");
    assert_eq!(config.telegram.parse_mode, ParseModeSetting::MarkdownV2);
    assert_eq!(TextFormat::from(config.telegram.parse_mode), TextFormat::MarkdownV2);

    let settings = config.validation.settings();
    assert_eq!(settings.default_text, "Choose");
    assert_eq!(settings.timeout, Some(Duration::from_secs(600)));
    assert_eq!(settings.max_media, 3);
    assert!(config.logging.dir.is_some());
}

#[test]
fn empty_file_uses_defaults() {
    let (_dir, path) = write_config("");

    let config = load_config(&path).expect("parse config");

    assert_eq!(config.telegram.bot_token_env, "TELEGRAM_BOT_TOKEN");
    assert_eq!(config.validation.settings().timeout, None);
    assert_eq!(config.validation.settings().max_media, 5);
    assert!(config.logging.dir.is_none());
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config =
        load_config_or_default(&dir.path().join("absent.toml")).expect("defaults");
    assert_eq!(config.telegram.parse_mode, ParseModeSetting::Html);
}

#[test]
fn missing_file_is_an_error_for_strict_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_config(&dir.path().join("absent.toml")).expect_err("should fail");
    assert!(err.to_string().contains("failed to read config"));
}

#[test]
fn unknown_parse_mode_is_rejected() {
    let (_dir, path) = write_config("[telegram]\nparse_mode = \"bbcode\"\n");
    let err = load_config(&path).expect_err("should fail");
    assert!(err.to_string().contains("failed to parse config"));
}

#[test]
fn empty_default_text_is_rejected() {
    let (_dir, path) = write_config("[validation]\ndefault_text = \"  \"\n");
    let err = load_config(&path).expect_err("should fail");
    assert!(err.to_string().contains("default_text"));
}

#[test]
fn bot_token_comes_from_named_variable() {
    let (_dir, path) = write_config("[telegram]\nbot_token_env = \"CUSTOM_TOKEN\"\n");
    let config = load_config(&path).expect("parse config");

    let token = config
        .telegram
        .bot_token_with(|key| (key == "CUSTOM_TOKEN").then(|| "123:abc".to_owned()))
        .expect("token");
    assert_eq!(token, "123:abc");

    let err = config
        .telegram
        .bot_token_with(|_| None)
        .expect_err("unset token");
    assert!(err.to_string().contains("CUSTOM_TOKEN"));
}
