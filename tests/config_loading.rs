use std::io::Write;

use baton_core::config::AppConfig;
use baton_core::error::BatonError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
agents = ["lint_agent", "build_agent"]

[chain]
max_depth = 6
warn_on_unhandled_target = false

[daemon]
shell = "bash"
timeout_secs = 30
working_dir = "/tmp/baton-test"
prefix = "/usr/local"

[[daemon.skills]]
skill = "pkg"
function = "update"
command = "apt-get update"
timeout_secs = 600

[[daemon.skills]]
skill = "git"
function = "status"
command = "git status --porcelain"

[signals]
capacity = 64
log_dir = "/tmp/baton-test/signals"

[storage]
workspace = "/tmp/baton-test"
checkpoint_db = "pauses.db"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.agents, vec!["lint_agent", "build_agent"]);
    assert_eq!(config.chain.max_depth, 6);
    assert!(!config.chain.warn_on_unhandled_target);
    assert_eq!(config.daemon.shell, "bash");
    assert_eq!(config.daemon.timeout_secs, 30);
    assert_eq!(config.daemon.prefix, "/usr/local");
    assert_eq!(config.daemon.skills.len(), 2);
    assert_eq!(config.daemon.skills[0].timeout_secs, Some(600));
    assert_eq!(config.daemon.skills[1].timeout_secs, None);
    assert_eq!(config.signals.capacity, 64);
    assert_eq!(
        config.signals.log_dir().unwrap().to_str(),
        Some("/tmp/baton-test/signals")
    );
    assert_eq!(
        config.storage.checkpoint_path().to_str(),
        Some("/tmp/baton-test/pauses.db")
    );
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("BATON_TEST_PREFIX", "/data/custom/usr");

    let toml_content = r#"
[daemon]
prefix = "${BATON_TEST_PREFIX}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.daemon.prefix, "/data/custom/usr");

    std::env::remove_var("BATON_TEST_PREFIX");
}

#[test]
fn test_empty_config_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert!(config.agents.is_empty());
    assert_eq!(config.chain.max_depth, 10);
    assert!(config.chain.warn_on_unhandled_target);
    assert_eq!(config.daemon.shell, "sh");
    assert_eq!(config.daemon.timeout_secs, 120);
    assert!(config.daemon.skills.is_empty());
    assert_eq!(config.signals.capacity, 256);
    assert!(config.signals.log_dir().is_none());
    assert!(config
        .storage
        .checkpoint_path()
        .ends_with("checkpoints.db"));
}

#[test]
fn test_absolute_checkpoint_db_ignores_workspace() {
    let config = AppConfig::parse(
        r#"
[storage]
workspace = "/tmp/ws"
checkpoint_db = "/var/lib/baton/pauses.db"
"#,
    )
    .expect("parse config");

    assert_eq!(
        config.storage.checkpoint_path().to_str(),
        Some("/var/lib/baton/pauses.db")
    );
}

#[test]
fn test_zero_max_depth_rejected() {
    let err = AppConfig::parse("[chain]\nmax_depth = 0\n").unwrap_err();
    assert!(matches!(err, BatonError::Config(_)));
    assert!(err.to_string().contains("max_depth"));
}

#[test]
fn test_missing_file_is_config_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, BatonError::ConfigNotFound(_)));
}

#[test]
fn test_malformed_toml_rejected() {
    let err = AppConfig::parse("[chain\nmax_depth = 3").unwrap_err();
    assert!(matches!(err, BatonError::Config(_)));
}
