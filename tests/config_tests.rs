//! Unit tests for configuration loading and validation.

use kloud::config::{DEFAULT_AUTH_URL, DEFAULT_FLAVOR_ID, DEFAULT_IMAGE_ID, DEFAULT_KEY_NAME};
use kloud::{ConfigError, Kloud, KloudConfig, OpenstackConfig, OpenstackProvider};
use kloud::test_support::{EnvGuard, FakeCompute};
use rstest::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[fixture]
fn valid_openstack() -> OpenstackConfig {
    OpenstackConfig {
        provider_name: String::from("rackspace"),
        auth_url: String::from(DEFAULT_AUTH_URL),
        default_image_id: String::from(DEFAULT_IMAGE_ID),
        default_flavor_id: String::from(DEFAULT_FLAVOR_ID),
        key_name: String::from(DEFAULT_KEY_NAME),
        public_key: String::from("ssh-ed25519 AAAAC3Nza kloud@example"),
    }
}

#[rstest]
fn openstack_validation_rejects_missing_public_key_with_actionable_error(
    valid_openstack: OpenstackConfig,
) {
    let cfg = OpenstackConfig {
        public_key: String::from("  "),
        ..valid_openstack
    };

    let error = cfg.validate().expect_err("public key is required");
    let ConfigError::MissingField(ref message) = error else {
        panic!("expected MissingField error");
    };
    assert!(
        message.contains("KLOUD_OPENSTACK_PUBLIC_KEY"),
        "error should mention env var: {message}"
    );
    assert!(
        message.contains("kloud.toml"),
        "error should mention config file: {message}"
    );
    assert!(
        message.contains("public_key"),
        "error should mention TOML key: {message}"
    );
}

#[rstest]
#[case::provider_name(|cfg: &mut OpenstackConfig| cfg.provider_name.clear(), "KLOUD_OPENSTACK_PROVIDER_NAME", "provider_name")]
#[case::auth_url(|cfg: &mut OpenstackConfig| cfg.auth_url.clear(), "KLOUD_OPENSTACK_AUTH_URL", "auth_url")]
#[case::image(|cfg: &mut OpenstackConfig| cfg.default_image_id.clear(), "KLOUD_OPENSTACK_DEFAULT_IMAGE_ID", "default_image_id")]
#[case::flavor(|cfg: &mut OpenstackConfig| cfg.default_flavor_id.clear(), "KLOUD_OPENSTACK_DEFAULT_FLAVOR_ID", "default_flavor_id")]
#[case::key_name(|cfg: &mut OpenstackConfig| cfg.key_name.clear(), "KLOUD_OPENSTACK_KEY_NAME", "key_name")]
fn openstack_validation_names_every_field(
    valid_openstack: OpenstackConfig,
    #[case] mutate: fn(&mut OpenstackConfig),
    #[case] env_var: &str,
    #[case] toml_key: &str,
) {
    let mut cfg = valid_openstack;
    mutate(&mut cfg);
    let message = cfg
        .validate()
        .expect_err("validation should fail")
        .to_string();
    assert!(
        message.contains(env_var),
        "error should mention env var {env_var}: {message}"
    );
    assert!(
        message.contains(toml_key),
        "error should mention TOML key {toml_key}: {message}"
    );
}

#[rstest]
#[case::poll_interval(KloudConfig { poll_interval_ms: 0, ..KloudConfig::default() }, "KLOUD_POLL_INTERVAL_MS")]
#[case::attempts(KloudConfig { wait_max_attempts: 0, ..KloudConfig::default() }, "KLOUD_WAIT_MAX_ATTEMPTS")]
#[case::timeout(KloudConfig { wait_timeout_secs: 0, ..KloudConfig::default() }, "KLOUD_WAIT_TIMEOUT_SECS")]
#[case::capacity(KloudConfig { event_capacity: 0, ..KloudConfig::default() }, "KLOUD_EVENT_CAPACITY")]
fn kloud_validation_rejects_zero_budgets(#[case] cfg: KloudConfig, #[case] env_var: &str) {
    let error = cfg.validate().expect_err("zero budget should fail");
    let ConfigError::Invalid(ref message) = error else {
        panic!("expected Invalid error, got {error:?}");
    };
    assert!(message.contains(env_var), "unexpected error: {message}");
}

#[test]
fn kloud_defaults_match_polling_constants() {
    let cfg = KloudConfig::default();
    cfg.validate()
        .unwrap_or_else(|err| panic!("defaults should validate: {err}"));
    let wait = cfg.wait_config();
    assert_eq!(wait.poll_interval, Duration::from_secs(3));
    assert_eq!(wait.max_attempts, 100);
    assert_eq!(wait.timeout, Duration::from_secs(300));
    assert_eq!(cfg.event_capacity, 256);
}

#[rstest]
fn provider_construction_validates_config(valid_openstack: OpenstackConfig) {
    let cfg = OpenstackConfig {
        auth_url: String::new(),
        ..valid_openstack
    };
    let error = OpenstackProvider::new(cfg, Arc::new(FakeCompute::rackspace()))
        .expect_err("invalid config should be rejected");
    assert!(matches!(error, ConfigError::MissingField(_)));
}

#[tokio::test]
async fn configuration_loads_from_environment() {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let home = tmp.path().to_string_lossy().to_string();
    let _guard = EnvGuard::set_vars(&[
        ("HOME", home.as_str()),
        ("XDG_CONFIG_HOME", home.as_str()),
        ("KLOUD_OPENSTACK_PUBLIC_KEY", "ssh-ed25519 AAAAC3Nza env@example"),
        ("KLOUD_OPENSTACK_KEY_NAME", "env-key"),
        ("KLOUD_POLL_INTERVAL_MS", "250"),
        ("KLOUD_EVENT_CAPACITY", "32"),
    ])
    .await;

    let openstack = OpenstackConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("openstack config should load: {err}"));
    assert_eq!(openstack.public_key, "ssh-ed25519 AAAAC3Nza env@example");
    assert_eq!(openstack.key_name, "env-key");
    assert_eq!(openstack.auth_url, DEFAULT_AUTH_URL);
    assert_eq!(openstack.default_flavor_id, DEFAULT_FLAVOR_ID);

    let orchestrator = KloudConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("kloud config should load: {err}"));
    assert_eq!(orchestrator.poll_interval_ms, 250);
    assert_eq!(orchestrator.event_capacity, 32);
    assert_eq!(orchestrator.wait_max_attempts, 100);

    let kloud = Kloud::from_config(&orchestrator)
        .unwrap_or_else(|err| panic!("orchestrator should build: {err}"));
    assert!(kloud.provider_names().is_empty());
}
