use super::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chainup_core::{
    DeployError, DeployManifest, DeployPhase, DeployRecord, Environment, SignerConfig,
};

static TEST_STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_store() -> FileStore {
    let sequence = TEST_STORE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "chainup-registry-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    FileStore::new(path)
}

fn environment(id: &str, precedes: Option<&str>) -> Environment {
    Environment {
        id: id.to_string(),
        precedes: precedes.map(str::to_string),
        contract_addresses: BTreeMap::new(),
        signing_strategy: SignerConfig::DirectKey {
            private_key_hex: "00".repeat(32),
        },
        latest_deployed_commit: None,
    }
}

#[test]
fn store_reads_back_what_it_wrote() {
    let store = test_store();
    store
        .update_file("environments/testnet/env.json", b"{\"probe\":1}")
        .expect("must write");
    let bytes = store
        .get_file("environments/testnet/env.json")
        .expect("must read")
        .expect("must exist");
    assert_eq!(bytes, b"{\"probe\":1}");
    assert!(store
        .get_file("environments/testnet/missing.json")
        .expect("must read")
        .is_none());
}

#[test]
fn content_digest_is_lowercase_sha256_hex() {
    assert_eq!(
        content_digest(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
        content_digest(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn compare_and_swap_claims_only_once() {
    let store = test_store();
    store
        .compare_and_swap("claim.json", None, b"first")
        .expect("first claim must win");
    let err = store
        .compare_and_swap("claim.json", None, b"second")
        .expect_err("second claim must lose");
    assert!(matches!(err, DeployError::ConcurrentModification { .. }));
}

#[test]
fn compare_and_swap_rejects_stale_digest() {
    let store = test_store();
    store.update_file("state.json", b"one").expect("must write");
    let stale = content_digest(b"something-else");
    let err = store
        .compare_and_swap("state.json", Some(&stale), b"two")
        .expect_err("stale digest must lose");
    assert!(matches!(err, DeployError::ConcurrentModification { .. }));

    let current = content_digest(b"one");
    store
        .compare_and_swap("state.json", Some(&current), b"two")
        .expect("fresh digest must win");
    let bytes = store
        .get_file("state.json")
        .expect("must read")
        .expect("must exist");
    assert_eq!(bytes, b"two");
}

#[test]
fn compare_and_swap_with_digest_fails_when_file_was_removed() {
    let store = test_store();
    let digest = content_digest(b"gone");
    let err = store
        .compare_and_swap("state.json", Some(&digest), b"new")
        .expect_err("missing file must not satisfy a digest precondition");
    assert!(matches!(err, DeployError::ConcurrentModification { .. }));
}

#[test]
fn register_environment_rejects_duplicates() {
    let registry = EnvironmentRegistry::new(test_store());
    registry
        .register_environment(&environment("testnet", None))
        .expect("must register");
    let err = registry
        .register_environment(&environment("testnet", None))
        .expect_err("duplicate must fail");
    assert!(matches!(err, DeployError::Validation(_)));
}

#[test]
fn load_unknown_environment_fails() {
    let registry = EnvironmentRegistry::new(test_store());
    let err = registry
        .load_environment("ghost")
        .expect_err("unknown environment must fail");
    assert!(matches!(err, DeployError::Validation(_)));
}

#[test]
fn precedence_cycle_is_rejected_at_registration() {
    let registry = EnvironmentRegistry::new(test_store());
    registry
        .register_environment(&environment("env-a", Some("env-b")))
        .expect("first edge must register");
    let err = registry
        .register_environment(&environment("env-b", Some("env-a")))
        .expect_err("closing the cycle must fail");
    assert!(matches!(err, DeployError::ConsistencyViolation(_)));
}

#[test]
fn self_precedence_is_rejected() {
    let registry = EnvironmentRegistry::new(test_store());
    let err = registry
        .register_environment(&environment("prod", Some("prod")))
        .expect_err("self precedence must fail");
    assert!(matches!(err, DeployError::ConsistencyViolation(_)));
}

#[test]
fn precedence_chain_without_cycle_registers() {
    let registry = EnvironmentRegistry::new(test_store());
    registry
        .register_environment(&environment("testnet", Some("staging")))
        .expect("must register");
    registry
        .register_environment(&environment("staging", Some("prod")))
        .expect("must register");
    registry
        .register_environment(&environment("prod", None))
        .expect("must register");
    assert_eq!(
        registry.list_environments().expect("must list"),
        vec!["prod", "staging", "testnet"]
    );
}

#[test]
fn update_environment_enforces_digest_precondition() {
    let registry = EnvironmentRegistry::new(test_store());
    registry
        .register_environment(&environment("testnet", None))
        .expect("must register");

    let (mut env, digest) = registry
        .environment_snapshot("testnet")
        .expect("must snapshot");
    env.latest_deployed_commit = Some("4f1c2d".to_string());
    registry
        .update_environment(&env, &digest)
        .expect("fresh digest must win");

    env.latest_deployed_commit = Some("other".to_string());
    let err = registry
        .update_environment(&env, &digest)
        .expect_err("stale digest must lose");
    assert!(matches!(err, DeployError::ConcurrentModification { .. }));
}

#[test]
fn registered_upgrades_are_immutable() {
    let registry = EnvironmentRegistry::new(test_store());
    let definition = r#"
id = "upgrade-v2"
version = "2.0.0"

[execute]
script = "scripts/execute.s"
"#;
    registry
        .register_upgrade(definition)
        .expect("must register");
    let err = registry
        .register_upgrade(definition)
        .expect_err("re-registration must fail");
    assert!(matches!(err, DeployError::Validation(_)));

    let loaded = registry.load_upgrade("upgrade-v2").expect("must load");
    assert_eq!(loaded.id, "upgrade-v2");
    assert!(loaded.execute.is_some());
}

#[test]
fn manifest_round_trip_and_cas() {
    let store = test_store();
    let empty = read_deploy_manifest(&store, "testnet").expect("must read");
    assert!(empty.manifest.in_progress.is_none());
    assert!(empty.digest.is_none());

    let manifest = DeployManifest {
        in_progress: Some(DeployRecord::new("upgrade-v2", DeployPhase::Created)),
    };
    write_deploy_manifest(&store, "testnet", None, &manifest).expect("claim must win");

    let reread = read_deploy_manifest(&store, "testnet").expect("must read");
    assert_eq!(reread.manifest, manifest);
    let digest = reread.digest.expect("digest must exist after write");

    let err = write_deploy_manifest(&store, "testnet", None, &manifest)
        .expect_err("second claim must lose");
    assert!(matches!(err, DeployError::ConcurrentModification { .. }));

    write_deploy_manifest(&store, "testnet", Some(&digest), &DeployManifest::default())
        .expect("digest-checked replace must win");
}

#[test]
fn store_keys_are_deterministic() {
    assert_eq!(
        environment_key("testnet"),
        "environments/testnet/env.json"
    );
    assert_eq!(
        deploy_manifest_key("testnet"),
        "environments/testnet/deploy-manifest.json"
    );
    assert_eq!(
        signature_request_key("testnet"),
        "environments/testnet/signature-request.json"
    );
    assert_eq!(upgrade_key("upgrade-v2"), "upgrades/upgrade-v2.toml");
    assert_eq!(SESSION_KEY, "session.toml");
}
