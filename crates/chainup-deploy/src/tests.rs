use super::*;
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use chainup_core::{SignerConfig, Transaction};
use chainup_signer::{CoordinationClient, DirectKeySigner, MultisigProposalSigner, ProposalStatus};

const TEST_KEY_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "chainup-deploy-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

struct Fixture {
    root: PathBuf,
    coordinator: Coordinator,
}

impl Fixture {
    fn new() -> Self {
        let root = test_root();
        let store = FileStore::new(root.join("state"));
        let coordinator = Coordinator::new(store, ActionBuilder::new("sh"));
        Self { root, coordinator }
    }

    fn store(&self) -> FileStore {
        self.coordinator.store().clone()
    }

    fn write_script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, body).expect("must write script");
        path
    }

    fn register_environment(&self, id: &str, signing_strategy: SignerConfig) {
        let environment = Environment {
            id: id.to_string(),
            precedes: None,
            contract_addresses: Default::default(),
            signing_strategy,
            latest_deployed_commit: None,
        };
        self.coordinator
            .registry()
            .register_environment(&environment)
            .expect("must register environment");
    }

    fn register_upgrade(&self, toml: &str) {
        self.coordinator
            .registry()
            .register_upgrade(toml)
            .expect("must register upgrade");
    }
}

fn direct_key_config() -> SignerConfig {
    SignerConfig::DirectKey {
        private_key_hex: TEST_KEY_HEX.to_string(),
    }
}

const SINGLE_TX_SCRIPT: &str = "echo 'building...'\n\
echo 'warning: x'\n\
echo '{\"transactions\":[{\"to\":\"0xabcd\",\"data\":\"0x01\"}],\"deployed_contracts\":{\"router\":\"0x9999\"}}'\n";

#[test]
fn begin_enforces_at_most_one_in_progress() {
    let fixture = Fixture::new();
    fixture.register_environment("testnet", direct_key_config());
    let script = fixture.write_script("create.sh", SINGLE_TX_SCRIPT);
    fixture.register_upgrade(&format!(
        "id = \"upgrade-v2\"\nversion = \"2.0.0\"\n\n[create]\nscript = \"{}\"\n",
        script.display()
    ));

    let record = fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("first begin must win");
    assert_eq!(record.phase, DeployPhase::Created);

    let err = fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect_err("second begin must lose");
    assert!(matches!(err, DeployError::DeployInProgress { .. }));

    let racer = Coordinator::new(fixture.store(), ActionBuilder::new("sh"));
    let err = racer
        .begin("testnet", "upgrade-v2")
        .expect_err("independent process must also lose");
    assert!(matches!(err, DeployError::DeployInProgress { .. }));
}

#[test]
fn begin_claim_defeats_a_writer_holding_a_stale_snapshot() {
    let fixture = Fixture::new();
    fixture.register_environment("testnet", direct_key_config());
    let script = fixture.write_script("create.sh", SINGLE_TX_SCRIPT);
    fixture.register_upgrade(&format!(
        "id = \"upgrade-v2\"\nversion = \"2.0.0\"\n\n[create]\nscript = \"{}\"\n",
        script.display()
    ));

    let store = fixture.store();
    let stale = read_deploy_manifest(&store, "testnet").expect("must read");
    assert!(stale.digest.is_none());

    fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("first writer must claim the manifest");

    let racing = DeployManifest {
        in_progress: Some(DeployRecord::new("upgrade-v7", DeployPhase::Created)),
    };
    let err = write_deploy_manifest(&store, "testnet", stale.digest.as_deref(), &racing)
        .expect_err("second writer with the pre-claim snapshot must lose");
    assert!(matches!(err, DeployError::ConcurrentModification { .. }));

    let status = fixture.coordinator.status("testnet").expect("must read");
    assert_eq!(
        status.record.expect("claimed record must survive").upgrade_id,
        "upgrade-v2"
    );
}

#[test]
fn begin_requires_known_environment_and_upgrade() {
    let fixture = Fixture::new();
    let err = fixture
        .coordinator
        .begin("ghost", "upgrade-v2")
        .expect_err("unknown environment must fail");
    assert!(matches!(err, DeployError::Validation(_)));

    fixture.register_environment("testnet", direct_key_config());
    let err = fixture
        .coordinator
        .begin("testnet", "ghost-upgrade")
        .expect_err("unknown upgrade must fail");
    assert!(matches!(err, DeployError::Validation(_)));
}

#[test]
fn direct_key_deploy_runs_to_completion() {
    let fixture = Fixture::new();
    fixture.register_environment("testnet", direct_key_config());
    let script = fixture.write_script("create.sh", SINGLE_TX_SCRIPT);
    fixture.register_upgrade(&format!(
        "id = \"upgrade-v2\"\nversion = \"2.0.0\"\ncommit = \"4f1c2d\"\n\n[create]\nscript = \"{}\"\n",
        script.display()
    ));

    let record = fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("must begin");
    assert_eq!(record.phase, DeployPhase::Created);

    let outcome = fixture
        .coordinator
        .advance("testnet")
        .expect("must advance");
    assert_eq!(
        outcome,
        AdvanceOutcome::PhaseCompleted {
            phase: DeployPhase::Complete
        }
    );

    let status = fixture.coordinator.status("testnet").expect("must read");
    assert!(status.record.is_none());
    assert_eq!(
        status.environment.latest_deployed_commit.as_deref(),
        Some("4f1c2d")
    );
    assert_eq!(
        status.environment.contract_addresses.get("router"),
        Some(&"0x9999".to_string())
    );

    fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("a finished deploy must not block the next one");
}

#[test]
fn advance_without_active_deploy_fails() {
    let fixture = Fixture::new();
    fixture.register_environment("testnet", direct_key_config());
    let err = fixture
        .coordinator
        .advance("testnet")
        .expect_err("must fail");
    assert!(matches!(err, DeployError::Validation(_)));
}

#[test]
fn subprocess_failure_surfaces_and_leaves_the_record_retryable() {
    let fixture = Fixture::new();
    fixture.register_environment("testnet", direct_key_config());
    let script = fixture.write_script("create.sh", "echo 'broken' >&2\nexit 3\n");
    fixture.register_upgrade(&format!(
        "id = \"upgrade-v2\"\nversion = \"2.0.0\"\n\n[create]\nscript = \"{}\"\n",
        script.display()
    ));
    fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("must begin");

    let err = fixture
        .coordinator
        .advance("testnet")
        .expect_err("broken script must fail");
    match err {
        DeployError::SubprocessFailure { code, stderr_tail } => {
            assert_eq!(code, 3);
            assert!(stderr_tail.contains("broken"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let status = fixture.coordinator.status("testnet").expect("must read");
    let record = status.record.expect("record must survive the failure");
    assert_eq!(record.phase, DeployPhase::Created);
    assert!(record.signature_request_ref.is_none());

    fixture.write_script("create.sh", SINGLE_TX_SCRIPT);
    let outcome = fixture
        .coordinator
        .advance("testnet")
        .expect("fixed script must advance");
    assert_eq!(
        outcome,
        AdvanceOutcome::PhaseCompleted {
            phase: DeployPhase::Complete
        }
    );
}

#[test]
fn abort_archives_the_record_and_unblocks_begin() {
    let fixture = Fixture::new();
    fixture.register_environment("testnet", direct_key_config());
    let script = fixture.write_script("create.sh", SINGLE_TX_SCRIPT);
    fixture.register_upgrade(&format!(
        "id = \"upgrade-v2\"\nversion = \"2.0.0\"\n\n[create]\nscript = \"{}\"\n",
        script.display()
    ));
    fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("must begin");

    fixture
        .coordinator
        .abort("testnet", "operator abandoned the rollout")
        .expect("must abort");

    let status = fixture.coordinator.status("testnet").expect("must read");
    let record = status.record.expect("aborted record must remain visible");
    assert_eq!(record.phase, DeployPhase::Failed);
    assert_eq!(
        record.failure_reason.as_deref(),
        Some("operator abandoned the rollout")
    );

    fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("aborted deploy must not block a new one");
}

#[derive(Default)]
struct SpyCoordination {
    propose_calls: Cell<usize>,
    status: RefCell<Option<ProposalStatus>>,
}

struct SpyCoordinationHandle(Rc<SpyCoordination>);

impl std::ops::Deref for SpyCoordinationHandle {
    type Target = SpyCoordination;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl CoordinationClient for SpyCoordinationHandle {
    fn propose(
        &self,
        _wallet_address: &str,
        _proposer: &str,
        _transactions: &[Transaction],
    ) -> Result<String, DeployError> {
        self.propose_calls.set(self.propose_calls.get() + 1);
        Ok("prop-41".to_string())
    }

    fn proposal_status(&self, _proposal_id: &str) -> Result<ProposalStatus, DeployError> {
        Ok(self
            .status
            .borrow()
            .clone()
            .unwrap_or(ProposalStatus::Pending))
    }
}

const MULTISIG_TX_SCRIPT: &str = "echo 'simulating...'\n\
echo '{\"transactions\":[{\"to\":\"0xabcd\",\"data\":\"0x01\",\"from\":\"0xffff\"}]}'\n";

fn multisig_fixture() -> (Fixture, Rc<SpyCoordination>, MultisigProposalSigner) {
    let fixture = Fixture::new();
    fixture.register_environment(
        "testnet",
        SignerConfig::MultisigProposal {
            service_url: "https://coordinator.example.test".to_string(),
            wallet_address: "0xffff".to_string(),
            proposer: "0xaaaa".to_string(),
        },
    );
    let script = fixture.write_script("execute.sh", MULTISIG_TX_SCRIPT);
    fixture.register_upgrade(&format!(
        "id = \"upgrade-v2\"\nversion = \"2.0.0\"\ncommit = \"4f1c2d\"\n\n[execute]\nscript = \"{}\"\n",
        script.display()
    ));
    let spy = Rc::new(SpyCoordination::default());
    let signer = MultisigProposalSigner::new(
        fixture.store(),
        "testnet",
        Box::new(SpyCoordinationHandle(spy.clone())),
        "0xffff",
        "0xaaaa",
    );
    (fixture, spy, signer)
}

#[test]
fn multisig_advance_is_idempotent_while_pending() {
    let (fixture, spy, signer) = multisig_fixture();
    fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("must begin");

    let first = fixture
        .coordinator
        .advance_with_strategy("testnet", &signer)
        .expect("must advance");
    assert_eq!(
        first,
        AdvanceOutcome::SignaturePending {
            request_id: "multisig-prop-41".to_string()
        }
    );
    assert_eq!(spy.propose_calls.get(), 1);

    let second = fixture
        .coordinator
        .advance_with_strategy("testnet", &signer)
        .expect("repeat advance must poll, not re-propose");
    assert_eq!(second, first);
    assert_eq!(spy.propose_calls.get(), 1);

    *spy.status.borrow_mut() = Some(ProposalStatus::Ready {
        signed_transaction: "deadbeef".to_string(),
    });
    let third = fixture
        .coordinator
        .advance_with_strategy("testnet", &signer)
        .expect("approved proposal must complete");
    assert_eq!(
        third,
        AdvanceOutcome::PhaseCompleted {
            phase: DeployPhase::Complete
        }
    );

    let status = fixture.coordinator.status("testnet").expect("must read");
    assert!(status.record.is_none());
    assert_eq!(
        status.environment.latest_deployed_commit.as_deref(),
        Some("4f1c2d")
    );
}

#[test]
fn orphaned_pending_request_is_adopted_instead_of_reproposed() {
    let (fixture, spy, signer) = multisig_fixture();
    fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("must begin");

    let orphan = signer
        .request_new(&[Transaction {
            to: "0xabcd".to_string(),
            data: "0x01".to_string(),
            value: None,
            gas: None,
            gas_price: None,
            from: Some("0xffff".to_string()),
        }])
        .expect("must propose");
    assert_eq!(spy.propose_calls.get(), 1);

    let outcome = fixture
        .coordinator
        .advance_with_strategy("testnet", &signer)
        .expect("must adopt the orphaned request");
    assert_eq!(
        outcome,
        AdvanceOutcome::SignaturePending {
            request_id: orphan.id
        }
    );
    assert_eq!(spy.propose_calls.get(), 1);
}

#[test]
fn multisig_proposal_failure_marks_the_deploy_failed() {
    let (fixture, spy, signer) = multisig_fixture();
    fixture
        .coordinator
        .begin("testnet", "upgrade-v2")
        .expect("must begin");
    fixture
        .coordinator
        .advance_with_strategy("testnet", &signer)
        .expect("must advance");

    *spy.status.borrow_mut() = Some(ProposalStatus::Failed {
        reason: "quorum rejected".to_string(),
    });
    let outcome = fixture
        .coordinator
        .advance_with_strategy("testnet", &signer)
        .expect("failed proposal must resolve the advance");
    assert_eq!(
        outcome,
        AdvanceOutcome::Failed {
            reason: "quorum rejected".to_string()
        }
    );

    let status = fixture.coordinator.status("testnet").expect("must read");
    let record = status.record.expect("failed record must remain visible");
    assert_eq!(record.phase, DeployPhase::Failed);
}

#[test]
fn timelock_gates_the_execute_phase() {
    let fixture = Fixture::new();
    fixture.register_environment("testnet", direct_key_config());
    let queue_script = fixture.write_script(
        "queue.sh",
        "echo 'queueing...'\necho '{\"transactions\":[],\"timelock_eta_unix\":5000}'\n",
    );
    let execute_script = fixture.write_script("execute.sh", SINGLE_TX_SCRIPT);
    fixture.register_upgrade(&format!(
        "id = \"upgrade-v3\"\nversion = \"3.0.0\"\n\n[queue]\nscript = \"{}\"\n\n[execute]\nscript = \"{}\"\n",
        queue_script.display(),
        execute_script.display()
    ));

    let record = fixture
        .coordinator
        .begin("testnet", "upgrade-v3")
        .expect("must begin");
    assert_eq!(record.phase, DeployPhase::Queued);

    let signer = DirectKeySigner::new(fixture.store(), "testnet", TEST_KEY_HEX);
    let outcome = fixture
        .coordinator
        .advance_at("testnet", &signer, 1000)
        .expect("queue phase must run");
    assert_eq!(
        outcome,
        AdvanceOutcome::PhaseCompleted {
            phase: DeployPhase::Executing
        }
    );

    let outcome = fixture
        .coordinator
        .advance_at("testnet", &signer, 1000)
        .expect("unexpired timelock must be a wait state");
    assert_eq!(outcome, AdvanceOutcome::TimelockPending { until_unix: 5000 });

    let outcome = fixture
        .coordinator
        .advance_at("testnet", &signer, 6000)
        .expect("expired timelock must release the execute phase");
    assert_eq!(
        outcome,
        AdvanceOutcome::PhaseCompleted {
            phase: DeployPhase::Complete
        }
    );
}

#[test]
fn invalid_builder_transactions_never_reach_the_strategy() {
    let (fixture, spy, signer) = multisig_fixture();
    let bad_script = fixture.write_script(
        "bad.sh",
        "echo '{\"transactions\":[{\"to\":\"\",\"data\":\"0x01\"}]}'\n",
    );
    fixture.register_upgrade(&format!(
        "id = \"upgrade-v9\"\nversion = \"9.0.0\"\n\n[execute]\nscript = \"{}\"\n",
        bad_script.display()
    ));
    fixture
        .coordinator
        .begin("testnet", "upgrade-v9")
        .expect("must begin");

    let err = fixture
        .coordinator
        .advance_with_strategy("testnet", &signer)
        .expect_err("empty to must fail before signing");
    assert!(matches!(err, DeployError::InvalidTransaction(_)));
    assert_eq!(spy.propose_calls.get(), 0);
}
