//! Builds a step sequence from the public pieces, the way a provider module
//! does, and drives it through connect and provision.

mod helpers;

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use helpers::{CallLog, FakeConnector, RecordingUi};
use packstep::PackstepError;
use packstep::communicator::{CONNECTOR, CommunicatorConfig, Connector, SshConfig, StepConnect};
use packstep::multistep::{CancelToken, Runner, StateBag, StateKey, Step, StepAction};
use packstep::provisioners::{
    HOOK, Hook, ProvisionerConfig, ProvisionerHook, ShellProvisioner, StepProvision,
};
use packstep::try_step;

const ADDRESS: StateKey<String> = StateKey::new("address");

/// Stands in for a provider step that creates a machine.
struct StepFakeMachine {
    log: CallLog,
    created: bool,
}

impl Step for StepFakeMachine {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("fake-machine")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        self.log.push("create");
        self.created = true;
        state.put(ADDRESS, "192.0.2.99".to_string());
        StepAction::Continue
    }

    fn cleanup(&mut self, _state: &mut StateBag) -> Result<()> {
        if self.created {
            self.log.push("delete");
        }
        Ok(())
    }
}

/// Reads a key nobody wrote.
struct StepNeedsImage;

const IMAGE: StateKey<String> = StateKey::new("image");

impl Step for StepNeedsImage {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("needs-image")
    }

    fn run(&mut self, _cancel: &CancelToken, state: &mut StateBag) -> StepAction {
        let _image = try_step!(state, state.get(IMAGE).cloned());
        StepAction::Continue
    }
}

fn address(state: &StateBag) -> Result<String> {
    Ok(state.get(ADDRESS)?.clone())
}

fn ssh(timeout_secs: u64) -> CommunicatorConfig {
    let mut ssh = SshConfig::new("root");
    ssh.interval_secs = 1;
    ssh.timeout_secs = timeout_secs;
    CommunicatorConfig::Ssh(ssh)
}

fn state(connector: Option<Arc<FakeConnector>>, commands: &[&str]) -> StateBag {
    let mut state = StateBag::new(RecordingUi::new());
    let shell = ShellProvisioner::new(commands.iter().map(|c| c.to_string()).collect());
    let hook: Arc<dyn Hook> = Arc::new(ProvisionerHook::new(vec![ProvisionerConfig::Shell(shell)]));
    state.put(HOOK, hook);
    if let Some(connector) = connector {
        let connector: Arc<dyn Connector> = connector;
        state.put(CONNECTOR, connector);
    }
    state
}

fn sequence(log: &CallLog, communicator: CommunicatorConfig) -> Vec<Box<dyn Step>> {
    vec![
        Box::new(StepFakeMachine {
            log: log.clone(),
            created: false,
        }),
        Box::new(StepConnect::new(communicator, address)),
        Box::new(StepProvision),
    ]
}

#[test]
fn test_connect_retries_then_provisions_over_session() {
    let log = CallLog::default();
    let connector = FakeConnector::failing_first(1);
    let mut state = state(Some(connector.clone()), &["apt-get update", "apt-get -y upgrade"]);

    let report = Runner::new(sequence(&log, ssh(30))).run(&mut state);

    assert!(state.error().is_none());
    assert_eq!(report.executed, vec!["fake-machine", "connect", "provision"]);
    assert_eq!(report.cleaned, vec!["provision", "connect", "fake-machine"]);
    assert_eq!(connector.endpoints.lock().unwrap().len(), 2);
    assert_eq!(connector.endpoints.lock().unwrap()[1].to_string(), "root@192.0.2.99:22");
    assert_eq!(
        connector.commands(),
        vec!["apt-get update", "apt-get -y upgrade", "<close>"]
    );
    assert_eq!(log.calls(), vec!["create", "delete"]);
}

#[test]
fn test_failing_command_halts_and_still_closes_session() {
    let log = CallLog::default();
    let connector = Arc::new(FakeConnector {
        exit_code: 2,
        ..FakeConnector::default()
    });
    let mut state = state(Some(connector.clone()), &["false", "never-run"]);

    Runner::new(sequence(&log, ssh(30))).run(&mut state);

    assert!(state.is_halted());
    let err = state.error().unwrap();
    assert!(format!("{:#}", err).contains("exit code 2"));
    assert_eq!(connector.commands(), vec!["false", "<close>"]);
    assert_eq!(log.calls(), vec!["create", "delete"]);
}

#[test]
fn test_unreachable_machine_times_out() {
    let log = CallLog::default();
    let connector = FakeConnector::failing_first(usize::MAX);
    let mut state = state(Some(connector), &["true"]);

    Runner::new(sequence(&log, ssh(1))).run(&mut state);

    match state.error().and_then(|e| e.downcast_ref::<PackstepError>()) {
        Some(PackstepError::Timeout { what, .. }) => assert_eq!(what, "SSH to become available"),
        other => panic!("expected Timeout, got {:?}", other),
    }
    let message = format!("{:#}", state.error().unwrap());
    assert!(message.contains("SSH never became available on root@192.0.2.99:22"));
    assert!(message.contains("last error: connection refused"));
    assert!(message.contains("timeout after"));
    assert_eq!(log.calls(), vec!["create", "delete"]);
}

#[test]
fn test_ssh_without_connector_is_a_configuration_error() {
    let log = CallLog::default();
    let mut state = state(None, &["true"]);

    let report = Runner::new(sequence(&log, ssh(30))).run(&mut state);

    assert!(matches!(
        state.error().and_then(|e| e.downcast_ref::<PackstepError>()),
        Some(PackstepError::Config(_))
    ));
    assert_eq!(report.executed, vec!["fake-machine", "connect"]);
}

#[test]
fn test_shell_provisioner_without_session_fails() {
    let log = CallLog::default();
    let mut state = state(None, &["true"]);

    Runner::new(sequence(&log, CommunicatorConfig::None)).run(&mut state);

    let message = format!("{:#}", state.error().unwrap());
    assert!(message.contains("requires a communicator session"), "{}", message);
}

#[test]
fn test_missing_state_key_halts_with_typed_error() {
    let mut state = StateBag::new(RecordingUi::new());

    Runner::new(vec![Box::new(StepNeedsImage)]).run(&mut state);

    assert!(matches!(
        state.error().and_then(|e| e.downcast_ref::<PackstepError>()),
        Some(PackstepError::MissingState { key: "image" })
    ));
}
