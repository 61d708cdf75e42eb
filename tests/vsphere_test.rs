mod helpers;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use helpers::{CallLog, CommandLog, FakeConnector, RecordingHook, RecordingUi};
use packstep::PackstepError;
use packstep::builder::Builder;
use packstep::builders::vsphere::{
    CloneSpec, HardwareSpec, VsphereBuilder, VsphereConfig, VsphereDriver,
};
use packstep::communicator::{CommunicatorConfig, SshConfig};
use packstep::provisioners::NoopHook;

#[derive(Default)]
struct FakeVcenter {
    log: CallLog,
    powered: AtomicBool,
    /// Guest tools never report an address.
    no_ip: bool,
    /// Session log of the guest; a shutdown command sent there powers it off.
    guest: Option<CommandLog>,
}

impl FakeVcenter {
    fn guest_shut_itself_down(&self) -> bool {
        self.guest
            .as_ref()
            .is_some_and(|log| log.lock().unwrap().iter().any(|c| c.contains("shutdown")))
    }
}

impl VsphereDriver for FakeVcenter {
    fn clone_vm(&self, spec: &CloneSpec) -> Result<String> {
        self.log.push(format!("clone_vm:{}:{}", spec.template, spec.name));
        Ok("vm-42".to_string())
    }

    fn resize_disk(&self, vm: &str, size_mb: u64) -> Result<()> {
        self.log.push(format!("resize_disk:{}:{}", vm, size_mb));
        Ok(())
    }

    fn configure(&self, vm: &str, hardware: &HardwareSpec) -> Result<()> {
        self.log.push(format!(
            "configure:{}:{:?}:{:?}",
            vm, hardware.cpus, hardware.ram_mb
        ));
        Ok(())
    }

    fn destroy(&self, vm: &str) -> Result<()> {
        self.log.push(format!("destroy:{}", vm));
        Ok(())
    }

    fn power_on(&self, vm: &str) -> Result<()> {
        self.log.push(format!("power_on:{}", vm));
        self.powered.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn power_off(&self, vm: &str) -> Result<()> {
        self.log.push(format!("power_off:{}", vm));
        self.powered.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_powered_on(&self, _vm: &str) -> Result<bool> {
        Ok(self.powered.load(Ordering::SeqCst) && !self.guest_shut_itself_down())
    }

    fn shutdown_guest(&self, vm: &str) -> Result<()> {
        self.log.push(format!("shutdown_guest:{}", vm));
        self.powered.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn guest_ip(&self, _vm: &str) -> Result<Option<String>> {
        if self.no_ip || !self.powered.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some("10.1.2.3".to_string()))
    }

    fn create_snapshot(&self, vm: &str, name: &str) -> Result<()> {
        self.log.push(format!("create_snapshot:{}:{}", vm, name));
        Ok(())
    }

    fn convert_to_template(&self, vm: &str) -> Result<()> {
        self.log.push(format!("convert_to_template:{}", vm));
        Ok(())
    }
}

fn config() -> VsphereConfig {
    let mut config = VsphereConfig::new("vcenter.example.com", "ubuntu-template");
    config.username = "admin".to_string();
    config.password = "secret".to_string();
    config.vm_name = "web-01".to_string();
    config.poll_interval_secs = 1;
    config
}

#[test]
fn test_finalized_clone_is_kept() {
    let connector = FakeConnector::new();
    let driver = Arc::new(FakeVcenter {
        guest: Some(Arc::clone(&connector.log)),
        ..FakeVcenter::default()
    });
    let mut config = config();
    config.cpus = Some(2);
    config.shutdown_command = Some("sudo shutdown -P now".to_string());
    config.create_snapshot = true;
    config.convert_to_template = true;
    let builder = VsphereBuilder::new(
        config,
        CommunicatorConfig::Ssh(SshConfig::new("ubuntu")),
        driver.clone(),
    )
    .with_connector(connector.clone());

    let artifact = builder.run(RecordingUi::new(), RecordingHook::new()).unwrap().unwrap();

    assert_eq!(artifact.builder_id(), "vsphere.clone");
    assert_eq!(artifact.id(), "web-01");
    assert_eq!(artifact.to_string(), "VM: web-01");
    assert_eq!(
        driver.log.calls(),
        vec![
            "clone_vm:ubuntu-template:web-01",
            "configure:vm-42:Some(2):None",
            "power_on:vm-42",
            "create_snapshot:vm-42:Created By Packer",
            "convert_to_template:vm-42",
        ]
    );
    assert_eq!(connector.commands(), vec!["sudo shutdown -P now", "<close>"]);
    assert_eq!(connector.endpoints.lock().unwrap()[0].host, "10.1.2.3");
}

#[test]
fn test_guest_tools_shut_down_without_command() {
    let driver = Arc::new(FakeVcenter::default());
    let builder = VsphereBuilder::new(config(), CommunicatorConfig::None, driver.clone());

    builder.run(RecordingUi::new(), Arc::new(NoopHook)).unwrap();

    assert_eq!(driver.log.count("shutdown_guest:vm-42"), 1);
    assert_eq!(driver.log.count("configure"), 0);
    assert_eq!(driver.log.count("destroy"), 0);
}

#[test]
fn test_failed_build_powers_off_and_destroys_clone() {
    let driver = Arc::new(FakeVcenter::default());
    let builder = VsphereBuilder::new(
        config(),
        CommunicatorConfig::Ssh(SshConfig::new("ubuntu")),
        driver.clone(),
    )
    .with_connector(FakeConnector::new());

    builder.run(RecordingUi::new(), RecordingHook::failing()).unwrap_err();

    let calls = driver.log.calls();
    assert_eq!(
        &calls[calls.len() - 2..],
        ["power_off:vm-42".to_string(), "destroy:vm-42".to_string()]
    );
    assert_eq!(driver.log.count("shutdown_guest"), 0);
}

#[test]
fn test_missing_guest_ip_times_out() {
    let driver = Arc::new(FakeVcenter {
        no_ip: true,
        ..FakeVcenter::default()
    });
    let mut config = config();
    config.ip_wait_timeout_secs = 1;
    let builder = VsphereBuilder::new(config, CommunicatorConfig::None, driver.clone());

    let err = builder.run(RecordingUi::new(), Arc::new(NoopHook)).unwrap_err();

    match err.downcast_ref::<PackstepError>() {
        Some(PackstepError::Timeout { what, .. }) => assert_eq!(what, "virtual machine IP"),
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert_eq!(driver.log.count("destroy:vm-42"), 1);
}

#[test]
fn test_artifact_destroy_removes_vm() {
    let driver = Arc::new(FakeVcenter::default());
    let builder = VsphereBuilder::new(config(), CommunicatorConfig::None, driver.clone());

    let artifact = builder.run(RecordingUi::new(), Arc::new(NoopHook)).unwrap().unwrap();
    artifact.destroy().unwrap();

    assert_eq!(driver.log.count("destroy:vm-42"), 1);
}
