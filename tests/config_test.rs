mod helpers;

use std::sync::Arc;

use anyhow::Result;
use camino::Utf8PathBuf;
use packstep::PackstepError;
use packstep::builder::Builder;
use packstep::communicator::CommunicatorConfig;
use packstep::config::{BuilderConfig, load_profile};
use packstep::executor::RealCommandExecutor;
use packstep::provisioners::ProvisionerConfig;
use tempfile::tempdir;

fn names(plan: &[String]) -> Vec<&str> {
    plan.iter().map(String::as_str).collect()
}

#[test]
fn test_load_hcloud_profile_with_ssh_and_provisioner() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: hcloud
  token: secret
  server_type: cx22
  image: ubuntu-24.04
  location: fsn1
  ssh_keys: [deploy]
  rescue: linux64
  snapshot_labels:
    role: web
communicator:
  type: ssh
  username: root
  private_key_file: /home/build/.ssh/id_ed25519
provisioners:
  - type: shell
    inline:
      - apt-get update
      - apt-get -y upgrade
"#,
    )?;

    let warnings = profile.prepare()?;
    assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);

    let BuilderConfig::Hcloud(config) = &profile.builder else {
        panic!("expected hcloud builder, got {}", profile.builder.name());
    };
    assert_eq!(config.endpoint, "https://api.hetzner.cloud/v1");
    assert_eq!(config.snapshot_labels.get("role").map(String::as_str), Some("web"));
    assert!(config.server_name.starts_with("packer-"));

    let CommunicatorConfig::Ssh(ssh) = &profile.communicator else {
        panic!("expected ssh communicator");
    };
    assert_eq!(ssh.port, 22);
    assert_eq!(ssh.timeout_secs, 300);

    let ProvisionerConfig::Shell(shell) = &profile.provisioners[0];
    assert_eq!(shell.inline.len(), 2);
    assert_eq!(shell.expect_exit_codes, vec![0]);

    assert_eq!(
        names(&profile.plan()),
        vec![
            "create-ssh-key",
            "create-server",
            "rescue",
            "connect",
            "provision",
            "shutdown",
            "create-snapshot",
        ]
    );
    Ok(())
}

#[test]
fn test_load_hyperv_profile_plan_follows_options() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: hyperv-vmcx
  clone_from_vm_name: golden
  vm_name: web
  guest_services: true
  vlan_id: 42
  skip_compaction: true
"#,
    )?;
    profile.prepare()?;

    let BuilderConfig::HypervVmcx(config) = &profile.builder else {
        panic!("expected hyperv builder");
    };
    assert_eq!(config.output_dir, "output-web");
    assert_eq!(profile.communicator, CommunicatorConfig::None);

    let plan = profile.plan();
    let plan = names(&plan);
    assert!(plan.contains(&"enable-integration-service"));
    assert!(plan.contains(&"configure-vlan"));
    assert!(!plan.contains(&"compact-disk"));
    assert_eq!(plan.last(), Some(&"collate-artifacts"));
    Ok(())
}

#[test]
fn test_load_oneandone_profile() -> Result<()> {
    let dir = tempdir()?;
    let key = dir.path().join("id.pub");
    std::fs::write(&key, "ssh-rsa AAAA build\n")?;

    let mut profile = helpers::load_profile_from_yaml(&format!(
        "builder:\n  type: oneandone\n  token: secret\n  source_image_name: ubuntu1604-64std\n  \
         data_center_name: DE\n  ssh_public_key_file: {}\n",
        key.display()
    ))?;
    let warnings = profile.prepare()?;
    assert!(warnings.is_empty());
    assert_eq!(
        names(&profile.plan()),
        vec!["create-ssh-key", "create-server", "connect", "provision", "take-snapshot"]
    );
    Ok(())
}

#[test]
fn test_load_triton_profile_warns_without_networks() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: triton
  triton_account: builder
  triton_key_id: "aa:bb:cc"
  source_machine_package: g4-highcpu-1G
  source_machine_image: base-64
  image_name: web
  image_version: 1.0.0
"#,
    )?;
    let warnings = profile.prepare()?;
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("source_machine_networks"));
    assert_eq!(
        names(&profile.plan()),
        vec![
            "create-source-machine",
            "connect",
            "provision",
            "stop-machine",
            "create-image-from-machine",
            "delete-machine",
        ]
    );
    Ok(())
}

#[test]
fn test_load_osc_bsu_profile_with_existing_network_setup() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: osc-bsu
  access_key: AK
  secret_key: SK
  region: eu-west-2
  source_omi_filter:
    name: ubuntu-*
    owners: [Outscale]
  vm_type: tinav4.c1r1p2
  ssh_keypair_name: deploy
  security_group_ids: [sg-1]
  omi_name: "web (2026)"
  tags:
    team: platform
"#,
    )?;
    profile.prepare()?;
    assert_eq!(
        names(&profile.plan()),
        vec![
            "source-omi-info",
            "run-source-vm",
            "connect",
            "provision",
            "stop-vm",
            "create-omi",
            "create-tags",
        ]
    );
    Ok(())
}

#[test]
fn test_load_osc_surrogate_profile() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: osc-bsusurrogate
  access_key: AK
  secret_key: SK
  region: eu-west-2
  source_omi: ami-base
  vm_type: tinav4.c1r1p2
  omi_name: surrogate-web
  omi_account_ids: ["123456789012"]
  launch_block_device_mappings:
    - device_name: /dev/xvdf
      volume_size: 10
  root_device:
    source_device_name: /dev/xvdf
"#,
    )?;
    let warnings = profile.prepare()?;
    assert!(warnings.iter().any(|w| w.contains("0.0.0.0/0")));

    let plan = profile.plan();
    let plan = names(&plan);
    assert!(plan.contains(&"key-pair"));
    assert!(plan.contains(&"security-group"));
    let snapshot = plan.iter().position(|s| *s == "snapshot-volumes");
    let register = plan.iter().position(|s| *s == "register-omi");
    assert!(snapshot.is_some() && snapshot < register);
    assert!(!plan.contains(&"create-omi"));
    assert!(plan.contains(&"update-omi-attributes"));
    Ok(())
}

#[test]
fn test_osc_surrogate_root_device_must_be_launched() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: osc-bsusurrogate
  access_key: AK
  secret_key: SK
  region: eu-west-2
  source_omi: ami-base
  vm_type: tinav4.c1r1p2
  omi_name: surrogate-web
  launch_block_device_mappings:
    - device_name: /dev/xvdf
  root_device:
    source_device_name: /dev/xvdz
"#,
    )?;
    let err = profile.prepare().unwrap_err();
    assert!(matches!(err, PackstepError::Validation(_)));
    assert!(err.to_string().contains("/dev/xvdz is not in launch_block_device_mappings"));
    Ok(())
}

#[test]
fn test_osc_rejects_invalid_omi_name() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: osc-bsu
  access_key: AK
  secret_key: SK
  region: eu-west-2
  source_omi: ami-base
  vm_type: tinav4.c1r1p2
  omi_name: "x!"
"#,
    )?;
    let err = profile.prepare().unwrap_err();
    assert!(err.to_string().contains("omi_name 'x!'"));
    Ok(())
}

#[test]
fn test_load_vsphere_profile() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: vsphere-clone
  vcenter_server: vcenter.example.com
  username: builder
  password: secret
  template: ubuntu-template
  cpus: 2
  create_snapshot: true
  convert_to_template: true
communicator:
  type: ssh
  username: ubuntu
  private_key_file: /home/build/.ssh/id_ed25519
"#,
    )?;
    profile.prepare()?;
    assert_eq!(
        names(&profile.plan()),
        vec![
            "clone-vm",
            "configure-hardware",
            "power-on",
            "wait-for-ip",
            "connect",
            "provision",
            "shutdown",
            "create-snapshot",
            "convert-to-template",
        ]
    );
    Ok(())
}

#[test]
fn test_vsphere_linked_clone_conflicts_with_disk_size() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: vsphere-clone
  vcenter_server: vcenter.example.com
  username: builder
  template: ubuntu-template
  linked_clone: true
  disk_size_mb: 20480
  mac_address: "00:50:56:00:00:01"
"#,
    )?;
    let message = profile.prepare().unwrap_err().to_string();
    assert!(message.contains("'linked_clone' and 'disk_size_mb' cannot be used together"));
    assert!(message.contains("'network' is required when 'mac_address' is specified"));
    Ok(())
}

#[test]
fn test_hyperv_clone_sources_are_exclusive() -> Result<()> {
    let dir = tempdir()?;
    let mut profile = helpers::load_profile_from_yaml(&format!(
        "builder:\n  type: hyperv-vmcx\n  clone_from_vm_name: golden\n  clone_from_vmcx_path: {}\n",
        dir.path().display()
    ))?;
    let err = profile.prepare().unwrap_err();
    assert!(err.to_string().contains("mutually exclusive"));
    Ok(())
}

#[test]
fn test_hyperv_rejects_out_of_range_vlan() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        "builder:\n  type: hyperv-vmcx\n  clone_from_vm_name: golden\n  vlan_id: 0\n",
    )?;
    assert!(profile.prepare().unwrap_err().to_string().contains("vlan_id must be between 1"));
    Ok(())
}

#[test]
fn test_provisioners_require_communicator() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: hyperv-vmcx
  clone_from_vm_name: golden
provisioners:
  - type: shell
    inline: ["true"]
"#,
    )?;
    let err = profile.prepare().unwrap_err();
    assert_eq!(
        err.to_string(),
        "validation error: provisioners require a communicator, but communicator type is none"
    );
    Ok(())
}

#[test]
fn test_empty_shell_provisioner_is_rejected() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        r#"---
builder:
  type: hyperv-vmcx
  clone_from_vm_name: golden
communicator:
  type: ssh
  username: root
provisioners:
  - type: shell
    inline: []
"#,
    )?;
    let err = profile.prepare().unwrap_err();
    assert!(err.to_string().contains("at least one inline command"));
    Ok(())
}

#[test]
fn test_unknown_field_is_a_config_error() {
    let err = helpers::load_profile_from_yaml(
        "builder:\n  type: triton\n  source_machine_package: p\n  source_machine_image: i\n  \
         image_name: n\n  image_version: v\n  colour: blue\n",
    )
    .unwrap_err();
    let err = err.downcast_ref::<PackstepError>().expect("expected PackstepError");
    assert!(matches!(err, PackstepError::Config(_)));
    assert!(err.to_string().contains("failed to parse yaml"));
}

#[test]
fn test_missing_required_field_is_a_config_error() {
    let err = helpers::load_profile_from_yaml("builder:\n  type: hcloud\n  image: debian-12\n")
        .unwrap_err();
    assert!(err.to_string().contains("server_type"));
}

#[test]
fn test_missing_profile_file_is_an_io_error() -> Result<()> {
    let dir = tempdir()?;
    let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.yaml"))
        .map_err(|p| anyhow::anyhow!("non-utf8 path: {}", p.display()))?;
    let err = load_profile(&path).unwrap_err();
    assert!(matches!(err, PackstepError::Io { .. }));
    assert!(err.to_string().contains("absent.yaml"));
    Ok(())
}

#[test]
fn test_local_builder_runs_hyperv_without_communicator() -> Result<()> {
    let mut profile = helpers::load_profile_from_yaml(
        "builder:\n  type: hyperv-vmcx\n  clone_from_vm_name: golden\n",
    )?;
    profile.prepare()?;
    let builder = packstep::local_builder(&profile, Arc::new(RealCommandExecutor))?;
    assert_eq!(builder.name(), "hyperv-vmcx");
    Ok(())
}

#[test]
fn test_local_builder_rejects_cloud_builders_and_ssh() -> Result<()> {
    let cloud = helpers::load_profile_from_yaml(
        "builder:\n  type: hcloud\n  token: t\n  server_type: cx22\n  image: debian-12\n",
    )?;
    let err = packstep::local_builder(&cloud, Arc::new(RealCommandExecutor)).err();
    assert!(matches!(err, Some(PackstepError::Config(_))));

    let ssh = helpers::load_profile_from_yaml(
        "builder:\n  type: hyperv-vmcx\n  clone_from_vm_name: golden\n\
         communicator:\n  type: ssh\n  username: root\n",
    )?;
    let err = packstep::local_builder(&ssh, Arc::new(RealCommandExecutor)).err();
    assert!(err.is_some_and(|e| e.to_string().contains("ssh communicator")));
    Ok(())
}
