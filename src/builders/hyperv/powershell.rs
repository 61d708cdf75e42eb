//! [`Driver`] implementation that drives Hyper-V through PowerShell scripts.
//!
//! Each operation writes a short script to a temporary `.ps1` file and runs
//! it with the configured PowerShell binary through a [`CommandExecutor`].
//! Parameters are passed positionally and bound by the script's `param()`
//! block. Boolean answers come back as `True`/`False` on stdout.

use std::fs;
use std::sync::Arc;

use anyhow::{Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, trace};

use super::driver::{CloneRequest, Driver};
use crate::error::PackstepError;
use crate::executor::{CommandExecutor, CommandSpec};

const VERIFY: &str = r#"
if (Get-Module -ListAvailable -Name Hyper-V) { "True" } else { "False" }
"#;

const EXPORT_SOURCE_VM: &str = r#"
param([string]$path, [string]$vmName, [string]$snapshotName, [string]$allSnapshots)
$target = Join-Path $path 'source'
if ($snapshotName) {
  $snapshot = Hyper-V\Get-VMSnapshot -VMName $vmName -Name $snapshotName
  Hyper-V\Export-VMSnapshot -VMSnapshot $snapshot -Path $target -ErrorAction Stop
} elseif ($allSnapshots -eq 'True') {
  Hyper-V\Export-VM -Name $vmName -Path $target -ErrorAction Stop
} else {
  Hyper-V\Get-VMSnapshot -VMName $vmName | Sort-Object CreationTime | Select-Object -Last 1 |
    Hyper-V\Export-VMSnapshot -Path $target -ErrorAction Stop
}
"#;

const COPY_SOURCE_VMCX: &str = r#"
param([string]$path, [string]$vmcxPath)
$target = Join-Path $path 'source'
New-Item -ItemType Directory -Force -Path $target | Out-Null
Copy-Item -Path (Join-Path $vmcxPath '*') -Destination $target -Recurse -Force
"#;

const IMPORT_VM: &str = r#"
param([string]$path, [string]$vmName, [long]$memoryStartupBytes, [string]$switchName)
$config = Get-ChildItem -Path (Join-Path $path 'source') -Recurse -Filter *.vmcx | Select-Object -First 1
if (!$config) { throw "no .vmcx file found under $path" }
$report = Hyper-V\Compare-VM -Path $config.FullName -Copy -GenerateNewId `
  -VirtualMachinePath $path -SnapshotFilePath $path -VhdDestinationPath (Join-Path $path 'Virtual Hard Disks')
Hyper-V\Rename-VM -VM $report.VM -NewName $vmName
Hyper-V\Import-VM -CompatibilityReport $report | Out-Null
Hyper-V\Set-VMMemory -VMName $vmName -StartupBytes $memoryStartupBytes
Hyper-V\Get-VMNetworkAdapter -VMName $vmName | Hyper-V\Connect-VMNetworkAdapter -SwitchName $switchName
"#;

const DELETE_VM: &str = r#"
param([string]$vmName)
$vm = Hyper-V\Get-VM -Name $vmName
if (($vm.State -ne 'Off') -and ($vm.State -ne 'OffCritical')) {
  Hyper-V\Stop-VM -VM $vm -TurnOff -Force -Confirm:$false
}
Hyper-V\Remove-VM -Name $vmName -Force -Confirm:$false
"#;

const SET_CPU_COUNT: &str = r#"
param([string]$vmName, [int]$cpu)
Hyper-V\Set-VMProcessor -VMName $vmName -Count $cpu
"#;

const SET_MAC_SPOOFING: &str = r#"
param([string]$vmName, [string]$enable)
Hyper-V\Set-VMNetworkAdapter -VMName $vmName -MacAddressSpoofing $(if ($enable -eq 'True') { 'On' } else { 'Off' })
"#;

const SET_DYNAMIC_MEMORY: &str = r#"
param([string]$vmName, [string]$enable)
Hyper-V\Set-VMMemory -VMName $vmName -DynamicMemoryEnabled ([System.Boolean]::Parse($enable))
"#;

const SET_SECURE_BOOT: &str = r#"
param([string]$vmName, [string]$enable)
Hyper-V\Set-VMFirmware -VMName $vmName -EnableSecureBoot $(if ($enable -eq 'True') { 'On' } else { 'Off' })
"#;

const SET_VIRTUALIZATION_EXTENSIONS: &str = r#"
param([string]$vmName, [string]$enable)
Hyper-V\Set-VMProcessor -VMName $vmName -ExposeVirtualizationExtensions ([System.Boolean]::Parse($enable))
"#;

const ENABLE_INTEGRATION_SERVICE: &str = r#"
param([string]$vmName, [string]$serviceId)
Hyper-V\Get-VMIntegrationService -VMName $vmName | Where-Object { $_.Id -match $serviceId } |
  Hyper-V\Enable-VMIntegrationService
"#;

const SET_VLAN_ID: &str = r#"
param([string]$vmName, [string]$vlanId)
Hyper-V\Set-VMNetworkAdapterVlan -VMName $vmName -Access -VlanId $vlanId
"#;

const START_VM: &str = r#"
param([string]$vmName)
$vm = Hyper-V\Get-VM -Name $vmName -ErrorAction SilentlyContinue
if ($vm.State -eq 'Off') {
  Hyper-V\Start-VM -Name $vmName -Confirm:$false
}
"#;

const STOP_VM: &str = r#"
param([string]$vmName)
$vm = Hyper-V\Get-VM -Name $vmName
if ($vm.State -eq 'Running') {
  Hyper-V\Stop-VM -VM $vm -Force -Confirm:$false
}
"#;

const VM_STATE_IS: &str = r#"
param([string]$vmName, [string]$state)
$vm = Hyper-V\Get-VM -Name $vmName -ErrorAction SilentlyContinue
"$($vm.State)" -eq $state
"#;

const MAC: &str = r#"
param([string]$vmName)
$adapter = Hyper-V\Get-VMNetworkAdapter -VMName $vmName -ErrorAction SilentlyContinue | Select-Object -First 1
if ($adapter) { $adapter.MacAddress }
"#;

const IP_ADDRESS: &str = r#"
param([string]$mac)
$vm = Hyper-V\Get-VM | Where-Object { $_.NetworkAdapters.MacAddress -eq $mac }
$vm.NetworkAdapters.IPAddresses | Where-Object { $_ -match '^\d+\.\d+\.\d+\.\d+$' } | Select-Object -First 1
"#;

const COMPACT_DISKS: &str = r#"
param([string]$srcPath)
$disks = Get-ChildItem -Path $srcPath -Recurse -ErrorAction SilentlyContinue |
  Where-Object { $_.Extension -in '.vhdx', '.vhd' }
if (!$disks) {
  Write-Output "WARNING: no disks found under $srcPath"
  exit
}
foreach ($disk in $disks) {
  Write-Output "Compacting disk: $($disk.Name)"
  Optimize-VHD -Path $disk.FullName -Mode Full
}
"#;

const EXPORT_VM: &str = r#"
param([string]$vmName, [string]$path)
Hyper-V\Export-VM -Name $vmName -Path $path -ErrorAction Stop
"#;

const COPY_EXPORTED_VM: &str = r#"
param([string]$exportPath, [string]$outputPath)
New-Item -ItemType Directory -Force -Path $outputPath | Out-Null
Get-ChildItem -Path $exportPath | Select-Object -First 1 | Get-ChildItem |
  Copy-Item -Destination $outputPath -Recurse -Force
"#;

/// Maps an integration service display name to its Hyper-V ID.
fn integration_service_id(name: &str) -> Result<&'static str> {
    Ok(match name {
        "Time Synchronization" => "2497F4DE-E9FA-4204-80E4-4B75C46419C0",
        "Heartbeat" => "84EAAE65-2F2E-45F5-9BB5-0E857DC8EB47",
        "Key-Value Pair Exchange" => "2A34B1C2-FD73-4043-8A5B-DD2159BC743F",
        "Shutdown" => "9F8233AC-BE49-4C79-8EE3-E7E1985B2077",
        "VSS" => "5CED1297-4598-4915-A5FC-AD21BB4D02A4",
        "Guest Service Interface" => "6C09BB55-D683-4DA0-8931-C9BF705F6480",
        other => bail!("unknown integration service '{}'", other),
    })
}

fn powershell_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn is_true(output: &str) -> bool {
    output.trim() == "True"
}

/// Removes the generated script when dropped, whatever happened meanwhile.
struct TempFileGuard {
    path: Utf8PathBuf,
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => trace!("cleaned up temp script: {}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(
                path = %self.path,
                error_kind = ?e.kind(),
                "failed to cleanup temp script: {}",
                e,
            ),
        }
    }
}

/// Hyper-V driver backed by PowerShell.
pub struct PowerShellDriver {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
    script_dir: Utf8PathBuf,
}

impl PowerShellDriver {
    pub fn new(executor: Arc<dyn CommandExecutor>, binary: impl Into<String>) -> Self {
        let script_dir = Utf8PathBuf::from_path_buf(std::env::temp_dir())
            .unwrap_or_else(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()));
        Self {
            executor,
            binary: binary.into(),
            script_dir,
        }
    }

    /// Writes generated scripts to `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_script_dir(mut self, dir: Utf8PathBuf) -> Self {
        self.script_dir = dir;
        self
    }

    /// Runs `script` with `params` and returns its trimmed stdout.
    fn output(&self, script: &str, params: &[&str]) -> Result<String> {
        let path = self
            .script_dir
            .join(format!("packstep-{}.ps1", uuid::Uuid::new_v4()));
        fs::write(&path, script)
            .map_err(|e| PackstepError::io(format!("failed to write script {}", path), e))?;
        let _guard = TempFileGuard { path: path.clone() };

        let mut args: Vec<String> = [
            "-NoProfile",
            "-NonInteractive",
            "-ExecutionPolicy",
            "Bypass",
            "-File",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(path.to_string());
        args.extend(params.iter().map(|p| p.to_string()));

        let spec = CommandSpec::new(&self.binary, args);
        debug!("running powershell: {}", spec.display());
        let result = self.executor.execute(&spec)?;
        if !result.success() {
            return Err(PackstepError::Execution {
                command: spec.display(),
                status: match result.code() {
                    Some(code) => format!("exit code {}", code),
                    None => "terminated by signal".to_string(),
                },
            }
            .into());
        }
        Ok(result.stdout.trim().to_string())
    }

    fn run(&self, script: &str, params: &[&str]) -> Result<()> {
        self.output(script, params).map(drop)
    }
}

impl Driver for PowerShellDriver {
    fn verify(&self) -> Result<()> {
        if !is_true(&self.output(VERIFY, &[])?) {
            bail!("the Hyper-V PowerShell module is not available on this host");
        }
        Ok(())
    }

    fn clone_vm(&self, request: &CloneRequest) -> Result<()> {
        let memory = request
            .memory_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| {
                PackstepError::Validation(format!("memory_mb {} is too large", request.memory_mb))
            })?
            .to_string();
        let path = request.path.as_str();
        if let Some(vm) = &request.source_vm {
            self.run(
                EXPORT_SOURCE_VM,
                &[
                    path,
                    vm,
                    request.snapshot_name.as_deref().unwrap_or(""),
                    powershell_bool(request.all_snapshots),
                ],
            )?;
        }
        if let Some(vmcx) = &request.vmcx_path {
            self.run(COPY_SOURCE_VMCX, &[path, vmcx.as_str()])?;
        }
        self.run(
            IMPORT_VM,
            &[path, &request.vm_name, &memory, &request.switch_name],
        )
    }

    fn delete_vm(&self, vm: &str) -> Result<()> {
        self.run(DELETE_VM, &[vm])
    }

    fn set_cpu_count(&self, vm: &str, cpus: u32) -> Result<()> {
        self.run(SET_CPU_COUNT, &[vm, &cpus.to_string()])
    }

    fn set_mac_spoofing(&self, vm: &str, enable: bool) -> Result<()> {
        self.run(SET_MAC_SPOOFING, &[vm, powershell_bool(enable)])
    }

    fn set_dynamic_memory(&self, vm: &str, enable: bool) -> Result<()> {
        self.run(SET_DYNAMIC_MEMORY, &[vm, powershell_bool(enable)])
    }

    fn set_secure_boot(&self, vm: &str, enable: bool) -> Result<()> {
        self.run(SET_SECURE_BOOT, &[vm, powershell_bool(enable)])
    }

    fn set_virtualization_extensions(&self, vm: &str, enable: bool) -> Result<()> {
        self.run(SET_VIRTUALIZATION_EXTENSIONS, &[vm, powershell_bool(enable)])
    }

    fn enable_integration_service(&self, vm: &str, service: &str) -> Result<()> {
        let id = integration_service_id(service)?;
        self.run(ENABLE_INTEGRATION_SERVICE, &[vm, id])
    }

    fn set_vlan_id(&self, vm: &str, vlan_id: u16) -> Result<()> {
        self.run(SET_VLAN_ID, &[vm, &vlan_id.to_string()])
    }

    fn start(&self, vm: &str) -> Result<()> {
        self.run(START_VM, &[vm])
    }

    fn stop(&self, vm: &str) -> Result<()> {
        self.run(STOP_VM, &[vm])
    }

    fn is_running(&self, vm: &str) -> Result<bool> {
        Ok(is_true(&self.output(VM_STATE_IS, &[vm, "Running"])?))
    }

    fn is_off(&self, vm: &str) -> Result<bool> {
        Ok(is_true(&self.output(VM_STATE_IS, &[vm, "Off"])?))
    }

    fn mac(&self, vm: &str) -> Result<String> {
        self.output(MAC, &[vm])
    }

    fn ip_address(&self, mac: &str) -> Result<String> {
        self.output(IP_ADDRESS, &[mac])
    }

    fn compact_disks(&self, disk_dir: &Utf8Path) -> Result<()> {
        let report = self.output(COMPACT_DISKS, &[disk_dir.as_str()])?;
        for line in report.lines() {
            debug!("{}", line);
        }
        Ok(())
    }

    fn export_vm(&self, vm: &str, path: &Utf8Path) -> Result<()> {
        self.run(EXPORT_VM, &[vm, path.as_str()])
    }

    fn copy_exported_vm(&self, export_path: &Utf8Path, output_path: &Utf8Path) -> Result<()> {
        self.run(COPY_EXPORTED_VM, &[export_path.as_str(), output_path.as_str()])
    }
}
