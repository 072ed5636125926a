use std::time::Duration;

use serde::Serialize;

use crate::adb::{AdbClient, Device};
use crate::agent::{self, AgentManager};
use crate::core::{AgentArch, AgentStatus, DeviceFacts, VersionInfo};
use crate::platform::{self, CommandOutput};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PIP_TIMEOUT: Duration = Duration::from_secs(10);

pub const CLIENT_COMPONENT: &str = "agent-python";
pub const TOOLS_COMPONENT: &str = "agent-tools";
pub const AGENT_COMPONENT: &str = "agent-server";

#[derive(Debug, Clone, Serialize)]
pub struct InventorySnapshot {
    pub serial: String,
    pub facts: DeviceFacts,
    pub client: VersionInfo,
    pub tools: VersionInfo,
    pub agent: VersionInfo,
    pub agent_status: AgentStatus,
    pub enforcement: String,
}

fn run_probe(cmd: &str, args: &[&str], timeout: Duration) -> Option<CommandOutput> {
    platform::run_command(cmd, args, timeout)
        .ok()
        .filter(|out| out.exit_code == 0)
}

fn parse_pip_show_version(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn pip_show_version(package: &str) -> Option<String> {
    let out = run_probe("pip3", &["show", package], PIP_TIMEOUT)?;
    parse_pip_show_version(&out.stdout)
}

fn python_module_version(module: &str) -> Option<String> {
    let code = format!("import {module}; print({module}.__version__)");
    let out = run_probe("python3", &["-c", &code], PROBE_TIMEOUT)?;
    let version = out.stdout.trim();
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

fn cli_version(bin: &str) -> Option<String> {
    let out = run_probe(bin, &["--version"], PROBE_TIMEOUT)?;
    let version = out.stdout.trim();
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

fn first_hit(probes: &[fn() -> Option<String>]) -> Option<String> {
    probes.iter().find_map(|probe| probe())
}

pub fn host_client_version() -> VersionInfo {
    let probes: [fn() -> Option<String>; 2] = [
        || python_module_version("agent"),
        || pip_show_version("agent"),
    ];
    match first_hit(&probes) {
        Some(version) => VersionInfo::installed(CLIENT_COMPONENT, version),
        None => VersionInfo::missing(CLIENT_COMPONENT),
    }
}

pub fn host_tools_version() -> VersionInfo {
    let probes: [fn() -> Option<String>; 2] =
        [|| cli_version("agent"), || pip_show_version("agent-tools")];
    match first_hit(&probes) {
        Some(version) => VersionInfo::installed(TOOLS_COMPONENT, version),
        None => VersionInfo::missing(TOOLS_COMPONENT),
    }
}

pub fn device_agent_version(manager: &AgentManager) -> VersionInfo {
    let from_running = manager
        .running_servers()
        .first()
        .and_then(|s| agent::version_from_path(&s.path));
    let version = from_running.or_else(|| {
        manager
            .installed_servers()
            .first()
            .and_then(|path| agent::version_from_path(path))
    });

    match version {
        Some(version) => VersionInfo::installed(AGENT_COMPONENT, version),
        None => VersionInfo::missing(AGENT_COMPONENT),
    }
}

pub fn os_major(release: &str) -> u32 {
    release
        .split('.')
        .next()
        .and_then(|part| part.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

pub fn collect_device_facts(adb: &AdbClient) -> DeviceFacts {
    let os_version = adb
        .get_property("ro.build.version.release")
        .map(|r| os_major(&r))
        .unwrap_or(0);
    let sdk_version = adb
        .get_property("ro.build.version.sdk")
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let abi = adb.get_property("ro.product.cpu.abi").unwrap_or_default();

    DeviceFacts {
        os_version,
        sdk_version,
        agent_arch: AgentArch::from_abi(&abi),
        abi,
        model: adb.get_property("ro.product.model").unwrap_or_default(),
        manufacturer: adb
            .get_property("ro.product.manufacturer")
            .unwrap_or_default(),
        security_patch: adb
            .get_property("ro.build.version.security_patch")
            .unwrap_or_default(),
        build_fingerprint: adb.get_property("ro.build.fingerprint").unwrap_or_default(),
    }
}

pub fn enforcement_mode(adb: &AdbClient) -> String {
    match adb.shell("getenforce") {
        Ok(out) => out.stdout.trim().to_string(),
        Err(_) => String::new(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceDetail {
    pub serial: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub facts: DeviceFacts,
}

pub fn describe_devices(devices: &[Device], timeout: Duration) -> Vec<DeviceDetail> {
    devices
        .iter()
        .map(|device| {
            let facts = if device.is_authorized() {
                collect_device_facts(&AdbClient::new(Some(device.serial.clone()), timeout))
            } else {
                DeviceFacts::default()
            };
            DeviceDetail {
                serial: device.serial.clone(),
                state: device.state.clone(),
                model: device.model.clone(),
                facts,
            }
        })
        .collect()
}

pub fn collect(adb: &AdbClient, manager: &AgentManager) -> InventorySnapshot {
    InventorySnapshot {
        serial: adb.serial().unwrap_or_default().to_string(),
        facts: collect_device_facts(adb),
        client: host_client_version(),
        tools: host_tools_version(),
        agent: device_agent_version(manager),
        agent_status: manager.status(),
        enforcement: enforcement_mode(adb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pip_show_output_yields_version_line() {
        let stdout = "Name: agent\nVersion: 16.1.17\nSummary: dynamic instrumentation\n";
        assert_eq!(parse_pip_show_version(stdout).as_deref(), Some("16.1.17"));
    }

    #[test]
    fn pip_show_without_version_line_is_none() {
        assert_eq!(parse_pip_show_version("Name: agent\n"), None);
        assert_eq!(parse_pip_show_version("Version:\n"), None);
    }

    #[test]
    fn os_major_takes_leading_component() {
        assert_eq!(os_major("13"), 13);
        assert_eq!(os_major("8.1.0"), 8);
        assert_eq!(os_major(""), 0);
        assert_eq!(os_major("UpsideDownCake"), 0);
    }

    #[test]
    fn first_hit_stops_at_first_result() {
        let probes: [fn() -> Option<String>; 3] = [
            || None,
            || Some("16.1.17".to_string()),
            || Some("0.0.1".to_string()),
        ];
        assert_eq!(first_hit(&probes).as_deref(), Some("16.1.17"));
    }

    #[test]
    fn first_hit_empty_when_all_probes_miss() {
        let probes: [fn() -> Option<String>; 2] = [|| None, || None];
        assert_eq!(first_hit(&probes), None);
    }
}
