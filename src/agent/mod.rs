use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use crate::adb::AdbClient;
use crate::config::DownloadConfig;
use crate::core::{AgentArch, AgentInstance, AgentStatus};
use crate::download;

const START_WAIT: Duration = Duration::from_secs(2);
const START_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub fn version_from_path(path: &str) -> Option<String> {
    let rest = &path[path.find("agent-server-")? + "agent-server-".len()..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let candidate = rest[..end].trim_end_matches('.');

    let parts: Vec<&str> = candidate.split('.').collect();
    if parts.len() < 3 {
        return None;
    }
    if parts[..3]
        .iter()
        .any(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    Some(parts[..3].join("."))
}

pub fn parse_running_servers(ps_output: &str) -> Vec<AgentInstance> {
    let mut servers = Vec::new();

    for line in ps_output.lines() {
        if !line.contains("agent-server") || line.contains("grep") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let Ok(pid) = parts[1].parse::<u32>() else {
            continue;
        };
        let path = parts
            .last()
            .filter(|p| p.contains('/'))
            .map(|p| p.to_string())
            .unwrap_or_default();
        servers.push(AgentInstance { pid, path });
    }

    servers
}

pub struct AgentManager {
    adb: AdbClient,
    remote_dir: String,
    port: u16,
    download: DownloadConfig,
}

impl AgentManager {
    pub fn new(adb: AdbClient, remote_dir: String, port: u16, download: DownloadConfig) -> Self {
        Self {
            adb,
            remote_dir,
            port,
            download,
        }
    }

    pub fn remote_path(&self, version: &str, arch: AgentArch) -> String {
        format!(
            "{}/{}",
            self.remote_dir,
            download::server_file_name(version, arch)
        )
    }

    pub fn running_servers(&self) -> Vec<AgentInstance> {
        match self.adb.shell("ps -Af | grep agent-server") {
            Ok(out) => parse_running_servers(&out.stdout),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.running_servers().is_empty()
    }

    pub fn port_listening(&self) -> bool {
        match self.adb.shell(&format!("netstat -tuln | grep {}", self.port)) {
            Ok(out) => !out.stdout.trim().is_empty(),
            Err(_) => false,
        }
    }

    pub fn installed_servers(&self) -> Vec<String> {
        let cmd = format!("ls {}/agent-server-* 2>/dev/null", self.remote_dir);
        match self.adb.shell(&cmd) {
            Ok(out) if out.exit_code == 0 => out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_installed(&self, version: &str, arch: AgentArch) -> Option<String> {
        let path = self.remote_path(version, arch);
        if self.adb.file_exists(&path) {
            Some(path)
        } else {
            None
        }
    }

    pub fn install(
        &self,
        version: &str,
        arch: AgentArch,
        force: bool,
        show_progress: bool,
    ) -> Result<String> {
        if arch == AgentArch::Unknown {
            return Err(anyhow!("デバイスのアーキテクチャを判定できません"));
        }

        if !force {
            if let Some(existing) = self.is_installed(version, arch) {
                return Ok(existing);
            }
        }

        let local_path = download::download_server(&self.download, version, arch, show_progress)?;
        let remote_path = self.remote_path(version, arch);

        let push_result = self
            .adb
            .push(&local_path, &remote_path)
            .and_then(|()| self.adb.chmod(&remote_path, "755"));
        let _ = std::fs::remove_file(&local_path);
        push_result?;

        Ok(remote_path)
    }

    pub fn start(&self, server_path: &str) -> Result<(bool, Option<u32>)> {
        self.adb
            .shell_su(&format!("nohup {server_path} >/dev/null 2>&1 &"))?;

        std::thread::sleep(START_WAIT);

        let deadline = Instant::now() + START_TIMEOUT;
        loop {
            let servers = self.running_servers();
            if let Some(first) = servers.first() {
                return Ok((true, Some(first.pid)));
            }
            if Instant::now() >= deadline {
                return Ok((false, None));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn stop(&self, pid: Option<u32>) -> Result<bool> {
        let pids: Vec<u32> = match pid {
            Some(pid) => vec![pid],
            None => self.running_servers().iter().map(|s| s.pid).collect(),
        };

        if pids.is_empty() {
            return Ok(true);
        }

        let mut success = true;
        for pid in pids {
            let out = self.adb.shell_su(&format!("kill -9 {pid}"))?;
            if out.exit_code != 0 {
                success = false;
            }
        }
        Ok(success)
    }

    pub fn stop_all(&self) -> Result<bool> {
        self.stop(None)
    }

    pub fn restart(&self, server_path: &str) -> Result<(bool, Option<u32>)> {
        self.stop_all()?;
        std::thread::sleep(POLL_INTERVAL);
        self.start(server_path)
    }

    pub fn uninstall(&self, version: &str, arch: AgentArch) -> Result<bool> {
        let path = self.remote_path(version, arch);
        let out = self.adb.shell(&format!("rm -f {path}"))?;
        Ok(out.exit_code == 0)
    }

    pub fn status(&self) -> AgentStatus {
        let instances = self.running_servers();
        AgentStatus {
            running: !instances.is_empty(),
            port_listening: self.port_listening(),
            installed_servers: self.installed_servers(),
            instances,
        }
    }
}
