use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::platform::{self, CommandOutput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub state: String,
    pub model: Option<String>,
}

impl Device {
    pub fn is_authorized(&self) -> bool {
        self.state == "device"
    }

    pub fn is_unauthorized(&self) -> bool {
        self.state == "unauthorized"
    }

    pub fn label(&self) -> String {
        format!(
            "{} ({}) - {}",
            self.serial,
            self.model.as_deref().unwrap_or("不明"),
            self.state
        )
    }
}

pub fn parse_devices_output(output: &str) -> Vec<Device> {
    let mut devices = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("List of devices attached") {
            continue;
        }

        let mut parts = line.split_whitespace();
        let Some(serial) = parts.next() else {
            continue;
        };
        let Some(state) = parts.next() else {
            continue;
        };

        let mut model = None;
        for part in parts {
            if let Some(value) = part.strip_prefix("model:") {
                model = Some(value.to_string());
                break;
            }
        }

        devices.push(Device {
            serial: serial.to_string(),
            state: state.to_string(),
            model,
        });
    }

    devices
}

#[derive(Debug, Clone)]
pub struct AdbClient {
    serial: Option<String>,
    timeout: Duration,
}

impl AdbClient {
    pub fn new(serial: Option<String>, timeout: Duration) -> Self {
        Self { serial, timeout }
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let mut full_args: Vec<&str> = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            full_args.push("-s");
            full_args.push(serial);
        }
        full_args.extend_from_slice(args);
        platform::run_command("adb", &full_args, self.timeout)
            .context("adb の実行に失敗しました")
    }

    pub fn shell(&self, command: &str) -> Result<CommandOutput> {
        self.run(&["shell", command])
    }

    pub fn shell_su(&self, command: &str) -> Result<CommandOutput> {
        self.run(&["shell", "su", "-c", command])
    }

    pub fn push(&self, local: &Path, remote: &str) -> Result<()> {
        let local = local
            .to_str()
            .ok_or_else(|| anyhow!("ローカルパスが不正です: {}", local.display()))?;
        let out = self.run(&["push", local, remote])?;
        if out.exit_code != 0 {
            return Err(anyhow!(
                "ファイルの転送に失敗しました: {}",
                out.stderr.trim()
            ));
        }
        Ok(())
    }

    pub fn pull(&self, remote: &str, local: &Path) -> Result<()> {
        let local = local
            .to_str()
            .ok_or_else(|| anyhow!("ローカルパスが不正です: {}", local.display()))?;
        let out = self.run(&["pull", remote, local])?;
        if out.exit_code != 0 {
            return Err(anyhow!(
                "ファイルの取得に失敗しました: {}",
                out.stderr.trim()
            ));
        }
        Ok(())
    }

    pub fn get_property(&self, prop: &str) -> Option<String> {
        let out = self.shell(&format!("getprop {prop}")).ok()?;
        if out.exit_code != 0 {
            return None;
        }
        let value = out.stdout.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    pub fn file_exists(&self, path: &str) -> bool {
        match self.shell(&format!("ls {path}")) {
            Ok(out) => out.exit_code == 0 && !out.stderr.contains("No such file"),
            Err(_) => false,
        }
    }

    pub fn chmod(&self, path: &str, mode: &str) -> Result<()> {
        let out = self.shell(&format!("chmod {mode} {path}"))?;
        if out.exit_code != 0 {
            return Err(anyhow!(
                "パーミッションの変更に失敗しました: {}",
                out.stderr.trim()
            ));
        }
        Ok(())
    }

    pub fn check_root(&self) -> bool {
        match self.shell_su("id") {
            Ok(out) => out.stdout.contains("uid=0(root)"),
            Err(_) => false,
        }
    }
}

pub fn list_devices(timeout: Duration) -> Result<Vec<Device>> {
    let out = platform::run_command("adb", &["devices", "-l"], timeout)
        .context("adb の実行に失敗しました（PATH に adb がありますか）")?;
    if out.exit_code != 0 {
        return Err(anyhow!(
            "デバイス一覧の取得に失敗しました: {}",
            out.stderr.trim()
        ));
    }
    Ok(parse_devices_output(&out.stdout))
}

pub fn try_select_device(requested: Option<&str>, timeout: Duration) -> Option<String> {
    let devices = list_devices(timeout).ok()?;
    let authorized: Vec<&Device> = devices.iter().filter(|d| d.is_authorized()).collect();

    if let Some(serial) = requested {
        return authorized
            .iter()
            .find(|d| d.serial == serial)
            .map(|d| d.serial.clone());
    }

    match authorized.as_slice() {
        [only] => Some(only.serial.clone()),
        _ => None,
    }
}

pub fn select_device(requested: Option<&str>, timeout: Duration) -> Result<String> {
    let devices = list_devices(timeout).map_err(crate::exit::external_cmd_err)?;
    let authorized: Vec<&Device> = devices.iter().filter(|d| d.is_authorized()).collect();

    if let Some(serial) = requested {
        if authorized.iter().any(|d| d.serial == serial) {
            return Ok(serial.to_string());
        }
        if devices.iter().any(|d| d.serial == serial) {
            return Err(crate::exit::device(format!(
                "デバイス {serial} は未認証です（端末側で USB デバッグを許可してください）"
            )));
        }
        return Err(crate::exit::device(format!(
            "デバイス {serial} が見つかりません"
        )));
    }

    match authorized.as_slice() {
        [] if devices.iter().any(|d| d.is_unauthorized()) => Err(crate::exit::device(
            "未認証のデバイスのみ接続されています（端末側で USB デバッグを許可してください）",
        )),
        [] => Err(crate::exit::device("認証済みのデバイスが接続されていません")),
        [only] => Ok(only.serial.clone()),
        _ => Err(crate::exit::device(
            "複数のデバイスが接続されています（--device でシリアルを指定してください）",
        )),
    }
}
