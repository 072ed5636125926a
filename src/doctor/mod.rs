use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::adb::{self, AdbClient};
use crate::agent::AgentManager;
use crate::config::EffectiveConfig;
use crate::download;
use crate::inventory;
use crate::platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            fix: None,
        }
    }

    fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub const fn icon(&self) -> &'static str {
        match self.status {
            CheckStatus::Ok => "✓",
            CheckStatus::Warning => "!",
            CheckStatus::Error => "✗",
            CheckStatus::Skipped => "○",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DoctorSummary {
    pub ok: usize,
    pub warning: usize,
    pub error: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub checks: Vec<CheckResult>,
    pub summary: DoctorSummary,
}

impl DoctorReport {
    pub fn has_errors(&self) -> bool {
        self.checks
            .iter()
            .any(|c| c.status == CheckStatus::Error)
    }

    pub fn fixes(&self) -> Vec<(&str, &str)> {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, CheckStatus::Error | CheckStatus::Warning))
            .filter_map(|c| c.fix.as_deref().map(|fix| (c.name.as_str(), fix)))
            .collect()
    }
}

fn check_adb(timeout: Duration) -> CheckResult {
    match platform::run_command("adb", &["version"], timeout) {
        Ok(out) if out.exit_code == 0 => {
            let version = out.stdout.lines().next().unwrap_or("不明").to_string();
            CheckResult::new("adb", CheckStatus::Ok, version)
        }
        _ => CheckResult::new("adb", CheckStatus::Error, "adb が見つかりません").with_fix(
            "Android SDK Platform Tools をインストールし、PATH に追加してください",
        ),
    }
}

fn check_xz() -> CheckResult {
    if download::check_xz_installed() {
        CheckResult::new("xz", CheckStatus::Ok, "xz コマンドが利用可能です")
    } else {
        CheckResult::new(
            "xz",
            CheckStatus::Error,
            "xz が見つかりません（エージェントサーバーの展開に必要）",
        )
        .with_fix("xz-utils をインストールしてください")
    }
}

fn check_devices(timeout: Duration) -> CheckResult {
    let devices = match adb::list_devices(timeout) {
        Ok(devices) => devices,
        Err(_) => {
            return CheckResult::new(
                "デバイス接続",
                CheckStatus::Error,
                "デバイス一覧を取得できません",
            )
            .with_fix("adb のインストールとデバイスの接続を確認してください");
        }
    };

    let authorized = devices.iter().filter(|d| d.is_authorized()).count();
    let unauthorized = devices.iter().filter(|d| d.is_unauthorized()).count();

    if devices.is_empty() {
        CheckResult::new(
            "デバイス接続",
            CheckStatus::Error,
            "デバイスが接続されていません",
        )
        .with_fix("USB で接続し、USB デバッグを有効にしてください")
    } else if authorized > 0 {
        CheckResult::new(
            "デバイス接続",
            CheckStatus::Ok,
            format!("{authorized} 台のデバイスが認証済みです"),
        )
    } else if unauthorized > 0 {
        CheckResult::new(
            "デバイス接続",
            CheckStatus::Warning,
            format!("{unauthorized} 台のデバイスが未認証です"),
        )
        .with_fix("端末側で USB デバッグの確認ダイアログを許可してください")
    } else {
        CheckResult::new(
            "デバイス接続",
            CheckStatus::Warning,
            format!("{} 台のデバイスが不明な状態です", devices.len()),
        )
    }
}

fn check_root(adb: &AdbClient) -> CheckResult {
    if adb.check_root() {
        CheckResult::new("root 権限", CheckStatus::Ok, "root アクセスがあります")
    } else {
        CheckResult::new(
            "root 権限",
            CheckStatus::Error,
            "root 化されていないか、root が許可されていません",
        )
        .with_fix("デバイスを root 化するか、ADB に root を許可してください")
    }
}

fn check_selinux(adb: &AdbClient) -> CheckResult {
    let mode = inventory::enforcement_mode(adb);
    if mode.contains("Permissive") {
        CheckResult::new("SELinux", CheckStatus::Ok, "SELinux は Permissive です")
    } else if mode.contains("Enforcing") {
        CheckResult::new(
            "SELinux",
            CheckStatus::Warning,
            "SELinux が Enforcing です（エージェントの動作を妨げる可能性）",
        )
        .with_fix("adb shell su -c 'setenforce 0' の実行を検討してください")
    } else if mode.is_empty() {
        CheckResult::new("SELinux", CheckStatus::Ok, "SELinux の状態: 不明")
    } else {
        CheckResult::new(
            "SELinux",
            CheckStatus::Ok,
            format!("SELinux の状態: {mode}"),
        )
    }
}

fn check_agent_server(manager: &AgentManager, port: u16) -> CheckResult {
    let status = manager.status();
    if status.running && status.port_listening {
        CheckResult::new(
            "エージェントサーバー",
            CheckStatus::Ok,
            format!("稼働中です（ポート {port} で待受）"),
        )
    } else if status.running {
        CheckResult::new(
            "エージェントサーバー",
            CheckStatus::Warning,
            "稼働中ですが既定ポートで待ち受けていません",
        )
        .with_fix("agentctl restart で再起動してください")
    } else if !status.installed_servers.is_empty() {
        CheckResult::new(
            "エージェントサーバー",
            CheckStatus::Warning,
            "インストール済みですが停止しています",
        )
        .with_fix("agentctl start で起動してください")
    } else {
        CheckResult::new(
            "エージェントサーバー",
            CheckStatus::Error,
            "インストールされていません",
        )
        .with_fix("agentctl install --latest でインストールしてください")
    }
}

fn check_host_client() -> CheckResult {
    let client = inventory::host_client_version();
    if client.installed {
        CheckResult::new(
            "ホストクライアント",
            CheckStatus::Ok,
            client.label(),
        )
    } else {
        CheckResult::new(
            "ホストクライアント",
            CheckStatus::Warning,
            "ホストクライアントが未インストールです",
        )
        .with_fix("pip install agent agent-tools を実行してください")
    }
}

fn check_device_storage(adb: &AdbClient, remote_dir: &str) -> CheckResult {
    let out = adb.shell(&format!("df {remote_dir} | tail -1"));
    if let Ok(out) = out {
        if out.exit_code == 0 {
            let parts: Vec<&str> = out.stdout.split_whitespace().collect();
            if parts.len() >= 4 {
                return CheckResult::new(
                    "デバイス空き容量",
                    CheckStatus::Ok,
                    format!("{remote_dir} の空き容量: {}", parts[3]),
                );
            }
        }
    }
    CheckResult::new(
        "デバイス空き容量",
        CheckStatus::Warning,
        "空き容量を確認できませんでした",
    )
}

fn skipped(name: &str) -> CheckResult {
    CheckResult::new(name, CheckStatus::Skipped, "確認できるデバイスがありません")
}

pub fn run_checks(
    requested_serial: Option<&str>,
    cfg: &EffectiveConfig,
    timeout: Duration,
) -> DoctorReport {
    let mut checks = vec![check_adb(timeout), check_xz(), check_devices(timeout)];

    match adb::try_select_device(requested_serial, timeout) {
        Some(serial) => {
            let adb = AdbClient::new(Some(serial), timeout);
            let manager = AgentManager::new(
                adb.clone(),
                cfg.agent.remote_dir.clone(),
                cfg.agent.port,
                cfg.download.clone(),
            );
            checks.push(CheckResult::new(
                "USB デバッグ",
                CheckStatus::Ok,
                "USB デバッグが有効です",
            ));
            checks.push(check_root(&adb));
            checks.push(check_selinux(&adb));
            checks.push(check_agent_server(&manager, cfg.agent.port));
            checks.push(check_device_storage(&adb, &cfg.agent.remote_dir));
        }
        None => {
            checks.push(skipped("USB デバッグ"));
            checks.push(skipped("root 権限"));
            checks.push(skipped("SELinux"));
            checks.push(skipped("エージェントサーバー"));
            checks.push(skipped("デバイス空き容量"));
        }
    }

    checks.push(check_host_client());

    let mut summary = DoctorSummary::default();
    for check in &checks {
        match check.status {
            CheckStatus::Ok => summary.ok += 1,
            CheckStatus::Warning => summary.warning += 1,
            CheckStatus::Error => summary.error += 1,
            CheckStatus::Skipped => summary.skipped += 1,
        }
    }

    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    DoctorReport {
        schema_version: crate::automator::SCHEMA_VERSION.to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at,
        checks,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_by_status() {
        let checks = vec![
            CheckResult::new("a", CheckStatus::Ok, "ok"),
            CheckResult::new("b", CheckStatus::Warning, "warn").with_fix("fix b"),
            CheckResult::new("c", CheckStatus::Error, "error").with_fix("fix c"),
            CheckResult::new("d", CheckStatus::Skipped, "skip"),
        ];
        let report = DoctorReport {
            schema_version: "1.0".to_string(),
            tool_version: "0.1.0".to_string(),
            generated_at: "unknown".to_string(),
            summary: DoctorSummary {
                ok: 1,
                warning: 1,
                error: 1,
                skipped: 1,
            },
            checks,
        };

        assert!(report.has_errors());
        let fixes = report.fixes();
        assert_eq!(fixes.len(), 2);
        assert_eq!(fixes[0], ("b", "fix b"));
        assert_eq!(fixes[1], ("c", "fix c"));
    }

    #[test]
    fn icons_match_status() {
        assert_eq!(CheckResult::new("a", CheckStatus::Ok, "").icon(), "✓");
        assert_eq!(CheckResult::new("a", CheckStatus::Warning, "").icon(), "!");
        assert_eq!(CheckResult::new("a", CheckStatus::Error, "").icon(), "✗");
        assert_eq!(CheckResult::new("a", CheckStatus::Skipped, "").icon(), "○");
    }
}
