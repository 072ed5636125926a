use std::io::{self, Write};

use anyhow::Error;

use crate::adb::Device;
use crate::core::{ActionOutcome, AnalysisReport, RunResult, VersionStatus};
use crate::doctor::{CheckStatus, DoctorReport};
use crate::inventory::{DeviceDetail, InventorySnapshot};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdin_is_tty: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 利用可能なコマンド/オプションは `agentctl --help` を参照してください"
    );
}

fn paint(text: &str, code: &str, enabled: bool) -> String {
    if enabled {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

fn green(text: &str, enabled: bool) -> String {
    paint(text, "32", enabled)
}

fn yellow(text: &str, enabled: bool) -> String {
    paint(text, "33", enabled)
}

fn red(text: &str, enabled: bool) -> String {
    paint(text, "31", enabled)
}

fn status_label(status: VersionStatus, color: bool) -> String {
    match status {
        VersionStatus::Match => green("一致", color),
        VersionStatus::Compatible => green("互換", color),
        VersionStatus::Mismatch => red("不一致", color),
        VersionStatus::Unknown => yellow("不明", color),
        VersionStatus::NotInstalled => yellow("未インストール", color),
    }
}

pub fn print_devices(devices: &[Device], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    if devices.is_empty() {
        let _ = writeln!(out, "デバイスが接続されていません。");
        return;
    }

    let _ = writeln!(out, "接続中のデバイス（{}台）:", devices.len());
    for device in devices.iter().take(cfg.max_table_rows.max(1)) {
        let state = match device.state.as_str() {
            "device" => green("認証済み", cfg.color),
            "unauthorized" => yellow("未認証", cfg.color),
            other => red(other, cfg.color),
        };
        let _ = writeln!(
            out,
            "- {} [{}] {}",
            device.serial,
            state,
            device.model.as_deref().unwrap_or("")
        );
    }
    if devices.len() > cfg.max_table_rows {
        let _ = writeln!(out, "- ...（残り{}台）", devices.len() - cfg.max_table_rows);
    }
}

pub fn print_device_details(details: &[DeviceDetail], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    if details.is_empty() {
        let _ = writeln!(out, "デバイスが接続されていません。");
        return;
    }

    for detail in details {
        let state = match detail.state.as_str() {
            "device" => green("認証済み", cfg.color),
            "unauthorized" => yellow("未認証", cfg.color),
            other => red(other, cfg.color),
        };
        let _ = writeln!(out, "{} [{}]", detail.serial, state);
        if detail.state != "device" {
            continue;
        }
        let _ = writeln!(
            out,
            "  モデル: {} / {}",
            detail.facts.manufacturer, detail.facts.model
        );
        let _ = writeln!(
            out,
            "  Android {} (SDK {}) / ABI {} → {}",
            detail.facts.os_version,
            detail.facts.sdk_version,
            detail.facts.abi,
            detail.facts.agent_arch
        );
        if !detail.facts.security_patch.is_empty() {
            let _ = writeln!(out, "  セキュリティパッチ: {}", detail.facts.security_patch);
        }
    }
}

pub fn print_status(snapshot: &InventorySnapshot, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let compat =
        crate::core::check_compatibility(&snapshot.client, &snapshot.tools, &snapshot.agent);

    let mut out = io::stdout().lock();
    let _ = writeln!(out, "デバイス: {}", snapshot.serial);
    let _ = writeln!(
        out,
        "  Android {} (SDK {}) {} / {}",
        snapshot.facts.os_version,
        snapshot.facts.sdk_version,
        snapshot.facts.abi,
        snapshot.facts.model
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "バージョン:");
    let _ = writeln!(out, "  {}", snapshot.client.label());
    let _ = writeln!(out, "  {}", snapshot.tools.label());
    let _ = writeln!(out, "  {}", snapshot.agent.label());
    let _ = writeln!(
        out,
        "互換性: [{}] {}",
        status_label(compat.status, cfg.color),
        compat.message
    );
    if let Some(fix) = &compat.fix_command {
        let _ = writeln!(out, "  修正: `{fix}`");
    }
    let _ = writeln!(out);

    if snapshot.agent_status.running {
        let _ = writeln!(
            out,
            "稼働状況: {}（ポート待受: {}）",
            green("稼働中", cfg.color),
            if snapshot.agent_status.port_listening {
                "あり"
            } else {
                "なし"
            }
        );
        for instance in &snapshot.agent_status.instances {
            let _ = writeln!(out, "  pid={} {}", instance.pid, instance.path);
        }
    } else {
        let _ = writeln!(out, "稼働状況: {}", yellow("停止中", cfg.color));
    }

    if snapshot.agent_status.installed_servers.is_empty() {
        let _ = writeln!(out, "インストール済みバイナリ: なし");
    } else {
        let _ = writeln!(out, "インストール済みバイナリ:");
        for path in &snapshot.agent_status.installed_servers {
            let _ = writeln!(out, "  - {path}");
        }
    }
}

pub fn print_analysis(report: &AnalysisReport, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let _ = writeln!(
        out,
        "デバイス: {} / Android {} ({}) / {}",
        report.serial,
        report.device.os_version,
        report.recommendation.os_codename,
        report.device.agent_arch
    );
    let _ = writeln!(
        out,
        "互換性: [{}] {}",
        status_label(report.compatibility.status, cfg.color),
        report.compatibility.message
    );
    let _ = writeln!(
        out,
        "ターゲットバージョン: {}（{}）",
        report.target_version, report.target_reason
    );
    let _ = writeln!(
        out,
        "推奨範囲: {} 以上 / 推奨 {}",
        report.recommendation.min_version, report.recommendation.recommended_version
    );
    for note in &report.recommendation.notes {
        let _ = writeln!(out, "- {note}");
    }

    let _ = writeln!(out);
    if report.issues.is_empty() {
        let _ = writeln!(out, "問題: {}", green("なし", cfg.color));
    } else {
        let _ = writeln!(out, "問題（{}件）:", report.issues.len());
        for issue in &report.issues {
            let _ = writeln!(out, "- {}", yellow(issue, cfg.color));
        }
    }

    if report.actions.is_empty() {
        let _ = writeln!(out, "アクション: 不要");
    } else {
        let _ = writeln!(out, "推奨アクション（{}件）:", report.actions.len());
        for (idx, action) in report.actions.iter().enumerate() {
            let _ = writeln!(
                out,
                "{}. {}（`{}`）",
                idx + 1,
                action.description,
                action.command
            );
        }
    }
}

pub fn print_outcomes(outcomes: &[ActionOutcome], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    for outcome in outcomes {
        let mark = if outcome.success {
            green("✓", cfg.color)
        } else {
            red("✗", cfg.color)
        };
        let _ = writeln!(
            out,
            "{mark} {}: {}",
            outcome.action.description, outcome.message
        );
    }
}

pub fn print_run_result(result: &RunResult, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    print_outcomes(&result.actions_taken, cfg);

    let mut out = io::stdout().lock();
    if result.actions_taken.is_empty() {
        let _ = writeln!(out, "実行したアクションはありません。");
    }
    let overall = if result.success {
        green("成功", cfg.color)
    } else {
        red("失敗", cfg.color)
    };
    let _ = writeln!(out, "結果: {overall}");

    if let Some(status) = &result.final_status {
        let state = if status.running {
            green("稼働中", cfg.color)
        } else {
            yellow("停止中", cfg.color)
        };
        let _ = writeln!(out, "最終状態: エージェントサーバーは{state}です");
    }
}

pub fn print_doctor(report: &DoctorReport, cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    for check in &report.checks {
        let icon = match check.status {
            CheckStatus::Ok => green(check.icon(), cfg.color),
            CheckStatus::Warning => yellow(check.icon(), cfg.color),
            CheckStatus::Error => red(check.icon(), cfg.color),
            CheckStatus::Skipped => check.icon().to_string(),
        };
        let _ = writeln!(out, "{icon} {}: {}", check.name, check.message);
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "結果: OK={} 警告={} エラー={} スキップ={}",
        report.summary.ok, report.summary.warning, report.summary.error, report.summary.skipped
    );

    let fixes = report.fixes();
    if !fixes.is_empty() {
        let _ = writeln!(out, "対処:");
        for (name, fix) in fixes {
            let _ = writeln!(out, "- {name}: {fix}");
        }
    }
}

pub fn print_versions(versions: &[String], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    if versions.is_empty() {
        let _ = writeln!(out, "リリースが見つかりませんでした。");
        return;
    }
    let _ = writeln!(out, "公開バージョン（新しい順）:");
    for (idx, version) in versions.iter().enumerate() {
        if idx == 0 {
            let _ = writeln!(out, "- {version}（最新）");
        } else {
            let _ = writeln!(out, "- {version}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_only_when_enabled() {
        assert_eq!(paint("x", "32", false), "x");
        assert_eq!(paint("x", "32", true), "\x1b[32mx\x1b[0m");
    }

    #[test]
    fn status_labels_are_japanese() {
        assert_eq!(status_label(VersionStatus::Match, false), "一致");
        assert_eq!(status_label(VersionStatus::Mismatch, false), "不一致");
        assert_eq!(
            status_label(VersionStatus::NotInstalled, false),
            "未インストール"
        );
    }
}
