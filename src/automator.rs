use std::time::Duration;

use anyhow::{Result, anyhow};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::adb::AdbClient;
use crate::agent::AgentManager;
use crate::config::EffectiveConfig;
use crate::core::{
    Action, ActionKind, ActionOutcome, AnalysisReport, CompatibilityResult, DeviceRecommendation,
    RunResult, VersionStatus, check_compatibility, recommend,
};
use crate::download;
use crate::inventory::{self, InventorySnapshot};

pub const SCHEMA_VERSION: &str = "1.0";

struct LatestQuery<'a> {
    repo: &'a str,
    result: Option<Option<String>>,
}

impl LatestQuery<'_> {
    fn get(&mut self) -> Option<String> {
        let repo = self.repo;
        self.result
            .get_or_insert_with(|| download::latest_version(repo))
            .clone()
    }
}

pub struct Automator {
    adb: AdbClient,
    manager: AgentManager,
    repo: String,
    show_progress: bool,
}

impl Automator {
    pub fn new(
        serial: &str,
        cfg: &EffectiveConfig,
        timeout: Duration,
        show_progress: bool,
    ) -> Self {
        let adb = AdbClient::new(Some(serial.to_string()), timeout);
        let manager = AgentManager::new(
            adb.clone(),
            cfg.agent.remote_dir.clone(),
            cfg.agent.port,
            cfg.download.clone(),
        );
        Self {
            adb,
            manager,
            repo: cfg.download.repo.clone(),
            show_progress,
        }
    }

    pub fn analyze(&self) -> AnalysisReport {
        let snapshot = inventory::collect(&self.adb, &self.manager);
        let mut latest = LatestQuery {
            repo: &self.repo,
            result: None,
        };
        let mut fetch = || latest.get();
        build_report(snapshot, &mut fetch)
    }

    pub fn run(&self, fix_issues: bool) -> RunResult {
        let analysis = self.analyze();
        if !fix_issues {
            return RunResult {
                analysis,
                actions_taken: Vec::new(),
                success: true,
                final_status: None,
            };
        }
        self.execute(analysis)
    }

    pub fn execute(&self, analysis: AnalysisReport) -> RunResult {
        let (actions_taken, success) = apply_actions(&analysis.actions, |action| {
            self.execute_action(action, &analysis)
        });
        let final_status = self.manager.status();
        RunResult {
            analysis,
            actions_taken,
            success,
            final_status: Some(final_status),
        }
    }

    pub fn execute_selected(&self, analysis: AnalysisReport, indices: &[usize]) -> RunResult {
        let selected: Vec<Action> = indices
            .iter()
            .filter_map(|i| analysis.actions.get(*i).cloned())
            .collect();
        let (actions_taken, success) =
            apply_actions(&selected, |action| self.execute_action(action, &analysis));
        let final_status = self.manager.status();
        RunResult {
            analysis,
            actions_taken,
            success,
            final_status: Some(final_status),
        }
    }

    fn execute_action(&self, action: &Action, analysis: &AnalysisReport) -> Result<String> {
        match &action.kind {
            ActionKind::InstallAgent { version } | ActionKind::FixVersion { version } => {
                let path = self.manager.install(
                    version,
                    analysis.device.agent_arch,
                    true,
                    self.show_progress,
                )?;
                Ok(format!(
                    "エージェントサーバー v{version} をインストールしました（{path}）"
                ))
            }
            ActionKind::StartAgent => {
                let installed = self.manager.installed_servers();
                let Some(path) = installed.first() else {
                    return Err(anyhow!("起動対象のエージェントサーバーがありません"));
                };
                let (started, pid) = self.manager.start(path)?;
                if !started {
                    return Err(anyhow!(
                        "エージェントサーバーの起動に失敗しました（タイムアウト）"
                    ));
                }
                Ok(match pid {
                    Some(pid) => format!("エージェントサーバーを起動しました（pid={pid}）"),
                    None => "エージェントサーバーを起動しました".to_string(),
                })
            }
            ActionKind::DisableEnforcement => {
                self.adb.shell_su("setenforce 0")?;
                Ok("SELinux を Permissive に設定しました".to_string())
            }
            ActionKind::InstallHostClient => Err(anyhow!(
                "手動で実行してください: pip install agent agent-tools"
            )),
        }
    }
}

pub fn build_report(
    snapshot: InventorySnapshot,
    latest: &mut dyn FnMut() -> Option<String>,
) -> AnalysisReport {
    let compatibility = check_compatibility(&snapshot.client, &snapshot.tools, &snapshot.agent);
    let recommendation = recommend(&snapshot.facts, &snapshot.agent, &mut *latest);
    let (target_version, target_reason) =
        resolve_target_version(&snapshot, &recommendation, latest);
    let (issues, actions) = derive_plan(&snapshot, &compatibility, &target_version, &target_reason);

    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    AnalysisReport {
        schema_version: SCHEMA_VERSION.to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at,
        serial: snapshot.serial,
        device: snapshot.facts,
        client: snapshot.client,
        tools: snapshot.tools,
        agent: snapshot.agent,
        compatibility,
        recommendation,
        agent_status: snapshot.agent_status,
        enforcement: snapshot.enforcement,
        target_version,
        target_reason,
        issues,
        actions,
    }
}

fn resolve_target_version(
    snapshot: &InventorySnapshot,
    recommendation: &DeviceRecommendation,
    latest: &mut dyn FnMut() -> Option<String>,
) -> (String, String) {
    if snapshot.client.installed {
        if let Some(version) = &snapshot.client.version {
            return (
                version.clone(),
                format!("ホストクライアント v{version} に合わせる"),
            );
        }
    }

    if !recommendation.recommended_version.is_empty() {
        return (
            recommendation.recommended_version.clone(),
            format!("Android {} の推奨バージョン", recommendation.os_version),
        );
    }

    if let Some(version) = latest() {
        return (version, "最新の公開バージョン".to_string());
    }

    (
        crate::core::FALLBACK_VERSION.to_string(),
        "既定のフォールバック".to_string(),
    )
}

fn derive_plan(
    snapshot: &InventorySnapshot,
    compatibility: &CompatibilityResult,
    target_version: &str,
    target_reason: &str,
) -> (Vec<String>, Vec<Action>) {
    let mut issues = Vec::new();
    let mut actions = Vec::new();

    if !snapshot.client.installed {
        issues.push("ホストクライアントが未インストールです".to_string());
        actions.push(Action {
            kind: ActionKind::InstallHostClient,
            description: "ホストクライアントとツールをインストール（手動）".to_string(),
            command: "pip install agent agent-tools".to_string(),
        });
    }

    if !snapshot.agent.installed {
        issues.push("エージェントサーバーがデバイスに未インストールです".to_string());
        actions.push(Action {
            kind: ActionKind::InstallAgent {
                version: target_version.to_string(),
            },
            description: format!(
                "エージェントサーバー {target_version} をインストール（{target_reason}）"
            ),
            command: format!("agentctl install {target_version}"),
        });
    } else if compatibility.status == VersionStatus::Mismatch {
        let (fix_version, fix_reason) = match &snapshot.client.version {
            Some(version) if snapshot.client.installed => (
                version.clone(),
                format!("ホストクライアント v{version} に合わせる"),
            ),
            _ => (target_version.to_string(), target_reason.to_string()),
        };
        issues.push(compatibility.message.clone());
        actions.push(Action {
            kind: ActionKind::FixVersion {
                version: fix_version.clone(),
            },
            description: format!(
                "エージェントサーバー {fix_version} をインストール（{fix_reason}）"
            ),
            command: format!("agentctl install {fix_version}"),
        });
    }

    if snapshot.agent.installed && !snapshot.agent_status.running {
        actions.push(Action {
            kind: ActionKind::StartAgent,
            description: "エージェントサーバーを起動".to_string(),
            command: "agentctl start".to_string(),
        });
    }

    if snapshot.enforcement.contains("Enforcing") {
        issues.push("SELinux が Enforcing です（エージェントの動作を妨げる可能性）".to_string());
        actions.push(Action {
            kind: ActionKind::DisableEnforcement,
            description: "SELinux を Permissive に変更".to_string(),
            command: "adb shell su -c 'setenforce 0'".to_string(),
        });
    }

    (issues, actions)
}

pub fn apply_actions(
    actions: &[Action],
    mut exec: impl FnMut(&Action) -> Result<String>,
) -> (Vec<ActionOutcome>, bool) {
    let mut outcomes = Vec::with_capacity(actions.len());
    let mut success = true;

    for action in actions {
        let outcome = match exec(action) {
            Ok(message) => ActionOutcome {
                action: action.clone(),
                success: true,
                message,
            },
            Err(err) => ActionOutcome {
                action: action.clone(),
                success: false,
                message: format!("{err:#}"),
            },
        };

        if !outcome.success
            && matches!(
                action.kind,
                ActionKind::InstallAgent { .. } | ActionKind::FixVersion { .. }
            )
        {
            success = false;
        }

        outcomes.push(outcome);
    }

    (outcomes, success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentArch, AgentInstance, AgentStatus, DeviceFacts, VersionInfo};

    fn facts(os_version: u32) -> DeviceFacts {
        DeviceFacts {
            os_version,
            sdk_version: 33,
            abi: "arm64-v8a".to_string(),
            agent_arch: AgentArch::Arm64,
            model: "Pixel 7".to_string(),
            manufacturer: "Google".to_string(),
            security_patch: String::new(),
            build_fingerprint: String::new(),
        }
    }

    fn snapshot(
        client: VersionInfo,
        agent: VersionInfo,
        running: bool,
        enforcement: &str,
        os_version: u32,
    ) -> InventorySnapshot {
        let instances = if running {
            vec![AgentInstance {
                pid: 4812,
                path: format!(
                    "/data/local/tmp/agent-server-{}-android-arm64",
                    agent.version.as_deref().unwrap_or("0.0.0")
                ),
            }]
        } else {
            Vec::new()
        };
        let installed_servers = if agent.installed {
            vec![format!(
                "/data/local/tmp/agent-server-{}-android-arm64",
                agent.version.as_deref().unwrap_or("0.0.0")
            )]
        } else {
            Vec::new()
        };
        InventorySnapshot {
            serial: "emulator-5554".to_string(),
            facts: facts(os_version),
            client,
            tools: VersionInfo::installed("agent-tools", "12.3.0"),
            agent,
            agent_status: AgentStatus {
                running,
                port_listening: running,
                instances,
                installed_servers,
            },
            enforcement: enforcement.to_string(),
        }
    }

    fn no_latest() -> impl FnMut() -> Option<String> {
        || None
    }

    #[test]
    fn scenario_client_installed_agent_missing() {
        let s = snapshot(
            VersionInfo::installed("agent-python", "16.1.17"),
            VersionInfo::missing("agent-server"),
            false,
            "Permissive",
            13,
        );
        let mut latest = no_latest();
        let report = build_report(s, &mut latest);

        assert_eq!(report.target_version, "16.1.17");
        assert!(report.target_reason.contains("ホストクライアント"));
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(
            report.actions[0].kind,
            ActionKind::InstallAgent {
                version: "16.1.17".to_string()
            }
        );
    }

    #[test]
    fn scenario_version_mismatch_yields_fix_action() {
        let s = snapshot(
            VersionInfo::installed("agent-python", "16.1.17"),
            VersionInfo::installed("agent-server", "16.0.0"),
            true,
            "Permissive",
            13,
        );
        let mut latest = no_latest();
        let report = build_report(s, &mut latest);

        assert_eq!(report.compatibility.status, VersionStatus::Mismatch);
        assert_eq!(report.actions.len(), 1);
        assert_eq!(
            report.actions[0].kind,
            ActionKind::FixVersion {
                version: "16.1.17".to_string()
            }
        );
    }

    #[test]
    fn scenario_matching_running_setup_is_clean() {
        let s = snapshot(
            VersionInfo::installed("agent-python", "16.1.17"),
            VersionInfo::installed("agent-server", "16.1.17"),
            true,
            "Permissive",
            13,
        );
        let mut latest = no_latest();
        let report = build_report(s, &mut latest);

        assert_eq!(report.compatibility.status, VersionStatus::Match);
        assert!(report.issues.is_empty());
        assert!(report.actions.is_empty());
    }

    #[test]
    fn scenario_nothing_installed_uses_recommendation() {
        let s = snapshot(
            VersionInfo::missing("agent-python"),
            VersionInfo::missing("agent-server"),
            false,
            "Permissive",
            13,
        );
        let mut calls = 0;
        let mut latest = || {
            calls += 1;
            Some("17.0.0".to_string())
        };
        let report = build_report(s, &mut latest);

        assert_eq!(report.target_version, "16.1.17");
        assert!(report.target_reason.contains("Android 13"));
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.actions.len(), 2);
        assert_eq!(report.actions[0].kind, ActionKind::InstallHostClient);
        assert_eq!(
            report.actions[1].kind,
            ActionKind::InstallAgent {
                version: "16.1.17".to_string()
            }
        );
        assert_eq!(calls, 0);
    }

    #[test]
    fn unknown_os_without_client_queries_oracle_once() {
        let s = snapshot(
            VersionInfo::missing("agent-python"),
            VersionInfo::missing("agent-server"),
            false,
            "",
            0,
        );
        let mut calls = 0;
        let mut latest = || {
            calls += 1;
            Some("17.0.2".to_string())
        };
        let report = build_report(s, &mut latest);

        assert_eq!(report.target_version, "17.0.2");
        assert!(report.target_reason.contains("Android 0"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn compatible_patch_drift_produces_no_fix_action() {
        let s = snapshot(
            VersionInfo::installed("agent-python", "16.1.17"),
            VersionInfo::installed("agent-server", "16.1.3"),
            true,
            "Permissive",
            13,
        );
        let mut latest = no_latest();
        let report = build_report(s, &mut latest);

        assert_eq!(report.compatibility.status, VersionStatus::Compatible);
        assert!(report.compatibility.is_compatible());
        assert!(report.actions.is_empty());
    }

    #[test]
    fn stopped_agent_gets_start_action_after_fix() {
        let s = snapshot(
            VersionInfo::installed("agent-python", "16.1.17"),
            VersionInfo::installed("agent-server", "16.0.0"),
            false,
            "Permissive",
            13,
        );
        let mut latest = no_latest();
        let report = build_report(s, &mut latest);

        assert_eq!(report.actions.len(), 2);
        assert!(matches!(
            report.actions[0].kind,
            ActionKind::FixVersion { .. }
        ));
        assert_eq!(report.actions[1].kind, ActionKind::StartAgent);
    }

    #[test]
    fn enforcing_selinux_appends_disable_action_last() {
        let s = snapshot(
            VersionInfo::installed("agent-python", "16.1.17"),
            VersionInfo::installed("agent-server", "16.1.17"),
            true,
            "Enforcing",
            13,
        );
        let mut latest = no_latest();
        let report = build_report(s, &mut latest);

        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("Enforcing"));
        assert_eq!(report.actions.len(), 1);
        assert_eq!(report.actions[0].kind, ActionKind::DisableEnforcement);
        assert_eq!(report.actions[0].command, "adb shell su -c 'setenforce 0'");
    }

    #[test]
    fn analyze_is_idempotent_over_unchanged_state() {
        let s = snapshot(
            VersionInfo::installed("agent-python", "16.1.17"),
            VersionInfo::installed("agent-server", "16.0.0"),
            false,
            "Enforcing",
            13,
        );
        let mut latest = no_latest();
        let first = build_report(s.clone(), &mut latest);
        let second = build_report(s, &mut latest);

        assert_eq!(first.issues, second.issues);
        assert_eq!(first.actions, second.actions);
        assert_eq!(first.target_version, second.target_version);
        assert_eq!(first.target_reason, second.target_reason);
    }

    #[test]
    fn failed_install_marks_run_failed_but_continues() {
        let actions = vec![
            Action {
                kind: ActionKind::InstallAgent {
                    version: "16.1.17".to_string(),
                },
                description: "インストール".to_string(),
                command: "agentctl install 16.1.17".to_string(),
            },
            Action {
                kind: ActionKind::StartAgent,
                description: "起動".to_string(),
                command: "agentctl start".to_string(),
            },
        ];

        let mut executed = 0;
        let (outcomes, success) = apply_actions(&actions, |action| {
            executed += 1;
            match action.kind {
                ActionKind::InstallAgent { .. } => {
                    Err(anyhow!("ダウンロードに失敗しました: connection reset"))
                }
                _ => Ok("ok".to_string()),
            }
        });

        assert_eq!(executed, 2);
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[0].message.contains("connection reset"));
        assert!(outcomes[1].success);
        assert!(!success);
    }

    #[test]
    fn best_effort_failures_do_not_flip_overall_success() {
        let actions = vec![
            Action {
                kind: ActionKind::StartAgent,
                description: "起動".to_string(),
                command: "agentctl start".to_string(),
            },
            Action {
                kind: ActionKind::InstallHostClient,
                description: "ホストクライアント（手動）".to_string(),
                command: "pip install agent agent-tools".to_string(),
            },
        ];

        let (outcomes, success) = apply_actions(&actions, |action| match action.kind {
            ActionKind::StartAgent => Err(anyhow!("起動に失敗しました")),
            _ => Err(anyhow!("手動で実行してください: pip install agent agent-tools")),
        });

        assert!(outcomes.iter().all(|o| !o.success));
        assert!(success);
    }

    #[test]
    fn every_action_is_attempted_exactly_once() {
        let actions = vec![
            Action {
                kind: ActionKind::FixVersion {
                    version: "16.1.17".to_string(),
                },
                description: "修正".to_string(),
                command: "agentctl install 16.1.17".to_string(),
            },
            Action {
                kind: ActionKind::StartAgent,
                description: "起動".to_string(),
                command: "agentctl start".to_string(),
            },
            Action {
                kind: ActionKind::DisableEnforcement,
                description: "SELinux".to_string(),
                command: "adb shell su -c 'setenforce 0'".to_string(),
            },
        ];

        let mut seen = Vec::new();
        let (outcomes, _) = apply_actions(&actions, |action| {
            seen.push(action.kind.label());
            Err(anyhow!("失敗"))
        });

        assert_eq!(seen, vec!["fix_version", "start_agent", "disable_enforcement"]);
        assert_eq!(outcomes.len(), 3);
    }

    #[test]
    fn unparsable_client_version_still_targets_client_string() {
        let s = snapshot(
            VersionInfo::installed("agent-python", "16.1.17"),
            VersionInfo::installed("agent-server", "garbage"),
            true,
            "",
            13,
        );
        let mut latest = no_latest();
        let report = build_report(s, &mut latest);

        assert_eq!(report.compatibility.status, VersionStatus::Mismatch);
        assert_eq!(
            report.actions[0].kind,
            ActionKind::FixVersion {
                version: "16.1.17".to_string()
            }
        );
    }
}
