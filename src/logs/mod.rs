use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::RunResult;

#[derive(Debug, Serialize)]
struct AutoFixLog {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    serial: String,
    status: String,
    target_version: String,
    target_reason: String,
    actions: Vec<AutoFixAction>,
}

#[derive(Debug, Serialize)]
struct AutoFixAction {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    description: String,
    command: String,
    success: bool,
    message: String,
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/agentctl/logs")
}

fn format_ts(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| "unknown".to_string())
}

pub fn write_auto_fix_log(
    home_dir: &Path,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    result: &RunResult,
) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = finished_at.unix_timestamp_nanos();
    let path = dir.join(format!("auto-fix-{pid}-{ts}.json"));

    let any_failed = result.actions_taken.iter().any(|o| !o.success);
    let status = if !result.success {
        "failed"
    } else if any_failed {
        "partial_error"
    } else {
        "ok"
    };

    let actions: Vec<AutoFixAction> = result
        .actions_taken
        .iter()
        .map(|outcome| AutoFixAction {
            kind: outcome.action.kind.label(),
            version: outcome.action.kind.version().map(String::from),
            description: outcome.action.description.clone(),
            command: outcome.action.command.clone(),
            success: outcome.success,
            message: outcome.message.clone(),
        })
        .collect();

    let log = AutoFixLog {
        schema_version: crate::automator::SCHEMA_VERSION,
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "auto --fix",
        started_at: format_ts(started_at),
        finished_at: format_ts(finished_at),
        serial: result.analysis.serial.clone(),
        status: status.to_string(),
        target_version: result.analysis.target_version.clone(),
        target_reason: result.analysis.target_reason.clone(),
        actions,
    };

    let body = serde_json::to_string_pretty(&log).context("ログの生成に失敗しました")?;
    std::fs::write(&path, body)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;

    Ok(path)
}
