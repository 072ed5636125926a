use serde::{Deserialize, Serialize};

use crate::core::version::{parse_version, versions_compatible};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Match,
    Compatible,
    Mismatch,
    Unknown,
    NotInstalled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub component: String,
    pub version: Option<String>,
    pub installed: bool,
}

impl VersionInfo {
    pub fn installed(component: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            version: Some(version.into()),
            installed: true,
        }
    }

    pub fn missing(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            version: None,
            installed: false,
        }
    }

    pub fn label(&self) -> String {
        if !self.installed {
            return format!("{}: 未インストール", self.component);
        }
        match &self.version {
            Some(v) => format!("{}: {v}", self.component),
            None => format!("{}: バージョン不明", self.component),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub status: VersionStatus,
    pub message: String,
    pub client_version: Option<String>,
    pub tools_version: Option<String>,
    pub agent_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_command: Option<String>,
}

impl CompatibilityResult {
    pub fn is_compatible(&self) -> bool {
        matches!(
            self.status,
            VersionStatus::Match | VersionStatus::Compatible
        )
    }
}

pub fn check_compatibility(
    client: &VersionInfo,
    tools: &VersionInfo,
    agent: &VersionInfo,
) -> CompatibilityResult {
    if !client.installed {
        return CompatibilityResult {
            status: VersionStatus::NotInstalled,
            message: "ホストクライアントが未インストールです".to_string(),
            client_version: None,
            tools_version: tools.version.clone(),
            agent_version: agent.version.clone(),
            fix_command: Some("pip install agent agent-tools".to_string()),
        };
    }

    if !agent.installed {
        let fix = match &client.version {
            Some(v) => format!("agentctl install {v}"),
            None => "agentctl install --latest".to_string(),
        };
        return CompatibilityResult {
            status: VersionStatus::NotInstalled,
            message: "エージェントサーバーがデバイスに未インストールです".to_string(),
            client_version: client.version.clone(),
            tools_version: tools.version.clone(),
            agent_version: None,
            fix_command: Some(fix),
        };
    }

    let (Some(client_version), Some(agent_version)) = (&client.version, &agent.version) else {
        return CompatibilityResult {
            status: VersionStatus::Unknown,
            message: "バージョンを判定できません".to_string(),
            client_version: client.version.clone(),
            tools_version: tools.version.clone(),
            agent_version: agent.version.clone(),
            fix_command: None,
        };
    };

    let client_parsed = parse_version(client_version);
    let agent_parsed = parse_version(agent_version);
    if client_parsed.is_unknown() && agent_parsed.is_unknown() && client_version != agent_version {
        return CompatibilityResult {
            status: VersionStatus::Unknown,
            message: "バージョンを判定できません".to_string(),
            client_version: client.version.clone(),
            tools_version: tools.version.clone(),
            agent_version: agent.version.clone(),
            fix_command: None,
        };
    }

    let (status, message, fix_command) = if versions_compatible(client_version, agent_version, true)
    {
        (
            VersionStatus::Match,
            format!("完全一致: クライアント {client_version} = エージェント {agent_version}"),
            None,
        )
    } else if versions_compatible(client_version, agent_version, false) {
        (
            VersionStatus::Compatible,
            format!("互換: クライアント {client_version} ~ エージェント {agent_version}"),
            None,
        )
    } else {
        (
            VersionStatus::Mismatch,
            format!(
                "バージョン不一致: クライアント {client_version} ≠ エージェント {agent_version}"
            ),
            Some(format!("agentctl install {client_version}")),
        )
    };

    CompatibilityResult {
        status,
        message,
        client_version: client.version.clone(),
        tools_version: tools.version.clone(),
        agent_version: agent.version.clone(),
        fix_command,
    }
}
