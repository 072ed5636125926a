use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ActionKind {
    #[serde(rename = "INSTALL_AGENT")]
    InstallAgent { version: String },
    #[serde(rename = "FIX_VERSION")]
    FixVersion { version: String },
    #[serde(rename = "START_AGENT")]
    StartAgent,
    #[serde(rename = "DISABLE_ENFORCEMENT")]
    DisableEnforcement,
    #[serde(rename = "INSTALL_HOST_CLIENT")]
    InstallHostClient,
}

impl ActionKind {
    pub const fn label(&self) -> &'static str {
        match self {
            ActionKind::InstallAgent { .. } => "install_agent",
            ActionKind::FixVersion { .. } => "fix_version",
            ActionKind::StartAgent => "start_agent",
            ActionKind::DisableEnforcement => "disable_enforcement",
            ActionKind::InstallHostClient => "install_host_client",
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            ActionKind::InstallAgent { version } | ActionKind::FixVersion { version } => {
                Some(version)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub description: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: Action,
    pub success: bool,
    pub message: String,
}
