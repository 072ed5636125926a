use serde::{Deserialize, Serialize};

use crate::core::action::{Action, ActionOutcome};
use crate::core::compat::{CompatibilityResult, VersionInfo};
use crate::core::facts::DeviceFacts;
use crate::core::recommend::DeviceRecommendation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInstance {
    pub pid: u32,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub running: bool,
    pub port_listening: bool,
    pub instances: Vec<AgentInstance>,
    pub installed_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub serial: String,
    pub device: DeviceFacts,
    pub client: VersionInfo,
    pub tools: VersionInfo,
    pub agent: VersionInfo,
    pub compatibility: CompatibilityResult,
    pub recommendation: DeviceRecommendation,
    pub agent_status: AgentStatus,
    pub enforcement: String,
    pub target_version: String,
    pub target_reason: String,
    pub issues: Vec<String>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub analysis: AnalysisReport,
    pub actions_taken: Vec<ActionOutcome>,
    pub success: bool,
    pub final_status: Option<AgentStatus>,
}
