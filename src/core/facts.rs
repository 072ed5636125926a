use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentArch {
    #[serde(rename = "arm64")]
    Arm64,
    #[serde(rename = "arm")]
    Arm,
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl AgentArch {
    pub const fn as_str(self) -> &'static str {
        match self {
            AgentArch::Arm64 => "arm64",
            AgentArch::Arm => "arm",
            AgentArch::X86 => "x86",
            AgentArch::X86_64 => "x86_64",
            AgentArch::Unknown => "unknown",
        }
    }

    pub fn from_abi(abi: &str) -> AgentArch {
        match abi.trim() {
            "arm64-v8a" | "arm64" => AgentArch::Arm64,
            "armeabi-v7a" | "armeabi" => AgentArch::Arm,
            "x86" => AgentArch::X86,
            "x86_64" => AgentArch::X86_64,
            _ => AgentArch::Unknown,
        }
    }
}

impl fmt::Display for AgentArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFacts {
    pub os_version: u32,
    pub sdk_version: u32,
    pub abi: String,
    pub agent_arch: AgentArch,
    pub model: String,
    pub manufacturer: String,
    pub security_patch: String,
    pub build_fingerprint: String,
}
