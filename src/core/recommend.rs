use serde::{Deserialize, Serialize};

use crate::core::compat::VersionInfo;
use crate::core::facts::{AgentArch, DeviceFacts};

pub const DEFAULT_MIN_VERSION: &str = "12.0.0";
pub const FALLBACK_VERSION: &str = "16.1.17";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionBracket {
    pub min: &'static str,
    pub recommended: &'static str,
}

const VERSION_BRACKETS: &[(u32, VersionBracket)] = &[
    (5, VersionBracket { min: "7.0.0", recommended: "12.11.18" }),
    (6, VersionBracket { min: "8.0.0", recommended: "12.11.18" }),
    (7, VersionBracket { min: "9.0.0", recommended: "14.2.18" }),
    (8, VersionBracket { min: "10.0.0", recommended: "15.2.2" }),
    (9, VersionBracket { min: "12.0.0", recommended: "15.2.2" }),
    (10, VersionBracket { min: "12.8.0", recommended: "16.1.17" }),
    (11, VersionBracket { min: "14.0.0", recommended: "16.1.17" }),
    (12, VersionBracket { min: "15.0.0", recommended: "16.1.17" }),
    (13, VersionBracket { min: "15.0.0", recommended: "16.1.17" }),
    (14, VersionBracket { min: "16.0.0", recommended: "16.1.17" }),
];

pub fn version_bracket(os_version: u32) -> Option<VersionBracket> {
    VERSION_BRACKETS
        .iter()
        .find(|(v, _)| *v == os_version)
        .map(|(_, bracket)| *bracket)
}

pub fn android_codename(os_version: u32) -> &'static str {
    match os_version {
        5 => "Lollipop",
        6 => "Marshmallow",
        7 => "Nougat",
        8 => "Oreo",
        9 => "Pie",
        10 => "Q",
        11 => "R",
        12 => "S",
        13 => "Tiramisu",
        14 => "Upside Down Cake",
        15 => "Vanilla Ice Cream",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecommendation {
    pub os_version: u32,
    pub os_codename: String,
    pub sdk_version: u32,
    pub agent_arch: AgentArch,
    pub min_version: String,
    pub recommended_version: String,
    pub current_agent_version: Option<String>,
    pub notes: Vec<String>,
}

pub fn recommend(
    facts: &DeviceFacts,
    agent: &VersionInfo,
    latest: &mut dyn FnMut() -> Option<String>,
) -> DeviceRecommendation {
    let (min_version, recommended_version) = match version_bracket(facts.os_version) {
        Some(bracket) => (bracket.min.to_string(), bracket.recommended.to_string()),
        None => (
            DEFAULT_MIN_VERSION.to_string(),
            latest().unwrap_or_else(|| FALLBACK_VERSION.to_string()),
        ),
    };

    let mut notes = Vec::new();
    if facts.os_version >= 14 {
        notes.push(
            "Android 14 以降では最新のエージェントサーバーが必要になることがあります".to_string(),
        );
    }
    if facts.abi.contains("x86") {
        notes.push("x86 デバイスです（エミュレータの可能性が高い）".to_string());
    }
    if !facts.security_patch.is_empty() {
        notes.push(format!("セキュリティパッチ: {}", facts.security_patch));
    }

    DeviceRecommendation {
        os_version: facts.os_version,
        os_codename: android_codename(facts.os_version).to_string(),
        sdk_version: facts.sdk_version,
        agent_arch: facts.agent_arch,
        min_version,
        recommended_version,
        current_agent_version: if agent.installed {
            agent.version.clone()
        } else {
            None
        },
        notes,
    }
}
