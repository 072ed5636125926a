mod action;
mod compat;
mod facts;
mod recommend;
mod report;
mod version;

pub use action::{Action, ActionKind, ActionOutcome};
pub use compat::{CompatibilityResult, VersionInfo, VersionStatus, check_compatibility};
pub use facts::{AgentArch, DeviceFacts};
pub use recommend::{
    DEFAULT_MIN_VERSION, DeviceRecommendation, FALLBACK_VERSION, VersionBracket, android_codename,
    recommend, version_bracket,
};
pub use report::{AgentInstance, AgentStatus, AnalysisReport, RunResult};
pub use version::{VersionTuple, compare_versions, parse_version, versions_compatible};
