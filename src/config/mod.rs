use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub ui: UiConfig,
    pub device: DeviceConfig,
    pub agent: AgentConfig,
    pub download: DownloadConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_serial: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    pub remote_dir: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadConfig {
    pub repo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    pub show_progress: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            ui: UiConfig {
                color: true,
                max_table_rows: 20,
            },
            device: DeviceConfig {
                default_serial: None,
            },
            agent: AgentConfig {
                remote_dir: "/data/local/tmp".to_string(),
                port: 27042,
            },
            download: DownloadConfig {
                repo: "agentproj/agent-server".to_string(),
                dir: None,
                show_progress: true,
            },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    ui: Option<RawUiConfig>,
    device: Option<RawDeviceConfig>,
    agent: Option<RawAgentConfig>,
    download: Option<RawDownloadConfig>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawDeviceConfig {
    default_serial: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAgentConfig {
    remote_dir: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct RawDownloadConfig {
    repo: Option<String>,
    dir: Option<String>,
    show_progress: Option<bool>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/agentctl/config.toml")
}

pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }

    if let Some(device) = raw.device {
        if let Some(default_serial) = device.default_serial {
            cfg.device.default_serial = Some(default_serial);
        }
    }

    if let Some(agent) = raw.agent {
        if let Some(remote_dir) = agent.remote_dir {
            cfg.agent.remote_dir = remote_dir;
        }
        if let Some(port) = agent.port {
            cfg.agent.port = port;
        }
    }

    if let Some(download) = raw.download {
        if let Some(repo) = download.repo {
            cfg.download.repo = repo;
        }
        if let Some(dir) = download.dir {
            cfg.download.dir = Some(dir);
        }
        if let Some(show_progress) = download.show_progress {
            cfg.download.show_progress = show_progress;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("AGENTCTL_UI_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "AGENTCTL_UI_COLOR")?;
    }
    if let Ok(v) = std::env::var("AGENTCTL_UI_MAX_TABLE_ROWS") {
        cfg.ui.max_table_rows = v
            .trim()
            .parse::<usize>()
            .with_context(|| "AGENTCTL_UI_MAX_TABLE_ROWS")?;
    }
    if let Ok(v) = std::env::var("AGENTCTL_DEVICE_SERIAL") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.device.default_serial = Some(v.to_string());
        }
    }
    if let Ok(v) = std::env::var("AGENTCTL_AGENT_REMOTE_DIR") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.agent.remote_dir = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("AGENTCTL_AGENT_PORT") {
        cfg.agent.port = v
            .trim()
            .parse::<u16>()
            .with_context(|| "AGENTCTL_AGENT_PORT")?;
    }
    if let Ok(v) = std::env::var("AGENTCTL_DOWNLOAD_REPO") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.download.repo = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("AGENTCTL_DOWNLOAD_DIR") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.download.dir = Some(v.to_string());
        }
    }
    if let Ok(v) = std::env::var("AGENTCTL_DOWNLOAD_SHOW_PROGRESS") {
        cfg.download.show_progress =
            parse_bool(&v).with_context(|| "AGENTCTL_DOWNLOAD_SHOW_PROGRESS")?;
    }

    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"[ui]
color = true
max_table_rows = 20

[device]
# default_serial = "emulator-5554"

[agent]
remote_dir = "/data/local/tmp"
port = 27042

[download]
repo = "agentproj/agent-server"
# dir = "/tmp/agentctl"
show_progress = true
"#;

pub fn write_default(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow::anyhow!(
            "設定ファイルは既に存在します: {}",
            path.display()
        ));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("設定ディレクトリの作成に失敗しました: {}", parent.display())
        })?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("設定ファイルの書き込みに失敗しました: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_parses_to_defaults() {
        let raw: RawConfig = toml::from_str(DEFAULT_CONFIG_TEMPLATE).expect("parse template");
        let mut cfg = EffectiveConfig::default();
        apply_raw_config(&mut cfg, raw);
        assert_eq!(cfg.agent.remote_dir, "/data/local/tmp");
        assert_eq!(cfg.agent.port, 27042);
        assert_eq!(cfg.download.repo, "agentproj/agent-server");
        assert!(cfg.device.default_serial.is_none());
    }

    #[test]
    fn raw_config_overrides_defaults_partially() {
        let raw: RawConfig = toml::from_str(
            "[agent]\nport = 31337\n\n[device]\ndefault_serial = \"emulator-5554\"\n",
        )
        .expect("parse");
        let mut cfg = EffectiveConfig::default();
        apply_raw_config(&mut cfg, raw);
        assert_eq!(cfg.agent.port, 31337);
        assert_eq!(cfg.agent.remote_dir, "/data/local/tmp");
        assert_eq!(cfg.device.default_serial.as_deref(), Some("emulator-5554"));
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert!(parse_bool("1").unwrap());
        assert!(parse_bool("Yes").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
