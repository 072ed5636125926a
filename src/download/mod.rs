use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressDrawTarget};

use crate::config::DownloadConfig;
use crate::core::AgentArch;
use crate::platform;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub fn check_xz_installed() -> bool {
    platform::command_on_path("xz").is_some()
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("agentctl/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("HTTP クライアントの初期化に失敗しました")
}

pub fn latest_version(repo: &str) -> Option<String> {
    let client = http_client().ok()?;
    let url = format!("https://api.github.com/repos/{repo}/releases/latest");
    let value: serde_json::Value = client
        .get(url)
        .send()
        .ok()?
        .error_for_status()
        .ok()?
        .json()
        .ok()?;
    let tag = value.get("tag_name")?.as_str()?;
    let version = tag.trim_start_matches('v').to_string();
    if version.is_empty() { None } else { Some(version) }
}

pub fn available_versions(repo: &str, limit: usize) -> Result<Vec<String>> {
    let client = http_client()?;
    let url = format!("https://api.github.com/repos/{repo}/releases?per_page={limit}");
    let releases: serde_json::Value = client
        .get(url)
        .send()
        .context("リリース一覧の取得に失敗しました")?
        .error_for_status()
        .context("リリース一覧の取得に失敗しました")?
        .json()
        .context("リリース一覧の解析に失敗しました")?;

    let Some(entries) = releases.as_array() else {
        return Err(anyhow!("リリース一覧の形式が想定外です"));
    };

    let versions = entries
        .iter()
        .filter(|r| !r.get("prerelease").and_then(|p| p.as_bool()).unwrap_or(false))
        .filter_map(|r| r.get("tag_name").and_then(|t| t.as_str()))
        .map(|t| t.trim_start_matches('v').to_string())
        .filter(|v| !v.is_empty())
        .collect();

    Ok(versions)
}

pub fn server_file_name(version: &str, arch: AgentArch) -> String {
    format!("agent-server-{version}-android-{arch}")
}

fn release_url(repo: &str, version: &str, arch: AgentArch) -> String {
    format!(
        "https://github.com/{repo}/releases/download/{version}/agent-server-{version}-android-{arch}.xz"
    )
}

pub fn download_server(
    cfg: &DownloadConfig,
    version: &str,
    arch: AgentArch,
    show_progress: bool,
) -> Result<PathBuf> {
    if !check_xz_installed() {
        return Err(anyhow!(
            "xz コマンドが見つかりません（展開に必要です）。xz-utils をインストールしてください"
        ));
    }

    let download_dir = match &cfg.dir {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("カレントディレクトリを取得できません")?,
    };
    std::fs::create_dir_all(&download_dir).with_context(|| {
        format!(
            "ダウンロードディレクトリの作成に失敗しました: {}",
            download_dir.display()
        )
    })?;

    let file_name = format!("{}.xz", server_file_name(version, arch));
    let xz_path = download_dir.join(&file_name);
    let url = release_url(&cfg.repo, version, arch);

    let client = http_client()?;
    let response = client
        .get(&url)
        .send()
        .with_context(|| format!("ダウンロードに失敗しました: {url}"))?
        .error_for_status()
        .with_context(|| format!("ダウンロードに失敗しました: {url}"))?;

    let total = response.content_length().unwrap_or(0);
    let mut file = std::fs::File::create(&xz_path)
        .with_context(|| format!("ファイルの作成に失敗しました: {}", xz_path.display()))?;

    if show_progress && cfg.show_progress {
        let pb = if total > 0 {
            ProgressBar::new(total)
        } else {
            ProgressBar::new_spinner()
        };
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_message(file_name.clone());
        let mut reader = pb.wrap_read(response);
        std::io::copy(&mut reader, &mut file).context("ダウンロード内容の書き込みに失敗しました")?;
        pb.finish_and_clear();
    } else {
        let mut reader = response;
        std::io::copy(&mut reader, &mut file).context("ダウンロード内容の書き込みに失敗しました")?;
    }

    extract_xz(&xz_path)
}

fn extract_xz(xz_path: &std::path::Path) -> Result<PathBuf> {
    let path_str = xz_path
        .to_str()
        .ok_or_else(|| anyhow!("パスが不正です: {}", xz_path.display()))?;
    let out = platform::run_command(
        "xz",
        &["--decompress", "--force", path_str],
        Duration::from_secs(60),
    )?;
    if out.exit_code != 0 {
        return Err(anyhow!("xz の展開に失敗しました: {}", out.stderr.trim()));
    }
    Ok(xz_path.with_extension(""))
}
