use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget};
use time::OffsetDateTime;

use crate::adb::{self, AdbClient};
use crate::agent::AgentManager;
use crate::automator::Automator;
use crate::config::EffectiveConfig;
use crate::core::parse_version;
use crate::download;
use crate::inventory;
use crate::ui::{self, UiConfig};

mod interactive;

#[derive(Debug, Parser)]
#[command(
    name = "agentctl",
    version,
    about = "Android デバイス上のエージェントサーバーを管理する（バージョン整合・導入・起動の自動化）"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub device: Option<String>,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout: u64,
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Devices(DevicesArgs),
    Status,
    Install(InstallArgs),
    Start,
    Stop(StopArgs),
    Restart,
    Versions(VersionsArgs),
    Doctor,
    Auto(AutoArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[arg(long)]
    pub detailed: bool,
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    pub version: Option<String>,
    #[arg(long)]
    pub latest: bool,
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct StopArgs {
    #[arg(long)]
    pub pid: Option<u32>,
}

#[derive(Debug, Args)]
pub struct VersionsArgs {
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct AutoArgs {
    #[arg(long)]
    pub fix: bool,
    #[arg(long)]
    pub interactive: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Show,
    Init,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn spinner(message: &str, enabled: bool) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

fn manager_for(serial: &str, cfg: &EffectiveConfig, timeout: Duration) -> (AdbClient, AgentManager) {
    let adb = AdbClient::new(Some(serial.to_string()), timeout);
    let manager = AgentManager::new(
        adb.clone(),
        cfg.agent.remote_dir.clone(),
        cfg.agent.port,
        cfg.download.clone(),
    );
    (adb, manager)
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stdin_is_tty = io::stdin().is_terminal();
    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let env_config_path = std::env::var_os("AGENTCTL_CONFIG").map(PathBuf::from);
    let cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;

    let color = stdout_is_tty && cfg.ui.color && !cli.no_color;
    let ui_cfg = UiConfig {
        color,
        stdin_is_tty,
        stdout_is_tty,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let timeout = Duration::from_secs(cli.timeout);
    let progress_enabled = stderr_is_tty && !cli.quiet && !cli.json;
    let requested_device = cli.device.clone().or(cfg.device.default_serial.clone());

    match cli.command {
        Commands::Devices(args) => {
            let devices = adb::list_devices(timeout).map_err(crate::exit::external_cmd_err)?;
            if args.detailed {
                let details = inventory::describe_devices(&devices, timeout);
                if cli.json {
                    write_json(&details)?;
                } else {
                    ui::print_device_details(&details, &ui_cfg);
                }
            } else if cli.json {
                write_json(&devices)?;
            } else {
                ui::print_devices(&devices, &ui_cfg);
            }
        }
        Commands::Status => {
            let serial = adb::select_device(requested_device.as_deref(), timeout)?;
            let (adb, manager) = manager_for(&serial, &cfg, timeout);
            let pb = spinner("デバイスの状態を取得中...", progress_enabled);
            let snapshot = inventory::collect(&adb, &manager);
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            if cli.json {
                write_json(&snapshot)?;
            } else {
                ui::print_status(&snapshot, &ui_cfg);
            }
        }
        Commands::Install(args) => {
            let serial = adb::select_device(requested_device.as_deref(), timeout)?;
            let (adb, manager) = manager_for(&serial, &cfg, timeout);

            let version = if let Some(version) = args.version {
                let version = version.trim_start_matches('v').to_string();
                if parse_version(&version).is_unknown() {
                    return Err(crate::exit::invalid_args(format!(
                        "バージョンの形式が不正です: {version}"
                    )));
                }
                version
            } else if args.latest {
                download::latest_version(&cfg.download.repo).ok_or_else(|| {
                    crate::exit::external_cmd("最新バージョンを取得できませんでした")
                })?
            } else {
                let automator = Automator::new(&serial, &cfg, timeout, progress_enabled);
                let report = automator.analyze();
                if !ui_cfg.quiet && !cli.json {
                    println!(
                        "バージョン指定がないため {} を選択します（{}）",
                        report.target_version, report.target_reason
                    );
                }
                report.target_version
            };

            let arch = inventory::collect_device_facts(&adb).agent_arch;
            if cli.dry_run {
                if !ui_cfg.quiet {
                    println!(
                        "dry-run: エージェントサーバー {version}（{arch}）を {} に配置します",
                        manager.remote_path(&version, arch)
                    );
                }
                return Ok(());
            }

            let path = manager
                .install(&version, arch, args.force, progress_enabled)
                .map_err(crate::exit::external_cmd_err)?;
            if !ui_cfg.quiet {
                println!("エージェントサーバー {version} をインストールしました: {path}");
            }
        }
        Commands::Start => {
            let serial = adb::select_device(requested_device.as_deref(), timeout)?;
            let (_adb, manager) = manager_for(&serial, &cfg, timeout);
            let installed = manager.installed_servers();
            let Some(path) = installed.first() else {
                return Err(crate::exit::external_cmd(
                    "エージェントサーバーがインストールされていません（agentctl install を実行してください）",
                ));
            };
            let pb = spinner("エージェントサーバーを起動中...", progress_enabled);
            let (started, pid) = manager.start(path).map_err(crate::exit::external_cmd_err)?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            if !started {
                return Err(crate::exit::external_cmd(
                    "エージェントサーバーの起動に失敗しました（タイムアウト）",
                ));
            }
            if !ui_cfg.quiet {
                match pid {
                    Some(pid) => println!("エージェントサーバーを起動しました（pid={pid}）"),
                    None => println!("エージェントサーバーを起動しました"),
                }
            }
        }
        Commands::Stop(args) => {
            let serial = adb::select_device(requested_device.as_deref(), timeout)?;
            let (_adb, manager) = manager_for(&serial, &cfg, timeout);
            let stopped = manager
                .stop(args.pid)
                .map_err(crate::exit::external_cmd_err)?;
            if !stopped {
                return Err(crate::exit::external_cmd(
                    "停止できなかったプロセスがあります",
                ));
            }
            if !ui_cfg.quiet {
                println!("エージェントサーバーを停止しました");
            }
        }
        Commands::Restart => {
            let serial = adb::select_device(requested_device.as_deref(), timeout)?;
            let (_adb, manager) = manager_for(&serial, &cfg, timeout);
            let installed = manager.installed_servers();
            let Some(path) = installed.first() else {
                return Err(crate::exit::external_cmd(
                    "エージェントサーバーがインストールされていません（agentctl install を実行してください）",
                ));
            };
            let (started, pid) = manager
                .restart(path)
                .map_err(crate::exit::external_cmd_err)?;
            if !started {
                return Err(crate::exit::external_cmd(
                    "エージェントサーバーの再起動に失敗しました",
                ));
            }
            if !ui_cfg.quiet {
                match pid {
                    Some(pid) => println!("エージェントサーバーを再起動しました（pid={pid}）"),
                    None => println!("エージェントサーバーを再起動しました"),
                }
            }
        }
        Commands::Versions(args) => {
            let versions = download::available_versions(&cfg.download.repo, args.limit)
                .map_err(crate::exit::external_cmd_err)?;
            if cli.json {
                write_json(&versions)?;
            } else {
                ui::print_versions(&versions, &ui_cfg);
            }
        }
        Commands::Doctor => {
            let pb = spinner("診断を実行中...", progress_enabled);
            let report = crate::doctor::run_checks(requested_device.as_deref(), &cfg, timeout);
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            if cli.json {
                write_json(&report)?;
            } else {
                ui::print_doctor(&report, &ui_cfg);
            }
        }
        Commands::Auto(args) => {
            let serial = adb::select_device(requested_device.as_deref(), timeout)?;
            let automator = Automator::new(&serial, &cfg, timeout, progress_enabled);

            let pb = spinner("デバイスを分析中...", progress_enabled);
            let analysis = automator.analyze();
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            if !args.fix {
                if cli.json {
                    write_json(&analysis)?;
                } else {
                    ui::print_analysis(&analysis, &ui_cfg);
                }
                return Ok(());
            }

            if cli.dry_run {
                if cli.json {
                    write_json(&analysis)?;
                } else {
                    ui::print_analysis(&analysis, &ui_cfg);
                    if !ui_cfg.quiet {
                        println!();
                        println!("dry-run: 上記のアクションは実行されていません。");
                    }
                }
                return Ok(());
            }

            let selected = if args.interactive {
                if !(stdin_is_tty && stdout_is_tty) {
                    return Err(crate::exit::invalid_args(
                        "auto --fix --interactive は TTY が必要です（stdin + stdout）",
                    ));
                }
                ui::print_analysis(&analysis, &ui_cfg);
                if analysis.actions.is_empty() {
                    None
                } else {
                    match interactive::prompt_action_selection(analysis.actions.len())
                        .map_err(crate::exit::invalid_args_err)?
                    {
                        interactive::Selection::All => None,
                        interactive::Selection::None => {
                            if !ui_cfg.quiet {
                                eprintln!("キャンセルしました。");
                            }
                            return Ok(());
                        }
                        interactive::Selection::Indices(indices) => Some(indices),
                    }
                }
            } else {
                None
            };

            let started_at = OffsetDateTime::now_utc();
            let result = match selected {
                Some(indices) => automator.execute_selected(analysis, &indices),
                None => automator.execute(analysis),
            };
            let finished_at = OffsetDateTime::now_utc();

            match crate::logs::write_auto_fix_log(&home_dir, started_at, finished_at, &result) {
                Ok(path) => {
                    if ui_cfg.verbose && !ui_cfg.quiet {
                        eprintln!("ログ: {}", path.display());
                    }
                }
                Err(err) => {
                    if !ui_cfg.quiet {
                        eprintln!("警告: ログを書き込めませんでした: {err}");
                    }
                }
            }

            if cli.json {
                write_json(&result)?;
            } else {
                ui::print_run_result(&result, &ui_cfg);
            }

            if !result.success {
                return Err(crate::exit::external_cmd(
                    "インストール系のアクションが失敗しました",
                ));
            }
        }
        Commands::Config(args) => match args.command {
            ConfigCommand::Show => {
                write_json(&cfg)?;
            }
            ConfigCommand::Init => {
                let path = cli
                    .config
                    .or(env_config_path)
                    .unwrap_or_else(|| crate::config::default_config_path(&home_dir));
                crate::config::write_default(&path).map_err(crate::exit::invalid_args_err)?;
                if !ui_cfg.quiet {
                    println!("設定ファイルを作成しました: {}", path.display());
                }
            }
        },
        Commands::Completion(args) => {
            let shell = args
                .shell
                .parse::<clap_complete::Shell>()
                .map_err(|_| {
                    crate::exit::invalid_args(format!(
                        "未対応のシェルです: {}（bash|zsh|fish|elvish|powershell）",
                        args.shell
                    ))
                })?;
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "agentctl", &mut io::stdout());
        }
    }

    Ok(())
}
