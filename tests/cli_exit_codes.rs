use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

const STUB_ADB: &str = r#"#!/bin/sh
if [ "$1" = "-s" ]; then shift 2; fi
case "$1" in
  devices)
    echo "List of devices attached"
    echo "emulator-5554          device product:sdk_gphone64_arm64 model:sdk_gphone64_arm64 device:emu64a transport_id:1"
    ;;
  version)
    echo "Android Debug Bridge version 1.0.41"
    ;;
  shell)
    shift
    if [ "$1" = "su" ]; then shift 2; fi
    cmd="$*"
    case "$cmd" in
      "getprop ro.build.version.release") echo "13" ;;
      "getprop ro.build.version.sdk") echo "33" ;;
      "getprop ro.product.cpu.abi") echo "arm64-v8a" ;;
      "getprop ro.product.model") echo "Pixel 7" ;;
      "getprop ro.product.manufacturer") echo "Google" ;;
      getenforce) echo "Permissive" ;;
      ps*) echo "root  4812     1 0 12:00:00 ?     00:00:01 /data/local/tmp/agent-server-16.1.17-android-arm64" ;;
      ls*) echo "/data/local/tmp/agent-server-16.1.17-android-arm64" ;;
      netstat*) echo "tcp 0 0 127.0.0.1:27042 0.0.0.0:* LISTEN" ;;
      *) echo "" ;;
    esac
    ;;
esac
exit 0
"#;

fn make_temp_home(label: &str) -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!(
        "agentctl-{label}-{}-{seq}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn write_stub_adb(home: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let bin_dir = home.join("stub-bin");
    std::fs::create_dir_all(&bin_dir).expect("create stub dir");
    let adb = bin_dir.join("adb");
    std::fs::write(&adb, STUB_ADB).expect("write stub adb");
    std::fs::set_permissions(&adb, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    bin_dir
}

fn agentctl_cmd(home: &Path, path_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_agentctl"));
    cmd.env("HOME", home);
    cmd.env("PATH", path_dir);
    cmd.env_remove("AGENTCTL_CONFIG");
    cmd.env_remove("AGENTCTL_UI_COLOR");
    cmd.env_remove("AGENTCTL_UI_MAX_TABLE_ROWS");
    cmd.env_remove("AGENTCTL_DEVICE_SERIAL");
    cmd.env_remove("AGENTCTL_AGENT_REMOTE_DIR");
    cmd.env_remove("AGENTCTL_AGENT_PORT");
    cmd.env_remove("AGENTCTL_DOWNLOAD_REPO");
    cmd.env_remove("AGENTCTL_DOWNLOAD_DIR");
    cmd.env_remove("AGENTCTL_DOWNLOAD_SHOW_PROGRESS");
    cmd
}

fn run(home: &Path, path_dir: &Path, args: &[&str]) -> Output {
    agentctl_cmd(home, path_dir)
        .args(args)
        .output()
        .expect("run agentctl")
}

#[test]
fn completion_unknown_shell_exits_2() {
    let home = make_temp_home("exit");
    let out = run(&home, &home, &["completion", "nope"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn completion_bash_succeeds() {
    let home = make_temp_home("exit");
    let out = run(&home, &home, &["completion", "bash"]);
    assert!(out.status.success());
    assert!(!out.stdout.is_empty());
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn config_init_twice_exits_2() {
    let home = make_temp_home("exit");
    let first = run(&home, &home, &["config", "init"]);
    assert!(first.status.success());
    let second = run(&home, &home, &["config", "init"]);
    assert_eq!(second.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn devices_without_adb_exits_20() {
    let home = make_temp_home("exit");
    let empty_path = home.join("empty-bin");
    std::fs::create_dir_all(&empty_path).expect("create empty path dir");
    let out = run(&home, &empty_path, &["devices"]);
    assert_eq!(out.status.code(), Some(20));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn status_without_devices_exits_10() {
    let home = make_temp_home("exit");
    let bin_dir = home.join("stub-bin");
    std::fs::create_dir_all(&bin_dir).expect("create stub dir");
    {
        use std::os::unix::fs::PermissionsExt;
        let adb = bin_dir.join("adb");
        std::fs::write(&adb, "#!/bin/sh\necho \"List of devices attached\"\nexit 0\n")
            .expect("write stub adb");
        std::fs::set_permissions(&adb, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    }
    let out = run(&home, &bin_dir, &["status"]);
    assert_eq!(out.status.code(), Some(10));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn install_with_invalid_version_exits_2() {
    let home = make_temp_home("exit");
    let bin_dir = write_stub_adb(&home);
    let out = run(&home, &bin_dir, &["install", "garbage"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn auto_fix_interactive_requires_tty_exits_2() {
    let home = make_temp_home("exit");
    let bin_dir = write_stub_adb(&home);
    let out = run(&home, &bin_dir, &["auto", "--fix", "--interactive"]);
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}
