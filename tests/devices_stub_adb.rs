use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

const STUB_ADB: &str = r#"#!/bin/sh
if [ "$1" = "-s" ]; then shift 2; fi
case "$1" in
  devices)
    echo "List of devices attached"
    echo "emulator-5554          device product:sdk_gphone64_arm64 model:sdk_gphone64_arm64 device:emu64a transport_id:1"
    echo "R5CR123ABCD            unauthorized transport_id:2"
    ;;
  shell)
    shift
    if [ "$1" = "su" ]; then shift 2; fi
    cmd="$*"
    case "$cmd" in
      "getprop ro.build.version.release") echo "13" ;;
      "getprop ro.build.version.sdk") echo "33" ;;
      "getprop ro.product.cpu.abi") echo "arm64-v8a" ;;
      "getprop ro.product.model") echo "sdk_gphone64_arm64" ;;
      "getprop ro.product.manufacturer") echo "Google" ;;
      "getprop ro.build.version.security_patch") echo "2026-06-05" ;;
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

fn run_json(home: &Path, bin_dir: &Path, args: &[&str]) -> serde_json::Value {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_agentctl"));
    cmd.env("HOME", home);
    cmd.env("PATH", bin_dir);
    cmd.env_remove("AGENTCTL_CONFIG");
    cmd.env_remove("AGENTCTL_DEVICE_SERIAL");
    let out = cmd.args(args).output().expect("run agentctl");
    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("JSON 出力を期待")
}

#[test]
fn devices_json_lists_all_states() {
    let home = make_temp_home("devices");
    let bin_dir = write_stub_adb(&home);

    let json = run_json(&home, &bin_dir, &["devices", "--json"]);
    let devices = json.as_array().expect("配列");
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["serial"], "emulator-5554");
    assert_eq!(devices[0]["state"], "device");
    assert_eq!(devices[0]["model"], "sdk_gphone64_arm64");
    assert_eq!(devices[1]["serial"], "R5CR123ABCD");
    assert_eq!(devices[1]["state"], "unauthorized");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn devices_detailed_collects_facts_for_authorized_only() {
    let home = make_temp_home("devices");
    let bin_dir = write_stub_adb(&home);

    let json = run_json(&home, &bin_dir, &["devices", "--detailed", "--json"]);
    let details = json.as_array().expect("配列");
    assert_eq!(details.len(), 2);

    let first = &details[0];
    assert_eq!(first["serial"], "emulator-5554");
    assert_eq!(first["facts"]["os_version"], 13);
    assert_eq!(first["facts"]["sdk_version"], 33);
    assert_eq!(first["facts"]["abi"], "arm64-v8a");
    assert_eq!(first["facts"]["agent_arch"], "arm64");
    assert_eq!(first["facts"]["security_patch"], "2026-06-05");

    let second = &details[1];
    assert_eq!(second["state"], "unauthorized");
    assert_eq!(second["facts"]["os_version"], 0);
    assert_eq!(second["facts"]["agent_arch"], "unknown");
    let _ = std::fs::remove_dir_all(&home);
}
