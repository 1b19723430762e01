//! CLI tests running the `unityfs` binary

use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

/// One stored block of 32 bytes and a single entry covering bytes 4..12
fn small_bundle() -> Vec<u8> {
    let mut table = vec![0u8; 16];
    table.extend_from_slice(&1i32.to_be_bytes());
    table.extend_from_slice(&32u32.to_be_bytes());
    table.extend_from_slice(&32u32.to_be_bytes());
    table.extend_from_slice(&0u16.to_be_bytes());
    table.extend_from_slice(&1i32.to_be_bytes());
    table.extend_from_slice(&4i64.to_be_bytes());
    table.extend_from_slice(&8i64.to_be_bytes());
    table.extend_from_slice(&4u32.to_be_bytes());
    table.extend_from_slice(b"CAB-cli\0");

    let mut data = b"UnityFS\0".to_vec();
    data.extend_from_slice(&6i32.to_be_bytes());
    data.extend_from_slice(b"5.x.x\0");
    data.extend_from_slice(b"2019.4.40f1\0");
    let size_at = data.len();
    data.extend_from_slice(&0i64.to_be_bytes());
    data.extend_from_slice(&(table.len() as u32).to_be_bytes());
    data.extend_from_slice(&(table.len() as u32).to_be_bytes());
    data.extend_from_slice(&0u32.to_be_bytes());
    data.extend_from_slice(&table);
    data.extend((0u8..32).map(|b| b + 100));

    let size = data.len() as i64;
    data[size_at..size_at + 8].copy_from_slice(&size.to_be_bytes());
    data
}

fn write_temp(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

fn unityfs() -> Command {
    Command::new(env!("CARGO_BIN_EXE_unityfs"))
}

#[test]
fn test_check_command() {
    let data = small_bundle();
    let file = write_temp(&data);
    let output = unityfs().arg("check").arg(file.path()).output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        data.len().to_string()
    );

    let broken = write_temp(&data[..data.len() / 2]);
    let output = unityfs().arg("check").arg(broken.path()).output().unwrap();
    assert!(!output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "invalid");
}

#[test]
fn test_info_json() {
    let file = write_temp(&small_bundle());
    let output = unityfs()
        .args(["info", "--json"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["header"]["format_version"], 6);
    assert_eq!(report["data_size"], 32);
    assert_eq!(report["entries"][0]["name"], "CAB-cli");
    assert_eq!(report["table_hash"], "0".repeat(32));
}

#[test]
fn test_extract_command() {
    let file = write_temp(&small_bundle());
    let out_dir = tempfile::tempdir().unwrap();
    let output = unityfs()
        .arg("extract")
        .arg(file.path())
        .arg("--output")
        .arg(out_dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let extracted = std::fs::read(out_dir.path().join("CAB-cli")).unwrap();
    let expected: Vec<u8> = (104u8..112).collect();
    assert_eq!(extracted, expected);
}
