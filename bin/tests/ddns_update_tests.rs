use std::{
    fs,
    path::Path,
    process::{Command, Output},
};

use test_support::fixture_dir;

const CONFIG: &str = r#"
zone = "zone.example"
default_ttl = 300
trusted_proxies = ["10.0.0.0/8"]

[glue]
ns = "192.0.2.53"

[store]
type = "file"
zone_file_path = "zone.example.zone"
"#;

fn ddns_update(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ddns-update"))
        .arg("--quiet")
        .arg("--config")
        .arg(dir.join("ddns.toml"))
        .args(args)
        .output()
        .expect("failed to run ddns-update")
}

fn setup(test_name: &str) -> std::path::PathBuf {
    let dir = fixture_dir("ddns_update_tests", test_name);
    fs::write(dir.join("ddns.toml"), CONFIG).unwrap();
    dir
}

fn response(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("response is not json")
}

#[test]
fn test_apply_and_show() {
    let dir = setup("test_apply_and_show");

    let output = ddns_update(
        &dir,
        &[
            "apply", "A", "update", "--host", "h1", "--host", "h2", "--peer", "10.0.0.2",
            "--forwarded-for", "198.51.100.9",
        ],
    );
    assert!(output.status.success(), "{output:?}");
    let json = response(&output);
    assert_eq!(json["success"], true);
    assert_eq!(
        json["message"],
        "Updated record: [h1.zone.example, h2.zone.example] A 198.51.100.9"
    );
    assert_eq!(json["serial"], 2);

    let output = ddns_update(&dir, &["show"]);
    assert!(output.status.success(), "{output:?}");
    let zone = String::from_utf8(output.stdout).unwrap();
    assert!(zone.contains("h1.zone.example. 300 IN A 198.51.100.9"), "{zone}");
    assert!(zone.contains("ns.zone.example. 300 IN A 192.0.2.53"), "{zone}");

    let on_disk = fs::read_to_string(dir.join("zone.example.zone")).unwrap();
    assert!(on_disk.contains("h2.zone.example. 300 IN A 198.51.100.9"));
}

#[test]
fn test_rejected_request_exits_with_two() {
    let dir = setup("test_rejected_request_exits_with_two");

    let output = ddns_update(
        &dir,
        &["apply", "MX", "update", "--host", "h1", "--value", "x", "--peer", "192.0.2.1"],
    );
    assert_eq!(output.status.code(), Some(2));
    let json = response(&output);
    assert_eq!(json["success"], false);
    assert_eq!(json["field"], "record_type");
    assert!(json.get("serial").is_none());
}

#[test]
fn test_ip() {
    let dir = setup("test_ip");

    let output = ddns_update(
        &dir,
        &["ip", "--peer", "10.1.1.1", "--forwarded-for", "2001:db8::7, 10.2.2.2"],
    );
    assert!(output.status.success(), "{output:?}");
    assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), "2001:db8::7");

    let output = ddns_update(&dir, &["ip", "--peer", "192.0.2.5", "--forwarded-for", "1.2.3.4"]);
    assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), "192.0.2.5");
}

#[test]
fn test_validate() {
    let dir = setup("test_validate");
    let output = ddns_update(&dir, &["--validate"]);
    assert!(output.status.success(), "{output:?}");
    assert!(!dir.join("zone.example.zone").exists());

    fs::write(dir.join("ddns.toml"), "zone = \"\"\n").unwrap();
    let output = ddns_update(&dir, &["--validate"]);
    assert_eq!(output.status.code(), Some(1));
}
