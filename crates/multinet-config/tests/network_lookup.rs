//! Integration tests for resolving network selections against a
//! configuration directory.

use std::fs;

use camino::Utf8PathBuf;
use multinet_config::{ConfigError, NetConf, find_network_config, parse_network_selection};
use rstest::{fixture, rstest};
use serde_json::Value;
use tempfile::TempDir;

struct ConfDir {
    _dir: TempDir,
    path: Utf8PathBuf,
}

impl ConfDir {
    fn write(&self, file: &str, body: &str) {
        fs::write(self.path.join(file), body).expect("write config");
    }
}

#[fixture]
fn conf_dir() -> ConfDir {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    let conf = ConfDir { _dir: dir, path };
    conf.write(
        "00-multinet.conf",
        r#"{"cniVersion":"0.4.0","name":"multinet-network","type":"multinet"}"#,
    );
    conf.write(
        "10-lan.conf",
        r#"{"cniVersion":"0.4.0","name":"lan","type":"bridge"}"#,
    );
    conf.write(
        "20-fast.conflist",
        r#"{"cniVersion":"0.4.0","name":"fast","plugins":[{"type":"sriov"},{"type":"tuning"}]}"#,
    );
    conf.write("README", "not a network");
    conf
}

fn network_name(bytes: &[u8]) -> Option<String> {
    let document: Value = serde_json::from_slice(bytes).ok()?;
    document.get("name")?.as_str().map(str::to_owned)
}

#[rstest]
fn default_delegates_resolve_in_selection_order(conf_dir: ConfDir) {
    let stdin = format!(
        r#"{{"cniVersion":"0.4.0","name":"multinet-network","type":"multinet","confDir":"{}","defaultDelegates":"fast@net1,lan"}}"#,
        conf_dir.path
    );
    let netconf = NetConf::parse(stdin.as_bytes()).expect("netconf");
    let selection = netconf.default_delegates().expect("default delegates");

    let names: Vec<Option<String>> = parse_network_selection(selection, None)
        .expect("selection")
        .iter()
        .map(|network| {
            find_network_config(netconf.conf_dir(), network.name())
                .ok()
                .and_then(|bytes| network_name(&bytes))
        })
        .collect();

    assert_eq!(names, [Some(String::from("fast")), Some(String::from("lan"))]);
}

#[rstest]
fn unknown_network_names_the_directory(conf_dir: ConfDir) {
    let error = find_network_config(&conf_dir.path, "storage").expect_err("missing network");

    match error {
        ConfigError::NetworkNotFound { name, dir } => {
            assert_eq!(name, "storage");
            assert_eq!(dir, conf_dir.path);
        }
        other => panic!("expected NetworkNotFound, got: {other}"),
    }
}

#[test]
fn empty_directory_has_no_networks() {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");

    let error = find_network_config(&path, "lan").expect_err("no networks");

    assert!(matches!(error, ConfigError::NoNetworks { .. }), "{error}");
}
