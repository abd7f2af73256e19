//! Unit tests for command dispatch.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tempfile::TempDir;

use super::*;
use crate::error::{
    CODE_DECODING_FAILURE, CODE_INCOMPATIBLE_VERSION, CODE_INVALID_ENVIRONMENT,
    CODE_INVALID_NETWORK_CONFIG,
};

struct Outcome {
    exit: ExitCode,
    stdout: String,
}

impl Outcome {
    fn document(&self) -> Value {
        serde_json::from_str(&self.stdout).expect("stdout holds one JSON document")
    }

    fn code(&self) -> Option<u64> {
        self.document().get("code").and_then(Value::as_u64)
    }
}

struct Sandbox {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Sandbox {
    fn netconf(&self, extra: &Value) -> String {
        let mut document = json!({
            "cniVersion": "0.4.0",
            "name": "multinet-network",
            "type": "multinet",
            "cniDir": self.root.join("records").as_str(),
            "confDir": self.root.join("net.d").as_str(),
            "binDir": self.root.join("bin").as_str(),
        });
        if let (Some(target), Some(source)) = (document.as_object_mut(), extra.as_object()) {
            target.extend(source.clone());
        }
        document.to_string()
    }
}

#[fixture]
fn sandbox() -> Sandbox {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
    Sandbox { _dir: dir, root }
}

fn invoke(vars: &[(&str, &str)], stdin: &str) -> Outcome {
    let owned = vars
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()));
    let mut input = stdin.as_bytes();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = run(owned, &mut input, &mut stdout, &mut stderr);
    Outcome {
        exit,
        stdout: String::from_utf8(stdout).expect("utf-8 stdout"),
    }
}

const ADD_VARS: &[(&str, &str)] = &[
    ("CNI_COMMAND", "ADD"),
    ("CNI_CONTAINERID", "c0ffee"),
    ("CNI_NETNS", "/var/run/netns/test"),
    ("CNI_IFNAME", "eth0"),
];

#[test]
fn version_lists_supported_versions() {
    let outcome = invoke(&[("CNI_COMMAND", "VERSION")], "");

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    let document = outcome.document();
    assert_eq!(document.get("cniVersion"), Some(&json!(CURRENT_VERSION)));
    assert_eq!(
        document.get("supportedVersions"),
        Some(&json!(SUPPORTED_VERSIONS))
    );
}

#[test]
fn missing_command_is_an_environment_error() {
    let outcome = invoke(&[("CNI_CONTAINERID", "c0ffee")], "{}");

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(outcome.code(), Some(u64::from(CODE_INVALID_ENVIRONMENT)));
    assert_eq!(outcome.document().get("cniVersion"), Some(&json!(CURRENT_VERSION)));
}

#[test]
fn malformed_configuration_is_a_decoding_error() {
    let outcome = invoke(ADD_VARS, "{not json");

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(outcome.code(), Some(u64::from(CODE_DECODING_FAILURE)));
}

#[rstest]
fn unsupported_version_is_rejected_in_that_version(sandbox: Sandbox) {
    let outcome = invoke(ADD_VARS, &sandbox.netconf(&json!({"cniVersion": "9.9.9"})));

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(outcome.code(), Some(u64::from(CODE_INCOMPATIBLE_VERSION)));
    assert_eq!(outcome.document().get("cniVersion"), Some(&json!("9.9.9")));
}

#[rstest]
fn add_without_netns_is_an_environment_error(sandbox: Sandbox) {
    let vars = [
        ("CNI_COMMAND", "ADD"),
        ("CNI_CONTAINERID", "c0ffee"),
        ("CNI_IFNAME", "eth0"),
    ];

    let outcome = invoke(&vars, &sandbox.netconf(&json!({})));

    assert_eq!(outcome.code(), Some(u64::from(CODE_INVALID_ENVIRONMENT)));
}

#[rstest]
fn add_without_delegates_fails_before_persisting(sandbox: Sandbox) {
    let outcome = invoke(ADD_VARS, &sandbox.netconf(&json!({})));

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(outcome.code(), Some(u64::from(CODE_INVALID_NETWORK_CONFIG)));
    assert!(!sandbox.root.join("records").exists());
}

#[rstest]
fn del_without_record_succeeds_silently(sandbox: Sandbox) {
    let vars = [
        ("CNI_COMMAND", "DEL"),
        ("CNI_CONTAINERID", "c0ffee"),
        ("CNI_IFNAME", "eth0"),
    ];

    let outcome = invoke(&vars, &sandbox.netconf(&json!({})));

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(outcome.stdout.is_empty(), "{}", outcome.stdout);
}

#[rstest]
fn get_echoes_the_previous_result(sandbox: Sandbox) {
    let vars = [
        ("CNI_COMMAND", "GET"),
        ("CNI_CONTAINERID", "c0ffee"),
        ("CNI_IFNAME", "eth0"),
    ];
    let previous = json!({
        "cniVersion": "0.4.0",
        "interfaces": [{"name": "eth0", "sandbox": "/var/run/netns/test"}],
        "ips": [{"version": "4", "address": "10.1.0.5/24", "interface": 0}]
    });

    let outcome = invoke(&vars, &sandbox.netconf(&json!({"prevResult": previous})));

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    let document = outcome.document();
    assert_eq!(
        document.pointer("/ips/0/address"),
        Some(&json!("10.1.0.5/24"))
    );
}

#[rstest]
fn get_without_previous_result_is_empty(sandbox: Sandbox) {
    let vars = [("CNI_COMMAND", "GET"), ("CNI_CONTAINERID", "c0ffee")];

    let outcome = invoke(&vars, &sandbox.netconf(&json!({"cniVersion": "0.3.1"})));

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert_eq!(outcome.document(), json!({"cniVersion": "0.3.1"}));
}

#[test]
fn context_carries_pod_identity_and_plugin_dirs() {
    let environment = PluginEnvironment::from_vars([
        ("CNI_COMMAND", "ADD"),
        (
            "CNI_ARGS",
            "IgnoreUnknown=1;K8S_POD_NAMESPACE=prod;K8S_POD_NAME=web-0;K8S_POD_INFRA_CONTAINER_ID=abc",
        ),
        ("CNI_PATH", "/opt/extra:/usr/libexec/cni"),
    ])
    .expect("environment");
    let netconf = NetConf::parse(
        br#"{"cniVersion":"0.4.0","name":"n","type":"multinet","binDir":"/opt/cni/bin","runtimeConfig":{"portMappings":[]}}"#,
    )
    .expect("netconf");

    let context = invocation_context(&environment, &netconf, "c0ffee", None);

    assert_eq!(
        context.args(),
        [
            (String::from("IgnoreUnknown"), String::from("1")),
            (String::from("K8S_POD_NAMESPACE"), String::from("prod")),
            (String::from("K8S_POD_NAME"), String::from("web-0")),
            (String::from("K8S_POD_INFRA_CONTAINER_ID"), String::from("abc")),
        ]
    );
    assert_eq!(
        context.plugin_dirs(),
        [
            PathBuf::from("/opt/extra"),
            PathBuf::from("/usr/libexec/cni"),
            PathBuf::from("/opt/cni/bin"),
        ]
    );
    assert!(context.capability_args().is_some_and(|args| args.contains_key("portMappings")));
}

#[rstest]
#[case::current("0.4.0", true)]
#[case::legacy("0.1.0", true)]
#[case::unspecified("", true)]
#[case::future("1.0.0", false)]
fn versions_are_checked_against_the_supported_list(#[case] version: &str, #[case] accepted: bool) {
    assert_eq!(check_version(version).is_ok(), accepted);
}
