//! Unit tests for the plugin execution protocol client.

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::tests::ScriptedExec;

const CHAIN: &[u8] = br#"{
    "cniVersion": "0.3.1",
    "name": "chain",
    "plugins": [
        {"type": "ptp", "ipam": {"type": "host-local"}},
        {"type": "portmap", "capabilities": {"portMappings": true}}
    ]
}"#;

#[fixture]
fn context() -> InvocationContext {
    InvocationContext::new("abc", Some(String::from("/var/run/netns/pod")))
        .with_capability_args(Some(
            json!({"portMappings": [{"hostPort": 8080}], "bandwidth": {"rate": 1}})
                .as_object()
                .cloned()
                .expect("object"),
        ))
        .for_interface("net1")
}

fn stdin_json(invocation: &PluginInvocation) -> Value {
    serde_json::from_slice(invocation.stdin()).expect("stdin is JSON")
}

#[rstest]
fn single_add_passes_config_verbatim(context: InvocationContext) {
    let exec = ScriptedExec::default();
    let config = br#"{"cniVersion":"0.3.1","name":"lan","type":"bridge"}"#;

    let result = add_single(&exec, "bridge", config, &context).expect("add succeeds");

    let calls = exec.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].stdin(), config);
    assert_eq!(calls[0].env_value("CNI_COMMAND"), Some("ADD"));
    assert_eq!(calls[0].env_value("CNI_IFNAME"), Some("net1"));
    assert_eq!(result.ips[0].address, "10.0.0.2/24");
}

#[rstest]
fn single_add_rejects_garbage_output(context: InvocationContext) {
    let exec = ScriptedExec::default().output("bridge", "garbage");
    let error = add_single(&exec, "bridge", b"{}", &context).expect_err("must fail");
    assert!(matches!(error, DelegateError::InvalidResult { .. }));
}

#[rstest]
fn list_add_chains_previous_results(context: InvocationContext) {
    let exec = ScriptedExec::default();

    add_list(&exec, CHAIN, &context).expect("list add succeeds");

    let calls = exec.calls();
    assert_eq!(exec.call_log(), vec!["ADD ptp", "ADD portmap"]);
    let first = stdin_json(&calls[0]);
    let second = stdin_json(&calls[1]);
    assert_eq!(first["name"], "chain");
    assert_eq!(first["cniVersion"], "0.3.1");
    assert!(first.get("prevResult").is_none());
    assert_eq!(second["prevResult"]["ips"][0]["address"], "10.0.0.2/24");
}

#[rstest]
fn list_entries_only_receive_declared_capabilities(context: InvocationContext) {
    let exec = ScriptedExec::default();

    add_list(&exec, CHAIN, &context).expect("list add succeeds");

    let calls = exec.calls();
    assert!(stdin_json(&calls[0]).get("runtimeConfig").is_none());
    assert_eq!(
        stdin_json(&calls[1])["runtimeConfig"],
        json!({"portMappings": [{"hostPort": 8080}]})
    );
}

#[rstest]
fn list_add_stops_at_first_failure(context: InvocationContext) {
    let exec = ScriptedExec::default().fail("ptp", "ADD");
    let error = add_list(&exec, CHAIN, &context).expect_err("must fail");
    assert!(matches!(error, DelegateError::PluginFailed { ref plugin, .. } if plugin == "ptp"));
    assert_eq!(exec.call_log(), vec!["ADD ptp"]);
}

#[rstest]
fn list_del_runs_in_reverse(context: InvocationContext) {
    let exec = ScriptedExec::default();
    del_list(&exec, CHAIN, &context).expect("list del succeeds");
    assert_eq!(exec.call_log(), vec!["DEL portmap", "DEL ptp"]);
    assert!(stdin_json(&exec.calls()[0]).get("prevResult").is_none());
}

#[rstest]
fn list_del_stops_at_first_failure(context: InvocationContext) {
    let exec = ScriptedExec::default().fail("portmap", "DEL");
    del_list(&exec, CHAIN, &context).expect_err("must fail");
    assert_eq!(exec.call_log(), vec!["DEL portmap"]);
}

#[test]
fn entry_without_capabilities_gets_no_runtime_config() {
    let entry = json!({"type": "tuning"});
    let args = json!({"mac": "aa"}).as_object().cloned();
    let bytes = build_entry_config(&entry, "n", "0.4.0", None, args.as_ref()).expect("builds");
    let config: Value = serde_json::from_slice(&bytes).expect("JSON");
    assert_eq!(config, json!({"type": "tuning", "name": "n", "cniVersion": "0.4.0"}));
}

#[test]
fn list_without_plugins_is_invalid() {
    let exec = ScriptedExec::default();
    let context = InvocationContext::new("abc", None);
    let error = add_list(&exec, br#"{"name":"x"}"#, &context).expect_err("must fail");
    assert!(matches!(error, DelegateError::InvalidConfig { .. }));
    assert!(exec.calls().is_empty());
}
