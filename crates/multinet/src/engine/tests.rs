//! Unit tests for the orchestration engine.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use mockall::mock;
use multinet_delegate::{CniResult, DelegateError, Interface};
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::report::StatusReportError;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Runner that records every call and fails for configured plugin types.
#[derive(Default)]
struct RecordingRunner {
    calls: RefCell<Vec<String>>,
    failing_add: HashSet<String>,
    failing_del: RefCell<HashSet<String>>,
}

impl RecordingRunner {
    fn fail_add(mut self, plugin: &str) -> Self {
        self.failing_add.insert(plugin.to_owned());
        self
    }

    fn fail_del(self, plugin: &str) -> Self {
        self.failing_del.borrow_mut().insert(plugin.to_owned());
        self
    }

    fn heal(&self) {
        self.failing_del.borrow_mut().clear();
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn failure(plugin: &str) -> DelegateError {
        DelegateError::PluginFailed {
            plugin: plugin.to_owned(),
            code: 11,
            message: String::from("device busy"),
        }
    }
}

impl DelegateRunner for RecordingRunner {
    fn add(
        &self,
        ifname: &str,
        delegate: &Delegate,
        _context: &InvocationContext,
    ) -> Result<CniResult, DelegateError> {
        let plugin = delegate.display_name();
        self.calls.borrow_mut().push(format!("ADD {plugin} {ifname}"));
        if self.failing_add.contains(plugin) {
            return Err(Self::failure(plugin));
        }
        let mut result = CniResult::empty("0.4.0");
        result.interfaces.push(Interface {
            name: ifname.to_owned(),
            mac: format!("02:00:00:00:00:{:02x}", self.calls.borrow().len()),
            sandbox: String::from("/var/run/netns/test"),
        });
        Ok(result)
    }

    fn del(
        &self,
        ifname: &str,
        delegate: &Delegate,
        _context: &InvocationContext,
    ) -> Result<(), DelegateError> {
        let plugin = delegate.display_name();
        self.calls.borrow_mut().push(format!("DEL {plugin} {ifname}"));
        if self.failing_del.borrow().contains(plugin) {
            return Err(Self::failure(plugin));
        }
        Ok(())
    }
}

/// In-memory store with optional write failures.
#[derive(Default)]
struct MemoryStore {
    records: RefCell<HashMap<String, Vec<u8>>>,
    saves: RefCell<usize>,
    reject_saves: bool,
}

impl MemoryStore {
    fn rejecting() -> Self {
        Self {
            reject_saves: true,
            ..Self::default()
        }
    }

    fn record(&self, container_id: &str) -> Option<Vec<Delegate>> {
        self.records
            .borrow()
            .get(container_id)
            .map(|bytes| serde_json::from_slice(bytes).expect("decodable record"))
    }

    fn saves(&self) -> usize {
        *self.saves.borrow()
    }
}

impl DelegateStore for MemoryStore {
    fn save(&self, container_id: &str, record: &[u8]) -> Result<(), StoreError> {
        *self.saves.borrow_mut() += 1;
        if self.reject_saves {
            return Err(StoreError::Io {
                path: camino::Utf8PathBuf::from("/var/lib/cni/multinet"),
                source: std::sync::Arc::new(std::io::Error::other("read-only")),
            });
        }
        self.records
            .borrow_mut()
            .insert(container_id.to_owned(), record.to_vec());
        Ok(())
    }

    fn load(&self, container_id: &str) -> Result<Vec<u8>, StoreError> {
        self.records
            .borrow()
            .get(container_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                container_id: container_id.to_owned(),
            })
    }

    fn remove(&self, container_id: &str) -> Result<(), StoreError> {
        self.records.borrow_mut().remove(container_id);
        Ok(())
    }
}

mock! {
    Reporter {}
    impl StatusReporter for Reporter {
        fn report(&self, statuses: &[NetworkStatus]) -> Result<(), StatusReportError>;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CONTAINER: &str = "c0ffee";

fn delegate(plugin: &str, ifname: Option<&str>) -> Delegate {
    let config = format!(r#"{{"cniVersion":"0.4.0","name":"{plugin}-net","type":"{plugin}"}}"#);
    Delegate::from_config(config.as_bytes())
        .expect("delegate")
        .with_ifname_request(ifname.map(str::to_owned))
}

#[fixture]
fn context() -> InvocationContext {
    InvocationContext::new(CONTAINER, Some(String::from("/var/run/netns/test")))
}

// ---------------------------------------------------------------------------
// ADD
// ---------------------------------------------------------------------------

#[rstest]
fn add_runs_delegates_in_order_and_returns_master_result(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);
    let delegates = [delegate("sriov", Some("net1")), delegate("bridge", None)];

    let result = engine.add(&delegates, "eth0", &context).expect("add");

    assert_eq!(runner.calls(), vec!["ADD sriov net1", "ADD bridge eth0"]);
    assert_eq!(result.interfaces.first().map(|i| i.name.as_str()), Some("eth0"));

    let record = store.record(CONTAINER).expect("record persisted");
    let names: Vec<_> = record.iter().filter_map(Delegate::ifname_request).collect();
    assert_eq!(names, vec!["net1", "eth0"]);
    assert!(record.get(1).is_some_and(Delegate::is_master));
}

#[rstest]
fn add_failure_rolls_back_completed_delegates_in_reverse(context: InvocationContext) {
    let runner = RecordingRunner::default().fail_add("macvlan");
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);
    let delegates = [
        delegate("bridge", None),
        delegate("ptp", None),
        delegate("macvlan", None),
        delegate("tap", None),
    ];

    let error = engine.add(&delegates, "eth0", &context).expect_err("fails");

    assert_eq!(
        runner.calls(),
        vec![
            "ADD bridge eth0",
            "ADD ptp eth1",
            "ADD macvlan eth2",
            "DEL ptp eth1",
            "DEL bridge eth0",
        ]
    );
    assert!(matches!(
        error,
        EngineError::DelegateAdd { index: 2, ref delegate, ref ifname, .. }
            if delegate == "macvlan" && ifname == "eth2"
    ));
    assert!(store.record(CONTAINER).is_none(), "record removed after rollback");
}

#[rstest]
fn rollback_continues_past_failing_deletes(context: InvocationContext) {
    let runner = RecordingRunner::default()
        .fail_add("tap")
        .fail_del("ptp");
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);
    let delegates = [delegate("bridge", None), delegate("ptp", None), delegate("tap", None)];

    let error = engine.add(&delegates, "eth0", &context).expect_err("fails");

    assert!(runner.calls().contains(&String::from("DEL bridge eth0")));
    assert!(matches!(error, EngineError::DelegateAdd { index: 2, .. }));
    assert!(store.record(CONTAINER).is_none());
}

#[rstest]
fn first_delegate_failure_needs_no_rollback(context: InvocationContext) {
    let runner = RecordingRunner::default().fail_add("bridge");
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);

    let error = engine
        .add(&[delegate("bridge", None)], "eth0", &context)
        .expect_err("fails");

    assert_eq!(runner.calls(), vec!["ADD bridge eth0"]);
    assert_eq!(error.code(), crate::error::CODE_DELEGATE_FAILURE);
}

#[rstest]
fn empty_delegate_list_is_rejected_before_any_side_effect(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);

    let error = engine.add(&[], "eth0", &context).expect_err("empty");

    assert!(matches!(error, EngineError::NoDelegatesConfigured));
    assert!(runner.calls().is_empty());
    assert_eq!(store.saves(), 0);
}

#[rstest]
fn naming_conflict_is_rejected_before_any_side_effect(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);
    let delegates = [delegate("bridge", Some("net1")), delegate("ptp", Some("net1"))];

    let error = engine.add(&delegates, "eth0", &context).expect_err("conflict");

    assert!(matches!(error, EngineError::Allocation(_)));
    assert!(runner.calls().is_empty());
    assert_eq!(store.saves(), 0);
}

#[rstest]
fn store_failure_prevents_delegate_execution(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::rejecting();
    let engine = Engine::new(&runner, &store);

    let error = engine
        .add(&[delegate("bridge", None)], "eth0", &context)
        .expect_err("store failure");

    assert!(matches!(error, EngineError::Store(_)));
    assert!(runner.calls().is_empty());
}

#[rstest]
fn successful_add_reports_one_status_per_delegate(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let mut reporter = MockReporter::new();
    reporter
        .expect_report()
        .withf(|statuses| {
            statuses.len() == 2
                && statuses.iter().filter(|status| status.default).count() == 1
                && statuses.first().is_some_and(|status| {
                    status.name == "bridge-net" && status.interface == "eth0" && status.default
                })
        })
        .times(1)
        .returning(|_| Ok(()));
    let engine = Engine::new(&runner, &store).with_reporter(&reporter);

    engine
        .add(
            &[delegate("bridge", None), delegate("sriov", Some("net1"))],
            "eth0",
            &context,
        )
        .expect("add");
}

#[rstest]
fn report_failure_does_not_fail_add(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let mut reporter = MockReporter::new();
    reporter.expect_report().times(1).returning(|_| {
        Err(StatusReportError::ConflictRetriesExhausted {
            namespace: String::from("default"),
            name: String::from("web-0"),
            attempts: 4,
        })
    });
    let engine = Engine::new(&runner, &store).with_reporter(&reporter);

    engine
        .add(&[delegate("bridge", None)], "eth0", &context)
        .expect("add succeeds regardless of reporting");
}

#[rstest]
fn failed_add_reports_nothing(context: InvocationContext) {
    let runner = RecordingRunner::default().fail_add("bridge");
    let store = MemoryStore::default();
    let mut reporter = MockReporter::new();
    reporter.expect_report().never();
    let engine = Engine::new(&runner, &store).with_reporter(&reporter);

    engine
        .add(&[delegate("bridge", None)], "eth0", &context)
        .expect_err("fails");
}

// ---------------------------------------------------------------------------
// DEL
// ---------------------------------------------------------------------------

#[rstest]
fn del_without_record_is_a_no_op(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);

    engine.del(&context).expect("nothing to do");

    assert!(runner.calls().is_empty());
}

#[rstest]
fn del_tears_down_in_reverse_and_removes_record(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);
    engine
        .add(
            &[delegate("bridge", None), delegate("sriov", Some("net1"))],
            "eth0",
            &context,
        )
        .expect("add");

    engine.del(&context).expect("del");

    assert_eq!(
        runner.calls().get(2..).map(<[String]>::to_vec),
        Some(vec![String::from("DEL sriov net1"), String::from("DEL bridge eth0")])
    );
    assert!(store.record(CONTAINER).is_none());
}

#[rstest]
fn partial_del_keeps_only_failed_delegates_for_retry(context: InvocationContext) {
    let runner = RecordingRunner::default().fail_del("ptp");
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);
    engine
        .add(
            &[delegate("bridge", None), delegate("ptp", None), delegate("tap", None)],
            "eth0",
            &context,
        )
        .expect("add");

    let error = engine.del(&context).expect_err("partial failure");

    let EngineError::Teardown { ref message, .. } = error else {
        panic!("expected teardown failure, got {error:?}");
    };
    assert!(message.starts_with("ptp: "), "{message}");
    let pending = store.record(CONTAINER).expect("retry record");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending.first().map(Delegate::display_name), Some("ptp"));

    runner.heal();
    engine.del(&context).expect("retry succeeds");

    assert_eq!(runner.calls().last().map(String::as_str), Some("DEL ptp eth1"));
    assert!(store.record(CONTAINER).is_none());
}

#[rstest]
fn teardown_messages_are_joined(context: InvocationContext) {
    let runner = RecordingRunner::default()
        .fail_del("bridge")
        .fail_del("tap");
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);
    engine
        .add(&[delegate("bridge", None), delegate("tap", None)], "eth0", &context)
        .expect("add");

    let error = engine.del(&context).expect_err("teardown failure");

    let EngineError::Teardown { ref message, .. } = error else {
        panic!("expected teardown failure, got {error:?}");
    };
    assert_eq!(message.split(TEARDOWN_SEPARATOR).count(), 2, "{message}");
    let pending: Vec<_> = store
        .record(CONTAINER)
        .expect("retry record")
        .iter()
        .map(|delegate| delegate.display_name().to_owned())
        .collect();
    assert_eq!(pending, vec!["bridge", "tap"]);
}

#[rstest]
fn del_clears_reported_status(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let mut reporter = MockReporter::new();
    let mut sequence = mockall::Sequence::new();
    reporter
        .expect_report()
        .withf(|statuses| statuses.len() == 1)
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    reporter
        .expect_report()
        .withf(|statuses| statuses.is_empty())
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    let engine = Engine::new(&runner, &store).with_reporter(&reporter);
    engine
        .add(&[delegate("bridge", None)], "eth0", &context)
        .expect("add");

    engine.del(&context).expect("del");
}

#[rstest]
fn partial_del_keeps_status_until_retry_completes(context: InvocationContext) {
    let runner = RecordingRunner::default().fail_del("ptp");
    let store = MemoryStore::default();
    let mut reporter = MockReporter::new();
    let mut sequence = mockall::Sequence::new();
    reporter
        .expect_report()
        .withf(|statuses| statuses.len() == 2)
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    reporter
        .expect_report()
        .withf(|statuses| statuses.is_empty())
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    let engine = Engine::new(&runner, &store).with_reporter(&reporter);
    engine
        .add(&[delegate("bridge", None), delegate("ptp", None)], "eth0", &context)
        .expect("add");

    engine.del(&context).expect_err("ptp teardown fails");
    assert!(store.record(CONTAINER).is_some());

    runner.heal();
    engine.del(&context).expect("retry succeeds");
    assert!(store.record(CONTAINER).is_none());
}

#[rstest]
fn del_without_record_leaves_status_alone(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let mut reporter = MockReporter::new();
    reporter.expect_report().never();
    let engine = Engine::new(&runner, &store).with_reporter(&reporter);

    engine.del(&context).expect("nothing to do");
}

#[rstest]
fn corrupt_record_is_reported(context: InvocationContext) {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    store.save(CONTAINER, b"{not json").expect("seed");
    let engine = Engine::new(&runner, &store);

    let error = engine.del(&context).expect_err("corrupt");

    assert!(matches!(error, EngineError::CorruptRecord { .. }));
    assert!(runner.calls().is_empty());
}

// ---------------------------------------------------------------------------
// GET
// ---------------------------------------------------------------------------

#[rstest]
fn get_returns_previous_result_without_invoking_delegates() {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);
    let previous = json!({
        "cniVersion": "0.4.0",
        "interfaces": [{"name": "eth0", "sandbox": "/var/run/netns/test"}]
    });

    let result = engine.get(Some(&previous), "0.4.0").expect("get");

    assert_eq!(result.interfaces.len(), 1);
    assert!(runner.calls().is_empty());
    assert_eq!(store.saves(), 0);
}

#[rstest]
fn get_without_previous_result_is_empty() {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);

    let result = engine.get(None, "0.3.1").expect("get");

    assert_eq!(result, CniResult::empty("0.3.1"));
}

#[rstest]
fn get_rejects_malformed_previous_result() {
    let runner = RecordingRunner::default();
    let store = MemoryStore::default();
    let engine = Engine::new(&runner, &store);

    let error = engine
        .get(Some(&json!({"interfaces": "eth0"})), "0.4.0")
        .expect_err("malformed");

    assert!(matches!(error, EngineError::InvalidPrevResult { .. }));
}
