//! Crate-level test doubles and integration tests.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::DelegateError;
use crate::netns::{NamespaceInspector, NetnsError};
use crate::protocol::{PluginExec, PluginInvocation};


pub(crate) const OK_RESULT: &str = r#"{"cniVersion":"0.4.0","interfaces":[{"name":"eth0","sandbox":"/proc/1/ns/net"}],"ips":[{"version":"4","address":"10.0.0.2/24","interface":0}]}"#;

/// Plugin executor that records invocations and answers from a script.
///
/// Unscripted plugins succeed with [`OK_RESULT`].
#[derive(Default)]
pub(crate) struct ScriptedExec {
    failures: HashMap<(String, String), DelegateError>,
    outputs: HashMap<String, String>,
    calls: RefCell<Vec<PluginInvocation>>,
}

impl ScriptedExec {
    pub(crate) fn fail(mut self, plugin: &str, command: &str) -> Self {
        self.failures.insert(
            (plugin.to_owned(), command.to_owned()),
            DelegateError::PluginFailed {
                plugin: plugin.to_owned(),
                code: 11,
                message: String::from("scripted failure"),
            },
        );
        self
    }

    pub(crate) fn output(mut self, plugin: &str, stdout: &str) -> Self {
        self.outputs.insert(plugin.to_owned(), stdout.to_owned());
        self
    }

    pub(crate) fn calls(&self) -> Vec<PluginInvocation> {
        self.calls.borrow().clone()
    }

    pub(crate) fn call_log(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|call| {
                format!(
                    "{} {}",
                    call.env_value("CNI_COMMAND").unwrap_or_default(),
                    call.plugin_type()
                )
            })
            .collect()
    }
}

impl PluginExec for ScriptedExec {
    fn exec(&self, invocation: &PluginInvocation) -> Result<Vec<u8>, DelegateError> {
        self.calls.borrow_mut().push(invocation.clone());
        let command = invocation.env_value("CNI_COMMAND").unwrap_or_default();
        let key = (invocation.plugin_type().to_owned(), command.to_owned());
        if let Some(error) = self.failures.get(&key) {
            return Err(error.clone());
        }
        if command == "DEL" {
            return Ok(Vec::new());
        }
        Ok(self
            .outputs
            .get(invocation.plugin_type())
            .map_or(OK_RESULT, String::as_str)
            .as_bytes()
            .to_vec())
    }
}

/// Namespace inspector answering from a fixed interface list.
#[derive(Default)]
pub(crate) struct FakeNamespace {
    pub(crate) present: Vec<String>,
    pub(crate) unavailable: bool,
}

impl NamespaceInspector for FakeNamespace {
    fn interface_exists(&self, netns: &str, ifname: &str) -> Result<bool, NetnsError> {
        if self.unavailable {
            return Err(NetnsError::Open {
                netns: netns.to_owned(),
                source: std::sync::Arc::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
            });
        }
        Ok(self.present.iter().any(|name| name == ifname))
    }
}
