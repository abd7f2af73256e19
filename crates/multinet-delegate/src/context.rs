//! Per-invocation execution context.
//!
//! The plugin execution protocol communicates the operation, container, and
//! interface through environment variables of the *child* process. Those
//! values live here as plain fields and are rendered into a child
//! environment by [`InvocationContext::protocol_env`]; the parent process
//! environment is never touched.

use std::path::PathBuf;

use serde_json::{Map, Value};

/// Operation performed on a delegate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Attach the network.
    Add,
    /// Detach the network.
    Del,
}

impl Operation {
    /// Value of `CNI_COMMAND` for this operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Del => "DEL",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime values shared by every delegate of one invocation.
///
/// # Example
///
/// ```
/// use multinet_delegate::{InvocationContext, Operation};
///
/// let context = InvocationContext::new("c0ffee", Some("/var/run/netns/pod".into()))
///     .with_args(vec![("IgnoreUnknown".into(), "1".into())])
///     .for_interface("net1");
/// let env = context.protocol_env(Operation::Add);
/// assert!(env.contains(&("CNI_IFNAME".to_owned(), "net1".to_owned())));
/// assert!(env.contains(&("CNI_ARGS".to_owned(), "IgnoreUnknown=1".to_owned())));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationContext {
    container_id: String,
    netns: Option<String>,
    ifname: String,
    args: Vec<(String, String)>,
    capability_args: Option<Map<String, Value>>,
    plugin_dirs: Vec<PathBuf>,
}

impl InvocationContext {
    /// Creates a context for `container_id` in the namespace at `netns`.
    #[must_use]
    pub fn new(container_id: impl Into<String>, netns: Option<String>) -> Self {
        Self {
            container_id: container_id.into(),
            netns,
            ..Self::default()
        }
    }

    /// Sets the ordered `CNI_ARGS` pairs.
    #[must_use]
    pub fn with_args(mut self, args: Vec<(String, String)>) -> Self {
        self.args = args;
        self
    }

    /// Sets the capability arguments offered to plugins that declare them.
    #[must_use]
    pub fn with_capability_args(mut self, capability_args: Option<Map<String, Value>>) -> Self {
        self.capability_args = capability_args;
        self
    }

    /// Sets the directories searched for plugin executables.
    #[must_use]
    pub fn with_plugin_dirs(mut self, plugin_dirs: Vec<PathBuf>) -> Self {
        self.plugin_dirs = plugin_dirs;
        self
    }

    /// Returns a copy targeting `ifname`.
    #[must_use]
    pub fn for_interface(&self, ifname: &str) -> Self {
        Self {
            ifname: ifname.to_owned(),
            ..self.clone()
        }
    }

    /// Returns a copy with `extra` appended to the `CNI_ARGS` pairs.
    #[must_use]
    pub fn with_extra_args(&self, extra: Vec<(String, String)>) -> Self {
        let mut copy = self.clone();
        copy.args.extend(extra);
        copy
    }

    /// Container identifier.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Network namespace path.
    #[must_use]
    pub fn netns(&self) -> Option<&str> {
        self.netns.as_deref()
    }

    /// Current interface name.
    #[must_use]
    pub fn ifname(&self) -> &str {
        &self.ifname
    }

    /// Ordered `CNI_ARGS` pairs.
    #[must_use]
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Capability arguments.
    #[must_use]
    pub const fn capability_args(&self) -> Option<&Map<String, Value>> {
        self.capability_args.as_ref()
    }

    /// Directories searched for plugin executables.
    #[must_use]
    pub fn plugin_dirs(&self) -> &[PathBuf] {
        &self.plugin_dirs
    }

    /// Renders the protocol environment for a child plugin process.
    #[must_use]
    pub fn protocol_env(&self, operation: Operation) -> Vec<(String, String)> {
        let args = self
            .args
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(";");
        let path = self
            .plugin_dirs
            .iter()
            .map(|dir| dir.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(":");

        vec![
            (String::from("CNI_COMMAND"), operation.as_str().to_owned()),
            (String::from("CNI_CONTAINERID"), self.container_id.clone()),
            (
                String::from("CNI_NETNS"),
                self.netns.clone().unwrap_or_default(),
            ),
            (String::from("CNI_IFNAME"), self.ifname.clone()),
            (String::from("CNI_ARGS"), args),
            (String::from("CNI_PATH"), path),
        ]
    }
}
