//! Process-based plugin execution.
//!
//! [`ProcessExec`] implements the [`PluginExec`] trait by locating the plugin
//! binary in the invocation's search path, spawning it with the protocol
//! environment, writing the configuration to stdin, and collecting stdout.
//! A non-zero exit is interpreted through the plugin's error document when it
//! printed one.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use tracing::debug;

use crate::error::DelegateError;
use crate::protocol::{PluginExec, PluginInvocation};
use crate::result::ErrorDocument;

/// Tracing target for plugin process operations.
const PLUGIN_TARGET: &str = "multinet_delegate::process";

/// Executes plugins by spawning their binaries as child processes.
///
/// Only the protocol variables are added to the child's environment; the
/// parent's own environment is left untouched.
///
/// # Example
///
/// ```rust,no_run
/// use multinet_delegate::process::ProcessExec;
/// use multinet_delegate::protocol::add_single;
/// use multinet_delegate::InvocationContext;
///
/// let context = InvocationContext::new("c0ffee", Some("/var/run/netns/demo".into()))
///     .with_plugin_dirs(vec!["/opt/cni/bin".into()])
///     .for_interface("eth0");
/// let config = br#"{"cniVersion":"0.4.0","name":"lan","type":"bridge"}"#;
/// // let result = add_single(&ProcessExec, "bridge", config, &context);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExec;

impl PluginExec for ProcessExec {
    fn exec(&self, invocation: &PluginInvocation) -> Result<Vec<u8>, DelegateError> {
        let plugin = invocation.plugin_type();
        let executable = find_plugin(plugin, invocation.plugin_dirs())?;

        debug!(
            target: PLUGIN_TARGET,
            plugin,
            executable = %executable.display(),
            command = invocation.env_value("CNI_COMMAND").unwrap_or_default(),
            "spawning plugin process"
        );

        let mut child = Command::new(&executable)
            .envs(invocation.env().iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DelegateError::SpawnFailed {
                plugin: plugin.to_owned(),
                source: Arc::new(source),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(invocation.stdin())
                .and_then(|()| stdin.flush())
                .map_err(|err| DelegateError::io(plugin, err))?;
            // Dropping stdin closes the pipe so the plugin sees end of input.
        }

        let output = child
            .wait_with_output()
            .map_err(|err| DelegateError::io(plugin, err))?;
        interpret_output(plugin, output)
    }
}

/// Finds the executable for `plugin` in `dirs`, first match wins.
///
/// # Errors
///
/// Returns [`DelegateError::PluginNotFound`] when no directory holds a file
/// of that name, or when the name is not a bare file name.
pub fn find_plugin(plugin: &str, dirs: &[PathBuf]) -> Result<PathBuf, DelegateError> {
    let not_found = || DelegateError::PluginNotFound {
        plugin: plugin.to_owned(),
        searched: dirs.to_vec(),
    };
    if plugin.is_empty() || Path::new(plugin).file_name() != Some(OsStr::new(plugin)) {
        return Err(not_found());
    }

    dirs.iter()
        .map(|dir| dir.join(plugin))
        .find(|candidate| candidate.is_file())
        .ok_or_else(not_found)
}

fn interpret_output(plugin: &str, output: Output) -> Result<Vec<u8>, DelegateError> {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
    if !stderr.is_empty() {
        debug!(
            target: PLUGIN_TARGET,
            plugin,
            stderr = %stderr,
            "plugin stderr output"
        );
    }

    debug!(
        target: PLUGIN_TARGET,
        plugin,
        status = ?output.status,
        stdout_bytes = output.stdout.len(),
        "plugin process exited"
    );

    if output.status.success() {
        return Ok(output.stdout);
    }

    match serde_json::from_slice::<ErrorDocument>(&output.stdout) {
        Ok(document) => Err(DelegateError::PluginFailed {
            plugin: plugin.to_owned(),
            code: document.code,
            message: document.describe(),
        }),
        Err(_) => Err(DelegateError::NonZeroExit {
            plugin: plugin.to_owned(),
            status: output.status.code().unwrap_or(-1),
            stderr,
        }),
    }
}
