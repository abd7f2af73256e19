//! Command dispatch for one plugin invocation.
//!
//! [`run`] is the whole process contract: it reads the `CNI_*` variables and
//! the network configuration, serves ADD, DEL, GET or VERSION, and writes
//! either the reply or an error document to stdout. Diagnostics that cannot
//! go through telemetry are written to stderr.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8Path;
use multinet_config::{Command, NetConf, PluginEnvironment, RuntimeArgs};
use multinet_delegate::netns::HostNamespaceInspector;
use multinet_delegate::process::ProcessExec;
use multinet_delegate::{DelegateInvoker, InvocationContext};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cluster::kubeconfig::SERVICE_ACCOUNT_DIR;
use crate::cluster::{KubeClient, PodClient, discover_connection};
use crate::engine::Engine;
use crate::error::CommandError;
use crate::report::PodStatusReporter;
use crate::resolve::{ResolveError, resolve_delegates};
use crate::store::FileStore;
use crate::telemetry;

const COMMAND_TARGET: &str = "multinet::command";

/// Protocol version used for replies that have no configuration to follow.
pub const CURRENT_VERSION: &str = "0.4.0";

/// Protocol versions this plugin accepts.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.4.0"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo<'a> {
    cni_version: &'a str,
    supported_versions: &'a [&'a str],
}

/// A failed invocation together with the version its error document uses.
struct Failure {
    error: CommandError,
    cni_version: String,
}

impl Failure {
    fn new(error: CommandError, cni_version: &str) -> Self {
        let version = if cni_version.is_empty() {
            CURRENT_VERSION
        } else {
            cni_version
        };
        Self {
            error,
            cni_version: version.to_owned(),
        }
    }

    fn current(error: impl Into<CommandError>) -> Self {
        Self::new(error.into(), CURRENT_VERSION)
    }
}

/// Serves one invocation and returns the process exit code.
///
/// `vars` is the process environment; only the `CNI_*` variables and the
/// in-cluster service variables are consulted.
///
/// # Examples
///
/// ```
/// use std::process::ExitCode;
///
/// let vars = [(String::from("CNI_COMMAND"), String::from("VERSION"))];
/// let mut stdout = Vec::new();
/// let mut stderr = Vec::new();
/// let exit = multinet::run(vars, &mut std::io::empty(), &mut stdout, &mut stderr);
///
/// assert_eq!(exit, ExitCode::SUCCESS);
/// assert!(String::from_utf8_lossy(&stdout).contains("supportedVersions"));
/// ```
pub fn run<I, R, W, E>(vars: I, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = (String, String)>,
    R: Read,
    W: Write,
    E: Write,
{
    let variables: BTreeMap<String, String> = vars.into_iter().collect();
    match serve(&variables, stdin, stderr) {
        Ok(reply) => match write_reply(stdout, reply.as_deref()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(write_error) => {
                writeln!(stderr, "multinet: {write_error}").ok();
                ExitCode::FAILURE
            }
        },
        Err(failure) => {
            error!(
                target: COMMAND_TARGET,
                code = failure.error.code(),
                error = %failure.error,
                "invocation failed"
            );
            let document = failure.error.to_document(&failure.cni_version);
            let written = serde_json::to_vec_pretty(&document)
                .map_err(CommandError::from)
                .and_then(|bytes| write_reply(stdout, Some(&bytes)));
            if let Err(write_error) = written {
                writeln!(stderr, "multinet: {write_error}").ok();
            }
            ExitCode::FAILURE
        }
    }
}

fn serve<R: Read, E: Write>(
    variables: &BTreeMap<String, String>,
    stdin: &mut R,
    stderr: &mut E,
) -> Result<Option<Vec<u8>>, Failure> {
    let environment = PluginEnvironment::from_vars(
        variables
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    )
    .map_err(|error| Failure::current(CommandError::Environment(error)))?;

    if environment.command() == Command::Version {
        return version_document().map(Some).map_err(Failure::current);
    }

    let mut input = Vec::new();
    stdin.read_to_end(&mut input).map_err(Failure::current)?;
    let netconf =
        NetConf::parse(&input).map_err(|error| Failure::current(CommandError::Config(error)))?;
    if let Err(telemetry_error) = telemetry::initialise(&netconf) {
        writeln!(stderr, "multinet: logging disabled: {telemetry_error}").ok();
    }

    let lookup = |name: &str| variables.get(name).cloned();
    dispatch(&environment, &netconf, &lookup)
        .map_err(|error| Failure::new(error, netconf.cni_version()))
}

fn dispatch(
    environment: &PluginEnvironment,
    netconf: &NetConf,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<Vec<u8>>, CommandError> {
    check_version(netconf.cni_version())?;
    info!(
        target: COMMAND_TARGET,
        command = %environment.command(),
        container_id = environment.container_id().unwrap_or_default(),
        network = netconf.name(),
        "serving invocation"
    );
    match environment.command() {
        Command::Add => add(environment, netconf, lookup).map(Some),
        Command::Del => del(environment, netconf, lookup).map(|()| None),
        Command::Get => get(environment, netconf).map(Some),
        Command::Version => version_document().map(Some),
    }
}

fn add(
    environment: &PluginEnvironment,
    netconf: &NetConf,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<u8>, CommandError> {
    let container_id = environment
        .require_container_id()
        .map_err(CommandError::Environment)?;
    let netns = environment
        .require_netns()
        .map_err(CommandError::Environment)?;
    let ifname = environment
        .require_ifname()
        .map_err(CommandError::Environment)?;

    let cluster = connect_cluster(netconf, lookup)?;
    let pods = cluster.as_ref().map(|client| client as &dyn PodClient);
    let delegates = resolve_delegates(netconf, environment.args(), pods)?;
    let context = invocation_context(environment, netconf, container_id, Some(netns.to_owned()));
    let reporter = pod_reporter(cluster.as_ref(), environment.args());

    let mut engine = Engine::new(invoker(), FileStore::new(netconf.cni_dir()));
    if let Some(status_reporter) = &reporter {
        engine = engine.with_reporter(status_reporter);
    }
    let result = engine.add(&delegates, ifname, &context)?;
    Ok(serde_json::to_vec_pretty(&result)?)
}

fn del(
    environment: &PluginEnvironment,
    netconf: &NetConf,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<(), CommandError> {
    let container_id = environment
        .require_container_id()
        .map_err(CommandError::Environment)?;
    environment
        .require_ifname()
        .map_err(CommandError::Environment)?;
    let netns = environment.netns().map(str::to_owned);

    // Teardown must not depend on the cluster being reachable.
    let cluster = connect_cluster(netconf, lookup).unwrap_or_else(|connect_error| {
        warn!(
            target: COMMAND_TARGET,
            error = %connect_error,
            "cluster unavailable; network status will not be cleared"
        );
        None
    });
    let context = invocation_context(environment, netconf, container_id, netns);
    let reporter = pod_reporter(cluster.as_ref(), environment.args());

    let mut engine = Engine::new(invoker(), FileStore::new(netconf.cni_dir()));
    if let Some(status_reporter) = &reporter {
        engine = engine.with_reporter(status_reporter);
    }
    engine.del(&context)?;
    Ok(())
}

fn get(environment: &PluginEnvironment, netconf: &NetConf) -> Result<Vec<u8>, CommandError> {
    environment
        .require_container_id()
        .map_err(CommandError::Environment)?;
    let engine = Engine::new(invoker(), FileStore::new(netconf.cni_dir()));
    let result = engine.get(netconf.prev_result(), version_or_current(netconf.cni_version()))?;
    Ok(serde_json::to_vec_pretty(&result)?)
}

fn version_document() -> Result<Vec<u8>, CommandError> {
    Ok(serde_json::to_vec(&VersionInfo {
        cni_version: CURRENT_VERSION,
        supported_versions: SUPPORTED_VERSIONS,
    })?)
}

fn check_version(version: &str) -> Result<(), CommandError> {
    if version.is_empty() || SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(CommandError::IncompatibleVersion {
            version: version.to_owned(),
        })
    }
}

const fn version_or_current(version: &str) -> &str {
    if version.is_empty() {
        CURRENT_VERSION
    } else {
        version
    }
}

const fn invoker() -> DelegateInvoker<ProcessExec, HostNamespaceInspector> {
    DelegateInvoker::new(ProcessExec, HostNamespaceInspector)
}

fn connect_cluster(
    netconf: &NetConf,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Option<KubeClient>, CommandError> {
    let connection = discover_connection(
        netconf.kubeconfig(),
        Utf8Path::new(SERVICE_ACCOUNT_DIR),
        lookup,
    )
    .map_err(ResolveError::from)?;
    connection
        .as_ref()
        .map(KubeClient::connect)
        .transpose()
        .map_err(|error| ResolveError::from(error).into())
}

fn pod_reporter<'a>(
    cluster: Option<&'a KubeClient>,
    args: &RuntimeArgs,
) -> Option<PodStatusReporter<&'a KubeClient>> {
    let client = cluster?;
    let namespace = args.pod_namespace()?;
    let name = args.pod_name()?;
    Some(PodStatusReporter::new(client, namespace, name))
}

/// Builds the execution context shared by every delegate of this invocation.
fn invocation_context(
    environment: &PluginEnvironment,
    netconf: &NetConf,
    container_id: &str,
    netns: Option<String>,
) -> InvocationContext {
    let runtime_args = environment.args();
    let mut args = vec![(String::from("IgnoreUnknown"), String::from("1"))];
    for (key, value) in [
        ("K8S_POD_NAMESPACE", runtime_args.pod_namespace()),
        ("K8S_POD_NAME", runtime_args.pod_name()),
        ("K8S_POD_INFRA_CONTAINER_ID", runtime_args.infra_container_id()),
    ] {
        if let Some(present) = value {
            args.push((key.to_owned(), present.to_owned()));
        }
    }

    let plugin_dirs: Vec<PathBuf> = environment
        .path()
        .iter()
        .map(|dir| dir.as_std_path().to_path_buf())
        .chain(std::iter::once(netconf.bin_dir().as_std_path().to_path_buf()))
        .collect();

    InvocationContext::new(container_id, netns)
        .with_args(args)
        .with_capability_args(netconf.runtime_config().cloned())
        .with_plugin_dirs(plugin_dirs)
}

fn write_reply<W: Write>(stdout: &mut W, reply: Option<&[u8]>) -> Result<(), CommandError> {
    if let Some(bytes) = reply {
        stdout.write_all(bytes)?;
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests;
