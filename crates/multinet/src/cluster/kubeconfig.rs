//! Cluster connection discovery.
//!
//! A [`Connection`] comes either from an explicit kubeconfig file or, when the
//! plugin runs inside a pod, from the service account mounted by the kubelet.
//! Without either, no cluster is used.

use std::fs;
use std::sync::Arc;

use base64::Engine;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tracing::debug;

use super::ClusterError;

const KUBECONFIG_TARGET: &str = "multinet::cluster";

/// Environment variable holding the in-cluster API host.
pub const SERVICE_HOST_VAR: &str = "KUBERNETES_SERVICE_HOST";
/// Environment variable holding the in-cluster API port.
pub const SERVICE_PORT_VAR: &str = "KUBERNETES_SERVICE_PORT";
/// Directory holding the mounted service-account credentials.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Everything needed to reach the API server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connection {
    server: String,
    ca_pem: Option<Vec<u8>>,
    insecure: bool,
    token: Option<String>,
    identity_pem: Option<Vec<u8>>,
}

impl Connection {
    /// API server base URL.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// PEM bundle of trusted certificate authorities.
    #[must_use]
    pub fn ca_pem(&self) -> Option<&[u8]> {
        self.ca_pem.as_deref()
    }

    /// Whether server certificate verification is disabled.
    #[must_use]
    pub const fn insecure(&self) -> bool {
        self.insecure
    }

    /// Bearer token.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// PEM client certificate followed by its private key.
    #[must_use]
    pub fn identity_pem(&self) -> Option<&[u8]> {
        self.identity_pem.as_deref()
    }

    /// Builds a connection from the current context of a kubeconfig file.
    ///
    /// Relative credential paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] when the file cannot be read or parsed, or
    /// its current context is incomplete.
    pub fn from_kubeconfig(path: &Utf8Path) -> Result<Self, ClusterError> {
        let text = read_to_string(path)?;
        let config: KubeConfig =
            serde_yaml::from_str(&text).map_err(|source| ClusterError::Kubeconfig {
                path: path.to_path_buf(),
                source: Arc::new(source),
            })?;
        let base = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        config.connection(base)
    }

    /// Builds a connection from the service account mounted into a pod.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] when the token cannot be read.
    pub fn in_cluster(host: &str, port: &str, account_dir: &Utf8Path) -> Result<Self, ClusterError> {
        let server = if host.contains(':') {
            format!("https://[{host}]:{port}")
        } else {
            format!("https://{host}:{port}")
        };
        let token = read_to_string(&account_dir.join("token"))?.trim().to_owned();
        let ca_path = account_dir.join("ca.crt");
        let ca_pem = if ca_path.is_file() {
            Some(read(&ca_path)?)
        } else {
            None
        };
        Ok(Self {
            server,
            ca_pem,
            insecure: false,
            token: Some(token),
            identity_pem: None,
        })
    }
}

/// Chooses the cluster connection for this invocation.
///
/// An explicit kubeconfig wins; otherwise the in-cluster service account is
/// used when `lookup` yields both service variables. `Ok(None)` means no
/// cluster is available.
///
/// # Errors
///
/// Returns a [`ClusterError`] when the chosen source is unusable.
pub fn discover_connection<F>(
    kubeconfig: Option<&Utf8Path>,
    account_dir: &Utf8Path,
    lookup: F,
) -> Result<Option<Connection>, ClusterError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = kubeconfig {
        debug!(target: KUBECONFIG_TARGET, path = %path, "using kubeconfig");
        return Connection::from_kubeconfig(path).map(Some);
    }
    let host = lookup(SERVICE_HOST_VAR).filter(|value| !value.is_empty());
    let port = lookup(SERVICE_PORT_VAR).filter(|value| !value.is_empty());
    match (host, port) {
        (Some(service_host), Some(service_port)) => {
            debug!(target: KUBECONFIG_TARGET, host = %service_host, "using in-cluster service account");
            Connection::in_cluster(&service_host, &service_port, account_dir).map(Some)
        }
        _ => Ok(None),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct KubeConfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    current_context: String,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    #[serde(default)]
    certificate_authority: Option<Utf8PathBuf>,
    #[serde(default)]
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    #[serde(default)]
    token: Option<String>,
    #[serde(default, rename = "tokenFile")]
    token_file: Option<Utf8PathBuf>,
    #[serde(default)]
    client_certificate: Option<Utf8PathBuf>,
    #[serde(default)]
    client_certificate_data: Option<String>,
    #[serde(default)]
    client_key: Option<Utf8PathBuf>,
    #[serde(default)]
    client_key_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    #[serde(default)]
    user: String,
}

impl KubeConfig {
    fn connection(&self, base: &Utf8Path) -> Result<Connection, ClusterError> {
        let context = self
            .contexts
            .iter()
            .find(|context| context.name == self.current_context)
            .ok_or_else(|| ClusterError::Config {
                message: format!("current context '{}' is not defined", self.current_context),
            })?;
        let cluster = self
            .clusters
            .iter()
            .find(|cluster| cluster.name == context.context.cluster)
            .map(|named| &named.cluster)
            .ok_or_else(|| ClusterError::Config {
                message: format!("cluster '{}' is not defined", context.context.cluster),
            })?;
        let default_user = UserEntry::default();
        let user = self
            .users
            .iter()
            .find(|user| user.name == context.context.user)
            .map_or(&default_user, |named| &named.user);

        if cluster.server.is_empty() {
            return Err(ClusterError::Config {
                message: format!("cluster '{}' has no server", context.context.cluster),
            });
        }

        let ca_pem = credential(
            "certificate-authority-data",
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base,
        )?;
        let certificate = credential(
            "client-certificate-data",
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            base,
        )?;
        let key = credential(
            "client-key-data",
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            base,
        )?;
        let identity_pem = match (certificate, key) {
            (Some(mut pem), Some(key_pem)) => {
                pem.push(b'\n');
                pem.extend_from_slice(&key_pem);
                Some(pem)
            }
            (None, None) => None,
            _ => {
                return Err(ClusterError::Config {
                    message: String::from("client certificate and key must be given together"),
                });
            }
        };
        let token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(file)) => Some(read_to_string(&resolve(base, file))?.trim().to_owned()),
            (None, None) => None,
        };

        Ok(Connection {
            server: cluster.server.trim_end_matches('/').to_owned(),
            ca_pem,
            insecure: cluster.insecure_skip_tls_verify,
            token,
            identity_pem,
        })
    }
}

/// Returns inline base64 data when present, else the referenced file.
fn credential(
    field: &'static str,
    data: Option<&str>,
    file: Option<&Utf8Path>,
    base: &Utf8Path,
) -> Result<Option<Vec<u8>>, ClusterError> {
    if let Some(encoded) = data {
        return base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map(Some)
            .map_err(|source| ClusterError::Base64 { field, source });
    }
    file.map(|path| read(&resolve(base, path))).transpose()
}

fn resolve(base: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn read(path: &Utf8Path) -> Result<Vec<u8>, ClusterError> {
    fs::read(path).map_err(|source| ClusterError::Read {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })
}

fn read_to_string(path: &Utf8Path) -> Result<String, ClusterError> {
    fs::read_to_string(path).map_err(|source| ClusterError::Read {
        path: path.to_path_buf(),
        source: Arc::new(source),
    })
}
