//! Blocking HTTP implementation of [`PodClient`].

use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use super::kubeconfig::Connection;
use super::{ClusterError, Pod, PodClient};

const CLIENT_TARGET: &str = "multinet::cluster";

/// Upper bound for one API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Characters escaped in URL path segments.
const SEGMENT_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'%');

/// Pod client talking to the API server over HTTPS.
#[derive(Debug, Clone)]
pub struct KubeClient {
    http: Client,
    server: String,
}

impl KubeClient {
    /// Builds a client for `connection`.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] when the credentials are not valid PEM or a
    /// token cannot be used as a header.
    pub fn connect(connection: &Connection) -> Result<Self, ClusterError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = connection.token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                ClusterError::Config {
                    message: String::from("bearer token is not a valid header value"),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .danger_accept_invalid_certs(connection.insecure());
        if let Some(pem) = connection.ca_pem() {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }
        if let Some(pem) = connection.identity_pem() {
            builder = builder.identity(reqwest::Identity::from_pem(pem)?);
        }

        Ok(Self {
            http: builder.build()?,
            server: connection.server().to_owned(),
        })
    }

    fn pod_url(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/pods/{}",
            self.server,
            utf8_percent_encode(namespace, SEGMENT_ESCAPES),
            utf8_percent_encode(name, SEGMENT_ESCAPES)
        )
    }

    fn send(request: RequestBuilder, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        let response = request.send()?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(ClusterError::Conflict {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(ClusterError::Status {
                status: status.as_u16(),
                message: body_text(response),
            });
        }
        let body = response.bytes()?;
        serde_json::from_slice(&body).map_err(|source| ClusterError::Decode {
            source: std::sync::Arc::new(source),
        })
    }
}

impl PodClient for KubeClient {
    fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        let url = self.pod_url(namespace, name);
        debug!(target: CLIENT_TARGET, %url, "fetching pod");
        Self::send(self.http.get(url), namespace, name)
    }

    fn update_pod_status(&self, pod: &Pod) -> Result<Pod, ClusterError> {
        let namespace = pod.metadata.namespace.as_str();
        let name = pod.metadata.name.as_str();
        let url = format!("{}/status", self.pod_url(namespace, name));
        debug!(target: CLIENT_TARGET, %url, "updating pod status");
        Self::send(self.http.put(url).json(pod), namespace, name)
    }
}

fn body_text(response: Response) -> String {
    response
        .text()
        .map(|text| text.trim().to_owned())
        .unwrap_or_default()
}
