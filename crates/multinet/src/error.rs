//! Error types for orchestration and command dispatch.
//!
//! [`EngineError`] covers the ADD/DEL/GET state machine. [`CommandError`]
//! wraps everything that can fail while serving one plugin invocation and
//! maps it onto the numeric codes of the protocol's error document.

use std::io;
use std::sync::Arc;

use multinet_config::ConfigError;
use multinet_delegate::{DelegateError, ErrorDocument};
use thiserror::Error;

use crate::allocator::AllocationError;
use crate::resolve::ResolveError;
use crate::store::StoreError;

/// Incompatible protocol version.
pub const CODE_INCOMPATIBLE_VERSION: u32 = 1;
/// Invalid or missing environment variables.
pub const CODE_INVALID_ENVIRONMENT: u32 = 4;
/// I/O failure.
pub const CODE_IO_FAILURE: u32 = 5;
/// Failure decoding content.
pub const CODE_DECODING_FAILURE: u32 = 6;
/// Invalid network configuration.
pub const CODE_INVALID_NETWORK_CONFIG: u32 = 7;
/// A delegate failed.
pub const CODE_DELEGATE_FAILURE: u32 = 100;
/// Interface names could not be allocated.
pub const CODE_ALLOCATION_FAILURE: u32 = 101;
/// The delegate record could not be persisted or read.
pub const CODE_STORE_FAILURE: u32 = 102;

/// Errors raised by the orchestration engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Neither static configuration nor the cluster supplied a delegate.
    #[error("no delegates are configured for this network")]
    NoDelegatesConfigured,

    /// Interface names could not be allocated.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// A delegate failed during ADD; earlier delegates were rolled back.
    #[error("delegate {index} ('{delegate}') failed to add interface '{ifname}': {source}")]
    DelegateAdd {
        /// Position of the failing delegate.
        index: usize,
        /// Plugin type or list name of the failing delegate.
        delegate: String,
        /// Interface the delegate was adding.
        ifname: String,
        /// Underlying delegate error.
        #[source]
        source: Box<DelegateError>,
    },

    /// One or more delegates failed during DEL; a retry record was kept.
    #[error("teardown failed for container '{container_id}': {message}")]
    Teardown {
        /// Container identifier.
        container_id: String,
        /// Per-delegate failures joined by `"; "`.
        message: String,
    },

    /// The delegate store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The persisted record exists but cannot be decoded.
    #[error("delegate record for container '{container_id}' is corrupt: {source}")]
    CorruptRecord {
        /// Container identifier.
        container_id: String,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The delegate list could not be encoded for storage.
    #[error("failed to encode delegate record: {source}")]
    Encode {
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// The previous result supplied to GET is not a result document.
    #[error("invalid previous result: {source}")]
    InvalidPrevResult {
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl EngineError {
    /// Numeric protocol error code for this failure.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::NoDelegatesConfigured => CODE_INVALID_NETWORK_CONFIG,
            Self::Allocation(_) => CODE_ALLOCATION_FAILURE,
            Self::DelegateAdd { .. } | Self::Teardown { .. } => CODE_DELEGATE_FAILURE,
            Self::Store(_) => CODE_STORE_FAILURE,
            Self::CorruptRecord { .. } | Self::InvalidPrevResult { .. } => CODE_DECODING_FAILURE,
            Self::Encode { .. } => CODE_IO_FAILURE,
        }
    }
}

/// Errors raised while serving one plugin invocation.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// The process environment is invalid.
    #[error("invalid plugin environment: {0}")]
    Environment(#[source] ConfigError),

    /// The network configuration on stdin is invalid.
    #[error("invalid network configuration: {0}")]
    Config(#[source] ConfigError),

    /// The requested protocol version is not supported.
    #[error("unsupported CNI version '{version}'")]
    IncompatibleVersion {
        /// Version requested by the configuration.
        version: String,
    },

    /// The delegate list could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Orchestration failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Reading stdin or writing stdout failed.
    #[error("plugin I/O failed: {0}")]
    Io(#[source] Arc<io::Error>),

    /// Encoding the output document failed.
    #[error("failed to encode output: {0}")]
    Encode(#[source] Arc<serde_json::Error>),
}

impl From<io::Error> for CommandError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(error: serde_json::Error) -> Self {
        Self::Encode(Arc::new(error))
    }
}

impl CommandError {
    /// Numeric protocol error code for this failure.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Environment(_) => CODE_INVALID_ENVIRONMENT,
            Self::Config(ConfigError::Parse { .. }) => CODE_DECODING_FAILURE,
            Self::Config(_) => CODE_INVALID_NETWORK_CONFIG,
            Self::IncompatibleVersion { .. } => CODE_INCOMPATIBLE_VERSION,
            Self::Resolve(error) => error.code(),
            Self::Engine(error) => error.code(),
            Self::Io(_) | Self::Encode(_) => CODE_IO_FAILURE,
        }
    }

    /// Renders the failure as a protocol error document.
    #[must_use]
    pub fn to_document(&self, cni_version: &str) -> ErrorDocument {
        let details = std::error::Error::source(self)
            .map(ToString::to_string)
            .unwrap_or_default();
        ErrorDocument::new(cni_version, self.code(), self.to_string(), details)
    }
}
