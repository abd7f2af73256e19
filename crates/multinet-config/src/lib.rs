//! Configuration surface for the `multinet` meta plugin.
//!
//! A container runtime invokes `multinet` with two inputs: a set of `CNI_*`
//! environment variables describing the target container, and a network
//! configuration document on stdin. This crate turns both into typed values:
//!
//! - [`PluginEnvironment`] reads the environment through a `clap` parser and
//!   exposes the requested [`Command`] together with the parsed
//!   [`RuntimeArgs`].
//! - [`NetConf`] deserialises the stdin document and applies the directory
//!   defaults from [`defaults`].
//! - [`parse_network_selection`] understands the network selection strings
//!   used by both the `defaultDelegates` field and the pod annotation.
//! - [`find_network_config`] resolves a network name against the files in the
//!   configuration directory.
//!
//! Nothing in this crate executes delegates; it only produces the inputs the
//! orchestration engine consumes.

pub mod conf_dir;
pub mod defaults;
pub mod environment;
mod error;
pub mod logging;
pub mod netconf;
pub mod selection;

pub use conf_dir::find_network_config;
pub use environment::{Command, PluginEnvironment, RuntimeArgs};
pub use error::ConfigError;
pub use logging::{LogFormat, LogFormatParseError};
pub use netconf::NetConf;
pub use selection::{NetworkSelection, parse_network_selection};
