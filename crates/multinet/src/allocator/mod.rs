//! Interface name allocation.
//!
//! [`allocate`] gives every delegate a unique interface name and marks
//! exactly one of them as master: the delegate that ends up with the caller's
//! primary interface name. Delegates keep explicit requests; the first
//! delegate without one takes the caller's name, and the rest are numbered
//! `eth<N>` after the highest `eth` suffix already in use. Suffixes that do
//! not fit a `u32` take no part in numbering.
//!
//! Allocation is a pure function. It never mutates its input and returns the
//! same output for the same input, so a retried ADD resolves identically.

use std::collections::HashMap;

use multinet_delegate::Delegate;
use thiserror::Error;
use tracing::debug;

/// Tracing target for interface allocation.
const ALLOCATOR_TARGET: &str = "multinet::allocator";

/// Prefix of automatically generated interface names.
pub const INTERFACE_PREFIX: &str = "eth";

/// Errors raised while allocating interface names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Two delegates request the same interface name.
    #[error("interface name '{ifname}' is requested by delegates {first} and {second}")]
    NamingConflict {
        /// Duplicated name.
        ifname: String,
        /// Index of the first delegate requesting it.
        first: usize,
        /// Index of the second delegate requesting it.
        second: usize,
    },

    /// Every delegate requests an explicit name other than the caller's.
    #[error("no delegate is free to take the caller's interface name '{ifname}'")]
    NoSlotForCallerInterface {
        /// Caller's primary interface name.
        ifname: String,
    },
}

/// Delegates with their allocated interface names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    delegates: Vec<Delegate>,
    master: usize,
}

impl Allocation {
    /// Allocated delegates, in their original order.
    #[must_use]
    pub fn delegates(&self) -> &[Delegate] {
        &self.delegates
    }

    /// Index of the master delegate.
    #[must_use]
    pub const fn master(&self) -> usize {
        self.master
    }
}

/// Allocates interface names for `delegates`.
///
/// # Errors
///
/// Returns [`AllocationError::NamingConflict`] when two delegates request the
/// same name, or [`AllocationError::NoSlotForCallerInterface`] when no
/// delegate can take `caller_ifname`.
///
/// # Example
///
/// ```
/// use multinet::allocator::allocate;
/// use multinet_delegate::Delegate;
///
/// let bridge = Delegate::from_config(br#"{"name":"lan","type":"bridge"}"#).expect("bridge");
/// let sriov = Delegate::from_config(br#"{"name":"fast","type":"sriov"}"#)
///     .expect("sriov")
///     .with_ifname_request(Some("net1".into()));
///
/// let allocation = allocate(&[bridge, sriov], "eth0").expect("allocates");
/// let names: Vec<_> = allocation
///     .delegates()
///     .iter()
///     .map(|delegate| delegate.ifname_request().unwrap_or_default())
///     .collect();
/// assert_eq!(names, ["eth0", "net1"]);
/// assert_eq!(allocation.master(), 0);
/// ```
pub fn allocate(delegates: &[Delegate], caller_ifname: &str) -> Result<Allocation, AllocationError> {
    let mut names: Vec<Option<String>> = delegates
        .iter()
        .map(|delegate| delegate.ifname_request().map(str::to_owned))
        .collect();

    let mut claimed: HashMap<&str, usize> = HashMap::new();
    for (index, name) in delegates
        .iter()
        .enumerate()
        .filter_map(|(index, delegate)| delegate.ifname_request().map(|name| (index, name)))
    {
        if let Some(first) = claimed.insert(name, index) {
            return Err(AllocationError::NamingConflict {
                ifname: name.to_owned(),
                first,
                second: index,
            });
        }
    }

    let master = match claimed.get(caller_ifname) {
        Some(index) => *index,
        None => {
            let free = names
                .iter_mut()
                .enumerate()
                .find(|(_, name)| name.is_none())
                .ok_or_else(|| AllocationError::NoSlotForCallerInterface {
                    ifname: caller_ifname.to_owned(),
                })?;
            *free.1 = Some(caller_ifname.to_owned());
            free.0
        }
    };

    let mut next = highest_suffix(names.iter().flatten());
    let allocated = delegates
        .iter()
        .zip(names)
        .enumerate()
        .map(|(index, (delegate, name))| {
            let ifname = name.unwrap_or_else(|| {
                next += 1;
                format!("{INTERFACE_PREFIX}{next}")
            });
            delegate
                .clone()
                .with_ifname_request(Some(ifname))
                .with_master(index == master)
        })
        .collect();

    Ok(Allocation {
        delegates: allocated,
        master,
    })
}

fn highest_suffix<'a>(names: impl Iterator<Item = &'a String>) -> u64 {
    names
        .filter_map(|name| {
            let suffix = name
                .strip_prefix(INTERFACE_PREFIX)
                .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|digits| digits.parse::<u32>().ok());
            if suffix.is_none() {
                debug!(
                    target: ALLOCATOR_TARGET,
                    ifname = name.as_str(),
                    "interface name has no usable numeric suffix; ignoring for numbering"
                );
            }
            suffix.map(u64::from)
        })
        .max()
        .unwrap_or(0)
}
