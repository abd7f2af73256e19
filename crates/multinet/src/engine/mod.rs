//! Orchestration engine.
//!
//! The [`Engine`] drives the ADD, DEL and GET operations over a resolved
//! delegate list:
//!
//! - **ADD** allocates interface names, persists the allocated list, then adds
//!   delegates one at a time in order. When delegate `k` fails, delegates
//!   `k-1..=0` are deleted in reverse, the record is removed, and the original
//!   failure is returned. Rollback is best effort: its own failures are only
//!   logged, and the record is removed even when some rollback DEL failed,
//!   leaving any leftover state to the runtime's DEL retry.
//! - **DEL** loads the persisted list and deletes every delegate in reverse
//!   order. A missing record is success. The reported status is cleared only
//!   once every delegate is gone; failed delegates are written back as the
//!   new record so a retry only targets the remaining work.
//! - **GET** returns the previous result without invoking any delegate.
//!
//! Delegates run strictly sequentially: later delegates may depend on state
//! created by earlier ones inside the same namespace.

use std::sync::Arc;

use multinet_delegate::{CniResult, Delegate, DelegateRunner, InvocationContext, NetworkStatus};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::allocator::allocate;
use crate::error::EngineError;
use crate::report::StatusReporter;
use crate::store::{DelegateStore, StoreError};

/// Tracing target for orchestration.
const ENGINE_TARGET: &str = "multinet::engine";

/// Separator between per-delegate messages of a teardown failure.
pub const TEARDOWN_SEPARATOR: &str = "; ";

/// ADD/DEL/GET state machine over a delegate runner and a record store.
pub struct Engine<'a, R, S> {
    runner: R,
    store: S,
    reporter: Option<&'a dyn StatusReporter>,
}

impl<'a, R: DelegateRunner, S: DelegateStore> Engine<'a, R, S> {
    /// Creates an engine without status reporting.
    pub const fn new(runner: R, store: S) -> Self {
        Self {
            runner,
            store,
            reporter: None,
        }
    }

    /// Reports attachment status through `reporter` after a successful ADD
    /// and clears it once every recorded delegate has been torn down.
    #[must_use]
    pub fn with_reporter(mut self, reporter: &'a dyn StatusReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Attaches every delegate and returns the master delegate's result.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NoDelegatesConfigured`] for an empty list,
    /// [`EngineError::Allocation`] when names cannot be allocated,
    /// [`EngineError::Store`] when the record cannot be written, and
    /// [`EngineError::DelegateAdd`] when a delegate fails.
    pub fn add(
        &self,
        delegates: &[Delegate],
        caller_ifname: &str,
        context: &InvocationContext,
    ) -> Result<CniResult, EngineError> {
        if delegates.is_empty() {
            return Err(EngineError::NoDelegatesConfigured);
        }
        let allocation = allocate(delegates, caller_ifname)?;
        let container_id = context.container_id();

        let record = encode(allocation.delegates())?;
        self.store.save(container_id, &record)?;
        info!(
            target: ENGINE_TARGET,
            container_id,
            delegates = allocation.delegates().len(),
            master = allocation.master(),
            "persisted delegate record"
        );

        let mut overall: Option<CniResult> = None;
        let mut statuses = Vec::with_capacity(allocation.delegates().len());
        for (index, delegate) in allocation.delegates().iter().enumerate() {
            let ifname = interface_of(delegate);
            match self.runner.add(ifname, delegate, context) {
                Ok(result) => {
                    statuses.push(NetworkStatus::from_result(
                        &result,
                        delegate.network_name(),
                        delegate.is_master(),
                    ));
                    if delegate.is_master() || overall.is_none() {
                        overall = Some(result);
                    }
                }
                Err(source) => {
                    warn!(
                        target: ENGINE_TARGET,
                        container_id,
                        index,
                        delegate = delegate.display_name(),
                        ifname,
                        error = %source,
                        "delegate add failed; rolling back"
                    );
                    let completed = allocation.delegates().get(..index).unwrap_or_default();
                    self.rollback(completed, context);
                    return Err(EngineError::DelegateAdd {
                        index,
                        delegate: delegate.display_name().to_owned(),
                        ifname: ifname.to_owned(),
                        source: Box::new(source),
                    });
                }
            }
        }

        self.report(container_id, &statuses);
        overall.ok_or(EngineError::NoDelegatesConfigured)
    }

    /// Detaches every delegate recorded for the context's container.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CorruptRecord`] when the record cannot be
    /// decoded, [`EngineError::Store`] when it cannot be read, and
    /// [`EngineError::Teardown`] when any delegate fails.
    pub fn del(&self, context: &InvocationContext) -> Result<(), EngineError> {
        let container_id = context.container_id();
        let record = match self.store.load(container_id) {
            Ok(record) => record,
            Err(StoreError::NotFound { .. }) => {
                info!(
                    target: ENGINE_TARGET,
                    container_id,
                    "no delegate record; nothing to tear down"
                );
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };
        let delegates: Vec<Delegate> =
            serde_json::from_slice(&record).map_err(|source| EngineError::CorruptRecord {
                container_id: container_id.to_owned(),
                source: Arc::new(source),
            })?;

        let mut failed = Vec::new();
        let mut messages = Vec::new();
        for delegate in delegates.iter().rev() {
            let ifname = interface_of(delegate);
            if let Err(error) = self.runner.del(ifname, delegate, context) {
                warn!(
                    target: ENGINE_TARGET,
                    container_id,
                    delegate = delegate.display_name(),
                    ifname,
                    %error,
                    "delegate teardown failed"
                );
                messages.push(format!("{}: {error}", delegate.display_name()));
                failed.push(delegate.clone());
            }
        }

        if failed.is_empty() {
            self.report(container_id, &[]);
            if let Err(error) = self.store.remove(container_id) {
                warn!(
                    target: ENGINE_TARGET,
                    container_id,
                    %error,
                    "failed to remove delegate record"
                );
            }
            return Ok(());
        }

        failed.reverse();
        match encode(&failed).and_then(|retry| {
            self.store
                .save(container_id, &retry)
                .map_err(EngineError::from)
        }) {
            Ok(()) => debug!(
                target: ENGINE_TARGET,
                container_id,
                pending = failed.len(),
                "kept retry record for failed delegates"
            ),
            Err(error) => warn!(
                target: ENGINE_TARGET,
                container_id,
                %error,
                "failed to persist retry record"
            ),
        }
        Err(EngineError::Teardown {
            container_id: container_id.to_owned(),
            message: messages.join(TEARDOWN_SEPARATOR),
        })
    }

    /// Returns the previous result, or an empty result for `cni_version`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidPrevResult`] when the previous result is
    /// not a result document.
    pub fn get(&self, prev_result: Option<&Value>, cni_version: &str) -> Result<CniResult, EngineError> {
        prev_result.map_or_else(
            || Ok(CniResult::empty(cni_version)),
            |value| {
                CniResult::from_value(value).map_err(|source| EngineError::InvalidPrevResult {
                    source: Arc::new(source),
                })
            },
        )
    }

    fn rollback(&self, completed: &[Delegate], context: &InvocationContext) {
        let container_id = context.container_id();
        for delegate in completed.iter().rev() {
            let ifname = interface_of(delegate);
            if let Err(error) = self.runner.del(ifname, delegate, context) {
                warn!(
                    target: ENGINE_TARGET,
                    container_id,
                    delegate = delegate.display_name(),
                    ifname,
                    %error,
                    "rollback of delegate failed"
                );
            }
        }
        if let Err(error) = self.store.remove(container_id) {
            warn!(
                target: ENGINE_TARGET,
                container_id,
                %error,
                "failed to remove delegate record after rollback"
            );
        }
    }

    fn report(&self, container_id: &str, statuses: &[NetworkStatus]) {
        let Some(reporter) = self.reporter else {
            return;
        };
        if let Err(error) = reporter.report(statuses) {
            warn!(
                target: ENGINE_TARGET,
                container_id,
                %error,
                "failed to report network status"
            );
        }
    }
}

fn interface_of(delegate: &Delegate) -> &str {
    delegate.ifname_request().unwrap_or_default()
}

fn encode(delegates: &[Delegate]) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(delegates).map_err(|source| EngineError::Encode {
        source: Arc::new(source),
    })
}

#[cfg(test)]
mod tests;
