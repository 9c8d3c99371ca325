//! Lazy, once-only provisioning of the database and its `byTimestamp` view
//!
//! The state lives in one atomic token. The `NotStarted -> InProgress`
//! transition is a compare-and-swap taken before the first await, so exactly
//! one caller (the winner) performs the steps:
//!
//! 1. fetch database info, creating the database if it is absent
//! 2. look up the design document, inserting it if absent or unreadable
//!
//! The token is never reset; a failed attempt is not retried.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{IndexDefinition, ProvisioningPolicy, DESIGN_DOC_ID};
use crate::error::{ProvisioningStep, TransportError};
use crate::ports::DocumentStore;

/// Where provisioning stands for one transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProvisioningState {
    NotStarted = 0,
    InProgress = 1,
    Done = 2,
    Failed = 3,
}

impl ProvisioningState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::InProgress,
            2 => Self::Done,
            _ => Self::Failed,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Ensures the database and design document exist, at most once.
pub struct IndexProvisioner {
    state: AtomicU8,
    policy: ProvisioningPolicy,
    /// Latest state, for callers waiting under `AwaitCompletion`.
    progress: watch::Sender<ProvisioningState>,
    /// Message of the failed attempt, shared with waiters.
    failure: parking_lot::Mutex<Option<String>>,
}

impl IndexProvisioner {
    pub fn new(policy: ProvisioningPolicy) -> Self {
        let (progress, _) = watch::channel(ProvisioningState::NotStarted);
        Self {
            state: AtomicU8::new(ProvisioningState::NotStarted as u8),
            policy,
            progress,
            failure: parking_lot::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ProvisioningState {
        ProvisioningState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn policy(&self) -> ProvisioningPolicy {
        self.policy
    }

    /// Whether a query should call [`ensure`](Self::ensure) before running.
    pub fn needs_ensure(&self) -> bool {
        match self.policy {
            ProvisioningPolicy::Optimistic => self.state() == ProvisioningState::NotStarted,
            ProvisioningPolicy::AwaitCompletion => self.state() != ProvisioningState::Done,
        }
    }

    /// Provision the index, or defer to whoever already is.
    pub async fn ensure(&self, store: &dyn DocumentStore) -> Result<(), TransportError> {
        let claimed = self
            .state
            .compare_exchange(
                ProvisioningState::NotStarted as u8,
                ProvisioningState::InProgress as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if !claimed {
            return match self.policy {
                ProvisioningPolicy::Optimistic => Ok(()),
                ProvisioningPolicy::AwaitCompletion => self.wait_for_outcome().await,
            };
        }

        self.publish(ProvisioningState::InProgress);
        let mut guard = AttemptGuard {
            provisioner: self,
            finished: false,
        };
        let result = self.run(store).await;
        guard.finished = true;

        match &result {
            Ok(()) => {
                info!(db = store.database(), "Log index provisioned");
                self.finish(ProvisioningState::Done);
            }
            Err(e) => {
                warn!(db = store.database(), error = %e, "Log index provisioning failed");
                *self.failure.lock() = Some(e.to_string());
                self.finish(ProvisioningState::Failed);
            }
        }
        result
    }

    async fn run(&self, store: &dyn DocumentStore) -> Result<(), TransportError> {
        let info = store
            .info()
            .await
            .map_err(|e| TransportError::provisioning(ProvisioningStep::CheckDatabase, e))?;

        if info.is_none() {
            debug!(db = store.database(), "Database missing, creating");
            store
                .create()
                .await
                .map_err(|e| TransportError::provisioning(ProvisioningStep::CreateDatabase, e))?;
        }

        let existing = match store.get(DESIGN_DOC_ID).await {
            Ok(doc) => doc,
            Err(e) => {
                debug!(error = %e, "Design document lookup failed, inserting");
                None
            }
        };
        if existing.is_some() {
            debug!(id = DESIGN_DOC_ID, "Design document present");
            return Ok(());
        }

        let document = IndexDefinition::logs().to_document()?;
        store
            .insert(document)
            .await
            .map_err(|e| TransportError::provisioning(ProvisioningStep::SaveIndex, e))?;
        Ok(())
    }

    async fn wait_for_outcome(&self) -> Result<(), TransportError> {
        let mut progress = self.progress.subscribe();
        let outcome = match progress.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives as long as `self`.
            Err(_) => self.state(),
        };

        match outcome {
            ProvisioningState::Done => Ok(()),
            _ => Err(TransportError::provisioning(
                ProvisioningStep::Observed,
                self.failure
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "provisioning did not complete".to_string()),
            )),
        }
    }

    fn finish(&self, state: ProvisioningState) {
        self.state.store(state as u8, Ordering::Release);
        self.publish(state);
    }

    fn publish(&self, state: ProvisioningState) {
        self.progress.send_replace(state);
    }
}

/// Marks the attempt failed if the winner's future is dropped mid-flight.
struct AttemptGuard<'a> {
    provisioner: &'a IndexProvisioner,
    finished: bool,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.provisioner.failure.lock() = Some("provisioning was cancelled".to_string());
            self.provisioner.finish(ProvisioningState::Failed);
        }
    }
}

/// Start provisioning in the background, logging rather than returning errors.
pub fn spawn_ensure(provisioner: Arc<IndexProvisioner>, store: Arc<dyn DocumentStore>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        debug!("No runtime available, provisioning deferred to first query");
        return;
    };
    handle.spawn(async move {
        if let Err(e) = provisioner.ensure(store.as_ref()).await {
            warn!(error = %e, "Background index provisioning failed");
        }
    });
}
