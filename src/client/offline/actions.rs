//! Try-online-then-queue entry points for user actions

use std::sync::Arc;
use tracing::{info, warn};

use crate::client::offline::QueueManager;
use crate::shared::error::{SyncError, SyncResult};
use crate::shared::operation::{
    LoginPayload, OperationPayload, PostPayload, QueuedOperation, RegisterPayload,
};
use crate::shared::remote::AuthResponse;
use crate::worker::registry::BACKGROUND_SYNC_TAG;
use crate::worker::WorkerHandle;

/// Result of a user action: either the remote answered, or the action was
/// captured for a later drain
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome<T> {
    Sent(T),
    Queued(QueuedOperation),
}

impl<T> ActionOutcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, ActionOutcome::Queued(_))
    }

    pub fn sent(self) -> Option<T> {
        match self {
            ActionOutcome::Sent(value) => Some(value),
            ActionOutcome::Queued(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    queue: Arc<QueueManager>,
    worker: Option<WorkerHandle>,
}

impl ActionDispatcher {
    pub fn new(queue: Arc<QueueManager>) -> Self {
        Self {
            queue,
            worker: None,
        }
    }

    /// Register the deferred-sync tag with `worker` whenever a post is queued
    pub fn with_worker(mut self, worker: WorkerHandle) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.queue
    }

    /// Create a post, queuing it on any remote failure
    pub async fn create_post(
        &self,
        post: PostPayload,
    ) -> SyncResult<ActionOutcome<serde_json::Value>> {
        let payload = OperationPayload::Post(post);
        payload.validate()?;

        if self.queue.network().is_online() {
            if let OperationPayload::Post(post) = &payload {
                match self.queue.remote().create_post(post).await {
                    Ok(created) => return Ok(ActionOutcome::Sent(created)),
                    Err(e) => warn!("[Actions] Post failed, queuing for later: {}", e),
                }
            }
        }

        let record = self.queue.enqueue(payload).await?;
        if let Some(worker) = &self.worker {
            if let Err(e) = worker.register_sync(BACKGROUND_SYNC_TAG).await {
                warn!("[Actions] Could not register background sync: {}", e);
            }
        }
        Ok(ActionOutcome::Queued(record))
    }

    pub async fn login(&self, login: LoginPayload) -> SyncResult<ActionOutcome<AuthResponse>> {
        let payload = OperationPayload::Login(login);
        payload.validate()?;

        if self.queue.network().is_online() {
            if let OperationPayload::Login(login) = &payload {
                match self.queue.remote().login(login).await {
                    Ok(auth) => return Ok(self.signed_in(auth)),
                    Err(e) => Self::queue_only_on_network(e)?,
                }
            }
        }
        self.queue.enqueue(payload).await.map(ActionOutcome::Queued)
    }

    pub async fn register(
        &self,
        register: RegisterPayload,
    ) -> SyncResult<ActionOutcome<AuthResponse>> {
        let payload = OperationPayload::Register(register);
        payload.validate()?;

        if self.queue.network().is_online() {
            if let OperationPayload::Register(register) = &payload {
                match self.queue.remote().register(register).await {
                    Ok(auth) => return Ok(self.signed_in(auth)),
                    Err(e) => Self::queue_only_on_network(e)?,
                }
            }
        }
        self.queue.enqueue(payload).await.map(ActionOutcome::Queued)
    }

    fn signed_in(&self, auth: AuthResponse) -> ActionOutcome<AuthResponse> {
        info!("[Actions] Signed in as {}", auth.user.email);
        self.queue.remote().set_token(Some(auth.token.clone()));
        ActionOutcome::Sent(auth)
    }

    /// Rejected credentials go back to the caller; only transport failures queue
    fn queue_only_on_network(error: SyncError) -> SyncResult<()> {
        match error {
            SyncError::NetworkFailure { .. } => {
                warn!("[Actions] Auth request failed, queuing for later: {}", error);
                Ok(())
            }
            other => Err(other),
        }
    }
}
