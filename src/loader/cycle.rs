//! One request → map → reconcile → notify cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::entity::{entities_of, ids_of, Entity, LocalId};
use crate::error::{SyncError, SyncResult, TransportError};
use crate::loader::{
    LoadDelegate, LoadOutcome, LoadRequest, LoadState, LoaderShared, Progress, RequestCallbacks,
    Response,
};
use crate::mapping::{AttributeTree, PayloadMapper};
use crate::reconcile::Reconciler;

/// Status messages are capped at this many bytes of body text.
const STATUS_MESSAGE_LIMIT: usize = 256;

pub(crate) struct LoadCycle {
    request: LoadRequest,
    delegate: Arc<dyn LoadDelegate>,
    shared: Arc<LoaderShared>,
    snapshot: Option<Vec<LocalId>>,
    finished: AtomicBool,
    state: Mutex<LoadState>,
}

impl LoadCycle {
    pub(crate) fn new(
        request: LoadRequest,
        delegate: Arc<dyn LoadDelegate>,
        shared: Arc<LoaderShared>,
        snapshot: Option<Vec<LocalId>>,
    ) -> Self {
        Self {
            request,
            delegate,
            shared,
            snapshot,
            finished: AtomicBool::new(false),
            state: Mutex::new(LoadState::Pending),
        }
    }

    pub(crate) const fn request(&self) -> &LoadRequest {
        &self.request
    }

    pub(crate) fn state(&self) -> LoadState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LoadState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Claims the single terminal transition. Later callers get `false`.
    fn claim(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Cancels the cycle if nothing terminal has happened yet.
    pub(crate) fn cancel(&self) -> bool {
        if !self.claim() {
            return false;
        }
        self.set_state(LoadState::Cancelled);
        info!(request_id = %self.request.id, path = %self.request.path, "load cancelled");
        self.delegate.request_cancelled(&self.request);
        true
    }

    /// Fails the cycle before a request was ever sent.
    pub(crate) fn fail_early(&self, error: SyncError) {
        if self.claim() {
            self.notify_failure(error, None);
        }
    }

    fn notify_failure(&self, error: SyncError, response: Option<&Response>) {
        self.set_state(LoadState::Failed);
        warn!(request_id = %self.request.id, path = %self.request.path, %error, "load failed");
        self.delegate
            .load_failed(&self.request, error, response, self.request.source);
        self.set_state(LoadState::Notified(LoadOutcome::Failure));
    }

    fn process(&self, response: &Response) -> SyncResult<Vec<Entity>> {
        if !response.is_success() {
            let mut message = response.body_text();
            if message.len() > STATUS_MESSAGE_LIMIT {
                let mut end = STATUS_MESSAGE_LIMIT;
                while !message.is_char_boundary(end) {
                    end -= 1;
                }
                message.truncate(end);
            }
            return Err(TransportError::Status {
                code: response.status,
                message,
            }
            .into());
        }

        let _gate = self
            .shared
            .gate
            .lock()
            .map_err(|_| SyncError::internal("loader processing gate poisoned"))?;

        let store = self.shared.store.as_ref();
        let result = self
            .map_and_reconcile(response)
            .and_then(|ids| {
                store.commit()?;
                Ok(ids)
            })
            .and_then(|ids| entities_of(store, &ids).map_err(SyncError::from));

        match result {
            Ok(entities) => {
                debug!(request_id = %self.request.id, entities = entities.len(), "load committed");
                Ok(entities)
            }
            Err(error) => {
                if let Err(rollback) = store.rollback() {
                    warn!(request_id = %self.request.id, error = %rollback, "rollback failed");
                } else {
                    debug!(request_id = %self.request.id, "load rolled back");
                }
                Err(error)
            }
        }
    }

    fn map_and_reconcile(&self, response: &Response) -> SyncResult<Vec<LocalId>> {
        let shared = &self.shared;
        let config = &shared.config;
        let descriptor = shared.registry.descriptor(&self.request.entity_type)?;

        let tree = if response.is_body_blank() {
            AttributeTree::empty(config.format)
        } else {
            shared.decoder.decode(&response.body, config.format)?
        };

        let entities = PayloadMapper::new(&shared.registry, shared.store.as_ref())
            .unwrap_root(config.unwrap_root_element)
            .map_collection(&tree, descriptor)?;
        let after = ids_of(&entities);
        self.set_state(LoadState::Mapped);

        if let (Some(before), true) = (&self.snapshot, config.reconcile) {
            let deleted = Reconciler::new(shared.store.as_ref()).reconcile(before, &after)?;
            info!(
                request_id = %self.request.id,
                resource_path = self.request.resource_path.as_deref().unwrap_or_default(),
                deleted = deleted.len(),
                "stale entities removed"
            );
            self.set_state(LoadState::Reconciled);
        }
        Ok(after)
    }
}

impl RequestCallbacks for LoadCycle {
    fn on_started(&self) {
        if !self.is_finished() {
            self.delegate.request_started(&self.request);
        }
    }

    fn on_progress(&self, progress: Progress) {
        if !self.is_finished() {
            self.delegate.request_progress(&self.request, progress);
        }
    }

    fn on_success(&self, response: Response) {
        if !self.claim() {
            debug!(request_id = %self.request.id, "ignoring response for finished load");
            return;
        }
        match self.process(&response) {
            Ok(entities) => {
                info!(
                    request_id = %self.request.id,
                    path = %self.request.path,
                    entities = entities.len(),
                    "models loaded"
                );
                self.delegate
                    .models_loaded(&self.request, entities, &response, self.request.source);
                self.set_state(LoadState::Notified(LoadOutcome::Success));
            }
            Err(error) => self.notify_failure(error, Some(&response)),
        }
    }

    fn on_failure(&self, error: TransportError, response: Option<Response>) {
        if !self.claim() {
            debug!(request_id = %self.request.id, "ignoring failure for finished load");
            return;
        }
        self.notify_failure(error.into(), response.as_ref());
    }

    fn on_cancelled(&self) {
        if !self.cancel() {
            debug!(request_id = %self.request.id, "ignoring cancellation for finished load");
        }
    }
}
