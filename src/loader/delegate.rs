//! Load notifications.
//!
//! A [`LoadDelegate`] receives exactly one of `models_loaded` or
//! `load_failed` per load cycle, plus whatever lifecycle events the
//! transport reports before that. [`ChannelDelegate`] turns the same
//! notifications into a pull-style stream of [`LoadEvent`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace};

use crate::entity::{Entity, LocalId};
use crate::error::{SyncError, SyncResult};
use crate::loader::{LoadRequest, Progress, RequestId, Response};

/// Caller-side notification target of a load cycle.
pub trait LoadDelegate: Send + Sync {
    /// The cycle mapped and committed `entities` (payload order, possibly
    /// empty). `source` is the entity the load was issued for, if any.
    fn models_loaded(
        &self,
        request: &LoadRequest,
        entities: Vec<Entity>,
        response: &Response,
        source: Option<LocalId>,
    );

    /// The cycle failed; nothing it wrote was committed.
    fn load_failed(
        &self,
        request: &LoadRequest,
        error: SyncError,
        response: Option<&Response>,
        source: Option<LocalId>,
    );

    fn request_started(&self, _request: &LoadRequest) {}

    fn request_progress(&self, _request: &LoadRequest, _progress: Progress) {}

    fn request_cancelled(&self, _request: &LoadRequest) {}
}

/// A notification delivered through a [`ChannelDelegate`].
#[derive(Debug)]
pub enum LoadEvent {
    Started {
        request_id: RequestId,
    },
    Progress {
        request_id: RequestId,
        progress: Progress,
    },
    Cancelled {
        request_id: RequestId,
    },
    Loaded {
        request_id: RequestId,
        entities: Vec<Entity>,
        response: Response,
        source: Option<LocalId>,
    },
    Failed {
        request_id: RequestId,
        error: SyncError,
        response: Option<Response>,
        source: Option<LocalId>,
    },
}

impl LoadEvent {
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        match self {
            Self::Started { request_id }
            | Self::Progress { request_id, .. }
            | Self::Cancelled { request_id }
            | Self::Loaded { request_id, .. }
            | Self::Failed { request_id, .. } => *request_id,
        }
    }

    /// Loaded or failed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Loaded { .. } | Self::Failed { .. })
    }
}

/// Delegate that forwards every notification into a channel.
///
/// Sending never blocks the transport's callback thread. Terminal and
/// cancellation events are always delivered. `Started` and `Progress` are
/// dropped and counted once `capacity` events are waiting to be received.
#[derive(Debug)]
pub struct ChannelDelegate {
    tx: Sender<LoadEvent>,
    capacity: usize,
    dropped: AtomicU64,
}

impl ChannelDelegate {
    /// Creates a delegate and the stream that receives its events.
    /// `capacity` bounds the backlog that lifecycle events may fill.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, LoadEventStream) {
        let (tx, rx) = unbounded();
        (
            Self {
                tx,
                capacity: capacity.max(1),
                dropped: AtomicU64::new(0),
            },
            LoadEventStream { rx },
        )
    }

    /// Lifecycle events discarded because the unread backlog was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send_lifecycle(&self, event: LoadEvent) {
        if self.tx.len() >= self.capacity {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(request_id = %event.request_id(), dropped, "load event backlog full");
            return;
        }
        self.send_required(event);
    }

    fn send_required(&self, event: LoadEvent) {
        // The channel is unbounded, so the only failure is a closed stream.
        if let Err(err) = self.tx.try_send(event) {
            debug!(
                request_id = %err.into_inner().request_id(),
                "load event stream closed, dropping notification"
            );
        }
    }
}

impl LoadDelegate for ChannelDelegate {
    fn models_loaded(
        &self,
        request: &LoadRequest,
        entities: Vec<Entity>,
        response: &Response,
        source: Option<LocalId>,
    ) {
        self.send_required(LoadEvent::Loaded {
            request_id: request.id,
            entities,
            response: response.clone(),
            source,
        });
    }

    fn load_failed(
        &self,
        request: &LoadRequest,
        error: SyncError,
        response: Option<&Response>,
        source: Option<LocalId>,
    ) {
        self.send_required(LoadEvent::Failed {
            request_id: request.id,
            error,
            response: response.cloned(),
            source,
        });
    }

    fn request_started(&self, request: &LoadRequest) {
        self.send_lifecycle(LoadEvent::Started {
            request_id: request.id,
        });
    }

    fn request_progress(&self, request: &LoadRequest, progress: Progress) {
        self.send_lifecycle(LoadEvent::Progress {
            request_id: request.id,
            progress,
        });
    }

    fn request_cancelled(&self, request: &LoadRequest) {
        self.send_required(LoadEvent::Cancelled {
            request_id: request.id,
        });
    }
}

/// Receiving side of a [`ChannelDelegate`].
#[derive(Debug)]
pub struct LoadEventStream {
    rx: Receiver<LoadEvent>,
}

impl LoadEventStream {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> SyncResult<LoadEvent> {
        self.rx
            .recv()
            .map_err(|_| SyncError::internal("load event stream disconnected"))
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> SyncResult<LoadEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => {
                SyncError::internal(format!("no load event within {}ms", timeout.as_millis()))
            }
            RecvTimeoutError::Disconnected => SyncError::internal("load event stream disconnected"),
        })
    }

    #[must_use]
    pub fn try_recv(&self) -> Option<LoadEvent> {
        self.rx.try_recv().ok()
    }

    /// Every event currently buffered.
    #[must_use]
    pub fn drain(&self) -> Vec<LoadEvent> {
        self.rx.try_iter().collect()
    }
}
