//! Load coordination.
//!
//! A [`ModelLoader`] owns the pieces every load cycle shares: the store, the
//! mapping registry, the payload decoder and the transport. Each call to
//! [`ModelLoader::dispatch_load`] starts one cycle:
//!
//! 1. the resource-path snapshot is captured from the entity type's object
//!    cache,
//! 2. the request goes out through the transport,
//! 3. on a successful response the body is decoded, mapped, reconciled
//!    against the snapshot and committed,
//! 4. the delegate hears about it exactly once.
//!
//! Steps 3 of concurrent cycles run one at a time behind a processing gate,
//! so a failing cycle's rollback never discards another cycle's writes.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity::{ids_of, Entity, EntityType, LocalId};
use crate::error::SyncResult;
use crate::mapping::{JsonPayloadDecoder, MappingRegistry, PayloadDecoder};
use crate::storage::ObjectStore;

mod config;
mod cycle;
mod delegate;
mod transport;

pub use config::LoaderConfig;
pub use delegate::{ChannelDelegate, LoadDelegate, LoadEvent, LoadEventStream};
pub use transport::{
    ManualTransport, Method, Progress, Request, RequestCallbacks, RequestId, Response, Transport,
};

use cycle::LoadCycle;

/// What a load cycle fetches and how its result is scoped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub id: RequestId,
    pub method: Method,
    /// Path sent to the transport.
    pub path: String,
    /// Entity type the response body maps into.
    pub entity_type: EntityType,
    /// Logical resource path used for stale-set reconciliation.
    pub resource_path: Option<String>,
    /// Entity the load was issued for, echoed back in notifications.
    pub source: Option<LocalId>,
    pub body: Vec<u8>,
}

impl LoadRequest {
    /// GET `path`, reconciled against the same resource path.
    #[must_use]
    pub fn get(path: impl Into<String>, entity_type: impl Into<EntityType>) -> Self {
        let path = path.into();
        Self {
            id: RequestId::new(),
            method: Method::Get,
            resource_path: Some(path.clone()),
            path,
            entity_type: entity_type.into(),
            source: None,
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_resource_path(mut self, resource_path: impl Into<String>) -> Self {
        self.resource_path = Some(resource_path.into());
        self
    }

    /// Skip reconciliation for this load.
    #[must_use]
    pub fn without_resource_path(mut self) -> Self {
        self.resource_path = None;
        self
    }

    #[must_use]
    pub const fn with_source(mut self, source: LocalId) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    fn to_transport_request(&self) -> Request {
        Request {
            id: self.id,
            method: self.method,
            path: self.path.clone(),
            headers: std::collections::BTreeMap::new(),
            body: self.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadOutcome {
    Success,
    Failure,
}

/// Position of a load cycle in its lifecycle.
///
/// `Pending → Mapped → [Reconciled →] Notified(Success)` on success,
/// `Pending → … → Failed → Notified(Failure)` on failure, and `Cancelled`
/// when cancelled before the transport delivered anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadState {
    Pending,
    Mapped,
    Reconciled,
    Failed,
    Notified(LoadOutcome),
    Cancelled,
}

impl LoadState {
    /// Whether the cycle will make no further progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Notified(_) | Self::Cancelled)
    }
}

pub(crate) struct LoaderShared {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) registry: Arc<MappingRegistry>,
    pub(crate) decoder: Arc<dyn PayloadDecoder>,
    pub(crate) config: LoaderConfig,
    pub(crate) gate: Mutex<()>,
}

/// Handle to one dispatched load cycle.
pub struct LoadHandle {
    cycle: Arc<LoadCycle>,
    transport: Arc<dyn Transport>,
}

impl LoadHandle {
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.cycle.request().id
    }

    #[must_use]
    pub fn state(&self) -> LoadState {
        self.cycle.state()
    }

    /// Cancels the load if the transport has not delivered yet.
    ///
    /// Returns `false` when the cycle already finished; its notification was
    /// (or is being) delivered. After a successful cancel the delegate hears
    /// nothing but `request_cancelled`.
    pub fn cancel(&self) -> bool {
        if !self.cycle.cancel() {
            return false;
        }
        self.transport.cancel(self.id());
        true
    }
}

impl fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// Entry point for loading remote collections into the local store.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use modelsync::loader::{ChannelDelegate, LoadEvent, LoadRequest, ManualTransport, ModelLoader, Response};
/// use modelsync::{AttributeKind, InMemoryObjectStore, MappingDescriptor, MappingRegistry};
///
/// let registry = MappingRegistry::builder()
///     .register(
///         MappingDescriptor::builder("User")
///             .attribute("id", "remote_id", AttributeKind::Int)
///             .attribute("name", "name", AttributeKind::String)
///             .build()
///             .unwrap(),
///     )
///     .build()
///     .unwrap();
/// let transport = Arc::new(ManualTransport::new());
/// let loader = ModelLoader::builder(
///     Arc::new(InMemoryObjectStore::new()),
///     Arc::new(registry),
///     transport.clone(),
/// )
/// .build();
///
/// let (delegate, events) = ChannelDelegate::bounded(8);
/// let handle = loader.dispatch_load(LoadRequest::get("/users", "User"), Arc::new(delegate));
/// transport.complete(handle.id(), Response::new(200, r#"[{"id": 1, "name": "ann"}]"#));
///
/// match events.recv().unwrap() {
///     LoadEvent::Loaded { entities, .. } => assert_eq!(entities.len(), 1),
///     other => panic!("unexpected event: {other:?}"),
/// }
/// ```
pub struct ModelLoader {
    shared: Arc<LoaderShared>,
    transport: Arc<dyn Transport>,
}

impl ModelLoader {
    #[must_use]
    pub fn builder(
        store: Arc<dyn ObjectStore>,
        registry: Arc<MappingRegistry>,
        transport: Arc<dyn Transport>,
    ) -> ModelLoaderBuilder {
        ModelLoaderBuilder {
            store,
            registry,
            transport,
            config: LoaderConfig::default(),
            decoder: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.shared.store
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<MappingRegistry> {
        &self.shared.registry
    }

    /// Starts one load cycle.
    ///
    /// The resource-path snapshot is taken before the request is sent. If
    /// that fails (unregistered type, store error) the delegate is told
    /// immediately and nothing is sent.
    pub fn dispatch_load(&self, request: LoadRequest, delegate: Arc<dyn LoadDelegate>) -> LoadHandle {
        info!(
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            entity_type = %request.entity_type,
            "dispatching load"
        );

        let snapshot = self.snapshot(&request);
        let (snapshot, early_error) = match snapshot {
            Ok(ids) => (ids, None),
            Err(error) => (None, Some(error)),
        };

        let outgoing = request.to_transport_request();
        let cycle = Arc::new(LoadCycle::new(
            request,
            delegate,
            Arc::clone(&self.shared),
            snapshot,
        ));

        match early_error {
            Some(error) => cycle.fail_early(error),
            None => self
                .transport
                .send(outgoing, Arc::clone(&cycle) as Arc<dyn RequestCallbacks>),
        }

        LoadHandle {
            cycle,
            transport: Arc::clone(&self.transport),
        }
    }

    /// Reloads one entity from `path`.
    ///
    /// The entity's id is echoed back as the notification source; no
    /// reconciliation runs.
    pub fn load_object(
        &self,
        entity: &Entity,
        path: impl Into<String>,
        delegate: Arc<dyn LoadDelegate>,
    ) -> LoadHandle {
        let request = LoadRequest::get(path, entity.entity_type.clone())
            .without_resource_path()
            .with_source(entity.id);
        self.dispatch_load(request, delegate)
    }

    fn snapshot(&self, request: &LoadRequest) -> SyncResult<Option<Vec<LocalId>>> {
        let registry = &self.shared.registry;
        registry.descriptor(&request.entity_type)?;

        let Some(resource_path) = request.resource_path.as_deref() else {
            return Ok(None);
        };
        if !self.shared.config.reconcile {
            return Ok(None);
        }
        let cached = registry
            .object_cache(&request.entity_type)
            .objects_for_resource_path(resource_path, self.shared.store.as_ref())?;
        debug!(
            request_id = %request.id,
            resource_path,
            cached = cached.len(),
            "captured resource path snapshot"
        );
        Ok(Some(ids_of(&cached)))
    }
}

impl fmt::Debug for ModelLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLoader")
            .field("config", &self.shared.config)
            .field("registry", &self.shared.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ModelLoader`].
pub struct ModelLoaderBuilder {
    store: Arc<dyn ObjectStore>,
    registry: Arc<MappingRegistry>,
    transport: Arc<dyn Transport>,
    config: LoaderConfig,
    decoder: Option<Arc<dyn PayloadDecoder>>,
}

impl ModelLoaderBuilder {
    #[must_use]
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default JSON decoder.
    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn PayloadDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn build(self) -> ModelLoader {
        let max_bytes = self.config.max_payload_bytes;
        let decoder = self
            .decoder
            .unwrap_or_else(|| Arc::new(JsonPayloadDecoder::new(max_bytes)));
        ModelLoader {
            shared: Arc::new(LoaderShared {
                store: self.store,
                registry: self.registry,
                decoder,
                config: self.config,
                gate: Mutex::new(()),
            }),
            transport: self.transport,
        }
    }
}
