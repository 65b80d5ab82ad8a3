//! Transport collaborator contract.
//!
//! The loader never performs I/O itself. A [`Transport`] takes a [`Request`]
//! and reports back through [`RequestCallbacks`]: any number of lifecycle
//! events, then exactly one of success, failure, or cancellation.
//! [`ManualTransport`] lets tests and embedders drive those callbacks by hand.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::TransportError;

/// Identity of one request, shared by the load cycle that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Outgoing request handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: RequestId,
    pub method: Method,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Response delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Header lookup, case-insensitive on the name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the body holds nothing but whitespace.
    #[must_use]
    pub fn is_body_blank(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transfer progress of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub transferred: u64,
    pub total: Option<u64>,
}

/// Receiver of transport events for one request.
pub trait RequestCallbacks: Send + Sync {
    fn on_started(&self);
    fn on_progress(&self, progress: Progress);
    fn on_success(&self, response: Response);
    fn on_failure(&self, error: TransportError, response: Option<Response>);
    fn on_cancelled(&self);
}

/// Issues requests and reports their outcome.
///
/// Implementations invoke exactly one of `on_success`, `on_failure` or
/// `on_cancelled` per request, off the caller's stack.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request, callbacks: Arc<dyn RequestCallbacks>);

    /// Best-effort cancellation of an in-flight request.
    fn cancel(&self, id: RequestId);
}

struct InFlight {
    request: Request,
    callbacks: Arc<dyn RequestCallbacks>,
}

/// Transport whose requests are completed explicitly by the caller.
///
/// Each driving method returns `false` when no request with that id is in
/// flight. Callbacks run on the calling thread with no internal lock held.
#[derive(Default)]
pub struct ManualTransport {
    in_flight: Mutex<Vec<InFlight>>,
    cancelled: Mutex<Vec<RequestId>>,
}

impl ManualTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests sent and not yet completed, in send order.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<Request> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|f| f.request.clone())
            .collect()
    }

    #[must_use]
    pub fn last_request(&self) -> Option<Request> {
        self.pending_requests().pop()
    }

    /// Ids passed to [`Transport::cancel`], in order.
    #[must_use]
    pub fn cancelled(&self) -> Vec<RequestId> {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn start(&self, id: RequestId) -> bool {
        let Some(cb) = self.peek(id) else { return false };
        cb.on_started();
        true
    }

    pub fn progress(&self, id: RequestId, progress: Progress) -> bool {
        let Some(cb) = self.peek(id) else { return false };
        cb.on_progress(progress);
        true
    }

    pub fn complete(&self, id: RequestId, response: Response) -> bool {
        let Some(cb) = self.take(id) else { return false };
        cb.on_success(response);
        true
    }

    pub fn fail(&self, id: RequestId, error: TransportError, response: Option<Response>) -> bool {
        let Some(cb) = self.take(id) else { return false };
        cb.on_failure(error, response);
        true
    }

    fn peek(&self, id: RequestId) -> Option<Arc<dyn RequestCallbacks>> {
        let in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight
            .iter()
            .find(|f| f.request.id == id)
            .map(|f| Arc::clone(&f.callbacks))
    }

    fn take(&self, id: RequestId) -> Option<Arc<dyn RequestCallbacks>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let idx = in_flight.iter().position(|f| f.request.id == id)?;
        Some(in_flight.remove(idx).callbacks)
    }
}

impl fmt::Debug for ManualTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTransport")
            .field("pending", &self.pending_requests().len())
            .field("cancelled", &self.cancelled().len())
            .finish()
    }
}

impl Transport for ManualTransport {
    fn send(&self, request: Request, callbacks: Arc<dyn RequestCallbacks>) {
        debug!(request_id = %request.id, method = %request.method, path = %request.path, "request queued");
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(InFlight { request, callbacks });
    }

    fn cancel(&self, id: RequestId) {
        self.cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        if let Some(cb) = self.take(id) {
            cb.on_cancelled();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        started: AtomicUsize,
        succeeded: AtomicUsize,
        failed: AtomicUsize,
        cancelled: AtomicUsize,
    }

    impl RequestCallbacks for Counting {
        fn on_started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_progress(&self, _progress: Progress) {}
        fn on_success(&self, _response: Response) {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }
        fn on_failure(&self, _error: TransportError, _response: Option<Response>) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_cancelled(&self) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request(path: &str) -> Request {
        Request {
            id: RequestId::new(),
            method: Method::Get,
            path: path.to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    #[test]
    fn test_completes_exactly_once() {
        let transport = ManualTransport::new();
        let counting = Arc::new(Counting::default());
        let req = request("/users");
        let id = req.id;
        transport.send(req, counting.clone());

        assert!(transport.start(id));
        assert!(transport.complete(id, Response::new(200, "[]")));
        assert!(!transport.complete(id, Response::new(200, "[]")));
        assert!(!transport.fail(id, TransportError::Cancelled, None));

        assert_eq!(counting.started.load(Ordering::SeqCst), 1);
        assert_eq!(counting.succeeded.load(Ordering::SeqCst), 1);
        assert_eq!(counting.failed.load(Ordering::SeqCst), 0);
        assert!(transport.pending_requests().is_empty());
    }

    #[test]
    fn test_cancel_removes_request() {
        let transport = ManualTransport::new();
        let counting = Arc::new(Counting::default());
        let req = request("/users");
        let id = req.id;
        transport.send(req, counting.clone());

        transport.cancel(id);
        assert_eq!(transport.cancelled(), vec![id]);
        assert_eq!(counting.cancelled.load(Ordering::SeqCst), 1);
        assert!(!transport.complete(id, Response::new(200, "")));
    }

    #[test]
    fn test_response_helpers() {
        let response = Response::new(204, "  \n").with_header("Content-Type", "application/json");
        assert!(response.is_success());
        assert!(response.is_body_blank());
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert!(!Response::new(404, "").is_success());
    }
}
