use std::sync::Arc;
use std::thread;
use std::time::Duration;

use modelsync::cache::RoutedObjectCache;
use modelsync::loader::{
    ChannelDelegate, LoadEvent, LoadEventStream, LoadRequest, ManualTransport, ModelLoader,
    Progress, Response,
};
use modelsync::{
    AttributeKind, EntityType, InMemoryObjectStore, LoadOutcome, LoadState, MappingDescriptor,
    MappingError, MappingRegistry, ObjectStore, Predicate, SyncError, TransportError, Value,
};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn registry() -> MappingRegistry {
    let user = MappingDescriptor::builder("User")
        .model_name("user")
        .attribute("id", "remote_id", AttributeKind::Int)
        .attribute("name", "name", AttributeKind::String)
        .build()
        .unwrap();
    let post = MappingDescriptor::builder("Post")
        .model_name("post")
        .attribute("id", "remote_id", AttributeKind::Int)
        .attribute("title", "title", AttributeKind::String)
        .attribute("user_id", "user_id", AttributeKind::Int)
        .has_one("author", "author", "User")
        .build()
        .unwrap();

    let posts_by_user = RoutedObjectCache::new("Post")
        .route("/users/:user_id/posts", |p| {
            Predicate::eq("user_id", p.value("user_id"))
        })
        .unwrap();

    MappingRegistry::builder()
        .register(user)
        .register_with_cache(post, Arc::new(posts_by_user))
        .build()
        .unwrap()
}

struct Harness {
    store: Arc<InMemoryObjectStore>,
    transport: Arc<ManualTransport>,
    loader: ModelLoader,
}

fn harness() -> Harness {
    init_tracing();
    let store = Arc::new(InMemoryObjectStore::new());
    let transport = Arc::new(ManualTransport::new());
    let loader = ModelLoader::builder(store.clone(), Arc::new(registry()), transport.clone()).build();
    Harness {
        store,
        transport,
        loader,
    }
}

fn next_terminal(events: &LoadEventStream) -> LoadEvent {
    loop {
        let event = events.recv_timeout(WAIT).unwrap();
        if event.is_terminal() {
            return event;
        }
    }
}

fn post_titles(store: &InMemoryObjectStore, user_id: i64) -> Vec<String> {
    store
        .find_many(&EntityType::new("Post"), &Predicate::eq("user_id", user_id))
        .unwrap()
        .into_iter()
        .filter_map(|p| p.attribute("title").and_then(Value::as_string).map(str::to_string))
        .collect()
}

#[test]
fn resource_path_reconciliation_is_scoped_by_path_params() {
    let h = harness();
    let (delegate, events) = ChannelDelegate::bounded(16);
    let delegate = Arc::new(delegate);

    for (user, body) in [
        (
            42,
            r#"[{"id": 1, "title": "a", "user_id": 42, "author": {"id": 42, "name": "ann"}},
                {"id": 2, "title": "b", "user_id": 42, "author": 42}]"#,
        ),
        (7, r#"[{"id": 3, "title": "c", "user_id": 7}]"#),
    ] {
        let handle = h.loader.dispatch_load(
            LoadRequest::get(format!("/users/{user}/posts"), "Post"),
            delegate.clone(),
        );
        h.transport.complete(handle.id(), Response::new(200, body));
        assert!(matches!(next_terminal(&events), LoadEvent::Loaded { .. }));
    }
    assert_eq!(post_titles(&h.store, 42), vec!["a", "b"]);
    assert_eq!(post_titles(&h.store, 7), vec!["c"]);

    // User 42 lost post 1; user 7's posts are outside that resource path.
    let handle = h.loader.dispatch_load(
        LoadRequest::get("/users/42/posts", "Post"),
        delegate.clone(),
    );
    h.transport.complete(
        handle.id(),
        Response::new(200, r#"[{"id": 2, "title": "b2", "user_id": 42}]"#),
    );
    match next_terminal(&events) {
        LoadEvent::Loaded { entities, .. } => {
            assert_eq!(entities.len(), 1);
            assert_eq!(entities[0].attribute("title"), Some(&Value::from("b2")));
            // Relationship untouched when absent from the payload.
            assert_eq!(entities[0].related_ids("author").len(), 1);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(post_titles(&h.store, 42), vec!["b2"]);
    assert_eq!(post_titles(&h.store, 7), vec!["c"]);
    assert_eq!(
        h.store
            .count(&EntityType::new("User"), &Predicate::all())
            .unwrap(),
        1
    );
}

#[test]
fn completion_from_another_thread_notifies_exactly_once() {
    let h = harness();
    let (delegate, events) = ChannelDelegate::bounded(16);
    let handle = h.loader.dispatch_load(
        LoadRequest::get("/users/1/posts", "Post"),
        Arc::new(delegate),
    );
    let id = handle.id();

    let transport = h.transport.clone();
    let worker = thread::spawn(move || {
        transport.start(id);
        let first = transport.complete(id, Response::new(200, r#"{"post": {"id": 5, "user_id": 1}}"#));
        let second = transport.fail(id, TransportError::Other("late".to_string()), None);
        (first, second)
    });
    assert_eq!(worker.join().unwrap(), (true, false));

    assert!(matches!(events.recv_timeout(WAIT).unwrap(), LoadEvent::Started { .. }));
    match events.recv_timeout(WAIT).unwrap() {
        LoadEvent::Loaded {
            request_id,
            entities,
            response,
            source,
        } => {
            assert_eq!(request_id, id);
            assert_eq!(entities.len(), 1);
            assert_eq!(response.status, 200);
            assert!(source.is_none());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(events.try_recv().is_none());
    assert_eq!(handle.state(), LoadState::Notified(LoadOutcome::Success));
    assert!(!handle.cancel());
}

#[test]
fn cancelled_cycle_never_notifies_or_writes() {
    let h = harness();
    let (delegate, events) = ChannelDelegate::bounded(16);
    let handle = h.loader.dispatch_load(
        LoadRequest::get("/users/1/posts", "Post"),
        Arc::new(delegate),
    );

    assert!(handle.cancel());
    assert_eq!(handle.state(), LoadState::Cancelled);
    assert!(!h
        .transport
        .complete(handle.id(), Response::new(200, r#"[{"id": 1, "user_id": 1}]"#)));

    let drained = events.drain();
    assert_eq!(drained.len(), 1);
    assert!(matches!(drained[0], LoadEvent::Cancelled { .. }));
    assert_eq!(h.store.len().unwrap(), 0);
}

#[test]
fn failed_cycle_does_not_discard_a_concurrent_cycles_work() {
    let h = harness();
    let (delegate, events) = ChannelDelegate::bounded(16);
    let delegate = Arc::new(delegate);

    let good = h
        .loader
        .dispatch_load(LoadRequest::get("/users/1/posts", "Post"), delegate.clone());
    let bad = h
        .loader
        .dispatch_load(LoadRequest::get("/users/2/posts", "Post"), delegate.clone());

    let t1 = {
        let transport = h.transport.clone();
        let id = good.id();
        thread::spawn(move || {
            transport.complete(
                id,
                Response::new(200, r#"[{"id": 10, "user_id": 1}, {"id": 11, "user_id": 1}]"#),
            )
        })
    };
    let t2 = {
        let transport = h.transport.clone();
        let id = bad.id();
        thread::spawn(move || {
            transport.complete(id, Response::new(200, r#"[{"id": 20, "user_id": 2}, {"user_id": 2}]"#))
        })
    };
    assert!(t1.join().unwrap());
    assert!(t2.join().unwrap());

    let mut loaded = 0;
    let mut failed = 0;
    for _ in 0..2 {
        match next_terminal(&events) {
            LoadEvent::Loaded { request_id, .. } => {
                assert_eq!(request_id, good.id());
                loaded += 1;
            }
            LoadEvent::Failed {
                request_id, error, ..
            } => {
                assert_eq!(request_id, bad.id());
                assert!(matches!(
                    error,
                    SyncError::Mapping(MappingError::MissingPrimaryKey { .. })
                ));
                failed += 1;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!((loaded, failed), (1, 1));
    assert_eq!(
        h.store
            .count(&EntityType::new("Post"), &Predicate::eq("user_id", 1))
            .unwrap(),
        2
    );
    assert_eq!(
        h.store
            .count(&EntityType::new("Post"), &Predicate::eq("user_id", 2))
            .unwrap(),
        0
    );
    assert!(!h.store.has_changes().unwrap());
}

#[test]
fn decode_failure_is_reported_with_response() {
    let h = harness();
    let (delegate, events) = ChannelDelegate::bounded(4);
    let handle = h.loader.dispatch_load(
        LoadRequest::get("/users/1/posts", "Post"),
        Arc::new(delegate),
    );
    h.transport
        .complete(handle.id(), Response::new(200, "{not json"));

    match next_terminal(&events) {
        LoadEvent::Failed {
            error, response, ..
        } => {
            assert!(error.is_decode());
            assert_eq!(response.map(|r| r.status), Some(200));
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(handle.state(), LoadState::Notified(LoadOutcome::Failure));
}

#[test]
fn completions_never_wait_on_an_unread_event_stream() {
    let h = harness();
    let (delegate, events) = ChannelDelegate::bounded(1);
    let delegate = Arc::new(delegate);

    let first = h
        .loader
        .dispatch_load(LoadRequest::get("/users/1/posts", "Post"), delegate.clone());
    let second = h
        .loader
        .dispatch_load(LoadRequest::get("/users/2/posts", "Post"), delegate.clone());
    let third = h
        .loader
        .dispatch_load(LoadRequest::get("/users/3/posts", "Post"), delegate.clone());

    assert!(h.transport.start(first.id()));
    assert!(h.transport.progress(first.id(), Progress::default()));
    assert!(h
        .transport
        .complete(first.id(), Response::new(200, r#"[{"id": 1, "user_id": 1}]"#)));
    assert!(h
        .transport
        .complete(second.id(), Response::new(200, r#"[{"id": 2, "user_id": 2}]"#)));
    assert!(third.cancel());
    assert_eq!(delegate.dropped_events(), 1);

    let drained = events.drain();
    let kinds: Vec<_> = drained
        .iter()
        .map(|e| match e {
            LoadEvent::Started { .. } => "started",
            LoadEvent::Progress { .. } => "progress",
            LoadEvent::Cancelled { .. } => "cancelled",
            LoadEvent::Loaded { .. } => "loaded",
            LoadEvent::Failed { .. } => "failed",
        })
        .collect();
    assert_eq!(kinds, vec!["started", "loaded", "loaded", "cancelled"]);
    assert_eq!(drained[1].request_id(), first.id());
    assert_eq!(drained[2].request_id(), second.id());
    assert_eq!(drained[3].request_id(), third.id());
    assert_eq!(h.store.len().unwrap(), 2);
}
