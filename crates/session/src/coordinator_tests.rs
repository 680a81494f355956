// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::storage::{MemoryStore, ACCESS_TOKEN};
use crate::transport::ApiResponse;

/// Refresher whose calls block until the test opens the gate.
struct GatedRefresher {
    gate: Semaphore,
    seen: Mutex<Vec<String>>,
    outcome: Mutex<Result<TokenPair, ApiError>>,
}

impl GatedRefresher {
    fn new(outcome: Result<TokenPair, ApiError>) -> Arc<Self> {
        Arc::new(Self { gate: Semaphore::new(0), seen: Mutex::new(Vec::new()), outcome: Mutex::new(outcome) })
    }

    fn open(&self) {
        self.gate.add_permits(1000);
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

impl Refresher for GatedRefresher {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenPair, ApiError>> {
        Box::pin(async move {
            self.seen.lock().push(refresh_token.to_owned());
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.outcome.lock().clone()
        })
    }
}

/// Transport that only records default header changes.
#[derive(Default)]
struct RecordingTransport {
    authorization: Mutex<Option<String>>,
}

impl Transport for RecordingTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<ApiResponse, TransportError>> {
        Box::pin(async move {
            Err(TransportError::Network { message: "unused".into(), request_id: request.id() })
        })
    }

    fn set_authorization(&self, value: Option<&str>) {
        *self.authorization.lock() = value.map(str::to_owned);
    }
}

struct Harness {
    coordinator: Arc<RefreshCoordinator>,
    refresher: Arc<GatedRefresher>,
    transport: Arc<RecordingTransport>,
    store: Arc<MemoryStore>,
    events: broadcast::Receiver<SessionEvent>,
}

fn pair(n: u32) -> TokenPair {
    TokenPair {
        access_token: format!("access-{n}"),
        refresh_token: format!("refresh-{n}"),
        token_type: None,
    }
}

fn harness(outcome: Result<TokenPair, ApiError>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    store.set(ACCESS_TOKEN, "access-0");
    store.set(REFRESH_TOKEN, "refresh-0");
    let refresher = GatedRefresher::new(outcome);
    let transport = Arc::new(RecordingTransport::default());
    let (tx, events) = broadcast::channel(16);
    let coordinator = Arc::new(RefreshCoordinator::new(
        store.clone(),
        refresher.clone(),
        transport.clone(),
        tx,
        "/login",
    ));
    Harness { coordinator, refresher, transport, store, events }
}

fn unauthorized(request: &ApiRequest) -> TransportError {
    TransportError::Http { status: 401, body: json!({ "detail": "expired" }), request_id: request.id() }
}

fn spawn_intercept(
    coordinator: &Arc<RefreshCoordinator>,
    request: ApiRequest,
) -> tokio::task::JoinHandle<(Intercept, ApiRequest)> {
    let coordinator = Arc::clone(coordinator);
    tokio::spawn(async move {
        let mut request = request;
        let err = unauthorized(&request);
        let outcome = coordinator.intercept(err, &mut request).await;
        (outcome, request)
    })
}

async fn wait_for(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await?;
    Ok(())
}

fn idle() -> CoordinatorState {
    CoordinatorState { refreshing: false, waiters: 0 }
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() -> anyhow::Result<()> {
    let h = harness(Ok(pair(1)));

    let leader = spawn_intercept(&h.coordinator, ApiRequest::get("/organizations"));
    wait_for(|| h.coordinator.attempts() == 1).await?;
    let followers: Vec<_> = (0..2)
        .map(|i| spawn_intercept(&h.coordinator, ApiRequest::get(format!("/users/{i}"))))
        .collect();
    wait_for(|| h.coordinator.state().waiters == 2).await?;
    assert!(h.coordinator.state().refreshing);

    h.refresher.open();

    let mut handles = vec![leader];
    handles.extend(followers);
    for handle in handles {
        let (outcome, request) = handle.await?;
        assert_eq!(outcome, Intercept::Retry);
        assert!(request.is_retried());
        assert_eq!(request.authorization(), Some("bearer access-1"));
    }

    assert_eq!(h.coordinator.attempts(), 1);
    assert_eq!(h.coordinator.state(), idle());
    assert_eq!(h.refresher.seen(), vec!["refresh-0".to_owned()]);
    assert_eq!(h.transport.authorization.lock().as_deref(), Some("bearer access-1"));
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_both_tokens() -> anyhow::Result<()> {
    let h = harness(Ok(pair(1)));
    h.refresher.open();

    let mut first = ApiRequest::get("/a");
    let outcome = h.coordinator.intercept(unauthorized(&first), &mut first).await;
    assert_eq!(outcome, Intercept::Retry);
    assert_eq!(h.store.get(ACCESS_TOKEN).as_deref(), Some("access-1"));
    assert_eq!(h.store.get(REFRESH_TOKEN).as_deref(), Some("refresh-1"));

    *h.refresher.outcome.lock() = Ok(pair(2));
    let mut second = ApiRequest::get("/b");
    let outcome = h.coordinator.intercept(unauthorized(&second), &mut second).await;
    assert_eq!(outcome, Intercept::Retry);

    assert_eq!(h.refresher.seen(), vec!["refresh-0".to_owned(), "refresh-1".to_owned()]);
    assert_eq!(h.store.get(REFRESH_TOKEN).as_deref(), Some("refresh-2"));
    Ok(())
}

#[tokio::test]
async fn refresh_failure_rejects_waiters_and_tears_down() -> anyhow::Result<()> {
    let mut h = harness(Err(ApiError::Status { status: 500, body: Value::Null }));
    h.transport.set_authorization(Some("bearer access-0"));

    let leader = spawn_intercept(&h.coordinator, ApiRequest::get("/a"));
    wait_for(|| h.coordinator.attempts() == 1).await?;
    let follower = spawn_intercept(&h.coordinator, ApiRequest::get("/b"));
    wait_for(|| h.coordinator.state().waiters == 1).await?;
    h.refresher.open();

    for handle in [leader, follower] {
        let (outcome, _) = handle.await?;
        match outcome {
            Intercept::Reject(ApiError::SessionExpired { status, .. }) => {
                assert_eq!(status, Some(500))
            }
            other => anyhow::bail!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(h.store.get(ACCESS_TOKEN), None);
    assert_eq!(h.store.get(REFRESH_TOKEN), None);
    assert_eq!(*h.transport.authorization.lock(), None);
    assert_eq!(h.coordinator.state(), idle());

    let mut expired = 0;
    while let Ok(event) = h.events.try_recv() {
        if event == (SessionEvent::Expired { login_path: "/login".into() }) {
            expired += 1;
        }
    }
    assert_eq!(expired, 1);
    Ok(())
}

#[yare::parameterized(
    missing = { None },
    undefined = { Some("undefined") },
    null = { Some("null") },
)]
#[test_macro(tokio::test)]
async fn unusable_refresh_token_skips_network(stored: Option<&str>) {
    let mut h = harness(Ok(pair(1)));
    h.refresher.open();
    match stored {
        Some(v) => h.store.set(REFRESH_TOKEN, v),
        None => h.store.remove(REFRESH_TOKEN),
    }

    let mut request = ApiRequest::get("/a");
    let outcome = h.coordinator.intercept(unauthorized(&request), &mut request).await;

    assert!(matches!(outcome, Intercept::Reject(ApiError::SessionExpired { status: None, .. })));
    assert_eq!(h.coordinator.attempts(), 0);
    assert_eq!(h.store.get(ACCESS_TOKEN), None);
    assert_eq!(h.events.try_recv().ok(), Some(SessionEvent::Expired { login_path: "/login".into() }));
}

#[tokio::test]
async fn retried_request_passes_401_through() {
    let h = harness(Ok(pair(1)));
    h.refresher.open();

    let mut request = ApiRequest::get("/a");
    request.mark_retried();
    let outcome = h.coordinator.intercept(unauthorized(&request), &mut request).await;

    assert!(matches!(outcome, Intercept::Reject(ApiError::Status { status: 401, .. })));
    assert_eq!(h.coordinator.attempts(), 0);
    assert_eq!(h.coordinator.state(), idle());
}

#[tokio::test]
async fn cancelled_requests_bypass_refresh() {
    let h = harness(Ok(pair(1)));
    h.refresher.open();

    let mut request = ApiRequest::get("/a");
    let err = TransportError::Cancelled { request_id: request.id() };
    assert_eq!(
        h.coordinator.intercept(err, &mut request).await,
        Intercept::Reject(ApiError::Cancelled)
    );

    // A 401 that raced with the caller's abort is still a cancellation.
    let token = CancellationToken::new();
    token.cancel();
    let mut request = ApiRequest::get("/b").with_cancel(token);
    let outcome = h.coordinator.intercept(unauthorized(&request), &mut request).await;
    assert_eq!(outcome, Intercept::Reject(ApiError::Cancelled));
    assert!(!request.is_retried());

    assert_eq!(h.coordinator.attempts(), 0);
    assert_eq!(h.coordinator.state(), idle());
}

#[tokio::test]
async fn cancelled_waiter_leaves_queue_settled() -> anyhow::Result<()> {
    let h = harness(Ok(pair(1)));

    let leader = spawn_intercept(&h.coordinator, ApiRequest::get("/a"));
    wait_for(|| h.coordinator.attempts() == 1).await?;
    let token = CancellationToken::new();
    let follower = spawn_intercept(&h.coordinator, ApiRequest::get("/b").with_cancel(token.clone()));
    wait_for(|| h.coordinator.state().waiters == 1).await?;

    token.cancel();
    let (outcome, _) = follower.await?;
    assert_eq!(outcome, Intercept::Reject(ApiError::Cancelled));

    h.refresher.open();
    let (outcome, _) = leader.await?;
    assert_eq!(outcome, Intercept::Retry);
    assert_eq!(h.coordinator.state(), idle());
    Ok(())
}

#[tokio::test]
async fn conflict_is_translated_without_refresh() {
    let h = harness(Ok(pair(1)));
    let mut request = ApiRequest::put("/organizations/1");
    let err = TransportError::Http {
        status: 409,
        body: json!({ "message": "stale version" }),
        request_id: request.id(),
    };

    let outcome = h.coordinator.intercept(err, &mut request).await;
    assert_eq!(
        outcome,
        Intercept::Reject(ApiError::Conflict { message: "Conflict: stale version".into() })
    );
    assert_eq!(h.coordinator.attempts(), 0);
}

#[yare::parameterized(
    forbidden = { 403 },
    not_found = { 404 },
    server_error = { 500 },
)]
#[test_macro(tokio::test)]
async fn other_statuses_pass_through(status: u16) {
    let h = harness(Ok(pair(1)));
    let mut request = ApiRequest::get("/a");
    let err = TransportError::Http { status, body: json!({ "x": 1 }), request_id: request.id() };

    let outcome = h.coordinator.intercept(err, &mut request).await;
    assert_eq!(outcome, Intercept::Reject(ApiError::Status { status, body: json!({ "x": 1 }) }));
    assert_eq!(h.coordinator.attempts(), 0);
}

#[tokio::test]
async fn dropped_leader_releases_the_flag() -> anyhow::Result<()> {
    let h = harness(Ok(pair(1)));

    let leader = spawn_intercept(&h.coordinator, ApiRequest::get("/a"));
    wait_for(|| h.coordinator.attempts() == 1).await?;
    let follower = spawn_intercept(&h.coordinator, ApiRequest::get("/b"));
    wait_for(|| h.coordinator.state().waiters == 1).await?;

    leader.abort();
    let _ = leader.await;

    // The follower takes over and runs its own refresh.
    wait_for(|| h.coordinator.attempts() == 2).await?;
    h.refresher.open();
    let (outcome, _) = follower.await?;
    assert_eq!(outcome, Intercept::Retry);
    assert_eq!(h.coordinator.state(), idle());
    Ok(())
}

fn sent_with(path: &str, authorization: &str) -> ApiRequest {
    let mut request = ApiRequest::get(path);
    request.authorize(authorization);
    request
}

#[tokio::test]
async fn coordinators_sharing_a_gate_refresh_once() -> anyhow::Result<()> {
    let h = harness(Ok(pair(1)));
    let (tx, _) = broadcast::channel(16);
    let other = Arc::new(
        RefreshCoordinator::new(
            h.store.clone(),
            h.refresher.clone(),
            Arc::new(RecordingTransport::default()),
            tx,
            "/login",
        )
        .with_gate(Arc::clone(&h.coordinator.gate)),
    );

    let crm = spawn_intercept(&h.coordinator, sent_with("/organizations", "bearer access-0"));
    wait_for(|| h.coordinator.attempts() == 1).await?;
    let transcripts = spawn_intercept(&other, sent_with("/calls", "bearer access-0"));
    wait_for(|| other.state().waiters == 1).await?;
    h.refresher.open();

    for handle in [crm, transcripts] {
        let (outcome, request) = handle.await?;
        assert_eq!(outcome, Intercept::Retry);
        assert_eq!(request.authorization(), Some("bearer access-1"));
    }
    assert_eq!(other.attempts(), 1);
    assert_eq!(h.refresher.seen(), vec!["refresh-0".to_owned()]);
    Ok(())
}

#[tokio::test]
async fn rotated_token_is_reused_without_refresh() {
    let h = harness(Ok(pair(2)));
    h.refresher.open();
    h.store.set(ACCESS_TOKEN, "access-1");

    let mut request = sent_with("/a", "bearer access-0");
    let outcome = h.coordinator.intercept(unauthorized(&request), &mut request).await;

    assert_eq!(outcome, Intercept::Retry);
    assert_eq!(request.authorization(), Some("bearer access-1"));
    assert_eq!(h.coordinator.attempts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failing_refresh_expires_once_under_load() -> anyhow::Result<()> {
    let mut h = harness(Err(ApiError::Status { status: 500, body: Value::Null }));

    let leader = spawn_intercept(&h.coordinator, sent_with("/a", "bearer access-0"));
    wait_for(|| h.coordinator.attempts() == 1).await?;

    // Keep 401s coming before, across and after the refresh settles.
    let stop = CancellationToken::new();
    let burst = {
        let coordinator = Arc::clone(&h.coordinator);
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut handles = Vec::new();
            while !stop.is_cancelled() {
                handles.push(spawn_intercept(&coordinator, sent_with("/b", "bearer access-0")));
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            handles
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.refresher.open();
    let (outcome, _) = leader.await?;
    assert!(matches!(outcome, Intercept::Reject(ApiError::SessionExpired { .. })));
    tokio::time::sleep(Duration::from_millis(20)).await;
    stop.cancel();

    for handle in burst.await? {
        let (outcome, _) = handle.await?;
        assert!(matches!(outcome, Intercept::Reject(ApiError::SessionExpired { .. })));
    }
    assert_eq!(h.coordinator.attempts(), 1);
    assert_eq!(h.coordinator.state(), idle());
    assert_eq!(h.store.get(REFRESH_TOKEN), None);

    let mut expired = 0;
    while let Ok(event) = h.events.try_recv() {
        if matches!(event, SessionEvent::Expired { .. }) {
            expired += 1;
        }
    }
    assert_eq!(expired, 1);
    Ok(())
}
