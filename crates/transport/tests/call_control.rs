//! Call-control client against a local stand-in of the REST API

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use voice_gateway_transport::{
    CallControl, CallControlError, HangupOutcome, TelnyxCallControl, TransferRequest,
};

#[derive(Default)]
struct Recorded {
    hangups: Mutex<Vec<String>>,
    transfers: Mutex<Vec<Value>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == "Bearer secret")
        .unwrap_or(false)
}

async fn hangup(
    State(recorded): State<Arc<Recorded>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"errors": [{"code": "10009"}]})));
    }
    recorded.hangups.lock().push(id.clone());

    match id.as_str() {
        "ended" => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"errors": [{"code": "90018", "title": "Call has already ended"}]})),
        ),
        "invalid" => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"errors": [{"code": "10015", "title": "Invalid parameter"}]})),
        ),
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
        "slow" => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            (StatusCode::OK, Json(json!({"data": {}})))
        },
        _ => (StatusCode::OK, Json(json!({"data": {"result": "ok"}}))),
    }
}

async fn transfer(
    State(recorded): State<Arc<Recorded>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    recorded.transfers.lock().push(body);
    StatusCode::OK
}

async fn spawn_api() -> (String, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let app = Router::new()
        .route("/calls/:id/actions/hangup", post(hangup))
        .route("/calls/:id/actions/transfer", post(transfer))
        .with_state(Arc::clone(&recorded));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), recorded)
}

fn client(base_url: &str, timeout: Duration) -> TelnyxCallControl {
    TelnyxCallControl::new(base_url, timeout).unwrap()
}

#[tokio::test]
async fn test_hangup_success() {
    let (base, recorded) = spawn_api().await;
    let control = client(&base, Duration::from_secs(2));

    let outcome = control.hangup("live", "secret").await.unwrap();
    assert_eq!(outcome, HangupOutcome::Terminated);
    assert_eq!(recorded.hangups.lock().as_slice(), ["live".to_string()]);
}

#[tokio::test]
async fn test_hangup_already_terminated_is_success() {
    let (base, _) = spawn_api().await;
    let control = client(&base, Duration::from_secs(2));

    let outcome = control.hangup("ended", "secret").await.unwrap();
    assert_eq!(outcome, HangupOutcome::AlreadyTerminated);
}

#[tokio::test]
async fn test_hangup_other_errors_reported() {
    let (base, _) = spawn_api().await;
    let control = client(&base, Duration::from_secs(2));

    match control.hangup("invalid", "secret").await {
        Err(CallControlError::Api { status, body }) => {
            assert_eq!(status, 422);
            assert!(body.contains("10015"));
        },
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(matches!(
        control.hangup("broken", "secret").await,
        Err(CallControlError::Api { status: 500, .. })
    ));
    assert!(matches!(
        control.hangup("live", "wrong").await,
        Err(CallControlError::Api { status: 401, .. })
    ));
}

#[tokio::test]
async fn test_hangup_timeout() {
    let (base, _) = spawn_api().await;
    let control = client(&base, Duration::from_millis(100));

    assert!(matches!(
        control.hangup("slow", "secret").await,
        Err(CallControlError::Timeout)
    ));
}

#[tokio::test]
async fn test_transfer_posts_destination() {
    let (base, recorded) = spawn_api().await;
    let control = client(&base, Duration::from_secs(2));

    control
        .transfer(
            "live",
            "secret",
            &TransferRequest::new("+15550001111").with_from("+15550002222"),
        )
        .await
        .unwrap();

    let transfers = recorded.transfers.lock();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0]["to"], "+15550001111");
    assert_eq!(transfers[0]["from"], "+15550002222");
}

#[tokio::test]
async fn test_transfer_failure_reported() {
    let (base, _) = spawn_api().await;
    let control = client(&base, Duration::from_secs(2));

    let result = control
        .transfer("live", "wrong", &TransferRequest::new("+1555"))
        .await;
    assert!(matches!(result, Err(CallControlError::Api { status: 401, .. })));
}
