//! REST client against an in-process axum backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use stellos_proto::api::{ApiClient, ApiError};
use stellos_proto::config::ApiConfig;
use stellos_proto::feed;
use tokio::sync::mpsc;

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/", addr)
}

fn client(base_url: String) -> ApiClient {
    ApiClient::new(&ApiConfig {
        base_url,
        ..ApiConfig::default()
    })
    .unwrap()
}

async fn list_tracks(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if params.get("status").map(String::as_str) != Some("LIVE") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "status filter missing"})));
    }
    // The server "forgets" to filter one row.
    (
        StatusCode::OK,
        Json(json!({
            "tracks": [
                {"id": "1", "title": "Aurora", "artist_name": "Nova", "status": "LIVE",
                 "map_x": 12.5, "map_y": 40.0, "vote_score": 2,
                 "audio_file_url": "http://cdn/1.mp3", "preview_file_url": "http://cdn/1-p.mp3"},
                {"id": "2", "title": "Pending", "status": "PROCESSING", "map_x": 1, "map_y": 1},
                {"id": "3", "title": null, "status": "LIVE", "map_x": 80, "map_y": 20,
                 "vote_score": null, "preview_file_url": null}
            ]
        })),
    )
}

async fn balance(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let session = params.get("session_id").cloned().unwrap_or_default();
    Json(json!({"session_id": session, "balance": 9}))
}

async fn vote(Path(id): Path<String>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["tokens_spent"].as_u64() != Some(1) || body["session_id"] != "tui-test" {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad vote"})));
    }
    if id == "broke" {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Insufficient tokens"})));
    }
    (
        StatusCode::OK,
        Json(json!({"track_id": id, "vote_score": 4, "balance": 8})),
    )
}

fn backend() -> Router {
    Router::new()
        .route("/tracks", get(list_tracks))
        .route("/tokens/balance", get(balance))
        .route("/tracks/:id/vote", post(vote))
}

#[tokio::test]
async fn test_fetch_live_tracks_filters_and_decodes() {
    let api = client(serve(backend()).await);
    let tracks = api.fetch_live_tracks().await.unwrap();

    let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    assert_eq!(tracks[0].display_name(), "Aurora — Nova");
    assert_eq!(tracks[0].vote_score, 2);
    assert_eq!(tracks[1].title, "");
    assert!(!tracks[1].has_preview());
}

#[tokio::test]
async fn test_balance_and_vote() {
    let api = client(serve(backend()).await);

    let balance = api.token_balance("tui-test").await.unwrap();
    assert_eq!(balance.session_id, "tui-test");
    assert_eq!(balance.balance, 9);

    let receipt = api.vote("1", "tui-test", 1).await.unwrap();
    assert_eq!(receipt.track_id, "1");
    assert_eq!(receipt.balance, 8);

    match api.vote("broke", "tui-test", 1).await {
        Err(ApiError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 400);
            assert!(body.contains("Insufficient tokens"));
        }
        other => panic!("expected status error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_server_error_is_status_error() {
    let router = Router::new().route(
        "/tracks",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "db down") }),
    );
    let api = client(serve(router).await);
    match api.fetch_live_tracks().await {
        Err(ApiError::Status { status, body }) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, "db down");
        }
        other => panic!("expected status error, got {:?}", other.map(|t| t.len())),
    }
}

#[tokio::test]
async fn test_unreachable_backend_is_http_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = client(format!("http://{}", addr));
    assert!(matches!(api.fetch_live_tracks().await, Err(ApiError::Http(_))));
}

#[tokio::test]
async fn test_feed_delivers_from_real_client() {
    let api = Arc::new(client(serve(backend()).await));
    let (tx, mut rx) = mpsc::channel(8);
    let handle = feed::start(api, Duration::from_secs(60), move |snap| {
        let _ = tx.try_send(snap);
    });

    let snap = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snap.seq, 1);
    assert_eq!(snap.tracks.len(), 2);
    handle.cancel();
}
