//! Loopback control API.
//!
//! Reads come from a `watch` snapshot the event loop republishes after every
//! change; writes are queued as `ControlCommand`s and applied by the event
//! loop like any other input.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

use crate::interaction::Viewport;
use crate::playback::Transport;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrackSummary {
    pub id: String,
    pub title: String,
    pub artist_name: String,
    pub vote_score: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct ControlSnapshot {
    pub tracks: usize,
    pub track_set_version: u64,
    pub hovered: Option<String>,
    pub previewing: Option<String>,
    pub now_playing: Option<TrackSummary>,
    pub transport: Transport,
    pub viewport: Viewport,
    pub last_sync: Option<DateTime<Local>>,
    pub balance: Option<i64>,
}

#[derive(Debug)]
pub enum ControlCommand {
    /// Replies `false` when the id is not on the map.
    Play {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    Close,
    Toggle,
}

#[derive(Clone)]
pub struct HttpState {
    pub snapshot: watch::Receiver<ControlSnapshot>,
    pub cmd_tx: mpsc::Sender<ControlCommand>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/play/:id", post(play_track))
        .route("/api/close", post(close))
        .route("/api/toggle", post(toggle))
        .with_state(state)
}

pub fn start_server(bind_address: String, port: u16, state: HttpState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("[http] failed to bind {}: {}", addr, e);
                return;
            }
        };
        info!("[http] control API listening on http://{}", addr);
        if let Err(e) = axum::serve(listener, router(state)).await {
            error!("[http] server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<ControlSnapshot> {
    Json(state.snapshot.borrow().clone())
}

async fn play_track(State(state): State<HttpState>, Path(id): Path<String>) -> StatusCode {
    info!("[http] play {}", id);
    let (reply, known) = oneshot::channel();
    if state.cmd_tx.send(ControlCommand::Play { id, reply }).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match known.await {
        Ok(true) => StatusCode::OK,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn close(State(state): State<HttpState>) -> StatusCode {
    send(&state, ControlCommand::Close).await
}

async fn toggle(State(state): State<HttpState>) -> StatusCode {
    send(&state, ControlCommand::Toggle).await
}

async fn send(state: &HttpState, cmd: ControlCommand) -> StatusCode {
    info!("[http] {:?}", cmd);
    if state.cmd_tx.send(cmd).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}
