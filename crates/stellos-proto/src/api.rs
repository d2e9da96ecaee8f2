//! REST client for the galaxy backend.
//!
//! Only `fetch_live_tracks` feeds the map.  Upload, balance and vote are thin
//! request/response calls used by the CLI and the vote key.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ApiConfig;
use crate::track::{Track, TrackListing};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadReceipt {
    pub track_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenBalance {
    pub session_id: String,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoteReceipt {
    pub track_id: String,
    pub vote_score: i64,
    pub balance: i64,
}

#[derive(Serialize)]
struct VoteRequest<'a> {
    session_id: &'a str,
    tokens_spent: u32,
}

/// Cheaply cloneable; the inner `reqwest::Client` shares its pool.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url().to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `GET /tracks?status=LIVE`.  Non-LIVE rows are dropped even if the
    /// server ignores the filter.
    pub async fn fetch_live_tracks(&self) -> Result<Vec<Track>, ApiError> {
        let resp = self
            .client
            .get(self.url("/tracks"))
            .query(&[("status", "LIVE")])
            .send()
            .await?;
        let listing: TrackListing = check(resp).await?.json().await?;
        let total = listing.tracks.len();
        let live: Vec<Track> = listing.tracks.into_iter().filter(|t| t.is_live()).collect();
        debug!("[api] /tracks: {} rows, {} live", total, live.len());
        Ok(live)
    }

    /// `POST /upload` as multipart (`file`, `title`, `artist_name`).
    /// Title defaults to the file name, artist to "Unknown Artist".
    pub async fn upload(
        &self,
        path: &Path,
        title: Option<&str>,
        artist: Option<&str>,
    ) -> Result<UploadReceipt, ApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(file_name.as_str())
            .to_string();
        let artist = artist
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or("Unknown Artist")
            .to_string();

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name.clone()))
            .text("title", title)
            .text("artist_name", artist);

        let resp = self
            .client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `GET /tokens/balance?session_id=`.
    pub async fn token_balance(&self, session_id: &str) -> Result<TokenBalance, ApiError> {
        let resp = self
            .client
            .get(self.url("/tokens/balance"))
            .query(&[("session_id", session_id)])
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// `POST /tracks/{id}/vote`.
    pub async fn vote(
        &self,
        track_id: &str,
        session_id: &str,
        tokens_spent: u32,
    ) -> Result<VoteReceipt, ApiError> {
        let resp = self
            .client
            .post(self.url(&format!("/tracks/{}/vote", track_id)))
            .json(&VoteRequest {
                session_id,
                tokens_spent,
            })
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}
