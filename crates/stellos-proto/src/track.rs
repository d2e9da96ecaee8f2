use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of a track on the backend.  Only `Live` tracks reach the map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackStatus {
    Live,
    Uploaded,
    Processing,
    /// Anything the backend invents later, or no status at all.  Never a
    /// decode failure.
    #[default]
    #[serde(other)]
    Other,
}

/// One star on the map.
///
/// `id` is the identity across polling refreshes; every other field may change
/// between two snapshots without the track becoming a different entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Track {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artist_name: String,
    /// Horizontal position in the 0..100 plane.
    #[serde(rename = "map_x", default, deserialize_with = "null_as_default")]
    pub x: f64,
    /// Vertical position in the 0..100 plane.
    #[serde(rename = "map_y", default, deserialize_with = "null_as_default")]
    pub y: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: TrackStatus,
    #[serde(default, deserialize_with = "non_negative_score")]
    pub vote_score: u64,
    /// Full-length audio locator.  Empty means "not playable".
    #[serde(rename = "audio_file_url", default, deserialize_with = "null_as_default")]
    pub audio_url: String,
    /// Short preview locator.  Empty means "no preview".
    #[serde(rename = "preview_file_url", default, deserialize_with = "null_as_default")]
    pub preview_url: String,
}

impl Track {
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn is_live(&self) -> bool {
        self.status == TrackStatus::Live
    }

    pub fn has_audio(&self) -> bool {
        !self.audio_url.trim().is_empty()
    }

    pub fn has_preview(&self) -> bool {
        !self.preview_url.trim().is_empty()
    }

    /// "Title — Artist", falling back to the id when the backend sent no title.
    pub fn display_name(&self) -> String {
        let title = if self.title.is_empty() {
            self.id.as_str()
        } else {
            self.title.as_str()
        };
        if self.artist_name.is_empty() {
            title.to_string()
        } else {
            format!("{} — {}", title, self.artist_name)
        }
    }
}

/// Body of `GET /tracks`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrackListing {
    #[serde(default)]
    pub tracks: Vec<Track>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_negative_score<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
    Ok(raw.max(0) as u64)
}
