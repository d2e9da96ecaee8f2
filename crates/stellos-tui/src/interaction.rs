//! InteractionStateMachine — the single owner of hover, now-playing and camera
//! state.
//!
//! Three orthogonal axes:
//!
//! ```text
//!   hover     ∈ { none, track id }       pointer enter / leave
//!   playback  ∈ { idle, playing(track) } click / close
//!   viewport  (continuous)               pan / zoom
//! ```
//!
//! Every handler returns the `Transition`s it caused; the event loop forwards
//! them to the `PlaybackCoordinator`.  Nothing else mutates this state.

use std::collections::HashMap;

use serde::Serialize;
use stellos_proto::geometry::{NeighborEdge, NeighborGraph};
use stellos_proto::track::Track;
use tracing::debug;

/// Side length of the normalized track plane.
pub const PLANE_SIZE: f64 = 100.0;
/// Zoom level at which the whole plane fits the view.
pub const DEFAULT_ZOOM: f64 = 4.0;
pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 10.0;

/// Camera over the plane: `longitude`/`latitude` are the center, `zoom` is
/// logarithmic (one step halves the visible span).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            longitude: PLANE_SIZE / 2.0,
            latitude: PLANE_SIZE / 2.0,
            zoom: DEFAULT_ZOOM,
        }
    }
}

impl Viewport {
    /// Clamp zoom into range and replace non-finite components with defaults.
    pub fn clamped(self) -> Self {
        let d = Self::default();
        Self {
            longitude: if self.longitude.is_finite() { self.longitude } else { d.longitude },
            latitude: if self.latitude.is_finite() { self.latitude } else { d.latitude },
            zoom: if self.zoom.is_finite() {
                self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
            } else {
                d.zoom
            },
        }
    }

    /// Plane units covered by the shorter side of the view.
    pub fn visible_span(&self) -> f64 {
        PLANE_SIZE / 2f64.powf(self.zoom - DEFAULT_ZOOM)
    }

    /// Move the center by a fraction of the visible span.
    pub fn panned(self, dx: f64, dy: f64) -> Self {
        let span = self.visible_span();
        Self {
            longitude: self.longitude + dx * span,
            latitude: self.latitude + dy * span,
            ..self
        }
        .clamped()
    }

    pub fn zoomed(self, delta: f64) -> Self {
        Self {
            zoom: self.zoom + delta,
            ..self
        }
        .clamped()
    }
}

/// Observable effect of a handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Hover moved to a track, or was cleared.
    HoverChanged(Option<Track>),
    /// A track was committed to the playback channel, or playback was closed.
    /// Re-selecting the playing track emits this again (restart).
    NowPlayingChanged(Option<Track>),
    /// The authoritative list was swapped; `version` counts accepted changes.
    TracksReplaced { version: u64 },
    ViewportChanged(Viewport),
}

pub struct InteractionStateMachine {
    tracks: Vec<Track>,
    index: HashMap<String, usize>,
    hovered: Option<String>,
    now_playing: Option<Track>,
    viewport: Viewport,
    graph: NeighborGraph,
    version: u64,
    applied_seq: u64,
}

impl InteractionStateMachine {
    pub fn new(neighbors: usize) -> Self {
        Self {
            tracks: Vec::new(),
            index: HashMap::new(),
            hovered: None,
            now_playing: None,
            viewport: Viewport::default(),
            graph: NeighborGraph::new(neighbors),
            version: 0,
            applied_seq: 0,
        }
    }

    // ── accessors ─────────────────────────────────────────────────────────────

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: &str) -> Option<&Track> {
        self.index.get(id).map(|&i| &self.tracks[i])
    }

    pub fn hovered_id(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn hovered(&self) -> Option<&Track> {
        self.hovered.as_deref().and_then(|id| self.track(id))
    }

    /// Snapshot of the committed track.  May refer to an id that is no longer
    /// in the feed.
    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.as_ref()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn edges(&self) -> &[NeighborEdge] {
        self.graph.edges()
    }

    pub fn track_set_version(&self) -> u64 {
        self.version
    }

    pub fn applied_seq(&self) -> u64 {
        self.applied_seq
    }

    // ── pointer ───────────────────────────────────────────────────────────────

    pub fn on_pointer_enter(&mut self, id: &str) -> Vec<Transition> {
        let Some(track) = self.track(id).cloned() else {
            return vec![];
        };
        if self.hovered.as_deref() == Some(id) {
            return vec![];
        }
        self.hovered = Some(track.id.clone());
        vec![Transition::HoverChanged(Some(track))]
    }

    pub fn on_pointer_leave(&mut self) -> Vec<Transition> {
        if self.hovered.take().is_none() {
            return vec![];
        }
        vec![Transition::HoverChanged(None)]
    }

    /// Commit `id` to the playback channel.  A track without an audio locator
    /// is still accepted; the coordinator decides whether anything loads.
    pub fn on_click(&mut self, id: &str) -> Vec<Transition> {
        let Some(track) = self.track(id).cloned() else {
            debug!("[ism] click on unknown id {}", id);
            return vec![];
        };
        self.now_playing = Some(track.clone());
        vec![Transition::NowPlayingChanged(Some(track))]
    }

    pub fn close_now_playing(&mut self) -> Vec<Transition> {
        if self.now_playing.take().is_none() {
            return vec![];
        }
        vec![Transition::NowPlayingChanged(None)]
    }

    pub fn on_viewport_change(&mut self, viewport: Viewport) -> Vec<Transition> {
        let viewport = viewport.clamped();
        if viewport == self.viewport {
            return vec![];
        }
        self.viewport = viewport;
        vec![Transition::ViewportChanged(viewport)]
    }

    // ── keyboard equivalents ──────────────────────────────────────────────────

    /// Move hover to the next track in id order (wrapping).
    pub fn hover_next(&mut self) -> Vec<Transition> {
        self.hover_step(true)
    }

    pub fn hover_prev(&mut self) -> Vec<Transition> {
        self.hover_step(false)
    }

    fn hover_step(&mut self, forward: bool) -> Vec<Transition> {
        let mut ids: Vec<&str> = self.tracks.iter().map(|t| t.id.as_str()).collect();
        if ids.is_empty() {
            return vec![];
        }
        ids.sort_unstable();
        let n = ids.len();
        let next = match self.hovered.as_deref().and_then(|h| ids.iter().position(|id| *id == h)) {
            Some(i) if forward => (i + 1) % n,
            Some(i) => (i + n - 1) % n,
            None if forward => 0,
            None => n - 1,
        };
        let id = ids[next].to_string();
        self.on_pointer_enter(&id)
    }

    pub fn play_hovered(&mut self) -> Vec<Transition> {
        match self.hovered.clone() {
            Some(id) => self.on_click(&id),
            None => vec![],
        }
    }

    // ── feed ──────────────────────────────────────────────────────────────────

    /// Replace the authoritative list with snapshot `seq`.
    ///
    /// Snapshots issued before the last applied one are discarded, so a slow
    /// fetch never overwrites a newer list.  Hover and now-playing are
    /// re-resolved by id.
    pub fn apply_snapshot(&mut self, seq: u64, tracks: Vec<Track>) -> Vec<Transition> {
        if seq <= self.applied_seq {
            debug!(
                "[ism] discarding snapshot seq={} (applied {})",
                seq, self.applied_seq
            );
            return vec![];
        }
        self.applied_seq = seq;

        let tracks = dedupe_by_id(tracks);
        if tracks == self.tracks {
            return vec![];
        }

        self.index = tracks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        self.tracks = tracks;
        self.version += 1;
        if self.graph.refresh(&self.tracks) {
            debug!(
                "[ism] neighbour graph rebuilt: {} tracks, {} edges",
                self.tracks.len(),
                self.graph.edges().len()
            );
        }

        let mut out = vec![Transition::TracksReplaced {
            version: self.version,
        }];

        if let Some(id) = self.hovered.as_deref() {
            if !self.index.contains_key(id) {
                debug!("[ism] hovered {} vanished", id);
                self.hovered = None;
                out.push(Transition::HoverChanged(None));
            }
        }

        // Refresh metadata of the playing track without a transition, so the
        // audio is not reloaded.  A vanished track stays as it was.
        if let Some(playing) = self.now_playing.as_mut() {
            if let Some(&i) = self.index.get(&playing.id) {
                *playing = self.tracks[i].clone();
            } else {
                debug!("[ism] playing {} no longer live, retained", playing.id);
            }
        }

        out
    }
}

impl Default for InteractionStateMachine {
    fn default() -> Self {
        Self::new(stellos_proto::geometry::DEFAULT_NEIGHBORS)
    }
}

fn dedupe_by_id(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = std::collections::HashSet::with_capacity(tracks.len());
    tracks
        .into_iter()
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}
