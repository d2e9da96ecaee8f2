//! Action enum — all user-initiated intents.
//!
//! Components produce Actions; the App turns them into interaction-state
//! transitions or collaborator calls.  Nothing a component sees is mutated in
//! place.

use crate::interaction::Viewport;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Pointer / hover ──────────────────────────────────────────────────────
    Hover(String),
    HoverLeave,
    HoverNext,
    HoverPrev,

    // ── Playback ─────────────────────────────────────────────────────────────
    Play(String),
    PlayHovered,
    ClosePlayer,
    TogglePlay,
    SeekRelative(f64),

    // ── Camera ───────────────────────────────────────────────────────────────
    SetViewport(Viewport),

    // ── Collaborators ────────────────────────────────────────────────────────
    Vote,
    CopyAudioUrl,

    // ── UI ───────────────────────────────────────────────────────────────────
    ToggleHelp,
    Quit,
}
