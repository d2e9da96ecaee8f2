//! AppState — shared read-only data passed to all components during render
//! and event handling.  The App event loop is the only writer.

use chrono::{DateTime, Local};

use crate::interaction::InteractionStateMachine;
use crate::playback::Transport;

pub struct AppState {
    pub interaction: InteractionStateMachine,
    /// Mirror of the coordinator's playback channel, refreshed after every
    /// transport change.
    pub transport: Transport,
    /// 0..=100, from `report_progress`.
    pub progress: f64,
    pub api_url: String,
    pub session_id: String,
    pub balance: Option<i64>,
    pub last_sync: Option<DateTime<Local>>,
    pub audio_available: bool,
}

impl AppState {
    pub fn new(neighbors: usize, api_url: String, session_id: String) -> Self {
        Self {
            interaction: InteractionStateMachine::new(neighbors),
            transport: Transport::default(),
            progress: 0.0,
            api_url,
            session_id,
            balance: None,
            last_sync: None,
            audio_available: false,
        }
    }

    /// Track a vote applies to: the hovered one, else the playing one.
    pub fn vote_target(&self) -> Option<String> {
        self.interaction
            .hovered_id()
            .map(str::to_string)
            .or_else(|| self.interaction.now_playing().map(|t| t.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellos_proto::track::Track;

    #[test]
    fn test_vote_target_prefers_hover() {
        let mut state = AppState::new(2, "http://localhost:7860".into(), "tui-test".into());
        assert_eq!(state.vote_target(), None);

        let tracks = ["a", "b"]
            .iter()
            .map(|id| Track {
                id: id.to_string(),
                ..Track::default()
            })
            .collect();
        state.interaction.apply_snapshot(1, tracks);
        state.interaction.on_click("a");
        assert_eq!(state.vote_target().as_deref(), Some("a"));
        state.interaction.on_pointer_enter("b");
        assert_eq!(state.vote_target().as_deref(), Some("b"));
    }
}
