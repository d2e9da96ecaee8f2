//! NowPlaying component — transport bar for the playback channel.

use ratatui::crossterm::event::{KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Modifier,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    theme::{style_border, style_default, style_muted, style_playing, style_secondary, C_ACCENT},
    widgets::progress_bar::draw_progress,
};

/// Rows the bar needs, or 0 when nothing is committed.
pub fn height(state: &AppState) -> u16 {
    if state.interaction.now_playing().is_some() {
        4
    } else {
        0
    }
}

pub struct NowPlaying;

impl Component for NowPlaying {
    fn handle_key(&mut self, _key: KeyEvent, _state: &AppState) -> Vec<Action> {
        vec![]
    }

    /// Click on the `✕` closes, anywhere else toggles play/pause.
    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, state: &AppState) -> Vec<Action> {
        if state.interaction.now_playing().is_none()
            || !matches!(event.kind, MouseEventKind::Down(MouseButton::Left))
        {
            return vec![];
        }
        let close_col = area.x + area.width.saturating_sub(4);
        if event.row == area.y + 1 && event.column >= close_col {
            vec![Action::ClosePlayer]
        } else {
            vec![Action::TogglePlay]
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        let Some(track) = state.interaction.now_playing() else {
            return;
        };
        let block = Block::default()
            .borders(Borders::TOP | Borders::BOTTOM)
            .border_style(style_border());
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .split(inner);

        let t = &state.transport;
        let icon = if t.playing {
            Span::styled(" ▶ ", style_playing())
        } else {
            Span::styled(" ⏸ ", style_secondary())
        };
        let title = if track.title.is_empty() {
            track.id.as_str()
        } else {
            track.title.as_str()
        };
        let mut spans = vec![
            icon,
            Span::styled(title.to_string(), style_default().add_modifier(Modifier::BOLD)),
            Span::styled(format!("  {}", track.artist_name), style_secondary()),
            Span::styled(format!("  ♥ {}", track.vote_score), style_muted()),
        ];
        if !track.has_audio() {
            spans.push(Span::styled("  no audio", ratatui::style::Style::default().fg(C_ACCENT)));
        } else if let Some(err) = &t.last_error {
            spans.push(Span::styled(format!("  {}", err), ratatui::style::Style::default().fg(C_ACCENT)));
        }

        let title_row = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(4)])
            .split(rows[0]);
        frame.render_widget(Paragraph::new(Line::from(spans)), title_row[0]);
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(" ✕ ", style_muted()))),
            title_row[1],
        );

        if rows.len() > 1 {
            draw_progress(frame, rows[1], state.progress, t.time_pos, t.duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;
    use stellos_proto::track::Track;

    fn click(column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn test_height_and_clicks() {
        let mut state = AppState::new(2, String::new(), String::new());
        assert_eq!(height(&state), 0);

        let area = Rect::new(0, 40, 80, 4);
        let mut bar = NowPlaying;
        assert!(bar.handle_mouse(click(10, 41), area, &state).is_empty());

        state.interaction.apply_snapshot(
            1,
            vec![Track {
                id: "7".into(),
                ..Track::default()
            }],
        );
        state.interaction.on_click("7");
        assert_eq!(height(&state), 4);
        assert_eq!(bar.handle_mouse(click(10, 41), area, &state), vec![Action::TogglePlay]);
        assert_eq!(bar.handle_mouse(click(78, 41), area, &state), vec![Action::ClosePlayer]);
    }
}
