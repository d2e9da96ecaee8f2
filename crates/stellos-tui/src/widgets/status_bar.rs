//! Header and key-hint rows.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::app_state::AppState;
use crate::theme::{style_muted, style_secondary, C_ACCENT, C_MUTED, C_PLAYING, C_PRIMARY, C_TOKENS};

/// One-row header: app name, backend, last sync, token balance.
pub fn draw_header(frame: &mut Frame, area: Rect, state: &AppState) {
    let sync = match state.last_sync {
        Some(t) => Span::styled(format!("● synced {}", t.format("%H:%M:%S")), Style::default().fg(C_PLAYING)),
        None => Span::styled("○ connecting", Style::default().fg(C_ACCENT)),
    };
    let balance = match state.balance {
        Some(b) => Span::styled(format!("◆ {} tokens", b), Style::default().fg(C_TOKENS)),
        None => Span::styled("◆ –", style_muted()),
    };

    let mut spans = vec![
        Span::styled(
            " stellos ",
            Style::default().fg(C_PRIMARY).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("{}  ", state.api_url), style_secondary()),
        sync,
        Span::raw("  "),
        balance,
    ];
    if !state.audio_available {
        spans.push(Span::styled("  ✗ no audio", Style::default().fg(C_ACCENT)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Key hints footer.
pub fn draw_keys_bar(frame: &mut Frame, area: Rect) {
    let keys = " mouse hover/click/drag/wheel  tab hover  enter play  space pause  [ ] seek  x close  v vote  y copy  hjkl pan  +/- zoom  0 reset  ? help  q quit";
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(keys, Style::default().fg(C_MUTED)))),
        area,
    );
}
