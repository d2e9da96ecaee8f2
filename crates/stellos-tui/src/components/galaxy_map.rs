//! GalaxyMap component — draws the neighbour web and the stars on a braille
//! canvas and turns raw mouse/keyboard input into hover, play and camera
//! actions.
//!
//! Layer content is computed by `build_layers`, independent of the terminal,
//! and only then painted.

use std::collections::HashMap;

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Circle, Line as CanvasLine, Points},
        Block, Borders, Clear, Paragraph,
    },
    Frame,
};
use stellos_proto::geometry::NeighborEdge;
use stellos_proto::track::Track;
use unicode_width::UnicodeWidthStr;

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    interaction::{Viewport, PLANE_SIZE},
    theme::{
        style_border, style_default, style_muted, style_secondary, C_BG, C_EDGE, C_LABEL, C_STAR,
        C_STAR_HOVERED,
    },
};

const BASE_RADIUS: f64 = 0.8;
const VOTE_RADIUS: f64 = 0.25;
const MAX_RADIUS: f64 = 3.0;
/// Minimum pick distance, in terminal columns.
const PICK_CELLS: f64 = 1.5;
const PAN_STEP: f64 = 0.1;
const ZOOM_STEP: f64 = 0.5;

/// Star radius in plane units at the default zoom.
pub fn point_radius(vote_score: u64) -> f64 {
    (BASE_RADIUS + VOTE_RADIUS * vote_score as f64).min(MAX_RADIUS)
}

fn scaled_radius(vote_score: u64, viewport: &Viewport) -> f64 {
    point_radius(vote_score) * viewport.visible_span() / PLANE_SIZE
}

// ── layers ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSegment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StarMark {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub color: Color,
    pub hovered: bool,
    pub playing: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapLayers {
    pub lines: Vec<EdgeSegment>,
    /// Hovered star last so it paints on top.
    pub points: Vec<StarMark>,
}

/// Resolve edges to live positions by id and style every star.  Edges whose
/// endpoints are not in `tracks` are skipped.
pub fn build_layers(
    tracks: &[Track],
    edges: &[NeighborEdge],
    hovered: Option<&str>,
    playing: Option<&str>,
    viewport: &Viewport,
) -> MapLayers {
    let positions: HashMap<&str, (f64, f64)> = tracks
        .iter()
        .map(|t| (t.id.as_str(), t.position()))
        .collect();

    let lines = edges
        .iter()
        .filter_map(|e| {
            let (x1, y1) = *positions.get(e.a.as_str())?;
            let (x2, y2) = *positions.get(e.b.as_str())?;
            Some(EdgeSegment { x1, y1, x2, y2 })
        })
        .collect();

    let mut points: Vec<StarMark> = tracks
        .iter()
        .map(|t| {
            let is_hovered = hovered == Some(t.id.as_str());
            StarMark {
                id: t.id.clone(),
                x: t.x,
                y: t.y,
                radius: scaled_radius(t.vote_score, viewport),
                color: if is_hovered { C_STAR_HOVERED } else { C_STAR },
                hovered: is_hovered,
                playing: playing == Some(t.id.as_str()),
            }
        })
        .collect();
    points.sort_by_key(|p| p.hovered);

    MapLayers { lines, points }
}

// ── projection ────────────────────────────────────────────────────────────────

/// Mapping between terminal cells in `area` and plane coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub x_bounds: [f64; 2],
    pub y_bounds: [f64; 2],
    area: Rect,
}

impl Projection {
    pub fn new(viewport: &Viewport, area: Rect) -> Self {
        let span = viewport.visible_span();
        // A cell is roughly twice as tall as it is wide.
        let w = area.width.max(1) as f64;
        let h = area.height.max(1) as f64 * 2.0;
        let (sx, sy) = if w >= h {
            (span * w / h, span)
        } else {
            (span, span * h / w)
        };
        Self {
            x_bounds: [viewport.longitude - sx / 2.0, viewport.longitude + sx / 2.0],
            y_bounds: [viewport.latitude - sy / 2.0, viewport.latitude + sy / 2.0],
            area,
        }
    }

    pub fn units_per_col(&self) -> f64 {
        (self.x_bounds[1] - self.x_bounds[0]) / self.area.width.max(1) as f64
    }

    pub fn units_per_row(&self) -> f64 {
        (self.y_bounds[1] - self.y_bounds[0]) / self.area.height.max(1) as f64
    }

    pub fn contains(&self, col: u16, row: u16) -> bool {
        col >= self.area.x
            && col < self.area.x + self.area.width
            && row >= self.area.y
            && row < self.area.y + self.area.height
    }

    /// Center of cell `(col, row)` in plane coordinates.  The canvas puts
    /// `y_bounds[1]` on the top row.
    pub fn cell_to_plane(&self, col: u16, row: u16) -> Option<(f64, f64)> {
        if !self.contains(col, row) {
            return None;
        }
        let x = self.x_bounds[0] + ((col - self.area.x) as f64 + 0.5) * self.units_per_col();
        let y = self.y_bounds[1] - ((row - self.area.y) as f64 + 0.5) * self.units_per_row();
        Some((x, y))
    }
}

/// Nearest track under cell `(col, row)`, if any is within reach.
pub fn track_at<'a>(
    tracks: &'a [Track],
    viewport: &Viewport,
    projection: &Projection,
    col: u16,
    row: u16,
) -> Option<&'a Track> {
    let (px, py) = projection.cell_to_plane(col, row)?;
    let min_reach = PICK_CELLS * projection.units_per_col();
    tracks
        .iter()
        .map(|t| (t, (t.x - px).hypot(t.y - py)))
        .filter(|(t, d)| *d <= scaled_radius(t.vote_score, viewport).max(min_reach))
        .min_by(|(ta, da), (tb, db)| da.total_cmp(db).then_with(|| ta.id.cmp(&tb.id)))
        .map(|(t, _)| t)
}

fn map_block(state: &AppState) -> Block<'static> {
    let ism = &state.interaction;
    Block::default()
        .borders(Borders::ALL)
        .border_style(style_border())
        .title(Line::from(vec![
            Span::styled(" galaxy ", style_default().add_modifier(Modifier::BOLD)),
            Span::styled(
                format!("{} stars · {} links ", ism.tracks().len(), ism.edges().len()),
                style_muted(),
            ),
        ]))
}

// ── component ─────────────────────────────────────────────────────────────────

struct Drag {
    col: u16,
    row: u16,
    origin: Viewport,
}

#[derive(Default)]
pub struct GalaxyMap {
    drag: Option<Drag>,
}

impl GalaxyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Drop a pan whose release went somewhere else.
    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }
}

impl Component for GalaxyMap {
    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        let vp = state.interaction.viewport();
        match key.code {
            KeyCode::Left | KeyCode::Char('h') => vec![Action::SetViewport(vp.panned(-PAN_STEP, 0.0))],
            KeyCode::Right | KeyCode::Char('l') => vec![Action::SetViewport(vp.panned(PAN_STEP, 0.0))],
            KeyCode::Up | KeyCode::Char('k') => vec![Action::SetViewport(vp.panned(0.0, PAN_STEP))],
            KeyCode::Down | KeyCode::Char('j') => vec![Action::SetViewport(vp.panned(0.0, -PAN_STEP))],
            KeyCode::Char('+') | KeyCode::Char('=') => vec![Action::SetViewport(vp.zoomed(1.0))],
            KeyCode::Char('-') => vec![Action::SetViewport(vp.zoomed(-1.0))],
            KeyCode::Char('0') => vec![Action::SetViewport(Viewport::default())],
            KeyCode::Tab => vec![Action::HoverNext],
            KeyCode::BackTab => vec![Action::HoverPrev],
            KeyCode::Enter => vec![Action::PlayHovered],
            KeyCode::Esc => vec![Action::HoverLeave],
            _ => vec![],
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, state: &AppState) -> Vec<Action> {
        let ism = &state.interaction;
        let viewport = ism.viewport();
        let projection = Projection::new(&viewport, map_block(state).inner(area));
        let hit = || {
            track_at(ism.tracks(), &viewport, &projection, event.column, event.row)
                .map(|t| t.id.clone())
        };

        match event.kind {
            MouseEventKind::Moved => match hit() {
                Some(id) if ism.hovered_id() == Some(id.as_str()) => vec![],
                Some(id) => vec![Action::Hover(id)],
                None if ism.hovered_id().is_some() => vec![Action::HoverLeave],
                None => vec![],
            },
            MouseEventKind::Down(MouseButton::Left) => {
                self.drag = None;
                if !projection.contains(event.column, event.row) {
                    return vec![];
                }
                match hit() {
                    Some(id) => vec![Action::Play(id)],
                    None => {
                        self.drag = Some(Drag {
                            col: event.column,
                            row: event.row,
                            origin: viewport,
                        });
                        vec![]
                    }
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let Some(drag) = &self.drag else {
                    return vec![];
                };
                let dx = (event.column as f64 - drag.col as f64) * projection.units_per_col();
                let dy = (event.row as f64 - drag.row as f64) * projection.units_per_row();
                vec![Action::SetViewport(
                    Viewport {
                        longitude: drag.origin.longitude - dx,
                        latitude: drag.origin.latitude + dy,
                        zoom: drag.origin.zoom,
                    }
                    .clamped(),
                )]
            }
            MouseEventKind::Up(MouseButton::Left) => {
                self.drag = None;
                vec![]
            }
            MouseEventKind::ScrollUp if projection.contains(event.column, event.row) => {
                vec![Action::SetViewport(viewport.zoomed(ZOOM_STEP))]
            }
            MouseEventKind::ScrollDown if projection.contains(event.column, event.row) => {
                vec![Action::SetViewport(viewport.zoomed(-ZOOM_STEP))]
            }
            _ => vec![],
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, state: &AppState) {
        let block = map_block(state);
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let ism = &state.interaction;
        if ism.tracks().is_empty() {
            let msg = if state.last_sync.is_some() {
                "no live tracks yet"
            } else {
                "waiting for the galaxy…"
            };
            let y = inner.y + inner.height / 2;
            frame.render_widget(
                Paragraph::new(Line::from(Span::styled(msg, style_muted())))
                    .alignment(ratatui::layout::Alignment::Center),
                Rect { y, height: 1, ..inner },
            );
            return;
        }

        let viewport = ism.viewport();
        let projection = Projection::new(&viewport, inner);
        let layers = build_layers(
            ism.tracks(),
            ism.edges(),
            ism.hovered_id(),
            ism.now_playing().map(|t| t.id.as_str()),
            &viewport,
        );
        let label = layers
            .points
            .iter()
            .find(|p| p.playing)
            .and_then(|p| ism.track(&p.id).map(|t| (p.x, p.y, format!(" ▶ {}", t.display_name()))));

        let canvas = Canvas::default()
            .background_color(C_BG)
            .marker(Marker::Braille)
            .x_bounds(projection.x_bounds)
            .y_bounds(projection.y_bounds)
            .paint(move |ctx| {
                for seg in &layers.lines {
                    ctx.draw(&CanvasLine {
                        x1: seg.x1,
                        y1: seg.y1,
                        x2: seg.x2,
                        y2: seg.y2,
                        color: C_EDGE,
                    });
                }
                ctx.layer();
                for star in &layers.points {
                    ctx.draw(&Circle {
                        x: star.x,
                        y: star.y,
                        radius: star.radius,
                        color: star.color,
                    });
                    ctx.draw(&Points {
                        coords: &[(star.x, star.y)],
                        color: star.color,
                    });
                }
                if let Some((x, y, text)) = &label {
                    ctx.print(
                        *x,
                        *y,
                        Line::styled(
                            text.clone(),
                            Style::default().fg(C_LABEL).add_modifier(Modifier::BOLD),
                        ),
                    );
                }
            });
        frame.render_widget(canvas, inner);

        if let Some(track) = ism.hovered() {
            draw_tooltip(frame, inner, track);
        }
    }
}

/// Title, artist and votes of the hovered star in the map's top-left corner.
fn draw_tooltip(frame: &mut Frame, inner: Rect, track: &Track) {
    let title = if track.title.is_empty() {
        track.id.clone()
    } else {
        track.title.clone()
    };
    let artist = if track.artist_name.is_empty() {
        "unknown artist".to_string()
    } else {
        track.artist_name.clone()
    };
    let meta = format!(
        "♥ {}{}",
        track.vote_score,
        if track.has_preview() { "  · preview" } else { "" }
    );
    let width = [title.as_str(), artist.as_str(), meta.as_str()]
        .iter()
        .map(|s| UnicodeWidthStr::width(*s))
        .max()
        .unwrap_or(0) as u16
        + 4;

    let tip = Rect {
        x: inner.x,
        y: inner.y,
        width: width.min(inner.width),
        height: 5u16.min(inner.height),
    };
    let lines = vec![
        Line::from(Span::styled(title, style_default().add_modifier(Modifier::BOLD))),
        Line::from(Span::styled(artist, style_secondary())),
        Line::from(Span::styled(meta, style_muted())),
    ];
    frame.render_widget(Clear, tip);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(C_STAR_HOVERED))
                .style(Style::default().bg(C_BG)),
        ),
        tip,
    );
}
