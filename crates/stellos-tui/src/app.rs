//! App — component-based event loop.
//!
//! Architecture:
//! - `App` owns the components, `AppState` and the `PlaybackCoordinator`.
//! - A `tokio::mpsc` channel carries `AppMessage`s in from background tasks:
//!   terminal input, feed snapshots, mpv events, REST replies and control API
//!   commands.
//! - Components return `Vec<Action>`; `dispatch` turns each one into
//!   interaction transitions, which are forwarded to the coordinator.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use ratatui::crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use stellos_proto::api::{ApiClient, VoteReceipt};
use stellos_proto::config::Config;
use stellos_proto::feed::{self, FeedSnapshot};

use crate::{
    action::Action,
    app_state::AppState,
    component::Component,
    components::{
        galaxy_map::GalaxyMap,
        help_overlay::HelpOverlay,
        now_playing::{self, NowPlaying},
    },
    http::{self, ControlCommand, ControlSnapshot, HttpState, TrackSummary},
    interaction::Transition,
    mpv::{MpvDriver, MpvEvent, MpvSink},
    playback::{Channel, PlaybackCoordinator, SinkEvent},
    widgets::{status_bar, toast::ToastManager},
};

const SEEK_STEP_SECS: f64 = 10.0;
const VOTE_TOKENS: u32 = 1;

// ── Internal event bus ────────────────────────────────────────────────────────

enum AppMessage {
    Event(Event),
    Snapshot(FeedSnapshot),
    Audio(Channel, SinkEvent),
    Balance(Result<i64, String>),
    VoteDone(Result<VoteReceipt, String>),
    Control(ControlCommand),
}

pub struct App {
    config: Config,
    api: ApiClient,
    state: AppState,
    coordinator: PlaybackCoordinator<MpvSink>,
    drivers: Vec<MpvDriver>,

    galaxy: GalaxyMap,
    now_playing: NowPlaying,
    help: HelpOverlay,
    toast: ToastManager,

    /// Last drawn areas, for mouse routing.
    map_area: Rect,
    player_area: Rect,

    snapshot_tx: watch::Sender<ControlSnapshot>,
    tx: Option<mpsc::Sender<AppMessage>>,
    clipboard: Option<arboard::Clipboard>,
    should_quit: bool,
}

impl App {
    pub fn new(config: Config, api: ApiClient, session_id: String) -> Self {
        let state = AppState::new(
            config.map.neighbors,
            api.base_url().to_string(),
            session_id,
        );
        let (snapshot_tx, _) = watch::channel(ControlSnapshot::default());
        Self {
            config,
            api,
            state,
            coordinator: PlaybackCoordinator::new(
                MpvSink::disconnected(Channel::Preview),
                MpvSink::disconnected(Channel::Playback),
            ),
            drivers: Vec::new(),
            galaxy: GalaxyMap::new(),
            now_playing: NowPlaying,
            help: HelpOverlay::default(),
            toast: ToastManager::new(),
            map_area: Rect::default(),
            player_area: Rect::default(),
            snapshot_tx,
            tx: None,
            clipboard: None,
            should_quit: false,
        }
    }

    // ── Main run loop ─────────────────────────────────────────────────────────

    pub async fn run(mut self) -> anyhow::Result<()> {
        let (tx, mut rx) = mpsc::channel::<AppMessage>(1024);
        self.tx = Some(tx.clone());

        self.start_audio(&tx).await;

        debug!("run(): enabling raw mode");
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        debug!("run(): terminal created, size={:?}", terminal.size());

        // ── Background task: keyboard/mouse events ────────────────────────────
        let event_tx = tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match event::read() {
                Ok(ev) => {
                    if event_tx.blocking_send(AppMessage::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        });

        // ── Background task: track feed ───────────────────────────────────────
        let feed_tx = tx.clone();
        let feed = feed::start(
            Arc::new(self.api.clone()),
            self.config.api.poll_interval(),
            move |snapshot| {
                if feed_tx.try_send(AppMessage::Snapshot(snapshot)).is_err() {
                    debug!("[feed] UI queue full, snapshot dropped");
                }
            },
        );

        // ── Control API ───────────────────────────────────────────────────────
        if self.config.http.enabled {
            let (cmd_tx, mut cmd_rx) = mpsc::channel::<ControlCommand>(64);
            http::start_server(
                self.config.http.bind_address.clone(),
                self.config.http.port,
                HttpState {
                    snapshot: self.snapshot_tx.subscribe(),
                    cmd_tx,
                },
            );
            let control_tx = tx.clone();
            tokio::spawn(async move {
                while let Some(cmd) = cmd_rx.recv().await {
                    if control_tx.send(AppMessage::Control(cmd)).await.is_err() {
                        break;
                    }
                }
            });
        }

        self.refresh_balance();
        self.publish();

        let mut toast_tick = tokio::time::interval(Duration::from_millis(250));
        toast_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // ── Main loop ─────────────────────────────────────────────────────────
        let mut needs_redraw = true;
        loop {
            if needs_redraw {
                terminal.draw(|f| self.draw(f))?;
            }

            if self.should_quit {
                break;
            }

            tokio::select! {
                Some(msg) = rx.recv() => {
                    const MAX_DRAIN: usize = 256;
                    let mut redraw = self.handle_message(msg);
                    let mut drained = 0usize;
                    while drained < MAX_DRAIN {
                        let Ok(next) = rx.try_recv() else {
                            break;
                        };
                        drained += 1;
                        redraw |= self.handle_message(next);
                    }
                    self.publish();
                    needs_redraw = redraw;
                }

                _ = toast_tick.tick() => {
                    needs_redraw = self.toast.tick();
                }
            }
        }

        // ── Teardown ──────────────────────────────────────────────────────────
        feed.cancel();
        for driver in &mut self.drivers {
            driver.kill().await;
        }
        disable_raw_mode()?;
        execute!(
            terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        )?;
        terminal.show_cursor()?;
        info!("stellos exiting");

        Ok(())
    }

    // ── Audio ─────────────────────────────────────────────────────────────────

    /// Spawn one mpv per channel.  A channel that fails stays disconnected.
    async fn start_audio(&mut self, tx: &mpsc::Sender<AppMessage>) {
        let (preview, preview_driver) =
            connect_sink(Channel::Preview, self.config.audio.preview_volume, tx).await;
        let (playback, playback_driver) =
            connect_sink(Channel::Playback, self.config.audio.playback_volume, tx).await;

        self.state.audio_available = preview.is_connected() && playback.is_connected();
        if !self.state.audio_available {
            self.toast
                .warning("audio unavailable: mpv not found or failed to start");
        }
        self.coordinator = PlaybackCoordinator::new(preview, playback);
        self.drivers = preview_driver.into_iter().chain(playback_driver).collect();
    }

    fn sync_transport(&mut self) {
        self.state.transport = self.coordinator.transport().clone();
        self.state.progress = self.coordinator.progress();
    }

    // ── Message handler ───────────────────────────────────────────────────────

    /// Returns `true` if the message requires a redraw.
    fn handle_message(&mut self, msg: AppMessage) -> bool {
        match msg {
            AppMessage::Event(ev) => match ev {
                Event::Key(key) => {
                    for a in self.handle_key(key) {
                        self.dispatch(a);
                    }
                }
                Event::Mouse(mouse) => {
                    let actions = self.handle_mouse(mouse);
                    if actions.is_empty() {
                        return false;
                    }
                    for a in actions {
                        self.dispatch(a);
                    }
                }
                Event::Resize(_, _) => {}
                _ => return false,
            },

            AppMessage::Snapshot(snapshot) => {
                debug!(
                    "[feed] snapshot seq={} with {} tracks (applied {})",
                    snapshot.seq,
                    snapshot.tracks.len(),
                    self.state.interaction.applied_seq()
                );
                self.state.last_sync = Some(snapshot.fetched_at);
                let transitions = self
                    .state
                    .interaction
                    .apply_snapshot(snapshot.seq, snapshot.tracks);
                self.apply(transitions);
            }

            AppMessage::Audio(channel, event) => {
                self.coordinator.handle_event(channel, event);
                self.sync_transport();
            }

            AppMessage::Balance(result) => match result {
                Ok(balance) => self.state.balance = Some(balance),
                Err(e) => warn!("[api] balance: {}", e),
            },

            AppMessage::VoteDone(result) => match result {
                Ok(receipt) => {
                    self.state.balance = Some(receipt.balance);
                    self.toast.success(format!(
                        "voted · score {} · {} tokens left",
                        receipt.vote_score, receipt.balance
                    ));
                    self.refresh_balance();
                }
                Err(e) => {
                    warn!("[api] vote failed: {}", e);
                    self.toast.error(format!("vote failed: {}", e));
                }
            },

            AppMessage::Control(cmd) => match cmd {
                ControlCommand::Play { id, reply } => {
                    let known = self.state.interaction.track(&id).is_some();
                    if known {
                        self.dispatch(Action::Play(id));
                    }
                    let _ = reply.send(known);
                }
                ControlCommand::Close => self.dispatch(Action::ClosePlayer),
                ControlCommand::Toggle => self.dispatch(Action::TogglePlay),
            },
        }
        true
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        if self.help.visible {
            return self.help.handle_key(key, &self.state);
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return vec![Action::Quit];
        }
        match key.code {
            KeyCode::Char('q') => vec![Action::Quit],
            KeyCode::Char('?') => vec![Action::ToggleHelp],
            KeyCode::Char(' ') => vec![Action::TogglePlay],
            KeyCode::Char('[') => vec![Action::SeekRelative(-SEEK_STEP_SECS)],
            KeyCode::Char(']') => vec![Action::SeekRelative(SEEK_STEP_SECS)],
            KeyCode::Char('x') => vec![Action::ClosePlayer],
            KeyCode::Char('v') => vec![Action::Vote],
            KeyCode::Char('y') => vec![Action::CopyAudioUrl],
            _ => self.galaxy.handle_key(key, &self.state),
        }
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) -> Vec<Action> {
        if self.help.visible {
            self.galaxy.cancel_drag();
            return vec![];
        }
        // A pan keeps following the pointer until the button is released.
        let drag_event = matches!(
            mouse.kind,
            MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Up(MouseButton::Left)
        );
        if contains(self.map_area, mouse.column, mouse.row)
            || (drag_event && self.galaxy.is_dragging())
        {
            return self.galaxy.handle_mouse(mouse, self.map_area, &self.state);
        }

        self.galaxy.cancel_drag();
        let mut actions = Vec::new();
        if mouse.kind == MouseEventKind::Moved && self.state.interaction.hovered_id().is_some() {
            actions.push(Action::HoverLeave);
        }
        if contains(self.player_area, mouse.column, mouse.row) {
            actions.extend(
                self.now_playing
                    .handle_mouse(mouse, self.player_area, &self.state),
            );
        }
        actions
    }

    // ── Actions ───────────────────────────────────────────────────────────────

    fn dispatch(&mut self, action: Action) {
        let ism = &mut self.state.interaction;
        let transitions = match action {
            Action::Hover(id) => ism.on_pointer_enter(&id),
            Action::HoverLeave => ism.on_pointer_leave(),
            Action::HoverNext => ism.hover_next(),
            Action::HoverPrev => ism.hover_prev(),
            Action::Play(id) => ism.on_click(&id),
            Action::PlayHovered => ism.play_hovered(),
            Action::ClosePlayer => ism.close_now_playing(),
            Action::SetViewport(viewport) => ism.on_viewport_change(viewport),

            Action::TogglePlay => {
                if ism.now_playing().is_some() && !self.coordinator.transport().loaded {
                    self.toast.info("nothing to play for this star");
                }
                self.coordinator.toggle_play();
                self.sync_transport();
                vec![]
            }
            Action::SeekRelative(secs) => {
                self.coordinator.seek_relative(secs);
                vec![]
            }
            Action::Vote => {
                self.vote();
                vec![]
            }
            Action::CopyAudioUrl => {
                self.copy_audio_url();
                vec![]
            }
            Action::ToggleHelp => {
                self.help.toggle();
                vec![]
            }
            Action::Quit => {
                self.should_quit = true;
                vec![]
            }
        };
        self.apply(transitions);
    }

    /// Forward interaction transitions to the coordinator.
    fn apply(&mut self, transitions: Vec<Transition>) {
        if transitions.is_empty() {
            return;
        }
        for t in transitions {
            match t {
                Transition::HoverChanged(track) => self.coordinator.on_hover_changed(track.as_ref()),
                Transition::NowPlayingChanged(track) => {
                    self.coordinator.on_now_playing_changed(track.as_ref())
                }
                Transition::TracksReplaced { version } => {
                    debug!("[ism] track set v{}", version);
                }
                Transition::ViewportChanged(_) => {}
            }
        }
        self.sync_transport();
    }

    // ── Collaborators ─────────────────────────────────────────────────────────

    fn vote(&mut self) {
        let Some(track_id) = self.state.vote_target() else {
            self.toast.info("hover or play a star to vote");
            return;
        };
        let Some(tx) = self.tx.clone() else {
            return;
        };
        let api = self.api.clone();
        let session = self.state.session_id.clone();
        info!("[api] voting for {}", track_id);
        tokio::spawn(async move {
            let result = api
                .vote(&track_id, &session, VOTE_TOKENS)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppMessage::VoteDone(result)).await;
        });
    }

    fn refresh_balance(&self) {
        let Some(tx) = self.tx.clone() else {
            return;
        };
        let api = self.api.clone();
        let session = self.state.session_id.clone();
        tokio::spawn(async move {
            let result = api
                .token_balance(&session)
                .await
                .map(|b| b.balance)
                .map_err(|e| e.to_string());
            let _ = tx.send(AppMessage::Balance(result)).await;
        });
    }

    fn copy_audio_url(&mut self) {
        let Some(url) = self
            .state
            .interaction
            .now_playing()
            .filter(|t| t.has_audio())
            .map(|t| t.audio_url.clone())
        else {
            self.toast.info("nothing playing to copy");
            return;
        };

        if self.clipboard.is_none() {
            match arboard::Clipboard::new() {
                Ok(cb) => self.clipboard = Some(cb),
                Err(e) => {
                    warn!("clipboard unavailable: {}", e);
                    self.toast.error("clipboard unavailable");
                    return;
                }
            }
        }
        let copied = self
            .clipboard
            .as_mut()
            .map(|cb| cb.set_text(url.clone()));
        match copied {
            Some(Ok(())) => self.toast.success("audio url copied"),
            Some(Err(e)) => {
                warn!("clipboard write failed: {}", e);
                self.toast.error("copy failed");
            }
            None => {}
        }
    }

    /// Republish the control API view of the current state.
    fn publish(&self) {
        let ism = &self.state.interaction;
        self.snapshot_tx.send_replace(ControlSnapshot {
            tracks: ism.tracks().len(),
            track_set_version: ism.track_set_version(),
            hovered: ism.hovered_id().map(str::to_string),
            previewing: self.coordinator.previewing().map(str::to_string),
            now_playing: ism.now_playing().map(|t| TrackSummary {
                id: t.id.clone(),
                title: t.title.clone(),
                artist_name: t.artist_name.clone(),
                vote_score: t.vote_score,
            }),
            transport: self.state.transport.clone(),
            viewport: ism.viewport(),
            last_sync: self.state.last_sync,
            balance: self.state.balance,
        });
    }

    // ── Drawing ───────────────────────────────────────────────────────────────

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let player_h = now_playing::height(&self.state);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(player_h),
                Constraint::Length(1),
            ])
            .split(area);

        status_bar::draw_header(frame, chunks[0], &self.state);

        self.map_area = chunks[1];
        self.galaxy.draw(frame, chunks[1], &self.state);

        self.player_area = chunks[2];
        self.now_playing.draw(frame, chunks[2], &self.state);

        status_bar::draw_keys_bar(frame, chunks[3]);

        self.help.draw(frame, area, &self.state);
        self.toast.draw(frame, area);
    }
}

async fn connect_sink(
    channel: Channel,
    volume: f32,
    tx: &mpsc::Sender<AppMessage>,
) -> (MpvSink, Option<MpvDriver>) {
    let (event_tx, mut event_rx) = mpsc::channel::<MpvEvent>(256);
    let mut driver = MpvDriver::new(channel);
    match driver.spawn_and_connect(volume, event_tx).await {
        Ok(handle) => {
            handle.observe_all_properties().await;
            let audio_tx = tx.clone();
            tokio::spawn(async move {
                while let Some(ev) = event_rx.recv().await {
                    let Some(sink_event) = ev.to_sink_event() else {
                        continue;
                    };
                    if audio_tx.send(AppMessage::Audio(channel, sink_event)).await.is_err() {
                        break;
                    }
                }
            });
            (MpvSink::connected(channel, handle), Some(driver))
        }
        Err(e) => {
            warn!("mpv[{}]: unavailable: {}", channel.name(), e);
            (MpvSink::disconnected(channel), None)
        }
    }
}

fn contains(area: Rect, column: u16, row: u16) -> bool {
    area.width > 0
        && area.height > 0
        && column >= area.x
        && column < area.x + area.width
        && row >= area.y
        && row < area.y + area.height
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellos_proto::config::ApiConfig;
    use stellos_proto::track::Track;

    fn test_app() -> App {
        let api = ApiClient::new(&ApiConfig::default()).unwrap();
        let mut app = App::new(Config::default(), api, "tui-test".into());
        app.map_area = Rect::new(0, 1, 102, 52);
        app.player_area = Rect::new(0, 53, 102, 4);
        let star = Track {
            id: "a".into(),
            x: 50.5,
            y: 49.0,
            ..Track::default()
        };
        app.state.interaction.apply_snapshot(1, vec![star]);
        app
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> AppMessage {
        AppMessage::Event(Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }))
    }

    #[test]
    fn test_pointer_leaving_map_clears_hover() {
        let mut app = test_app();
        app.dispatch(Action::Hover("a".into()));
        assert_eq!(app.state.interaction.hovered_id(), Some("a"));

        app.handle_message(mouse(MouseEventKind::Moved, 51, 54));
        assert_eq!(app.state.interaction.hovered_id(), None);

        // Nothing hovered: moving over the bar is a no-op.
        assert!(!app.handle_message(mouse(MouseEventKind::Moved, 60, 54)));
    }

    #[test]
    fn test_pan_does_not_survive_release_outside_map() {
        let mut app = test_app();
        app.handle_message(mouse(MouseEventKind::Down(MouseButton::Left), 10, 10));
        assert!(app.galaxy.is_dragging());

        // Released over the player bar: the map still gets the release.
        app.handle_message(mouse(MouseEventKind::Up(MouseButton::Left), 51, 54));
        assert!(!app.galaxy.is_dragging());

        let before = app.state.interaction.viewport();
        app.handle_message(mouse(MouseEventKind::Down(MouseButton::Left), 51, 27));
        app.handle_message(mouse(MouseEventKind::Drag(MouseButton::Left), 52, 27));
        assert_eq!(app.state.interaction.viewport(), before);
        assert_eq!(
            app.state.interaction.now_playing().map(|t| t.id.as_str()),
            Some("a")
        );
    }

    #[test]
    fn test_contains_ignores_empty_areas() {
        assert!(!contains(Rect::new(0, 10, 80, 0), 5, 10));
        assert!(contains(Rect::new(0, 10, 80, 4), 5, 10));
        assert!(!contains(Rect::new(0, 10, 80, 4), 5, 14));
        assert!(!contains(Rect::new(2, 10, 80, 4), 1, 11));
    }
}
