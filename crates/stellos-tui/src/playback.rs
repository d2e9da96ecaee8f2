//! PlaybackCoordinator — drives the preview and playback audio channels from
//! interaction transitions.
//!
//! Each channel is its own `AudioSink` with at most one active element.  Sink
//! calls only queue work; what actually happened comes back later as
//! `SinkEvent`s through `handle_event`.

use serde::Serialize;
use stellos_proto::track::Track;
use tracing::{debug, info, warn};

/// Which audio resource an event or command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Preview,
    Playback,
}

impl Channel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Playback => "playback",
        }
    }
}

/// Asynchronous outcome reported by a sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    TimePos(f64),
    Duration(f64),
    Paused(bool),
    Ended,
    StartFailed(String),
    /// The sink switched to this locator.  Progress reported before it
    /// belongs to whatever was loaded earlier.
    Loaded(String),
}

/// One audio channel.  Every call is non-blocking.
pub trait AudioSink {
    /// Replace whatever is loaded with `url`, paused at the start.
    fn load(&mut self, url: &str) -> anyhow::Result<()>;
    fn play(&mut self) -> anyhow::Result<()>;
    fn pause(&mut self) -> anyhow::Result<()>;
    fn seek_to(&mut self, secs: f64) -> anyhow::Result<()>;
    fn seek_relative(&mut self, secs: f64) -> anyhow::Result<()>;
}

/// Playback-channel state as shown in the now-playing bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transport {
    pub track_id: Option<String>,
    pub audio_url: Option<String>,
    /// A locator was handed to the sink.
    pub loaded: bool,
    pub playing: bool,
    pub time_pos: Option<f64>,
    pub duration: Option<f64>,
    pub last_error: Option<String>,
}

/// Percentage of `current` through `duration`.  0 while the duration is
/// unknown, zero or not a number.
pub fn report_progress(current: f64, duration: f64) -> f64 {
    if !(duration > 0.0) || !duration.is_finite() || !current.is_finite() {
        return 0.0;
    }
    (current / duration * 100.0).clamp(0.0, 100.0)
}

pub struct PlaybackCoordinator<S: AudioSink> {
    preview: S,
    playback: S,
    previewing: Option<String>,
    transport: Transport,
    /// Locator handed to the playback sink that it has not confirmed yet.
    awaiting: Option<String>,
    /// The last start never reached the sink; play must load again.
    reload_on_play: bool,
}

impl<S: AudioSink> PlaybackCoordinator<S> {
    pub fn new(preview: S, playback: S) -> Self {
        Self {
            preview,
            playback,
            previewing: None,
            transport: Transport::default(),
            awaiting: None,
            reload_on_play: false,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn previewing(&self) -> Option<&str> {
        self.previewing.as_deref()
    }

    pub fn progress(&self) -> f64 {
        match (self.transport.time_pos, self.transport.duration) {
            (Some(t), Some(d)) => report_progress(t, d),
            _ => 0.0,
        }
    }

    // ── preview channel ───────────────────────────────────────────────────────

    pub fn on_hover_changed(&mut self, hovered: Option<&Track>) {
        match hovered.filter(|t| t.has_preview()) {
            Some(track) => {
                debug!("[playback] preview {}", track.id);
                let started = self
                    .preview
                    .load(&track.preview_url)
                    .and_then(|_| self.preview.play());
                match started {
                    Ok(()) => self.previewing = Some(track.id.clone()),
                    Err(e) => {
                        warn!("[playback] preview of {} failed: {}", track.id, e);
                        self.previewing = None;
                    }
                }
            }
            None => self.stop_preview(),
        }
    }

    fn stop_preview(&mut self) {
        let Some(id) = self.previewing.take() else {
            return;
        };
        debug!("[playback] preview {} stopped", id);
        if let Err(e) = self.preview.pause().and_then(|_| self.preview.seek_to(0.0)) {
            debug!("[playback] preview stop: {}", e);
        }
    }

    // ── playback channel ──────────────────────────────────────────────────────

    pub fn on_now_playing_changed(&mut self, track: Option<&Track>) {
        let Some(track) = track else {
            if self.transport.loaded {
                if let Err(e) = self.playback.pause() {
                    debug!("[playback] pause on close: {}", e);
                }
            }
            self.transport = Transport::default();
            self.awaiting = None;
            self.reload_on_play = false;
            return;
        };

        info!("[playback] now playing {} ({})", track.id, track.display_name());
        self.transport = Transport {
            track_id: Some(track.id.clone()),
            ..Transport::default()
        };
        self.awaiting = None;
        self.reload_on_play = false;

        if !track.has_audio() {
            debug!("[playback] {} has no audio locator, nothing loaded", track.id);
            if let Err(e) = self.playback.pause() {
                debug!("[playback] pause: {}", e);
            }
            return;
        }

        self.transport.loaded = true;
        self.transport.audio_url = Some(track.audio_url.clone());
        // Paused-but-loaded on failure: the user can retry with toggle.
        self.start(&track.audio_url);
    }

    fn start(&mut self, url: &str) {
        let loaded = self.playback.load(url);
        if loaded.is_ok() {
            self.awaiting = Some(url.to_string());
        }
        match loaded.and_then(|_| self.playback.play()) {
            Ok(()) => {
                self.transport.playing = true;
                self.transport.last_error = None;
                self.reload_on_play = false;
            }
            Err(e) => {
                warn!("[playback] start of {} failed: {}", url, e);
                self.transport.playing = false;
                self.transport.last_error = Some(e.to_string());
                self.reload_on_play = true;
            }
        }
    }

    /// Flip play/pause.  Returns the new playing state.
    pub fn toggle_play(&mut self) -> bool {
        if !self.transport.loaded {
            return false;
        }
        if self.reload_on_play && !self.transport.playing {
            if let Some(url) = self.transport.audio_url.clone() {
                info!("[playback] retrying {}", url);
                self.transport.time_pos = None;
                self.transport.duration = None;
                self.start(&url);
                return self.transport.playing;
            }
        }
        let result = if self.transport.playing {
            self.playback.pause()
        } else {
            self.playback.play()
        };
        match result {
            Ok(()) => {
                self.transport.playing = !self.transport.playing;
                self.transport.last_error = None;
            }
            Err(e) => {
                warn!("[playback] toggle failed: {}", e);
                self.transport.playing = false;
                self.transport.last_error = Some(e.to_string());
            }
        }
        self.transport.playing
    }

    pub fn seek_relative(&mut self, secs: f64) {
        if !self.transport.loaded {
            return;
        }
        if let Err(e) = self.playback.seek_relative(secs) {
            debug!("[playback] seek: {}", e);
        }
    }

    /// End of the playing track.  No queue, so nothing follows.
    pub fn on_ended(&mut self) {
        self.transport.playing = false;
    }

    pub fn handle_event(&mut self, channel: Channel, event: SinkEvent) {
        match channel {
            Channel::Playback => match event {
                SinkEvent::Loaded(url) => {
                    if self.awaiting.as_deref() == Some(url.as_str()) {
                        debug!("[playback] sink switched to {}", url);
                        self.awaiting = None;
                    }
                }
                SinkEvent::StartFailed(reason) => {
                    warn!("[playback] sink reported failure: {}", reason);
                    self.transport.playing = false;
                    self.transport.last_error = Some(reason);
                    self.reload_on_play = true;
                }
                stale if self.awaiting.is_some() => {
                    debug!("[playback] dropping {:?} from the previous file", stale);
                }
                SinkEvent::TimePos(t) => self.transport.time_pos = Some(t),
                SinkEvent::Duration(d) => self.transport.duration = Some(d),
                SinkEvent::Paused(paused) => {
                    if self.transport.loaded {
                        self.transport.playing = !paused;
                    }
                }
                SinkEvent::Ended => self.on_ended(),
            },
            Channel::Preview => match event {
                SinkEvent::Ended => {
                    self.previewing = None;
                }
                SinkEvent::StartFailed(reason) => {
                    debug!("[playback] preview failed: {}", reason);
                    self.previewing = None;
                }
                _ => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Load(String),
        Play,
        Pause,
        SeekTo(f64),
        SeekRelative(f64),
    }

    type Log = Rc<RefCell<Vec<(Channel, Call)>>>;

    struct FakeSink {
        channel: Channel,
        log: Log,
        fail_play: bool,
    }

    impl FakeSink {
        fn record(&self, call: Call) {
            self.log.borrow_mut().push((self.channel, call));
        }
    }

    impl AudioSink for FakeSink {
        fn load(&mut self, url: &str) -> anyhow::Result<()> {
            self.record(Call::Load(url.to_string()));
            Ok(())
        }
        fn play(&mut self) -> anyhow::Result<()> {
            self.record(Call::Play);
            if self.fail_play {
                anyhow::bail!("autoplay blocked");
            }
            Ok(())
        }
        fn pause(&mut self) -> anyhow::Result<()> {
            self.record(Call::Pause);
            Ok(())
        }
        fn seek_to(&mut self, secs: f64) -> anyhow::Result<()> {
            self.record(Call::SeekTo(secs));
            Ok(())
        }
        fn seek_relative(&mut self, secs: f64) -> anyhow::Result<()> {
            self.record(Call::SeekRelative(secs));
            Ok(())
        }
    }

    fn coordinator(fail_play: bool) -> (PlaybackCoordinator<FakeSink>, Log) {
        let log: Log = Rc::default();
        let sink = |channel| FakeSink {
            channel,
            log: Rc::clone(&log),
            fail_play,
        };
        (
            PlaybackCoordinator::new(sink(Channel::Preview), sink(Channel::Playback)),
            log,
        )
    }

    fn track(id: &str, audio: &str, preview: &str) -> Track {
        Track {
            id: id.to_string(),
            audio_url: audio.to_string(),
            preview_url: preview.to_string(),
            ..Track::default()
        }
    }

    fn calls(log: &Log, channel: Channel) -> Vec<Call> {
        log.borrow()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, call)| call.clone())
            .collect()
    }

    #[test]
    fn test_progress_guards_zero_duration() {
        assert_eq!(report_progress(0.0, 0.0), 0.0);
        assert_eq!(report_progress(30.0, 120.0), 25.0);
        assert_eq!(report_progress(5.0, f64::NAN), 0.0);
        assert_eq!(report_progress(500.0, 120.0), 100.0);
    }

    #[test]
    fn test_hover_without_preview_never_starts_audio() {
        let (mut pc, log) = coordinator(false);
        pc.on_hover_changed(Some(&track("5", "http://a/5.mp3", "")));
        assert!(log.borrow().is_empty());
        assert_eq!(pc.previewing(), None);
    }

    #[test]
    fn test_preview_follows_hover() {
        let (mut pc, log) = coordinator(false);
        pc.on_hover_changed(Some(&track("1", "", "http://p/1.mp3")));
        pc.on_hover_changed(Some(&track("2", "", "http://p/2.mp3")));
        assert_eq!(pc.previewing(), Some("2"));
        pc.on_hover_changed(None);
        assert_eq!(pc.previewing(), None);

        assert_eq!(
            calls(&log, Channel::Preview),
            vec![
                Call::Load("http://p/1.mp3".into()),
                Call::Play,
                Call::Load("http://p/2.mp3".into()),
                Call::Play,
                Call::Pause,
                Call::SeekTo(0.0),
            ]
        );
        assert!(calls(&log, Channel::Playback).is_empty());
    }

    #[test]
    fn test_hover_onto_track_without_preview_stops_previous() {
        let (mut pc, log) = coordinator(false);
        pc.on_hover_changed(Some(&track("1", "", "http://p/1.mp3")));
        pc.on_hover_changed(Some(&track("2", "", "")));
        assert_eq!(
            calls(&log, Channel::Preview)[2..],
            [Call::Pause, Call::SeekTo(0.0)]
        );
    }

    #[test]
    fn test_now_playing_loads_and_starts() {
        let (mut pc, log) = coordinator(false);
        pc.on_now_playing_changed(Some(&track("7", "http://a/7.mp3", "")));
        assert_eq!(
            calls(&log, Channel::Playback),
            vec![Call::Load("http://a/7.mp3".into()), Call::Play]
        );
        assert!(pc.transport().playing);
        assert_eq!(pc.transport().track_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_failed_start_leaves_paused_but_loaded() {
        let (mut pc, _log) = coordinator(true);
        pc.on_now_playing_changed(Some(&track("7", "http://a/7.mp3", "")));
        let t = pc.transport();
        assert!(t.loaded);
        assert!(!t.playing);
        assert_eq!(t.last_error.as_deref(), Some("autoplay blocked"));
    }

    #[test]
    fn test_track_without_audio_loads_nothing() {
        let (mut pc, log) = coordinator(false);
        pc.on_now_playing_changed(Some(&track("8", "", "")));
        assert!(!calls(&log, Channel::Playback)
            .iter()
            .any(|c| matches!(c, Call::Load(_) | Call::Play)));
        assert!(!pc.transport().loaded);
        assert!(!pc.toggle_play());
    }

    #[test]
    fn test_toggle_and_seek() {
        let (mut pc, log) = coordinator(false);
        pc.on_now_playing_changed(Some(&track("7", "http://a/7.mp3", "")));
        assert!(!pc.toggle_play());
        assert!(pc.toggle_play());
        pc.seek_relative(-10.0);
        assert_eq!(
            calls(&log, Channel::Playback)[2..],
            [Call::Pause, Call::Play, Call::SeekRelative(-10.0)]
        );
    }

    #[test]
    fn test_sink_events_update_transport() {
        let (mut pc, _log) = coordinator(false);
        pc.on_now_playing_changed(Some(&track("7", "http://a/7.mp3", "")));
        pc.handle_event(Channel::Playback, SinkEvent::Loaded("http://a/7.mp3".into()));
        pc.handle_event(Channel::Playback, SinkEvent::Duration(120.0));
        pc.handle_event(Channel::Playback, SinkEvent::TimePos(30.0));
        assert_eq!(pc.progress(), 25.0);

        pc.handle_event(Channel::Playback, SinkEvent::Ended);
        assert!(!pc.transport().playing);
        assert_eq!(pc.transport().track_id.as_deref(), Some("7"));

        // Preview events never leak into the transport.
        pc.handle_event(Channel::Preview, SinkEvent::Paused(false));
        assert!(!pc.transport().playing);
    }

    #[test]
    fn test_progress_from_previous_file_is_dropped() {
        let (mut pc, _log) = coordinator(false);
        pc.on_now_playing_changed(Some(&track("a", "http://a/a.mp3", "")));
        pc.handle_event(Channel::Playback, SinkEvent::Loaded("http://a/a.mp3".into()));
        pc.handle_event(Channel::Playback, SinkEvent::Duration(300.0));

        pc.on_now_playing_changed(Some(&track("b", "http://a/b.mp3", "")));
        // Still reporting the old file.
        pc.handle_event(Channel::Playback, SinkEvent::TimePos(290.0));
        pc.handle_event(Channel::Playback, SinkEvent::Loaded("http://a/a.mp3".into()));
        pc.handle_event(Channel::Playback, SinkEvent::Ended);
        assert!(pc.transport().playing);
        assert_eq!(pc.transport().time_pos, None);

        pc.handle_event(Channel::Playback, SinkEvent::Loaded("http://a/b.mp3".into()));
        pc.handle_event(Channel::Playback, SinkEvent::Duration(60.0));
        assert_eq!(pc.progress(), 0.0);
        pc.handle_event(Channel::Playback, SinkEvent::TimePos(30.0));
        assert_eq!(pc.progress(), 50.0);
    }

    #[test]
    fn test_toggle_after_sink_failure_reloads() {
        let (mut pc, log) = coordinator(false);
        pc.on_now_playing_changed(Some(&track("7", "http://a/7.mp3", "")));
        pc.handle_event(Channel::Playback, SinkEvent::StartFailed("loading failed".into()));
        assert!(!pc.transport().playing);
        assert_eq!(pc.transport().last_error.as_deref(), Some("loading failed"));
        assert_eq!(pc.transport().audio_url.as_deref(), Some("http://a/7.mp3"));

        assert!(pc.toggle_play());
        assert_eq!(
            calls(&log, Channel::Playback)[2..],
            [Call::Load("http://a/7.mp3".into()), Call::Play]
        );
        assert_eq!(pc.transport().last_error, None);

        // Once restarted, toggle is a plain pause again.
        assert!(!pc.toggle_play());
        assert_eq!(calls(&log, Channel::Playback).last(), Some(&Call::Pause));
    }

    #[test]
    fn test_toggle_after_failed_start_retries_and_keeps_error() {
        let (mut pc, log) = coordinator(true);
        pc.on_now_playing_changed(Some(&track("7", "http://a/7.mp3", "")));
        assert!(!pc.toggle_play());
        assert_eq!(
            calls(&log, Channel::Playback),
            vec![
                Call::Load("http://a/7.mp3".into()),
                Call::Play,
                Call::Load("http://a/7.mp3".into()),
                Call::Play,
            ]
        );
        assert!(!pc.transport().playing);
        assert_eq!(pc.transport().last_error.as_deref(), Some("autoplay blocked"));
    }

    #[test]
    fn test_close_resets_transport() {
        let (mut pc, log) = coordinator(false);
        pc.on_now_playing_changed(Some(&track("7", "http://a/7.mp3", "")));
        pc.on_now_playing_changed(None);
        assert_eq!(pc.transport(), &Transport::default());
        assert_eq!(calls(&log, Channel::Playback).last(), Some(&Call::Pause));
    }

    #[test]
    fn test_channels_are_independent() {
        let (mut pc, log) = coordinator(false);
        pc.on_now_playing_changed(Some(&track("7", "http://a/7.mp3", "")));
        pc.on_hover_changed(Some(&track("3", "", "http://p/3.mp3")));
        pc.on_hover_changed(None);
        assert!(pc.transport().playing);
        assert_eq!(calls(&log, Channel::Playback).len(), 2);
    }
}
