//! Session controller - core orchestration
//!
//! Owns the single active session and serializes every transition. User
//! operations are synchronous methods; asynchronous work (resolution, engine
//! loads, position polls, countdowns) runs in spawned tasks that report back
//! through the inbox. Each report carries the generation it was started for
//! and is dropped if a newer `open()` has happened since.
//!
//! The controller must be created inside a tokio runtime.

use crate::autoplay::{AutoplayDecision, AutoplayScheduler, AutoplayStatus, CountdownStep};
use crate::engine::{spawn_driver, EngineCommand, LoadTicket};
use crate::error::{PlaybackError, Result};
use crate::events::{Notice, SessionEvent, SessionSnapshot};
use crate::persistence::{BackgroundWriter, RetryPolicy};
use crate::resume::ResumeResolver;
use crate::scrub::ScrubController;
use crate::services::Services;
use crate::tracks::{TrackManager, TrackSelection};
use crate::types::{
    Generation, OpenRequest, PlayIntent, PlaybackConfig, PlaybackSession, SeekDirection,
    SessionState,
};
use crate::versions::{SwitchPhase, VersionSwitcher};
use couch_core::{LoadedMedia, MediaEngine, MediaSource, TrackKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the event broadcast channel
const EVENT_CAPACITY: usize = 64;

/// Countdown cadence
const COUNTDOWN_STEP: Duration = Duration::from_secs(1);

/// Results of async work, delivered to the controller inbox
#[derive(Debug)]
pub(crate) enum Inbound {
    Resolved {
        generation: Generation,
        result: Result<Resolution>,
    },
    Loaded {
        ticket: LoadTicket,
        result: std::result::Result<LoadedMedia, String>,
    },
    Position {
        generation: Generation,
        position: Duration,
    },
    EngineFault {
        generation: Generation,
        message: String,
    },
    SeekFailed {
        generation: Generation,
        message: String,
    },
    TrackRejected {
        generation: Generation,
        kind: TrackKind,
        request: u64,
        accepted: Option<usize>,
        message: String,
    },
    DelayRejected {
        generation: Generation,
        kind: TrackKind,
        request: u64,
        accepted: i32,
        message: String,
    },
    NextUnit {
        generation: Generation,
        result: std::result::Result<Option<MediaSource>, String>,
    },
    CountdownTick {
        generation: Generation,
        countdown: u64,
    },
}

/// What resolution found out about a source before loading it
#[derive(Debug)]
pub(crate) struct Resolution {
    start: Duration,
    resumed: bool,
    is_favorite: bool,
    versions: Vec<MediaSource>,
}

/// The playback session controller
///
/// Exactly one session is active at a time; opening a new one tears the
/// previous one down. Observers read [`SessionSnapshot`]s from
/// [`watch`](Self::watch) and [`SessionEvent`]s from
/// [`subscribe`](Self::subscribe).
pub struct SessionController {
    config: PlaybackConfig,
    services: Services,
    resume: ResumeResolver,
    writer: BackgroundWriter,

    engine_tx: mpsc::UnboundedSender<EngineCommand>,
    pub(crate) inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,

    state: SessionState,
    session: Option<PlaybackSession>,
    generation: Generation,
    generation_token: CancellationToken,
    load_attempt: u64,
    current_load: Option<LoadTicket>,
    intent: PlayIntent,
    loaded: bool,
    ended: bool,
    favorite_touched: bool,
    ticker_running: bool,
    ticks_since_save: u32,

    scrub: ScrubController,
    tracks: TrackManager,
    versions: VersionSwitcher,
    autoplay: AutoplayScheduler,
}

impl SessionController {
    /// Create a controller bound to `engine`
    ///
    /// Spawns the engine driver and the background writer.
    pub fn new(
        config: PlaybackConfig,
        services: Services,
        engine: Arc<dyn MediaEngine>,
    ) -> Result<Self> {
        config.validate()?;

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (engine_tx, _driver) =
            spawn_driver(engine, inbox_tx.clone(), config.buffering_timeout());
        let writer = BackgroundWriter::spawn(
            services.resume.clone(),
            services.favorites.clone(),
            RetryPolicy::from_config(&config),
        );
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            resume: ResumeResolver::new(services.resume.clone(), &config),
            scrub: ScrubController::new(config.scrub_sensitivity),
            tracks: TrackManager::new(config.max_delay_ms),
            versions: VersionSwitcher::new(),
            autoplay: AutoplayScheduler::new(
                config.autoplay_enabled,
                config.autoplay_window(),
                config.autoplay_countdown_secs,
            ),
            config,
            services,
            writer,
            engine_tx,
            inbox_tx,
            inbox_rx,
            snapshot_tx,
            events_tx,
            state: SessionState::Idle,
            session: None,
            generation: 0,
            generation_token: CancellationToken::new(),
            load_attempt: 0,
            current_load: None,
            intent: PlayIntent::Play,
            loaded: false,
            ended: false,
            favorite_touched: false,
            ticker_running: false,
            ticks_since_save: 0,
        })
    }

    // ===== Observation =====

    /// Current state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Active session, if any
    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    /// Latest generation
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Controller configuration
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Injected services
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Read-only view of the current state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            generation: self.generation,
            state: self.state.clone(),
            session: self.session.clone(),
            preview_position: self.scrub.preview(),
            audio_tracks: self.tracks.tracks(TrackKind::Audio).to_vec(),
            subtitle_tracks: self.tracks.tracks(TrackKind::Subtitle).to_vec(),
            selection: self.tracks.selection().clone(),
            autoplay: self.autoplay.decision(),
            versions: self.versions.available().to_vec(),
            switching_to: self.versions.switching_to().cloned(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Watch published snapshots
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events_tx.clone()
    }

    // ===== Session Lifecycle =====

    /// Open `source`, replacing any active session
    ///
    /// Without a start position the saved resume point is used.
    pub fn open(&mut self, source: MediaSource, start_position: Option<Duration>) -> Generation {
        let mut request = OpenRequest::new(source);
        request.start_position = start_position;
        self.open_with(request)
    }

    /// Open a session from a full request
    pub fn open_with(&mut self, request: OpenRequest) -> Generation {
        self.teardown_session();
        self.begin_generation();
        self.favorite_touched = false;

        let session = PlaybackSession::new(
            self.generation,
            request.source.clone(),
            request.start_position,
        );
        info!(
            generation = self.generation,
            session_id = %session.session_id,
            source = %request.source.id,
            "Opening session"
        );
        self.emit(SessionEvent::SessionOpened {
            session_id: session.session_id,
            generation: self.generation,
            source_id: request.source.id.clone(),
            content_id: request.source.content_id.clone(),
        });

        self.session = Some(session);
        self.intent = request.intent();
        self.versions.set_available(&request.source, Vec::new());
        self.transition(SessionState::Resolving);
        self.spawn_resolution(request);
        self.publish();

        self.generation
    }

    /// Re-resolve the failed source at its last known position
    pub fn retry(&mut self) -> Result<Generation> {
        if !matches!(self.state, SessionState::Error { .. }) {
            return Err(self.not_allowed("retry"));
        }

        let (source, position) = match self.session.as_ref() {
            Some(session) => (session.source.clone(), session.position),
            None => return Err(PlaybackError::NoSession),
        };

        self.reset_subcomponents();
        self.begin_generation();
        if let Some(session) = self.session.as_mut() {
            session.generation = self.generation;
        }

        let request = OpenRequest {
            source,
            start_position: (!position.is_zero()).then_some(position),
            start_paused: self.intent == PlayIntent::Pause,
        };
        info!(generation = self.generation, source = %request.source.id, "Retrying session");

        self.transition(SessionState::Resolving);
        self.spawn_resolution(request);
        self.publish();

        Ok(self.generation)
    }

    /// Close the session, cancelling all async work and timers
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        let had_session = self.session.is_some();
        self.teardown_session();
        if had_session {
            self.command(EngineCommand::Unload);
        }
        self.transition(SessionState::Closed);
        self.publish();
    }

    // ===== Transport =====

    /// Toggle between playing and paused
    ///
    /// Returns the new intent.
    pub fn toggle_play_pause(&mut self) -> Result<PlayIntent> {
        let intent = match self.state {
            SessionState::Playing => PlayIntent::Pause,
            SessionState::Paused => PlayIntent::Play,
            _ => return Err(self.not_allowed("toggle_play_pause")),
        };

        self.apply_intent(intent);
        if intent == PlayIntent::Pause {
            self.save_current();
        }
        self.publish();

        Ok(intent)
    }

    /// Seek by `magnitude`, clamped to `[0, duration]`
    ///
    /// Returns the target position.
    pub fn seek_relative(
        &mut self,
        direction: SeekDirection,
        magnitude: Duration,
    ) -> Result<Duration> {
        if !self.state.is_active() {
            return Err(self.not_allowed("seek"));
        }
        let session = self.session.as_mut().ok_or(PlaybackError::NoSession)?;

        let target = match direction {
            SeekDirection::Backward => session.position.saturating_sub(magnitude),
            SeekDirection::Forward => session.clamp(session.position.saturating_add(magnitude)),
        };
        session.position = target;

        debug!(?direction, ?target, "Seeking");
        self.command(EngineCommand::Seek {
            generation: self.generation,
            position: target,
        });
        self.after_seek(target);
        self.emit(SessionEvent::Seeked { position: target });
        self.publish();

        Ok(target)
    }

    /// Seek by the configured step
    pub fn seek_step(&mut self, direction: SeekDirection) -> Result<Duration> {
        self.seek_relative(direction, self.config.seek_step())
    }

    // ===== Scrubbing =====

    /// Enter scrubbing at the current position
    ///
    /// Returns the initial preview.
    pub fn begin_scrub(&mut self) -> Result<Duration> {
        let intent = match self.state {
            SessionState::Playing => PlayIntent::Play,
            SessionState::Paused => PlayIntent::Pause,
            _ => return Err(self.not_allowed("begin_scrub")),
        };
        let session = self.session.as_ref().ok_or(PlaybackError::NoSession)?;
        let duration = session
            .duration
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                PlaybackError::InvalidOperation("cannot scrub without a known duration".to_string())
            })?;

        let preview = self.scrub.begin(session.position, duration);
        self.transition(SessionState::Scrubbing { resume: intent });
        self.emit(SessionEvent::ScrubPreview { position: preview });
        self.publish();

        Ok(preview)
    }

    /// Move the preview by the cumulative drag since the gesture began
    pub fn update_scrub(&mut self, delta_pixels: f64, screen_width: f64) -> Result<Duration> {
        if !matches!(self.state, SessionState::Scrubbing { .. }) {
            return Err(self.not_allowed("update_scrub"));
        }

        let preview = self.scrub.update(delta_pixels, screen_width)?;
        trace!(delta_pixels, screen_width, ?preview, "Scrub preview");
        self.emit(SessionEvent::ScrubPreview { position: preview });
        self.publish();

        Ok(preview)
    }

    /// Commit the gesture: one seek to the preview position
    pub fn end_scrub(&mut self) -> Result<Duration> {
        let resume = match &self.state {
            SessionState::Scrubbing { resume } => *resume,
            _ => return Err(self.not_allowed("end_scrub")),
        };
        let target = self
            .scrub
            .commit()
            .ok_or_else(|| PlaybackError::InvalidOperation("no scrub in progress".to_string()))?;

        if let Some(session) = self.session.as_mut() {
            session.position = target;
        }
        debug!(?target, "Scrub committed");
        self.command(EngineCommand::Seek {
            generation: self.generation,
            position: target,
        });
        self.transition(resume.state());
        self.after_seek(target);
        self.emit(SessionEvent::Seeked { position: target });
        self.publish();

        Ok(target)
    }

    /// Abandon the gesture without seeking
    pub fn cancel_scrub(&mut self) -> Result<()> {
        let resume = match &self.state {
            SessionState::Scrubbing { resume } => *resume,
            _ => return Err(self.not_allowed("cancel_scrub")),
        };

        self.scrub.discard();
        self.transition(resume.state());
        self.publish();
        Ok(())
    }

    // ===== Versions & Tracks =====

    /// Continue the session on another version of the same title
    ///
    /// Returns once the switch is accepted; completion is observable through
    /// `switching_to` in the snapshot and a `VersionSwitched` event. A failed
    /// switch leaves the previous version playing.
    pub fn switch_version(&mut self, target: MediaSource) -> Result<()> {
        let switching = self.versions.is_switching();
        if !(self.state.is_active() || switching) {
            return Err(self.not_allowed("switch_version"));
        }

        let (current, position) = match self.session.as_ref() {
            Some(session) => (session.source.clone(), session.position),
            None => return Err(PlaybackError::NoSession),
        };
        self.versions.validate(&current, &target)?;

        if !switching && current.id == target.id {
            debug!(source = %target.id, "Already playing requested version");
            return Ok(());
        }

        if let Err(e) = self.services.network.check_reachable(&target) {
            warn!(target = %target.id, "Version switch rejected: {}", e);
            self.emit(SessionEvent::Notice(Notice::VersionSwitchFailed {
                target: target.id.clone(),
                message: e.to_string(),
            }));
            self.publish();
            return Err(e);
        }

        let intent = self.state.intent().unwrap_or(self.intent);
        let ticket = self.next_ticket();
        let token = self.generation_token.child_token();
        info!(from = %current.id, to = %target.id, ?position, "Switching version");

        let start = self
            .versions
            .begin(target.clone(), current, position, intent, ticket, token.clone())
            .position;
        self.command(EngineCommand::Load {
            ticket,
            source: target,
            start,
            token,
        });
        self.transition(SessionState::Buffering);
        self.publish();

        Ok(())
    }

    /// Select an audio or subtitle track (`None` turns subtitles off)
    pub fn set_track(&mut self, kind: TrackKind, index: Option<usize>) -> Result<()> {
        self.require_media("set_track")?;

        let previous = self.tracks.select(kind, index)?;
        if previous == index {
            return Ok(());
        }

        debug!(%kind, ?index, "Selecting track");
        let request = self.tracks.track_request(kind);
        self.command(EngineCommand::SetTrack {
            generation: self.generation,
            kind,
            index,
            request,
        });
        self.emit_tracks();
        self.publish();
        Ok(())
    }

    /// Apply a delay offset to audio or subtitles
    pub fn set_delay(&mut self, kind: TrackKind, delay_ms: i32) -> Result<()> {
        self.require_media("set_delay")?;

        let previous = self.tracks.set_delay(kind, delay_ms)?;
        if previous == delay_ms {
            return Ok(());
        }

        debug!(%kind, delay_ms, "Applying delay");
        let request = self.tracks.delay_request(kind);
        self.command(EngineCommand::SetDelay {
            generation: self.generation,
            kind,
            delay_ms,
            request,
        });
        self.emit_tracks();
        self.publish();
        Ok(())
    }

    // ===== Favorites =====

    /// Flip the favorite flag of the playing title
    ///
    /// Visible immediately; persisted in the background.
    pub fn toggle_favorite(&mut self) -> Result<bool> {
        let session = self.session.as_mut().ok_or(PlaybackError::NoSession)?;
        session.is_favorite = !session.is_favorite;
        let is_favorite = session.is_favorite;
        let content_id = session.content_id().clone();

        self.favorite_touched = true;
        info!(%content_id, is_favorite, "Favorite toggled");
        self.writer.set_favorite(content_id.clone(), is_favorite);
        self.emit(SessionEvent::FavoriteChanged {
            content_id,
            is_favorite,
        });
        self.publish();

        Ok(is_favorite)
    }

    // ===== Autoplay =====

    /// Open the next unit now instead of waiting for the countdown
    pub fn confirm_autoplay(&mut self) -> Result<Generation> {
        let remaining = self
            .autoplay
            .decision()
            .map_or(0, |d| d.seconds_remaining);
        match self.autoplay.confirm() {
            Some(next) => Ok(self.hand_off(next, remaining)),
            None => Err(self.not_allowed("confirm_autoplay")),
        }
    }

    /// Dismiss the countdown; playback continues and the prompt never returns
    pub fn cancel_autoplay(&mut self) -> Result<()> {
        let Some(decision) = self.autoplay.cancel() else {
            return Err(self.not_allowed("cancel_autoplay"));
        };

        info!(next = %decision.next_source_id, "Autoplay cancelled");
        self.emit(SessionEvent::AutoplayChanged {
            decision: Some(decision),
        });
        self.publish();
        Ok(())
    }

    // ===== Inbox =====

    /// Wait for the next async result and apply it
    pub async fn process_next(&mut self) {
        if let Some(message) = self.inbox_rx.recv().await {
            self.handle(message);
            self.publish();
        }
    }

    /// Apply every async result that has already arrived
    ///
    /// Returns the number of results applied.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.handle(message);
            handled += 1;
        }
        if handled > 0 {
            self.publish();
        }
        handled
    }

    fn handle(&mut self, message: Inbound) {
        match message {
            Inbound::Resolved { generation, result } => self.on_resolved(generation, result),
            Inbound::Loaded { ticket, result } => self.on_loaded(ticket, result),
            Inbound::Position {
                generation,
                position,
            } => self.on_position(generation, position),
            Inbound::EngineFault {
                generation,
                message,
            } => {
                let live = self.state.is_active()
                    || matches!(
                        self.state,
                        SessionState::Buffering | SessionState::Scrubbing { .. }
                    );
                if generation == self.generation && live {
                    self.fail(message);
                }
            }
            Inbound::SeekFailed {
                generation,
                message,
            } => {
                if generation == self.generation {
                    warn!("Seek failed: {}", message);
                    self.emit(SessionEvent::Notice(Notice::SeekFailed { message }));
                }
            }
            Inbound::TrackRejected {
                generation,
                kind,
                request,
                accepted,
                message,
            } => {
                if generation == self.generation && self.tracks.is_known() {
                    warn!(%kind, request, "Engine rejected track selection: {}", message);
                    let reverted = self.tracks.reject_selection(kind, request, accepted);
                    self.emit(SessionEvent::Notice(Notice::TrackRejected { kind, message }));
                    if reverted {
                        self.emit_tracks();
                    }
                }
            }
            Inbound::DelayRejected {
                generation,
                kind,
                request,
                accepted,
                message,
            } => {
                if generation == self.generation && self.tracks.is_known() {
                    warn!(%kind, request, "Engine rejected delay: {}", message);
                    let reverted = self.tracks.reject_delay(kind, request, accepted);
                    self.emit(SessionEvent::Notice(Notice::DelayRejected { kind, message }));
                    if reverted {
                        self.emit_tracks();
                    }
                }
            }
            Inbound::NextUnit { generation, result } => self.on_next_unit(generation, result),
            Inbound::CountdownTick {
                generation,
                countdown,
            } => self.on_countdown_tick(generation, countdown),
        }
    }

    // ===== Async Results =====

    fn on_resolved(&mut self, generation: Generation, result: Result<Resolution>) {
        if generation != self.generation || self.state != SessionState::Resolving {
            debug!(generation, current = self.generation, "Discarding stale resolution");
            return;
        }

        let resolution = match result {
            Ok(resolution) => resolution,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.position = resolution.start;
        if !self.favorite_touched {
            session.is_favorite = resolution.is_favorite;
        }
        let source = session.source.clone();

        self.versions.set_available(&source, resolution.versions);
        if resolution.resumed {
            info!(content_id = %source.content_id, position = ?resolution.start, "Resuming");
            self.emit(SessionEvent::Resumed {
                content_id: source.content_id.clone(),
                position: resolution.start,
            });
        }

        self.transition(SessionState::Buffering);
        let ticket = self.next_ticket();
        self.command(EngineCommand::Load {
            ticket,
            source,
            start: resolution.start,
            token: self.generation_token.child_token(),
        });
    }

    fn on_loaded(&mut self, ticket: LoadTicket, result: std::result::Result<LoadedMedia, String>) {
        if self.current_load != Some(ticket) {
            debug!(?ticket, "Discarding stale load result");
            return;
        }
        self.current_load = None;

        if self.versions.is_switching() {
            self.on_switch_loaded(result);
            return;
        }

        if self.state != SessionState::Buffering {
            return;
        }

        match result {
            Ok(media) => {
                let start = self.session.as_ref().map(|s| s.position).unwrap_or_default();
                self.bind_media(&media, start, false);
                info!(generation = self.generation, duration = ?media.duration, "Session ready");
                self.apply_intent(self.intent);
            }
            Err(message) => self.fail(message),
        }
    }

    fn on_switch_loaded(&mut self, result: std::result::Result<LoadedMedia, String>) {
        let Some(phase) = self.versions.pending().map(|p| p.phase) else {
            return;
        };

        match (phase, result) {
            (SwitchPhase::LoadingTarget, Ok(media)) => {
                let Some(pending) = self.versions.finish() else {
                    return;
                };
                let from = match self.session.as_mut() {
                    Some(session) => std::mem::replace(&mut session.source, pending.target.clone()).id,
                    None => return,
                };

                self.bind_media(&media, pending.position, true);
                info!(from = %from, to = %pending.target.id, "Version switched");
                self.emit(SessionEvent::VersionSwitched {
                    from,
                    to: pending.target.id.clone(),
                    position: pending.position,
                });
                self.apply_intent(pending.intent);
            }
            (SwitchPhase::LoadingTarget, Err(message)) => {
                let ticket = self.next_ticket();
                let Some(pending) = self.versions.restore(ticket) else {
                    return;
                };
                let target = pending.target.id.clone();
                let previous = pending.previous.clone();
                let start = pending.position;
                let token = pending.token().clone();

                warn!(target = %target, "Version switch failed, restoring {}: {}", previous.id, message);
                self.emit(SessionEvent::Notice(Notice::VersionSwitchFailed { target, message }));
                self.command(EngineCommand::Load {
                    ticket,
                    source: previous,
                    start,
                    token,
                });
            }
            (SwitchPhase::RestoringPrevious, Ok(media)) => {
                let Some(pending) = self.versions.finish() else {
                    return;
                };
                self.bind_media(&media, pending.position, true);
                info!(source = %pending.previous.id, "Previous version restored");
                self.apply_intent(pending.intent);
            }
            (SwitchPhase::RestoringPrevious, Err(message)) => {
                self.versions.finish();
                self.fail(format!("could not restore previous version: {}", message));
            }
        }
    }

    fn on_position(&mut self, generation: Generation, position: Duration) {
        if generation != self.generation || !self.state.is_active() {
            return;
        }

        let (position, duration, changed) = match self.session.as_mut() {
            Some(session) => {
                let position = session.clamp(position);
                let changed = session.position != position;
                session.position = position;
                (position, session.duration, changed)
            }
            None => return,
        };

        if changed {
            self.emit(SessionEvent::PositionChanged { position, duration });
        }

        if self.state == SessionState::Playing {
            self.ticks_since_save += 1;
            if self.ticks_since_save >= self.config.resume_save_every_ticks.max(1) {
                self.ticks_since_save = 0;
                self.save_current();
            }
        }

        self.check_autoplay(position, duration);
        self.check_end(position, duration);
    }

    fn on_next_unit(
        &mut self,
        generation: Generation,
        result: std::result::Result<Option<MediaSource>, String>,
    ) {
        if generation != self.generation {
            return;
        }

        let next = result.unwrap_or_else(|e| {
            warn!("Next unit lookup failed: {}", e);
            None
        });
        let found = next.as_ref().map(|n| n.id.clone());

        match self.autoplay.resolved(next) {
            Some(countdown) => {
                info!(next = ?found, "Autoplay countdown started");
                self.start_countdown(countdown);
                self.emit(SessionEvent::AutoplayChanged {
                    decision: self.autoplay.decision(),
                });
            }
            None => debug!(next = ?found, "No autoplay countdown"),
        }
    }

    fn on_countdown_tick(&mut self, generation: Generation, countdown: u64) {
        if generation != self.generation {
            return;
        }

        match self.autoplay.tick(countdown) {
            Some(CountdownStep::Continue(remaining)) => {
                trace!(remaining, "Autoplay countdown");
                self.emit(SessionEvent::AutoplayChanged {
                    decision: self.autoplay.decision(),
                });
            }
            Some(CountdownStep::Elapsed(next)) => {
                self.hand_off(next, 0);
            }
            None => {}
        }
    }

    // ===== Internals =====

    fn begin_generation(&mut self) {
        self.generation_token.cancel();
        self.generation += 1;
        self.generation_token = CancellationToken::new();
    }

    fn next_ticket(&mut self) -> LoadTicket {
        self.load_attempt += 1;
        let ticket = LoadTicket {
            generation: self.generation,
            attempt: self.load_attempt,
        };
        self.current_load = Some(ticket);
        ticket
    }

    /// Release everything scoped to the current source binding
    fn reset_subcomponents(&mut self) {
        self.generation_token.cancel();
        self.current_load = None;
        self.ticker_running = false;
        self.ticks_since_save = 0;
        self.ended = false;
        self.scrub.discard();
        self.versions.cancel();
        self.autoplay.reset();
        self.tracks.clear();
    }

    fn teardown_session(&mut self) {
        self.reset_subcomponents();
        self.versions.reset();

        if let Some(session) = self.session.take() {
            if self.loaded {
                self.save_resume(&session);
            }
            info!(session_id = %session.session_id, position = ?session.position, "Session closed");
            self.emit(SessionEvent::SessionClosed {
                session_id: session.session_id,
                content_id: session.content_id().clone(),
                position: session.position,
            });
        }
        self.loaded = false;
    }

    fn fail(&mut self, message: String) {
        error!(generation = self.generation, "Session failed: {}", message);

        self.generation_token.cancel();
        self.current_load = None;
        self.ticker_running = false;
        self.scrub.discard();
        self.versions.cancel();
        if self.autoplay.withdraw() {
            self.emit(SessionEvent::AutoplayChanged { decision: None });
        }
        self.save_current();

        self.transition(SessionState::Error {
            message: message.clone(),
        });
        self.emit(SessionEvent::Error { message });
    }

    fn spawn_resolution(&self, request: OpenRequest) {
        let generation = self.generation;
        let token = self.generation_token.child_token();
        let inbox = self.inbox_tx.clone();
        let resume = self.resume.clone();
        let services = self.services.clone();

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    debug!(generation, "Resolution cancelled");
                }
                result = resolve(request, resume, services) => {
                    let _ = inbox.send(Inbound::Resolved { generation, result });
                }
            }
        });
    }

    fn bind_media(&mut self, media: &LoadedMedia, position: Duration, carry_tracks: bool) {
        self.loaded = true;
        if let Some(session) = self.session.as_mut() {
            session.duration = media.duration;
            session.position = session.clamp(position);
        }

        if carry_tracks && self.tracks.carry_over(media) {
            self.push_selection(media);
        } else if !carry_tracks {
            self.tracks.enumerate(media);
        }
        self.emit_tracks();
        self.start_ticker();
    }

    /// Re-apply a carried-over selection to a freshly loaded source
    ///
    /// Only what differs from the engine's post-load defaults is sent.
    fn push_selection(&mut self, media: &LoadedMedia) {
        let generation = self.generation;
        let selection = self.tracks.selection().clone();
        let initial = TrackSelection::initial(media);

        for kind in [TrackKind::Audio, TrackKind::Subtitle] {
            let index = selection.index(kind);
            if index != initial.index(kind) {
                let request = self.tracks.track_request(kind);
                self.command(EngineCommand::SetTrack {
                    generation,
                    kind,
                    index,
                    request,
                });
            }
        }
        for kind in [TrackKind::Audio, TrackKind::Subtitle] {
            let delay_ms = selection.delay(kind);
            if delay_ms != initial.delay(kind) {
                let request = self.tracks.delay_request(kind);
                self.command(EngineCommand::SetDelay {
                    generation,
                    kind,
                    delay_ms,
                    request,
                });
            }
        }
    }

    fn apply_intent(&mut self, intent: PlayIntent) {
        self.intent = intent;
        let generation = self.generation;
        match intent {
            PlayIntent::Play => self.command(EngineCommand::Play { generation }),
            PlayIntent::Pause if self.state == SessionState::Playing => {
                self.command(EngineCommand::Pause { generation });
            }
            PlayIntent::Pause => {}
        }
        self.transition(intent.state());
    }

    fn start_ticker(&mut self) {
        if self.ticker_running {
            return;
        }
        self.ticker_running = true;

        let generation = self.generation;
        let token = self.generation_token.child_token();
        let engine = self.engine_tx.clone();
        let period = self.config.tick_interval();

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if engine.send(EngineCommand::Poll { generation }).is_err() {
                            break;
                        }
                    }
                }
            }
            trace!(generation, "Position ticker stopped");
        });
    }

    fn start_countdown(&mut self, countdown: u64) {
        let generation = self.generation;
        let token = self.generation_token.child_token();
        let inbox = self.inbox_tx.clone();
        self.autoplay.attach(token.clone());

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + COUNTDOWN_STEP, COUNTDOWN_STEP);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if inbox.send(Inbound::CountdownTick { generation, countdown }).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_next_unit_lookup(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let generation = self.generation;
        let content_id = session.content_id().clone();
        let token = self.generation_token.child_token();
        let catalog = self.services.catalog.clone();
        let inbox = self.inbox_tx.clone();

        debug!(%content_id, "Looking up next unit");
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                result = catalog.next_unit(&content_id) => {
                    let result = result.map_err(|e| e.to_string());
                    let _ = inbox.send(Inbound::NextUnit { generation, result });
                }
            }
        });
    }

    fn check_autoplay(&mut self, position: Duration, duration: Option<Duration>) {
        if self.autoplay.should_resolve(position, duration) {
            self.autoplay.begin_resolve();
            self.spawn_next_unit_lookup();
        } else if self.autoplay.is_active()
            && !self.autoplay.in_window(position, duration)
            && self.autoplay.withdraw()
        {
            debug!(?position, "Left autoplay window");
            self.emit(SessionEvent::AutoplayChanged { decision: None });
        }
    }

    fn check_end(&mut self, position: Duration, duration: Option<Duration>) {
        let Some(duration) = duration else {
            return;
        };
        if position < duration || self.ended {
            return;
        }

        self.ended = true;
        if let Some(session) = self.session.as_ref() {
            info!(content_id = %session.content_id(), "Reached end");
            self.emit(SessionEvent::ReachedEnd {
                content_id: session.content_id().clone(),
            });
        }

        if !self.autoplay.is_counting() && self.state == SessionState::Playing {
            self.apply_intent(PlayIntent::Pause);
            self.save_current();
        }
    }

    fn after_seek(&mut self, position: Duration) {
        let duration = self.session.as_ref().and_then(|s| s.duration);
        if self.autoplay.is_active()
            && !self.autoplay.in_window(position, duration)
            && self.autoplay.withdraw()
        {
            self.emit(SessionEvent::AutoplayChanged { decision: None });
        }
        if duration.map_or(true, |d| position < d) {
            self.ended = false;
        }
    }

    fn hand_off(&mut self, next: MediaSource, seconds_remaining: u32) -> Generation {
        info!(next = %next.id, "Autoplay handing off");
        self.emit(SessionEvent::AutoplayChanged {
            decision: Some(AutoplayDecision {
                next_source_id: next.id.clone(),
                next_title: next.title.clone(),
                seconds_remaining,
                status: AutoplayStatus::Confirmed,
            }),
        });
        self.open_with(OpenRequest::new(next))
    }

    fn require_media(&self, operation: &'static str) -> Result<()> {
        if self.state.is_active() || matches!(self.state, SessionState::Scrubbing { .. }) {
            Ok(())
        } else {
            Err(self.not_allowed(operation))
        }
    }

    fn save_current(&self) {
        if !self.loaded {
            return;
        }
        if let Some(session) = self.session.as_ref() {
            self.save_resume(session);
        }
    }

    fn save_resume(&self, session: &PlaybackSession) {
        let point = self
            .resume
            .capture(session.content_id(), session.position, session.duration);
        trace!(content_id = %point.content_id, position = ?point.position, "Saving resume point");
        self.writer.save_resume(point);
    }

    fn transition(&mut self, to: SessionState) {
        if self.state == to {
            return;
        }

        let from = std::mem::replace(&mut self.state, to.clone());
        debug!(generation = self.generation, %from, %to, "State transition");
        if let Some(session) = self.session.as_mut() {
            session.state = to.clone();
        }
        self.emit(SessionEvent::StateChanged {
            generation: self.generation,
            from,
            to,
        });
    }

    fn not_allowed(&self, operation: &'static str) -> PlaybackError {
        debug!(operation, state = %self.state, "Operation not allowed");
        PlaybackError::NotAllowed {
            operation,
            state: self.state.name().to_string(),
        }
    }

    fn command(&self, command: EngineCommand) {
        if self.engine_tx.send(command).is_err() {
            error!("Engine driver is gone");
        }
    }

    fn emit_tracks(&self) {
        self.emit(SessionEvent::TracksChanged {
            selection: self.tracks.selection().clone(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    pub(crate) fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.generation_token.cancel();
    }
}

/// Validate the locator and gather everything needed before loading
///
/// Lookups other than the locator check are best effort.
async fn resolve(
    request: OpenRequest,
    resume: ResumeResolver,
    services: Services,
) -> Result<Resolution> {
    services.network.check_reachable(&request.source)?;
    let content_id = &request.source.content_id;

    let start = async {
        match request.start_position {
            Some(position) => (position, false),
            None => match resume.resolve(content_id).await {
                Some(position) => (position, true),
                None => (Duration::ZERO, false),
            },
        }
    };
    let favorite = async {
        services
            .favorites
            .is_favorite(content_id)
            .await
            .unwrap_or_else(|e| {
                warn!(%content_id, "Favorite lookup failed: {}", e);
                false
            })
    };
    let versions = async {
        services
            .catalog
            .versions(content_id)
            .await
            .unwrap_or_else(|e| {
                warn!(%content_id, "Version lookup failed: {}", e);
                Vec::new()
            })
    };

    let ((start, resumed), is_favorite, versions) = tokio::join!(start, favorite, versions);
    Ok(Resolution {
        start,
        resumed,
        is_favorite,
        versions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::NetworkMonitor;
    use async_trait::async_trait;
    use couch_core::{
        ContentId, MemoryCatalog, MemoryFavoriteStore, MemoryResumeStore, TrackDescriptor,
    };

    struct StaticEngine;

    #[async_trait]
    impl MediaEngine for StaticEngine {
        async fn load(&self, _: &MediaSource, _: Duration) -> couch_core::Result<LoadedMedia> {
            Ok(LoadedMedia {
                duration: Some(Duration::from_secs(600)),
                audio_tracks: TrackDescriptor::list(TrackKind::Audio, &["Main"]),
                subtitle_tracks: Vec::new(),
            })
        }
        async fn unload(&self) -> couch_core::Result<()> {
            Ok(())
        }
        async fn play(&self) -> couch_core::Result<()> {
            Ok(())
        }
        async fn pause(&self) -> couch_core::Result<()> {
            Ok(())
        }
        async fn seek(&self, _: Duration) -> couch_core::Result<()> {
            Ok(())
        }
        async fn set_track(&self, _: TrackKind, _: Option<usize>) -> couch_core::Result<()> {
            Ok(())
        }
        async fn set_delay(&self, _: TrackKind, _: i32) -> couch_core::Result<()> {
            Ok(())
        }
        async fn position(&self) -> couch_core::Result<Duration> {
            Ok(Duration::ZERO)
        }
    }

    fn controller() -> SessionController {
        let services = Services::new(
            Arc::new(MemoryResumeStore::new()),
            Arc::new(MemoryFavoriteStore::new()),
            Arc::new(MemoryCatalog::default()),
            NetworkMonitor::new(),
        );
        SessionController::new(PlaybackConfig::default(), services, Arc::new(StaticEngine)).unwrap()
    }

    fn source(id: &str) -> MediaSource {
        MediaSource::new(id, ContentId::new(id), format!("file:///media/{}.mkv", id))
    }

    async fn settle(controller: &mut SessionController) {
        loop {
            for _ in 0..32 {
                tokio::task::yield_now().await;
            }
            if controller.process_pending() == 0 {
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stale_load_results_are_discarded() {
        let mut controller = controller();
        controller.open(source("a"), Some(Duration::ZERO));
        settle(&mut controller).await;
        assert_eq!(*controller.state(), SessionState::Playing);

        controller
            .inbox_tx
            .send(Inbound::Loaded {
                ticket: LoadTicket {
                    generation: 0,
                    attempt: 42,
                },
                result: Err("late failure".to_string()),
            })
            .unwrap();

        assert_eq!(controller.process_pending(), 1);
        assert_eq!(*controller.state(), SessionState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_resolution_is_discarded() {
        let mut controller = controller();
        let first = controller.open(source("a"), None);
        let second = controller.open(source("b"), None);
        assert!(second > first);

        controller
            .inbox_tx
            .send(Inbound::Resolved {
                generation: first,
                result: Err(PlaybackError::SourceUnavailable("late".to_string())),
            })
            .unwrap();
        controller.process_pending();

        assert_eq!(*controller.state(), SessionState::Resolving);
        assert_eq!(controller.session().unwrap().source.id.as_str(), "b");

        settle(&mut controller).await;
        assert_eq!(*controller.state(), SessionState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_countdown_ticks_are_ignored() {
        let mut controller = controller();
        controller.open(source("a"), Some(Duration::ZERO));
        settle(&mut controller).await;

        controller
            .inbox_tx
            .send(Inbound::CountdownTick {
                generation: controller.generation(),
                countdown: 7,
            })
            .unwrap();
        controller.process_pending();

        assert!(controller.snapshot().autoplay.is_none());
        assert_eq!(*controller.state(), SessionState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn operations_outside_their_states_are_reported() {
        let mut controller = controller();
        assert!(matches!(
            controller.toggle_play_pause(),
            Err(PlaybackError::NotAllowed { .. })
        ));
        assert!(matches!(controller.retry(), Err(PlaybackError::NotAllowed { .. })));
        assert!(matches!(controller.toggle_favorite(), Err(PlaybackError::NoSession)));

        controller.close();
        controller.close();
        assert_eq!(*controller.state(), SessionState::Closed);
    }
}
