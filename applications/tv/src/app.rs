//! Player screen
//!
//! Owns the overlay the UI has open, turns console input into remote
//! actions for whoever holds focus, and applies them to the session.

use crate::error::{Result, TvError};
use crate::input::InputEvent;
use couch_core::{MediaSource, TrackKind};
use couch_playback::{
    FocusOwner, Navigation, Overlay, PlaybackError, RemoteAction, RemoteRouter, SessionEvent,
    SessionHandle, SessionSnapshot,
};
use std::time::Duration;
use tokio::sync::broadcast;

/// Items of the transport controls overlay, in focus order
const TRANSPORT_ITEMS: [&str; 3] = ["play/pause", "tracks", "versions"];

/// Whether the player keeps running after an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// One entry of the track picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackItem {
    Audio(usize),
    SubtitlesOff,
    Subtitle(usize),
}

pub struct App {
    session: SessionHandle,
    screen_width: f64,
    overlay: Option<Overlay>,
    cursor: usize,
}

impl App {
    pub fn new(session: SessionHandle, screen_width: f64) -> Self {
        Self {
            session,
            screen_width,
            overlay: None,
            cursor: 0,
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn overlay(&self) -> Option<Overlay> {
        self.overlay
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Who receives the next key press
    pub fn focus(&self) -> FocusOwner {
        FocusOwner::from_snapshot(&self.session.snapshot(), self.overlay)
    }

    /// Apply one input event
    pub async fn handle(&mut self, event: InputEvent) -> Result<Flow> {
        match event {
            InputEvent::Key(key) => {
                let focus = self.focus();
                let action = RemoteRouter::route(key, focus);
                tracing::debug!("{:?} with {} focused -> {:?}", key, focus, action);
                return self.perform(action).await;
            }
            InputEvent::Swipe { dx, dy } => {
                let focus = self.focus();
                if focus != FocusOwner::Playback && focus != FocusOwner::TransportControls {
                    tracing::debug!("Swipe ignored with {} focused", focus);
                    return Ok(Flow::Continue);
                }
                let action = RemoteRouter::route_gesture(dx, dy);
                let flow = self.perform(action).await?;
                if action == RemoteAction::BeginScrub && self.focus() == FocusOwner::Scrubbing {
                    let result = self.session.update_scrub(dx, self.screen_width).await;
                    self.check(result)?;
                }
                return Ok(flow);
            }
            InputEvent::Drag(delta) => {
                let result = self.session.update_scrub(delta, self.screen_width).await;
                self.check(result)?;
            }
            InputEvent::Release => return self.perform(RemoteAction::EndScrub).await,
            InputEvent::Favorite => {
                let result = self.session.toggle_favorite().await;
                self.check(result)?;
            }
            InputEvent::Track(kind, index) => {
                let result = self.session.set_track(kind, index).await;
                self.check(result)?;
            }
            InputEvent::Delay(kind, delay_ms) => {
                let result = self.session.set_delay(kind, delay_ms).await;
                self.check(result)?;
            }
            InputEvent::Version(id) => {
                let snapshot = self.session.snapshot();
                match snapshot.versions.iter().find(|v| v.id.as_str() == id) {
                    Some(target) => self.switch_to(target.clone()).await?,
                    None => tracing::warn!("No version {} for this title", id),
                }
            }
            InputEvent::Status => {
                println!("{}", status_line(&self.session.snapshot(), self.focus()));
            }
            InputEvent::Quit => {
                let result = self.session.close().await;
                self.check(result)?;
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    /// Apply a routed remote action
    pub async fn perform(&mut self, action: RemoteAction) -> Result<Flow> {
        match action {
            RemoteAction::TogglePlayPause => {
                let result = self.session.toggle_play_pause().await;
                self.check(result)?;
            }
            RemoteAction::Seek(direction) => {
                let result = self.session.seek_relative(direction, None).await;
                self.check(result)?;
            }
            RemoteAction::Navigate(navigation) => self.navigate(navigation),
            RemoteAction::Select => self.select().await?,
            RemoteAction::OpenOverlay(overlay) => self.open_overlay(overlay),
            RemoteAction::CloseOverlay => self.overlay = None,
            RemoteAction::Close => {
                self.overlay = None;
                let result = self.session.close().await;
                self.check(result)?;
                return Ok(Flow::Exit);
            }
            RemoteAction::ConfirmAutoplay => {
                let result = self.session.confirm_autoplay().await;
                self.check(result)?;
            }
            RemoteAction::CancelAutoplay => {
                let result = self.session.cancel_autoplay().await;
                self.check(result)?;
            }
            RemoteAction::Retry => {
                let result = self.session.retry().await;
                self.check(result)?;
            }
            RemoteAction::BeginScrub => {
                let result = self.session.begin_scrub().await;
                self.check(result)?;
            }
            RemoteAction::EndScrub => {
                let result = self.session.end_scrub().await;
                self.check(result)?;
            }
            RemoteAction::CancelScrub => {
                let result = self.session.cancel_scrub().await;
                self.check(result)?;
            }
            RemoteAction::Ignore => {}
        }
        Ok(Flow::Continue)
    }

    fn open_overlay(&mut self, overlay: Overlay) {
        self.overlay = Some(overlay);
        self.cursor = 0;
    }

    fn item_count(&self, snapshot: &SessionSnapshot) -> usize {
        match self.overlay {
            Some(Overlay::TransportControls) => TRANSPORT_ITEMS.len(),
            Some(Overlay::TrackPicker) => track_items(snapshot).len(),
            Some(Overlay::VersionPicker) => snapshot.versions.len(),
            None => 0,
        }
    }

    fn navigate(&mut self, navigation: Navigation) {
        let count = self.item_count(&self.session.snapshot());
        if count == 0 {
            return;
        }
        self.cursor = match navigation {
            Navigation::Up | Navigation::Left => self.cursor.saturating_sub(1),
            Navigation::Down | Navigation::Right => (self.cursor + 1).min(count - 1),
        };
    }

    async fn select(&mut self) -> Result<()> {
        let snapshot = self.session.snapshot();
        match self.overlay {
            Some(Overlay::TransportControls) => match self.cursor {
                0 => {
                    let result = self.session.toggle_play_pause().await;
                    self.check(result)?;
                }
                1 => self.open_overlay(Overlay::TrackPicker),
                _ => self.open_overlay(Overlay::VersionPicker),
            },
            Some(Overlay::TrackPicker) => {
                let result = match track_items(&snapshot).get(self.cursor) {
                    Some(TrackItem::Audio(i)) => {
                        self.session.set_track(TrackKind::Audio, Some(*i)).await
                    }
                    Some(TrackItem::SubtitlesOff) => {
                        self.session.set_track(TrackKind::Subtitle, None).await
                    }
                    Some(TrackItem::Subtitle(i)) => {
                        self.session.set_track(TrackKind::Subtitle, Some(*i)).await
                    }
                    None => Ok(()),
                };
                self.check(result)?;
            }
            Some(Overlay::VersionPicker) => {
                if let Some(target) = snapshot.versions.get(self.cursor).cloned() {
                    self.overlay = None;
                    self.switch_to(target).await?;
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn switch_to(&mut self, target: MediaSource) -> Result<()> {
        tracing::info!("Switching to {}", target.version_label());
        let result = self.session.switch_version(target).await;
        self.check(result)
    }

    /// Log refused commands; only a stopped controller ends the player
    fn check<T>(&self, result: std::result::Result<T, PlaybackError>) -> Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(PlaybackError::ControllerGone) => {
                Err(TvError::Playback(PlaybackError::ControllerGone))
            }
            Err(e) => {
                tracing::warn!("{}", e);
                Ok(())
            }
        }
    }
}

/// Track picker rows: audio tracks, then "off", then subtitle tracks
pub fn track_items(snapshot: &SessionSnapshot) -> Vec<TrackItem> {
    snapshot
        .audio_tracks
        .iter()
        .map(|t| TrackItem::Audio(t.index))
        .chain(std::iter::once(TrackItem::SubtitlesOff))
        .chain(
            snapshot
                .subtitle_tracks
                .iter()
                .map(|t| TrackItem::Subtitle(t.index)),
        )
        .collect()
}

/// One-line summary of the player
pub fn status_line(snapshot: &SessionSnapshot, focus: FocusOwner) -> String {
    let mut line = format!("[{}]", snapshot.state);

    if let Some(session) = &snapshot.session {
        let title = if session.source.title.is_empty() {
            session.source.content_id.as_str()
        } else {
            session.source.title.as_str()
        };
        line.push_str(&format!(" {} ({})", title, session.source.version_label()));

        let position = snapshot.display_position().unwrap_or_default();
        match session.duration {
            Some(duration) => line.push_str(&format!(
                " {} / {}",
                clock(position),
                clock(duration)
            )),
            None => line.push_str(&format!(" {}", clock(position))),
        }

        if session.is_favorite {
            line.push_str(" *");
        }
    }

    if let Some(decision) = &snapshot.autoplay {
        line.push_str(&format!(
            " | next: {} in {}s",
            decision.next_title, decision.seconds_remaining
        ));
    }

    line.push_str(&format!(" | focus: {}", focus));
    line
}

fn clock(position: Duration) -> String {
    let secs = position.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Log session events until the session goes away
pub async fn report_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged { from, to, .. }) => {
                tracing::info!("{} -> {}", from, to);
            }
            Ok(SessionEvent::Resumed { position, .. }) => {
                tracing::info!("Resuming at {}", clock(position));
            }
            Ok(SessionEvent::VersionSwitched { to, position, .. }) => {
                tracing::info!("Now playing {} from {}", to, clock(position));
            }
            Ok(SessionEvent::AutoplayChanged {
                decision: Some(decision),
            }) => {
                tracing::info!(
                    "Up next: {} in {}s",
                    decision.next_title,
                    decision.seconds_remaining
                );
            }
            Ok(SessionEvent::FavoriteChanged { is_favorite, .. }) => {
                tracing::info!("Favorite: {}", is_favorite);
            }
            Ok(SessionEvent::Notice(notice)) => tracing::warn!("{:?}", notice),
            Ok(SessionEvent::Error { message }) => {
                tracing::error!("Playback failed: {} (ok to retry, menu to leave)", message);
            }
            Ok(event) => tracing::trace!("{:?}", event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Event reporter skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couch_core::{ContentId, TrackDescriptor};
    use couch_playback::{PlaybackSession, SessionState};

    #[test]
    fn test_status_line_shows_position_and_focus() {
        let source = MediaSource::new("pilot-hd", ContentId::new("pilot"), "/pilot.mkv")
            .with_title("Pilot")
            .with_quality("1080p");
        let mut session = PlaybackSession::new(1, source, None);
        session.position = Duration::from_secs(65);
        session.duration = Some(Duration::from_secs(1320));
        session.is_favorite = true;

        let snapshot = SessionSnapshot {
            generation: 1,
            state: SessionState::Playing,
            session: Some(session),
            ..SessionSnapshot::default()
        };

        assert_eq!(
            status_line(&snapshot, FocusOwner::Playback),
            "[playing] Pilot (1080p) 00:01:05 / 00:22:00 * | focus: playback"
        );
    }

    #[test]
    fn test_track_items_put_off_between_kinds() {
        let snapshot = SessionSnapshot {
            audio_tracks: TrackDescriptor::list(TrackKind::Audio, &["English"]),
            subtitle_tracks: TrackDescriptor::list(TrackKind::Subtitle, &["English", "Spanish"]),
            ..SessionSnapshot::default()
        };
        assert_eq!(
            track_items(&snapshot),
            vec![
                TrackItem::Audio(0),
                TrackItem::SubtitlesOff,
                TrackItem::Subtitle(0),
                TrackItem::Subtitle(1),
            ]
        );
    }
}
