//! Remote-control input routing
//!
//! Exactly one [`FocusOwner`] receives remote input at a time. The router
//! only decides what a key means; the caller applies the resulting
//! [`RemoteAction`] to the session.

use crate::events::SessionSnapshot;
use crate::scrub::{GestureIntent, ScrubController};
use crate::types::{SeekDirection, SessionState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Buttons on a TV remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKey {
    /// D-pad up
    Up,
    /// D-pad down
    Down,
    /// D-pad left
    Left,
    /// D-pad right
    Right,
    /// Center/OK button
    Select,
    /// Play/pause button
    PlayPause,
    /// Menu/back button
    Menu,
}

impl FromStr for RemoteKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "u" => Ok(Self::Up),
            "down" | "d" => Ok(Self::Down),
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            "select" | "ok" | "enter" => Ok(Self::Select),
            "playpause" | "play" | "pause" | "p" => Ok(Self::PlayPause),
            "menu" | "back" | "m" => Ok(Self::Menu),
            other => Err(format!("unknown remote key: {}", other)),
        }
    }
}

/// Overlays that can take focus over the playback surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Overlay {
    /// Transport bar with position and buttons
    TransportControls,
    /// Audio/subtitle picker
    TrackPicker,
    /// Quality/language picker
    VersionPicker,
}

/// Who receives remote input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusOwner {
    /// Full-screen playback, nothing on top
    Playback,
    /// Transport controls overlay
    TransportControls,
    /// Track picker overlay
    TrackPicker,
    /// Version picker overlay
    VersionPicker,
    /// Autoplay countdown prompt
    AutoplayPrompt,
    /// Error surface with its retry action
    ErrorPrompt,
    /// Drag gesture in progress
    Scrubbing,
}

impl FocusOwner {
    /// Derive focus from the session and the overlay the UI has open
    ///
    /// The error surface wins over everything, then an active scrub, then
    /// the autoplay prompt, then any open overlay.
    pub fn from_snapshot(snapshot: &SessionSnapshot, overlay: Option<Overlay>) -> Self {
        match snapshot.state {
            SessionState::Error { .. } => return Self::ErrorPrompt,
            SessionState::Scrubbing { .. } => return Self::Scrubbing,
            _ => {}
        }

        if snapshot.autoplay.is_some() {
            return Self::AutoplayPrompt;
        }

        match overlay {
            Some(Overlay::TransportControls) => Self::TransportControls,
            Some(Overlay::TrackPicker) => Self::TrackPicker,
            Some(Overlay::VersionPicker) => Self::VersionPicker,
            None => Self::Playback,
        }
    }

    /// Whether an overlay owns focus
    pub fn is_overlay(self) -> bool {
        matches!(
            self,
            Self::TransportControls | Self::TrackPicker | Self::VersionPicker
        )
    }
}

impl fmt::Display for FocusOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Playback => "playback",
            Self::TransportControls => "transport_controls",
            Self::TrackPicker => "track_picker",
            Self::VersionPicker => "version_picker",
            Self::AutoplayPrompt => "autoplay_prompt",
            Self::ErrorPrompt => "error_prompt",
            Self::Scrubbing => "scrubbing",
        };
        f.write_str(name)
    }
}

/// Direction of focus movement inside an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Navigation {
    /// Previous row
    Up,
    /// Next row
    Down,
    /// Previous item
    Left,
    /// Next item
    Right,
}

/// What a remote input means for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteAction {
    /// Toggle play/pause
    TogglePlayPause,
    /// Relative seek by the configured step
    Seek(SeekDirection),
    /// Move focus inside the overlay
    Navigate(Navigation),
    /// Activate the focused overlay item
    Select,
    /// Open an overlay
    OpenOverlay(Overlay),
    /// Close the overlay that owns focus
    CloseOverlay,
    /// Close the session
    Close,
    /// Open the next unit now
    ConfirmAutoplay,
    /// Dismiss the autoplay prompt
    CancelAutoplay,
    /// Retry the failed session
    Retry,
    /// Start a drag gesture
    BeginScrub,
    /// Commit the drag gesture
    EndScrub,
    /// Abandon the drag gesture
    CancelScrub,
    /// Nothing to do
    Ignore,
}

/// Maps remote input to actions
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteRouter;

impl RemoteRouter {
    /// Route a key press to an action for the current focus owner
    ///
    /// Menu/back closes whatever owns focus first; only the bare playback
    /// surface closes the session.
    pub fn route(key: RemoteKey, focus: FocusOwner) -> RemoteAction {
        match focus {
            FocusOwner::Playback => match key {
                RemoteKey::Left => RemoteAction::Seek(SeekDirection::Backward),
                RemoteKey::Right => RemoteAction::Seek(SeekDirection::Forward),
                RemoteKey::Select | RemoteKey::PlayPause => RemoteAction::TogglePlayPause,
                RemoteKey::Up | RemoteKey::Down => {
                    RemoteAction::OpenOverlay(Overlay::TransportControls)
                }
                RemoteKey::Menu => RemoteAction::Close,
            },
            FocusOwner::TransportControls | FocusOwner::TrackPicker | FocusOwner::VersionPicker => {
                match key {
                    RemoteKey::Up => RemoteAction::Navigate(Navigation::Up),
                    RemoteKey::Down => RemoteAction::Navigate(Navigation::Down),
                    RemoteKey::Left => RemoteAction::Navigate(Navigation::Left),
                    RemoteKey::Right => RemoteAction::Navigate(Navigation::Right),
                    RemoteKey::Select => RemoteAction::Select,
                    RemoteKey::PlayPause => RemoteAction::TogglePlayPause,
                    RemoteKey::Menu => RemoteAction::CloseOverlay,
                }
            }
            FocusOwner::AutoplayPrompt => match key {
                RemoteKey::Select => RemoteAction::ConfirmAutoplay,
                RemoteKey::Menu => RemoteAction::CancelAutoplay,
                RemoteKey::PlayPause => RemoteAction::TogglePlayPause,
                RemoteKey::Left => RemoteAction::Seek(SeekDirection::Backward),
                RemoteKey::Right => RemoteAction::Seek(SeekDirection::Forward),
                RemoteKey::Up | RemoteKey::Down => RemoteAction::Ignore,
            },
            FocusOwner::ErrorPrompt => match key {
                RemoteKey::Select => RemoteAction::Retry,
                RemoteKey::Menu => RemoteAction::Close,
                _ => RemoteAction::Ignore,
            },
            FocusOwner::Scrubbing => match key {
                RemoteKey::Select | RemoteKey::PlayPause => RemoteAction::EndScrub,
                RemoteKey::Menu => RemoteAction::CancelScrub,
                _ => RemoteAction::Ignore,
            },
        }
    }

    /// Route the start of a touch-surface drag
    ///
    /// Horizontal drags scrub; vertical ones (ties included) open the
    /// transport controls.
    pub fn route_gesture(dx: f64, dy: f64) -> RemoteAction {
        match ScrubController::classify(dx, dy) {
            GestureIntent::Scrub => RemoteAction::BeginScrub,
            GestureIntent::OpenOverlay => RemoteAction::OpenOverlay(Overlay::TransportControls),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoplay::{AutoplayDecision, AutoplayStatus};
    use crate::types::PlayIntent;
    use couch_core::SourceId;

    fn snapshot(state: SessionState) -> SessionSnapshot {
        SessionSnapshot {
            state,
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn menu_closes_overlay_before_session() {
        assert_eq!(
            RemoteRouter::route(RemoteKey::Menu, FocusOwner::TrackPicker),
            RemoteAction::CloseOverlay
        );
        assert_eq!(
            RemoteRouter::route(RemoteKey::Menu, FocusOwner::Playback),
            RemoteAction::Close
        );
        assert_eq!(
            RemoteRouter::route(RemoteKey::Menu, FocusOwner::AutoplayPrompt),
            RemoteAction::CancelAutoplay
        );
    }

    #[test]
    fn directional_keys_seek_or_navigate() {
        assert_eq!(
            RemoteRouter::route(RemoteKey::Right, FocusOwner::Playback),
            RemoteAction::Seek(SeekDirection::Forward)
        );
        assert_eq!(
            RemoteRouter::route(RemoteKey::Right, FocusOwner::VersionPicker),
            RemoteAction::Navigate(Navigation::Right)
        );
        assert_eq!(
            RemoteRouter::route(RemoteKey::PlayPause, FocusOwner::TransportControls),
            RemoteAction::TogglePlayPause
        );
    }

    #[test]
    fn gesture_tie_opens_overlay() {
        assert_eq!(RemoteRouter::route_gesture(40.0, 10.0), RemoteAction::BeginScrub);
        assert_eq!(
            RemoteRouter::route_gesture(10.0, 10.0),
            RemoteAction::OpenOverlay(Overlay::TransportControls)
        );
        assert_eq!(
            RemoteRouter::route_gesture(-5.0, 30.0),
            RemoteAction::OpenOverlay(Overlay::TransportControls)
        );
    }

    #[test]
    fn focus_priority() {
        let error = snapshot(SessionState::Error {
            message: "gone".to_string(),
        });
        assert_eq!(
            FocusOwner::from_snapshot(&error, Some(Overlay::TrackPicker)),
            FocusOwner::ErrorPrompt
        );

        let scrubbing = snapshot(SessionState::Scrubbing {
            resume: PlayIntent::Play,
        });
        assert_eq!(FocusOwner::from_snapshot(&scrubbing, None), FocusOwner::Scrubbing);

        let mut counting = snapshot(SessionState::Playing);
        counting.autoplay = Some(AutoplayDecision {
            next_source_id: SourceId::new("e2"),
            next_title: "Episode 2".to_string(),
            seconds_remaining: 8,
            status: AutoplayStatus::Counting,
        });
        assert_eq!(
            FocusOwner::from_snapshot(&counting, Some(Overlay::TransportControls)),
            FocusOwner::AutoplayPrompt
        );

        let playing = snapshot(SessionState::Playing);
        assert_eq!(
            FocusOwner::from_snapshot(&playing, Some(Overlay::VersionPicker)),
            FocusOwner::VersionPicker
        );
        assert_eq!(FocusOwner::from_snapshot(&playing, None), FocusOwner::Playback);
    }

    #[test]
    fn keys_parse_from_text() {
        assert_eq!("OK".parse::<RemoteKey>(), Ok(RemoteKey::Select));
        assert_eq!(" back ".parse::<RemoteKey>(), Ok(RemoteKey::Menu));
        assert!("volume".parse::<RemoteKey>().is_err());
    }
}
