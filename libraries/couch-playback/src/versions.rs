//! Version (quality/language) switching
//!
//! A switch rebinds the engine to another version of the same title at the
//! captured position. The session itself continues: same session id, same
//! canonical content id.

use crate::engine::LoadTicket;
use crate::error::{PlaybackError, Result};
use crate::types::PlayIntent;
use couch_core::{MediaSource, SourceId};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which load a pending switch is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPhase {
    /// Loading the requested version
    LoadingTarget,
    /// The target failed, rebinding the version that was playing before
    RestoringPrevious,
}

/// A switch waiting for the engine
#[derive(Debug, Clone)]
pub struct PendingSwitch {
    /// Requested version
    pub target: MediaSource,
    /// Version that was bound before the switch
    pub previous: MediaSource,
    /// Position captured when the switch began
    pub position: Duration,
    /// Play/pause intent to restore once buffered
    pub intent: PlayIntent,
    /// Current phase
    pub phase: SwitchPhase,
    /// Load the switch is waiting for
    pub ticket: LoadTicket,
    token: CancellationToken,
}

impl PendingSwitch {
    /// Token cancelled when the switch is superseded or torn down
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Source the pending load is for
    pub fn loading(&self) -> &MediaSource {
        match self.phase {
            SwitchPhase::LoadingTarget => &self.target,
            SwitchPhase::RestoringPrevious => &self.previous,
        }
    }
}

/// Alternative versions of the current title and the switch in flight
#[derive(Debug, Default)]
pub struct VersionSwitcher {
    available: Vec<MediaSource>,
    listed: bool,
    pending: Option<PendingSwitch>,
}

impl VersionSwitcher {
    /// Create an empty switcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the version list for a newly resolved session
    ///
    /// The current source is always part of the list.
    pub fn set_available(&mut self, current: &MediaSource, mut listed: Vec<MediaSource>) {
        listed.retain(|s| s.content_id == current.content_id);
        self.listed = !listed.is_empty();
        if !listed.iter().any(|s| s.id == current.id) {
            listed.insert(0, current.clone());
        }
        self.available = listed;
    }

    /// Known versions of the current title
    pub fn available(&self) -> &[MediaSource] {
        &self.available
    }

    /// Check that `target` may replace `current`
    pub fn validate(&self, current: &MediaSource, target: &MediaSource) -> Result<()> {
        if target.content_id != current.content_id {
            return Err(PlaybackError::InvalidOperation(format!(
                "{} is not a version of {}",
                target.id, current.content_id
            )));
        }

        if self.listed && !self.available.iter().any(|s| s.id == target.id) {
            return Err(PlaybackError::InvalidOperation(format!(
                "{} is not a listed version of {}",
                target.id, current.content_id
            )));
        }

        Ok(())
    }

    /// Record a new switch, cancelling any switch still in flight
    ///
    /// A superseded switch hands over its original source, position and
    /// intent so the new switch restores to what was playing before either.
    pub fn begin(
        &mut self,
        target: MediaSource,
        previous: MediaSource,
        position: Duration,
        intent: PlayIntent,
        ticket: LoadTicket,
        token: CancellationToken,
    ) -> &PendingSwitch {
        let (previous, position, intent) = match self.pending.take() {
            Some(superseded) => {
                superseded.token.cancel();
                (superseded.previous, superseded.position, superseded.intent)
            }
            None => (previous, position, intent),
        };

        self.pending.insert(PendingSwitch {
            target,
            previous,
            position,
            intent,
            phase: SwitchPhase::LoadingTarget,
            ticket,
            token,
        })
    }

    /// Move a failed switch to restoring the previous version
    pub fn restore(&mut self, ticket: LoadTicket) -> Option<&PendingSwitch> {
        let pending = self.pending.as_mut()?;
        pending.phase = SwitchPhase::RestoringPrevious;
        pending.ticket = ticket;
        Some(&*pending)
    }

    /// The switch in flight
    pub fn pending(&self) -> Option<&PendingSwitch> {
        self.pending.as_ref()
    }

    /// Target of the switch in flight
    pub fn switching_to(&self) -> Option<&SourceId> {
        self.pending.as_ref().map(|p| &p.target.id)
    }

    /// Whether a switch is in flight
    pub fn is_switching(&self) -> bool {
        self.pending.is_some()
    }

    /// Complete the switch in flight
    pub fn finish(&mut self) -> Option<PendingSwitch> {
        self.pending.take()
    }

    /// Abandon the switch in flight
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
        }
    }

    /// Forget everything (session replaced or closed)
    pub fn reset(&mut self) {
        self.cancel();
        self.available.clear();
        self.listed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couch_core::ContentId;

    fn version(id: &str, content: &str) -> MediaSource {
        MediaSource::new(id, ContentId::new(content), format!("file:///{}.mkv", id))
    }

    fn ticket(attempt: u64) -> LoadTicket {
        LoadTicket {
            generation: 1,
            attempt,
        }
    }

    #[test]
    fn current_source_is_always_available() {
        let mut switcher = VersionSwitcher::new();
        let current = version("a-hd", "a");
        switcher.set_available(&current, vec![version("a-sd", "a"), version("b-hd", "b")]);

        let ids: Vec<_> = switcher.available().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a-hd", "a-sd"]);
    }

    #[test]
    fn targets_must_share_content_id() {
        let mut switcher = VersionSwitcher::new();
        let current = version("a-hd", "a");
        switcher.set_available(&current, vec![version("a-sd", "a")]);

        assert!(switcher.validate(&current, &version("a-sd", "a")).is_ok());
        assert!(switcher.validate(&current, &version("b-hd", "b")).is_err());
        assert!(switcher.validate(&current, &version("a-4k", "a")).is_err());
    }

    #[test]
    fn unlisted_versions_are_accepted_without_catalog_versions() {
        let mut switcher = VersionSwitcher::new();
        let current = version("a-hd", "a");
        switcher.set_available(&current, Vec::new());
        assert!(switcher.validate(&current, &version("a-4k", "a")).is_ok());
    }

    #[test]
    fn newer_switch_cancels_and_inherits_from_older() {
        let mut switcher = VersionSwitcher::new();
        let first_token = CancellationToken::new();
        switcher.begin(
            version("a-sd", "a"),
            version("a-hd", "a"),
            Duration::from_secs(100),
            PlayIntent::Play,
            ticket(1),
            first_token.clone(),
        );

        let pending = switcher.begin(
            version("a-4k", "a"),
            version("a-sd", "a"),
            Duration::from_secs(105),
            PlayIntent::Pause,
            ticket(2),
            CancellationToken::new(),
        );

        assert_eq!(pending.previous.id.as_str(), "a-hd");
        assert_eq!(pending.position, Duration::from_secs(100));
        assert_eq!(pending.intent, PlayIntent::Play);
        assert!(first_token.is_cancelled());
    }

    #[test]
    fn restore_switches_phase_and_ticket() {
        let mut switcher = VersionSwitcher::new();
        switcher.begin(
            version("a-sd", "a"),
            version("a-hd", "a"),
            Duration::from_secs(100),
            PlayIntent::Play,
            ticket(1),
            CancellationToken::new(),
        );

        let pending = switcher.restore(ticket(2)).unwrap();
        assert_eq!(pending.phase, SwitchPhase::RestoringPrevious);
        assert_eq!(pending.loading().id.as_str(), "a-hd");
        assert_eq!(pending.ticket, ticket(2));
    }

    #[test]
    fn cancel_cancels_token() {
        let mut switcher = VersionSwitcher::new();
        let token = CancellationToken::new();
        switcher.begin(
            version("a-sd", "a"),
            version("a-hd", "a"),
            Duration::ZERO,
            PlayIntent::Play,
            ticket(1),
            token.clone(),
        );
        switcher.cancel();
        assert!(token.is_cancelled());
        assert!(!switcher.is_switching());
    }
}
