//! Audio/subtitle track selection and delay offsets

use crate::error::{PlaybackError, Result};
use couch_core::{LoadedMedia, TrackDescriptor, TrackKind};
use serde::{Deserialize, Serialize};

/// Selected tracks and delay offsets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSelection {
    /// Selected audio track; always set once audio tracks are known
    pub audio: Option<usize>,

    /// Selected subtitle track, `None` when subtitles are off
    pub subtitle: Option<usize>,

    /// Audio delay offset in milliseconds
    pub audio_delay_ms: i32,

    /// Subtitle delay offset in milliseconds
    pub subtitle_delay_ms: i32,
}

impl TrackSelection {
    /// Selection an engine starts with after loading `media`
    pub fn initial(media: &LoadedMedia) -> Self {
        Self {
            audio: if media.audio_tracks.is_empty() { None } else { Some(0) },
            ..Self::default()
        }
    }

    /// Selected index for a kind
    pub fn index(&self, kind: TrackKind) -> Option<usize> {
        match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Subtitle => self.subtitle,
        }
    }

    /// Delay offset for a kind
    pub fn delay(&self, kind: TrackKind) -> i32 {
        match kind {
            TrackKind::Audio => self.audio_delay_ms,
            TrackKind::Subtitle => self.subtitle_delay_ms,
        }
    }

    pub(crate) fn index_mut(&mut self, kind: TrackKind) -> &mut Option<usize> {
        match kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Subtitle => &mut self.subtitle,
        }
    }

    pub(crate) fn delay_mut(&mut self, kind: TrackKind) -> &mut i32 {
        match kind {
            TrackKind::Audio => &mut self.audio_delay_ms,
            TrackKind::Subtitle => &mut self.subtitle_delay_ms,
        }
    }
}

/// Newest engine request number per kind
#[derive(Debug, Clone, Copy, Default)]
struct Latest {
    audio: u64,
    subtitle: u64,
}

impl Latest {
    fn get(self, kind: TrackKind) -> u64 {
        match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Subtitle => self.subtitle,
        }
    }

    fn set(&mut self, kind: TrackKind, request: u64) {
        match kind {
            TrackKind::Audio => self.audio = request,
            TrackKind::Subtitle => self.subtitle = request,
        }
    }
}

/// Track lists and selection for the current source
///
/// Every change sent to the engine is numbered. A rejection only rolls the
/// selection back when it answers the newest request for that kind; an
/// older rejection is overtaken by whatever was requested after it.
#[derive(Debug, Clone)]
pub struct TrackManager {
    audio: Vec<TrackDescriptor>,
    subtitles: Vec<TrackDescriptor>,
    selection: TrackSelection,
    max_delay_ms: i32,
    known: bool,
    next_request: u64,
    track_requests: Latest,
    delay_requests: Latest,
}

impl TrackManager {
    /// Create an empty manager
    pub fn new(max_delay_ms: i32) -> Self {
        Self {
            audio: Vec::new(),
            subtitles: Vec::new(),
            selection: TrackSelection::default(),
            max_delay_ms,
            known: false,
            next_request: 0,
            track_requests: Latest::default(),
            delay_requests: Latest::default(),
        }
    }

    /// Take the track lists of freshly loaded media and reset the selection
    ///
    /// The first audio track is selected, subtitles are off and both
    /// delays are zero.
    pub fn enumerate(&mut self, media: &LoadedMedia) {
        self.audio = media.audio_tracks.clone();
        self.subtitles = media.subtitle_tracks.clone();
        self.selection = TrackSelection::initial(media);
        self.known = true;
        self.sync_delays();
        self.invalidate_requests();
    }

    /// Take the track lists of a new version of the same title
    ///
    /// Selection and delays survive only when both lists are equivalent
    /// (same count and same labels, in order). Returns `true` if they survived.
    pub fn carry_over(&mut self, media: &LoadedMedia) -> bool {
        let equivalent = self.known
            && same_labels(&self.audio, &media.audio_tracks)
            && same_labels(&self.subtitles, &media.subtitle_tracks);

        if equivalent {
            self.audio = media.audio_tracks.clone();
            self.subtitles = media.subtitle_tracks.clone();
            self.sync_delays();
            self.invalidate_requests();
        } else {
            self.enumerate(media);
        }

        equivalent
    }

    /// Select a track, returning the previous selection
    ///
    /// Out-of-range indices are rejected without side effects; audio cannot
    /// be turned off.
    pub fn select(&mut self, kind: TrackKind, index: Option<usize>) -> Result<Option<usize>> {
        if !self.known {
            return Err(PlaybackError::TrackUnavailable(
                "tracks are not known yet".to_string(),
            ));
        }

        match (kind, index) {
            (TrackKind::Audio, None) => {
                return Err(PlaybackError::TrackUnavailable(
                    "audio cannot be disabled".to_string(),
                ));
            }
            (_, Some(i)) if i >= self.tracks(kind).len() => {
                return Err(PlaybackError::TrackUnavailable(format!(
                    "{} track {} out of range ({} available)",
                    kind,
                    i,
                    self.tracks(kind).len()
                )));
            }
            _ => {}
        }

        let previous = std::mem::replace(self.selection.index_mut(kind), index);
        Ok(previous)
    }

    /// Apply a delay offset, returning the previous offset
    pub fn set_delay(&mut self, kind: TrackKind, delay_ms: i32) -> Result<i32> {
        if self.tracks(kind).is_empty() {
            return Err(PlaybackError::TrackUnavailable(format!(
                "no {} tracks to delay",
                kind
            )));
        }

        if delay_ms.unsigned_abs() > self.max_delay_ms.unsigned_abs() {
            return Err(PlaybackError::TrackUnavailable(format!(
                "{} delay {}ms exceeds ±{}ms",
                kind, delay_ms, self.max_delay_ms
            )));
        }

        let previous = std::mem::replace(self.selection.delay_mut(kind), delay_ms);
        self.sync_delays();
        Ok(previous)
    }

    /// Number the engine request that applies the current `kind` selection
    pub fn track_request(&mut self, kind: TrackKind) -> u64 {
        let request = self.issue();
        self.track_requests.set(kind, request);
        request
    }

    /// Number the engine request that applies the current `kind` delay
    pub fn delay_request(&mut self, kind: TrackKind) -> u64 {
        let request = self.issue();
        self.delay_requests.set(kind, request);
        request
    }

    /// Handle a refused selection request
    ///
    /// Falls back to `accepted`, the selection the engine still holds, if
    /// nothing newer was requested since. Returns `true` if it fell back.
    pub fn reject_selection(
        &mut self,
        kind: TrackKind,
        request: u64,
        accepted: Option<usize>,
    ) -> bool {
        if request != self.track_requests.get(kind) {
            return false;
        }
        *self.selection.index_mut(kind) = accepted;
        true
    }

    /// Handle a refused delay request, like [`reject_selection`](Self::reject_selection)
    pub fn reject_delay(&mut self, kind: TrackKind, request: u64, accepted: i32) -> bool {
        if request != self.delay_requests.get(kind) {
            return false;
        }
        *self.selection.delay_mut(kind) = accepted;
        self.sync_delays();
        true
    }

    /// Tracks of a kind
    pub fn tracks(&self, kind: TrackKind) -> &[TrackDescriptor] {
        match kind {
            TrackKind::Audio => &self.audio,
            TrackKind::Subtitle => &self.subtitles,
        }
    }

    /// Current selection
    pub fn selection(&self) -> &TrackSelection {
        &self.selection
    }

    /// Whether tracks have been enumerated for the current source
    pub fn is_known(&self) -> bool {
        self.known
    }

    /// Forget everything (session replaced or closed)
    pub fn clear(&mut self) {
        self.audio.clear();
        self.subtitles.clear();
        self.selection = TrackSelection::default();
        self.known = false;
        self.invalidate_requests();
    }

    fn issue(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    /// Requests issued against earlier media can no longer roll anything back
    fn invalidate_requests(&mut self) {
        let request = self.issue();
        self.track_requests = Latest {
            audio: request,
            subtitle: request,
        };
        self.delay_requests = self.track_requests;
    }

    fn sync_delays(&mut self) {
        let audio_delay = self.selection.audio_delay_ms;
        let subtitle_delay = self.selection.subtitle_delay_ms;
        self.audio.iter_mut().for_each(|t| t.delay_ms = audio_delay);
        self.subtitles.iter_mut().for_each(|t| t.delay_ms = subtitle_delay);
    }
}

fn same_labels(current: &[TrackDescriptor], next: &[TrackDescriptor]) -> bool {
    current.len() == next.len() && current.iter().zip(next).all(|(a, b)| a.label == b.label)
}
