//! Autoplay-to-next scheduling
//!
//! Near the end of a title the scheduler looks up the next unit once and, if
//! there is one, runs a countdown. The countdown itself is driven by the
//! controller's timer task; this module only tracks what the timer means.

use couch_core::{MediaSource, SourceId};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Status of an autoplay decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoplayStatus {
    /// Next unit found, countdown not yet started
    Pending,
    /// Countdown running
    Counting,
    /// Confirmed (explicitly or by reaching zero)
    Confirmed,
    /// Cancelled by the user
    Cancelled,
}

/// Observable autoplay state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoplayDecision {
    /// Version that will be opened
    pub next_source_id: SourceId,

    /// Display title of the next unit
    pub next_title: String,

    /// Seconds left on the countdown
    pub seconds_remaining: u32,

    /// Current status
    pub status: AutoplayStatus,
}

/// Result of one countdown tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownStep {
    /// Seconds remaining
    Continue(u32),
    /// Countdown reached zero, open this unit
    Elapsed(MediaSource),
}

#[derive(Debug, Clone)]
enum Phase {
    Hidden,
    Resolving,
    Counting { next: MediaSource, remaining: u32 },
}

/// Autoplay state for the active session
#[derive(Debug)]
pub struct AutoplayScheduler {
    enabled: bool,
    window: Duration,
    countdown_secs: u32,
    phase: Phase,
    // Cancelled by the user; never offered again for this title.
    dismissed: bool,
    // Lookup found no next unit; not repeated for this title.
    exhausted: bool,
    countdown_id: u64,
    token: Option<CancellationToken>,
}

impl AutoplayScheduler {
    /// Create a scheduler
    pub fn new(enabled: bool, window: Duration, countdown_secs: u32) -> Self {
        Self {
            enabled,
            window,
            countdown_secs,
            phase: Phase::Hidden,
            dismissed: false,
            exhausted: false,
            countdown_id: 0,
            token: None,
        }
    }

    /// Whether `position` falls in the trailing window of `duration`
    pub fn in_window(&self, position: Duration, duration: Option<Duration>) -> bool {
        match duration {
            Some(duration) if !duration.is_zero() => position + self.window >= duration,
            _ => false,
        }
    }

    /// Whether the next unit should be looked up now
    pub fn should_resolve(&self, position: Duration, duration: Option<Duration>) -> bool {
        self.enabled
            && matches!(self.phase, Phase::Hidden)
            && !self.dismissed
            && !self.exhausted
            && self.in_window(position, duration)
    }

    /// Mark the next-unit lookup as started
    pub fn begin_resolve(&mut self) {
        self.phase = Phase::Resolving;
    }

    /// Apply the lookup result
    ///
    /// Returns the id of the new countdown if one should start.
    pub fn resolved(&mut self, next: Option<MediaSource>) -> Option<u64> {
        if !matches!(self.phase, Phase::Resolving) {
            return None;
        }

        match next {
            Some(next) if !self.dismissed => {
                self.countdown_id += 1;
                self.phase = Phase::Counting {
                    next,
                    remaining: self.countdown_secs,
                };
                Some(self.countdown_id)
            }
            Some(_) => {
                self.phase = Phase::Hidden;
                None
            }
            None => {
                self.exhausted = true;
                self.phase = Phase::Hidden;
                None
            }
        }
    }

    /// Attach the token of the timer driving the current countdown
    pub fn attach(&mut self, token: CancellationToken) {
        if let Some(old) = self.token.replace(token) {
            old.cancel();
        }
    }

    /// One second elapsed on countdown `id`
    ///
    /// Ticks from a stale countdown are ignored.
    pub fn tick(&mut self, id: u64) -> Option<CountdownStep> {
        if id != self.countdown_id {
            return None;
        }

        let Phase::Counting { remaining, .. } = &mut self.phase else {
            return None;
        };

        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
            return Some(CountdownStep::Continue(*remaining));
        }

        self.take_next().map(CountdownStep::Elapsed)
    }

    /// Confirm the countdown early
    pub fn confirm(&mut self) -> Option<MediaSource> {
        self.take_next()
    }

    /// Cancel the countdown; the title is never offered again
    ///
    /// Returns the decision as it was when cancelled.
    pub fn cancel(&mut self) -> Option<AutoplayDecision> {
        let mut decision = self.decision()?;
        decision.status = AutoplayStatus::Cancelled;
        self.dismissed = true;
        self.stop();
        Some(decision)
    }

    /// Hide the countdown without dismissing it (e.g. seek out of the window)
    ///
    /// Returns `true` if anything was hidden.
    pub fn withdraw(&mut self) -> bool {
        if matches!(self.phase, Phase::Hidden) {
            return false;
        }
        self.stop();
        true
    }

    /// Forget everything (session replaced or closed)
    pub fn reset(&mut self) {
        self.stop();
        self.dismissed = false;
        self.exhausted = false;
    }

    /// Countdown running or about to run
    pub fn is_counting(&self) -> bool {
        matches!(self.phase, Phase::Counting { .. })
    }

    /// Lookup or countdown in progress
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Hidden)
    }

    /// Whether the user dismissed autoplay for this title
    pub fn is_dismissed(&self) -> bool {
        self.dismissed
    }

    /// Observable decision, `None` while hidden or resolving
    pub fn decision(&self) -> Option<AutoplayDecision> {
        match &self.phase {
            Phase::Counting { next, remaining } => Some(AutoplayDecision {
                next_source_id: next.id.clone(),
                next_title: next.title.clone(),
                seconds_remaining: *remaining,
                status: if *remaining == self.countdown_secs {
                    AutoplayStatus::Pending
                } else {
                    AutoplayStatus::Counting
                },
            }),
            _ => None,
        }
    }

    fn take_next(&mut self) -> Option<MediaSource> {
        match std::mem::replace(&mut self.phase, Phase::Hidden) {
            Phase::Counting { next, .. } => {
                self.stop();
                Some(next)
            }
            other => {
                self.phase = other;
                None
            }
        }
    }

    fn stop(&mut self) {
        self.phase = Phase::Hidden;
        self.countdown_id += 1;
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couch_core::ContentId;

    const HOUR: Duration = Duration::from_secs(3600);

    fn next() -> MediaSource {
        MediaSource::new("e2-hd", ContentId::new("e2"), "file:///e2.mkv").with_title("Episode 2")
    }

    fn scheduler() -> AutoplayScheduler {
        AutoplayScheduler::new(true, Duration::from_secs(30), 10)
    }

    fn counting(scheduler: &mut AutoplayScheduler) -> u64 {
        assert!(scheduler.should_resolve(Duration::from_secs(3595), Some(HOUR)));
        scheduler.begin_resolve();
        scheduler.resolved(Some(next())).unwrap()
    }

    #[test]
    fn arms_only_inside_trailing_window() {
        let scheduler = scheduler();
        assert!(!scheduler.should_resolve(Duration::from_secs(3500), Some(HOUR)));
        assert!(scheduler.should_resolve(Duration::from_secs(3570), Some(HOUR)));
        assert!(!scheduler.should_resolve(Duration::from_secs(3595), None));
    }

    #[test]
    fn disabled_scheduler_never_arms() {
        let scheduler = AutoplayScheduler::new(false, Duration::from_secs(30), 10);
        assert!(!scheduler.should_resolve(Duration::from_secs(3595), Some(HOUR)));
    }

    #[test]
    fn countdown_elapses_into_next_unit() {
        let mut scheduler = scheduler();
        let id = counting(&mut scheduler);
        assert_eq!(scheduler.decision().unwrap().status, AutoplayStatus::Pending);

        for remaining in (1..10).rev() {
            assert_eq!(scheduler.tick(id), Some(CountdownStep::Continue(remaining)));
        }
        assert_eq!(scheduler.decision().unwrap().status, AutoplayStatus::Counting);
        assert_eq!(scheduler.tick(id), Some(CountdownStep::Elapsed(next())));
        assert!(!scheduler.is_active());
    }

    #[test]
    fn confirm_before_zero_returns_next() {
        let mut scheduler = scheduler();
        let id = counting(&mut scheduler);
        scheduler.tick(id);
        assert_eq!(scheduler.confirm(), Some(next()));
        assert_eq!(scheduler.tick(id), None);
    }

    #[test]
    fn cancel_never_rearms() {
        let mut scheduler = scheduler();
        let id = counting(&mut scheduler);
        scheduler.tick(id);
        scheduler.tick(id);
        scheduler.tick(id);

        let cancelled = scheduler.cancel().unwrap();
        assert_eq!(cancelled.status, AutoplayStatus::Cancelled);
        assert_eq!(cancelled.seconds_remaining, 7);

        assert_eq!(scheduler.tick(id), None);
        assert!(!scheduler.should_resolve(HOUR, Some(HOUR)));
    }

    #[test]
    fn missing_next_unit_is_not_looked_up_again() {
        let mut scheduler = scheduler();
        scheduler.begin_resolve();
        assert_eq!(scheduler.resolved(None), None);
        assert!(!scheduler.should_resolve(Duration::from_secs(3599), Some(HOUR)));
    }

    #[test]
    fn withdraw_allows_rearming() {
        let mut scheduler = scheduler();
        let id = counting(&mut scheduler);
        assert!(scheduler.withdraw());
        assert_eq!(scheduler.tick(id), None);
        assert!(scheduler.should_resolve(Duration::from_secs(3595), Some(HOUR)));
    }

    #[test]
    fn reset_clears_dismissal() {
        let mut scheduler = scheduler();
        counting(&mut scheduler);
        scheduler.cancel();
        scheduler.reset();
        assert!(scheduler.should_resolve(Duration::from_secs(3595), Some(HOUR)));
    }

    #[test]
    fn attached_timer_is_cancelled_when_stopped() {
        let mut scheduler = scheduler();
        counting(&mut scheduler);
        let token = CancellationToken::new();
        scheduler.attach(token.clone());
        scheduler.cancel();
        assert!(token.is_cancelled());
    }
}
