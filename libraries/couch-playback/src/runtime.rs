//! Session runtime
//!
//! Runs a [`SessionController`] on its own task. User commands and async
//! results are applied one at a time by that task, so every transition is
//! serialized. [`SessionHandle`] is the cloneable front door for input
//! routing and the UI.

use crate::controller::SessionController;
use crate::error::{PlaybackError, Result};
use crate::events::{SessionEvent, SessionSnapshot};
use crate::types::{Generation, OpenRequest, PlayIntent, SeekDirection, SessionState};
use couch_core::{MediaSource, SourceId, TrackKind};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Pending commands before senders wait
const COMMAND_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Open {
        request: OpenRequest,
        reply: Reply<Generation>,
    },
    Retry(Reply<Generation>),
    Close(Reply<()>),
    TogglePlayPause(Reply<PlayIntent>),
    Seek {
        direction: SeekDirection,
        magnitude: Option<Duration>,
        reply: Reply<Duration>,
    },
    BeginScrub(Reply<Duration>),
    UpdateScrub {
        delta_pixels: f64,
        screen_width: f64,
        reply: Reply<Duration>,
    },
    EndScrub(Reply<Duration>),
    CancelScrub(Reply<()>),
    SwitchVersion {
        target: MediaSource,
        reply: Reply<()>,
    },
    SetTrack {
        kind: TrackKind,
        index: Option<usize>,
        reply: Reply<()>,
    },
    SetDelay {
        kind: TrackKind,
        delay_ms: i32,
        reply: Reply<()>,
    },
    ToggleFavorite(Reply<bool>),
    ConfirmAutoplay(Reply<Generation>),
    CancelAutoplay(Reply<()>),
}

enum Next {
    Processed,
    Command(Option<Command>),
}

/// Owns the controller task
pub struct SessionRuntime {
    controller: SessionController,
    commands: mpsc::Receiver<Command>,
}

impl SessionRuntime {
    /// Move `controller` onto its own task
    ///
    /// The task stops (closing the session) once every handle is dropped.
    pub fn spawn(controller: SessionController) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = SessionHandle {
            commands: tx,
            snapshots: controller.watch(),
            events: controller.event_sender(),
        };

        let runtime = Self {
            controller,
            commands: rx,
        };
        (handle, tokio::spawn(runtime.run()))
    }

    async fn run(mut self) {
        info!("Session runtime started");

        loop {
            let next = tokio::select! {
                () = self.controller.process_next() => Next::Processed,
                command = self.commands.recv() => Next::Command(command),
            };

            match next {
                Next::Processed => {}
                Next::Command(Some(command)) => {
                    self.execute(command);
                    self.controller.publish();
                }
                Next::Command(None) => break,
            }
        }

        self.controller.close();
        info!("Session runtime stopped");
    }

    fn execute(&mut self, command: Command) {
        let controller = &mut self.controller;

        // A dropped reply receiver just means the caller stopped waiting.
        match command {
            Command::Open { request, reply } => {
                let _ = reply.send(Ok(controller.open_with(request)));
            }
            Command::Retry(reply) => {
                let _ = reply.send(controller.retry());
            }
            Command::Close(reply) => {
                controller.close();
                let _ = reply.send(Ok(()));
            }
            Command::TogglePlayPause(reply) => {
                let _ = reply.send(controller.toggle_play_pause());
            }
            Command::Seek {
                direction,
                magnitude,
                reply,
            } => {
                let result = match magnitude {
                    Some(magnitude) => controller.seek_relative(direction, magnitude),
                    None => controller.seek_step(direction),
                };
                let _ = reply.send(result);
            }
            Command::BeginScrub(reply) => {
                let _ = reply.send(controller.begin_scrub());
            }
            Command::UpdateScrub {
                delta_pixels,
                screen_width,
                reply,
            } => {
                let _ = reply.send(controller.update_scrub(delta_pixels, screen_width));
            }
            Command::EndScrub(reply) => {
                let _ = reply.send(controller.end_scrub());
            }
            Command::CancelScrub(reply) => {
                let _ = reply.send(controller.cancel_scrub());
            }
            Command::SwitchVersion { target, reply } => {
                let _ = reply.send(controller.switch_version(target));
            }
            Command::SetTrack { kind, index, reply } => {
                let _ = reply.send(controller.set_track(kind, index));
            }
            Command::SetDelay {
                kind,
                delay_ms,
                reply,
            } => {
                let _ = reply.send(controller.set_delay(kind, delay_ms));
            }
            Command::ToggleFavorite(reply) => {
                let _ = reply.send(controller.toggle_favorite());
            }
            Command::ConfirmAutoplay(reply) => {
                let _ = reply.send(controller.confirm_autoplay());
            }
            Command::CancelAutoplay(reply) => {
                let _ = reply.send(controller.cancel_autoplay());
            }
        }
    }
}

/// Cloneable handle to a running session controller
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    // ===== Observation =====

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Watch published snapshots
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ===== Session Lifecycle =====

    /// Open a session, returning its generation once accepted
    pub async fn open(&self, request: OpenRequest) -> Result<Generation> {
        self.request(|reply| Command::Open { request, reply }).await
    }

    /// Open a session and wait until it settles
    ///
    /// Settles on `Playing`, `Paused`, `Error` or `Closed`, or when a newer
    /// generation replaces it.
    pub async fn open_and_wait(&self, request: OpenRequest) -> Result<SessionSnapshot> {
        let generation = self.open(request).await?;
        debug!(generation, "Waiting for session to settle");

        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|s| {
                s.generation != generation
                    || matches!(
                        s.state,
                        SessionState::Playing
                            | SessionState::Paused
                            | SessionState::Error { .. }
                            | SessionState::Closed
                    )
            })
            .await
            .map_err(|_| PlaybackError::ControllerGone)?
            .clone();

        Ok(snapshot)
    }

    /// Retry a failed session
    pub async fn retry(&self) -> Result<Generation> {
        self.request(Command::Retry).await
    }

    /// Close the session
    pub async fn close(&self) -> Result<()> {
        self.request(Command::Close).await
    }

    // ===== Transport =====

    /// Toggle play/pause
    pub async fn toggle_play_pause(&self) -> Result<PlayIntent> {
        self.request(Command::TogglePlayPause).await
    }

    /// Seek by `magnitude`, or by the configured step when `None`
    pub async fn seek_relative(
        &self,
        direction: SeekDirection,
        magnitude: Option<Duration>,
    ) -> Result<Duration> {
        self.request(|reply| Command::Seek {
            direction,
            magnitude,
            reply,
        })
        .await
    }

    // ===== Scrubbing =====

    /// Enter scrubbing
    pub async fn begin_scrub(&self) -> Result<Duration> {
        self.request(Command::BeginScrub).await
    }

    /// Update the cumulative drag
    pub async fn update_scrub(&self, delta_pixels: f64, screen_width: f64) -> Result<Duration> {
        self.request(|reply| Command::UpdateScrub {
            delta_pixels,
            screen_width,
            reply,
        })
        .await
    }

    /// Commit the scrub
    pub async fn end_scrub(&self) -> Result<Duration> {
        self.request(Command::EndScrub).await
    }

    /// Abandon the scrub
    pub async fn cancel_scrub(&self) -> Result<()> {
        self.request(Command::CancelScrub).await
    }

    // ===== Versions & Tracks =====

    /// Start a version switch
    pub async fn switch_version(&self, target: MediaSource) -> Result<()> {
        self.request(|reply| Command::SwitchVersion { target, reply })
            .await
    }

    /// Switch versions and wait for the outcome
    ///
    /// Fails with `SourceUnavailable` if the previous version had to be restored.
    pub async fn switch_version_and_wait(&self, target: MediaSource) -> Result<SessionSnapshot> {
        let target_id: SourceId = target.id.clone();
        self.switch_version(target).await?;

        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|s| s.switching_to.is_none())
            .await
            .map_err(|_| PlaybackError::ControllerGone)?
            .clone();

        if snapshot.source_id() == Some(&target_id) {
            Ok(snapshot)
        } else {
            Err(PlaybackError::SourceUnavailable(format!(
                "could not switch to {}",
                target_id
            )))
        }
    }

    /// Select a track
    pub async fn set_track(&self, kind: TrackKind, index: Option<usize>) -> Result<()> {
        self.request(|reply| Command::SetTrack { kind, index, reply })
            .await
    }

    /// Apply a delay offset
    pub async fn set_delay(&self, kind: TrackKind, delay_ms: i32) -> Result<()> {
        self.request(|reply| Command::SetDelay {
            kind,
            delay_ms,
            reply,
        })
        .await
    }

    // ===== Favorites & Autoplay =====

    /// Toggle the favorite flag
    pub async fn toggle_favorite(&self) -> Result<bool> {
        self.request(Command::ToggleFavorite).await
    }

    /// Confirm autoplay now
    pub async fn confirm_autoplay(&self) -> Result<Generation> {
        self.request(Command::ConfirmAutoplay).await
    }

    /// Cancel autoplay
    pub async fn cancel_autoplay(&self) -> Result<()> {
        self.request(Command::CancelAutoplay).await
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| PlaybackError::ControllerGone)?;
        rx.await.map_err(|_| PlaybackError::ControllerGone)?
    }
}
