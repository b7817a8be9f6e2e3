//! Engine driver
//!
//! The engine binding is shared by every session in the process, so all
//! access goes through one task that executes commands in order. Results
//! flow back to the controller inbox tagged with the generation (and load
//! ticket) they were issued for.
//!
//! The driver also remembers which tracks and delays the engine has taken
//! since the last load, so a refused change can name what is still in effect.

use crate::controller::Inbound;
use crate::tracks::TrackSelection;
use crate::types::Generation;
use couch_core::{MediaEngine, MediaSource, TrackKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Identifies one `load` issued by the controller
///
/// A generation can issue several loads (open, version switch, restore after
/// a failed switch); only the most recent ticket is honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    /// Generation the load belongs to
    pub generation: Generation,
    /// Load attempt, increasing across the controller's lifetime
    pub attempt: u64,
}

/// Commands executed by the engine driver
#[derive(Debug)]
pub(crate) enum EngineCommand {
    Load {
        ticket: LoadTicket,
        source: MediaSource,
        start: Duration,
        token: CancellationToken,
    },
    Unload,
    Play {
        generation: Generation,
    },
    Pause {
        generation: Generation,
    },
    Seek {
        generation: Generation,
        position: Duration,
    },
    SetTrack {
        generation: Generation,
        kind: TrackKind,
        index: Option<usize>,
        request: u64,
    },
    SetDelay {
        generation: Generation,
        kind: TrackKind,
        delay_ms: i32,
        request: u64,
    },
    Poll {
        generation: Generation,
    },
}

/// Spawn the driver task
///
/// The task ends when every command sender has been dropped.
pub(crate) fn spawn_driver(
    engine: Arc<dyn MediaEngine>,
    inbox: mpsc::UnboundedSender<Inbound>,
    buffering_timeout: Duration,
) -> (mpsc::UnboundedSender<EngineCommand>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        debug!("Engine driver started");
        let mut applied = TrackSelection::default();
        while let Some(command) = rx.recv().await {
            execute(engine.as_ref(), &inbox, buffering_timeout, &mut applied, command).await;
        }
        debug!("Engine driver stopped");
    });

    (tx, handle)
}

async fn execute(
    engine: &dyn MediaEngine,
    inbox: &mpsc::UnboundedSender<Inbound>,
    buffering_timeout: Duration,
    applied: &mut TrackSelection,
    command: EngineCommand,
) {
    // Send only fails once the controller has been dropped.
    let reply = |msg: Inbound| {
        let _ = inbox.send(msg);
    };

    match command {
        EngineCommand::Load {
            ticket,
            source,
            start,
            token,
        } => {
            if token.is_cancelled() {
                debug!(source = %source.id, "Skipping load for cancelled request");
                return;
            }

            debug!(source = %source.id, ?start, attempt = ticket.attempt, "Loading source");
            let outcome = tokio::select! {
                () = token.cancelled() => None,
                result = tokio::time::timeout(buffering_timeout, engine.load(&source, start)) => {
                    Some(match result {
                        Ok(Ok(media)) => Ok(media),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!(
                            "buffering timed out after {}s",
                            buffering_timeout.as_secs()
                        )),
                    })
                }
            };

            match outcome {
                Some(result) => {
                    if let Ok(media) = &result {
                        *applied = TrackSelection::initial(media);
                    }
                    reply(Inbound::Loaded { ticket, result });
                }
                None => debug!(source = %source.id, "Load cancelled"),
            }
        }
        EngineCommand::Unload => {
            if let Err(e) = engine.unload().await {
                warn!("Engine unload failed: {}", e);
            }
        }
        EngineCommand::Play { generation } => {
            if let Err(e) = engine.play().await {
                reply(Inbound::EngineFault {
                    generation,
                    message: e.to_string(),
                });
            }
        }
        EngineCommand::Pause { generation } => {
            if let Err(e) = engine.pause().await {
                reply(Inbound::EngineFault {
                    generation,
                    message: e.to_string(),
                });
            }
        }
        EngineCommand::Seek {
            generation,
            position,
        } => {
            if let Err(e) = engine.seek(position).await {
                reply(Inbound::SeekFailed {
                    generation,
                    message: e.to_string(),
                });
            }
        }
        EngineCommand::SetTrack {
            generation,
            kind,
            index,
            request,
        } => match engine.set_track(kind, index).await {
            Ok(()) => *applied.index_mut(kind) = index,
            Err(e) => reply(Inbound::TrackRejected {
                generation,
                kind,
                request,
                accepted: applied.index(kind),
                message: e.to_string(),
            }),
        },
        EngineCommand::SetDelay {
            generation,
            kind,
            delay_ms,
            request,
        } => match engine.set_delay(kind, delay_ms).await {
            Ok(()) => *applied.delay_mut(kind) = delay_ms,
            Err(e) => reply(Inbound::DelayRejected {
                generation,
                kind,
                request,
                accepted: applied.delay(kind),
                message: e.to_string(),
            }),
        },
        EngineCommand::Poll { generation } => match engine.position().await {
            Ok(position) => reply(Inbound::Position {
                generation,
                position,
            }),
            Err(e) => trace!("Position poll failed: {}", e),
        },
    }
}
