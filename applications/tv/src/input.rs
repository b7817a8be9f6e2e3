//! Console stand-in for the remote and touch surface
//!
//! One command per line: remote keys (`left`, `ok`, `menu`, ...), touch
//! gestures (`swipe DX DY`, `drag PX`, `release`) and a few shortcuts for
//! the pickers the remote would normally reach through overlays.

use crate::error::{Result, TvError};
use couch_core::TrackKind;
use couch_playback::RemoteKey;

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Remote button press
    Key(RemoteKey),
    /// Start of a touch drag with its initial movement
    Swipe { dx: f64, dy: f64 },
    /// Cumulative horizontal movement of the drag in progress
    Drag(f64),
    /// Finger lifted, commits the drag
    Release,
    /// Toggle the favorite flag
    Favorite,
    /// Select a track directly; `None` turns subtitles off
    Track(TrackKind, Option<usize>),
    /// Set a delay offset in milliseconds
    Delay(TrackKind, i32),
    /// Switch to a version by id
    Version(String),
    /// Print the session state
    Status,
    /// Leave the player
    Quit,
}

pub fn parse_line(line: &str) -> Result<Option<InputEvent>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let event = match command.to_ascii_lowercase().as_str() {
        "swipe" => {
            let (dx, dy) = match args.as_slice() {
                [dx, dy] => (number(dx)?, number(dy)?),
                _ => return Err(usage("swipe DX DY")),
            };
            InputEvent::Swipe { dx, dy }
        }
        "drag" => match args.as_slice() {
            [px] => InputEvent::Drag(number(px)?),
            _ => return Err(usage("drag PX")),
        },
        "release" => InputEvent::Release,
        "fav" | "favorite" => InputEvent::Favorite,
        "audio" => match args.as_slice() {
            [index] => InputEvent::Track(TrackKind::Audio, Some(index_arg(index)?)),
            _ => return Err(usage("audio N")),
        },
        "sub" | "subtitle" => match args.as_slice() {
            ["off"] => InputEvent::Track(TrackKind::Subtitle, None),
            [index] => InputEvent::Track(TrackKind::Subtitle, Some(index_arg(index)?)),
            _ => return Err(usage("sub N|off")),
        },
        "delay" => match args.as_slice() {
            [kind, ms] => InputEvent::Delay(track_kind(kind)?, delay_arg(ms)?),
            _ => return Err(usage("delay audio|sub MS")),
        },
        "version" => match args.as_slice() {
            [id] => InputEvent::Version((*id).to_string()),
            _ => return Err(usage("version ID")),
        },
        "status" | "s" => InputEvent::Status,
        "quit" | "q" | "exit" => InputEvent::Quit,
        key => InputEvent::Key(key.parse().map_err(TvError::Input)?),
    };

    Ok(Some(event))
}

fn usage(form: &str) -> TvError {
    TvError::Input(format!("usage: {}", form))
}

fn number(arg: &str) -> Result<f64> {
    arg.parse()
        .map_err(|_| TvError::Input(format!("not a number: {}", arg)))
}

fn index_arg(arg: &str) -> Result<usize> {
    arg.parse()
        .map_err(|_| TvError::Input(format!("not a track index: {}", arg)))
}

fn delay_arg(arg: &str) -> Result<i32> {
    arg.parse()
        .map_err(|_| TvError::Input(format!("not a delay in ms: {}", arg)))
}

fn track_kind(arg: &str) -> Result<TrackKind> {
    match arg {
        "audio" | "a" => Ok(TrackKind::Audio),
        "sub" | "subtitle" | "s" => Ok(TrackKind::Subtitle),
        other => Err(TvError::Input(format!("unknown track kind: {}", other))),
    }
}
