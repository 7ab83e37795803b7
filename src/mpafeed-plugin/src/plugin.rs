//! The capability interface a host drives input plugins through.

use mpafeed_audio::{AudioSink, ByteSource, StreamFormat};
use mpafeed_mpeg::{EngineOutcome, StopToken};
use mpafeed_player::{ControllerError, PlaybackHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin {0} is not initialized")]
    NotInitialized(String),
    #[error("plugin initialization failed: {0}")]
    Init(String),
    #[error("a plugin with id {0} is already registered")]
    Duplicate(String),
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

pub type PluginResult<T> = Result<T, PluginError>;

/// Static facts about a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    /// Stable identifier (e.g. "mpeg").
    pub id: String,
    pub name: String,
    pub version: String,
}

/// What a plugin reports about a stream it recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub location: String,
    /// Display title derived from the location, never from tags.
    pub title: String,
    pub format: StreamFormat,
}

/// An input plugin: recognizes streams and plays them into an audio sink.
///
/// Extensions only route candidates; [`InputPlugin::is_our_file`] has the
/// final say.
pub trait InputPlugin: Send + Sync {
    fn info(&self) -> PluginInfo;

    /// One-line human description.
    fn description(&self) -> &str;

    /// Lowercase file extensions, without the dot.
    fn extensions(&self) -> &[&'static str];

    /// Prepares process-wide decoder state. Called once before any playback.
    fn init(&self) -> PluginResult<()>;

    fn cleanup(&self);

    /// Credits and version text for an about dialog.
    fn about(&self) -> String;

    /// Opens `location` and probes it.
    fn is_our_file(&self, location: &str) -> bool;

    /// Probes an already opened stream; the stream is rewound first.
    fn probe(&self, source: &mut dyn ByteSource) -> bool;

    /// Probes `location` and describes it when it is ours.
    fn probe_for_info(&self, location: &str) -> Option<TrackInfo>;

    /// Starts asynchronous playback on a dedicated thread.
    fn play(&self, location: &str, sink: Box<dyn AudioSink>) -> PluginResult<PlaybackHandle>;

    /// Plays on the calling thread until the stream ends or `stop` is
    /// requested.
    fn play_blocking(
        &self,
        location: &str,
        sink: Box<dyn AudioSink>,
        stop: StopToken,
    ) -> PluginResult<EngineOutcome>;

    /// Stops a playback started by [`InputPlugin::play`] and waits for it.
    fn stop(&self, handle: PlaybackHandle) -> PluginResult<EngineOutcome> {
        Ok(handle.request_stop()?)
    }
}

/// Lowercased extension of the last path segment of `location`.
pub fn extension_of(location: &str) -> Option<String> {
    let name = last_segment(location);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// A display title for `location`: its file name without the extension.
pub fn title_from_location(location: &str) -> String {
    let name = last_segment(location);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name.to_string(),
    }
}

fn last_segment(location: &str) -> &str {
    let trimmed = location.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
}
