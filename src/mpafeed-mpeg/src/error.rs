use std::io;

use mpafeed_audio::{SinkError, SourceError};
use thiserror::Error;

use crate::session::{DecodeError, DecodeStatus, SessionError};

/// Why a stream never produced a format.
#[derive(Debug, Error)]
pub enum Unresolved {
    #[error("end of stream before a frame header was found")]
    EndOfStream,
    #[error("decoder stopped with status {0:?}")]
    Status(DecodeStatus),
    #[error("gave up after dropping {dropped} bytes without finding sync")]
    ResyncLimit { dropped: u64 },
    #[error(transparent)]
    Decode(DecodeError),
}

/// Everything that can end a probe or a playback.
///
/// None of these escape the engine: before PLAYING they mean "nothing to
/// play", after it they end the track.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to open stream: {0}")]
    SourceOpen(#[from] SourceError),
    #[error("failed to create decoder session: {0}")]
    SessionCreate(SessionError),
    #[error("failed to open decoder feed: {0}")]
    OpenFeed(SessionError),
    #[error("stream format unresolved: {0}")]
    FormatUnresolved(Unresolved),
    #[error("sink refused the stream: {0}")]
    SinkOpen(SinkError),
    #[error("failed to rewind stream: {0}")]
    Seek(io::Error),
    #[error("read failed: {0}")]
    Read(io::Error),
    #[error("audio sink failed: {0}")]
    SinkWrite(SinkError),
    #[error("decode failed: {0}")]
    Decode(DecodeError),
}

impl PlaybackError {
    /// True for failures that came from the byte source rather than the data.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            PlaybackError::SourceOpen(_) | PlaybackError::Seek(_) | PlaybackError::Read(_)
        )
    }
}
