use mpafeed_audio::{read_block, ByteSource, StreamFormat};

use crate::error::{PlaybackError, Unresolved};
use crate::params::DecoderParams;
use crate::session::{DecodeStatus, DecoderSession};
use crate::BLOCK_SIZE;

/// Garbage a session may skip while looking for the first frame.
pub const RESYNC_LIMIT: u64 = 256 * 1024;

/// Whether `source` holds MPEG audio this plugin can decode.
///
/// Rewinds the source first and runs a throwaway session; nothing carries
/// over to playback.
pub fn probe<S: ByteSource + ?Sized>(source: &mut S) -> bool {
    match probe_format(source, &DecoderParams::fixed()) {
        Ok(format) => {
            tracing::debug!(%format, "probe: stream identified as MPEG");
            true
        }
        Err(PlaybackError::Read(err)) => {
            tracing::debug!("probe: read failed: {err}");
            false
        }
        Err(err) => {
            tracing::debug!("probe: not ours: {err}");
            false
        }
    }
}

/// Like [`probe`], but reports the resolved format or why there is none.
pub fn probe_format<S: ByteSource + ?Sized>(
    source: &mut S,
    params: &DecoderParams,
) -> Result<StreamFormat, PlaybackError> {
    source.seek(0).map_err(PlaybackError::Seek)?;
    let mut session = DecoderSession::new(params).map_err(PlaybackError::SessionCreate)?;
    session.open_feed().map_err(PlaybackError::OpenFeed)?;
    resolve_format(source, &mut session)
}

/// Feeds blocks without requesting output until the session names a format.
pub(crate) fn resolve_format<S: ByteSource + ?Sized>(
    source: &mut S,
    session: &mut DecoderSession,
) -> Result<StreamFormat, PlaybackError> {
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let len = match read_block(source, &mut buf) {
            Ok(0) => return Err(PlaybackError::FormatUnresolved(Unresolved::EndOfStream)),
            Ok(n) => n,
            Err(err) => return Err(PlaybackError::Read(err)),
        };

        let decoded = session
            .decode(&buf[..len], None)
            .map_err(|err| PlaybackError::FormatUnresolved(Unresolved::Decode(err)))?;
        match decoded.status {
            DecodeStatus::NeedMore => {
                let dropped = session.stats().bytes_dropped;
                if dropped > RESYNC_LIMIT {
                    return Err(PlaybackError::FormatUnresolved(
                        Unresolved::ResyncLimit { dropped },
                    ));
                }
            }
            DecodeStatus::NewFormat => {
                return session.format().ok_or(PlaybackError::FormatUnresolved(
                    Unresolved::Status(DecodeStatus::NewFormat),
                ));
            }
            other => return Err(PlaybackError::FormatUnresolved(Unresolved::Status(other))),
        }
    }
}
