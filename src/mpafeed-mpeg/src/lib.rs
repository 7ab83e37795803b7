//! MPEG audio (layers I, II and III) decoding driven by fixed-size feeds.
//!
//! - [`DecoderSession`] is pushed raw bytes and reports need-more /
//!   new-format / ready.
//! - [`probe`] decides whether a byte source holds decodable MPEG audio.
//! - [`DecodeEngine`] runs the read, decode and write loop for one stream,
//!   watching a [`StopToken`] set from another thread.

mod engine;
mod error;
mod gapless;
pub mod header;
mod params;
mod probe;
mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Bytes read from the source per feed.
pub const BLOCK_SIZE: usize = 16_384;
/// Interleaved samples in one output block (16384 bytes of s16).
pub const PCM_BLOCK_SAMPLES: usize = BLOCK_SIZE / 2;

pub use engine::{DecodeEngine, EngineOutcome, PlaybackStats, StopToken};
pub use error::{PlaybackError, Unresolved};
pub use gapless::{GaplessTrim, InfoTag, DECODER_DELAY};
pub use header::FrameHeader;
pub use params::{AcceptedFormat, DecoderParams, SUPPORTED_RATES};
pub use probe::{probe, probe_format, RESYNC_LIMIT};
pub use session::{
    DecodeError, DecodeStatus, Decoded, DecoderSession, SessionError, SessionStats,
};
