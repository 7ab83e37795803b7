//! Synthetic MPEG streams for tests.
//!
//! Frames carry a valid header, all-zero side information and an empty main
//! data section, which every Layer III decoder turns into digital silence.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::header::{ChannelMode, FrameHeader, Layer, MpegVersion};

/// Header used for a silent frame at `sample_rate`.
///
/// MPEG-1 rates use 128 kbps, MPEG-2 rates 64 kbps and MPEG-2.5 rates
/// 32 kbps. Panics on a rate no MPEG version carries.
pub fn silent_header(sample_rate: u32, channels: u16) -> FrameHeader {
    let (version, bitrate_kbps) = match sample_rate {
        32_000 | 44_100 | 48_000 => (MpegVersion::Mpeg1, 128),
        16_000 | 22_050 | 24_000 => (MpegVersion::Mpeg2, 64),
        8_000 | 11_025 | 12_000 => (MpegVersion::Mpeg25, 32),
        other => panic!("no MPEG version carries {other} Hz"),
    };
    FrameHeader {
        version,
        layer: Layer::III,
        crc_protected: false,
        bitrate_kbps,
        sample_rate,
        padding: false,
        channel_mode: if channels == 1 {
            ChannelMode::Mono
        } else {
            ChannelMode::Stereo
        },
    }
}

/// A zero-filled frame behind `header`.
pub fn frame_with(header: &FrameHeader) -> Vec<u8> {
    let mut frame = vec![0u8; header.frame_len()];
    let bytes = header.to_bytes().expect("header must be encodable");
    frame[..4].copy_from_slice(&bytes);
    frame
}

pub fn silent_frame(sample_rate: u32, channels: u16) -> Vec<u8> {
    frame_with(&silent_header(sample_rate, channels))
}

/// `frames` consecutive silent frames.
pub fn silent_stream(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
    let frame = silent_frame(sample_rate, channels);
    let mut stream = Vec::with_capacity(frame.len() * frames);
    for _ in 0..frames {
        stream.extend_from_slice(&frame);
    }
    stream
}

/// A Layer III Info frame carrying a frame count and a LAME tag with the
/// given encoder delay and padding.
pub fn lame_info_frame(
    sample_rate: u32,
    channels: u16,
    frames: u32,
    delay: u16,
    padding: u16,
) -> Vec<u8> {
    let header = silent_header(sample_rate, channels);
    let mut frame = frame_with(&header);
    let at = header.payload_offset();
    frame[at..at + 4].copy_from_slice(b"Info");
    frame[at + 4..at + 8].copy_from_slice(&1u32.to_be_bytes());
    frame[at + 8..at + 12].copy_from_slice(&frames.to_be_bytes());
    let lame = at + 12;
    frame[lame..lame + 4].copy_from_slice(b"LAME");
    frame[lame + 21] = (delay >> 4) as u8;
    frame[lame + 22] = (((delay & 0x0F) << 4) as u8) | ((padding >> 8) as u8 & 0x0F);
    frame[lame + 23] = padding as u8;
    frame
}

/// Reproducible random bytes.
pub fn garbage(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes[..]);
    bytes
}
