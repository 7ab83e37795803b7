//! Xing/Info frames and LAME encoder delay/padding.

use crate::header::{FrameHeader, Layer};

/// Samples of delay the Layer III synthesis filter adds on top of the
/// encoder delay recorded in a LAME tag.
pub const DECODER_DELAY: u64 = 529;

const FLAG_FRAMES: u32 = 0x1;
const FLAG_BYTES: u32 = 0x2;
const FLAG_TOC: u32 = 0x4;
const FLAG_QUALITY: u32 = 0x8;

/// Contents of a Xing/Info frame, plus the LAME extension when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InfoTag {
    /// Audio frames in the stream, not counting the Info frame.
    pub frames: Option<u32>,
    pub bytes: Option<u32>,
    pub encoder_delay: Option<u32>,
    pub padding: Option<u32>,
}

impl InfoTag {
    /// Looks for a Xing/Info tag in a complete frame.
    pub fn parse(frame: &[u8], header: &FrameHeader) -> Option<Self> {
        if header.layer != Layer::III {
            return None;
        }
        let tag = frame.get(header.payload_offset()..)?;
        if tag.len() < 8 || !(tag.starts_with(b"Xing") || tag.starts_with(b"Info")) {
            return None;
        }
        let flags = read_u32(tag, 4)?;
        let mut cursor = 8;
        let mut info = InfoTag::default();

        if flags & FLAG_FRAMES != 0 {
            info.frames = Some(read_u32(tag, cursor)?);
            cursor += 4;
        }
        if flags & FLAG_BYTES != 0 {
            info.bytes = Some(read_u32(tag, cursor)?);
            cursor += 4;
        }
        if flags & FLAG_TOC != 0 {
            cursor += 100;
        }
        if flags & FLAG_QUALITY != 0 {
            cursor += 4;
        }

        if let Some(lame) = tag.get(cursor..cursor + 24) {
            if matches!(&lame[..4], b"LAME" | b"Lavf" | b"Lavc") {
                info.encoder_delay = Some(((lame[21] as u32) << 4) | ((lame[22] as u32) >> 4));
                info.padding = Some((((lame[22] & 0x0F) as u32) << 8) | lame[23] as u32);
            }
        }
        Some(info)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Drops leading and trailing samples so only the encoded signal is output.
///
/// Counts are in frames (one sample per channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GaplessTrim {
    skip: u64,
    remaining: Option<u64>,
}

impl GaplessTrim {
    /// Passes everything through.
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a trim from a tag; no-op unless both delay and padding are known.
    pub fn from_tag(tag: &InfoTag, samples_per_frame: usize) -> Self {
        let (Some(delay), Some(padding)) = (tag.encoder_delay, tag.padding) else {
            return Self::none();
        };
        let remaining = tag.frames.map(|frames| {
            (frames as u64 * samples_per_frame as u64).saturating_sub(delay as u64 + padding as u64)
        });
        Self {
            skip: delay as u64 + DECODER_DELAY,
            remaining,
        }
    }

    pub fn is_active(&self) -> bool {
        self.skip > 0 || self.remaining.is_some()
    }

    /// Trims interleaved `samples` in place.
    pub fn apply(&mut self, samples: &mut Vec<i16>, channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = (samples.len() / channels) as u64;
        let skip = self.skip.min(frames);
        if skip > 0 {
            samples.drain(..skip as usize * channels);
            self.skip -= skip;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            let keep = (*remaining).min(frames - skip);
            samples.truncate(keep as usize * channels);
            *remaining -= keep;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info_frame(with_lame: bool) -> (Vec<u8>, FrameHeader) {
        let header = FrameHeader::parse(&[0xFF, 0xFB, 0x90, 0x00]).unwrap();
        let mut frame = vec![0u8; header.frame_len()];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        let at = header.payload_offset();
        frame[at..at + 4].copy_from_slice(b"Info");
        frame[at + 4..at + 8].copy_from_slice(&(FLAG_FRAMES | FLAG_TOC).to_be_bytes());
        frame[at + 8..at + 12].copy_from_slice(&100u32.to_be_bytes());
        if with_lame {
            let lame = at + 12 + 100;
            frame[lame..lame + 4].copy_from_slice(b"LAME");
            // delay 576, padding 1000
            frame[lame + 21] = 0x24;
            frame[lame + 22] = 0x03;
            frame[lame + 23] = 0xE8;
        }
        (frame, header)
    }

    #[test]
    fn parses_info_and_lame_extension() {
        let (frame, header) = info_frame(true);
        let tag = InfoTag::parse(&frame, &header).unwrap();
        assert_eq!(tag.frames, Some(100));
        assert_eq!(tag.bytes, None);
        assert_eq!(tag.encoder_delay, Some(576));
        assert_eq!(tag.padding, Some(1000));
    }

    #[test]
    fn plain_frame_has_no_tag() {
        let header = FrameHeader::parse(&[0xFF, 0xFB, 0x90, 0x00]).unwrap();
        let frame = vec![0u8; header.frame_len()];
        assert_eq!(InfoTag::parse(&frame, &header), None);
    }

    #[test]
    fn trim_without_lame_is_inert() {
        let (frame, header) = info_frame(false);
        let tag = InfoTag::parse(&frame, &header).unwrap();
        assert!(!GaplessTrim::from_tag(&tag, 1152).is_active());
    }

    #[test]
    fn trim_drops_delay_and_padding_across_calls() {
        let tag = InfoTag {
            frames: Some(2),
            bytes: None,
            encoder_delay: Some(100),
            padding: Some(200),
        };
        let mut trim = GaplessTrim::from_tag(&tag, 1152);
        // Two stereo frames of output, 2304 samples total, minus 300 trimmed.
        let mut emitted = 0;
        for _ in 0..3 {
            let mut block = vec![1i16; 1152 * 2];
            trim.apply(&mut block, 2);
            emitted += block.len() / 2;
        }
        assert_eq!(emitted, 2 * 1152 - 300);
    }
}
