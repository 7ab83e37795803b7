//! MPEG audio frame headers.
//!
//! A header is four bytes:
//! - 11 sync bits
//! - version (2 bits), layer (2), protection (1)
//! - bitrate index (4), sample-rate index (2), padding (1), private (1)
//! - channel mode (2), mode extension (2), copyright, original, emphasis (2)

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    /// Unofficial low-rate extension.
    Mpeg25,
}

impl MpegVersion {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b11 => Some(MpegVersion::Mpeg1),
            0b10 => Some(MpegVersion::Mpeg2),
            0b00 => Some(MpegVersion::Mpeg25),
            _ => None,
        }
    }

    fn bits(self) -> u8 {
        match self {
            MpegVersion::Mpeg1 => 0b11,
            MpegVersion::Mpeg2 => 0b10,
            MpegVersion::Mpeg25 => 0b00,
        }
    }

    fn sample_rates(self) -> [u32; 3] {
        match self {
            MpegVersion::Mpeg1 => [44_100, 48_000, 32_000],
            MpegVersion::Mpeg2 => [22_050, 24_000, 16_000],
            MpegVersion::Mpeg25 => [11_025, 12_000, 8_000],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    I,
    II,
    III,
}

impl Layer {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b11 => Some(Layer::I),
            0b10 => Some(Layer::II),
            0b01 => Some(Layer::III),
            _ => None,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Layer::I => 0b11,
            Layer::II => 0b10,
            Layer::III => 0b01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        }
    }

    fn bits(self) -> u8 {
        match self {
            ChannelMode::Stereo => 0b00,
            ChannelMode::JointStereo => 0b01,
            ChannelMode::DualChannel => 0b10,
            ChannelMode::Mono => 0b11,
        }
    }

    pub fn channels(self) -> u16 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

// Bitrates in kbps, indexed by the 4-bit field. Index 0 (free format) is
// unsupported and index 15 is forbidden.
const V1_L1: [u32; 15] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];
const V1_L2: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];
const V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const V2_L1: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];
const V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

fn bitrate_table(version: MpegVersion, layer: Layer) -> &'static [u32; 15] {
    match (version, layer) {
        (MpegVersion::Mpeg1, Layer::I) => &V1_L1,
        (MpegVersion::Mpeg1, Layer::II) => &V1_L2,
        (MpegVersion::Mpeg1, Layer::III) => &V1_L3,
        (_, Layer::I) => &V2_L1,
        (_, _) => &V2_L23,
    }
}

/// A decoded, validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub layer: Layer,
    /// A 16-bit CRC follows the header.
    pub crc_protected: bool,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub channel_mode: ChannelMode,
}

impl FrameHeader {
    pub const LEN: usize = 4;

    /// Parses the first four bytes of `bytes`; `None` when they are not a
    /// usable header (bad sync, reserved fields, free-format bitrate).
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::LEN {
            return None;
        }
        if bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
            return None;
        }
        let version = MpegVersion::from_bits((bytes[1] >> 3) & 0b11)?;
        let layer = Layer::from_bits((bytes[1] >> 1) & 0b11)?;
        let crc_protected = bytes[1] & 0x01 == 0;

        let bitrate_index = (bytes[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let rate_index = ((bytes[2] >> 2) & 0b11) as usize;
        if rate_index == 3 {
            return None;
        }
        // Reserved emphasis.
        if bytes[3] & 0b11 == 0b10 {
            return None;
        }

        Some(Self {
            version,
            layer,
            crc_protected,
            bitrate_kbps: bitrate_table(version, layer)[bitrate_index],
            sample_rate: version.sample_rates()[rate_index],
            padding: bytes[2] & 0x02 != 0,
            channel_mode: ChannelMode::from_bits(bytes[3] >> 6),
        })
    }

    /// Encodes the header back into its four wire bytes.
    ///
    /// Returns `None` if the bitrate or sample rate is not representable for
    /// this version and layer.
    pub fn to_bytes(&self) -> Option<[u8; 4]> {
        let bitrate_index = bitrate_table(self.version, self.layer)
            .iter()
            .skip(1)
            .position(|&kbps| kbps == self.bitrate_kbps)?
            + 1;
        let rate_index = self
            .version
            .sample_rates()
            .iter()
            .position(|&rate| rate == self.sample_rate)?;

        let b1 = 0xE0
            | (self.version.bits() << 3)
            | (self.layer.bits() << 1)
            | u8::from(!self.crc_protected);
        let b2 = ((bitrate_index as u8) << 4)
            | ((rate_index as u8) << 2)
            | (u8::from(self.padding) << 1);
        let b3 = self.channel_mode.bits() << 6;
        Some([0xFF, b1, b2, b3])
    }

    pub fn channels(&self) -> u16 {
        self.channel_mode.channels()
    }

    pub fn samples_per_frame(&self) -> usize {
        match (self.layer, self.version) {
            (Layer::I, _) => 384,
            (Layer::II, _) => 1152,
            (Layer::III, MpegVersion::Mpeg1) => 1152,
            (Layer::III, _) => 576,
        }
    }

    /// Whole frame length in bytes, header included.
    pub fn frame_len(&self) -> usize {
        let bitrate = self.bitrate_kbps as usize * 1000;
        let rate = self.sample_rate as usize;
        let pad = usize::from(self.padding);
        match (self.layer, self.version) {
            (Layer::I, _) => (12 * bitrate / rate + pad) * 4,
            (Layer::II, _) | (Layer::III, MpegVersion::Mpeg1) => 144 * bitrate / rate + pad,
            (Layer::III, _) => 72 * bitrate / rate + pad,
        }
    }

    /// Length of the Layer III side information block; zero for other layers.
    pub fn side_info_len(&self) -> usize {
        match (self.layer, self.version, self.channel_mode) {
            (Layer::III, MpegVersion::Mpeg1, ChannelMode::Mono) => 17,
            (Layer::III, MpegVersion::Mpeg1, _) => 32,
            (Layer::III, _, ChannelMode::Mono) => 9,
            (Layer::III, _, _) => 17,
            _ => 0,
        }
    }

    /// Offset of the first byte after header, CRC and side information.
    pub fn payload_offset(&self) -> usize {
        Self::LEN + if self.crc_protected { 2 } else { 0 } + self.side_info_len()
    }

    /// Whether `next` can follow `self` in the same stream.
    pub fn is_compatible(&self, next: &FrameHeader) -> bool {
        self.version == next.version
            && self.layer == next.layer
            && self.sample_rate == next.sample_rate
            && self.channels() == next.channels()
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self.version {
            MpegVersion::Mpeg1 => "1",
            MpegVersion::Mpeg2 => "2",
            MpegVersion::Mpeg25 => "2.5",
        };
        let layer = match self.layer {
            Layer::I => "I",
            Layer::II => "II",
            Layer::III => "III",
        };
        write!(
            f,
            "MPEG-{version} layer {layer}, {} kbps, {} Hz, {:?}",
            self.bitrate_kbps, self.sample_rate, self.channel_mode
        )
    }
}

/// Total size of an ID3v2 tag starting at `bytes`, footer included.
///
/// Needs the 10-byte tag header; `None` if `bytes` does not start one.
pub fn id3v2_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < 10 || &bytes[..3] != b"ID3" {
        return None;
    }
    if bytes[3] == 0xFF || bytes[4] == 0xFF {
        return None;
    }
    let size = &bytes[6..10];
    if size.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    let body = size.iter().fold(0usize, |acc, &b| (acc << 7) | b as usize);
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + body + footer)
}
