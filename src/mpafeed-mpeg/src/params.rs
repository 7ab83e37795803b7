use mpafeed_audio::SampleEncoding;

/// Every sample rate an MPEG 1/2/2.5 stream can carry.
pub const SUPPORTED_RATES: [u32; 9] = [
    8_000, 11_025, 12_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000,
];

/// One accepted output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedFormat {
    pub sample_rate: u32,
    pub mono: bool,
    pub stereo: bool,
    pub encoding: SampleEncoding,
}

/// Configuration a [`DecoderSession`](crate::DecoderSession) is created with.
#[derive(Debug, Clone, Default)]
pub struct DecoderParams {
    accepted: Vec<AcceptedFormat>,
    /// Report damaged frames at trace level instead of warn.
    pub quiet: bool,
    /// Trim encoder delay and padding when the stream carries a LAME tag.
    pub gapless: bool,
}

impl DecoderParams {
    /// Accepts nothing; add formats with [`accept`](Self::accept).
    pub fn none() -> Self {
        Self::default()
    }

    /// The plugin's fixed configuration: quiet, gapless, every rate in mono
    /// and stereo, signed 16-bit only. Replay gain is never applied.
    pub fn fixed() -> Self {
        let mut params = Self {
            quiet: true,
            gapless: true,
            ..Self::none()
        };
        for rate in SUPPORTED_RATES {
            params.accept(rate, true, true, SampleEncoding::S16Ne);
        }
        params
    }

    pub fn accept(&mut self, sample_rate: u32, mono: bool, stereo: bool, encoding: SampleEncoding) {
        self.accepted.push(AcceptedFormat {
            sample_rate,
            mono,
            stereo,
            encoding,
        });
    }

    pub fn accepts(&self, sample_rate: u32, channels: u16, encoding: SampleEncoding) -> bool {
        self.accepted.iter().any(|format| {
            format.sample_rate == sample_rate
                && format.encoding == encoding
                && match channels {
                    1 => format.mono,
                    2 => format.stereo,
                    _ => false,
                }
        })
    }

    pub fn accepted(&self) -> &[AcceptedFormat] {
        &self.accepted
    }
}
