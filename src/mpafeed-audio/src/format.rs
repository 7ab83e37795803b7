use std::fmt;
use std::time::Duration;

/// PCM sample encodings a sink can be asked to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleEncoding {
    /// Signed 16-bit, native endian.
    #[default]
    S16Ne,
}

impl SampleEncoding {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleEncoding::S16Ne => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleEncoding::S16Ne => "s16",
        }
    }
}

/// Negotiated shape of a decoded stream. Fixed once a session resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl StreamFormat {
    pub fn s16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            encoding: SampleEncoding::S16Ne,
        }
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * self.encoding.bytes_per_sample() as u64
    }

    /// Playback time covered by `samples` interleaved samples.
    pub fn duration_of(&self, samples: u64) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = samples / self.channels as u64;
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {}",
            self.sample_rate,
            self.channels,
            self.encoding.name()
        )
    }
}
