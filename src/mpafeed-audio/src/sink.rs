use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::format::StreamFormat;

/// Audio output errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink declined format {0}")]
    Declined(StreamFormat),
    #[error("sink is not open")]
    NotOpen,
    #[error("audio backend unavailable: {0}")]
    Backend(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Destination for decoded PCM.
///
/// Blocks are interleaved native-endian `i16` samples in the format passed to
/// `open`. The sink owns playback timing; callers hand blocks over and forget
/// them.
pub trait AudioSink: Send {
    fn open(&mut self, format: &StreamFormat) -> Result<(), SinkError>;

    /// Accepts one block. Empty blocks are allowed.
    fn write(&mut self, block: &[i16]) -> Result<(), SinkError>;

    /// Closes the output stream. Calling it on a closed sink is a no-op.
    fn close(&mut self);
}

impl<T: AudioSink + ?Sized> AudioSink for Box<T> {
    fn open(&mut self, format: &StreamFormat) -> Result<(), SinkError> {
        (**self).open(format)
    }

    fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
        (**self).write(block)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Discards audio, counting what went through. Used headless.
#[derive(Debug, Default, Clone)]
pub struct NullSink {
    format: Option<StreamFormat>,
    samples: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

impl AudioSink for NullSink {
    fn open(&mut self, format: &StreamFormat) -> Result<(), SinkError> {
        self.format = Some(*format);
        Ok(())
    }

    fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
        if self.format.is_none() {
            return Err(SinkError::NotOpen);
        }
        self.samples += block.len() as u64;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(format) = self.format.take() {
            tracing::debug!(
                samples = self.samples,
                played = ?format.duration_of(self.samples),
                "null sink closed"
            );
        }
    }
}

/// Everything a [`MemorySink`] has seen.
#[derive(Debug, Default, Clone)]
pub struct SinkLog {
    /// Formats passed to `open`, including declined ones.
    pub opened: Vec<StreamFormat>,
    /// Size of every block written, in samples.
    pub block_sizes: Vec<usize>,
    pub samples: Vec<i16>,
    pub closes: usize,
    /// True while an output stream is open.
    pub is_open: bool,
}

impl SinkLog {
    pub fn non_empty_blocks(&self) -> usize {
        self.block_sizes.iter().filter(|&&n| n > 0).count()
    }
}

/// Records everything written into a shared [`SinkLog`].
#[derive(Debug, Clone)]
pub struct MemorySink {
    log: Arc<Mutex<SinkLog>>,
    accept: bool,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(SinkLog::default())),
            accept: true,
        }
    }

    /// A sink that refuses every format.
    pub fn declining() -> Self {
        Self {
            accept: false,
            ..Self::new()
        }
    }

    /// Shared view of the log; stays valid after the sink is moved away.
    pub fn log(&self) -> Arc<Mutex<SinkLog>> {
        self.log.clone()
    }

    pub fn snapshot(&self) -> SinkLog {
        self.log.lock().unwrap().clone()
    }
}

impl AudioSink for MemorySink {
    fn open(&mut self, format: &StreamFormat) -> Result<(), SinkError> {
        let mut log = self.log.lock().unwrap();
        log.opened.push(*format);
        if !self.accept {
            return Err(SinkError::Declined(*format));
        }
        log.is_open = true;
        Ok(())
    }

    fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
        let mut log = self.log.lock().unwrap();
        if !log.is_open {
            return Err(SinkError::NotOpen);
        }
        log.block_sizes.push(block.len());
        log.samples.extend_from_slice(block);
        Ok(())
    }

    fn close(&mut self) {
        let mut log = self.log.lock().unwrap();
        if log.is_open {
            log.is_open = false;
            log.closes += 1;
        }
    }
}

/// Writes raw native-endian s16 PCM to a file, truncating it on open.
#[derive(Debug)]
pub struct RawFileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes: u64,
}

impl RawFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            bytes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioSink for RawFileSink {
    fn open(&mut self, format: &StreamFormat) -> Result<(), SinkError> {
        let file = File::create(&self.path)?;
        tracing::info!(path = %self.path.display(), %format, "writing raw pcm");
        self.writer = Some(BufWriter::new(file));
        self.bytes = 0;
        Ok(())
    }

    fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::NotOpen)?;
        for sample in block {
            writer.write_all(&sample.to_ne_bytes())?;
        }
        self.bytes += (block.len() * 2) as u64;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                tracing::warn!(path = %self.path.display(), "failed to flush raw pcm: {err}");
            }
            tracing::debug!(path = %self.path.display(), bytes = self.bytes, "raw pcm closed");
        }
    }
}

impl Drop for RawFileSink {
    fn drop(&mut self) {
        self.close();
    }
}
