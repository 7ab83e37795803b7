//! Feed-mode decoder sessions.
//!
//! A session is pushed raw bytes with [`DecoderSession::decode`] and answers
//! with a [`DecodeStatus`]: it first reports [`DecodeStatus::NewFormat`] once
//! two consecutive frame headers agree, then turns complete frames into
//! interleaved `i16` PCM through symphonia's MPEG audio codec.

use std::collections::VecDeque;

use mpafeed_audio::{SampleEncoding, StreamFormat};
use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{
    CodecParameters, CodecType, Decoder, DecoderOptions, CODEC_TYPE_MP1, CODEC_TYPE_MP2,
    CODEC_TYPE_MP3,
};
use symphonia::core::formats::Packet;
use thiserror::Error;

use crate::gapless::{GaplessTrim, InfoTag};
use crate::header::{id3v2_len, FrameHeader, Layer};
use crate::params::DecoderParams;

/// Errors creating or opening a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("decoder parameters accept no output format")]
    NoFormats,
    #[error("no MPEG audio codec registered")]
    CodecUnavailable,
    #[error("session is already open")]
    AlreadyOpen,
}

/// Terminal decode failures. Damaged frames are skipped, not reported here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("session is not open for feeding")]
    NotOpen,
    #[error("stream format {sample_rate} Hz / {channels} ch is not accepted")]
    Rejected { sample_rate: u32, channels: u16 },
    #[error("failed to set up codec: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// All input consumed; feed more before anything else can happen.
    NeedMore,
    /// The stream format was just resolved; query it with
    /// [`DecoderSession::format`].
    NewFormat,
    /// The output block is full and more PCM may be pending.
    Ready,
}

/// Outcome of one [`DecoderSession::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub status: DecodeStatus,
    /// Samples written to the output block.
    pub produced: usize,
}

impl Decoded {
    fn need_more(produced: usize) -> Self {
        Self {
            status: DecodeStatus::NeedMore,
            produced,
        }
    }
}

/// Counters kept over a session's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_decoded: u64,
    pub frames_skipped: u64,
    pub bytes_dropped: u64,
}

/// A single-stream feed decoder.
///
/// Created per probe and per playback, never shared. Dropping it releases
/// the codec and every buffered byte.
pub struct DecoderSession {
    params: DecoderParams,
    open: bool,
    input: Vec<u8>,
    pos: usize,
    /// Bytes of an ID3v2 tag still to be skipped.
    skip: usize,
    /// The previous frame ended exactly where the next header starts.
    synced: bool,
    /// No input will follow what is buffered.
    input_ended: bool,
    reference: Option<FrameHeader>,
    format: Option<StreamFormat>,
    announced: bool,
    codec: Option<Box<dyn Decoder>>,
    sample_buf: Option<SampleBuffer<i16>>,
    scratch: Vec<i16>,
    pending: VecDeque<i16>,
    expect_info: bool,
    trim: GaplessTrim,
    stats: SessionStats,
}

impl std::fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderSession")
            .field("open", &self.open)
            .field("format", &self.format)
            .field("buffered", &(self.input.len() - self.pos))
            .field("pending", &self.pending.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl DecoderSession {
    pub fn new(params: &DecoderParams) -> Result<Self, SessionError> {
        if params.accepted().is_empty() {
            return Err(SessionError::NoFormats);
        }
        if symphonia::default::get_codecs()
            .get_codec(CODEC_TYPE_MP3)
            .is_none()
        {
            return Err(SessionError::CodecUnavailable);
        }
        Ok(Self {
            params: params.clone(),
            open: false,
            input: Vec::new(),
            pos: 0,
            skip: 0,
            synced: false,
            input_ended: false,
            reference: None,
            format: None,
            announced: false,
            codec: None,
            sample_buf: None,
            scratch: Vec::new(),
            pending: VecDeque::new(),
            expect_info: true,
            trim: GaplessTrim::none(),
            stats: SessionStats::default(),
        })
    }

    /// Puts the session into feed mode.
    pub fn open_feed(&mut self) -> Result<(), SessionError> {
        if self.open {
            return Err(SessionError::AlreadyOpen);
        }
        self.open = true;
        tracing::trace!("decoder session opened in feed mode");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The resolved stream format, once [`DecodeStatus::NewFormat`] was seen.
    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Feeds `input` and, when `output` is given, fills it with PCM.
    ///
    /// Before the format is known no output is produced. With `output` set
    /// to `None` input is only buffered.
    pub fn decode(
        &mut self,
        input: &[u8],
        output: Option<&mut [i16]>,
    ) -> Result<Decoded, DecodeError> {
        if !self.open {
            return Err(DecodeError::NotOpen);
        }
        self.feed(input);

        if !self.announced {
            return self.resolve_format();
        }

        let Some(output) = output else {
            return Ok(Decoded::need_more(0));
        };

        let mut written = 0;
        loop {
            written += self.drain_pending(&mut output[written..]);
            if written == output.len() {
                return Ok(Decoded {
                    status: DecodeStatus::Ready,
                    produced: written,
                });
            }
            let Some(header) = self.next_frame(!self.synced) else {
                return Ok(Decoded::need_more(written));
            };
            self.decode_frame(header);
        }
    }

    /// Declares that no more input follows, so a trailing frame that cannot
    /// be confirmed by a next header is still decoded when it exactly fills
    /// the remaining buffer.
    pub fn end_of_input(&mut self) {
        self.input_ended = true;
    }

    /// Forgets buffered input and decoder state but keeps the resolved
    /// format, so the stream can be fed again from its first byte.
    pub fn discard_input(&mut self) {
        self.input.clear();
        self.pos = 0;
        self.skip = 0;
        self.synced = false;
        self.input_ended = false;
        self.pending.clear();
        self.expect_info = true;
        self.trim = GaplessTrim::none();
        if let Some(codec) = self.codec.as_mut() {
            codec.reset();
        }
    }

    fn feed(&mut self, input: &[u8]) {
        if self.pos > 0 {
            self.input.drain(..self.pos);
            self.pos = 0;
        }
        self.input.extend_from_slice(input);
    }

    fn resolve_format(&mut self) -> Result<Decoded, DecodeError> {
        let Some(header) = self.next_frame(true) else {
            return Ok(Decoded::need_more(0));
        };
        let channels = header.channels();
        if !self
            .params
            .accepts(header.sample_rate, channels, SampleEncoding::S16Ne)
        {
            return Err(DecodeError::Rejected {
                sample_rate: header.sample_rate,
                channels,
            });
        }

        self.codec = Some(make_codec(&header)?);
        self.reference = Some(header);
        self.format = Some(StreamFormat::s16(header.sample_rate, channels));
        self.announced = true;
        tracing::debug!(%header, "stream identified as MPEG");
        Ok(Decoded {
            status: DecodeStatus::NewFormat,
            produced: 0,
        })
    }

    fn drain_pending(&mut self, output: &mut [i16]) -> usize {
        let n = output.len().min(self.pending.len());
        for (slot, sample) in output.iter_mut().zip(self.pending.drain(..n)) {
            *slot = sample;
        }
        n
    }

    /// Finds the next complete frame at the read position, skipping tags and
    /// garbage. `None` means more input is needed.
    ///
    /// With `confirm` the header must be followed by a compatible one.
    fn next_frame(&mut self, confirm: bool) -> Option<FrameHeader> {
        let mut confirm = confirm;
        loop {
            if self.skip > 0 {
                let n = self.skip.min(self.input.len() - self.pos);
                self.pos += n;
                self.skip -= n;
                if self.skip > 0 {
                    return None;
                }
            }

            let buf = &self.input[self.pos..];
            if buf.len() < FrameHeader::LEN {
                return None;
            }
            if buf.starts_with(b"ID3") {
                if buf.len() < 10 {
                    return None;
                }
                if let Some(len) = id3v2_len(buf) {
                    tracing::debug!(len, "skipping ID3v2 tag");
                    self.skip = len;
                    self.synced = false;
                    confirm = true;
                    continue;
                }
            }

            if let Some(header) = FrameHeader::parse(buf) {
                let len = header.frame_len();
                if !confirm {
                    if buf.len() < len {
                        return None;
                    }
                    return Some(header);
                }
                if self.input_ended && self.announced && buf.len() == len {
                    return Some(header);
                }
                if buf.len() < len + FrameHeader::LEN {
                    return None;
                }
                if FrameHeader::parse(&buf[len..]).is_some_and(|next| header.is_compatible(&next))
                {
                    return Some(header);
                }
            }

            let step = buf[1..]
                .iter()
                .position(|&b| b == 0xFF || b == b'I')
                .map_or(buf.len(), |i| i + 1);
            self.pos += step;
            self.stats.bytes_dropped += step as u64;
            if self.synced {
                self.note_damage("lost frame sync");
            }
            self.synced = false;
            confirm = true;
        }
    }

    fn decode_frame(&mut self, header: FrameHeader) {
        let start = self.pos;
        let end = start + header.frame_len();
        self.pos = end;
        self.synced = true;

        let Some(reference) = self.reference else {
            return;
        };
        if !reference.is_compatible(&header) {
            self.stats.frames_skipped += 1;
            tracing::warn!(%header, "skipping frame with a different format");
            return;
        }

        let frame = &self.input[start..end];
        if self.expect_info {
            self.expect_info = false;
            if let Some(tag) = InfoTag::parse(frame, &header) {
                if self.params.gapless {
                    self.trim = GaplessTrim::from_tag(&tag, header.samples_per_frame());
                }
                tracing::debug!(?tag, gapless = self.trim.is_active(), "found Info frame");
                return;
            }
        }

        let Some(codec) = self.codec.as_mut() else {
            return;
        };
        self.scratch.clear();
        let result = decode_packet(
            codec.as_mut(),
            &mut self.sample_buf,
            frame,
            header.samples_per_frame() as u64,
            &mut self.scratch,
        );
        match result {
            Ok(()) => {
                self.stats.frames_decoded += 1;
                self.trim
                    .apply(&mut self.scratch, reference.channels() as usize);
                self.pending.extend(self.scratch.iter().copied());
            }
            Err(err) => {
                self.stats.frames_skipped += 1;
                self.note_damage(&format!("skipping undecodable frame: {err}"));
            }
        }
    }

    fn note_damage(&self, message: &str) {
        if self.params.quiet {
            tracing::trace!("{message}");
        } else {
            tracing::warn!("{message}");
        }
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        tracing::trace!(
            frames = self.stats.frames_decoded,
            skipped = self.stats.frames_skipped,
            dropped_bytes = self.stats.bytes_dropped,
            "decoder session destroyed"
        );
    }
}

fn codec_type(layer: Layer) -> CodecType {
    match layer {
        Layer::I => CODEC_TYPE_MP1,
        Layer::II => CODEC_TYPE_MP2,
        Layer::III => CODEC_TYPE_MP3,
    }
}

fn make_codec(header: &FrameHeader) -> Result<Box<dyn Decoder>, DecodeError> {
    let layout = match header.channels() {
        1 => Channels::FRONT_CENTRE,
        _ => Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
    };
    let mut codec_params = CodecParameters::new();
    codec_params
        .for_codec(codec_type(header.layer))
        .with_sample_rate(header.sample_rate)
        .with_channels(layout);

    symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|err| DecodeError::Codec(err.to_string()))
}

fn decode_packet(
    codec: &mut dyn Decoder,
    sample_buf: &mut Option<SampleBuffer<i16>>,
    frame: &[u8],
    duration: u64,
    out: &mut Vec<i16>,
) -> Result<(), symphonia::core::errors::Error> {
    let packet = Packet::new_from_slice(0, 0, duration, frame);
    let decoded = codec.decode(&packet)?;
    let spec = *decoded.spec();
    let needed = decoded.frames() * spec.channels.count();

    if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
        *sample_buf = Some(SampleBuffer::<i16>::new(decoded.capacity() as u64, spec));
    }
    if let Some(buf) = sample_buf.as_mut() {
        buf.copy_interleaved_ref(decoded);
        out.extend_from_slice(buf.samples());
    }
    Ok(())
}
