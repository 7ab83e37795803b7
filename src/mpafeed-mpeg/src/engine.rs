//! The streaming decode loop run on a playback thread.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use mpafeed_audio::{read_block, AudioSink, ByteSource, SinkError, StreamFormat};

use crate::error::PlaybackError;
use crate::params::DecoderParams;
use crate::probe::resolve_format;
use crate::session::{DecodeStatus, DecoderSession};
use crate::{BLOCK_SIZE, PCM_BLOCK_SAMPLES};

/// Cooperative stop flag shared between a controller and an engine thread.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What reached the sink during playback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub blocks: u64,
    pub non_empty_blocks: u64,
    pub samples: u64,
}

impl PlaybackStats {
    fn record(&mut self, produced: usize) {
        self.blocks += 1;
        if produced > 0 {
            self.non_empty_blocks += 1;
        }
        self.samples += produced as u64;
    }
}

/// How a run of [`DecodeEngine`] ended.
#[derive(Debug)]
pub enum EngineOutcome {
    /// Playback never began; nothing was output.
    NotStarted(PlaybackError),
    /// The stream ended and everything decoded was written.
    Completed(PlaybackStats),
    /// A stop was requested.
    Stopped(PlaybackStats),
    /// Playback began but a read, decode or sink write failed.
    Failed {
        stats: PlaybackStats,
        error: PlaybackError,
    },
}

impl EngineOutcome {
    pub fn reached_playing(&self) -> bool {
        !matches!(self, EngineOutcome::NotStarted(_))
    }

    pub fn stats(&self) -> PlaybackStats {
        match self {
            EngineOutcome::NotStarted(_) => PlaybackStats::default(),
            EngineOutcome::Completed(stats) | EngineOutcome::Stopped(stats) => *stats,
            EngineOutcome::Failed { stats, .. } => *stats,
        }
    }

    pub fn error(&self) -> Option<&PlaybackError> {
        match self {
            EngineOutcome::NotStarted(error) | EngineOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// An opened sink; closing it is tied to scope.
struct OpenOutput {
    sink: Box<dyn AudioSink>,
}

impl OpenOutput {
    fn open(mut sink: Box<dyn AudioSink>, format: &StreamFormat) -> Result<Self, SinkError> {
        sink.open(format)?;
        Ok(Self { sink })
    }

    fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
        self.sink.write(block)
    }
}

impl Drop for OpenOutput {
    fn drop(&mut self) {
        self.sink.close();
        tracing::trace!("audio output closed");
    }
}

/// Decodes one stream from `source` into `sink` until it ends or `stop` is
/// requested.
pub struct DecodeEngine {
    source: Box<dyn ByteSource>,
    sink: Box<dyn AudioSink>,
    stop: StopToken,
    params: DecoderParams,
}

impl DecodeEngine {
    pub fn new(source: Box<dyn ByteSource>, sink: Box<dyn AudioSink>, stop: StopToken) -> Self {
        Self::with_params(source, sink, stop, DecoderParams::fixed())
    }

    pub fn with_params(
        source: Box<dyn ByteSource>,
        sink: Box<dyn AudioSink>,
        stop: StopToken,
        params: DecoderParams,
    ) -> Self {
        Self {
            source,
            sink,
            stop,
            params,
        }
    }

    /// Runs to completion on the calling thread.
    ///
    /// `on_ready` is called once, after the sink accepted the format and
    /// before the first block is written. The sink is closed, the session
    /// destroyed and the source closed, in that order, before returning.
    pub fn run<F>(self, on_ready: F) -> EngineOutcome
    where
        F: FnOnce(&StreamFormat),
    {
        let DecodeEngine {
            mut source,
            sink,
            stop,
            params,
        } = self;
        let outcome = play(&mut source, sink, &stop, &params, on_ready);
        drop(source);
        tracing::trace!("byte source closed");
        outcome
    }
}

fn play<F>(
    source: &mut Box<dyn ByteSource>,
    sink: Box<dyn AudioSink>,
    stop: &StopToken,
    params: &DecoderParams,
    on_ready: F,
) -> EngineOutcome
where
    F: FnOnce(&StreamFormat),
{
    let mut session = match DecoderSession::new(params) {
        Ok(session) => session,
        Err(err) => return EngineOutcome::NotStarted(PlaybackError::SessionCreate(err)),
    };
    if let Err(err) = session.open_feed() {
        return EngineOutcome::NotStarted(PlaybackError::OpenFeed(err));
    }

    let format = match resolve_format(source, &mut session) {
        Ok(format) => format,
        Err(err) => {
            tracing::debug!("no playable stream: {err}");
            return EngineOutcome::NotStarted(err);
        }
    };

    let mut output = match OpenOutput::open(sink, &format) {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!(%format, "audio output refused the stream: {err}");
            return EngineOutcome::NotStarted(PlaybackError::SinkOpen(err));
        }
    };

    let mut status = match source.seek(0) {
        Ok(()) => {
            session.discard_input();
            DecodeStatus::NeedMore
        }
        Err(err) => {
            tracing::warn!("rewind failed, continuing from buffered input: {err}");
            DecodeStatus::NewFormat
        }
    };

    tracing::info!(%format, "playback started");
    on_ready(&format);

    let mut input = vec![0u8; BLOCK_SIZE];
    let mut pcm = vec![0i16; PCM_BLOCK_SAMPLES];
    let mut stats = PlaybackStats::default();

    while !stop.is_requested() {
        loop {
            let fed = if status == DecodeStatus::NeedMore {
                match read_block(source, &mut input) {
                    Ok(0) => return finish(&mut session, &mut output, &mut pcm, stats),
                    Ok(n) => n,
                    Err(err) => {
                        tracing::warn!("read failed during playback: {err}");
                        return EngineOutcome::Failed {
                            stats,
                            error: PlaybackError::Read(err),
                        };
                    }
                }
            } else {
                0
            };

            let decoded = match session.decode(&input[..fed], Some(&mut pcm)) {
                Ok(decoded) => decoded,
                Err(err) => {
                    return EngineOutcome::Failed {
                        stats,
                        error: PlaybackError::Decode(err),
                    }
                }
            };
            if let Err(err) = output.write(&pcm[..decoded.produced]) {
                tracing::warn!("audio output failed: {err}");
                return EngineOutcome::Failed {
                    stats,
                    error: PlaybackError::SinkWrite(err),
                };
            }
            stats.record(decoded.produced);

            status = decoded.status;
            if status != DecodeStatus::NeedMore {
                break;
            }
        }
    }

    tracing::info!(blocks = stats.blocks, samples = stats.samples, "playback stopped");
    EngineOutcome::Stopped(stats)
}

/// Drains whatever the session still holds after end of stream.
fn finish(
    session: &mut DecoderSession,
    output: &mut OpenOutput,
    pcm: &mut [i16],
    mut stats: PlaybackStats,
) -> EngineOutcome {
    session.end_of_input();
    loop {
        let decoded = match session.decode(&[], Some(pcm)) {
            Ok(decoded) => decoded,
            Err(err) => {
                return EngineOutcome::Failed {
                    stats,
                    error: PlaybackError::Decode(err),
                }
            }
        };
        if let Err(err) = output.write(&pcm[..decoded.produced]) {
            return EngineOutcome::Failed {
                stats,
                error: PlaybackError::SinkWrite(err),
            };
        }
        stats.record(decoded.produced);
        if decoded.status != DecodeStatus::Ready {
            break;
        }
    }
    tracing::info!(
        blocks = stats.blocks,
        samples = stats.samples,
        "playback completed"
    );
    EngineOutcome::Completed(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Unresolved;
    use crate::testing::{garbage, silent_stream};
    use mpafeed_audio::{MemorySink, MemorySource};
    use std::io;
    use std::sync::Mutex;

    type Events = Arc<Mutex<Vec<&'static str>>>;

    /// Wraps a memory source, failing reads past `fail_at` and recording
    /// when it is dropped.
    struct TracedSource {
        inner: MemorySource,
        fail_at: Option<u64>,
        events: Events,
    }

    impl TracedSource {
        fn new(bytes: Vec<u8>, events: &Events) -> Self {
            Self {
                inner: MemorySource::new(bytes),
                fail_at: None,
                events: events.clone(),
            }
        }
    }

    impl ByteSource for TracedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(limit) = self.fail_at {
                let pos = self.inner.position();
                if pos >= limit {
                    return Err(io::Error::new(io::ErrorKind::Other, "medium removed"));
                }
                let allowed = ((limit - pos) as usize).min(buf.len());
                return self.inner.read(&mut buf[..allowed]);
            }
            self.inner.read(buf)
        }

        fn seek(&mut self, offset: u64) -> io::Result<()> {
            self.inner.seek(offset)
        }
    }

    impl Drop for TracedSource {
        fn drop(&mut self) {
            self.events.lock().unwrap().push("source dropped");
        }
    }

    /// Records writes and closes, and can request a stop after a number of
    /// writes.
    struct TracedSink {
        inner: MemorySink,
        events: Events,
        stop_after: Option<(usize, StopToken)>,
        writes: usize,
    }

    impl TracedSink {
        fn new(inner: MemorySink, events: &Events) -> Self {
            Self {
                inner,
                events: events.clone(),
                stop_after: None,
                writes: 0,
            }
        }
    }

    impl AudioSink for TracedSink {
        fn open(&mut self, format: &StreamFormat) -> Result<(), SinkError> {
            self.inner.open(format)
        }

        fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
            self.writes += 1;
            if let Some((limit, stop)) = &self.stop_after {
                if self.writes == *limit {
                    stop.request();
                }
            }
            self.inner.write(block)
        }

        fn close(&mut self) {
            self.events.lock().unwrap().push("sink closed");
            self.inner.close();
        }
    }

    fn run_memory(bytes: Vec<u8>, sink: MemorySink) -> EngineOutcome {
        DecodeEngine::new(
            Box::new(MemorySource::new(bytes)),
            Box::new(sink),
            StopToken::new(),
        )
        .run(|_| {})
    }

    #[test]
    fn stop_token_is_shared_between_clones() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(!clone.is_requested());
        token.request();
        assert!(clone.is_requested());
    }

    #[test]
    fn plays_stream_to_completion() {
        let sink = MemorySink::new();
        let log = sink.log();
        let mut ready = Vec::new();
        let outcome = DecodeEngine::new(
            Box::new(MemorySource::new(silent_stream(44_100, 2, 40))),
            Box::new(sink),
            StopToken::new(),
        )
        .run(|format| ready.push(*format));

        assert_eq!(ready, vec![StreamFormat::s16(44_100, 2)]);
        let stats = match outcome {
            EngineOutcome::Completed(stats) => stats,
            other => panic!("unexpected outcome {other:?}"),
        };
        let log = log.lock().unwrap();
        assert_eq!(log.opened, vec![StreamFormat::s16(44_100, 2)]);
        assert_eq!(log.closes, 1);
        assert!(!log.is_open);
        assert_eq!(stats.samples, log.samples.len() as u64);
        assert_eq!(stats.samples, 40 * 1152 * 2);
        assert!(log.block_sizes.iter().all(|&n| n <= PCM_BLOCK_SAMPLES));
    }

    #[test]
    fn resolved_prefix_is_decoded_once() {
        // Shorter than one read block, so phase A buffers the whole stream.
        let sink = MemorySink::new();
        let log = sink.log();
        let outcome = run_memory(silent_stream(48_000, 1, 5), sink);
        assert!(matches!(outcome, EngineOutcome::Completed(_)));
        assert_eq!(log.lock().unwrap().samples.len(), 5 * 1152);
    }

    #[test]
    fn garbage_never_reaches_the_sink() {
        let sink = MemorySink::new();
        let log = sink.log();
        let outcome = run_memory(garbage(40_000, 3), sink);
        assert!(!outcome.reached_playing());
        assert!(matches!(
            outcome,
            EngineOutcome::NotStarted(PlaybackError::FormatUnresolved(Unresolved::EndOfStream))
        ));
        let log = log.lock().unwrap();
        assert!(log.opened.is_empty());
        assert_eq!(log.closes, 0);
    }

    #[test]
    fn declined_format_does_not_start() {
        let sink = MemorySink::declining();
        let log = sink.log();
        let outcome = run_memory(silent_stream(44_100, 2, 10), sink);
        assert!(matches!(
            outcome,
            EngineOutcome::NotStarted(PlaybackError::SinkOpen(SinkError::Declined(_)))
        ));
        let log = log.lock().unwrap();
        assert_eq!(log.opened.len(), 1);
        assert!(log.block_sizes.is_empty());
        assert_eq!(log.closes, 0);
    }

    #[test]
    fn stop_request_ends_playback_early() {
        let events = Events::default();
        let stop = StopToken::new();
        let memory = MemorySink::new();
        let log = memory.log();
        let mut sink = TracedSink::new(memory, &events);
        sink.stop_after = Some((3, stop.clone()));

        let outcome = DecodeEngine::new(
            Box::new(TracedSource::new(silent_stream(44_100, 2, 400), &events)),
            Box::new(sink),
            stop,
        )
        .run(|_| {});

        let stats = match outcome {
            EngineOutcome::Stopped(stats) => stats,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert!(stats.samples < 400 * 1152 * 2);
        assert_eq!(log.lock().unwrap().closes, 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["sink closed", "source dropped"]
        );
    }

    #[test]
    fn stop_before_start_still_negotiates_and_releases() {
        let events = Events::default();
        let stop = StopToken::new();
        stop.request();
        let memory = MemorySink::new();
        let log = memory.log();

        let outcome = DecodeEngine::new(
            Box::new(TracedSource::new(silent_stream(44_100, 2, 10), &events)),
            Box::new(TracedSink::new(memory, &events)),
            stop,
        )
        .run(|_| {});

        assert!(matches!(outcome, EngineOutcome::Stopped(stats) if stats.blocks == 0));
        assert!(log.lock().unwrap().block_sizes.is_empty());
        assert_eq!(
            *events.lock().unwrap(),
            vec!["sink closed", "source dropped"]
        );
    }

    #[test]
    fn read_error_fails_without_flush() {
        let events = Events::default();
        let mut source = TracedSource::new(silent_stream(44_100, 2, 400), &events);
        source.fail_at = Some(3 * BLOCK_SIZE as u64 + 100);
        let memory = MemorySink::new();
        let log = memory.log();

        let outcome = DecodeEngine::new(
            Box::new(source),
            Box::new(TracedSink::new(memory, &events)),
            StopToken::new(),
        )
        .run(|_| {});

        match outcome {
            EngineOutcome::Failed {
                error: PlaybackError::Read(_),
                stats,
            } => assert!(stats.non_empty_blocks > 0),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(log.lock().unwrap().closes, 1);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["sink closed", "source dropped"]
        );
    }

    #[test]
    fn natural_end_releases_in_order() {
        let events = Events::default();
        let outcome = DecodeEngine::new(
            Box::new(TracedSource::new(silent_stream(32_000, 1, 8), &events)),
            Box::new(TracedSink::new(MemorySink::new(), &events)),
            StopToken::new(),
        )
        .run(|_| {});

        assert!(matches!(outcome, EngineOutcome::Completed(_)));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["sink closed", "source dropped"]
        );
    }

    /// A forward-only source: every seek fails.
    struct ForwardOnly(MemorySource);

    impl ByteSource for ForwardOnly {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }

        fn seek(&mut self, _offset: u64) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "pipe"))
        }
    }

    #[test]
    fn failed_rewind_keeps_buffered_input() {
        let sink = MemorySink::new();
        let log = sink.log();
        let outcome = DecodeEngine::new(
            Box::new(ForwardOnly(MemorySource::new(silent_stream(44_100, 2, 200)))),
            Box::new(sink),
            StopToken::new(),
        )
        .run(|_| {});

        assert!(matches!(outcome, EngineOutcome::Completed(_)));
        assert_eq!(outcome.stats().samples, 200 * 1152 * 2);
        assert_eq!(log.lock().unwrap().samples.len(), 200 * 1152 * 2);
    }

    #[test]
    fn frames_in_another_format_are_skipped() {
        let mut stream = silent_stream(44_100, 2, 20);
        stream.extend(silent_stream(48_000, 2, 20));
        stream.extend(silent_stream(44_100, 2, 20));

        let sink = MemorySink::new();
        let log = sink.log();
        let outcome = run_memory(stream, sink);

        assert!(matches!(outcome, EngineOutcome::Completed(_)));
        let log = log.lock().unwrap();
        assert_eq!(log.opened, vec![StreamFormat::s16(44_100, 2)]);
        assert_eq!(log.samples.len(), 40 * 1152 * 2);
    }

    #[test]
    fn trailing_frame_after_junk_is_played() {
        let mut stream = silent_stream(44_100, 2, 10);
        stream.extend_from_slice(&[0u8; 7]);
        stream.extend(silent_stream(44_100, 2, 1));

        let outcome = run_memory(stream, MemorySink::new());
        assert!(matches!(outcome, EngineOutcome::Completed(_)));
        assert_eq!(outcome.stats().samples, 11 * 1152 * 2);
    }

    #[test]
    fn megabyte_stream_plays_once_with_audio() {
        let stream = silent_stream(44_100, 2, 2_400);
        assert!(stream.len() > 1_000_000);

        let sink = MemorySink::new();
        let log = sink.log();
        let mut ready = 0;
        let outcome = DecodeEngine::new(
            Box::new(MemorySource::new(stream)),
            Box::new(sink),
            StopToken::new(),
        )
        .run(|_| ready += 1);

        assert_eq!(ready, 1);
        assert!(matches!(outcome, EngineOutcome::Completed(_)));
        let stats = outcome.stats();
        assert!(stats.non_empty_blocks > 1);
        assert_eq!(log.lock().unwrap().non_empty_blocks() as u64, stats.non_empty_blocks);
    }
}
