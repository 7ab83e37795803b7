use std::{
    io,
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};

use mpafeed_audio::{AudioSink, SourceOpener, StreamFormat};
use mpafeed_mpeg::{DecodeEngine, DecoderParams, EngineOutcome, PlaybackError, StopToken};
use thiserror::Error;

use crate::state::PlaybackState;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to spawn playback thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("playback thread panicked")]
    Panicked,
}

#[derive(Debug, Default)]
struct Shared {
    state: PlaybackState,
    format: Option<StreamFormat>,
    reached_playing: bool,
}

impl Shared {
    fn advance(&mut self, next: PlaybackState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        tracing::trace!(from = %self.state, to = %next, "playback state");
        self.state = next;
        true
    }
}

/// Starts playbacks of locations resolved through a [`SourceOpener`].
#[derive(Clone)]
pub struct PlaybackController {
    opener: Arc<dyn SourceOpener>,
    params: DecoderParams,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl PlaybackController {
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        Self::with_params(opener, DecoderParams::fixed())
    }

    pub fn with_params(opener: Arc<dyn SourceOpener>, params: DecoderParams) -> Self {
        Self { opener, params }
    }

    /// Spawns an engine thread playing `location` into `sink`.
    ///
    /// Opening the stream happens on that thread; a location that cannot be
    /// opened or decoded ends as [`EngineOutcome::NotStarted`] without ever
    /// reaching [`PlaybackState::Playing`].
    pub fn start(
        &self,
        location: &str,
        sink: Box<dyn AudioSink>,
    ) -> Result<PlaybackHandle, ControllerError> {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let stop = StopToken::new();

        let opener = self.opener.clone();
        let params = self.params.clone();
        let thread_shared = shared.clone();
        let thread_stop = stop.clone();
        let thread_location = location.to_string();

        let join = thread::Builder::new()
            .name("mpafeed-playback".into())
            .spawn(move || {
                let outcome = run_engine(
                    &*opener,
                    &thread_location,
                    sink,
                    thread_stop,
                    params,
                    &thread_shared,
                );
                thread_shared
                    .lock()
                    .unwrap()
                    .advance(PlaybackState::Terminated);
                match &outcome {
                    EngineOutcome::NotStarted(err) => {
                        tracing::debug!(location = %thread_location, "playback not started: {err}")
                    }
                    EngineOutcome::Failed { error, .. } => {
                        tracing::warn!(location = %thread_location, "playback failed: {error}")
                    }
                    _ => {}
                }
                outcome
            })
            .map_err(ControllerError::Spawn)?;

        tracing::debug!(location, "playback thread started");
        Ok(PlaybackHandle {
            location: location.to_string(),
            shared,
            stop,
            join: Some(join),
        })
    }
}

fn run_engine(
    opener: &dyn SourceOpener,
    location: &str,
    sink: Box<dyn AudioSink>,
    stop: StopToken,
    params: DecoderParams,
    shared: &Mutex<Shared>,
) -> EngineOutcome {
    shared.lock().unwrap().advance(PlaybackState::Negotiating);
    let source = match opener.open(location) {
        Ok(source) => source,
        Err(err) => return EngineOutcome::NotStarted(PlaybackError::SourceOpen(err)),
    };
    DecodeEngine::with_params(source, sink, stop, params).run(|format| {
        let mut shared = shared.lock().unwrap();
        shared.format = Some(*format);
        shared.reached_playing = true;
        shared.advance(PlaybackState::Playing);
    })
}

/// One in-flight playback.
///
/// Dropping a handle that is still running requests a stop and joins the
/// engine thread.
pub struct PlaybackHandle {
    location: String,
    shared: Arc<Mutex<Shared>>,
    stop: StopToken,
    join: Option<JoinHandle<EngineOutcome>>,
}

impl std::fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("location", &self.location)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PlaybackHandle {
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.lock().unwrap().state
    }

    /// The negotiated format, once playback reached `Playing`.
    pub fn format(&self) -> Option<StreamFormat> {
        self.shared.lock().unwrap().format
    }

    pub fn reached_playing(&self) -> bool {
        self.shared.lock().unwrap().reached_playing
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Asks the engine to stop, then waits for it to release everything.
    ///
    /// Waits without a timeout; the engine notices the request after at most
    /// one more decode pass.
    pub fn request_stop(mut self) -> Result<EngineOutcome, ControllerError> {
        if self.shared.lock().unwrap().advance(PlaybackState::Stopping) {
            tracing::debug!(location = %self.location, "stopping playback");
        }
        self.stop.request();
        self.join()
    }

    /// Waits for playback to end on its own.
    pub fn wait(mut self) -> Result<EngineOutcome, ControllerError> {
        self.join()
    }

    fn join(&mut self) -> Result<EngineOutcome, ControllerError> {
        let join = self.join.take().ok_or(ControllerError::Panicked)?;
        join.join().map_err(|_| ControllerError::Panicked)
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            self.shared.lock().unwrap().advance(PlaybackState::Stopping);
            self.stop.request();
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpafeed_audio::{MemoryOpener, MemorySink, SinkError};
    use mpafeed_mpeg::testing::silent_stream;
    use std::time::{Duration, Instant};

    fn controller_with(entries: &[(&str, Vec<u8>)]) -> PlaybackController {
        let opener = MemoryOpener::new();
        for (name, bytes) in entries {
            opener.insert(*name, bytes.clone());
        }
        PlaybackController::new(Arc::new(opener))
    }

    /// Sleeps on every write so a stop request can land mid-stream.
    struct SlowSink {
        inner: MemorySink,
        delay: Duration,
    }

    impl AudioSink for SlowSink {
        fn open(&mut self, format: &StreamFormat) -> Result<(), SinkError> {
            self.inner.open(format)
        }

        fn write(&mut self, block: &[i16]) -> Result<(), SinkError> {
            thread::sleep(self.delay);
            self.inner.write(block)
        }

        fn close(&mut self) {
            self.inner.close();
        }
    }

    fn wait_for(handle: &PlaybackHandle, state: PlaybackState) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while handle.state() != state {
            assert!(Instant::now() < deadline, "never reached {state}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn natural_end_terminates() {
        let controller = controller_with(&[("a.mp3", silent_stream(44_100, 2, 30))]);
        let sink = MemorySink::new();
        let log = sink.log();
        let handle = controller.start("a.mp3", Box::new(sink)).unwrap();

        wait_for(&handle, PlaybackState::Terminated);
        assert!(handle.reached_playing());
        assert_eq!(handle.format(), Some(StreamFormat::s16(44_100, 2)));
        let deadline = Instant::now() + Duration::from_secs(10);
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "engine thread never exited");
            thread::sleep(Duration::from_millis(5));
        }

        let outcome = handle.wait().unwrap();
        assert!(matches!(outcome, EngineOutcome::Completed(_)));
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn stop_after_playing_terminates_and_releases() {
        let controller = controller_with(&[("long.mp3", silent_stream(44_100, 2, 2_000))]);
        let memory = MemorySink::new();
        let log = memory.log();
        let sink = SlowSink {
            inner: memory,
            delay: Duration::from_millis(5),
        };
        let handle = controller.start("long.mp3", Box::new(sink)).unwrap();
        wait_for(&handle, PlaybackState::Playing);

        let outcome = handle.request_stop().unwrap();
        assert!(matches!(outcome, EngineOutcome::Stopped(_)));
        let log = log.lock().unwrap();
        assert_eq!(log.closes, 1);
        assert!(!log.is_open);
    }

    #[test]
    fn missing_location_never_plays() {
        let controller = controller_with(&[]);
        let sink = MemorySink::new();
        let log = sink.log();
        let handle = controller.start("nowhere.mp3", Box::new(sink)).unwrap();

        let outcome = handle.wait().unwrap();
        assert!(matches!(
            outcome,
            EngineOutcome::NotStarted(PlaybackError::SourceOpen(_))
        ));
        assert!(log.lock().unwrap().opened.is_empty());
    }

    #[test]
    fn undecodable_stream_terminates_without_playing() {
        let controller = controller_with(&[("zero.mp3", vec![0u8; 16_384])]);
        let handle = controller
            .start("zero.mp3", Box::new(MemorySink::new()))
            .unwrap();
        wait_for(&handle, PlaybackState::Terminated);
        assert!(!handle.reached_playing());
        assert_eq!(handle.format(), None);
        assert!(!handle.wait().unwrap().reached_playing());
    }

    #[test]
    fn stop_after_natural_end_returns_completion() {
        let controller = controller_with(&[("short.mp3", silent_stream(44_100, 1, 5))]);
        let handle = controller
            .start("short.mp3", Box::new(MemorySink::new()))
            .unwrap();
        wait_for(&handle, PlaybackState::Terminated);

        let outcome = handle.request_stop().unwrap();
        assert!(matches!(outcome, EngineOutcome::Completed(_)));
    }

    #[test]
    fn dropping_a_live_handle_stops_it() {
        let controller = controller_with(&[("long.mp3", silent_stream(44_100, 2, 2_000))]);
        let memory = MemorySink::new();
        let log = memory.log();
        let sink = SlowSink {
            inner: memory,
            delay: Duration::from_millis(5),
        };
        let handle = controller.start("long.mp3", Box::new(sink)).unwrap();
        wait_for(&handle, PlaybackState::Playing);
        drop(handle);

        assert_eq!(log.lock().unwrap().closes, 1);
    }
}
