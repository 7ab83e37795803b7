use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use mpafeed_audio::{AudioSink, ByteSource, FileOpener, SourceOpener};
use mpafeed_mpeg::{
    probe_format, DecodeEngine, DecoderParams, DecoderSession, EngineOutcome, PlaybackError,
    StopToken,
};
use mpafeed_player::{PlaybackController, PlaybackHandle};

use crate::plugin::{
    title_from_location, InputPlugin, PluginError, PluginInfo, PluginResult, TrackInfo,
};

pub const MPEG_EXTENSIONS: &[&str] = &["mp3", "mp2", "mp1", "bmu"];

/// MPEG 1/2/2.5 audio, layers I to III, decoded through feed sessions.
pub struct MpegInputPlugin {
    opener: Arc<dyn SourceOpener>,
    controller: PlaybackController,
    params: DecoderParams,
    initialized: AtomicBool,
}

impl std::fmt::Debug for MpegInputPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpegInputPlugin")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl Default for MpegInputPlugin {
    fn default() -> Self {
        Self::new(Arc::new(FileOpener))
    }
}

impl MpegInputPlugin {
    pub fn new(opener: Arc<dyn SourceOpener>) -> Self {
        let params = DecoderParams::fixed();
        Self {
            controller: PlaybackController::with_params(opener.clone(), params.clone()),
            opener,
            params,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> PluginResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(PluginError::NotInitialized(self.info().id))
        }
    }
}

impl InputPlugin for MpegInputPlugin {
    fn info(&self) -> PluginInfo {
        PluginInfo {
            id: "mpeg".into(),
            name: "MPEG audio".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }

    fn description(&self) -> &str {
        "MPEG 1/2/2.5 audio layers I, II and III"
    }

    fn extensions(&self) -> &[&'static str] {
        MPEG_EXTENSIONS
    }

    fn init(&self) -> PluginResult<()> {
        // A throwaway session proves the codec registry carries MPEG audio.
        DecoderSession::new(&self.params).map_err(|err| PluginError::Init(err.to_string()))?;
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("mpeg input plugin initialized");
        }
        Ok(())
    }

    fn cleanup(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            tracing::debug!("mpeg input plugin cleaned up");
        }
    }

    fn about(&self) -> String {
        format!(
            "MPEG audio input {}\nDecodes MPEG 1, 2 and 2.5 audio (layers I, II and III) \
             with the symphonia codecs.",
            env!("CARGO_PKG_VERSION")
        )
    }

    fn is_our_file(&self, location: &str) -> bool {
        match self.opener.open(location) {
            Ok(mut source) => self.probe(&mut *source),
            Err(err) => {
                tracing::debug!(location, "cannot open for probing: {err}");
                false
            }
        }
    }

    fn probe(&self, source: &mut dyn ByteSource) -> bool {
        mpafeed_mpeg::probe(source)
    }

    fn probe_for_info(&self, location: &str) -> Option<TrackInfo> {
        let mut source = match self.opener.open(location) {
            Ok(source) => source,
            Err(err) => {
                tracing::debug!(location, "cannot open for track info: {err}");
                return None;
            }
        };
        let format = match probe_format(&mut *source, &self.params) {
            Ok(format) => format,
            Err(err) => {
                tracing::debug!(location, "no track info: {err}");
                return None;
            }
        };
        Some(TrackInfo {
            location: location.to_string(),
            title: title_from_location(location),
            format,
        })
    }

    fn play(&self, location: &str, sink: Box<dyn AudioSink>) -> PluginResult<PlaybackHandle> {
        self.ensure_initialized()?;
        Ok(self.controller.start(location, sink)?)
    }

    fn play_blocking(
        &self,
        location: &str,
        sink: Box<dyn AudioSink>,
        stop: StopToken,
    ) -> PluginResult<EngineOutcome> {
        self.ensure_initialized()?;
        let source = match self.opener.open(location) {
            Ok(source) => source,
            Err(err) => return Ok(EngineOutcome::NotStarted(PlaybackError::SourceOpen(err))),
        };
        Ok(DecodeEngine::with_params(source, sink, stop, self.params.clone())
            .run(|format| tracing::info!(location, %format, "playing")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpafeed_audio::{MemoryOpener, MemorySink, MemorySource, StreamFormat};
    use mpafeed_mpeg::testing::silent_stream;

    fn plugin() -> MpegInputPlugin {
        let opener = MemoryOpener::new();
        opener.insert("/music/Quiet Song.mp3", silent_stream(44_100, 2, 20));
        opener.insert("/music/noise.mp3", vec![0u8; 16_384]);
        MpegInputPlugin::new(Arc::new(opener))
    }

    #[test]
    fn advertises_mpeg_extensions() {
        let plugin = plugin();
        assert_eq!(plugin.extensions(), &["mp3", "mp2", "mp1", "bmu"]);
        assert_eq!(plugin.info().id, "mpeg");
        assert!(plugin.about().contains("MPEG"));
    }

    #[test]
    fn init_and_cleanup_toggle_state() {
        let plugin = plugin();
        assert!(!plugin.is_initialized());
        plugin.init().unwrap();
        plugin.init().unwrap();
        assert!(plugin.is_initialized());
        plugin.cleanup();
        assert!(!plugin.is_initialized());
    }

    #[test]
    fn recognizes_only_decodable_locations() {
        let plugin = plugin();
        assert!(plugin.is_our_file("/music/Quiet Song.mp3"));
        assert!(!plugin.is_our_file("/music/noise.mp3"));
        assert!(!plugin.is_our_file("/music/missing.mp3"));

        let mut source = MemorySource::new(silent_stream(32_000, 1, 4));
        assert!(plugin.probe(&mut source));
    }

    #[test]
    fn probe_for_info_uses_file_name() {
        let info = plugin().probe_for_info("/music/Quiet Song.mp3").unwrap();
        assert_eq!(info.title, "Quiet Song");
        assert_eq!(info.format, StreamFormat::s16(44_100, 2));
        assert_eq!(plugin().probe_for_info("/music/noise.mp3"), None);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn track_info_failures_are_logged_by_class() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let plugin = plugin();
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(plugin.probe_for_info("/music/missing.mp3"), None);
            assert_eq!(plugin.probe_for_info("/music/noise.mp3"), None);
        });

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("cannot open for track info"));
        assert!(text.contains("no track info"));
        assert!(text.contains("/music/noise.mp3"));
    }

    #[test]
    fn playback_requires_init() {
        let plugin = plugin();
        let err = plugin
            .play("/music/Quiet Song.mp3", Box::new(MemorySink::new()))
            .unwrap_err();
        assert!(matches!(err, PluginError::NotInitialized(_)));
    }

    #[test]
    fn play_then_stop() {
        let plugin = plugin();
        plugin.init().unwrap();
        let sink = MemorySink::new();
        let log = sink.log();
        let handle = plugin.play("/music/Quiet Song.mp3", Box::new(sink)).unwrap();
        let outcome = plugin.stop(handle).unwrap();
        assert!(outcome.reached_playing());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[test]
    fn play_blocking_runs_to_completion() {
        let plugin = plugin();
        plugin.init().unwrap();
        let sink = MemorySink::new();
        let log = sink.log();
        let outcome = plugin
            .play_blocking("/music/Quiet Song.mp3", Box::new(sink), StopToken::new())
            .unwrap();
        assert!(matches!(outcome, EngineOutcome::Completed(_)));
        assert_eq!(log.lock().unwrap().samples.len(), 20 * 1152 * 2);

        let missing = plugin
            .play_blocking("/music/missing.mp3", Box::new(MemorySink::new()), StopToken::new())
            .unwrap();
        assert!(!missing.reached_playing());
    }
}
