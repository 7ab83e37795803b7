use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mpafeed_audio::{AudioSink, NullSink, RawFileSink};
use mpafeed_core::{init_logging, AppDirs, Config, OutputBackend, OutputConfig};
use mpafeed_mpeg::EngineOutcome;
use mpafeed_plugin::PluginRegistry;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Parser)]
#[command(name = "mpafeed", version, about = "Feed-based MPEG audio decoder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether files hold decodable MPEG audio
    Probe(ProbeCommand),
    /// Decode a file into the configured audio output
    Play(PlayCommand),
    /// List registered input plugins
    Plugins,
}

#[derive(Debug, Parser, Clone)]
struct ProbeCommand {
    /// Files or file:// URLs
    #[arg(required = true)]
    paths: Vec<String>,
    /// Print one JSON array instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser, Clone)]
struct PlayCommand {
    /// File or file:// URL
    path: String,
    /// Output backend (overrides config)
    #[arg(long, value_enum)]
    output: Option<OutputArg>,
    /// Target file for raw output (overrides config)
    #[arg(long)]
    raw_path: Option<PathBuf>,
    /// Stop playback after this many seconds
    #[arg(long)]
    stop_after: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputArg {
    Null,
    Cpal,
    Raw,
}

impl From<OutputArg> for OutputBackend {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Null => OutputBackend::Null,
            OutputArg::Cpal => OutputBackend::Cpal,
            OutputArg::Raw => OutputBackend::Raw,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
enum OutputSelectionError {
    #[error("raw output requires --raw-path or output.raw_path in config.toml")]
    MissingRawPath,
    #[error("this build has no cpal support (enable the cpal-backend feature)")]
    CpalUnavailable,
    #[error("--stop-after must be a positive number of seconds")]
    InvalidStopAfter,
}

impl PlayCommand {
    /// Config output settings with command-line overrides applied.
    fn output(&self, config: &OutputConfig) -> OutputConfig {
        OutputConfig {
            backend: self.output.map(Into::into).unwrap_or(config.backend),
            raw_path: self.raw_path.clone().or_else(|| config.raw_path.clone()),
        }
    }

    fn stop_after(&self) -> Result<Option<Duration>, OutputSelectionError> {
        match self.stop_after {
            None => Ok(None),
            Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
            Some(_) => Err(OutputSelectionError::InvalidStopAfter),
        }
    }
}

fn make_sink(output: &OutputConfig) -> Result<Box<dyn AudioSink>, OutputSelectionError> {
    match output.backend {
        OutputBackend::Null => Ok(Box::new(NullSink::new())),
        OutputBackend::Raw => {
            let path = output
                .raw_path
                .as_ref()
                .ok_or(OutputSelectionError::MissingRawPath)?;
            Ok(Box::new(RawFileSink::new(path)))
        }
        #[cfg(feature = "cpal-backend")]
        OutputBackend::Cpal => Ok(Box::new(mpafeed_audio::CpalSink::new())),
        #[cfg(not(feature = "cpal-backend"))]
        OutputBackend::Cpal => Err(OutputSelectionError::CpalUnavailable),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ProbeReport {
    location: String,
    recognized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u16>,
}

impl ProbeReport {
    fn describe(&self) -> String {
        match (&self.plugin, self.sample_rate, self.channels) {
            (Some(plugin), Some(rate), Some(channels)) => {
                format!("{}: {plugin}, {rate} Hz, {channels} ch", self.location)
            }
            _ => format!("{}: not recognized", self.location),
        }
    }
}

fn probe_location(registry: &PluginRegistry, location: &str) -> ProbeReport {
    let found = registry.detect(location).and_then(|plugin| {
        let info = plugin.probe_for_info(location)?;
        Some((plugin.info().id, info))
    });
    match found {
        Some((plugin, info)) => ProbeReport {
            location: location.to_string(),
            recognized: true,
            plugin: Some(plugin),
            title: Some(info.title),
            sample_rate: Some(info.format.sample_rate),
            channels: Some(info.format.channels),
        },
        None => ProbeReport {
            location: location.to_string(),
            recognized: false,
            plugin: None,
            title: None,
            sample_rate: None,
            channels: None,
        },
    }
}

fn describe_outcome(outcome: &EngineOutcome) -> String {
    let stats = outcome.stats();
    match outcome {
        EngineOutcome::NotStarted(err) => format!("not played: {err}"),
        EngineOutcome::Completed(_) => format!(
            "completed: {} samples in {} blocks",
            stats.samples, stats.blocks
        ),
        EngineOutcome::Stopped(_) => format!(
            "stopped: {} samples in {} blocks",
            stats.samples, stats.blocks
        ),
        EngineOutcome::Failed { error, .. } => {
            format!("failed after {} samples: {error}", stats.samples)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dirs = AppDirs::discover()?;
    let config = Config::load_or_default(&dirs)?;
    let _logging = init_logging(&config.logging, &dirs)?;

    let registry = PluginRegistry::with_defaults();
    for (id, err) in registry.init_all() {
        tracing::warn!(plugin = %id, "plugin unavailable: {err}");
    }

    let result = match cli.command {
        Command::Probe(probe) => run_probe(&registry, &probe),
        Command::Play(play) => run_play(&registry, &config, &play),
        Command::Plugins => {
            print_plugins(&registry);
            Ok(())
        }
    };

    registry.cleanup_all();
    result
}

fn run_probe(registry: &PluginRegistry, probe: &ProbeCommand) -> Result<()> {
    let reports: Vec<ProbeReport> = probe
        .paths
        .iter()
        .map(|path| probe_location(registry, path))
        .collect();

    if probe.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", report.describe());
        }
    }
    Ok(())
}

fn run_play(registry: &PluginRegistry, config: &Config, play: &PlayCommand) -> Result<()> {
    let output = play.output(&config.output);
    let stop_after = play.stop_after()?;
    let sink = make_sink(&output)?;

    let plugin = registry
        .detect(&play.path)
        .with_context(|| format!("{} is not a recognized audio file", play.path))?;
    tracing::info!(
        location = %play.path,
        plugin = %plugin.info().id,
        output = output.backend.as_str(),
        "starting playback"
    );

    let handle = plugin.play(&play.path, sink)?;
    let outcome = match stop_after {
        Some(limit) => {
            let deadline = Instant::now() + limit;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }
            plugin.stop(handle)?
        }
        None => handle.wait()?,
    };

    println!("{}: {}", play.path, describe_outcome(&outcome));
    Ok(())
}

fn print_plugins(registry: &PluginRegistry) {
    if registry.plugins().is_empty() {
        println!("No input plugins registered.");
        return;
    }
    for plugin in registry.plugins() {
        let info = plugin.info();
        println!("{} {} ({})", info.id, info.version, info.name);
        println!("  {}", plugin.description());
        println!("  extensions: {}", plugin.extensions().join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpafeed_mpeg::testing::silent_stream;
    use mpafeed_mpeg::{PlaybackError, PlaybackStats, Unresolved};

    fn play(args: &[&str]) -> PlayCommand {
        let mut argv = vec!["mpafeed", "play"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Command::Play(play) => play,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_overrides_config_output() {
        let config = OutputConfig {
            backend: OutputBackend::Raw,
            raw_path: Some(PathBuf::from("/tmp/config.pcm")),
        };
        let cmd = play(&["a.mp3", "--output", "null"]);
        let output = cmd.output(&config);
        assert_eq!(output.backend, OutputBackend::Null);
        assert_eq!(output.raw_path, Some(PathBuf::from("/tmp/config.pcm")));

        let cmd = play(&["a.mp3", "--raw-path", "/tmp/cli.pcm"]);
        let output = cmd.output(&config);
        assert_eq!(output.backend, OutputBackend::Raw);
        assert_eq!(output.raw_path, Some(PathBuf::from("/tmp/cli.pcm")));
    }

    #[test]
    fn raw_output_needs_a_path() {
        let output = OutputConfig {
            backend: OutputBackend::Raw,
            raw_path: None,
        };
        assert_eq!(
            make_sink(&output).err(),
            Some(OutputSelectionError::MissingRawPath)
        );
        assert!(make_sink(&OutputConfig::default()).is_ok());
    }

    #[test]
    fn stop_after_must_be_positive() {
        assert_eq!(play(&["a.mp3"]).stop_after(), Ok(None));
        assert_eq!(
            play(&["a.mp3", "--stop-after", "1.5"]).stop_after(),
            Ok(Some(Duration::from_millis(1500)))
        );
        assert_eq!(
            play(&["a.mp3", "--stop-after", "0"]).stop_after(),
            Err(OutputSelectionError::InvalidStopAfter)
        );
    }

    #[test]
    fn probe_reports_recognized_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("Track One.mp3");
        std::fs::write(&good, silent_stream(44_100, 2, 10)).unwrap();
        let registry = PluginRegistry::with_defaults();

        let report = probe_location(&registry, good.to_str().unwrap());
        assert!(report.recognized);
        assert_eq!(report.plugin.as_deref(), Some("mpeg"));
        assert_eq!(report.title.as_deref(), Some("Track One"));
        assert!(report.describe().ends_with("mpeg, 44100 Hz, 2 ch"));

        let missing = probe_location(&registry, "/definitely/not/here.mp3");
        assert!(!missing.recognized);
        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "location": "/definitely/not/here.mp3",
                "recognized": false
            })
        );
    }

    #[test]
    fn outcome_descriptions() {
        let stats = PlaybackStats {
            blocks: 3,
            non_empty_blocks: 2,
            samples: 9000,
        };
        assert_eq!(
            describe_outcome(&EngineOutcome::Completed(stats)),
            "completed: 9000 samples in 3 blocks"
        );
        let not_started =
            EngineOutcome::NotStarted(PlaybackError::FormatUnresolved(Unresolved::EndOfStream));
        assert!(describe_outcome(&not_started).starts_with("not played"));
    }
}
