use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use facematch::config::{self, Config};
use facematch::source::{open_source, SourceSpec};
use facematch::{aggregate, decide, reference, Embedding, Error, Metric, Pipeline};
use log::info;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "facematch")]
#[command(
    version,
    about = "Extract face descriptors from videos and match them against a stored descriptor"
)]
struct Cli {
    /// Config file (defaults to the system config path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Process every Nth frame
    #[arg(long, global = true)]
    interval: Option<usize>,

    /// Maximum distance counted as a match
    #[arg(long, global = true)]
    tolerance: Option<f32>,

    /// Distance metric: euclidean or cosine
    #[arg(long, global = true, value_parser = parse_metric)]
    metric: Option<Metric>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every face descriptor found in a video
    Generate {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Check whether any face in a video matches a stored descriptor
    #[command(allow_missing_positional = true)]
    Compare {
        /// Stored descriptor as a JSON array of numbers
        #[arg(value_name = "REFERENCE_JSON", required_unless_present = "reference_file")]
        reference: Option<String>,

        /// Read the stored descriptor from a file instead
        #[arg(long, conflicts_with = "reference")]
        reference_file: Option<PathBuf>,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct SourceArgs {
    /// Video file, or V4L2 device with --camera
    video: PathBuf,

    /// Treat the source as a camera device
    #[arg(long)]
    camera: bool,

    /// Frames to capture from a camera
    #[arg(long, default_value_t = 300)]
    max_frames: usize,
}

impl SourceArgs {
    fn spec(&self) -> SourceSpec {
        if self.camera {
            SourceSpec::Camera {
                device: self.video.to_string_lossy().into_owned(),
                max_frames: self.max_frames,
            }
        } else {
            SourceSpec::File(self.video.clone())
        }
    }
}

fn parse_metric(s: &str) -> Result<Metric, String> {
    match s.to_ascii_lowercase().as_str() {
        "euclidean" => Ok(Metric::Euclidean),
        "cosine" => Ok(Metric::Cosine),
        other => Err(format!("unknown metric '{}'", other)),
    }
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("{}", e);
        if let Err(unprintable) = emit(&e.payload()) {
            log::error!("{}", unprintable);
        }
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let cfg = effective_config(&cli).map_err(Error::Setup)?;

    match cli.command {
        Commands::Generate { source } => generate(&cfg, &source),
        Commands::Compare {
            reference,
            reference_file,
            source,
        } => {
            let reference = match reference_file {
                Some(path) => reference::read_reference(&path)?,
                None => reference::parse_reference(reference.as_deref().unwrap_or_default())?,
            };
            compare(&cfg, &reference, &source)
        }
        Commands::Config => {
            let rendered = cfg.to_toml().map_err(Error::Setup)?;
            print!("{}", rendered);
            Ok(())
        }
    }
}

fn effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(interval) = cli.interval {
        cfg.sampling_interval = interval;
    }
    if let Some(tolerance) = cli.tolerance {
        cfg.match_tolerance = tolerance;
    }
    if let Some(metric) = cli.metric {
        cfg.metric = metric;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn load_pipeline(cfg: &Config) -> Result<Pipeline, Error> {
    Pipeline::with_settings(
        &cfg.models.detector,
        &cfg.models.recognizer,
        cfg.detector.settings(),
    )
    .context("Failed to initialize face recognition pipeline")
    .map_err(Error::Setup)
}

fn generate(cfg: &Config, source: &SourceArgs) -> Result<(), Error> {
    let frames = open_source(&source.spec())?;
    let mut pipeline = load_pipeline(cfg)?;

    info!(
        "Generating descriptors from {} (every {} frame(s))",
        source.video.display(),
        cfg.sampling_interval
    );
    let descriptors = aggregate(frames, &mut pipeline, cfg);
    emit(&descriptors)
}

fn compare(cfg: &Config, reference: &Embedding, source: &SourceArgs) -> Result<(), Error> {
    let frames = open_source(&source.spec())?;
    let mut pipeline = load_pipeline(cfg)?;

    info!(
        "Comparing {}-value descriptor against {} (tolerance {}, {:?})",
        reference.len(),
        source.video.display(),
        cfg.match_tolerance,
        cfg.metric
    );
    let state = decide(frames, &mut pipeline, reference, cfg);
    emit(&state.result())
}

fn emit<T: Serialize>(value: &T) -> Result<(), Error> {
    let json = serde_json::to_string(value)
        .context("failed to serialize output")
        .map_err(Error::Setup)?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).unwrap()
    }

    fn compare_args(cli: Cli) -> (Option<String>, Option<PathBuf>, SourceArgs) {
        match cli.command {
            Commands::Compare {
                reference,
                reference_file,
                source,
            } => (reference, reference_file, source),
            _ => panic!("expected compare"),
        }
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate() {
        match parse(&["facematch", "generate", "clip.mp4"]).command {
            Commands::Generate { source } => {
                assert_eq!(source.video, Path::new("clip.mp4"));
                assert!(!source.camera);
                assert_eq!(source.max_frames, 300);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_parse_compare_with_inline_reference() {
        let cli = parse(&["facematch", "compare", "[0.1, 0.2]", "clip.mp4"]);
        let (reference, reference_file, source) = compare_args(cli);
        assert_eq!(reference.as_deref(), Some("[0.1, 0.2]"));
        assert!(reference_file.is_none());
        assert_eq!(source.video, Path::new("clip.mp4"));
    }

    #[test]
    fn test_parse_compare_with_reference_file() {
        let cli = parse(&[
            "facematch",
            "compare",
            "--reference-file",
            "ref.json",
            "clip.mp4",
        ]);
        let (reference, reference_file, source) = compare_args(cli);
        assert!(reference.is_none());
        assert_eq!(reference_file.as_deref(), Some(Path::new("ref.json")));
        assert_eq!(source.video, Path::new("clip.mp4"));
    }

    #[test]
    fn test_parse_compare_camera_with_reference_file() {
        let cli = parse(&[
            "facematch",
            "compare",
            "--reference-file",
            "ref.json",
            "/dev/video0",
            "--camera",
            "--max-frames",
            "20",
        ]);
        let (_, _, source) = compare_args(cli);
        assert_eq!(source.video, Path::new("/dev/video0"));
        assert!(source.camera);
        assert_eq!(source.max_frames, 20);
    }

    #[test]
    fn test_compare_needs_exactly_one_reference() {
        assert!(Cli::try_parse_from(["facematch", "compare", "clip.mp4"]).is_err());
        assert!(Cli::try_parse_from([
            "facematch",
            "compare",
            "[0.1]",
            "--reference-file",
            "ref.json",
            "clip.mp4",
        ])
        .is_err());
    }

    #[test]
    fn test_global_overrides_apply() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("facematch.toml");
        let cli = parse(&[
            "facematch",
            "--config",
            missing.to_str().unwrap(),
            "--interval",
            "5",
            "--tolerance",
            "0.3",
            "--metric",
            "Cosine",
            "config",
        ]);
        let cfg = effective_config(&cli).unwrap();
        assert_eq!(cfg.sampling_interval, 5);
        assert_eq!(cfg.match_tolerance, 0.3);
        assert_eq!(cfg.metric, Metric::Cosine);
    }

    #[test]
    fn test_zero_interval_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("facematch.toml");
        let cli = parse(&[
            "facematch",
            "--config",
            missing.to_str().unwrap(),
            "--interval",
            "0",
            "config",
        ]);
        let err = run(cli).unwrap_err();
        assert!(matches!(err, Error::Setup(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_unknown_metric_is_rejected() {
        assert!(Cli::try_parse_from(["facematch", "--metric", "manhattan", "config"]).is_err());
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    #[test]
    fn test_emit_reports_serialization_failure() {
        let err = emit(&Unserializable).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
