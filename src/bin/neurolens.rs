//! NeuroLens CLI - replay recorded assessment data through the signal core
//!
//! Commands:
//! - audio: Replay energy samples or PCM frames through the acoustic phase
//! - visual: Replay frames or precomputed frame deltas through the visual phase
//! - typing: Replay a keystroke log through the typing task
//! - report: Generate a diagnostic report from a composite payload
//! - config: Print the effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use neurolens::inference::{ReportGenerator, StaticProvider};
use neurolens::linguistic::KeystrokeLog;
use neurolens::media::ReplayAudio;
use neurolens::sampler::{FinishedTask, Progress};
use neurolens::types::{AssessmentPayload, TaskSummary};
use neurolens::{
    analyze_energy_samples, analyze_frame_deltas, analyze_frames, analyze_pcm, drive,
    replay_typing, stop_channel, AcousticProbe, AssessmentConfig, AssessmentError, Frame,
    ENGINE_VERSION,
};

/// NeuroLens - acoustic and oculomotor signal extraction
#[derive(Parser)]
#[command(name = "neurolens")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Replay assessment recordings and generate reports", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults are used for missing fields
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a microphone recording through the acoustic phase
    Audio {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "energies")]
        format: AudioFormat,

        /// Transcript from an external recogniser
        #[arg(long)]
        transcript: Option<String>,

        /// Run on the real-time timer, printing progress to stderr
        #[arg(long)]
        realtime: bool,
    },

    /// Replay a camera recording through the visual phase
    Visual {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "frames")]
        format: VisualFormat,
    },

    /// Replay a keystroke log through the typing task
    Typing {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Generate a diagnostic report from a composite payload
    Report {
        /// Payload file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        payload: PathBuf,

        /// Use a recorded provider response instead of calling the provider
        #[arg(long)]
        response: Option<PathBuf>,

        /// Provider timeout in seconds (overrides configuration)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, ValueEnum)]
enum AudioFormat {
    /// JSON array of energy readings (0-255), one per tick
    Energies,
    /// JSON array of PCM frames, one per tick
    Pcm,
}

#[derive(Clone, ValueEnum)]
enum VisualFormat {
    /// JSON array of frames ({ width, height, brightness })
    Frames,
    /// JSON array of precomputed frame deltas
    Deltas,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), NeuroLensCliError> {
    let config = load_config(cli.config.as_deref())?;
    let pretty = cli.pretty;

    match cli.command {
        Commands::Audio {
            input,
            format,
            transcript,
            realtime,
        } => cmd_audio(&config, &input, format, transcript.as_deref(), realtime, pretty),

        Commands::Visual { input, format } => cmd_visual(&config, &input, format, pretty),

        Commands::Typing { input } => {
            let log: KeystrokeLog = serde_json::from_str(&read_input(&input)?)?;
            print_json(&replay_typing(&log, &config.typing)?, pretty)
        }

        Commands::Report {
            payload,
            response,
            timeout,
        } => cmd_report(config, &payload, response.as_deref(), timeout, pretty),

        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AssessmentConfig, NeuroLensCliError> {
    let mut config = match path {
        Some(path) => AssessmentConfig::from_file(path)?,
        None => AssessmentConfig::default(),
    };
    config.provider = config.provider.with_env_overrides();
    Ok(config)
}

fn read_input(input: &Path) -> Result<String, NeuroLensCliError> {
    let data = if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            return Err(NeuroLensCliError::InteractiveStdin);
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    if data.trim().is_empty() {
        return Err(NeuroLensCliError::EmptyInput);
    }
    Ok(data)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), NeuroLensCliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

#[derive(Serialize)]
struct TaskOutput<'a, M> {
    summary: &'a TaskSummary,
    metrics: &'a M,
}

fn print_task<M: Serialize>(task: &FinishedTask<M>, pretty: bool) -> Result<(), NeuroLensCliError> {
    print_json(
        &TaskOutput {
            summary: &task.summary,
            metrics: &task.metrics,
        },
        pretty,
    )
}

fn cmd_audio(
    config: &AssessmentConfig,
    input: &Path,
    format: AudioFormat,
    transcript: Option<&str>,
    realtime: bool,
    pretty: bool,
) -> Result<(), NeuroLensCliError> {
    let data = read_input(input)?;
    let acoustic = &config.acoustic;

    let task = match format {
        AudioFormat::Energies if realtime => {
            let energies: Vec<f64> = serde_json::from_str(&data)?;
            let mut probe = AcousticProbe::new(ReplayAudio::new(energies), acoustic);
            if let Some(transcript) = transcript {
                probe.set_transcript(transcript);
            }
            let sampler = probe.into_sampler(acoustic);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            let (_stop, signal) = stop_channel();
            runtime
                .block_on(drive(sampler, signal, |p: &Progress<_>| {
                    eprintln!(
                        "[{:>5.1}%] energy {:>6.1} silent {:<5} pauses {}",
                        p.progress, p.status.energy, p.status.is_silent, p.status.pause_count
                    );
                }))
                .ok_or(NeuroLensCliError::NoMetrics)?
        }
        AudioFormat::Energies => {
            let energies: Vec<f64> = serde_json::from_str(&data)?;
            analyze_energy_samples(energies, transcript, acoustic)?
        }
        AudioFormat::Pcm => {
            let frames: Vec<Vec<f32>> = serde_json::from_str(&data)?;
            analyze_pcm(frames, transcript, acoustic)?
        }
    };

    print_task(&task, pretty)
}

fn cmd_visual(
    config: &AssessmentConfig,
    input: &Path,
    format: VisualFormat,
    pretty: bool,
) -> Result<(), NeuroLensCliError> {
    let data = read_input(input)?;

    match format {
        VisualFormat::Frames => {
            let frames: Vec<Frame> = serde_json::from_str(&data)?;
            let task = analyze_frames(frames, &config.visual)?;
            print_task(&task, pretty)
        }
        VisualFormat::Deltas => {
            let deltas: Vec<f64> = serde_json::from_str(&data)?;
            print_json(&analyze_frame_deltas(&deltas, &config.visual), pretty)
        }
    }
}

fn cmd_report(
    config: AssessmentConfig,
    payload: &Path,
    response: Option<&Path>,
    timeout: Option<u64>,
    pretty: bool,
) -> Result<(), NeuroLensCliError> {
    let payload = AssessmentPayload::from_json(&read_input(payload)?)?;

    let mut generator = match response {
        Some(path) => ReportGenerator::new(
            Arc::new(StaticProvider::new(fs::read_to_string(path)?)),
            config.provider,
        ),
        None => ReportGenerator::from_config(config.provider),
    };
    if let Some(secs) = timeout {
        generator = generator.with_timeout(Duration::from_secs(secs));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let outcome = runtime.block_on(generator.generate_with_timeout(&payload));

    print_json(&outcome, pretty)
}

// Error types

#[derive(Debug)]
enum NeuroLensCliError {
    Io(io::Error),
    Assessment(AssessmentError),
    Json(serde_json::Error),
    InteractiveStdin,
    EmptyInput,
    NoMetrics,
}

impl From<io::Error> for NeuroLensCliError {
    fn from(e: io::Error) -> Self {
        NeuroLensCliError::Io(e)
    }
}

impl From<AssessmentError> for NeuroLensCliError {
    fn from(e: AssessmentError) -> Self {
        NeuroLensCliError::Assessment(e)
    }
}

impl From<serde_json::Error> for NeuroLensCliError {
    fn from(e: serde_json::Error) -> Self {
        NeuroLensCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<NeuroLensCliError> for CliError {
    fn from(e: NeuroLensCliError) -> Self {
        match e {
            NeuroLensCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            NeuroLensCliError::Assessment(e) => {
                let (code, hint) = match &e {
                    AssessmentError::DevicePermission(_) => {
                        ("DEVICE_PERMISSION", "Grant device access and restart the task")
                    }
                    AssessmentError::StreamInterrupted(_) => {
                        ("STREAM_INTERRUPTED", "Reconnect the device and restart the task")
                    }
                    AssessmentError::Provider(_) => {
                        ("PROVIDER_ERROR", "Check provider settings and API key")
                    }
                    AssessmentError::InvalidConfig(_) => {
                        ("INVALID_CONFIG", "Run 'neurolens config' to see valid settings")
                    }
                    AssessmentError::InvalidInput(_) => ("INVALID_INPUT", "Check input values"),
                    AssessmentError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    AssessmentError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            NeuroLensCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            NeuroLensCliError::InteractiveStdin => CliError {
                code: "NO_INPUT".to_string(),
                message: "stdin is a TTY and no input file was given".to_string(),
                hint: Some("Pipe data into the command or pass --input".to_string()),
            },
            NeuroLensCliError::EmptyInput => CliError {
                code: "EMPTY_INPUT".to_string(),
                message: "Input is empty".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            NeuroLensCliError::NoMetrics => CliError {
                code: "NO_METRICS".to_string(),
                message: "Task ended without producing metrics".to_string(),
                hint: None,
            },
        }
    }
}
