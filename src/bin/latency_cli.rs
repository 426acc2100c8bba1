use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use latency_calibrator::calibration::{
    schedule_aligned_event, CalibrationOutcome, LatencyCalibrator, Selection, TrialProgress,
    TrialRecord,
};
use latency_calibrator::config::AppConfig;
use latency_calibrator::telemetry;
use latency_calibrator::{AudioBackend, LagEstimate, LoopbackBackend, LoopbackConfig};
use tokio::sync::broadcast;

#[derive(Parser, Debug)]
#[command(
    name = "latency_cli",
    about = "Round-trip audio latency calibration harness"
)]
struct Cli {
    /// JSON configuration file (defaults apply to missing fields)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single calibration trial
    Trial {
        #[command(flatten)]
        backend: BackendArgs,
        /// Write the outcome as JSON
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write captured and reference buffers as a 2-channel float WAV
        #[arg(long)]
        dump_wav: Option<PathBuf>,
    },
    /// Run a robust multi-trial calibration
    Robust {
        #[command(flatten)]
        backend: BackendArgs,
        /// Override the configured trial count
        #[arg(long)]
        trials: Option<usize>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Compute the output start time for an event observed at TARGET seconds
    Schedule {
        /// Desired arrival time on the input path, in seconds
        #[arg(long)]
        target: f64,
        /// Measured round trip in milliseconds
        #[arg(long)]
        latency_ms: f64,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Simulated loopback with a known delay
    Loopback,
    /// Default input and output devices
    Device,
}

#[derive(Args, Debug)]
struct BackendArgs {
    #[arg(long, value_enum, default_value_t = BackendKind::Loopback)]
    backend: BackendKind,
    /// Simulated round trip in milliseconds
    #[arg(long, default_value_t = 20.0)]
    sim_latency_ms: f64,
    /// Simulated path gain
    #[arg(long, default_value_t = 0.8)]
    sim_gain: f32,
    /// Simulated white noise peak level
    #[arg(long, default_value_t = 0.0)]
    sim_noise: f32,
    /// Simulated clock speed relative to wall time
    #[arg(long, default_value_t = 1.0)]
    sim_speed: f64,
    /// Let the simulation provide a reference tap
    #[arg(long)]
    sim_tap: bool,
}

impl BackendArgs {
    fn loopback_config(&self) -> LoopbackConfig {
        LoopbackConfig {
            latency_ms: self.sim_latency_ms,
            gain: self.sim_gain,
            noise_level: self.sim_noise,
            speed: self.sim_speed,
            reference_tap: self.sim_tap,
            ..LoopbackConfig::default()
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let level = telemetry::parse_level(&cli.log_level)
        .with_context(|| format!("unknown log level {}", cli.log_level))?;
    telemetry::init_logging(level);

    let config = match &cli.config {
        Some(path) => AppConfig::try_load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };
    config.validate().context("validating configuration")?;

    match cli.command {
        Commands::Trial {
            backend,
            output,
            dump_wav,
        } => with_backend(&config, &backend, |calibrator, runtime| {
            run_trial(calibrator, runtime, &config, output.as_deref(), dump_wav.as_deref())
        }),
        Commands::Robust {
            backend,
            trials,
            output,
        } => {
            let mut config = config.clone();
            if let Some(trials) = trials {
                config.robust.trials = trials;
            }
            with_backend(&config, &backend, |calibrator, runtime| {
                run_robust(calibrator, runtime, &config, output.as_deref())
            })
        }
        Commands::Schedule { target, latency_ms } => run_schedule(&config, target, latency_ms),
    }
}

/// Open the selected backend and hand a calibrator to `body`
fn with_backend<F>(config: &AppConfig, args: &BackendArgs, body: F) -> Result<ExitCode>
where
    F: FnOnce(&mut dyn CalibrationRunner, &tokio::runtime::Runtime) -> Result<ExitCode>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("building tokio runtime")?;

    match args.backend {
        BackendKind::Loopback => {
            let backend = LoopbackBackend::start(&config.audio, args.loopback_config())
                .context("starting loopback simulation")?;
            let mut calibrator = LatencyCalibrator::new(backend);
            body(&mut calibrator, &runtime)
        }
        BackendKind::Device => open_device(config, &runtime, body),
    }
}

#[cfg(not(target_os = "android"))]
fn open_device<F>(config: &AppConfig, runtime: &tokio::runtime::Runtime, body: F) -> Result<ExitCode>
where
    F: FnOnce(&mut dyn CalibrationRunner, &tokio::runtime::Runtime) -> Result<ExitCode>,
{
    let backend = latency_calibrator::audio::CpalBackend::open(&config.audio)
        .context("opening audio devices")?;
    let mut calibrator = LatencyCalibrator::new(backend);
    body(&mut calibrator, runtime)
}

#[cfg(target_os = "android")]
fn open_device<F>(_config: &AppConfig, _runtime: &tokio::runtime::Runtime, _body: F) -> Result<ExitCode>
where
    F: FnOnce(&mut dyn CalibrationRunner, &tokio::runtime::Runtime) -> Result<ExitCode>,
{
    bail!("device backend is not available on this platform")
}

/// Object-safe view of a calibrator over any backend
trait CalibrationRunner {
    fn trial(&mut self, runtime: &tokio::runtime::Runtime, config: &AppConfig) -> Result<TrialRecord>;

    fn robust(
        &mut self,
        runtime: &tokio::runtime::Runtime,
        config: &AppConfig,
        progress: &broadcast::Sender<TrialProgress>,
    ) -> Result<CalibrationOutcome>;

    fn sample_rate(&self) -> u32;
}

impl<B: AudioBackend> CalibrationRunner for LatencyCalibrator<B> {
    fn trial(&mut self, runtime: &tokio::runtime::Runtime, config: &AppConfig) -> Result<TrialRecord> {
        let amplitude = config.calibration.probe.amplitude;
        Ok(runtime.block_on(self.run_trial(&config.calibration, amplitude))?)
    }

    fn robust(
        &mut self,
        runtime: &tokio::runtime::Runtime,
        config: &AppConfig,
        progress: &broadcast::Sender<TrialProgress>,
    ) -> Result<CalibrationOutcome> {
        Ok(runtime.block_on(self.calibrate_robust_with_progress(
            &config.calibration,
            &config.robust,
            Some(progress),
        ))?)
    }

    fn sample_rate(&self) -> u32 {
        self.backend().sample_rate()
    }
}

fn run_trial(
    calibrator: &mut dyn CalibrationRunner,
    runtime: &tokio::runtime::Runtime,
    config: &AppConfig,
    output: Option<&Path>,
    dump_wav: Option<&Path>,
) -> Result<ExitCode> {
    let record = calibrator.trial(runtime, config).context("running trial")?;

    if let Some(path) = dump_wav {
        write_wav(path, calibrator.sample_rate(), &record)?;
    }

    let outcome = CalibrationOutcome {
        valid_trials: usize::from(record.result.is_trusted(config.calibration.low_score_warning)),
        result: record.result,
        selection: Selection::Single,
        total_trials: 1,
    };
    emit_outcome(&outcome, output)
}

fn run_robust(
    calibrator: &mut dyn CalibrationRunner,
    runtime: &tokio::runtime::Runtime,
    config: &AppConfig,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let (tx, mut rx) = broadcast::channel::<TrialProgress>(config.robust.trials.max(1));
    let printer = runtime.spawn(async move {
        while let Ok(progress) = rx.recv().await {
            eprintln!(
                "[{:>3}%] trial {}/{}: {:.2} ms, score {:.3}, next amplitude {:.3}",
                progress.percent(),
                progress.trial_index + 1,
                progress.total_trials,
                progress.result.estimate.lag_ms,
                progress.result.estimate.score,
                progress.next_amplitude
            );
        }
    });

    let outcome = calibrator
        .robust(runtime, config, &tx)
        .context("running robust calibration")?;
    drop(tx);
    runtime
        .block_on(printer)
        .context("joining progress printer")?;

    emit_outcome(&outcome, output)
}

fn run_schedule(config: &AppConfig, target: f64, latency_ms: f64) -> Result<ExitCode> {
    if !latency_ms.is_finite() || latency_ms < 0.0 {
        bail!("latency must be a non-negative number of milliseconds");
    }
    let sample_rate = config.audio.sample_rate;
    let latency = LagEstimate {
        lag_samples: (latency_ms * sample_rate as f64 / 1000.0).round() as i64,
        lag_ms: latency_ms,
        score: 1.0,
    };
    let output_time = schedule_aligned_event(target, &latency);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "target_capture_time": target,
            "latency_ms": latency_ms,
            "output_start_time": output_time,
        }))?
    );
    Ok(ExitCode::from(0))
}

fn emit_outcome(outcome: &CalibrationOutcome, output: Option<&Path>) -> Result<ExitCode> {
    let json = serde_json::to_string_pretty(outcome)?;
    if let Some(path) = output {
        fs::write(path, &json).with_context(|| format!("writing {}", path.display()))?;
    } else {
        println!("{json}");
    }

    // 2 signals a measurement that should not be trusted
    match outcome.selection {
        Selection::Median => Ok(ExitCode::from(0)),
        Selection::Single if outcome.valid_trials > 0 => Ok(ExitCode::from(0)),
        _ => Ok(ExitCode::from(2)),
    }
}

fn write_wav(path: &Path, sample_rate: u32, record: &TrialRecord) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for (captured, reference) in record.captured.samples.iter().zip(record.reference.iter()) {
        writer.write_sample(*captured)?;
        writer.write_sample(*reference)?;
    }
    writer
        .finalize()
        .with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}
