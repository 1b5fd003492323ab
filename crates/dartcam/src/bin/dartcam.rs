//! dartcam CLI: replay recorded detector output through the scoring pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dartcam::pipeline::{FrameLoop, NullSink, ScoringPipeline};
use dartcam::publish::Broadcaster;
use dartcam::replay::{RecordedDetector, ReplaySource};
use dartcam::{PipelineConfig, X01Scoreboard};
use log::LevelFilter;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "dartcam")]
#[command(about = "Score darts from landmark and dart detections")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines detection recording and print the standings.
    Replay(ReplayArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// Recording, one `{"detections": [...]}` object per line.
    frames: PathBuf,

    /// Pipeline configuration (JSON). Missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Width in pixels of the recorded frames.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Height in pixels of the recorded frames.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Player names, in throwing order. Overrides the config.
    #[arg(long, num_args = 1..)]
    players: Vec<String>,

    /// Starting score. Overrides the config.
    #[arg(long)]
    start: Option<i32>,

    #[arg(long, value_enum, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,

    /// Print every published status payload to stdout.
    #[arg(long)]
    status: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay(args) => run_replay(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: LogLevel) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        dartcam::core::init_tracing(level.into(), false);
        Ok(())
    }
    #[cfg(not(feature = "tracing"))]
    {
        dartcam::core::init_with_level(level.into())?;
        Ok(())
    }
}

fn run_replay(args: &ReplayArgs) -> CliResult<()> {
    init_logging(args.log_level)?;

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if !args.players.is_empty() {
        config.game.players = args.players.clone();
    }
    if let Some(start) = args.start {
        config.game.starting_score = start;
    }
    config.validate()?;
    let mut source = ReplaySource::open(&args.frames)?;

    let board = X01Scoreboard::new(&config.game)?;
    let broadcaster = Broadcaster::with_max_pending(config.publish.max_pending);
    let pipeline = ScoringPipeline::new(config, args.width, args.height, board)?;
    let (frame_loop, _control) = FrameLoop::new(pipeline);

    let printer = args.status.then(|| {
        let observer = broadcaster.subscribe();
        std::thread::spawn(move || {
            for message in observer {
                println!("{message}");
            }
        })
    });
    let mut frame_loop = frame_loop.with_broadcaster(broadcaster);
    let stats = frame_loop.run(&mut source, &mut RecordedDetector, &mut NullSink)?;

    // dropping the loop closes the broadcast channel and ends the printer
    let board = frame_loop.into_pipeline().into_scoreboard();
    if let Some(printer) = printer {
        if printer.join().is_err() {
            return Err("status printer panicked".into());
        }
    }

    println!(
        "frames: {} ({} searching), visits: {}, darts: {}",
        stats.frames_processed, stats.frames_searching, stats.visits_committed, stats.darts_thrown
    );
    for player in board.players() {
        println!(
            "{}: {} ({} darts)",
            player.name,
            player.score,
            player.darts_thrown()
        );
    }
    if let Some(winner) = board.winner() {
        println!("winner: {}", winner.name);
    }
    Ok(())
}
