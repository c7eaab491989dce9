use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use physiotrack::{available_exercises, PhysiotrackConfig, RawDetection, SessionPipeline};

#[derive(Parser, Debug)]
#[command(name = "physiotrack")]
#[command(about = "Pose-based repetition counter for guided physiotherapy exercises")]
#[command(version)]
#[command(long_about = "Consumes pose landmark detections (one JSON object per line) from a \
file or stdin, tracks repetitions of a configured physiotherapy exercise, and emits rep \
events plus a final session summary as JSON. The pose estimator and any rendering live \
outside this process.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "physiotrack.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Landmark input: a JSONL file, or "-" for stdin
    #[arg(short, long, default_value = "-", help = "Detection stream, one JSON object per line")]
    input: String,

    /// Override the configured exercise
    #[arg(short, long, help = "Exercise to track (see --list-exercises)")]
    exercise: Option<String>,

    /// Override the configured target rep count
    #[arg(short, long, help = "Stop counting toward this many reps")]
    target_reps: Option<u32>,

    /// Force strict mode regardless of configuration
    #[arg(long, help = "Disable lenient mode for this session")]
    strict: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// List supported exercises and exit
    #[arg(long, help = "List supported exercise names and exit")]
    list_exercises: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }
    if args.list_exercises {
        for name in available_exercises() {
            println!("{}", name);
        }
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting physiotrack v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = match PhysiotrackConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Command-line overrides take precedence over the file
    if let Some(exercise) = &args.exercise {
        config.session.exercise = exercise.clone();
    }
    if let Some(target) = args.target_reps {
        config.session.target_reps = Some(target);
    }
    if args.strict {
        config.session.lenient_mode = false;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }
    if args.validate_config {
        println!("Configuration is valid");
        return Ok(());
    }

    info!(
        exercise = %config.session.exercise,
        lenient = config.session.lenient_mode,
        "session configured"
    );

    let pipeline = SessionPipeline::start(&config)?;

    // Forward session events to stdout as JSON lines while frames stream in.
    let mut events = pipeline.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("failed to serialize event: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event printer lagged behind by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    stream_frames(&pipeline, &args.input).await?;

    let summary = pipeline.finish().await?;
    printer.await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!(
        total_reps = summary.total_reps,
        total_frames = summary.total_frames,
        "session complete"
    );

    Ok(())
}

/// Feed detections from the input source into the pipeline, one JSON object
/// per line. Malformed lines are skipped with a warning so a single detector
/// glitch cannot kill the session.
async fn stream_frames(pipeline: &SessionPipeline, input: &str) -> Result<()> {
    let reader: Box<dyn AsyncRead + Unpin> = if input == "-" {
        info!("Reading detections from stdin");
        Box::new(tokio::io::stdin())
    } else {
        info!("Reading detections from: {}", input);
        Box::new(tokio::fs::File::open(input).await?)
    };

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawDetection>(&line) {
            Ok(raw) => pipeline.submit(raw).await?,
            Err(e) => warn!("skipping malformed detection line: {}", e),
        }
    }

    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("physiotrack={}", log_level)));

    // Logs go to stderr: stdout carries the event and summary JSON.
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_writer(std::io::stderr).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Physiotrack configuration file");
    println!("# Default values for all available options");
    println!();
    println!("{}", toml::to_string_pretty(&PhysiotrackConfig::default())?);
    Ok(())
}
