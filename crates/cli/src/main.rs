mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use photosift_core::SimilarityLevel;
use tracing_subscriber::EnvFilter;

use commands::Session;

/// Photosift: find near-duplicate shots within photo bursts
#[derive(Parser)]
#[command(name = "photosift", version, about)]
struct Cli {
    /// Directory for the fingerprint cache, checkpoints and thumbnails
    #[arg(long, global = true, default_value_t = default_cache_dir())]
    cache_dir: String,

    /// Print engine events and results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Log engine activity at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LibraryArg {
    /// Root directory of the photo library
    #[arg(long, short)]
    library: PathBuf,
}

#[derive(Args)]
struct ThresholdArgs {
    /// Distance threshold; overrides --level
    #[arg(long)]
    threshold: Option<f32>,

    /// Similarity preset
    #[arg(long, value_enum)]
    level: Option<Level>,
}

impl ThresholdArgs {
    fn resolve(&self) -> f32 {
        self.threshold
            .unwrap_or_else(|| self.level.map(SimilarityLevel::from).unwrap_or_default().threshold())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    VerySimilar,
    Similar,
    MaybeSimilar,
}

impl From<Level> for SimilarityLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::VerySimilar => SimilarityLevel::VerySimilar,
            Level::Similar => SimilarityLevel::Similar,
            Level::MaybeSimilar => SimilarityLevel::MaybeSimilar,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the whole library for similar photos
    Scan {
        #[command(flatten)]
        library: LibraryArg,
        #[command(flatten)]
        threshold: ThresholdArgs,
        /// Pause once this percentage is reached
        #[arg(long)]
        pause_at: Option<f64>,
        /// Keep the found groups on disk after the scan completes
        #[arg(long)]
        keep: bool,
    },
    /// Continue an interrupted scan, or start a fresh one
    Resume {
        #[command(flatten)]
        library: LibraryArg,
        #[command(flatten)]
        threshold: ThresholdArgs,
        /// Keep the found groups on disk after the scan completes
        #[arg(long)]
        keep: bool,
    },
    /// Show library access, photo count and checkpoint state
    Status {
        #[command(flatten)]
        library: LibraryArg,
    },
    /// List saved groups, or rescan and regroup at a new threshold
    Groups {
        #[command(flatten)]
        library: LibraryArg,
        /// Rescan, then regroup at this threshold
        #[arg(long)]
        regroup: Option<f32>,
    },
    /// Delete photos by id
    Delete {
        #[command(flatten)]
        library: LibraryArg,
        /// Asset ids (paths relative to the library root)
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Export JPEG thumbnails
    Thumbs {
        #[command(flatten)]
        library: LibraryArg,
        #[arg(required = true)]
        ids: Vec<String>,
        /// Bounding box edge in pixels
        #[arg(long, default_value_t = 200)]
        size: u32,
    },
    /// Export a large preview of one photo
    Preview {
        #[command(flatten)]
        library: LibraryArg,
        id: String,
    },
    /// Wipe the fingerprint cache, thumbnails and checkpoints
    ClearCache {
        #[command(flatten)]
        library: LibraryArg,
    },
}

fn default_cache_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".photosift")
        .to_string_lossy()
        .to_string()
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,photosift=debug,photosift_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let session = Session {
        cache_dir: PathBuf::from(&cli.cache_dir),
        json: cli.json,
    };

    match cli.command {
        Commands::Scan {
            library,
            threshold,
            pause_at,
            keep,
        } => commands::scan::start(&session, &library.library, threshold.resolve(), pause_at, keep)?,
        Commands::Resume {
            library,
            threshold,
            keep,
        } => commands::scan::resume(&session, &library.library, threshold.resolve(), keep)?,
        Commands::Status { library } => commands::status::run(&session, &library.library)?,
        Commands::Groups { library, regroup } => {
            commands::groups::run(&session, &library.library, regroup)?
        }
        Commands::Delete { library, ids } => commands::delete::run(&session, &library.library, &ids)?,
        Commands::Thumbs { library, ids, size } => {
            commands::thumbs::thumbnails(&session, &library.library, &ids, size)?
        }
        Commands::Preview { library, id } => commands::thumbs::preview(&session, &library.library, &id)?,
        Commands::ClearCache { library } => commands::cache::clear(&session, &library.library)?,
    }

    Ok(())
}
