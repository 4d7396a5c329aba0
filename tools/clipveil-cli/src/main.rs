//! Clipveil CLI: anonymize, compose, upload, and replay short clips.
//!
//! Usage:
//!   clipveil mask <FRAMES>...       Blur faces in still frames
//!   clipveil compose <SOURCE>       Burn captions and a watermark into a clip
//!   clipveil upload <FILE>          Upload a finished export
//!   clipveil queue <ACTION>         Inspect or drain the upload queue
//!   clipveil fetch <KEY>            Fetch a remote video through the cache
//!   clipveil check                  Check host capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use clipveil_common::config::AppConfig;
use clipveil_media_model::Anchor;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipveil",
    about = "Short vertical clips with faces blurred and captions burned in",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Blur faces in PNG frames through a capture session
    Mask {
        /// Input frames, processed in order
        #[arg(required = true)]
        frames: Vec<PathBuf>,

        /// JSON array of face regions applied to every frame; the host
        /// detector is used when omitted
        #[arg(long)]
        faces: Option<PathBuf>,

        /// Output directory for the rendered frames
        #[arg(short, long, default_value = "masked")]
        output: PathBuf,

        /// Clockwise rotation of the frame buffers (degrees)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        rotation: i64,

        /// Blur style override: gaussian|pixelate
        #[arg(long)]
        style: Option<String>,

        /// Per-frame budget as a frame rate (defaults to the capture fps)
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Compose a recorded clip with captions and a watermark
    Compose {
        /// Source video
        source: PathBuf,

        /// Caption segments (JSON)
        #[arg(long)]
        captions: Option<PathBuf>,

        /// Watermark text
        #[arg(long, conflicts_with = "watermark_image")]
        watermark_text: Option<String>,

        /// Watermark image (PNG)
        #[arg(long)]
        watermark_image: Option<PathBuf>,

        /// Watermark position
        #[arg(long, value_enum, default_value = "bottom-right")]
        anchor: AnchorArg,

        /// Watermark opacity [0.0, 1.0]
        #[arg(long, default_value = "0.8")]
        opacity: f64,

        /// Move the finished export here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Enqueue a finished export and upload it
    Upload {
        /// Local file
        file: PathBuf,

        /// Destination key in the remote store
        #[arg(long, conflicts_with = "user")]
        key: Option<String>,

        /// Build the key as `<user>/<uuid>.mp4`
        #[arg(long)]
        user: Option<String>,

        /// Only persist the task; do not wait for the upload
        #[arg(long)]
        no_wait: bool,
    },

    /// Inspect or drain the persisted upload queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Fetch a remote video through the playback cache
    Fetch {
        /// Remote key; omit with --clear or --stats
        key: Option<String>,

        /// Remove every cached file
        #[arg(long)]
        clear: bool,

        /// Print cache statistics
        #[arg(long)]
        stats: bool,
    },

    /// Check host capabilities and configuration
    Check {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write_config: bool,
    },
}

#[derive(Subcommand)]
pub enum QueueAction {
    /// List persisted tasks
    List,

    /// Upload every persisted task, then exit
    Drain,

    /// Remove a task
    Cancel {
        /// Task id
        id: uuid::Uuid,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AnchorArg {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl From<AnchorArg> for Anchor {
    fn from(arg: AnchorArg) -> Self {
        match arg {
            AnchorArg::TopLeft => Anchor::TopLeft,
            AnchorArg::TopRight => Anchor::TopRight,
            AnchorArg::BottomLeft => Anchor::BottomLeft,
            AnchorArg::BottomRight => Anchor::BottomRight,
            AnchorArg::Center => Anchor::Center,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    // --verbose wins over the configured level
    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    clipveil_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Mask {
            frames,
            faces,
            output,
            rotation,
            style,
            fps,
        } => commands::mask::run(&config, frames, faces, output, rotation, style, fps),
        Commands::Compose {
            source,
            captions,
            watermark_text,
            watermark_image,
            anchor,
            opacity,
            output,
        } => {
            commands::compose::run(
                &config,
                source,
                captions,
                watermark_text,
                watermark_image,
                anchor.into(),
                opacity,
                output,
            )
            .await
        }
        Commands::Upload {
            file,
            key,
            user,
            no_wait,
        } => commands::upload::run(&config, file, key, user, no_wait).await,
        Commands::Queue { action } => commands::queue::run(&config, action).await,
        Commands::Fetch { key, clear, stats } => {
            commands::fetch::run(&config, key, clear, stats).await
        }
        Commands::Check { write_config } => {
            let path = cli.config.unwrap_or_else(AppConfig::default_path);
            commands::check::run(&config, write_config.then_some(path))
        }
    }
}
