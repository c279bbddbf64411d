use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use homegate_client::api::{ApiClient, ApiConfig, DEFAULT_API_URL};
use homegate_core::doors;
use homegate_core::frame::DEFAULT_JPEG_QUALITY;
use homegate_core::DoorAction;
use tracing_subscriber::EnvFilter;

mod check;
mod enroll;
mod verify;

#[derive(Parser)]
#[command(name = "homegate", about = "Face liveness gate for smart-home doors", version)]
struct Cli {
    /// Base URL of the face and device services.
    #[arg(long, global = true, env = "HOMEGATE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Bearer token for the services.
    #[arg(long, global = true, env = "HOMEGATE_AUTH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, global = true, env = "HOMEGATE_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// JPEG quality of captured frames.
    #[arg(long, global = true, env = "HOMEGATE_JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
    jpeg_quality: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the liveness check over image files as consecutive frames.
    Check {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Scan a frame directory until a face is verified for a room.
    Verify {
        #[arg(long, env = "HOMEGATE_ROOM")]
        room: String,
        #[arg(long, env = "HOMEGATE_FRAMES_DIR")]
        frames: PathBuf,
        /// Give up after this many seconds.
        #[arg(long, default_value_t = 60)]
        max_secs: u64,
    },
    /// Enroll a face from an image file or a frame directory.
    #[command(group(ArgGroup::new("input").required(true).args(["image", "frames"])))]
    Enroll {
        #[arg(long)]
        user: String,
        /// Room the person may open; repeat for several.
        #[arg(long = "room", required = true)]
        rooms: Vec<String>,
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        frames: Option<PathBuf>,
    },
    /// Unlock (or lock) door devices by ID.
    Unlock {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long)]
        lock: bool,
    },
}

impl Cli {
    fn api(&self) -> Result<ApiClient> {
        ApiClient::new(ApiConfig {
            base_url: self.api_url.clone(),
            auth_token: self.token.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
        .context("failed to build HTTP client")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let quality = cli.jpeg_quality.clamp(1, 100);

    match &cli.command {
        Command::Check { images } => check::run(images),
        Command::Verify {
            room,
            frames,
            max_secs,
        } => verify::run(cli.api()?, room, frames, Duration::from_secs(*max_secs), quality).await,
        Command::Enroll {
            user,
            rooms,
            image,
            frames,
        } => {
            let input = match (image, frames) {
                (Some(path), _) => enroll::Input::Image(path.clone()),
                (None, Some(dir)) => enroll::Input::Frames(dir.clone()),
                (None, None) => bail!("either --image or --frames is required"),
            };
            enroll::run(&cli.api()?, user, rooms, input, quality).await
        }
        Command::Unlock { ids, lock } => {
            let action = if *lock { DoorAction::Lock } else { DoorAction::Unlock };
            let reports = doors::control_many(&cli.api()?, ids, action).await;
            let failed = reports.iter().filter(|r| !r.success).count();
            for report in &reports {
                println!("{}", serde_json::to_string(report)?);
            }
            if failed > 0 {
                bail!("{failed} of {} doors failed to {action}", reports.len());
            }
            Ok(())
        }
    }
}
