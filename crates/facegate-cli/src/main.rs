use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use facegate_core::{
    GalleryStore, OnnxEmbedder, Orchestrator, RecordId, SqliteGallery, StaticPresence,
    TimestampLabels,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facegate", about = "Face enrollment and recognition against a local gallery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll the face in an image under a generated identity
    Enroll {
        /// Image file containing one face
        image: PathBuf,
        /// Verdict from the upstream face detector (`true` or `false`)
        #[arg(long, required = true, action = ArgAction::Set)]
        face_present: bool,
    },
    /// Identify the face in an image against the gallery
    Recognize {
        image: PathBuf,
        /// Override the configured similarity threshold
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Verdict from the upstream face detector (`true` or `false`)
        #[arg(long, required = true, action = ArgAction::Set)]
        face_present: bool,
    },
    /// List enrolled records
    List,
    /// Remove an enrolled record
    Remove {
        /// Record ID to remove
        id: String,
    },
    /// Show configuration and gallery status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(?config, "configuration loaded");

    let gallery = Arc::new(
        SqliteGallery::open(&config.db_path, config.scan_policy)
            .with_context(|| format!("opening gallery {}", config.db_path.display()))?,
    );

    match cli.command {
        Commands::Enroll {
            image,
            face_present,
        } => {
            let image = load_image(&image)?;
            let orchestrator = build_orchestrator(&config, gallery, face_present)?;
            let outcome = orchestrator.enroll(&image).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Recognize {
            image,
            threshold,
            face_present,
        } => {
            let image = load_image(&image)?;
            let orchestrator = build_orchestrator(&config, gallery, face_present)?;
            let threshold = threshold.unwrap_or(orchestrator.threshold());
            let outcome = orchestrator
                .recognize_with_threshold(&image, threshold)
                .await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::List => {
            let snapshot = gallery.scan()?;
            for record in &snapshot {
                println!(
                    "{}",
                    serde_json::json!({
                        "id": record.id,
                        "identity": record.identity,
                        "created_at": record.created_at,
                    })
                );
            }
            if snapshot.is_empty() {
                eprintln!("No faces enrolled");
            }
        }
        Commands::Remove { id } => {
            if gallery.remove(&RecordId::from(id.clone()))? {
                println!("Removed {id}");
            } else {
                anyhow::bail!("no record with id {id}");
            }
        }
        Commands::Status => {
            let records = gallery.scan()?.len();
            println!(
                "{}",
                serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "model_path": config.model_path,
                    "model_present": config.model_path.exists(),
                    "db_path": config.db_path,
                    "records": records,
                    "similarity_threshold": config.similarity_threshold,
                    "scan_policy": format!("{:?}", config.scan_policy).to_lowercase(),
                })
            );
        }
    }

    Ok(())
}

fn load_image(path: &Path) -> Result<image::RgbImage> {
    let decoded = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    Ok(decoded.to_rgb8())
}

/// Load the model, start the engine, and wire the pipeline.
fn build_orchestrator(
    config: &Config,
    gallery: Arc<SqliteGallery>,
    face_present: bool,
) -> Result<Orchestrator> {
    let embedder = OnnxEmbedder::load(&config.model_path, config.intra_threads)
        .with_context(|| format!("loading model {}", config.model_path.display()))?;
    let engine = facegate_core::spawn_engine(embedder, config.inference_timeout())
        .context("spawning inference engine")?;

    Ok(Orchestrator::new(
        engine,
        gallery,
        Arc::new(StaticPresence(face_present)),
        Arc::new(TimestampLabels::new()),
    )
    .with_threshold(config.similarity_threshold))
}
