use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use likeness_core::{CapabilityError, FilesystemGallery, MatchingEngine, ProbeImage};
use likeness_remote::DeepFaceClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod output;
mod worker;

use config::Config;
use worker::EngineHandle;

#[derive(Parser)]
#[command(name = "likeness", about = "Enroll faces and identify them against a local gallery")]
struct Cli {
    /// Gallery directory (overrides LIKENESS_GALLERY_DIR)
    #[arg(long, global = true)]
    gallery: Option<PathBuf>,

    /// Face service base URL (overrides LIKENESS_SERVICE_URL)
    #[arg(long, global = true)]
    service: Option<String>,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a face to the gallery, replacing any image with the same label
    Enroll {
        /// Name to enroll the face under (whitespace becomes "_")
        #[arg(short, long)]
        label: String,
        /// Image file containing the face
        image: PathBuf,
    },
    /// Estimate age, gender and emotion and find the matching identity
    Identify {
        /// Image files to identify, processed in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// List enrolled faces
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(dir) = cli.gallery {
        config.gallery_dir = dir;
    }
    if let Some(url) = cli.service {
        config.service_url = url;
    }
    tracing::debug!(
        gallery = %config.gallery_dir.display(),
        service = %config.service_url,
        "configuration loaded"
    );

    let engine = start_engine(&config).await?;

    match cli.command {
        Commands::Enroll { label, image } => {
            let probe = load_probe(&image)?;
            let entry = engine
                .enroll(label, probe)
                .await
                .with_context(|| format!("cannot enroll {}", image.display()))?;
            if cli.json {
                println!("{}", serde_json::to_string(&entry)?);
            } else {
                println!("{}", output::enrolled_text(&entry));
            }
        }
        Commands::Identify { images } => {
            let total = images.len();
            let mut failures = 0usize;
            for image in &images {
                match identify_one(&engine, image, cli.json).await {
                    Ok(()) => {}
                    Err(err) => {
                        failures += 1;
                        eprintln!("{}: {err:#}", image.display());
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{failures} of {total} identification request(s) failed");
            }
        }
        Commands::List => {
            let entries = engine.list().await?;
            if cli.json {
                println!("{}", serde_json::to_string(&entries)?);
            } else {
                println!("{}", output::entries_text(&entries));
            }
        }
    }

    Ok(())
}

async fn start_engine(config: &Config) -> Result<EngineHandle> {
    let gallery_dir = config.gallery_dir.clone();
    let remote = config.remote_config();
    let options = config.engine_options();

    let handle = worker::spawn_engine(move || -> Result<_, CapabilityError> {
        let client = Arc::new(DeepFaceClient::new(remote)?);
        Ok(
            MatchingEngine::new(FilesystemGallery::new(gallery_dir), client.clone(), client)
                .with_options(options),
        )
    })
    .await
    .context("face engine failed to start")?;
    Ok(handle)
}

fn load_probe(path: &Path) -> Result<ProbeImage> {
    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let probe = ProbeImage::decode(&bytes).with_context(|| format!("cannot use {}", path.display()))?;
    Ok(probe)
}

async fn identify_one(engine: &EngineHandle, image: &Path, json: bool) -> Result<()> {
    let probe = load_probe(image)?;
    let result = engine.identify(probe).await?;
    if json {
        println!("{}", output::identification_json(image, &result)?);
    } else {
        println!("{}", output::identification_text(image, &result));
    }
    Ok(())
}
