use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anthropo::{
    config::{self, Config},
    dataset, Batch, InferenceAdapter, OnnxClassifier, OutputPolicy, RecordKind, Schema,
};
use anthropo_vision::{ClassicalDetector, FaceDetector, LandmarkSource, MeshDetector};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser)]
#[command(name = "anthropo")]
#[command(
    version,
    about = "Facial anthropometry: landmark datasets, distance features and classifier serving"
)]
struct Cli {
    /// Config file (defaults to the installed location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect landmarks in a folder of images and append labelled rows to a CSV
    Extract {
        /// Folder of images
        folder: PathBuf,
        /// Class label for every image in the folder (0 or 1)
        #[arg(short, long)]
        label: u8,
        /// Output CSV
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Schema::Mesh)]
        schema: Schema,
        /// Write raw coordinates or derived distances
        #[arg(short, long, value_enum, default_value_t = RecordKind::Features)]
        mode: RecordKind,
        /// Keep existing rows instead of recreating the output
        #[arg(short, long)]
        append: bool,
    },
    /// Turn a raw landmark CSV into a distance feature CSV
    Measure {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Schema::Mesh)]
        schema: Schema,
        #[arg(short, long)]
        append: bool,
    },
    /// Serve the extraction and prediction endpoints
    Serve {
        /// Listen address, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract {
            folder,
            label,
            output,
            schema,
            mode,
            append,
        } => extract(&cfg, &folder, label, &output, schema, mode, policy(append)),
        Commands::Measure {
            input,
            output,
            schema,
            append,
        } => measure(&input, &output, schema, policy(append)),
        Commands::Serve { bind } => serve(&cfg, bind),
        Commands::Config => open_config(&cfg, cli.config.as_deref()),
    }
}

fn policy(append: bool) -> OutputPolicy {
    if append {
        OutputPolicy::Append
    } else {
        OutputPolicy::Recreate
    }
}

fn landmark_source(cfg: &Config, schema: Schema) -> Result<Box<dyn LandmarkSource + Send>> {
    let faces = FaceDetector::from_file(
        &cfg.models.face_detector,
        cfg.detection.score_threshold,
        cfg.detection.nms_threshold,
    )
    .context("Failed to initialize face detector")?;

    let source: Box<dyn LandmarkSource + Send> = match schema {
        Schema::Classical => Box::new(ClassicalDetector::new(faces, &cfg.models.landmarks68)?),
        Schema::Mesh => Box::new(MeshDetector::new(faces, &cfg.models.face_mesh)?),
    };
    Ok(source)
}

fn extract(
    cfg: &Config,
    folder: &Path,
    label: u8,
    output: &Path,
    schema: Schema,
    mode: RecordKind,
    policy: OutputPolicy,
) -> Result<()> {
    let source = landmark_source(cfg, schema)?;
    let mut batch = Batch::new(source, schema, mode)?.with_extensions(cfg.batch.extensions.clone());
    let report = batch.run(folder, label, output, policy)?;

    info!(
        "✓ {} of {} image(s) written to {}",
        report.written,
        report.total(),
        output.display()
    );
    Ok(())
}

fn measure(input: &Path, output: &Path, schema: Schema, policy: OutputPolicy) -> Result<()> {
    let n = dataset::measure_file(input, output, schema, policy)
        .with_context(|| format!("Failed to measure {}", input.display()))?;
    info!("✓ {} sample(s) measured into {}", n, output.display());
    Ok(())
}

fn serve(cfg: &Config, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid listen address: {}", bind))?;

    let schema = cfg.server.schema;
    let source = landmark_source(cfg, schema)?;
    let classifier = OnnxClassifier::from_file(&cfg.models.classifier)?;
    let adapter = InferenceAdapter::new(schema, cfg.server.expected_features, Box::new(classifier));
    let state = anthropo::server::AppState::new(source, adapter);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(anthropo::server::serve(addr, state))?;
    Ok(())
}

fn open_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(cfg, Some(config_path)).context("Failed to write default config")?;
        info!("Wrote default config to {:?}", config_path);
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
