use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use image_upload_bridge::app::UploadBridge;
use image_upload_bridge::image::mime::sniff_image_mime;
use image_upload_bridge::image::{
    ImageResizer, ImageService, PoolConfig, RasterFormat, ResizePool, ResizerConfig,
};
use image_upload_bridge::models::{Config, ProcessingRequest, SourceFile, Strategy};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-upload-bridge")]
#[command(about = "Resize, compress and store uploaded images")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Resize and re-encode a single image.
    Resize {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        /// Output path. Defaults to `<stem>-resized.<ext>` next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        options: ResizeOptions,
    },
    /// Resize several images concurrently into a directory.
    Batch {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
        #[command(flatten)]
        options: ResizeOptions,
    },
    /// Upload a file (or a base64 data URL) and print the receipt.
    Upload {
        #[arg(value_name = "INPUT")]
        input: String,
        /// Name recorded in the receipt. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Debug, clap::Args)]
struct ResizeOptions {
    #[arg(long, value_parser = parse_strategy_arg)]
    strategy: Option<Strategy>,
    #[arg(long)]
    max_dimension: Option<u32>,
    #[arg(long, value_parser = parse_quality_arg)]
    quality: Option<f32>,
    /// Target MIME type, e.g. image/webp.
    #[arg(long)]
    format: Option<String>,
}

impl ResizeOptions {
    fn request(&self, config: &Config, bytes: Vec<u8>, mime_type: &str) -> ProcessingRequest {
        ProcessingRequest::new(bytes, mime_type)
            .with_strategy(self.strategy.unwrap_or(config.strategy))
            .with_max_dimension(self.max_dimension.unwrap_or(config.max_dimension))
            .with_quality(self.quality.unwrap_or(config.image_quality))
            .with_target_mime_type(self.format.clone().or_else(|| config.output_format.clone()))
    }
}

fn parse_strategy_arg(input: &str) -> std::result::Result<Strategy, String> {
    input.parse::<Strategy>().map_err(|_| {
        format!(
            "Invalid strategy '{}'. Expected one of: speed, balanced, quality",
            input
        )
    })
}

fn parse_quality_arg(input: &str) -> std::result::Result<f32, String> {
    match input.parse::<f32>() {
        Ok(q) if (0.0..=1.0).contains(&q) => Ok(q),
        _ => Err(format!(
            "Invalid quality '{}'. Expected a number between 0 and 1",
            input
        )),
    }
}

fn document_mime(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "txt" => Some("text/plain"),
        "md" | "markdown" => Some("text/markdown"),
        "csv" => Some("text/csv"),
        "json" => Some("application/json"),
        _ => None,
    }
}

fn output_path(input: &Path, out_dir: Option<&Path>, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    match out_dir {
        Some(dir) => dir.join(format!("{}.{}", stem, extension)),
        None => input.with_file_name(format!("{}-resized.{}", stem, extension)),
    }
}

async fn read_image(path: &Path) -> Result<(Vec<u8>, &'static str)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mime_type = sniff_image_mime(&bytes)
        .ok_or_else(|| anyhow!("{} is not a supported image", path.display()))?;
    Ok((bytes, mime_type))
}

fn extension_for(mime_type: &str) -> &'static str {
    RasterFormat::from_mime(mime_type)
        .map(|f| f.extension())
        .unwrap_or("bin")
}

async fn run_resize(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    options: &ResizeOptions,
) -> Result<()> {
    let (bytes, mime_type) = read_image(input).await?;
    let resizer = ImageResizer::new(ResizerConfig::from_config(config));
    let result = resizer
        .resize(options.request(config, bytes, mime_type))
        .await?;

    let output = output
        .unwrap_or_else(|| output_path(input, None, extension_for(&result.mime_type)));
    tokio::fs::write(&output, &result.encoded_bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "{} -> {} ({}, {} -> {} bytes, {:.1}% smaller)",
        input.display(),
        output.display(),
        result.dimensions,
        result.original_size,
        result.encoded_size,
        result.reduction_percent()
    );
    Ok(())
}

async fn run_batch(
    config: &Config,
    inputs: &[PathBuf],
    out_dir: &Path,
    options: &ResizeOptions,
) -> Result<()> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut requests = Vec::with_capacity(inputs.len());
    for input in inputs {
        let (bytes, mime_type) = read_image(input).await?;
        requests.push(options.request(config, bytes, mime_type));
    }

    let service: Arc<dyn ImageService> =
        Arc::new(ImageResizer::new(ResizerConfig::from_config(config)));
    let pool = ResizePool::new(service, PoolConfig::from_config(config));
    let results = pool.process_batch(requests).await;

    let mut failed = 0;
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(result) => {
                let output = output_path(input, Some(out_dir), extension_for(&result.mime_type));
                tokio::fs::write(&output, &result.encoded_bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                info!("{} -> {} ({})", input.display(), output.display(), result.dimensions);
            }
            Err(e) => {
                error!("Failed to resize {}: {}", input.display(), e);
                failed += 1;
            }
        }
    }

    info!("Batch finished: {}", pool.service().compression_stats());
    if failed > 0 {
        return Err(anyhow!("{} of {} images failed", failed, inputs.len()));
    }
    Ok(())
}

async fn run_upload(config: &Config, input: &str, name: Option<String>) -> Result<()> {
    let file = if input.starts_with("data:") {
        SourceFile::from_data_url(input, name.unwrap_or_else(|| "upload".to_string()))?
    } else {
        let path = Path::new(input);
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mime_type = sniff_image_mime(&bytes)
            .or_else(|| document_mime(path))
            .ok_or_else(|| anyhow!("Cannot determine the type of {}", path.display()))?;
        let name = name.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.to_string())
        });
        SourceFile::new(bytes, mime_type, name)
    };

    let bridge = UploadBridge::from_config(config).await?;
    let receipt = bridge.upload(file).await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_upload_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = match &args.command {
        Command::Resize {
            input,
            output,
            options,
        } => run_resize(&config, input, output.clone(), options).await,
        Command::Batch {
            inputs,
            out_dir,
            options,
        } => run_batch(&config, inputs, out_dir, options).await,
        Command::Upload { input, name } => run_upload(&config, input, name.clone()).await,
    };

    if let Err(e) = outcome {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
