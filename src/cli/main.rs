//! rembg server CLI
//!
//! Parses process options, prepares the segmentation model and runs the HTTP
//! server until it receives a shutdown signal.

use crate::{
    cache::{format_size, ModelCache},
    config::{parse_provider_string, RemovalConfig, ServerConfig, DEFAULT_PORT},
    download::ModelDownloader,
    fetch::HttpImageFetcher,
    models::{ModelManager, SegmentationModel},
    processor::{BackendFactory, BackgroundRemovalProcessor, DefaultBackendFactory},
    remover::ModelRemover,
    server::{self, AppState},
    service::RemovalService,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, Instrument};

/// HTTP service that removes image backgrounds
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "rembg-server")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory served under /static
    #[arg(long, value_name = "DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Directory holding index.html
    #[arg(long, value_name = "DIR", default_value = "templates")]
    pub templates_dir: PathBuf,

    /// Segmentation model (u2net, u2netp, silueta, isnet-general-use)
    #[arg(short, long, default_value = "u2net")]
    pub model: SegmentationModel,

    /// Explicit ONNX model file; skips the model cache and download
    #[arg(long, value_name = "FILE")]
    pub model_path: Option<PathBuf>,

    /// Expected SHA-256 digest of the model file
    #[arg(long, value_name = "HEX")]
    pub model_sha256: Option<String>,

    /// Model download directory (defaults to $U2NET_HOME or ~/.u2net)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Execution provider in format backend:provider (e.g., onnx:auto, onnx:cuda, tract:cpu)
    #[arg(short, long, default_value = "onnx:auto")]
    pub execution_provider: String,

    /// Number of inference threads (0 = auto-detect optimal threading)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Seconds allowed for downloading one image
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub fetch_timeout: u64,

    /// Log the base64 result of every request at DEBUG level
    #[arg(long)]
    pub log_payloads: bool,

    /// Log output format (console, compact, json)
    #[arg(long, default_value = "console")]
    pub log_format: TracingFormat,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,
}

impl Cli {
    fn model_cache(&self) -> Result<ModelCache> {
        match &self.cache_dir {
            Some(dir) => ModelCache::with_custom_cache_dir(dir)
                .with_context(|| format!("Failed to use cache directory {}", dir.display())),
            None => ModelCache::new().context("Failed to initialize model cache"),
        }
    }

    fn server_config(&self) -> Result<ServerConfig> {
        ServerConfig::builder()
            .host(self.host)
            .port(self.port)
            .static_dir(&self.static_dir)
            .templates_dir(&self.templates_dir)
            .fetch_timeout(Duration::from_secs(self.fetch_timeout))
            .log_payloads(self.log_payloads)
            .build()
            .context("Invalid server configuration")
    }

    /// Model settings, validated before any model file is touched
    fn removal_config(&self) -> Result<RemovalConfig> {
        let (backend_type, execution_provider) = parse_provider_string(&self.execution_provider)
            .context("Invalid --execution-provider")?;

        RemovalConfig::builder()
            .model_sha256(self.model_sha256.clone())
            .backend_type(backend_type)
            .execution_provider(execution_provider)
            .num_threads(self.threads)
            .build()
            .context("Invalid model configuration")
    }
}

/// Main entry point for the server binary
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.log_format).context("Failed to initialize logging")?;
    debug!(?cli, "Parsed command line");

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    if cli.list_models {
        return list_cached_models(&cli);
    }

    run(cli).await
}

async fn run(cli: Cli) -> Result<()> {
    let server_config = cli.server_config()?;
    let config = cli.removal_config()?;
    let backend_type = config.backend_type;

    let loading_span =
        spans::model_loading(cli.model.name(), &config.execution_provider.to_string());
    let remover = async {
        let model_manager = resolve_model(&cli, config.model_sha256.as_deref()).await?;

        let start = Instant::now();
        let processor = tokio::task::spawn_blocking(move || {
            let mut processor = BackgroundRemovalProcessor::new(config, model_manager)?;
            processor.initialize()?;
            Ok::<_, crate::error::RemovalError>(processor)
        })
        .await
        .context("Model loading task failed")?
        .context("Failed to load segmentation model")?;

        info!(
            backend = %backend_type,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model ready"
        );

        ModelRemover::new(processor).context("Failed to prepare background remover")
    }
    .instrument(loading_span)
    .await?;

    let fetcher = HttpImageFetcher::with_timeouts(
        server_config.fetch_timeout,
        server_config.connect_timeout,
    )
    .context("Failed to create HTTP client")?;

    let service = RemovalService::new(Arc::new(fetcher), Arc::new(remover))
        .with_payload_logging(server_config.log_payloads);
    let state = AppState::new(service, &server_config.templates_dir);

    let session_id = uuid::Uuid::new_v4().to_string();
    let server_span = spans::server(&session_id, cli.model.name(), &backend_type.to_string());

    server::serve(&server_config, state)
        .instrument(server_span)
        .await
        .context("Server failed")
}

/// Find the model file, downloading it into the cache when needed
async fn resolve_model(cli: &Cli, expected_sha: Option<&str>) -> Result<ModelManager> {
    let path = if let Some(path) = &cli.model_path {
        if !ModelDownloader::verify_file_integrity(path, expected_sha)? {
            anyhow::bail!(
                "Model file {} does not match the expected SHA-256 digest",
                path.display()
            );
        }
        path.clone()
    } else {
        let downloader = ModelDownloader::new(cli.model_cache()?)?;
        downloader
            .ensure_model(cli.model, expected_sha, true)
            .await
            .with_context(|| format!("Failed to obtain model '{}'", cli.model))?
    };

    info!(model = %cli.model, path = %path.display(), "Using model file");
    ModelManager::new(cli.model, &path).context("Failed to open model file")
}

fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");
    println!("------------------------------------------");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    let backends: Vec<String> = DefaultBackendFactory
        .available_backends()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("Compiled backends: {}", backends.join(", "));

    #[cfg(feature = "onnx")]
    {
        println!("\nonnx: ONNX Runtime backend (default)");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  - {}: {} - {}", name.to_lowercase(), status, description);
        }
    }

    #[cfg(feature = "tract")]
    {
        println!("\ntract: pure Rust backend");
        for (name, available, description) in crate::backends::TractBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  - {}: {} - {}", name.to_lowercase(), status, description);
        }
    }

    println!("\nUsage examples:");
    println!("  --execution-provider onnx:auto    # Best available ONNX provider (default)");
    println!("  --execution-provider onnx:cuda    # NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Apple CoreML");
    println!("  --execution-provider tract:cpu    # Pure Rust CPU inference");
}

fn list_cached_models(cli: &Cli) -> Result<()> {
    let cache = cli.model_cache()?;
    println!("Cache directory: {}", cache.cache_dir().display());

    let models = cache.cached_models();
    if models.is_empty() {
        println!("No cached models found. The selected model is downloaded on first start.");
        return Ok(());
    }

    for model in models {
        let path = cache.model_path(model);
        let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        println!("  {:<18} {:>10}  {}", model.name(), format_size(size), path.display());
    }
    Ok(())
}
