//! Configuration types for the background removal server

use crate::error::{RemovalError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Port the server listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 8008;

/// Upper bound for one image download
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for establishing the download connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Inference engine used to run the segmentation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// ONNX Runtime backend
    Onnx,
    /// Pure Rust Tract backend
    Tract,
}

impl Default for BackendType {
    fn default() -> Self {
        #[cfg(feature = "onnx")]
        {
            Self::Onnx
        }
        #[cfg(not(feature = "onnx"))]
        {
            Self::Tract
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Parse a `backend:provider` string such as `onnx:auto` or `tract:cpu`
///
/// A bare backend name selects that backend's default provider.
///
/// # Errors
/// - Unknown backend or provider name
pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
    let provider_str = provider_str.trim().to_lowercase();
    if let Some((backend, provider)) = provider_str.split_once(':') {
        match backend {
            "onnx" => {
                let execution_provider = match provider {
                    "auto" => ExecutionProvider::Auto,
                    "cpu" => ExecutionProvider::Cpu,
                    "cuda" => ExecutionProvider::Cuda,
                    "coreml" => ExecutionProvider::CoreMl,
                    _ => {
                        return Err(RemovalError::invalid_config(format!(
                            "Unknown ONNX provider: {}. Supported: auto, cpu, cuda, coreml",
                            provider
                        )));
                    },
                };
                Ok((BackendType::Onnx, execution_provider))
            },
            "tract" => match provider {
                "cpu" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(RemovalError::invalid_config(format!(
                    "Unknown Tract provider: {}. Tract only supports 'cpu'",
                    provider
                ))),
            },
            _ => Err(RemovalError::invalid_config(format!(
                "Unknown backend: {}. Supported backends: onnx, tract",
                backend
            ))),
        }
    } else {
        match provider_str.as_str() {
            "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
            "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            _ => Err(RemovalError::invalid_config(
                "Invalid provider format. Use backend:provider (e.g., onnx:auto, tract:cpu)",
            )),
        }
    }
}

/// Configuration for loading and running the segmentation model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovalConfig {
    /// Expected SHA-256 of the model file, verified on startup
    pub model_sha256: Option<String>,

    /// Inference engine
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use rembg_server::{BackendType, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .backend_type(BackendType::Tract)
    ///     .num_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.intra_threads, 4);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Execution provider not supported by the chosen backend
    /// - Malformed SHA-256 digest
    pub fn validate(&self) -> Result<()> {
        if self.backend_type == BackendType::Tract
            && !matches!(
                self.execution_provider,
                ExecutionProvider::Cpu | ExecutionProvider::Auto
            )
        {
            return Err(RemovalError::invalid_config(format!(
                "Tract backend only supports CPU execution, got '{}'",
                self.execution_provider
            )));
        }

        if let Some(digest) = &self.model_sha256 {
            let digest = digest.trim();
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(RemovalError::invalid_config(
                    "Model SHA-256 must be 64 hexadecimal characters",
                ));
            }
        }

        Ok(())
    }
}

/// Builder for [`RemovalConfig`]
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn model_sha256<S: Into<String>>(mut self, digest: Option<S>) -> Self {
        self.config.model_sha256 = digest.map(Into::into);
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set intra-op threads; inter-op threads follow at half (minimum 1)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Validation failures, see [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: IpAddr,

    /// TCP port to bind
    pub port: u16,

    /// Directory served under `/static`
    pub static_dir: PathBuf,

    /// Directory holding `index.html`
    pub templates_dir: PathBuf,

    /// Total time allowed for one image download
    pub fetch_timeout: Duration,

    /// Time allowed to establish the download connection
    pub connect_timeout: Duration,

    /// Log the base64 result at DEBUG level
    pub log_payloads: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("static"),
            templates_dir: PathBuf::from("templates"),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            log_payloads: false,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Address the listener binds to
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Zero fetch or connect timeout
    pub fn validate(&self) -> Result<()> {
        if self.fetch_timeout.is_zero() {
            return Err(RemovalError::invalid_config("Fetch timeout must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(RemovalError::invalid_config(
                "Connect timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Builder for [`ServerConfig`]
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn host(mut self, host: IpAddr) -> Self {
        self.config.host = host;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub fn static_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.static_dir = dir.into();
        self
    }

    #[must_use]
    pub fn templates_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.templates_dir = dir.into();
        self
    }

    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn log_payloads(mut self, enabled: bool) -> Self {
        self.config.log_payloads = enabled;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Validation failures, see [`ServerConfig::validate`]
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
