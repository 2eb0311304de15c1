use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub delivery: DeliveryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend: "s3" or "memory".
    pub backend: String,
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    #[serde(default)]
    pub path_style: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted payload size in bytes.
    pub max_size_bytes: u64,
    /// Closed allow-list of accepted video MIME types. Unrecognized types
    /// are rejected, not coerced.
    pub allowed_content_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Default window size in bytes for open-ended range requests.
    pub chunk_size_bytes: u64,
    pub cache_control: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. config/default.toml
    /// 2. config/{env}.toml (based on MOVIEVAULT_ENV)
    /// 3. Environment variables (MOVIEVAULT_* prefix)
    pub fn load() -> anyhow::Result<Self> {
        let default_path = Path::new("config/default.toml");
        let mut config: AppConfig = if default_path.exists() {
            let content = std::fs::read_to_string(default_path)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {}", default_path.display(), e))?;
            toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", default_path.display(), e))?
        } else {
            AppConfig::default()
        };

        // Layer 2: environment-specific overrides
        let env_name = std::env::var("MOVIEVAULT_ENV").unwrap_or_else(|_| "development".to_string());
        let env_path = format!("config/{}.toml", env_name);
        if let Ok(env_content) = std::fs::read_to_string(&env_path) {
            let env_config: AppConfig = toml::from_str(&env_content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", env_path, e))?;
            config = env_config;
        }

        // Layer 3: environment variable overrides (selected keys)
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(v) = std::env::var("MOVIEVAULT_SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                config.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_STORAGE_BACKEND") {
            config.storage.backend = v;
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_STORAGE_ENDPOINT") {
            config.storage.endpoint = v;
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_STORAGE_BUCKET") {
            config.storage.bucket = v;
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_STORAGE_ACCESS_KEY_ID") {
            config.storage.access_key_id = v;
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_STORAGE_SECRET_ACCESS_KEY") {
            config.storage.secret_access_key = v;
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_STORAGE_REGION") {
            config.storage.region = v;
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_UPLOAD_MAX_SIZE_BYTES") {
            if let Ok(n) = v.parse() {
                config.upload.max_size_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("MOVIEVAULT_OBSERVABILITY_LOG_LEVEL") {
            config.observability.log_level = v;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                backend: "s3".to_string(),
                endpoint: "http://localhost:9000".to_string(),
                bucket: "movievault-media".to_string(),
                access_key_id: String::new(),
                secret_access_key: String::new(),
                region: "us-east-1".to_string(),
                path_style: true,
                request_timeout_secs: 30,
            },
            upload: UploadConfig {
                max_size_bytes: 1_073_741_824, // 1 GiB
                allowed_content_types: vec![
                    "video/mp4".to_string(),
                    "video/quicktime".to_string(),
                    "video/x-msvideo".to_string(),
                    "video/x-ms-wmv".to_string(),
                    "video/x-matroska".to_string(),
                    "video/webm".to_string(),
                ],
            },
            delivery: DeliveryConfig {
                chunk_size_bytes: 1_000_000,
                cache_control: "no-cache".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "text".to_string(),
                metrics_enabled: true,
            },
        }
    }
}
