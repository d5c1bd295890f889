use serde::Deserialize;

use crate::infrastructure::database::DatabaseConfig;
use crate::infrastructure::kafka_producer::KafkaConfig;

/// Config はアプリケーション全体の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub catalog_api: Option<CatalogApiConfig>,
}

impl Config {
    /// YAML ファイルから設定を読み込む。
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path, e))?;
        let cfg: Config = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }
}

/// AppConfig はアプリケーション設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_environment() -> String {
    "dev".to_string()
}

/// ServerConfig はサーバー設定。
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// TelemetryConfig はログ出力の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "json" または "text"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// ImportConfig はバッチインポート固有の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: usize,
    #[serde(default = "default_max_rows_per_import")]
    pub max_rows_per_import: i64,
    /// 1 行あたりの商品作成呼び出しのタイムアウト。
    #[serde(default = "default_apply_timeout_ms")]
    pub apply_timeout_ms: u64,
    /// 連続してこの回数だけ適用に失敗（タイムアウト・接続不可）したらジョブを failed にする。0 で無効。
    #[serde(default = "default_max_consecutive_apply_failures")]
    pub max_consecutive_apply_failures: u32,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: String,
}

fn default_max_file_size_mb() -> usize {
    10
}

fn default_max_rows_per_import() -> i64 {
    100_000
}

fn default_apply_timeout_ms() -> u64 {
    10_000
}

fn default_max_consecutive_apply_failures() -> u32 {
    5
}

fn default_storage_dir() -> String {
    "data/batch-imports".to_string()
}

fn default_catalog_dir() -> String {
    "catalogs".to_string()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            max_rows_per_import: default_max_rows_per_import(),
            apply_timeout_ms: default_apply_timeout_ms(),
            max_consecutive_apply_failures: default_max_consecutive_apply_failures(),
            storage_dir: default_storage_dir(),
            catalog_dir: default_catalog_dir(),
        }
    }
}

impl ImportConfig {
    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_mb * 1024 * 1024
    }
}

/// CatalogApiConfig は商品作成 API の接続先。
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogApiConfig {
    pub base_url: String,
    #[serde(default = "default_catalog_api_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_catalog_api_timeout_ms() -> u64 {
    5_000
}
