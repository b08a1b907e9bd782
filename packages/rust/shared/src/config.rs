//! Application configuration for SellerReport.
//!
//! User config lives at `~/.sellerreport/sellerreport.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sellerreport.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sellerreport";

// ---------------------------------------------------------------------------
// Config structs (matching sellerreport.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Document and blob storage locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Request pacing.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Wildberries endpoints and credentials.
    #[serde(default)]
    pub wb: WbConfig,

    /// Sheet label translation.
    #[serde(default)]
    pub labels: LabelsConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the job database and blob buckets.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Path of the libSQL job database.
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("reports.db")
    }

    /// Root directory of the blob buckets.
    pub fn blob_root(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("blobs")
    }
}

fn default_data_dir() -> String {
    "var".into()
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent sent with every request. Catalog pages reject obvious bots.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_1) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/39.0.2171.95 Safari/537.36"
        .into()
}

/// `[pacing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Minimum ms between two requests issued by one fetcher.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

fn default_min_interval_ms() -> u64 {
    1000
}

/// `[wb]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WbConfig {
    /// Name of the env var holding the statistics API key (never store the key itself).
    #[serde(default = "default_wb_api_key_env")]
    pub api_key_env: String,

    /// Paginated realization report endpoint.
    #[serde(default = "default_wb_stats_url")]
    pub stats_url: String,

    /// Product page template; `{nm_id}` is replaced with the item id.
    #[serde(default = "default_wb_catalog_url")]
    pub catalog_url: String,

    /// Rows requested per page.
    #[serde(default = "default_wb_page_limit")]
    pub page_limit: u32,
}

impl Default for WbConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_wb_api_key_env(),
            stats_url: default_wb_stats_url(),
            catalog_url: default_wb_catalog_url(),
            page_limit: default_wb_page_limit(),
        }
    }
}

fn default_wb_api_key_env() -> String {
    "WB_API_KEY".into()
}
fn default_wb_stats_url() -> String {
    "https://suppliers-stats.wildberries.ru/api/v1/supplier/reportDetailByPeriod".into()
}
fn default_wb_catalog_url() -> String {
    "https://www.wildberries.ru/catalog/{nm_id}/detail.aspx".into()
}
fn default_wb_page_limit() -> u32 {
    1000
}

/// `[labels]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelsConfig {
    /// Locale used for sheet headers.
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Optional JSON dictionary `{field: {locale: label}}` merged over the built-in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary_path: Option<String>,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            dictionary_path: None,
        }
    }
}

fn default_locale() -> String {
    "ru".into()
}

// ---------------------------------------------------------------------------
// Source settings (runtime, resolved from config + environment)
// ---------------------------------------------------------------------------

/// Runtime settings handed to every report source built for a run.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Minimum spacing between requests of one fetcher.
    pub min_interval: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
    /// Wildberries settings.
    pub wb: WbSettings,
}

/// Resolved Wildberries settings.
#[derive(Debug, Clone)]
pub struct WbSettings {
    /// API key read from the configured env var, if set.
    pub api_key: Option<String>,
    /// Name of the env var the key came from, for error messages.
    pub api_key_env: String,
    pub stats_url: String,
    pub catalog_url: String,
    pub page_limit: u32,
}

impl From<&AppConfig> for SourceSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.pacing.min_interval_ms),
            timeout: Duration::from_secs(config.http.timeout_secs),
            user_agent: config.http.user_agent.clone(),
            wb: WbSettings {
                api_key: wb_api_key(config).ok(),
                api_key_env: config.wb.api_key_env.clone(),
                stats_url: config.wb.stats_url.clone(),
                catalog_url: config.wb.catalog_url.clone(),
                page_limit: config.wb.page_limit,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sellerreport/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ReportError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sellerreport/sellerreport.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| ReportError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReportError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| ReportError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReportError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check endpoint URLs and limits that would otherwise fail mid-run.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    url::Url::parse(&config.wb.stats_url)
        .map_err(|e| ReportError::config(format!("wb.stats_url is not a URL: {e}")))?;
    if !config.wb.catalog_url.contains("{nm_id}") {
        return Err(ReportError::config(
            "wb.catalog_url must contain the {nm_id} placeholder",
        ));
    }
    if config.wb.page_limit == 0 {
        return Err(ReportError::config("wb.page_limit must be greater than 0"));
    }
    Ok(())
}

/// Read the Wildberries API key from the configured env var.
pub fn wb_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.wb.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ReportError::config(format!(
            "Wildberries API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("WB_API_KEY"));
        assert!(toml_str.contains("min_interval_ms"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pacing.min_interval_ms, 1000);
        assert_eq!(parsed.wb.page_limit, 1000);
        assert_eq!(parsed.labels.locale, "ru");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/reports"

[labels]
locale = "en"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.storage.database_path(), PathBuf::from("/tmp/reports/reports.db"));
        assert_eq!(config.storage.blob_root(), PathBuf::from("/tmp/reports/blobs"));
        assert_eq!(config.labels.locale, "en");
        assert_eq!(config.http.timeout_secs, 30);
    }

    #[test]
    fn source_settings_from_app_config() {
        let mut app = AppConfig::default();
        app.pacing.min_interval_ms = 250;
        app.wb.api_key_env = "SR_TEST_NONEXISTENT_KEY_12345".into();
        let settings = SourceSettings::from(&app);
        assert_eq!(settings.min_interval, Duration::from_millis(250));
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert!(settings.wb.api_key.is_none());
    }

    #[test]
    fn catalog_template_is_validated() {
        let mut config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        config.wb.catalog_url = "https://example.com/catalog".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("{nm_id}"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.wb.api_key_env = "SR_TEST_NONEXISTENT_KEY_67890".into();
        let result = wb_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
