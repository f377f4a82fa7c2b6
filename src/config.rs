use dotenv::dotenv;
use std::env;
use std::path::PathBuf;

pub const CATALOG_URL_ENV_VAR: &str = "FLOUR_CATALOG_URL";
pub const CATALOG_API_KEY_ENV_VAR: &str = "FLOUR_CATALOG_API_KEY";
pub const DATA_DIR_ENV_VAR: &str = "FLOUR_DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Where catalog data comes from. The API key itself stays in the environment;
/// only the name of its variable is kept here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub base_url: Option<String>,
    pub api_key_env_var: String,
    pub data_dir: PathBuf,
}

impl CatalogConfig {
    /// Reads the configuration from the environment, loading `.env` first.
    pub fn from_env() -> Self {
        dotenv().ok();
        CatalogConfig {
            base_url: env::var(CATALOG_URL_ENV_VAR)
                .ok()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            api_key_env_var: CATALOG_API_KEY_ENV_VAR.to_string(),
            data_dir: env::var(DATA_DIR_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            base_url: None,
            api_key_env_var: CATALOG_API_KEY_ENV_VAR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}
