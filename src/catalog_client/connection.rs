use reqwest::Client;
use serde::de::DeserializeOwned;
use std::env;
use std::error::Error;
use std::fmt;
use tracing::{info, warn};

use super::endpoints::{table_query, table_url, ContributionRow, MaterialRow, RetryPolicy};
use crate::catalog::contribution::{ContributionTable, PropertyClass};
use crate::catalog::snapshot::CatalogSnapshot;
use crate::catalog::source::{resolve_sources, CatalogContext, OwnerFilter, SourceError};
use crate::config::CatalogConfig;
use crate::material::{Catalog, Material};

#[derive(Debug)]
pub enum CatalogClientError {
    MissingApiKey(String),
    MissingBaseUrl,
    NetworkError(reqwest::Error),
    SerializationError(serde_json::Error),
    ApiError {
        status: reqwest::StatusCode,
        error_body: String,
    },
    Source(SourceError),
}

impl fmt::Display for CatalogClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogClientError::MissingApiKey(key_name) => {
                write!(f, "API key not found in environment: {}", key_name)
            }
            CatalogClientError::MissingBaseUrl => write!(f, "No catalog URL configured"),
            CatalogClientError::NetworkError(err) => write!(f, "Network error: {}", err),
            CatalogClientError::SerializationError(err) => {
                write!(f, "Serialization error: {}", err)
            }
            CatalogClientError::ApiError { status, error_body } => {
                write!(f, "Catalog error {}: {}", status, error_body)
            }
            CatalogClientError::Source(err) => write!(f, "{}", err),
        }
    }
}

impl Error for CatalogClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CatalogClientError::NetworkError(err) => Some(err),
            CatalogClientError::SerializationError(err) => Some(err),
            CatalogClientError::Source(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CatalogClientError {
    fn from(err: reqwest::Error) -> Self {
        CatalogClientError::NetworkError(err)
    }
}

impl From<serde_json::Error> for CatalogClientError {
    fn from(err: serde_json::Error) -> Self {
        CatalogClientError::SerializationError(err)
    }
}

impl From<SourceError> for CatalogClientError {
    fn from(err: SourceError) -> Self {
        CatalogClientError::Source(err)
    }
}

impl CatalogClientError {
    /// Transport failures, rate limiting and server errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogClientError::NetworkError(_) => true,
            CatalogClientError::ApiError { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Reads catalog tables from the REST catalog service.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    base_url: String,
    api_key_env_var: String,
    retry: RetryPolicy,
    http: Client,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, api_key_env_var: impl Into<String>) -> Self {
        CatalogClient {
            base_url: base_url.into(),
            api_key_env_var: api_key_env_var.into(),
            retry: RetryPolicy::default(),
            http: Client::new(),
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogClientError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or(CatalogClientError::MissingBaseUrl)?;
        Ok(CatalogClient::new(base_url, config.api_key_env_var.clone()))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn api_key(&self) -> Result<String, CatalogClientError> {
        env::var(&self.api_key_env_var)
            .map_err(|_| CatalogClientError::MissingApiKey(self.api_key_env_var.clone()))
    }

    async fn fetch_rows_once<T: DeserializeOwned>(
        &self,
        api_key: &str,
        table: &str,
        owner: Option<&OwnerFilter>,
    ) -> Result<Vec<T>, CatalogClientError> {
        let response = self
            .http
            .get(table_url(&self.base_url, table))
            .query(&table_query(owner))
            .header("apikey", api_key)
            .bearer_auth(api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status().is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(CatalogClientError::ApiError { status, error_body })
        }
    }

    /// Reads every row of a table, retrying transient failures with backoff.
    pub async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        owner: Option<&OwnerFilter>,
    ) -> Result<Vec<T>, CatalogClientError> {
        let api_key = self.api_key()?;
        let mut attempt = 1;
        loop {
            match self.fetch_rows_once(&api_key, table, owner).await {
                Ok(rows) => return Ok(rows),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt - 1);
                    warn!(table, attempt, ?delay, "catalog read failed, retrying: {}", err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_contributions(
        &self,
        table: &str,
        class: PropertyClass,
        catalog: Catalog,
        owner: Option<&OwnerFilter>,
    ) -> Result<ContributionTable, CatalogClientError> {
        let rows: Vec<ContributionRow> = self.fetch_rows(table, owner).await?;
        Ok(ContributionTable::new(
            rows.into_iter().map(|row| row.into_record(class, catalog)),
        ))
    }

    /// Fetches the materials and both contribution tables of one catalog.
    pub async fn fetch_snapshot(&self, context: &CatalogContext) -> Result<CatalogSnapshot, CatalogClientError> {
        let tables = resolve_sources(context)?;
        let owner = tables.owner_filter.as_ref();

        info!(catalog = %tables.catalog, table = tables.materials, "fetching materials");
        let rows: Vec<MaterialRow> = self.fetch_rows(tables.materials, owner).await?;
        let row_count = rows.len();
        let materials: Vec<Material> = rows
            .into_iter()
            .filter_map(|row| row.into_material(tables.catalog))
            .collect();
        if materials.len() < row_count {
            warn!(
                table = tables.materials,
                skipped = row_count - materials.len(),
                "skipping material rows without an id"
            );
        }

        let anti_nutrients = self
            .fetch_contributions(
                tables.anti_nutrient_contributions,
                PropertyClass::AntiNutrient,
                tables.catalog,
                owner,
            )
            .await?;
        let enzymes = self
            .fetch_contributions(
                tables.enzyme_contributions,
                PropertyClass::Enzyme,
                tables.catalog,
                owner,
            )
            .await?;
        info!(
            catalog = %tables.catalog,
            materials = materials.len(),
            anti_nutrients = anti_nutrients.len(),
            enzymes = enzymes.len(),
            "catalog fetched"
        );

        Ok(CatalogSnapshot::new(context.clone(), materials, anti_nutrients, enzymes))
    }
}
