//! Product catalog lookups for ASIN enrichment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CATALOG_BATCH_LIMIT;
use crate::error::CatalogError;

/// One catalog entry for a resolved ASIN.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub asin: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    /// Pack size when the listing is a multi-pack, e.g. 12 for a 12-count box.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_count: Option<u32>,
}

/// Batch catalog lookup. A single call takes at most
/// [`CATALOG_BATCH_LIMIT`] ASINs; unknown ASINs are simply absent from the
/// result, not errors.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn lookup_items(&self, asins: &[String]) -> Result<Vec<CatalogItem>, CatalogError>;
}

#[derive(Serialize)]
struct LookupRequest<'a> {
    asins: &'a [String],
}

#[derive(Deserialize)]
struct LookupResponse {
    items: Vec<CatalogItem>,
}

/// HTTP implementation against a JSON batch-lookup endpoint.
pub struct HttpCatalog {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpCatalog {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalog {
    async fn lookup_items(&self, asins: &[String]) -> Result<Vec<CatalogItem>, CatalogError> {
        if asins.len() > CATALOG_BATCH_LIMIT {
            return Err(CatalogError::BatchTooLarge(asins.len()));
        }
        if asins.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&LookupRequest { asins })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            })?;
        Ok(body.items)
    }
}
