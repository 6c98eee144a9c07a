//! Model catalog lookup: one request/response GET against the arena's
//! `/api/models` endpoint. Consumed by the model-selection surface only;
//! the streaming core never touches HTTP.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One selectable model as the server advertises it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Human-readable display name, e.g. "Qwen3 (32B)".
    pub name: String,
    /// Identifier to place in a role assignment, e.g. "qwen3:32B".
    pub model_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

/// Fetch the catalog from `{base_url}/api/models`.
pub async fn fetch_models(base_url: &str) -> Result<Vec<ModelInfo>, Error> {
    let url = format!("{}/api/models", base_url.trim_end_matches('/'));
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(3))
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Catalog { status: status.as_u16(), url });
    }
    Ok(response.json().await?)
}
