use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use log::info;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde::{Deserialize, Serialize};
use simple_error::{try_with, SimpleError, SimpleResult};

use crate::{
    params::RetryParams,
    util,
    weights::{parse_weight_matrix, WeightMatrix},
};

/// Outcome of the most recent weight refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RefreshStatus {
    Pending,
    Loaded { num_neurons: usize },
    /// The previous matrix (if any) stays in use.
    Failed(String),
}

/// Source of the connectome weight matrix.
#[async_trait]
pub trait WeightStore: Send + Sync {
    async fn fetch(&self) -> SimpleResult<WeightMatrix>;
}

pub struct HttpWeightStore {
    client: reqwest::Client,
    url: String,
}

impl HttpWeightStore {
    pub fn new(base_url: &str, timeout: Duration) -> SimpleResult<Self> {
        let client = try_with!(
            reqwest::Client::builder().timeout(timeout).build(),
            "unable to build http client"
        );

        Ok(Self {
            client,
            url: format!("{}/api/rpc", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WeightStore for HttpWeightStore {
    async fn fetch(&self) -> SimpleResult<WeightMatrix> {
        let response = try_with!(
            self.client
                .get(&self.url)
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache")
                .send()
                .await,
            "weight request to {} failed",
            self.url
        );

        if !response.status().is_success() {
            return Err(SimpleError::new(format!(
                "weight store returned {}",
                response.status()
            )));
        }

        let body = try_with!(response.text().await, "unable to read weight store response");
        parse_weight_matrix(&body)
    }
}

/// Reads the same JSON payload from a local file.
pub struct FileWeightStore {
    path: PathBuf,
}

impl FileWeightStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl WeightStore for FileWeightStore {
    async fn fetch(&self) -> SimpleResult<WeightMatrix> {
        let json_str = try_with!(
            tokio::fs::read_to_string(&self.path).await,
            "unable to read weight file {}",
            self.path.display()
        );
        parse_weight_matrix(&json_str)
    }
}

/// Fetches with a per-attempt timeout, retrying `retry.max_retries` times with
/// exponential backoff.
pub async fn fetch_with_retry<S: WeightStore + ?Sized>(
    store: &S,
    retry: RetryParams,
    timeout: Duration,
) -> SimpleResult<WeightMatrix> {
    let matrix =
        util::retry_with_backoff("weight fetch", retry, timeout, || store.fetch()).await?;
    info!("fetched weight matrix with {} sources", matrix.len());
    Ok(matrix)
}
