use std::future::Future;
use std::time::Duration as StdDuration;

use tracing::info;

use crate::error::{AppError, AppResult};

pub mod repositories;

const COLLECTION: &str = "escenas";

/// Characters the document store refuses inside a key.
const FORBIDDEN_KEY_CHARS: &[char] = &['/', '.', '#', '$', '[', ']'];

/// Shared HTTP handle to the remote JSON document store.
#[derive(Clone, Debug)]
pub struct StoreClient {
    client: reqwest::Client,
    base_url: String,
    timeout: StdDuration,
}

impl StoreClient {
    pub fn new(base_url: &str, timeout: StdDuration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build store HTTP client: {err}")))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        info!(target: "app::repository", %base_url, timeout_secs = timeout.as_secs(), "store client ready");

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn timeout(&self) -> StdDuration {
        self.timeout
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn collection_url(&self) -> String {
        format!("{}/{COLLECTION}.json", self.base_url)
    }

    pub fn scene_url(&self, id: &str) -> AppResult<String> {
        ensure_valid_key(id)?;
        Ok(format!("{}/{COLLECTION}/{id}.json", self.base_url))
    }
}

pub fn ensure_valid_key(id: &str) -> AppResult<()> {
    if id.trim().is_empty() || id.contains(FORBIDDEN_KEY_CHARS) {
        return Err(AppError::validation_with_details(
            "invalid scene id",
            serde_json::json!({ "id": id }),
        ));
    }
    Ok(())
}

/// Runs one store call with an upper bound on how long it may take.
pub async fn bounded<T, F, E>(limit: StdDuration, call: F, on_timeout: E) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
    E: FnOnce(String) -> AppError,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!(
            "store call timed out after {}s",
            limit.as_secs()
        ))),
    }
}
