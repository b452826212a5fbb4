//! REST helper for snapshot and market-list fetches

use crate::common::error::FeedError;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// GET `url` and parse the body as JSON.
///
/// Non-2xx statuses are errors. Retry policy is the caller's: the
/// adapters that need a snapshot retry on a fixed delay, forever,
/// matching the socket's reconnect philosophy.
pub async fn get_json(url: &str) -> Result<serde_json::Value, FeedError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let value = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json::<serde_json::Value>()
        .await?;
    Ok(value)
}
