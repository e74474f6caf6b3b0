// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use url::{Url, form_urlencoded};

use crate::error::Result;
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Build the detail page URL for an identifier.
pub fn detail_url(template: &str, identifier: &str) -> Result<Url> {
    let encoded: String = form_urlencoded::byte_serialize(identifier.trim().as_bytes()).collect();
    Ok(Url::parse(&template.replace("{id}", &encoded))?)
}

/// Fetch a page body, treating non-success status codes as errors.
pub async fn fetch_text(client: &reqwest::Client, url: Url) -> Result<String> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.text().await?)
}
