//! HTTP transport for realtime feeds.
//!
//! [`HttpClient`] is the seam the rest of the crate talks through;
//! [`BasicClient`] is the reqwest-backed implementation and
//! [`auth::ApiKey`] decorates any client with the key header the feed
//! endpoints require.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use thiserror::Error;

/// Transport-level fetch failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid feed URL: {url}")]
    BadUrl { url: String },

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("feed server returned {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Performs a GET for `url` and returns the full response body.
///
/// # Errors
///
/// [`FetchError::Status`] on any non-2xx response; [`FetchError::Transport`]
/// on connection, timeout, or body-read failures.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>, FetchError> {
    let parsed = url.parse().map_err(|_| FetchError::BadUrl {
        url: url.to_string(),
    })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client
        .execute(req)
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let body = resp.bytes().await.map_err(|source| FetchError::Transport {
        url: url.to_string(),
        source,
    })?;
    Ok(body.to_vec())
}
