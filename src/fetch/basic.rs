use super::client::HttpClient;
use async_trait::async_trait;
use std::time::Duration;

/// Total budget for one feed request, connection through body.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("BasicClient: reqwest client construction");
        Self(client)
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
