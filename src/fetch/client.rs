use async_trait::async_trait;
use reqwest::{Request, Response};

/// Minimal HTTP execution seam. Decorators wrap an inner client to attach
/// authentication; tests can substitute a canned implementation.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
