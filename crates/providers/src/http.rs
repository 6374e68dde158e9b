use anyhow::{anyhow, Error};
use reqwest::{Client, Response};
use std::sync::LazyLock;
use std::time::Duration;

pub(crate) static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Turns a non-success response into an error carrying a trimmed body excerpt.
pub(crate) async fn status_error(provider: &str, resp: Response) -> Error {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let detail: String = body.trim().chars().take(800).collect();
    if detail.is_empty() {
        anyhow!("{} error: {}", provider, status)
    } else {
        anyhow!("{} error: {}\n{}", provider, status, detail)
    }
}
