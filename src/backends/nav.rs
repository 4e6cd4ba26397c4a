//! Page-navigation checker backed by an HTTP client.

use std::time::{Duration, Instant};

use reqwest::Client;

use super::{BackendError, Navigation, Navigator};

/// Navigation check via a plain HTTP fetch. Mirrors a headless browser's
/// page load: redirects are followed, any completed response counts as a
/// successful navigation, and only transport errors (DNS, refused
/// connection, TLS, timeout) fail.
pub struct HttpNavigator {
    client: Client,
}

impl Default for HttpNavigator {
    fn default() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent(concat!("qamedic/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

#[async_trait::async_trait]
impl Navigator for HttpNavigator {
    async fn navigate(&self, url: &str) -> Result<Navigation, BackendError> {
        let url = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("http://{}", url)
        };

        let start = Instant::now();
        match self.client.get(&url).send().await {
            Ok(_response) => Ok(Navigation {
                duration: start.elapsed().as_secs_f64(),
            }),
            Err(e) => Err(BackendError::Navigation {
                url,
                message: e.to_string(),
            }),
        }
    }
}
