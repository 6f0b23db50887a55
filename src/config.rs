use std::time::Duration;

/// Runtime settings read from the environment.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_url: String,
    pub callback_url: String,
    pub http_timeout: Duration,
    pub token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("GASPAY_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api/".to_string()),
            callback_url: std::env::var("GASPAY_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:3000/payment/callback".to_string()),
            http_timeout: std::env::var("GASPAY_HTTP_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(10_000)),
            token: std::env::var("GASPAY_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}
