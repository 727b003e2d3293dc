use std::sync::Arc;

use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use shardline_clock::SystemClock;

use crate::error::RestError;
use crate::headers::RateLimitHeaders;
use crate::ratelimit::RateLimiter;
use crate::route::Route;

const TOO_MANY_REQUESTS: u16 = 429;

/// REST API client
///
/// Every call is admitted through the shared [`RateLimiter`] and feeds the
/// response's rate-limit headers back into it. A 429 is retried after the
/// limiter lets the route through again.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: String,
    limiter: RateLimiter,
}

impl RestClient {
    /// Create a new client with its own limiter on the system clock
    pub fn new(base_url: String, token: String) -> Self {
        Self::with_limiter(base_url, token, RateLimiter::new(Arc::new(SystemClock::new())))
    }

    /// Create a client sharing an existing limiter
    pub fn with_limiter(base_url: String, token: String, limiter: RateLimiter) -> Self {
        RestClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            limiter,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Gateway endpoint and shard count the API recommends for this token
    pub async fn get_gateway_bot(&self) -> Result<GatewayBot, RestError> {
        self.request(&Route::get("/gateway/bot"), None).await
    }

    /// Issue one call on `route`, waiting for admission first
    pub async fn request<T: DeserializeOwned>(
        &self,
        route: &Route,
        body: Option<&Value>,
    ) -> Result<T, RestError> {
        let key = route.ratelimit_key();
        let url = format!("{}{}", self.base_url, route.path());

        loop {
            self.limiter.request_execution(&key).await;

            let mut builder = self
                .client
                .request(route.method.to_reqwest(), &url)
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let resp = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    // Nothing to learn from the server, but waiters must still move
                    self.limiter.update_done(&key);
                    return Err(e.into());
                }
            };

            let status = resp.status().as_u16();
            let headers = RateLimitHeaders::from_header_map(resp.headers());
            headers.apply(&self.limiter, &key, status == TOO_MANY_REQUESTS, self.limiter.now_millis());

            if status == TOO_MANY_REQUESTS {
                warn!(
                    "{}: rate limited (global={}), retrying after {:?}ms",
                    key, headers.global, headers.retry_after
                );
                continue;
            }

            debug!("{} -> {}", key, status);
            return self.handle_response(resp).await;
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, RestError> {
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&text) {
                return Err(RestError::Api {
                    status: status.as_u16(),
                    message: err.message,
                });
            }
            return Err(RestError::Parse(format!("HTTP {}: {}", status, text)));
        }

        // 204 No Content and friends
        let text = if text.is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| RestError::Parse(e.to_string()))
    }
}

/// Answer of `GET /gateway/bot`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayBot {
    pub url: String,
    pub shards: u32,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}
