//! Minimal Discord REST client: just enough to resolve users.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::StatusCode;
use tracing::{debug, info};
use url::Url;

use tripwire_core::config::DiscordConfig;
use tripwire_core::{Snowflake, User};

use crate::context::UserApi;
use crate::error::ApiError;

const USER_AGENT: &str = concat!("DiscordBot (tripwire, ", env!("CARGO_PKG_VERSION"), ")");

pub struct DiscordClient {
    client: reqwest::Client,
    token: String,
    api_base: Url,
    /// When set, requests go to this host over plain HTTP with the path kept.
    proxy: Option<Url>,
}

impl DiscordClient {
    pub fn new(config: &DiscordConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        let api_base = Url::parse(config.api_base.trim_end_matches('/'))?;
        let proxy = match config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            Some(host) => {
                info!(proxy = host, "Routing Discord API requests through proxy");
                Some(Url::parse(&format!("http://{host}"))?)
            }
            None => None,
        };

        Ok(Self {
            client,
            token: config.token.clone(),
            api_base,
            proxy,
        })
    }

    fn user_url(&self, user_id: Snowflake) -> Result<Url, ApiError> {
        let direct = Url::parse(&format!("{}/users/{user_id}", self.api_base.as_str().trim_end_matches('/')))?;

        Ok(match &self.proxy {
            Some(proxy) => {
                let mut proxied = proxy.clone();
                proxied.set_path(direct.path());
                proxied.set_query(direct.query());
                proxied
            }
            None => direct,
        })
    }
}

/// `Retry-After` is seconds, possibly fractional. Rounded up; defaults to 1.
fn parse_retry_after(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.ceil() as u64)
        .unwrap_or(1)
}

#[async_trait]
impl UserApi for DiscordClient {
    async fn get_user(&self, user_id: Snowflake) -> Result<User, ApiError> {
        let url = self.user_url(user_id)?;
        debug!(user_id, url = %url, "Fetching user from Discord API");

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok());
            return Err(ApiError::RateLimited {
                retry_after_secs: parse_retry_after(retry_after),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<User>().await?)
    }
}
