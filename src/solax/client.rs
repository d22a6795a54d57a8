use crate::prelude::*;

use async_trait::async_trait;
use std::time::Duration;

/// Source of raw realtime data responses.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// HTTP client for the inverter's local realtime data endpoint.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    url: reqwest::Url,
    password: String,
}

impl Client {
    pub fn new(config: &config::Inverter) -> Result<Self> {
        let url = Self::endpoint(config.host())?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout()))
            .build()?;

        Ok(Self {
            http,
            url,
            password: config.password().to_owned(),
        })
    }

    /// Accepts a bare address (`192.168.1.50`) or a full URL.
    pub fn endpoint(host: &str) -> Result<reqwest::Url> {
        let url = if host.contains("://") {
            host.to_owned()
        } else {
            format!("http://{}", host)
        };

        reqwest::Url::parse(&url).map_err(|err| anyhow!("invalid inverter host {}: {}", host, err))
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    fn body(&self) -> String {
        format!("?optType=ReadRealTimeData&pwd={}", self.password)
    }
}

#[async_trait]
impl Fetch for Client {
    async fn fetch(&self) -> Result<String> {
        let response = self
            .http
            .post(self.url.clone())
            .body(self.body())
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() || err.is_connect() {
                    // the inverter drops off wifi at night, not worth shouting about
                    debug!("inverter {} unreachable: {}", self.url, err);
                } else {
                    error!("inverter {} request error: {}", self.url, err);
                }
                anyhow!("request to {} failed: {}", self.url, err)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("inverter {} returned {}", self.url, status);
            bail!("inverter {} returned {}", self.url, status);
        }

        let body = response.text().await?;
        trace!("inverter {} RX: {}", self.url, body);

        Ok(body)
    }
}
