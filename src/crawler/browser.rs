//! Scripted-browser transport
//!
//! Pages are rendered by a Browserless-style service: the transport POSTs to its `/content`
//! endpoint, which loads the page in a headless browser, waits for the network to go idle
//! and returns the serialized DOM.

use crate::config::{CrawlerConfig, TransportConfig};
use crate::crawler::fetcher::{FetchError, RenderedPage, RetryPolicy, Transport};
use crate::crawler::pacing::{random_delay, RequestPacer, RotationPool};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions,
    user_agent: &'a str,
    #[serde(rename = "setExtraHTTPHeaders")]
    set_extra_http_headers: HashMap<&'static str, &'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: &'static str,
    timeout: u64,
}

/// Transport backed by a remote headless browser
pub struct BrowserTransport {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    rotation: RotationPool,
    accept_language: String,
    navigation_timeout: Duration,
    pause_min_ms: u64,
    pause_max_ms: u64,
    policy: RetryPolicy,
    pacer: Arc<RequestPacer>,
}

impl BrowserTransport {
    /// Creates a browser transport from configuration
    ///
    /// # Returns
    ///
    /// * `Ok(BrowserTransport)` - Transport ready to use
    /// * `Err(WatchError)` - Missing/invalid endpoint or failed to build the client
    pub fn new(
        crawler: &CrawlerConfig,
        transport: &TransportConfig,
        pacer: Arc<RequestPacer>,
    ) -> crate::Result<Self> {
        let endpoint = transport.browser_endpoint.as_deref().ok_or_else(|| {
            crate::ConfigError::Validation("browser_endpoint is not configured".to_string())
        })?;
        let endpoint = content_endpoint(endpoint)?;

        let navigation_timeout = Duration::from_secs(crawler.timeout_secs);
        // The service needs headroom beyond the navigation timeout to serialize the page
        let client = Client::builder()
            .timeout(navigation_timeout + Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: transport.browser_token.clone(),
            rotation: RotationPool::new(transport.user_agents.clone(), transport.proxies.clone()),
            accept_language: transport.accept_language.clone(),
            navigation_timeout,
            pause_min_ms: transport.pause_min_ms,
            pause_max_ms: transport.pause_max_ms,
            policy: RetryPolicy::from_config(crawler),
            pacer,
        })
    }

    fn request_url(&self, proxy: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(token) = &self.token {
                pairs.append_pair("token", token);
            }
            if let Some(proxy) = proxy {
                pairs.append_pair("--proxy-server", proxy);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }
}

/// Appends `/content` to the service base URL
fn content_endpoint(base: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}/content", base.trim_end_matches('/')))
}

#[async_trait]
impl Transport for BrowserTransport {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn pacer(&self) -> &RequestPacer {
        &self.pacer
    }

    async fn fetch_once(&self, url: &str) -> Result<RenderedPage, FetchError> {
        let identity = self.rotation.claim();
        let proxy = identity.proxy.and_then(|i| self.rotation.proxy_url(i));

        let mut headers = HashMap::new();
        headers.insert("Accept-Language", self.accept_language.as_str());

        let body = ContentRequest {
            url,
            goto_options: GotoOptions {
                wait_until: "networkidle2",
                timeout: self.navigation_timeout.as_millis() as u64,
            },
            user_agent: &identity.user_agent,
            set_extra_http_headers: headers,
        };

        let response = self
            .client
            .post(self.request_url(proxy))
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Browser {
                status: status.as_u16(),
                message,
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let pause = random_delay(self.pause_min_ms, self.pause_max_ms);
        debug!(url, pause_ms = pause.as_millis() as u64, "Rendered page, pausing");
        tokio::time::sleep(pause).await;

        Ok(RenderedPage {
            url: url.to_string(),
            status: status.as_u16(),
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererKind;

    fn crawler_config() -> CrawlerConfig {
        CrawlerConfig {
            request_delay_ms: 0,
            retry_base_delay_ms: 1,
            max_retries: 1,
            timeout_secs: 30,
            min_request_interval_ms: 0,
            max_concurrent_sources: 2,
            inter_source_delay_min_ms: 0,
            inter_source_delay_max_ms: 0,
            run_timeout_secs: 60,
        }
    }

    fn transport_config(endpoint: Option<&str>, proxies: Vec<String>) -> TransportConfig {
        TransportConfig {
            renderer: RendererKind::Browser,
            user_agents: vec!["Mozilla/5.0 Test".to_string()],
            proxies,
            accept_language: "vi-VN".to_string(),
            browser_endpoint: endpoint.map(String::from),
            browser_token: Some("secret".to_string()),
            pause_min_ms: 0,
            pause_max_ms: 0,
        }
    }

    #[test]
    fn test_content_endpoint() {
        assert_eq!(
            content_endpoint("http://localhost:3000/").unwrap().as_str(),
            "http://localhost:3000/content"
        );
    }

    #[test]
    fn test_missing_endpoint_is_error() {
        let result = BrowserTransport::new(
            &crawler_config(),
            &transport_config(None, vec![]),
            Arc::new(RequestPacer::unthrottled()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_request_url_carries_token_and_proxy() {
        let transport = BrowserTransport::new(
            &crawler_config(),
            &transport_config(Some("http://localhost:3000"), vec![]),
            Arc::new(RequestPacer::unthrottled()),
        )
        .unwrap();

        let url = transport.request_url(Some("http://10.0.0.1:8080"));
        assert!(url.query_pairs().any(|(k, v)| k == "token" && v == "secret"));
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "--proxy-server" && v == "http://10.0.0.1:8080"));
    }

    #[test]
    fn test_request_body_shape() {
        let mut headers = HashMap::new();
        headers.insert("Accept-Language", "vi-VN");
        let body = ContentRequest {
            url: "https://vnexpress.net/kinh-doanh/bao-hiem",
            goto_options: GotoOptions {
                wait_until: "networkidle2",
                timeout: 30000,
            },
            user_agent: "Mozilla/5.0 Test",
            set_extra_http_headers: headers,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["gotoOptions"]["waitUntil"], "networkidle2");
        assert_eq!(json["gotoOptions"]["timeout"], 30000);
        assert_eq!(json["userAgent"], "Mozilla/5.0 Test");
        assert_eq!(json["setExtraHTTPHeaders"]["Accept-Language"], "vi-VN");
    }
}
