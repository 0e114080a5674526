use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::pools::{ProxyPool, UserAgentPool};

/// Marker some sites serve while a paste is still being indexed.
pub const NOT_READY_MARKER: &str = "File is not ready for scraping yet. Try again in 1 minute.";

/// Rate-limit phrases that can show up in a 403 body.
const SLOW_DOWN_MARKERS: &[&str] = &["Please slow down", "temporarily blocked", "blocked"];

/// Retry budgets, counted independently. Exceeding any one gives up on the URL.
pub const RETRIES_PASTE: u32 = 3;
pub const RETRIES_CLIENT: u32 = 5;
pub const RETRIES_SERVER: u32 = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

#[derive(Debug)]
pub enum TransportError {
    /// The request or connect timed out.
    TimedOut(String),
    /// TCP/TLS/proxy-level failure.
    Connect(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::TimedOut(e) => write!(f, "timed out: {}", e),
            TransportError::Connect(e) => write!(f, "connection error: {}", e),
        }
    }
}

/// One GET, no retries. The retry policy lives in [`Fetcher`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get(
        &self,
        url: &str,
        proxy: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<FetchResult, TransportError>;
}

/// reqwest-backed transport. Redirects are returned as-is so the caller sees
/// the original status; the source address is bound per connection when
/// configured; outbound TLS is pinned to the 1.x range (1.2 through 1.3).
pub struct ReqwestTransport {
    local_addr: Option<IpAddr>,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(local_addr: Option<IpAddr>) -> Self {
        Self {
            local_addr,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

fn proxy_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        proxy: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<FetchResult, TransportError> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .max_tls_version(reqwest::tls::Version::TLS_1_3)
            .local_address(self.local_addr);
        if let Some(endpoint) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url(endpoint))
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let mut request = client.get(url).header("Accept-Charset", "utf-8");
        if let Some(ua) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                TransportError::TimedOut(e.to_string())
            } else {
                TransportError::Connect(e.to_string())
            }
        };

        let response = request.send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(key.as_str().to_string(), value.to_string());
            }
        }
        let body = response.bytes().await.map_err(map_err)?;
        Ok(FetchResult {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
            headers,
        })
    }
}

/// What to do with one HTTP outcome. Pure, so the policy matrix is testable
/// without a socket.
#[derive(Debug, PartialEq, Eq)]
pub enum Disposition {
    Success,
    /// Body says the paste is not scrapeable yet.
    NotReady,
    /// Transient upstream trouble: 500/502/504 or a rate-limit 403.
    RetryServer,
    /// 404, which often just means the paste is not indexed yet.
    RetryClient,
    /// A real client error. Do not insist.
    GiveUp,
}

pub fn classify(status: u16, body: &str) -> Disposition {
    match status {
        200..=399 => {
            if body.contains(NOT_READY_MARKER) {
                Disposition::NotReady
            } else {
                Disposition::Success
            }
        }
        500 | 502 | 504 => Disposition::RetryServer,
        404 => Disposition::RetryClient,
        403 if SLOW_DOWN_MARKERS.iter().any(|m| body.contains(m)) => Disposition::RetryServer,
        _ => Disposition::GiveUp,
    }
}

#[derive(Debug, Default)]
struct RetryBudgets {
    client: u32,
    server: u32,
    paste: u32,
}

/// The request fabric shared by every worker: proxy and user-agent rotation
/// plus the layered retry policy.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    proxies: Arc<ProxyPool>,
    agents: Arc<UserAgentPool>,
    retry_wait: Duration,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        proxies: Arc<ProxyPool>,
        agents: Arc<UserAgentPool>,
    ) -> Self {
        Self {
            transport,
            proxies,
            agents,
            retry_wait: RETRY_WAIT,
        }
    }

    /// Shrink the inter-retry wait. Test hook.
    pub fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }

    /// Download one URL, applying the retry budgets. `None` means the URL was
    /// given up on; the caller drops the pasty and moves on.
    pub async fn fetch(&self, url: &str) -> Option<FetchResult> {
        let mut budgets = RetryBudgets::default();
        loop {
            if budgets.client >= RETRIES_CLIENT {
                warn!(url = %url, "giving up after {} client-error retries", RETRIES_CLIENT);
                return None;
            }
            if budgets.server >= RETRIES_SERVER {
                warn!(url = %url, "giving up after {} server-error retries", RETRIES_SERVER);
                return None;
            }

            let proxy = self.proxies.pick();
            let user_agent = self.agents.pick().map(str::to_string);
            debug!(
                url = %url,
                proxy = proxy.as_deref().unwrap_or("-"),
                user_agent = user_agent.as_deref().unwrap_or("-"),
                "downloading"
            );

            let outcome = self
                .transport
                .get(url, proxy.as_deref(), user_agent.as_deref())
                .await;

            match outcome {
                Ok(result) => match classify(result.status, &result.body) {
                    Disposition::Success => return Some(result),
                    Disposition::NotReady => {
                        if budgets.paste >= RETRIES_PASTE {
                            warn!(url = %url, "paste never became ready, keeping placeholder body");
                            return Some(result);
                        }
                        budgets.paste += 1;
                        warn!(
                            url = %url,
                            attempt = budgets.paste,
                            max = RETRIES_PASTE,
                            "paste not ready for scraping yet, waiting"
                        );
                        tokio::time::sleep(self.retry_wait).await;
                    }
                    Disposition::RetryServer => {
                        budgets.server += 1;
                        warn!(
                            url = %url,
                            status = result.status,
                            attempt = budgets.server,
                            max = RETRIES_SERVER,
                            "server error, waiting before retry"
                        );
                        tokio::time::sleep(self.retry_wait).await;
                    }
                    Disposition::RetryClient => {
                        budgets.client += 1;
                        warn!(
                            url = %url,
                            attempt = budgets.client,
                            max = RETRIES_CLIENT,
                            "404 received, waiting before retry"
                        );
                        tokio::time::sleep(self.retry_wait).await;
                    }
                    Disposition::GiveUp => {
                        warn!(url = %url, status = result.status, "client error, skipping URL");
                        return None;
                    }
                },
                Err(e) => {
                    if let Some(endpoint) = proxy.as_deref() {
                        warn!(url = %url, proxy = %endpoint, error = %e, "proxy-attributed fetch failure");
                        self.proxies.fail(endpoint);
                    }
                    budgets.server += 1;
                    match e {
                        TransportError::TimedOut(_) => {
                            warn!(
                                url = %url,
                                attempt = budgets.server,
                                max = RETRIES_SERVER,
                                "timed out, waiting before retry"
                            );
                            tokio::time::sleep(self.retry_wait).await;
                        }
                        TransportError::Connect(err) => {
                            warn!(
                                url = %url,
                                error = %err,
                                attempt = budgets.server,
                                max = RETRIES_SERVER,
                                "connection error, retrying"
                            );
                        }
                    }
                }
            }
        }
    }
}
