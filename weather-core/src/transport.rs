//! Resilient request/response exchange with the weather provider.
//!
//! Every call is retried with a fixed delay on any transport-level failure
//! (connection errors, timeouts, non-2xx status, broken body stream):
//! - total attempts are `max_retries + 1`
//! - the delay happens only between attempts, never after the last one
//! - only the calling task sleeps; concurrent requests keep running
//!
//! There is no jitter, no backoff and no circuit breaker. Requests carry no timeout,
//! so a hung connection stalls its caller until the peer gives up.
//!
//! Decoding the body is done once, after a successful exchange, and is never retried.

use std::{error::Error as StdError, fmt::Debug, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client, Method, StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use thiserror::Error;

use crate::{
    config::SourceConfig,
    encoding::TextEncoding,
    error::{Result, WeatherError},
};

/// Suspends the current task between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one fails.
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.retries_or_default(), config.retry_delay_or_default())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// The last failure once every attempt allowed by a [`RetryPolicy`] has been used.
#[derive(Debug, Error)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetryExhausted<E: StdError + 'static> {
    pub attempts: u32,
    #[source]
    pub last: E,
}

/// Run `operation` until it succeeds or the policy is spent, sleeping `policy.delay`
/// between attempts. The closure receives the 1-based attempt number.
pub async fn retry_with_fixed_delay<T, E, F, Fut>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut operation: F,
) -> std::result::Result<T, RetryExhausted<E>>
where
    E: StdError + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(%label, attempt, "Request succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) if attempt < max_attempts => {
                tracing::warn!(
                    %label,
                    attempt,
                    max_attempts,
                    cause = %describe_cause(&err),
                    "Request failed, retrying in {:?}",
                    policy.delay
                );
                sleeper.sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(
                    %label,
                    attempts = attempt,
                    cause = %describe_cause(&err),
                    "Request failed, retry budget exhausted"
                );
                return Err(RetryExhausted { attempts: attempt, last: err });
            }
        }
    }
}

/// Walk the `source()` chain and return the deepest network error in it,
/// or the deepest error of any kind when no network error is present.
pub fn innermost_cause<'a>(err: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    let mut current = err;
    let mut network = None;

    loop {
        if current.is::<reqwest::Error>() {
            network = Some(current);
        }
        match current.source() {
            Some(next) => current = next,
            None => break,
        }
    }

    network.unwrap_or(current)
}

/// One-line description of the innermost cause, including the HTTP status when known
/// and the lowest-level error underneath a network error (refused connection, DNS failure).
pub fn describe_cause(err: &(dyn StdError + 'static)) -> String {
    let cause = innermost_cause(err);
    let Some(net) = cause.downcast_ref::<reqwest::Error>() else {
        return format!("message={cause}");
    };

    let mut description = match net.status() {
        Some(status) => format!("status={status}, message={net}"),
        None => format!("message={net}"),
    };
    if let Some(mut root) = cause.source() {
        while let Some(next) = root.source() {
            root = next;
        }
        description.push_str(&format!(", cause={root}"));
    }
    description
}

fn status_of(err: &reqwest::Error) -> Option<StatusCode> {
    innermost_cause(err)
        .downcast_ref::<reqwest::Error>()
        .and_then(reqwest::Error::status)
        .or_else(|| err.status())
}

/// HTTP transport bound to one provider's text encoding and retry budget.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    encoding: TextEncoding,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl HttpTransport {
    pub fn new(encoding: TextEncoding, policy: RetryPolicy) -> Self {
        Self::with_sleeper(encoding, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(encoding: TextEncoding, policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            http: Client::new(),
            encoding,
            policy,
            sleeper,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.encoding_or_default(), RetryPolicy::from_config(config))
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn get(&self, url: &str, bearer: Option<&str>) -> Result<String> {
        self.request(Method::GET, url, bearer, None).await
    }

    pub async fn post(&self, url: &str, bearer: Option<&str>, body: &str) -> Result<String> {
        self.request(Method::POST, url, bearer, Some(body)).await
    }

    /// One logical exchange: retried send, then a single decode of the response body.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        body: Option<&str>,
    ) -> Result<String> {
        tracing::debug!(%method, %url, "Starting request");

        let payload = body.map(|text| self.encoding.encode(text));
        let label = format!("{method} {url}");

        let bytes = retry_with_fixed_delay(self.policy, self.sleeper.as_ref(), &label, |_| {
            self.send_once(method.clone(), url, bearer, payload.clone())
        })
        .await
        .map_err(|exhausted| WeatherError::Transport {
            url: url.to_string(),
            attempts: exhausted.attempts,
            status: status_of(&exhausted.last),
            cause: describe_cause(&exhausted.last),
            source: exhausted.last,
        })?;

        tracing::debug!(%method, %url, encoding = %self.encoding, "Request successful, decoding body");

        self.encoding.decode(&bytes).map_err(|e| {
            let err = WeatherError::Encoding {
                url: url.to_string(),
                encoding: self.encoding.name(),
                reason: e.to_string(),
            };
            tracing::error!(error = %err, "Failed to decode response body");
            err
        })
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        payload: Option<Vec<u8>>,
    ) -> std::result::Result<Vec<u8>, reqwest::Error> {
        let content_type = match self.encoding.charset() {
            Some(charset) => format!("application/json; charset={charset}"),
            None => "application/json".to_string(),
        };
        let mut req = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, content_type)
            .header(ACCEPT, "application/json");

        if let Some(token) = bearer {
            req = req.header(AUTHORIZATION, format!("bearer {token}"));
        }
        if let Some(bytes) = payload {
            req = req.body(bytes);
        }

        let res = req.send().await?.error_for_status()?;
        Ok(res.bytes().await?.to_vec())
    }
}
