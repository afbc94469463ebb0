//! Resilient page fetching with bounded retries and fingerprint rotation.
//!
//! Every attempt waits `base_delay * attempt` (linear backoff), presents a
//! pseudo-randomly chosen client fingerprint, and runs inside its own
//! isolated HTTP session: a fresh client with its own cookie store is built
//! for the attempt and disposed with it, so no cookies or headers correlate
//! consecutive attempts. Successful fetches are never cached.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::infrastructure::config::ScraperConfig;

/// Statuses that signal a definitive block or rate limit when they occur on
/// the final attempt.
const TERMINAL_STATUSES: [u16; 2] = [403, 429];

#[derive(Error, Debug)]
pub enum FetchError {
    /// Every allowed attempt failed without a definitive block signal.
    #[error("all {attempts} fetch attempts failed for {url}")]
    Exhausted { url: String, attempts: u32 },

    /// Definitive block/rate-limit status on the final attempt. Logged
    /// distinctly but surfaced the same way as exhaustion.
    #[error("terminal HTTP status {status} on final attempt ({attempts}) for {url}")]
    Terminal {
        url: String,
        status: u16,
        attempts: u32,
    },

    /// The caller's deadline cancelled the fetch mid-backoff or mid-request.
    #[error("fetch cancelled for {url}")]
    Cancelled { url: String },

    #[error("invalid fetch configuration: {0}")]
    Config(String),
}

/// Client identity presented to the target site for one attempt.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub user_agent: String,
    pub accept_language: String,
    pub referer: Option<String>,
}

impl Fingerprint {
    fn headers(&self) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| FetchError::Config(format!("invalid user agent: {e}")))?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&self.accept_language)
                .map_err(|e| FetchError::Config(format!("invalid accept-language: {e}")))?,
        );
        if let Some(referer) = &self.referer {
            headers.insert(
                REFERER,
                HeaderValue::from_str(referer)
                    .map_err(|e| FetchError::Config(format!("invalid referer: {e}")))?,
            );
        }
        Ok(headers)
    }
}

/// Raw markup for one successfully fetched page. Transient; lives only for
/// the fetch -> extract handoff and is never persisted.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub url: String,
    pub html: String,
    pub status_code: u16,
    pub fetch_attempt: u32,
    pub fetched_at: DateTime<Utc>,
}

enum AttemptOutcome {
    Success { html: String, status: u16 },
    BadStatus(u16),
}

/// Retrieves rendered markup for a URL under anti-bot conditions.
pub struct FetchController {
    base_delay: Duration,
    max_attempts: u32,
    timeout: Duration,
    user_agents: Vec<String>,
    accept_language: String,
    referer: Option<String>,
    consent_selectors: Vec<Selector>,
}

impl FetchController {
    pub fn new(config: &ScraperConfig, timeout_seconds: u64) -> Result<Self, FetchError> {
        if config.max_fetch_attempts < 1 {
            return Err(FetchError::Config(
                "max_fetch_attempts must be at least 1".to_string(),
            ));
        }
        if config.user_agents.is_empty() {
            return Err(FetchError::Config(
                "user agent pool must not be empty".to_string(),
            ));
        }

        // Invalid consent selectors are skipped, not fatal; dismissal is
        // best-effort by contract.
        let consent_selectors = config
            .consent_selectors
            .iter()
            .filter_map(|raw| match Selector::parse(raw) {
                Ok(selector) => Some(selector),
                Err(e) => {
                    warn!(selector = %raw, "skipping invalid consent selector: {e}");
                    None
                }
            })
            .collect();

        Ok(Self {
            base_delay: Duration::from_secs_f64(config.request_delay_seconds.max(0.0)),
            max_attempts: config.max_fetch_attempts,
            timeout: Duration::from_secs(timeout_seconds),
            user_agents: config.user_agents.clone(),
            accept_language: config.accept_language.clone(),
            referer: config.referer.clone(),
            consent_selectors,
        })
    }

    /// Fetch `url`, retrying with linear backoff. Every call re-fetches;
    /// nothing is cached. Backoff sleeps are cooperative and cancel
    /// promptly when `cancel` fires.
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<RawPage, FetchError> {
        for attempt in 1..=self.max_attempts {
            let delay = self.base_delay.mul_f64(attempt as f64);
            debug!(url, attempt, delay_ms = delay.as_millis() as u64, "waiting before fetch attempt");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
            }

            let fingerprint = self.pick_fingerprint();
            debug!(url, attempt, user_agent = %fingerprint.user_agent, "fetch attempt");

            let outcome = tokio::select! {
                outcome = self.attempt(url, &fingerprint) => outcome,
                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
            };

            match outcome {
                Ok(AttemptOutcome::Success { html, status }) => {
                    let html = self.dismiss_consent_overlay(html);
                    info!(url, attempt, length = html.len(), "fetched page");
                    return Ok(RawPage {
                        url: url.to_string(),
                        html,
                        status_code: status,
                        fetch_attempt: attempt,
                        fetched_at: Utc::now(),
                    });
                }
                Ok(AttemptOutcome::BadStatus(status)) => {
                    warn!(url, attempt, status, max_attempts = self.max_attempts, "fetch attempt failed");
                    if TERMINAL_STATUSES.contains(&status) && attempt >= self.max_attempts {
                        error!(url, status, "final attempt failed with definitive block status");
                        return Err(FetchError::Terminal {
                            url: url.to_string(),
                            status,
                            attempts: self.max_attempts,
                        });
                    }
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "fetch attempt transport error");
                }
            }
        }

        error!(url, attempts = self.max_attempts, "all fetch attempts failed");
        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
        })
    }

    fn pick_fingerprint(&self) -> Fingerprint {
        let index = fastrand::usize(..self.user_agents.len());
        Fingerprint {
            user_agent: self.user_agents[index].clone(),
            accept_language: self.accept_language.clone(),
            referer: self.referer.clone(),
        }
    }

    /// One attempt with an isolated session. The client and its cookie jar
    /// are dropped when this returns.
    async fn attempt(
        &self,
        url: &str,
        fingerprint: &Fingerprint,
    ) -> Result<AttemptOutcome, anyhow::Error> {
        let client = Client::builder()
            .timeout(self.timeout)
            .cookie_store(true)
            .default_headers(fingerprint.headers()?)
            .build()?;

        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        if status == 200 {
            let html = response.text().await?;
            Ok(AttemptOutcome::Success { html, status })
        } else {
            Ok(AttemptOutcome::BadStatus(status))
        }
    }

    /// Best-effort removal of consent/cookie overlays from the fetched
    /// markup. The fetch layer runs no scripts, so "dismissal" means
    /// detaching the overlay subtree before the document reaches
    /// extraction; failure to find one is tolerated.
    fn dismiss_consent_overlay(&self, html: String) -> String {
        if self.consent_selectors.is_empty() {
            return html;
        }

        let mut document = Html::parse_document(&html);
        for selector in &self.consent_selectors {
            let matched: Vec<_> = document.select(selector).map(|el| el.id()).collect();
            if matched.is_empty() {
                continue;
            }
            for id in matched {
                if let Some(mut node) = document.tree.get_mut(id) {
                    node.detach();
                }
            }
            debug!("dismissed consent overlay");
            return document.html();
        }

        debug!("no consent overlay matched any known selector");
        html
    }
}
