//! HTTP client for the Strava activity API.
//!
//! This module provides:
//! - The recent-activity list call (one bounded page, fatal on failure)
//! - Detail lookups fanned out with bounded concurrency
//! - Dispatch spacing so detail requests never start in a burst
//!
//! No request is retried. A 429 surfaces as [`SourceError::RateLimited`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::activity::{decode_page, ActivityId, ActivityRecord};
use crate::auth::AccessCredential;
use crate::config::{JournalConfig, MAX_PAGE_SIZE};
use crate::error::SourceError;

/// Result of one detail lookup.
#[derive(Debug)]
pub struct ActivityDetailResult {
    pub activity_id: ActivityId,
    pub record: Result<ActivityRecord, SourceError>,
}

/// Dispatch rate limiter - spaces out when requests START.
///
/// Each caller reserves the next slot `interval` after the previous one, so
/// at most one request starts per interval regardless of concurrency.
struct DispatchRateLimiter {
    interval: Duration,
    next_dispatch: Mutex<Instant>,
    dispatched_count: AtomicU32,
}

impl DispatchRateLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_dispatch: Mutex::new(Instant::now()),
            dispatched_count: AtomicU32::new(0),
        }
    }

    /// Wait for our dispatch slot. Returns the 1-based dispatch number.
    async fn wait_for_dispatch_slot(&self) -> u32 {
        let (wait_duration, dispatch_num) = {
            let mut next = self.next_dispatch.lock().await;
            let now = Instant::now();

            let dispatch_at = if *next > now { *next } else { now };
            *next = dispatch_at + self.interval;

            let num = self.dispatched_count.fetch_add(1, Ordering::Relaxed) + 1;
            (dispatch_at.saturating_duration_since(now), num)
        };

        // Wait outside the lock
        if wait_duration > Duration::from_millis(5) {
            debug!("[Dispatch #{}] Waiting {:?} for slot", dispatch_num, wait_duration);
            tokio::time::sleep(wait_duration).await;
        }

        dispatch_num
    }
}

/// Activity API client.
pub struct ActivityClient {
    client: Client,
    api_base: String,
    max_concurrency: usize,
    rate_limiter: Arc<DispatchRateLimiter>,
}

impl ActivityClient {
    pub fn new(config: &JournalConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.detail_concurrency * 2)
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| SourceError::Transport {
                operation: "create client".to_string(),
                details: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_base: config.endpoints.api_base.trim_end_matches('/').to_string(),
            max_concurrency: config.detail_concurrency.max(1),
            rate_limiter: Arc::new(DispatchRateLimiter::new(config.dispatch_interval())),
        })
    }

    /// Most recent page of activities, newest first as the API returns them.
    pub async fn list_recent_activities(
        &self,
        credential: &AccessCredential,
        page_size: u32,
    ) -> Result<Vec<ActivityRecord>, SourceError> {
        let per_page = page_size.clamp(1, MAX_PAGE_SIZE);
        if per_page != page_size {
            warn!("Page size {} out of range, using {}", page_size, per_page);
        }

        let request = self
            .client
            .get(format!("{}/athlete/activities", self.api_base))
            .query(&[("per_page", per_page)]);
        let page: Vec<serde_json::Value> = send_json(request, credential, "list activities").await?;
        let listed = page.len();
        let records = decode_page(page);

        info!(
            "[ActivityClient] Listed {} recent activities ({} undecodable)",
            records.len(),
            listed - records.len()
        );
        Ok(records)
    }

    /// Detailed form of one activity (adds `description`).
    pub async fn get_activity_detail(
        &self,
        credential: &AccessCredential,
        id: &ActivityId,
    ) -> Result<ActivityRecord, SourceError> {
        let request = self
            .client
            .get(format!("{}/activities/{}", self.api_base, id));
        send_json(request, credential, &format!("activity {}", id)).await
    }

    /// Fetch details for `ids` with bounded concurrency.
    ///
    /// Results come back in the order of `ids`; failures are carried per id
    /// and never abort the batch.
    pub async fn fetch_details(
        &self,
        credential: &AccessCredential,
        ids: Vec<ActivityId>,
    ) -> Vec<ActivityDetailResult> {
        use futures::stream::{self, StreamExt};

        let total = ids.len() as u32;
        if total == 0 {
            return Vec::new();
        }
        let completed = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        info!(
            "[ActivityClient] Fetching {} activity details (max concurrent: {}, dispatch interval: {:?})",
            total, self.max_concurrency, self.rate_limiter.interval
        );

        let results: Vec<ActivityDetailResult> = stream::iter(ids)
            .map(|id| {
                let rate_limiter = &self.rate_limiter;
                let completed = Arc::clone(&completed);

                async move {
                    let dispatch_num = rate_limiter.wait_for_dispatch_slot().await;
                    let req_start = Instant::now();
                    let record = self.get_activity_detail(credential, &id).await;

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        "[Progress] {}/{} | dispatch #{} | activity {} {} in {:?}",
                        done,
                        total,
                        dispatch_num,
                        id,
                        if record.is_ok() { "ok" } else { "failed" },
                        req_start.elapsed()
                    );

                    ActivityDetailResult {
                        activity_id: id,
                        record,
                    }
                }
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let success_count = results.iter().filter(|r| r.record.is_ok()).count();
        info!(
            "[ActivityClient] DONE: {}/{} details ({} errors) in {:.2}s",
            success_count,
            total,
            results.len() - success_count,
            start.elapsed().as_secs_f64()
        );

        results
    }
}

async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    credential: &AccessCredential,
    operation: &str,
) -> Result<T, SourceError> {
    let req_start = Instant::now();
    let response = request
        .header(AUTHORIZATION, credential.bearer_header())
        .send()
        .await
        .map_err(|e| SourceError::Transport {
            operation: operation.to_string(),
            details: e.to_string(),
        })?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("[{}] 429 Too Many Requests after {:?}", operation, req_start.elapsed());
        return Err(SourceError::RateLimited {
            operation: operation.to_string(),
        });
    }
    if !status.is_success() {
        return Err(SourceError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes().await.map_err(|e| SourceError::Transport {
        operation: operation.to_string(),
        details: format!("Body download error: {}", e),
    })?;
    debug!(
        "[{}] {:.1}KB in {:?}",
        operation,
        bytes.len() as f64 / 1024.0,
        req_start.elapsed()
    );

    serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode {
        operation: operation.to_string(),
        details: e.to_string(),
    })
}
