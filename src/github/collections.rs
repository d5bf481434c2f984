//! Cached REST reads and paginated collections.
//!
//! Every GET goes through the tiered cache first. A fresh entry answers
//! without touching GitHub; a stale entry with an ETag turns into a
//! conditional request so an unchanged resource costs a `304` instead of a
//! full response. Each call reports what it cost.
//!
//! Entries are partitioned by the app that read them, so one purpose never
//! sees a response fetched with another purpose's credentials.

use crate::error::{PortalError, Result};
use crate::github::cache::{CacheTier, CachedEntry, TieredCache};
use crate::github::{github_headers, next_page_link, truncate_error_body};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{AUTHORIZATION, ETAG, IF_NONE_MATCH};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::ops::AddAssign;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Who a read is made as.
#[async_trait]
pub trait Credential: Send + Sync {
    /// Cache partition for responses read with this credential.
    fn cache_scope(&self) -> String;

    /// Only called when a request actually goes to GitHub.
    async fn authorization_header(&self) -> Result<String>;
}

pub fn scope_for_app(app_id: u64) -> String {
    format!("app:{app_id}")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApiCost {
    pub local_cache_hits: u32,
    pub shared_cache_hits: u32,
    pub not_modified: u32,
    pub remote_calls: u32,
    pub pages: u32,
}

impl AddAssign for ApiCost {
    fn add_assign(&mut self, other: Self) {
        self.local_cache_hits += other.local_cache_hits;
        self.shared_cache_hits += other.shared_cache_hits;
        self.not_modified += other.not_modified;
        self.remote_calls += other.remote_calls;
        self.pages += other.pages;
    }
}

impl ApiCost {
    pub fn summary(&self) -> String {
        format!(
            "{} remote call(s), {} not modified, {} local hit(s), {} shared hit(s), {} page(s)",
            self.remote_calls,
            self.not_modified,
            self.local_cache_hits,
            self.shared_cache_hits,
            self.pages
        )
    }
}

#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub value: T,
    pub cost: ApiCost,
}

#[derive(Debug, Clone)]
pub struct Collection<T> {
    pub items: Vec<T>,
    pub cost: ApiCost,
}

pub struct RestCollections {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<TieredCache>,
    limiter: Arc<Semaphore>,
}

impl RestCollections {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        cache: Arc<TieredCache>,
        concurrency: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn absolute_url(&self, route: &str) -> String {
        if route.starts_with("http://") || route.starts_with("https://") {
            route.to_string()
        } else {
            format!("{}{}", self.base_url, route)
        }
    }

    fn cache_key(scope: &str, url: &str) -> String {
        format!("rest:{scope}:{url}")
    }

    pub async fn get_cached<T: DeserializeOwned>(
        &self,
        credential: &dyn Credential,
        route: &str,
        max_age: Duration,
    ) -> Result<Cached<T>> {
        let mut cost = ApiCost::default();
        let entry = self
            .fetch_entry(credential, &self.absolute_url(route), max_age, &mut cost)
            .await?;
        Ok(Cached {
            value: serde_json::from_value(entry.body)?,
            cost,
        })
    }

    /// Reads every page of a collection, following `Link` headers.
    pub async fn get_collection<T: DeserializeOwned>(
        &self,
        credential: &dyn Credential,
        route: &str,
        max_age: Duration,
    ) -> Result<Collection<T>> {
        let mut cost = ApiCost::default();
        let mut items = Vec::new();
        let mut next = Some(self.absolute_url(route));
        while let Some(url) = next {
            let entry = self
                .fetch_entry(credential, &url, max_age, &mut cost)
                .await?;
            cost.pages += 1;
            let page: Vec<T> = serde_json::from_value(entry.body)?;
            items.extend(page);
            next = entry.next;
        }
        Ok(Collection { items, cost })
    }

    /// Bypasses the cache entirely.
    pub async fn get_uncached<T: DeserializeOwned>(
        &self,
        credential: &dyn Credential,
        route: &str,
    ) -> Result<T> {
        let url = self.absolute_url(route);
        let authorization = credential.authorization_header().await?;
        let _permit = self.permit().await?;
        let response = self
            .http
            .get(&url)
            .headers(github_headers())
            .header(AUTHORIZATION, &authorization)
            .send()
            .await?;
        let response = check_response(response, &url).await?;
        Ok(response.json().await?)
    }

    /// Forgets every cached page of `route` in each of `scopes`, following
    /// the next-page links recorded with the pages.
    pub async fn invalidate(&self, scopes: &[String], route: &str) -> Result<()> {
        let first = self.absolute_url(route);
        for scope in scopes {
            let mut visited = HashSet::new();
            let mut next = Some(first.clone());
            while let Some(url) = next {
                if !visited.insert(url.clone()) {
                    break;
                }
                let key = Self::cache_key(scope, &url);
                next = self
                    .cache
                    .lookup(&key)
                    .await?
                    .and_then(|(entry, _)| entry.next);
                self.cache.remove(&key).await?;
            }
        }
        Ok(())
    }

    async fn permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.limiter
            .acquire()
            .await
            .map_err(|_| PortalError::GitHub("request limiter closed".into()))
    }

    async fn fetch_entry(
        &self,
        credential: &dyn Credential,
        url: &str,
        max_age: Duration,
        cost: &mut ApiCost,
    ) -> Result<CachedEntry> {
        let scope = credential.cache_scope();
        let key = Self::cache_key(&scope, url);
        let now = Utc::now();

        let stale = match self.cache.lookup(&key).await? {
            Some((entry, tier)) if entry.is_fresh(max_age, now) => {
                match tier {
                    CacheTier::Local => cost.local_cache_hits += 1,
                    CacheTier::Shared => cost.shared_cache_hits += 1,
                }
                debug!(url, scope = %scope, ?tier, "cache hit");
                return Ok(entry);
            }
            other => other.map(|(entry, _)| entry),
        };

        let authorization = credential.authorization_header().await?;
        let _permit = self.permit().await?;
        let mut request = self
            .http
            .get(url)
            .headers(github_headers())
            .header(AUTHORIZATION, &authorization);
        if let Some(etag) = stale.as_ref().and_then(|e| e.etag.as_deref()) {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = request.send().await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            let Some(mut entry) = stale else {
                return Err(PortalError::GitHub(format!(
                    "{url} answered 304 without a cached representation"
                )));
            };
            entry.fetched = now;
            self.cache.store(&key, &entry).await?;
            cost.not_modified += 1;
            debug!(url, "not modified");
            return Ok(entry);
        }

        let response = check_response(response, url).await?;
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let next = next_page_link(response.headers());
        let body: serde_json::Value = response.json().await?;
        cost.remote_calls += 1;

        let entry = CachedEntry {
            etag,
            fetched: now,
            next,
            body,
        };
        self.cache.store(&key, &entry).await?;
        Ok(entry)
    }
}

/// Maps unsuccessful responses onto portal errors.
pub(crate) async fn check_response(response: Response, url: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(PortalError::NotFound(url.to_string()));
    }

    let headers = response.headers();
    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    if exhausted && (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS) {
        let reset = headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| dt.format("%H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "an unknown time".to_string());
        return Err(PortalError::RateLimited(reset));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    let detail = match message {
        Some(message) => message,
        None => truncate_error_body(body),
    };
    Err(PortalError::GitHub(format!("{status} - {detail}")))
}
