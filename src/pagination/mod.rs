//! Cursor-paginated list endpoints as a single lazy stream.
//!
//! Bitbucket-style endpoints answer with one page and a `next` URL:
//!
//! ```json
//! {"size": 40, "page": 1, "pagelen": 20, "next": "https://...?page=2", "values": [...]}
//! ```
//!
//! [`PaginatedResponse::all`] yields every value of every page in order,
//! fetching further pages only as the consumer pulls. Fetch failures end the
//! stream early and are kept for [`PaginatedResponse::take_error`] once the
//! stream is drained.
//!
//! # Usage
//!
//! ```no_run
//! use daylog::broker::AuthenticatedClient;
//! use daylog::pagination::{Page, PaginatedResponse};
//! use futures::StreamExt;
//!
//! # async fn run(client: AuthenticatedClient) -> anyhow::Result<()> {
//! let first: Page<serde_json::Value> = client.get_json("https://api.bitbucket.org/2.0/repositories/acme").await?;
//! let mut repos = PaginatedResponse::new(first, client);
//!
//! let mut items = repos.all();
//! while let Some(repo) = items.next().await {
//!     println!("{}", repo["full_name"]);
//! }
//! if let Some(err) = repos.take_error() {
//!     return Err(err);
//! }
//! # Ok(())
//! # }
//! ```

use crate::broker::AuthenticatedClient;
use anyhow::{Error, Result};
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// One page of a paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Total number of values across all pages, when the endpoint reports it
    #[serde(default)]
    pub size: Option<u64>,
    /// 1-based index of this page
    #[serde(default)]
    pub page: Option<u64>,
    /// Values per page
    #[serde(default)]
    pub pagelen: Option<u64>,
    /// URL of the next page; absent or empty on the last page
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
}

impl<T> Page<T> {
    /// A page holding `values` with no continuation.
    pub fn single(values: Vec<T>) -> Self {
        Self {
            size: None,
            page: None,
            pagelen: None,
            next: None,
            values,
        }
    }

    /// The URL to fetch after this page, if following it is safe.
    ///
    /// Some endpoints keep returning a `next` link even though `size` says
    /// every value has already been delivered. When
    /// `size < pagelen * page` the walk stops here regardless of `next`.
    /// Without a reported `size` the link is trusted. This differs from
    /// reading a missing `size` as 0, which would stop every such endpoint
    /// after its first page.
    pub fn next_link(&self) -> Option<&str> {
        let next = self.next.as_deref()?;
        if let (Some(size), Some(pagelen)) = (self.size, self.pagelen) {
            let page = self.page.unwrap_or(1);
            if size < pagelen.saturating_mul(page) {
                debug!(size, pagelen, page, "Reported size exhausted, ignoring next link");
                return None;
            }
        }
        Some(next)
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// Deferred error from a pagination walk.
///
/// Shared between the stream and its owner; holds the first failure only.
#[derive(Clone, Default)]
struct ErrorSlot(Arc<Mutex<Option<Error>>>);

impl ErrorSlot {
    fn record(&self, err: Error) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Remove and return the recorded failure.
    fn take(&self) -> Option<Error> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Stream of values produced by [`PaginatedResponse::all`].
pub type Items<T> = BoxStream<'static, T>;

/// First page of a list endpoint plus what is needed to fetch the rest.
///
/// Single pass: once [`all`](Self::all) has been called, later calls yield
/// nothing.
pub struct PaginatedResponse<T> {
    first: Option<Page<T>>,
    client: AuthenticatedClient,
    error: ErrorSlot,
}

struct Walk<T> {
    buffered: VecDeque<T>,
    next: Option<String>,
    client: AuthenticatedClient,
    error: ErrorSlot,
}

impl<T> PaginatedResponse<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Wrap a first page fetched with `client`.
    pub fn new(first: Page<T>, client: AuthenticatedClient) -> Self {
        Self {
            first: Some(first),
            client,
            error: ErrorSlot::default(),
        }
    }

    /// Fetch the first page at `url` and wrap it.
    pub async fn fetch(client: AuthenticatedClient, url: &str) -> Result<Self> {
        let first = client.get_json::<Page<T>>(url).await?;
        Ok(Self::new(first, client))
    }

    /// Every value across all pages, in page order.
    ///
    /// Ends at the last page, when the reported size is exhausted, or at the
    /// first fetch failure (see [`take_error`](Self::take_error)).
    pub fn all(&mut self) -> Items<T> {
        let Some(first) = self.first.take() else {
            return stream::empty().boxed();
        };

        let walk = Walk {
            next: first.next_link().map(str::to_string),
            buffered: first.values.into(),
            client: self.client.clone(),
            error: self.error.clone(),
        };

        stream::unfold(walk, |mut walk| async move {
            loop {
                if let Some(value) = walk.buffered.pop_front() {
                    return Some((value, walk));
                }
                let url = walk.next.take()?;
                match walk.client.get_json::<Page<T>>(&url).await {
                    Ok(page) => {
                        walk.next = page.next_link().map(str::to_string);
                        walk.buffered = page.values.into();
                    }
                    Err(e) => {
                        warn!(service = %walk.client.service(), url = %url, error = %e, "Failed to fetch next page");
                        walk.error.record(e);
                        return None;
                    }
                }
            }
        })
        .boxed()
    }

    /// Like [`all`](Self::all), but a fetch failure arrives as the final
    /// `Err` element instead of waiting in the error slot.
    pub fn try_all(&mut self) -> BoxStream<'static, Result<T>> {
        let error = self.error.clone();
        let values = self.all().map(Ok);
        let trailing_error = stream::once(async move { error.take() })
            .filter_map(|err| async move { err.map(Err) });
        values.chain(trailing_error).boxed()
    }

    /// Drain every page into a vector.
    ///
    /// # Returns
    /// * `Ok(Vec<T>)` - All values
    /// * `Err` - A page fetch failed; values gathered so far are dropped
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let values: Vec<T> = self.all().collect().await;
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(values),
        }
    }

    /// Remove and return the failure that ended the walk, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.error.take()
    }
}
