//! Pagination handling for the Canvas API.

use crate::client::CanvasClient;
use crate::errors::CanvasResult;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use url::Url;

/// Largest page size the API honours.
pub const MAX_PER_PAGE: u32 = 100;

/// Pagination links parsed from the Link header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationLinks {
    /// URL for the current page.
    pub current: Option<String>,
    /// URL for the next page.
    pub next: Option<String>,
    /// URL for the previous page.
    pub prev: Option<String>,
    /// URL for the first page.
    pub first: Option<String>,
    /// URL for the last page.
    pub last: Option<String>,
}

impl PaginationLinks {
    /// Parses pagination links from a Link header value (RFC 8288).
    ///
    /// URLs are taken verbatim from between `<` and `>`, so commas inside a
    /// URL do not split it.
    pub fn from_header(header_value: &str) -> Self {
        let mut links = Self::default();
        let mut rest = header_value;

        while let Some(start) = rest.find('<') {
            let Some(len) = rest[start + 1..].find('>') else {
                break;
            };
            let url = &rest[start + 1..start + 1 + len];
            let after = &rest[start + 2 + len..];
            let params_end = after.find('<').unwrap_or(after.len());
            let params = &after[..params_end];

            for segment in params.split([';', ',']) {
                let segment = segment.trim();
                let Some(value) = segment.strip_prefix("rel=") else {
                    continue;
                };
                for rel in value.trim_matches('"').split_whitespace() {
                    let slot = match rel {
                        "current" => &mut links.current,
                        "next" => &mut links.next,
                        "prev" | "previous" => &mut links.prev,
                        "first" => &mut links.first,
                        "last" => &mut links.last,
                        _ => continue,
                    };
                    *slot = Some(url.to_string());
                }
            }

            rest = &after[params_end..];
        }

        links
    }

    /// Parses pagination links from response headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get("link")
            .and_then(|v| v.to_str().ok())
            .map(Self::from_header)
            .unwrap_or_default()
    }

    /// Returns true if there is a next page.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Resolves relative links against the URL of the page that carried
    /// them. Links that cannot be resolved are kept as sent.
    pub fn resolve_against(self, page_url: &Url) -> Self {
        let resolve = |link: Option<String>| {
            link.map(|l| match page_url.join(&l) {
                Ok(url) => url.to_string(),
                Err(_) => l,
            })
        };

        Self {
            current: resolve(self.current),
            next: resolve(self.next),
            prev: resolve(self.prev),
            first: resolve(self.first),
            last: resolve(self.last),
        }
    }
}

/// A single page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Pagination links.
    pub links: PaginationLinks,
}

impl<T> Page<T> {
    /// Creates a new page.
    pub fn new(items: Vec<T>, links: PaginationLinks) -> Self {
        Self { items, links }
    }

    /// Returns true if there is a next page.
    pub fn has_next(&self) -> bool {
        self.links.has_next()
    }

    /// Returns the URL for the next page.
    pub fn next_url(&self) -> Option<&str> {
        self.links.next.as_deref()
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consumes the page and returns the items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Pagination parameters for list requests.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PaginationParams {
    /// Items per page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
}

impl PaginationParams {
    /// Creates new pagination parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets items per page, clamped to the API maximum.
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page.clamp(1, MAX_PER_PAGE));
        self
    }
}

/// Cursor that follows `rel="next"` links one page at a time.
///
/// Pages are fetched strictly in link order. The cursor cannot be restarted;
/// after the last page, or after any failure, it yields nothing more.
pub struct Paginator<'a, T> {
    client: &'a CanvasClient,
    next_url: Option<String>,
    pages_fetched: u32,
    _phantom: PhantomData<fn() -> T>,
}

impl<'a, T: DeserializeOwned> Paginator<'a, T> {
    /// Creates a cursor starting at `target` (a path or absolute URL).
    pub fn new(client: &'a CanvasClient, target: impl Into<String>) -> Self {
        Self {
            client,
            next_url: Some(target.into()),
            pages_fetched: 0,
            _phantom: PhantomData,
        }
    }

    /// Fetches the next page.
    pub async fn next_page(&mut self) -> CanvasResult<Option<Page<T>>> {
        let Some(target) = self.next_url.take() else {
            return Ok(None);
        };

        let page: Page<T> = self.client.get_page(&target).await?;
        self.pages_fetched += 1;
        self.next_url = page.links.next.clone();

        Ok(Some(page))
    }

    /// Collects all items from all remaining pages.
    ///
    /// Any page failure discards what was collected so far.
    pub async fn collect_all(mut self) -> CanvasResult<Vec<T>> {
        let mut all_items = Vec::new();

        while let Some(page) = self.next_page().await? {
            all_items.extend(page.into_items());
        }

        tracing::debug!(
            pages = self.pages_fetched,
            items = all_items.len(),
            "Pagination walk finished"
        );
        Ok(all_items)
    }

    /// Returns true if there are more pages.
    pub fn has_more(&self) -> bool {
        self.next_url.is_some()
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }
}
