//! Listing feeds with cursor pagination.
//!
//! Every feed is the listings collection filtered one way and ordered by
//! creation time, newest first. A page shorter than the requested size ends
//! the feed; the store's cursor for that page is not handed out.

use crate::backend::traits::DocumentStore;
use crate::backend::types::{Cursor, Filter, OrderBy, Query, SERVER_TIMESTAMP_FIELD};
use crate::backend::Backend;
use crate::config::Config;
use crate::error::MarketError;
use crate::models::{Listing, ListingType};
use crate::notify::Notifier;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which slice of the listings collection a feed shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFilter {
    Category(ListingType),
    Offers,
    Owner(String),
    /// Everything, newest first
    Recent,
}

impl FeedFilter {
    pub fn query(&self) -> Query {
        let query = match self {
            FeedFilter::Category(kind) => Query::new().filter(Filter::eq("type", kind.as_str())),
            FeedFilter::Offers => Query::new().filter(Filter::eq("offer", true)),
            FeedFilter::Owner(uid) => Query::new().filter(Filter::eq("userRef", uid.as_str())),
            FeedFilter::Recent => Query::new(),
        };
        query.order_by(OrderBy::desc(SERVER_TIMESTAMP_FIELD))
    }
}

/// One page of a feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub items: Vec<Listing>,
    /// Cursor for the following page, `None` once the feed is exhausted
    pub next_cursor: Option<Cursor>,
}

/// Fetch one page of a feed, continuing after `cursor` when given
pub async fn fetch_page(
    store: &dyn DocumentStore,
    collection: &str,
    filter: &FeedFilter,
    page_size: usize,
    cursor: Option<&Cursor>,
) -> Result<FeedPage, MarketError> {
    if page_size == 0 {
        return Ok(FeedPage {
            items: Vec::new(),
            next_cursor: None,
        });
    }

    let mut query = filter.query().limit(page_size);
    if let Some(cursor) = cursor {
        query = query.start_after(cursor.clone());
    }

    let page = store
        .query(collection, query)
        .await
        .map_err(MarketError::Store)?;

    let items = page
        .documents
        .iter()
        .map(Listing::from_document)
        .collect::<Result<Vec<_>, _>>()
        .map_err(MarketError::Store)?;

    let next_cursor = if items.len() < page_size {
        None
    } else {
        page.cursor
    };

    debug!(
        ?filter,
        fetched = items.len(),
        more = next_cursor.is_some(),
        "Fetched feed page"
    );

    Ok(FeedPage { items, next_cursor })
}

/// Fetch the newest listings for the landing carousel
pub async fn recent_listings(backend: &Backend, config: &Config) -> Result<Vec<Listing>, MarketError> {
    let page = fetch_page(
        backend.store.as_ref(),
        &config.listings_collection,
        &FeedFilter::Recent,
        config.carousel_size,
        None,
    )
    .await?;
    Ok(page.items)
}

/// Accumulating feed behind a "load more" button
pub struct ListingFeed {
    store: Arc<dyn DocumentStore>,
    collection: String,
    filter: FeedFilter,
    page_size: usize,
    listings: Vec<Listing>,
    cursor: Option<Cursor>,
    exhausted: bool,
    mounted: CancellationToken,
    notifier: Option<Notifier>,
}

impl ListingFeed {
    pub fn new(
        backend: &Backend,
        config: &Config,
        filter: FeedFilter,
        mounted: CancellationToken,
    ) -> Self {
        Self {
            store: Arc::clone(&backend.store),
            collection: config.listings_collection.clone(),
            filter,
            page_size: config.page_size,
            listings: Vec::new(),
            cursor: None,
            exhausted: false,
            mounted,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    pub fn has_more(&self) -> bool {
        !self.exhausted
    }

    /// Switch to another filter, dropping the displayed listings and cursor
    pub fn set_filter(&mut self, filter: FeedFilter) {
        if self.filter != filter {
            self.filter = filter;
            self.reset();
        }
    }

    /// Load the first page, replacing whatever was displayed
    pub async fn load(&mut self) -> Result<usize, MarketError> {
        let page = self.fetch(None).await?;
        self.reset();
        Ok(self.apply(page))
    }

    /// Append the next page; returns how many listings were added
    pub async fn load_more(&mut self) -> Result<usize, MarketError> {
        if self.exhausted {
            return Ok(0);
        }
        let cursor = self.cursor.clone();
        let page = self.fetch(cursor.as_ref()).await?;
        Ok(self.apply(page))
    }

    fn reset(&mut self) {
        self.listings.clear();
        self.cursor = None;
        self.exhausted = false;
    }

    async fn fetch(&self, cursor: Option<&Cursor>) -> Result<FeedPage, MarketError> {
        let result = fetch_page(
            self.store.as_ref(),
            &self.collection,
            &self.filter,
            self.page_size,
            cursor,
        )
        .await;

        if self.mounted.is_cancelled() {
            debug!("Feed torn down, discarding page");
            return Err(MarketError::Cancelled);
        }

        result.map_err(|err| {
            warn!(error = %err, "Could not fetch listings");
            if let Some(notifier) = &self.notifier {
                notifier.report(&err);
            }
            err
        })
    }

    fn apply(&mut self, page: FeedPage) -> usize {
        let added = page.items.len();
        self.exhausted = page.next_cursor.is_none();
        self.cursor = page.next_cursor;
        self.listings.extend(page.items);
        info!(added, total = self.listings.len(), "Feed updated");
        added
    }
}
