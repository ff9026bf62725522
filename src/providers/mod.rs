// src/providers/mod.rs
//! Provider trait and the aggregator that fans requests out to the
//! adapters, merges their results, and fronts the whole thing with the
//! feed-level cache.

pub mod rss;
pub mod shopping;
pub mod youtube;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;

use crate::cache::FeedCache;
use crate::config::Env;
use crate::limits::feed_limit;
use crate::types::{
    sort_items, FeedItem, FeedType, ProviderContext, ProviderResult, SortMode,
};

pub use rss::RssProvider;
pub use shopping::ShoppingProvider;
pub use youtube::YoutubeProvider;

const FEED_CACHE_TTL_SECS: u64 = 60 * 60 * 24;

/// One upstream content source. Adapters never fail the whole request:
/// faults are reported through `ProviderResult::errors`.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> FeedType;
    async fn fetch(&self, ctx: &ProviderContext) -> ProviderResult;
}

/// Round-robin interleave for the combined feed: each category is sorted
/// on its own, then rounds of video, article, product fill the head of the
/// list (empty categories are skipped, not padded). Whatever is left over
/// competes in a single re-sorted pool for the remaining slots.
pub fn interleave_balanced(items: Vec<FeedItem>, sort: SortMode, limit: usize) -> Vec<FeedItem> {
    let mut videos = Vec::new();
    let mut articles = Vec::new();
    let mut products = Vec::new();
    for item in items {
        match item.kind() {
            FeedType::Video => videos.push(item),
            FeedType::Article => articles.push(item),
            _ => products.push(item),
        }
    }
    sort_items(&mut videos, sort);
    sort_items(&mut articles, sort);
    sort_items(&mut products, sort);

    let per = (limit / 3).max(1);
    let rest_v = videos.split_off(per.min(videos.len()));
    let rest_a = articles.split_off(per.min(articles.len()));
    let rest_p = products.split_off(per.min(products.len()));

    let mut out = Vec::with_capacity(limit);
    let mut vs = videos.into_iter();
    let mut arts = articles.into_iter();
    let mut ps = products.into_iter();
    for _ in 0..per {
        for next in [vs.next(), arts.next(), ps.next()].into_iter().flatten() {
            out.push(next);
        }
    }

    let mut pool: Vec<FeedItem> = rest_v
        .into_iter()
        .chain(rest_a)
        .chain(rest_p)
        .collect();
    sort_items(&mut pool, sort);
    for item in pool {
        if out.len() >= limit {
            break;
        }
        out.push(item);
    }
    out.truncate(limit);
    out
}

/// Combine adapter results into one response: items merged per the feed
/// type, error maps unioned, and the first non-null cursor forwarded.
pub fn merge_results(ctx: &ProviderContext, results: Vec<ProviderResult>) -> ProviderResult {
    let mut items: Vec<FeedItem> = Vec::new();
    let mut errors: BTreeMap<String, String> = BTreeMap::new();
    let mut next_cursor: Option<String> = None;

    for result in results {
        if next_cursor.is_none() {
            next_cursor = result.next_cursor;
        }
        if let Some(map) = result.errors {
            errors.extend(map);
        }
        items.extend(result.items);
    }

    let mut merged = if ctx.feed_type == FeedType::All {
        interleave_balanced(items, ctx.sort, ctx.limit)
    } else {
        sort_items(&mut items, ctx.sort);
        items
    };
    merged.truncate(feed_limit(ctx.feed_type).min(ctx.limit));

    ProviderResult {
        items: merged,
        next_cursor,
        errors: (!errors.is_empty()).then_some(errors),
    }
}

pub struct Aggregator {
    cache: Arc<FeedCache>,
    providers: Vec<Arc<dyn FeedProvider>>,
}

impl Aggregator {
    pub fn new(cache: Arc<FeedCache>, providers: Vec<Arc<dyn FeedProvider>>) -> Self {
        Self { cache, providers }
    }

    /// The production wiring: one adapter per content category.
    pub fn with_default_providers(cache: Arc<FeedCache>, env: &Env) -> Self {
        let providers: Vec<Arc<dyn FeedProvider>> = vec![
            Arc::new(YoutubeProvider::new(Arc::clone(&cache), env)),
            Arc::new(RssProvider::new(Arc::clone(&cache))),
            Arc::new(ShoppingProvider::new(Arc::clone(&cache), env)),
        ];
        Self::new(cache, providers)
    }

    /// Serve a feed request: feed-level cache first, then a concurrent
    /// fan-out to every adapter matching the requested type.
    pub async fn fetch_feed(&self, ctx: &ProviderContext) -> ProviderResult {
        counter!(
            "feed_requests_total",
            "type" => ctx.feed_type.as_str(),
            "sort" => ctx.sort.as_str()
        )
        .increment(1);

        let key = format!(
            "feed:{}:{}:{}:{}",
            ctx.feed_type.as_str(),
            ctx.sort.as_str(),
            ctx.limit,
            ctx.cursor_key()
        );
        if let Some(hit) = self.cache.get::<ProviderResult>(&key).await {
            return hit;
        }

        let selected: Vec<&Arc<dyn FeedProvider>> = self
            .providers
            .iter()
            .filter(|p| ctx.feed_type == FeedType::All || p.kind() == ctx.feed_type)
            .collect();
        let results = join_all(selected.iter().map(|p| p.fetch(ctx))).await;
        let merged = merge_results(ctx, results);

        // partial failures stay uncached so the next request retries them
        if merged.errors.is_none() {
            self.cache.set(&key, &merged, FEED_CACHE_TTL_SECS).await;
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_item;

    struct StubProvider {
        name: &'static str,
        kind: FeedType,
        result: ProviderResult,
    }

    #[async_trait]
    impl FeedProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn kind(&self) -> FeedType {
            self.kind
        }

        async fn fetch(&self, _ctx: &ProviderContext) -> ProviderResult {
            self.result.clone()
        }
    }

    fn ctx(feed_type: FeedType, limit: usize) -> ProviderContext {
        ProviderContext {
            feed_type,
            sort: SortMode::Popular,
            limit,
            cursor: None,
        }
    }

    fn batch(kind: FeedType, count: usize, base_popularity: u64) -> Vec<FeedItem> {
        (0..count)
            .map(|i| {
                test_item(
                    kind,
                    &format!("{}-{i}", kind.as_str()),
                    Some(base_popularity + i as u64),
                )
            })
            .collect()
    }

    #[test]
    fn interleave_gives_each_category_a_fair_share() {
        let mut items = batch(FeedType::Video, 5, 100);
        items.extend(batch(FeedType::Article, 5, 200));
        items.extend(batch(FeedType::Product, 5, 300));

        let out = interleave_balanced(items, SortMode::Popular, 9);
        assert_eq!(out.len(), 9);
        let videos = out.iter().filter(|i| i.kind() == FeedType::Video).count();
        let articles = out.iter().filter(|i| i.kind() == FeedType::Article).count();
        let products = out.iter().filter(|i| i.kind() == FeedType::Product).count();
        assert_eq!((videos, articles, products), (3, 3, 3));
        // rounds run video, article, product
        assert_eq!(out[0].kind(), FeedType::Video);
        assert_eq!(out[1].kind(), FeedType::Article);
        assert_eq!(out[2].kind(), FeedType::Product);
    }

    #[test]
    fn interleave_skips_empty_categories_and_backfills_from_pool() {
        let mut items = batch(FeedType::Video, 6, 100);
        items.extend(batch(FeedType::Article, 1, 200));

        let out = interleave_balanced(items, SortMode::Popular, 6);
        assert_eq!(out.len(), 6);
        let videos = out.iter().filter(|i| i.kind() == FeedType::Video).count();
        assert_eq!(videos, 5);
    }

    #[test]
    fn merge_unions_errors_and_forwards_first_cursor() {
        let a = ProviderResult {
            items: batch(FeedType::Video, 2, 10),
            next_cursor: Some("CURSOR-A".into()),
            errors: None,
        };
        let b = ProviderResult::with_error("shopping", "Shopping search error: HTTP 429");
        let c = ProviderResult {
            items: batch(FeedType::Article, 2, 10),
            next_cursor: Some("CURSOR-C".into()),
            errors: Some(
                [("rss".to_string(), "feed HTTP 500".to_string())]
                    .into_iter()
                    .collect(),
            ),
        };

        let merged = merge_results(&ctx(FeedType::All, 10), vec![a, b, c]);
        assert_eq!(merged.next_cursor.as_deref(), Some("CURSOR-A"));
        let errors = merged.errors.unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains_key("shopping"));
        assert!(errors.contains_key("rss"));
        assert_eq!(merged.items.len(), 4);
    }

    #[test]
    fn single_type_merge_sorts_and_caps() {
        let result = ProviderResult {
            items: batch(FeedType::Video, 8, 0),
            next_cursor: None,
            errors: None,
        };
        let merged = merge_results(&ctx(FeedType::Video, 5), vec![result]);
        assert_eq!(merged.items.len(), 5);
        // descending popularity
        assert_eq!(merged.items[0].core().id, "video-7");
    }

    #[tokio::test]
    async fn aggregator_filters_providers_by_requested_type() {
        let cache = Arc::new(FeedCache::memory_only());
        let video: Arc<dyn FeedProvider> = Arc::new(StubProvider {
            name: "youtube",
            kind: FeedType::Video,
            result: ProviderResult {
                items: batch(FeedType::Video, 2, 10),
                next_cursor: None,
                errors: None,
            },
        });
        let product: Arc<dyn FeedProvider> = Arc::new(StubProvider {
            name: "shopping",
            kind: FeedType::Product,
            result: ProviderResult {
                items: batch(FeedType::Product, 2, 10),
                next_cursor: None,
                errors: None,
            },
        });
        let aggregator = Aggregator::new(cache, vec![video, product]);

        let only_videos = aggregator.fetch_feed(&ctx(FeedType::Video, 10)).await;
        assert_eq!(only_videos.items.len(), 2);
        assert!(only_videos.items.iter().all(|i| i.kind() == FeedType::Video));

        let combined = aggregator.fetch_feed(&ctx(FeedType::All, 10)).await;
        assert_eq!(combined.items.len(), 4);
    }

    #[tokio::test]
    async fn aggregator_serves_second_request_from_cache() {
        let cache = Arc::new(FeedCache::memory_only());
        let provider: Arc<dyn FeedProvider> = Arc::new(StubProvider {
            name: "youtube",
            kind: FeedType::Video,
            result: ProviderResult {
                items: batch(FeedType::Video, 1, 10),
                next_cursor: None,
                errors: None,
            },
        });
        let aggregator = Aggregator::new(Arc::clone(&cache), vec![provider]);
        let request = ctx(FeedType::Video, 10);

        let first = aggregator.fetch_feed(&request).await;
        let cached: Option<ProviderResult> = cache.get("feed:video:popular:10:").await;
        assert_eq!(cached, Some(first));
    }
}
