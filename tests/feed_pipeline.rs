// tests/feed_pipeline.rs
//
// Aggregator-level behavior that the HTTP tests do not pin down: feed-level
// caching of successful batches, retry of failed ones, and the balanced
// interleave of the combined feed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use huntrix_feed_aggregator::cache::FeedCache;
use huntrix_feed_aggregator::providers::{Aggregator, FeedProvider};
use huntrix_feed_aggregator::types::{
    FeedItem, FeedType, ItemCore, ProviderContext, ProviderResult, SortMode,
};

struct CountingProvider {
    name: &'static str,
    kind: FeedType,
    result: ProviderResult,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FeedProvider for CountingProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> FeedType {
        self.kind
    }

    async fn fetch(&self, _ctx: &ProviderContext) -> ProviderResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

fn item(kind: FeedType, id: &str, popularity: u64) -> FeedItem {
    let core = ItemCore {
        id: id.to_string(),
        title: format!("item {id}"),
        url: format!("https://example.com/{id}"),
        thumbnail_url: None,
        published_at: None,
        popularity: Some(popularity),
        source: "stub".to_string(),
    };
    match kind {
        FeedType::Video => FeedItem::Video { core },
        FeedType::Article => FeedItem::Article { core },
        _ => FeedItem::Product {
            core,
            price_cents: None,
        },
    }
}

fn batch(kind: FeedType, count: usize) -> ProviderResult {
    ProviderResult {
        items: (0..count)
            .map(|i| item(kind, &format!("{}-{i}", kind.as_str()), 100 + i as u64))
            .collect(),
        next_cursor: None,
        errors: None,
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

#[tokio::test]
async fn successful_batches_hit_the_feed_cache_on_repeat() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider: Arc<dyn FeedProvider> = Arc::new(CountingProvider {
        name: "youtube",
        kind: FeedType::Video,
        result: batch(FeedType::Video, 3),
        calls: Arc::clone(&calls),
    });
    let aggregator = Aggregator::new(Arc::new(FeedCache::memory_only()), vec![provider]);

    let request = ctx(FeedType::Video, 10);
    let first = aggregator.fetch_feed(&request).await;
    let second = aggregator.fetch_feed(&request).await;

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "second request is a cache hit");
}

#[tokio::test]
async fn failed_batches_are_retried_instead_of_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let provider: Arc<dyn FeedProvider> = Arc::new(CountingProvider {
        name: "shopping",
        kind: FeedType::Product,
        result: ProviderResult::with_error("shopping", "Shopping search error: HTTP 500"),
        calls: Arc::clone(&calls),
    });
    let aggregator = Aggregator::new(Arc::new(FeedCache::memory_only()), vec![provider]);

    let request = ctx(FeedType::Product, 10);
    aggregator.fetch_feed(&request).await;
    aggregator.fetch_feed(&request).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2, "error results stay uncached");
}

#[tokio::test]
async fn combined_feed_interleaves_categories_fairly() {
    let providers: Vec<Arc<dyn FeedProvider>> = vec![
        Arc::new(CountingProvider {
            name: "youtube",
            kind: FeedType::Video,
            result: batch(FeedType::Video, 5),
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(CountingProvider {
            name: "rss",
            kind: FeedType::Article,
            result: batch(FeedType::Article, 5),
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(CountingProvider {
            name: "shopping",
            kind: FeedType::Product,
            result: batch(FeedType::Product, 5),
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    ];
    let aggregator = Aggregator::new(Arc::new(FeedCache::memory_only()), providers);

    let result = aggregator.fetch_feed(&ctx(FeedType::All, 9)).await;
    assert_eq!(result.items.len(), 9);
    for kind in [FeedType::Video, FeedType::Article, FeedType::Product] {
        let count = result.items.iter().filter(|i| i.kind() == kind).count();
        assert_eq!(count, 3, "{} should get a fair share", kind.as_str());
    }
    // within each category, popular sort is descending
    let video_pops: Vec<u64> = result
        .items
        .iter()
        .filter(|i| i.kind() == FeedType::Video)
        .map(|i| i.popularity())
        .collect();
    let mut sorted = video_pops.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(video_pops, sorted);
}

#[tokio::test]
async fn one_empty_category_leaves_room_for_the_rest() {
    let providers: Vec<Arc<dyn FeedProvider>> = vec![
        Arc::new(CountingProvider {
            name: "youtube",
            kind: FeedType::Video,
            result: batch(FeedType::Video, 6),
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(CountingProvider {
            name: "rss",
            kind: FeedType::Article,
            result: batch(FeedType::Article, 0),
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    ];
    let aggregator = Aggregator::new(Arc::new(FeedCache::memory_only()), providers);

    let result = aggregator.fetch_feed(&ctx(FeedType::All, 6)).await;
    assert_eq!(result.items.len(), 6);
    assert!(result.items.iter().all(|i| i.kind() == FeedType::Video));
}
