// src/providers/shopping.rs
//! Product adapter: SerpAPI Google Shopping search, paged by numeric offset
//! with cross-page de-duplication and price parsing into integer cents.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use tracing::warn;

use crate::cache::FeedCache;
use crate::config::Env;
use crate::providers::FeedProvider;
use crate::types::{FeedItem, FeedType, ItemCore, ProviderContext, ProviderResult};

const SEARCH_URL: &str = "https://serpapi.com/search.json";
const QUERY: &str = "kpop demon hunter";

/// Adapter result cap, matching the feed-limit policy for products.
const RESULT_CAP: usize = 200;
/// Safety ceiling on upstream pages per request.
const MAX_PAGES: usize = 6;
/// Observed SerpAPI shopping page size; the offset step between pages.
const PAGE_SIZE: usize = 60;
const CACHE_TTL_SECS: u64 = 60 * 60 * 24;

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    shopping_results: Vec<ShoppingResult>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ShoppingResult {
    product_id: Option<String>,
    title: Option<String>,
    product_link: Option<String>,
    thumbnail: Option<String>,
    source: Option<String>,
    /// Display string like "$12.34".
    price: Option<String>,
    extracted_price: Option<f64>,
    rating: Option<f64>,
    reviews: Option<u64>,
}

/// Integer cents from a pre-extracted numeric price, else from the display
/// string with non-numeric characters stripped.
pub fn parse_price_cents(price: Option<&str>, extracted: Option<f64>) -> Option<u64> {
    if let Some(value) = extracted {
        if value.is_finite() && value >= 0.0 {
            return Some((value * 100.0).round() as u64);
        }
    }
    let price = price?;
    // strip currency symbols and thousands separators, keep digits and '.'
    let numeric: String = price
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value = numeric.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * 100.0).round() as u64)
}

/// Review count when present, else rating scaled by 100, else absent.
fn derive_popularity(reviews: Option<u64>, rating: Option<f64>) -> Option<u64> {
    if let Some(reviews) = reviews {
        return Some(reviews);
    }
    rating
        .filter(|r| r.is_finite() && *r >= 0.0)
        .map(|r| (r * 100.0).round() as u64)
}

fn to_item(r: ShoppingResult, offset: usize, idx: usize) -> FeedItem {
    let price_cents = parse_price_cents(r.price.as_deref(), r.extracted_price);
    let popularity = derive_popularity(r.reviews, r.rating);
    FeedItem::Product {
        core: ItemCore {
            id: r
                .product_id
                .unwrap_or_else(|| format!("gshop-{offset}-{idx}")),
            title: r.title.unwrap_or_else(|| "Product".to_string()),
            url: r.product_link.unwrap_or_else(|| "#".to_string()),
            thumbnail_url: r.thumbnail,
            published_at: None,
            popularity,
            source: r.source.unwrap_or_else(|| "Google Shopping".to_string()),
        },
        price_cents,
    }
}

/// Drive the page loop over any page source: accumulate de-duplicated items
/// until the target, the page ceiling, or an empty page. A failed page ends
/// the walk and surfaces its message next to whatever was gathered so far.
async fn collect_products<F, Fut>(
    mut fetch_page: F,
    target: usize,
) -> (Vec<FeedItem>, Option<String>)
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Vec<ShoppingResult>, String>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut items: Vec<FeedItem> = Vec::new();
    let mut offset = 0usize;

    for _ in 0..MAX_PAGES {
        let raw = match fetch_page(offset).await {
            Ok(raw) => raw,
            Err(message) => return (items, Some(message)),
        };
        if raw.is_empty() {
            break;
        }

        for (idx, r) in raw.into_iter().enumerate() {
            let dedupe_key = r
                .product_id
                .clone()
                .or_else(|| r.product_link.clone())
                .unwrap_or_else(|| format!("{offset}-{idx}"));
            if !seen.insert(dedupe_key) {
                continue;
            }
            items.push(to_item(r, offset, idx));
            if items.len() >= target {
                return (items, None);
            }
        }
        offset += PAGE_SIZE;
    }

    (items, None)
}

pub struct ShoppingProvider {
    cache: Arc<FeedCache>,
    client: reqwest::Client,
    api_key: Option<String>,
}

impl ShoppingProvider {
    pub fn new(cache: Arc<FeedCache>, env: &Env) -> Self {
        Self {
            cache,
            client: reqwest::Client::new(),
            api_key: env.serpapi_api_key.clone(),
        }
    }

    async fn fetch_page(&self, api_key: &str, offset: usize) -> Result<Vec<ShoppingResult>, String> {
        let params = [
            ("engine", "google_shopping".to_string()),
            ("q", QUERY.to_string()),
            ("hl", "en".to_string()),
            ("api_key", api_key.to_string()),
            ("start", offset.to_string()),
        ];
        let resp = self
            .client
            .get(SEARCH_URL)
            .query(&params)
            .send()
            .await
            .map_err(|_| "Shopping search request failed".to_string())?;
        if !resp.status().is_success() {
            return Err(format!("Shopping search error: HTTP {}", resp.status()));
        }
        let json = resp
            .json::<SerpResponse>()
            .await
            .map_err(|_| "Shopping search request failed".to_string())?;
        if let Some(message) = json.error {
            return Err(format!("Shopping search error: {message}"));
        }
        Ok(json.shopping_results)
    }
}

#[async_trait]
impl FeedProvider for ShoppingProvider {
    fn name(&self) -> &'static str {
        "shopping"
    }

    fn kind(&self) -> FeedType {
        FeedType::Product
    }

    async fn fetch(&self, ctx: &ProviderContext) -> ProviderResult {
        let key = format!(
            "gshop:{}:{}:{}",
            ctx.sort.as_str(),
            ctx.limit,
            ctx.cursor_key()
        );
        if let Some(hit) = self.cache.get::<ProviderResult>(&key).await {
            return hit;
        }

        let Some(api_key) = self.api_key.clone() else {
            return ProviderResult::empty();
        };

        let target = RESULT_CAP.min(ctx.limit);
        let (items, error) =
            collect_products(|offset| self.fetch_page(&api_key, offset), target).await;
        if let Some(message) = &error {
            warn!(%message, "shopping page fetch failed");
            counter!("provider_errors_total", "provider" => "shopping").increment(1);
        }

        let result = ProviderResult {
            items,
            next_cursor: None,
            errors: error.map(|m| BTreeMap::from([(self.name().to_string(), m)])),
        };
        // a partial batch with a recorded failure stays uncached
        if result.errors.is_none() {
            self.cache.set(&key, &result, CACHE_TTL_SECS).await;
        }
        result
    }
}
