// src/types.rs
//! Common feed data model: the tagged item union, request context, and
//! provider results shared by every adapter and the aggregator.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    All,
    Video,
    Article,
    Product,
}

impl FeedType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "video" => Some(Self::Video),
            "article" => Some(Self::Article),
            "product" => Some(Self::Product),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Video => "video",
            Self::Article => "article",
            Self::Product => "product",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Popular,
    Recent,
}

impl SortMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "popular" => Some(Self::Popular),
            "recent" => Some(Self::Recent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Popular => "popular",
            Self::Recent => "recent",
        }
    }
}

/// Fields shared by every feed item variant. Wire names are camelCase to
/// stay compatible with the page that consumes the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCore {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// ISO-8601 publish timestamp when the upstream provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    /// View count, review count, or a rating-derived proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u64>,
    pub source: String,
}

/// One entry of the unified feed. The discriminant travels as `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedItem {
    Video {
        #[serde(flatten)]
        core: ItemCore,
    },
    Article {
        #[serde(flatten)]
        core: ItemCore,
    },
    Product {
        #[serde(flatten)]
        core: ItemCore,
        /// Integer cents; avoids floating-point currency error.
        #[serde(
            rename = "priceCents",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        price_cents: Option<u64>,
    },
}

impl FeedItem {
    pub fn core(&self) -> &ItemCore {
        match self {
            Self::Video { core } | Self::Article { core } | Self::Product { core, .. } => core,
        }
    }

    pub fn core_mut(&mut self) -> &mut ItemCore {
        match self {
            Self::Video { core } | Self::Article { core } | Self::Product { core, .. } => core,
        }
    }

    pub fn kind(&self) -> FeedType {
        match self {
            Self::Video { .. } => FeedType::Video,
            Self::Article { .. } => FeedType::Article,
            Self::Product { .. } => FeedType::Product,
        }
    }

    /// Popularity for sorting; absent counts as zero.
    pub fn popularity(&self) -> u64 {
        self.core().popularity.unwrap_or(0)
    }

    /// Publish time as unix seconds; absent or unparseable sorts earliest.
    pub fn published_ts(&self) -> i64 {
        self.core()
            .published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp())
            .unwrap_or(i64::MIN)
    }
}

/// Immutable request descriptor, constructed once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    pub feed_type: FeedType,
    pub sort: SortMode,
    pub limit: usize,
    pub cursor: Option<String>,
}

impl ProviderContext {
    /// Cursor part used in cache keys (empty when absent).
    pub fn cursor_key(&self) -> &str {
        self.cursor.as_deref().unwrap_or("")
    }
}

/// Output of one adapter or of the aggregator. `errors` is omitted from the
/// JSON body entirely when no adapter failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub items: Vec<FeedItem>,
    pub next_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ProviderResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_error(name: &str, message: impl Into<String>) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(name.to_string(), message.into());
        Self {
            items: Vec::new(),
            next_cursor: None,
            errors: Some(errors),
        }
    }
}

/// Sort in place per the requested mode. Both orders are descending; the
/// underlying sort is stable, so equal keys keep source ordering.
pub fn sort_items(items: &mut [FeedItem], sort: SortMode) {
    match sort {
        SortMode::Popular => {
            items.sort_by(|a, b| b.popularity().cmp(&a.popularity()));
        }
        SortMode::Recent => {
            items.sort_by(|a, b| b.published_ts().cmp(&a.published_ts()));
        }
    }
}

#[cfg(test)]
pub(crate) fn test_item(kind: FeedType, id: &str, popularity: Option<u64>) -> FeedItem {
    let core = ItemCore {
        id: id.to_string(),
        title: format!("item {id}"),
        url: format!("https://example.com/{id}"),
        thumbnail_url: None,
        published_at: None,
        popularity,
        source: "test".to_string(),
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
