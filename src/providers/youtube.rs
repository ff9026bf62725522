// src/providers/youtube.rs
//! Video adapter: YouTube search plus a batch statistics call to resolve
//! view counts. A missing API key disables the adapter silently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use tracing::warn;

use crate::cache::FeedCache;
use crate::config::Env;
use crate::providers::FeedProvider;
use crate::types::{sort_items, FeedItem, FeedType, ItemCore, ProviderContext, ProviderResult};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Endpoint page cap; also the adapter's own result cap.
const PAGE_CAP: usize = 25;
const CACHE_TTL_SECS: u64 = 60 * 60 * 24;

const FALLBACK_QUERIES: &[&str] = &["kpop demon hunter", "demon hunter kpop", "kpop"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct SearchId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    high: Option<Thumb>,
    medium: Option<Thumb>,
    #[serde(rename = "default")]
    fallback: Option<Thumb>,
}

#[derive(Debug, Deserialize)]
struct Thumb {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideosItem>,
}

#[derive(Debug, Deserialize)]
struct VideosItem {
    id: String,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
struct Statistics {
    #[serde(rename = "viewCount")]
    view_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

pub struct YoutubeProvider {
    cache: Arc<FeedCache>,
    client: reqwest::Client,
    api_key: Option<String>,
    search_query: Option<String>,
}

impl YoutubeProvider {
    pub fn new(cache: Arc<FeedCache>, env: &Env) -> Self {
        Self {
            cache,
            client: reqwest::Client::new(),
            api_key: env.youtube_api_key.clone(),
            search_query: env.youtube_search_query.clone(),
        }
    }

    /// Configured query first, else the fallback list. The first query that
    /// returns any result wins.
    fn queries(&self) -> Vec<String> {
        match &self.search_query {
            Some(q) => vec![q.clone()],
            None => FALLBACK_QUERIES.iter().map(|q| q.to_string()).collect(),
        }
    }

    async fn search(
        &self,
        api_key: &str,
        ctx: &ProviderContext,
    ) -> (Option<SearchResponse>, Option<String>) {
        let order = match ctx.sort {
            crate::types::SortMode::Popular => "viewCount",
            crate::types::SortMode::Recent => "date",
        };
        let max_results = PAGE_CAP.min(ctx.limit).to_string();
        let mut last_error: Option<String> = None;

        for q in self.queries() {
            let mut params: Vec<(&str, String)> = vec![
                ("key", api_key.to_string()),
                ("part", "snippet".into()),
                ("q", q.clone()),
                ("type", "video".into()),
                ("maxResults", max_results.clone()),
                ("order", order.into()),
                ("safeSearch", "moderate".into()),
                ("regionCode", "US".into()),
                ("relevanceLanguage", "en".into()),
            ];
            if let Some(cursor) = &ctx.cursor {
                params.push(("pageToken", cursor.clone()));
            }

            let resp = match self.client.get(SEARCH_URL).query(&params).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = ?e, query = %q, "youtube search request failed");
                    counter!("provider_errors_total", "provider" => "youtube").increment(1);
                    last_error = Some("YouTube search request failed".to_string());
                    continue;
                }
            };
            if !resp.status().is_success() {
                let status = resp.status();
                let message = resp
                    .json::<ApiError>()
                    .await
                    .ok()
                    .and_then(|e| e.error.and_then(|b| b.message))
                    .unwrap_or_else(|| format!("HTTP {status}"));
                last_error = Some(format!("YouTube search error: {message}"));
                continue;
            }
            match resp.json::<SearchResponse>().await {
                Ok(json) if !json.items.is_empty() => return (Some(json), last_error),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = ?e, query = %q, "youtube search parse failed");
                    last_error = Some("YouTube search request failed".to_string());
                }
            }
        }
        (None, last_error)
    }

    /// Batch statistics lookup; one call for every unique video id.
    async fn view_counts(&self, api_key: &str, ids: &[String]) -> Result<HashMap<String, u64>, String> {
        let params = [
            ("key", api_key.to_string()),
            ("part", "statistics".to_string()),
            ("id", ids.join(",")),
        ];
        let resp = self
            .client
            .get(VIDEOS_URL)
            .query(&params)
            .send()
            .await
            .map_err(|_| "YouTube videos request failed".to_string())?;
        if !resp.status().is_success() {
            let status = resp.status();
            let message = resp
                .json::<ApiError>()
                .await
                .ok()
                .and_then(|e| e.error.and_then(|b| b.message))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(format!("YouTube videos error: {message}"));
        }
        let json = resp
            .json::<VideosResponse>()
            .await
            .map_err(|_| "YouTube videos request failed".to_string())?;
        Ok(json
            .items
            .into_iter()
            .map(|v| {
                let views = v
                    .statistics
                    .and_then(|s| s.view_count)
                    .and_then(|c| c.parse::<u64>().ok())
                    .unwrap_or(0);
                (v.id, views)
            })
            .collect())
    }
}

#[async_trait]
impl FeedProvider for YoutubeProvider {
    fn name(&self) -> &'static str {
        "youtube"
    }

    fn kind(&self) -> FeedType {
        FeedType::Video
    }

    async fn fetch(&self, ctx: &ProviderContext) -> ProviderResult {
        let key = format!(
            "yt:{}:{}:{}:{}",
            ctx.feed_type.as_str(),
            ctx.sort.as_str(),
            ctx.limit,
            ctx.cursor_key()
        );
        if let Some(hit) = self.cache.get::<ProviderResult>(&key).await {
            return hit;
        }

        // Missing key means the feature is not enabled, not a failure.
        let Some(api_key) = self.api_key.clone() else {
            return ProviderResult::empty();
        };

        let (search, last_error) = self.search(&api_key, ctx).await;
        let Some(search) = search else {
            let message =
                last_error.unwrap_or_else(|| "No videos found for query".to_string());
            return ProviderResult::with_error(self.name(), message);
        };
        let next_cursor = search.next_page_token.clone();

        let mut seen = HashSet::new();
        let ids: Vec<String> = search
            .items
            .iter()
            .filter_map(|i| i.id.video_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if ids.is_empty() {
            return ProviderResult {
                items: Vec::new(),
                next_cursor,
                errors: None,
            };
        }

        let stats = match self.view_counts(&api_key, &ids).await {
            Ok(stats) => stats,
            Err(message) => {
                counter!("provider_errors_total", "provider" => "youtube").increment(1);
                return ProviderResult {
                    items: Vec::new(),
                    next_cursor,
                    errors: Some(
                        [(self.name().to_string(), message)].into_iter().collect(),
                    ),
                };
            }
        };

        let mut items: Vec<FeedItem> = search
            .items
            .into_iter()
            .enumerate()
            .map(|(idx, i)| {
                let id = i.id.video_id.unwrap_or_else(|| idx.to_string());
                let thumbnail = i
                    .snippet
                    .thumbnails
                    .as_ref()
                    .and_then(|t| {
                        t.high
                            .as_ref()
                            .or(t.medium.as_ref())
                            .or(t.fallback.as_ref())
                            .and_then(|thumb| thumb.url.clone())
                    })
                    .unwrap_or_else(|| format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg"));
                FeedItem::Video {
                    core: ItemCore {
                        url: format!("https://www.youtube.com/watch?v={id}"),
                        title: i.snippet.title,
                        thumbnail_url: Some(thumbnail),
                        published_at: i.snippet.published_at,
                        popularity: Some(stats.get(&id).copied().unwrap_or(0)),
                        source: "YouTube".to_string(),
                        id,
                    },
                }
            })
            .collect();

        // The endpoint's ordering is not fully trusted; re-sort locally.
        sort_items(&mut items, ctx.sort);
        items.truncate(PAGE_CAP.min(ctx.limit));

        let result = ProviderResult {
            items,
            next_cursor,
            errors: None,
        };
        self.cache.set(&key, &result, CACHE_TTL_SECS).await;
        result
    }
}
