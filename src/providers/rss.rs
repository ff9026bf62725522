// src/providers/rss.rs
//! Article adapter. Fetches a cross-product of RSS/Atom feed sources,
//! filters entries for topical relevance, canonicalizes and de-duplicates
//! links, extracts thumbnails (with a best-effort live enrichment pass for
//! aggregator links and placeholder art), and guarantees every returned
//! article has a displayable image.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::warn;

use crate::cache::FeedCache;
use crate::providers::FeedProvider;
use crate::thumbs::{
    extract_image_candidates, needs_better_thumbnail, pick_best_image, resolve_image_url,
};
use crate::types::{sort_items, FeedItem, FeedType, ItemCore, ProviderContext, ProviderResult};
use crate::urlnorm::{canonicalize_url, is_aggregator_url, normalize_link, source_label};

const CURATED_FEEDS: &[&str] = &[
    "https://www.soompi.com/feed",
    "https://www.koreaboo.com/feed/",
    "https://www.allkpop.com/rss",
];

const STATIC_FEEDS: &[&str] = &[
    "https://gameluster.com/feed/",
    "https://www.thewrap.com/feed/",
    "https://geekculture.co/feed/",
];

const SEARCH_QUERIES: &[&str] = &["kpop demon hunter", "k-pop demon hunter", "huntrix"];

/// Site search feeds crossed with every search query.
const SEARCH_FEED_SITES: &[&str] = &[
    "https://gameluster.com",
    "https://www.thewrap.com",
    "https://geekculture.co",
];

const RELEVANT_KEYWORDS: &[&str] = &[
    "demon hunter",
    "demon-hunter",
    "demonhunter",
    "huntrix",
    "kpop demon hunter",
    "k-pop demon hunter",
];

const FALLBACK_ARTICLE_IMAGE: &str =
    "https://images.unsplash.com/photo-1521412644187-c49fa049e84d?auto=format&fit=crop&w=1200&q=80";

const MAX_ENRICH_ITEMS: usize = 15;
const RESULT_CAP: usize = 50;
/// Short TTL: feed content changes faster than video/product popularity.
const CACHE_TTL_SECS: u64 = 60 * 5;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/* ----------------------------
RSS 2.0 / Atom wire shapes
---------------------------- */

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Default, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<TextNode>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<TextNode>,
    #[serde(rename = "content:encoded")]
    content_encoded: Option<String>,
    enclosure: Option<UrlAttr>,
    #[serde(rename = "media:thumbnail", default)]
    media_thumbnails: Vec<UrlAttr>,
    #[serde(rename = "media:content", default)]
    media_contents: Vec<UrlAttr>,
    #[serde(rename = "media:group")]
    media_group: Option<MediaGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaGroup {
    #[serde(rename = "media:thumbnail", default)]
    thumbnails: Vec<UrlAttr>,
    #[serde(rename = "media:content", default)]
    contents: Vec<UrlAttr>,
}

#[derive(Debug, Default, Deserialize)]
struct TextNode {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UrlAttr {
    #[serde(rename = "@url")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    id: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

/// A feed entry normalized across RSS and Atom, before relevance filtering.
/// `media_urls` keeps extraction priority order: item-level thumbnails,
/// item-level contents, then the grouped variants.
#[derive(Debug, Default, Clone)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub iso_date: Option<String>,
    pub categories: Vec<String>,
    pub description: Option<String>,
    pub content_html: Option<String>,
    pub enclosure_url: Option<String>,
    pub media_urls: Vec<String>,
}

/* ----------------------------
Parsing
---------------------------- */

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

fn rfc2822_to_iso(ts: &str) -> Option<String> {
    DateTime::parse_from_rfc2822(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Parse a feed document: RSS 2.0 first, Atom as the fallback.
pub fn parse_feed(xml: &str) -> Result<Vec<RawEntry>> {
    let clean = scrub_html_entities_for_xml(xml);
    if let Ok(rss) = from_str::<Rss>(&clean) {
        return Ok(rss.channel.items.into_iter().map(raw_from_rss).collect());
    }
    let atom: AtomFeed = from_str(&clean).context("parsing feed xml (rss and atom)")?;
    Ok(atom.entries.into_iter().map(raw_from_atom).collect())
}

fn raw_from_rss(item: RssItem) -> RawEntry {
    let mut media_urls = Vec::new();
    let mut push_urls = |refs: &[UrlAttr]| {
        for r in refs {
            if let Some(u) = &r.url {
                media_urls.push(u.clone());
            }
        }
    };
    push_urls(&item.media_thumbnails);
    push_urls(&item.media_contents);
    if let Some(group) = &item.media_group {
        push_urls(&group.thumbnails);
        push_urls(&group.contents);
    }

    RawEntry {
        title: item.title,
        link: item.link,
        guid: item.guid.and_then(|g| g.value),
        iso_date: item.pub_date.as_deref().and_then(rfc2822_to_iso),
        categories: item
            .categories
            .into_iter()
            .filter_map(|c| c.value)
            .collect(),
        description: item.description,
        content_html: item.content_encoded,
        enclosure_url: item.enclosure.and_then(|e| e.url),
        media_urls,
    }
}

fn raw_from_atom(entry: AtomEntry) -> RawEntry {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .and_then(|l| l.href.clone());

    RawEntry {
        title: entry.title,
        link,
        guid: entry.id,
        iso_date: entry.published.or(entry.updated),
        categories: entry
            .categories
            .into_iter()
            .filter_map(|c| c.term)
            .collect(),
        description: entry.summary,
        content_html: entry.content,
        enclosure_url: None,
        media_urls: Vec::new(),
    }
}

/* ----------------------------
Sources & relevance
---------------------------- */

fn encode_query(q: &str) -> String {
    url::form_urlencoded::byte_serialize(q.as_bytes()).collect()
}

/// De-duplicated list of feed sources: curated + static feeds plus the
/// cross-product of search phrases against the site search-feed builders.
pub fn build_feed_sources() -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    let mut push = |url: String| {
        let trimmed = url.trim().to_string();
        if !trimmed.is_empty() && seen.insert(trimmed.clone()) {
            sources.push(trimmed);
        }
    };

    for url in CURATED_FEEDS.iter().chain(STATIC_FEEDS) {
        push(url.to_string());
    }
    for query in SEARCH_QUERIES {
        for site in SEARCH_FEED_SITES {
            push(format!("{site}/?s={}&feed=rss2", encode_query(query)));
        }
    }
    sources
}

/// Keyword gate over the entry's combined text. Fast path: any curated
/// keyword. Slow path: "huntrix" plus any of demon/hunter/kpop, or all
/// three of demon+hunter+kpop together.
pub fn is_relevant(entry: &RawEntry) -> bool {
    let mut fields: Vec<&str> = Vec::new();
    if let Some(t) = &entry.title {
        fields.push(t);
    }
    if let Some(d) = &entry.description {
        fields.push(d);
    }
    if let Some(c) = &entry.content_html {
        fields.push(c);
    }
    for c in &entry.categories {
        fields.push(c);
    }
    if let Some(l) = &entry.link {
        fields.push(l);
    }
    if fields.is_empty() {
        return false;
    }

    let haystack = fields.join(" ").to_lowercase();
    if RELEVANT_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
        return true;
    }

    let has_demon = haystack.contains("demon");
    let has_hunter = haystack.contains("hunter");
    let has_kpop = haystack.contains("kpop") || haystack.contains("k-pop");
    let has_huntrix = haystack.contains("huntrix");

    (has_huntrix && (has_demon || has_hunter || has_kpop))
        || (has_demon && has_hunter && has_kpop)
}

/// Thumbnail candidates in priority order: media extension fields (incl.
/// grouped), enclosure, then HTML scraping of the embedded content.
pub fn extract_thumbnail(entry: &RawEntry, base: Option<&str>) -> Option<String> {
    let mut candidates: Vec<String> = Vec::new();
    for u in &entry.media_urls {
        if let Some(resolved) = resolve_image_url(u, base) {
            candidates.push(resolved);
        }
    }
    if let Some(enclosure) = &entry.enclosure_url {
        if let Some(resolved) = resolve_image_url(enclosure, base) {
            candidates.push(resolved);
        }
    }
    for html in [entry.content_html.as_deref(), entry.description.as_deref()]
        .into_iter()
        .flatten()
    {
        candidates.extend(extract_image_candidates(html, base));
    }
    pick_best_image(&candidates)
}

/* ----------------------------
Provider
---------------------------- */

pub struct RssProvider {
    cache: Arc<FeedCache>,
    client: reqwest::Client,
}

struct Enriched {
    final_url: Option<String>,
    thumbnail: Option<String>,
}

impl RssProvider {
    pub fn new(cache: Arc<FeedCache>) -> Self {
        // a default client is still usable if the custom UA build fails
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { cache, client }
    }

    async fn fetch_source(&self, url: &str) -> Result<Vec<RawEntry>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetching feed {url}"))?;
        anyhow::ensure!(resp.status().is_success(), "feed HTTP {}", resp.status());
        let body = resp.text().await.context("reading feed body")?;
        parse_feed(&body)
    }

    /// Best-effort live fetch of an article page: adopt the final redirect
    /// target as the canonical link (unless it is itself an aggregator) and
    /// re-run thumbnail extraction against the fetched HTML.
    async fn enrich_one(&self, url: String) -> Option<Enriched> {
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/html")
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let final_url = resp.url().to_string();
        let html = resp.text().await.ok()?;
        let candidates = extract_image_candidates(&html, Some(&final_url));
        let thumbnail = pick_best_image(&candidates);
        let adopted = (!is_aggregator_url(&final_url)).then_some(final_url);
        Some(Enriched {
            final_url: adopted,
            thumbnail,
        })
    }

    async fn enrich_missing_thumbnails(&self, items: &mut [FeedItem]) {
        let targets: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| {
                needs_better_thumbnail(item.core().thumbnail_url.as_deref())
                    || is_aggregator_url(&item.core().url)
            })
            .map(|(i, _)| i)
            .take(MAX_ENRICH_ITEMS)
            .collect();
        if targets.is_empty() {
            return;
        }

        let mut fetches = Vec::with_capacity(targets.len());
        for i in targets {
            let url = items[i].core().url.clone();
            fetches.push(async move { (i, self.enrich_one(url).await) });
        }
        for (i, outcome) in join_all(fetches).await {
            // fetch failures are silently ignored: enrichment only
            let Some(enriched) = outcome else { continue };
            let core = items[i].core_mut();
            if let Some(final_url) = enriched.final_url {
                core.source = source_label(&final_url);
                core.url = final_url;
            }
            if let Some(thumbnail) = enriched.thumbnail {
                core.thumbnail_url = Some(thumbnail);
            }
        }
    }
}

fn fallback_id(idx: usize) -> String {
    format!("rss-{}-{}", chrono::Utc::now().timestamp_millis(), idx)
}

#[async_trait]
impl FeedProvider for RssProvider {
    fn name(&self) -> &'static str {
        "rss"
    }

    fn kind(&self) -> FeedType {
        FeedType::Article
    }

    async fn fetch(&self, ctx: &ProviderContext) -> ProviderResult {
        let key = format!(
            "rss:{}:{}:{}",
            ctx.sort.as_str(),
            ctx.limit,
            ctx.cursor_key()
        );
        if let Some(hit) = self.cache.get::<ProviderResult>(&key).await {
            return hit;
        }

        let sources = build_feed_sources();
        let outcomes = join_all(sources.iter().map(|url| async move {
            (url.clone(), self.fetch_source(url).await)
        }))
        .await;

        let mut seen: HashSet<String> = HashSet::new();
        let mut items: Vec<FeedItem> = Vec::new();

        for (feed_url, outcome) in outcomes {
            // one broken feed source never fails the batch
            let entries = match outcome {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = ?e, feed = %feed_url, "feed source failed");
                    counter!("provider_errors_total", "provider" => "rss").increment(1);
                    continue;
                }
            };

            for (idx, entry) in entries.into_iter().take(ctx.limit).enumerate() {
                if !is_relevant(&entry) {
                    continue;
                }

                let base_link = normalize_link(entry.link.as_deref(), &feed_url)
                    .filter(|s| !s.trim().is_empty());
                let aggregator_link = base_link
                    .as_deref()
                    .or(entry.link.as_deref())
                    .is_some_and(is_aggregator_url);
                let link = base_link
                    .clone()
                    .or_else(|| entry.link.clone())
                    .unwrap_or_else(|| "#".to_string());
                let canonical = canonicalize_url(&link);

                let dedupe_key = if !canonical.is_empty() && canonical != "#" {
                    canonical.clone()
                } else {
                    entry
                        .guid
                        .clone()
                        .or_else(|| entry.title.clone())
                        .unwrap_or_default()
                };
                if !dedupe_key.is_empty() && !seen.insert(dedupe_key) {
                    continue;
                }

                let id = entry
                    .guid
                    .clone()
                    .or_else(|| {
                        if !canonical.is_empty() && canonical != "#" {
                            Some(canonical.clone())
                        } else {
                            entry.link.clone()
                        }
                    })
                    .or_else(|| entry.iso_date.clone())
                    .unwrap_or_else(|| fallback_id(idx));

                // aggregator pages carry no real art; leave those to the
                // enrichment pass
                let thumbnail = if aggregator_link {
                    None
                } else {
                    extract_thumbnail(&entry, Some(canonical.as_str()))
                };

                let final_link = if canonical.is_empty() { link } else { canonical };
                items.push(FeedItem::Article {
                    core: ItemCore {
                        id,
                        title: entry.title.unwrap_or_else(|| "Untitled".to_string()),
                        source: source_label(&final_link),
                        url: final_link,
                        thumbnail_url: thumbnail,
                        published_at: entry.iso_date,
                        popularity: None,
                    },
                });
            }
        }

        self.enrich_missing_thumbnails(&mut items).await;

        if ctx.sort == crate::types::SortMode::Recent {
            sort_items(&mut items, ctx.sort);
        }

        // fallback guarantee: every article gets a displayable image
        for item in &mut items {
            if needs_better_thumbnail(item.core().thumbnail_url.as_deref()) {
                item.core_mut().thumbnail_url = Some(FALLBACK_ARTICLE_IMAGE.to_string());
            }
        }

        items.truncate(RESULT_CAP.min(ctx.limit));
        let result = ProviderResult {
            items,
            next_cursor: None,
            errors: None,
        };
        self.cache.set(&key, &result, CACHE_TTL_SECS).await;
        result
    }
}
