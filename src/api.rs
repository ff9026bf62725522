// src/api.rs
//! HTTP surface: the feed endpoint, the token-gated cache refresh, a
//! diagnostics probe, and a health probe. Query parsing is lenient;
//! unknown values fall back to defaults instead of rejecting the request.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::cache::FeedCache;
use crate::config::Env;
use crate::limits::feed_limit;
use crate::providers::Aggregator;
use crate::types::{FeedType, ProviderContext, ProviderResult, SortMode};

const DEFAULT_LIMIT: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub cache: Arc<FeedCache>,
    pub env: Env,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/feed", get(feed))
        .route("/api/cache/refresh", get(cache_refresh))
        .route("/api/diagnostics", get(diagnostics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn parse_context(q: &HashMap<String, String>) -> ProviderContext {
    let feed_type = q
        .get("type")
        .and_then(|s| FeedType::parse(s))
        .unwrap_or(FeedType::All);
    let sort = q
        .get("sort")
        .and_then(|s| SortMode::parse(s))
        .unwrap_or(SortMode::Popular);
    let requested = q
        .get("limit")
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LIMIT);
    let limit = requested.clamp(1, feed_limit(feed_type));
    let cursor = q.get("cursor").filter(|s| !s.is_empty()).cloned();

    ProviderContext {
        feed_type,
        sort,
        limit,
        cursor,
    }
}

async fn feed(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<ProviderResult> {
    let ctx = parse_context(&q);
    Json(state.aggregator.fetch_feed(&ctx).await)
}

#[derive(serde::Serialize)]
struct RefreshResp {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
    memory: usize,
    redis: usize,
}

/// Flush both cache tiers, optionally restricted to a key prefix. The
/// token check only applies when a server token is configured; without one
/// the flush stays open.
async fn cache_refresh(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let authorized = match &state.env.cache_refresh_token {
        Some(expected) => q.get("token").is_some_and(|t| t == expected),
        None => true,
    };
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    let prefix = q.get("prefix").filter(|s| !s.is_empty()).cloned();
    let counts = state.cache.flush(prefix.as_deref()).await;
    Json(RefreshResp {
        ok: true,
        prefix,
        memory: counts.memory,
        redis: counts.redis,
    })
    .into_response()
}

#[derive(serde::Serialize)]
struct DiagnosticsEnv {
    youtube: bool,
    serpapi: bool,
    upstash: bool,
}

#[derive(serde::Serialize)]
struct DiagnosticsResp {
    env: DiagnosticsEnv,
    counts: BTreeMap<&'static str, i64>,
    errors: BTreeMap<&'static str, Option<String>>,
    notes: [&'static str; 2],
}

/// Operational self-check: key presence flags plus a tiny probe through
/// each adapter. A count of -1 marks a probe that came back with an error;
/// 0 means configured but no results.
async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResp> {
    let probes = [
        ("videos", FeedType::Video, SortMode::Popular),
        ("news", FeedType::Article, SortMode::Recent),
        ("products", FeedType::Product, SortMode::Popular),
    ];

    let mut counts = BTreeMap::new();
    let mut errors = BTreeMap::new();
    for (label, feed_type, sort) in probes {
        let ctx = ProviderContext {
            feed_type,
            sort,
            limit: 3,
            cursor: None,
        };
        let result = state.aggregator.fetch_feed(&ctx).await;
        let error = result
            .errors
            .map(|m| m.into_values().collect::<Vec<_>>().join("; "));
        counts.insert(
            label,
            if error.is_some() {
                -1
            } else {
                result.items.len() as i64
            },
        );
        errors.insert(label, error);
    }

    Json(DiagnosticsResp {
        env: DiagnosticsEnv {
            youtube: state.env.youtube_api_key.is_some(),
            serpapi: state.env.serpapi_api_key.is_some(),
            upstash: state.env.upstash_redis_url.is_some()
                && state.env.upstash_redis_token.is_some(),
        },
        counts,
        errors,
        notes: [
            "counts -1 indicate a provider error. 0 indicates configured but no results.",
            "env flags show whether required keys are present (not their values).",
        ],
    })
}
