// src/urlnorm.rs
//! Link normalization: unwrapping aggregator redirects, canonicalizing URLs
//! for de-duplication and display, and deriving source labels.

use url::Url;

/// News-aggregator hosts that wrap the true destination in a redirect.
const AGGREGATOR_HOST_HINTS: &[&str] = &["news.google.com", "news.google", "bing.com"];

/// Query parameters removed verbatim during canonicalization.
const REMOVABLE_PARAMS: &[&str] = &[
    "ref", "ref_", "refsrc", "ref_src", "ref_url", "rss", "feed", "output", "amp", "amp_share",
    "feature", "share", "spref", "source", "via",
];

/// Query-parameter prefixes removed during canonicalization (`utm_source`,
/// `fbclid`, campaign ids, and friends).
const REMOVABLE_PREFIXES: &[&str] = &[
    "utm", "mc_", "mkt_", "ga_", "fbclid", "gclid", "yclid", "icid", "ocid", "cmpid",
    "rb_clickid", "igshid", "msclkid",
];

/// Canonical form of a URL: no fragment or credentials, lowercase host, no
/// tracking parameters, no single trailing slash on non-root paths.
/// Unparseable input is returned as-is.
pub fn canonicalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    url.set_fragment(None);
    let _ = url.set_username("");
    let _ = url.set_password(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_removable_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        drop(pairs);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(&path[..path.len() - 1]);
    }

    url.to_string()
}

fn is_removable_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    REMOVABLE_PARAMS.contains(&lower.as_str())
        || REMOVABLE_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Resolve a raw feed link into a canonical URL, unwrapping known
/// aggregator redirect patterns (Google News / Bing wrap the destination in
/// a query parameter). Relative links are resolved against the feed URL.
pub fn normalize_link(raw_link: Option<&str>, feed_url: &str) -> Option<String> {
    let raw = raw_link?;
    match Url::parse(raw) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            if host.contains("news.google.com") {
                if let Some(candidate) = query_param(&parsed, &["url"]) {
                    return Some(canonicalize_url(&candidate));
                }
            }
            if host.contains("bing.com") {
                if let Some(candidate) = query_param(&parsed, &["url", "r"]) {
                    return Some(canonicalize_url(&candidate));
                }
            }
            Some(canonicalize_url(parsed.as_str()))
        }
        Err(_) => {
            if !raw.starts_with("http") {
                if let Ok(base) = Url::parse(feed_url) {
                    if let Ok(joined) = base.join(raw) {
                        return Some(canonicalize_url(joined.as_str()));
                    }
                }
            }
            Some(canonicalize_url(raw))
        }
    }
}

/// First matching query parameter, percent-decoded.
fn query_param(url: &Url, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == name) {
            return Some(value.into_owned());
        }
    }
    None
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

pub fn is_aggregator_host(host: &str) -> bool {
    let normal = host.to_ascii_lowercase();
    AGGREGATOR_HOST_HINTS
        .iter()
        .any(|hint| normal == *hint || normal.ends_with(&format!(".{hint}")))
}

pub fn is_aggregator_url(url: &str) -> bool {
    host_of(url).is_some_and(|h| is_aggregator_host(&h))
}

/// Display label for an article: the hostname without a `www.` prefix.
pub fn source_label(link: &str) -> String {
    match host_of(link) {
        Some(host) => host.strip_prefix("www.").unwrap_or(&host).to_string(),
        None => "RSS".to_string(),
    }
}
