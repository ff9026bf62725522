// src/thumbs.rs
//! Thumbnail extraction and scoring. Pulls image candidates out of embedded
//! HTML (Open Graph / Twitter meta tags, `<img>` with lazy-load attributes,
//! `<source srcset>`) and ranks them with a placeholder-averse heuristic.
//! No network access happens here.

use html_escape::decode_html_entities;
use once_cell::sync::OnceCell;
use regex::Regex;
use url::Url;

use crate::urlnorm::host_of;

/// Hosts that serve proxy/placeholder art rather than real article images.
const PLACEHOLDER_HOST_HINTS: &[&str] = &[
    "googleusercontent.com",
    "gstatic.com",
    "bing.com",
    "news.google",
];

const BAD_KEYWORDS: &[&str] = &[
    "logo",
    "sprite",
    "placeholder",
    "default",
    "avatar",
    "icon",
    "spacer",
    "pixel",
    "blank",
    "transparent",
];

fn meta_image_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)<meta[^>]+(?:property|name)=["'](?:og:image|og:image:url|og:image:secure_url|twitter:image|twitter:image:src)["'][^>]+content=["']([^"']+)["'][^>]*>"#,
        )
        .unwrap()
    })
}

fn img_src_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    // lazy-load attributes listed before `src` so they win when both exist
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<img[^>]+(?:data-src|data-original|data-lazy-src|src)=["']([^"'\s>]+)["'][^>]*>"#)
            .unwrap()
    })
}

fn source_srcset_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<source[^>]+srcset=["']([^"'\s>]+)["'][^>]*>"#).unwrap()
    })
}

fn icon_grid_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,2}x\d{1,2}\b").unwrap())
}

fn filler_word_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(placeholder|default|fallback|blank|spacer|pixel|avatar|icon|logo)\b")
            .unwrap()
    })
}

fn raster_ext_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\.(jpe?g|png|webp)(\?|$)").unwrap())
}

fn gif_ext_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\.gif(\?|$)").unwrap())
}

/// Resolve an image candidate against an optional base URL. Rejects empty
/// and `data:` values, expands protocol-relative URLs to https.
pub fn resolve_image_url(candidate: &str, base: Option<&str>) -> Option<String> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() || trimmed.starts_with("data:") {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(trimmed.to_string());
    }
    let base = Url::parse(base?).ok()?;
    base.join(trimmed).ok().map(String::from)
}

/// Ordered, de-duplicated image candidates from an HTML fragment.
pub fn extract_image_candidates(html: &str, base: Option<&str>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut push = |url: Option<String>| {
        if let Some(u) = url {
            if seen.insert(u.clone()) {
                out.push(u);
            }
        }
    };

    // attribute values escape '&' as '&amp;'; decode before resolving
    for caps in meta_image_re().captures_iter(html) {
        push(resolve_image_url(&decode_html_entities(&caps[1]), base));
    }
    for caps in img_src_re().captures_iter(html) {
        push(resolve_image_url(&decode_html_entities(&caps[1]), base));
    }
    for caps in source_srcset_re().captures_iter(html) {
        // first entry of the srcset, without its width descriptor
        let srcset = decode_html_entities(&caps[1]).into_owned();
        let first = srcset
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
            .split(' ')
            .next()
            .unwrap_or("");
        push(resolve_image_url(first, base));
    }

    out
}

/// Heuristic candidate score. Position in the candidate list decays the
/// base score; topical keywords, upload-path hints and raster extensions
/// add; GIFs, icon-grid dimensions and filler keywords subtract.
pub fn score_image(url: &str, index: usize) -> i32 {
    let mut score = 100 - (index as i32) * 2;
    let lower = url.to_ascii_lowercase();
    if lower.contains("huntrix") {
        score += 60;
    }
    if lower.contains("demon") {
        score += 40;
    }
    if lower.contains("hunter") {
        score += 25;
    }
    if lower.contains("kpop") || lower.contains("k-pop") {
        score += 20;
    }
    if lower.contains("uploads") || lower.contains("wp-content") {
        score += 15;
    }
    if lower.contains("feature") || lower.contains("news") {
        score += 5;
    }
    if raster_ext_re().is_match(&lower) {
        score += 5;
    }
    if gif_ext_re().is_match(&lower) {
        score -= 10;
    }
    if icon_grid_re().is_match(&lower) {
        score -= 40;
    }
    if BAD_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        score -= 80;
    }
    score
}

/// A candidate that is almost certainly not real article art.
pub fn is_likely_placeholder(url: &str) -> bool {
    let Some(host) = host_of(url) else {
        return true;
    };
    if PLACEHOLDER_HOST_HINTS.iter().any(|hint| host.contains(hint)) {
        return true;
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("data:") {
        return true;
    }
    if filler_word_re().is_match(&lower) {
        return true;
    }
    icon_grid_re().is_match(&lower)
}

/// True when an item should go through the enrichment pass or fall back to
/// the stock image.
pub fn needs_better_thumbnail(url: Option<&str>) -> bool {
    let Some(url) = url else { return true };
    let Some(host) = host_of(url) else { return true };
    if crate::urlnorm::is_aggregator_host(&host) {
        return true;
    }
    is_likely_placeholder(url)
}

/// Pick the best-scoring candidate. Placeholder-host candidates are dropped
/// first unless nothing else remains; ties favor the earliest-seen URL.
pub fn pick_best_image<S: AsRef<str>>(candidates: &[S]) -> Option<String> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::new();
    for c in candidates {
        let c = c.as_ref();
        if c.is_empty() || !seen.insert(c.to_string()) {
            continue;
        }
        deduped.push(c.to_string());
    }

    let filtered: Vec<String> = deduped
        .iter()
        .filter(|c| !is_likely_placeholder(c))
        .cloned()
        .collect();
    let pool = if filtered.is_empty() { deduped } else { filtered };
    if pool.is_empty() {
        return None;
    }

    let mut best_url = pool[0].clone();
    let mut best_score = i32::MIN;
    for (index, url) in pool.iter().enumerate() {
        let score = score_image(url, index);
        if score > best_score {
            best_score = score;
            best_url = url.clone();
        }
    }
    Some(best_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_protocol_relative_and_rejects_data_urls() {
        assert_eq!(
            resolve_image_url("//cdn.example.com/a.jpg", None).as_deref(),
            Some("https://cdn.example.com/a.jpg")
        );
        assert_eq!(resolve_image_url("data:image/png;base64,xx", None), None);
        assert_eq!(resolve_image_url("   ", None), None);
        assert_eq!(
            resolve_image_url("img/cover.webp", Some("https://site.example.com/post/1")).as_deref(),
            Some("https://site.example.com/post/img/cover.webp")
        );
        // relative with no base cannot be resolved
        assert_eq!(resolve_image_url("img/cover.webp", None), None);
    }

    #[test]
    fn extracts_meta_img_and_srcset_candidates_in_order() {
        let html = r#"
            <meta property="og:image" content="https://cdn.example.com/og.jpg" extra="1">
            <img data-lazy-src="/lazy.png" src="/eager.png">
            <img src="https://cdn.example.com/plain.jpg">
            <picture><source srcset="https://cdn.example.com/small.webp 480w, big.webp 1024w"></picture>
        "#;
        let got = extract_image_candidates(html, Some("https://site.example.com/post"));
        assert_eq!(
            got,
            vec![
                "https://cdn.example.com/og.jpg",
                "https://site.example.com/lazy.png",
                "https://cdn.example.com/plain.jpg",
                "https://cdn.example.com/small.webp",
            ]
        );
    }

    #[test]
    fn escaped_ampersands_in_attributes_are_decoded() {
        let html = r#"<img src="https://cdn.example.com/img.jpg?w=600&amp;h=400">"#;
        let got = extract_image_candidates(html, None);
        assert_eq!(got, vec!["https://cdn.example.com/img.jpg?w=600&h=400"]);
    }

    #[test]
    fn lazy_load_attribute_wins_over_src() {
        let html = r#"<img data-src="https://cdn.example.com/real.jpg" src="https://cdn.example.com/1x1.gif">"#;
        let got = extract_image_candidates(html, None);
        assert_eq!(got, vec!["https://cdn.example.com/real.jpg"]);
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_likely_placeholder("https://www.gstatic.com/img/a.png"));
        assert!(is_likely_placeholder("https://cdn.example.com/site-logo.png"));
        assert!(is_likely_placeholder("https://cdn.example.com/icons/16x16.png"));
        assert!(is_likely_placeholder("relative/no-host.png"));
        assert!(!is_likely_placeholder(
            "https://cdn.example.com/uploads/2025/huntrix-art.jpg"
        ));
    }

    #[test]
    fn scoring_prefers_topical_upload_art_over_fillers() {
        let candidates = [
            "https://cdn.example.com/assets/site-logo.png",
            "https://cdn.example.com/wp-content/uploads/huntrix-demon-hunter.jpg",
            "https://cdn.example.com/misc/banner.gif",
        ];
        let best = pick_best_image(&candidates).unwrap();
        assert_eq!(
            best,
            "https://cdn.example.com/wp-content/uploads/huntrix-demon-hunter.jpg"
        );
    }

    #[test]
    fn placeholder_host_is_used_only_as_last_resort() {
        let only_placeholder = ["https://lh3.googleusercontent.com/proxy/abc"];
        assert_eq!(
            pick_best_image(&only_placeholder).as_deref(),
            Some("https://lh3.googleusercontent.com/proxy/abc")
        );

        let mixed = [
            "https://lh3.googleusercontent.com/proxy/abc",
            "https://cdn.example.com/uploads/cover.jpg",
        ];
        assert_eq!(
            pick_best_image(&mixed).as_deref(),
            Some("https://cdn.example.com/uploads/cover.jpg")
        );
    }

    #[test]
    fn ties_favor_earliest_candidate() {
        // identical scores: same shape, later index loses on position decay;
        // craft equal-score pair by compensating decay with nothing else
        let candidates = [
            "https://cdn.example.com/a.txt",
            "https://cdn.example.com/b.txt",
        ];
        assert_eq!(
            pick_best_image(&candidates).as_deref(),
            Some("https://cdn.example.com/a.txt")
        );
    }

    #[test]
    fn needs_better_thumbnail_flags_aggregator_and_missing() {
        assert!(needs_better_thumbnail(None));
        assert!(needs_better_thumbnail(Some(
            "https://news.google.com/api/attachments/x"
        )));
        assert!(!needs_better_thumbnail(Some(
            "https://cdn.example.com/uploads/cover.jpg"
        )));
    }
}
