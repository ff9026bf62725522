// src/limits.rs
//! Feed-limit policy: the per-type maximum result count table, consulted by
//! the request boundary and the aggregator's final cap.

use crate::types::FeedType;

const ARTICLE_LIMIT: usize = 50;
const PRODUCT_LIMIT: usize = 200;
const VIDEO_LIMIT: usize = 25;
const ALL_LIMIT: usize = 125;

pub fn feed_limit(feed_type: FeedType) -> usize {
    match feed_type {
        FeedType::Article => ARTICLE_LIMIT,
        FeedType::Product => PRODUCT_LIMIT,
        FeedType::Video => VIDEO_LIMIT,
        FeedType::All => ALL_LIMIT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_type_caps() {
        assert_eq!(feed_limit(FeedType::Article), 50);
        assert_eq!(feed_limit(FeedType::Product), 200);
        assert_eq!(feed_limit(FeedType::Video), 25);
        assert_eq!(feed_limit(FeedType::All), 125);
    }
}
