// src/config.rs
//! Environment-driven configuration. Every credential is optional: a
//! missing key disables the corresponding adapter or cache tier instead of
//! failing startup.

pub const ENV_YOUTUBE_API_KEY: &str = "YOUTUBE_API_KEY";
pub const ENV_YOUTUBE_SEARCH_QUERY: &str = "YOUTUBE_SEARCH_QUERY";
pub const ENV_SERPAPI_API_KEY: &str = "SERPAPI_API_KEY";
pub const ENV_UPSTASH_REDIS_URL: &str = "UPSTASH_REDIS_REST_URL";
pub const ENV_UPSTASH_REDIS_TOKEN: &str = "UPSTASH_REDIS_REST_TOKEN";
pub const ENV_CACHE_REFRESH_TOKEN: &str = "CACHE_REFRESH_TOKEN";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct Env {
    pub youtube_api_key: Option<String>,
    pub youtube_search_query: Option<String>,
    pub serpapi_api_key: Option<String>,
    pub upstash_redis_url: Option<String>,
    pub upstash_redis_token: Option<String>,
    pub cache_refresh_token: Option<String>,
    pub bind_addr: String,
}

impl Default for Env {
    fn default() -> Self {
        Self {
            youtube_api_key: None,
            youtube_search_query: None,
            serpapi_api_key: None,
            upstash_redis_url: None,
            upstash_redis_token: None,
            cache_refresh_token: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl Env {
    /// Read the process environment once at startup.
    pub fn from_env() -> Self {
        Self {
            youtube_api_key: non_empty(ENV_YOUTUBE_API_KEY),
            youtube_search_query: non_empty(ENV_YOUTUBE_SEARCH_QUERY),
            serpapi_api_key: non_empty(ENV_SERPAPI_API_KEY),
            upstash_redis_url: non_empty(ENV_UPSTASH_REDIS_URL),
            upstash_redis_token: non_empty(ENV_UPSTASH_REDIS_TOKEN),
            cache_refresh_token: non_empty(ENV_CACHE_REFRESH_TOKEN),
            bind_addr: non_empty(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn blank_values_count_as_absent() {
        std::env::set_var(ENV_YOUTUBE_API_KEY, "   ");
        std::env::remove_var(ENV_SERPAPI_API_KEY);
        std::env::remove_var(ENV_BIND_ADDR);
        std::env::set_var(ENV_CACHE_REFRESH_TOKEN, "s3cret");

        let env = Env::from_env();
        assert_eq!(env.youtube_api_key, None);
        assert_eq!(env.serpapi_api_key, None);
        assert_eq!(env.cache_refresh_token.as_deref(), Some("s3cret"));
        assert_eq!(env.bind_addr, DEFAULT_BIND_ADDR);

        std::env::remove_var(ENV_YOUTUBE_API_KEY);
        std::env::remove_var(ENV_CACHE_REFRESH_TOKEN);
    }
}
