// src/cache/redis.rs
//! Durable cache tier: an Upstash Redis instance driven over its REST
//! protocol (commands POSTed as JSON arrays, token-authenticated). Shared
//! across instances and survives process restarts.

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};

use crate::config::Env;

pub struct RedisTier {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl RedisTier {
    /// Build from config; `None` when the URL or token is absent, which
    /// degrades the cache to memory-only.
    pub fn from_env(env: &Env) -> Option<Self> {
        let base_url = env.upstash_redis_url.clone()?;
        let token = env.upstash_redis_token.clone()?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        })
    }

    /// Run one Redis command and return its `result` field.
    async fn command(&self, cmd: Value) -> Result<Value> {
        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.token)
            .json(&cmd)
            .send()
            .await
            .context("redis: send command")?;
        if !resp.status().is_success() {
            return Err(anyhow!("redis: HTTP {}", resp.status()));
        }
        let body: Value = resp.json().await.context("redis: parse response")?;
        if let Some(err) = body.get("error").and_then(Value::as_str) {
            return Err(anyhow!("redis: {err}"));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let result = self.command(json!(["GET", key])).await?;
        match result {
            Value::Null => Ok(None),
            Value::String(s) => Ok(serde_json::from_str(&s).ok()),
            _ => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: &Value, ttl_secs: u64) -> Result<()> {
        self.command(json!([
            "SET",
            key,
            value.to_string(),
            "EX",
            ttl_secs.to_string()
        ]))
        .await?;
        Ok(())
    }

    /// One SCAN page; returns the next cursor ("0" when exhausted) and the
    /// matching keys.
    pub async fn scan(&self, cursor: &str, pattern: &str) -> Result<(String, Vec<String>)> {
        let result = self
            .command(json!(["SCAN", cursor, "MATCH", pattern, "COUNT", "100"]))
            .await?;
        let parts = result
            .as_array()
            .ok_or_else(|| anyhow!("redis: unexpected SCAN reply"))?;
        let next = parts
            .first()
            .and_then(Value::as_str)
            .unwrap_or("0")
            .to_string();
        let keys = parts
            .get(1)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok((next, keys))
    }

    pub async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut cmd = vec![json!("DEL")];
        cmd.extend(keys.iter().map(|k| json!(k)));
        let result = self.command(Value::Array(cmd)).await?;
        Ok(result.as_u64().unwrap_or(0))
    }
}
