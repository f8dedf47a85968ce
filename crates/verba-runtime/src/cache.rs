//! Cache of live parse results.
//!
//! Identical testimony with the same language hint produces the same live
//! parse, so repeated submissions skip the network round trip. Only live
//! results are stored; fallback parses are cheap to recompute.

use moka::future::Cache;
use std::time::Duration;
use verba_core::{intent_digest, Digest, Language, ParsedIntent};

use crate::config::CacheConfig;

/// Intent digest of the normalized text plus the language hint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParseKey {
    digest: Digest,
    hint: Option<Language>,
}

impl ParseKey {
    pub fn new(text: &str, hint: Option<Language>) -> Self {
        Self {
            digest: intent_digest(text),
            hint,
        }
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

pub struct ParseCache {
    cache: Cache<ParseKey, ParsedIntent>,
}

impl ParseCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    pub async fn get(&self, key: &ParseKey) -> Option<ParsedIntent> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: ParseKey, intent: ParsedIntent) {
        self.cache.insert(key, intent).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
