//! # Cache Adapter
//!
//! Redis-backed response cache. Key space is prefixed by kind
//! (`cve_detail:<id>`, `cve_list:<query>`, `crawler_result:<id>`,
//! `user:<id>`, `stats:*`), each with its own default TTL. Pattern deletes
//! use cursor-based `SCAN` rather than `KEYS` so a large cache is never
//! blocked by a single list-invalidation sweep.

use crate::error::Result;
use chrono::Utc;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

const SCAN_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub enum CacheKind {
    CveDetail,
    CveList,
    CrawlerResult,
    User,
    Stats,
}

impl CacheKind {
    fn prefix(&self) -> &'static str {
        match self {
            CacheKind::CveDetail => "cve_detail",
            CacheKind::CveList => "cve_list",
            CacheKind::CrawlerResult => "crawler_result",
            CacheKind::User => "user",
            CacheKind::Stats => "stats",
        }
    }

    /// Default TTL in seconds for entries of this kind.
    pub fn default_ttl_seconds(&self) -> u64 {
        match self {
            CacheKind::CveDetail => 3600,
            CacheKind::CveList => 300,
            CacheKind::CrawlerResult => 86_400,
            CacheKind::User => 1800,
            CacheKind::Stats => 600,
        }
    }
}

#[derive(Debug, Serialize, serde::Deserialize)]
struct CachedEnvelope<T> {
    value: T,
    _cached_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct ResponseCache {
    conn: ConnectionManager,
}

impl ResponseCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Round-trips a `PING`. Used by the readiness probe.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    fn key(kind: CacheKind, id: &str) -> String {
        format!("{}:{}", kind.prefix(), id)
    }

    pub async fn get<T: DeserializeOwned>(&self, kind: CacheKind, id: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(kind, id)).await?;
        Ok(match raw {
            Some(raw) => serde_json::from_str::<CachedEnvelope<T>>(&raw)
                .ok()
                .map(|env| env.value),
            None => None,
        })
    }

    pub async fn set<T: Serialize>(&self, kind: CacheKind, id: &str, value: &T) -> Result<()> {
        self.set_with_ttl(kind, id, value, kind.default_ttl_seconds())
            .await
    }

    pub async fn set_with_ttl<T: Serialize>(
        &self,
        kind: CacheKind,
        id: &str,
        value: &T,
        ttl_seconds: u64,
    ) -> Result<()> {
        let envelope = CachedEnvelope {
            value,
            _cached_at: Utc::now(),
        };
        let raw = serde_json::to_string(&envelope)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(kind, id), raw, ttl_seconds)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, kind: CacheKind, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(kind, id)).await?;
        Ok(())
    }

    /// Deletes every key whose Redis glob matches `pattern`, using
    /// cursor-based `SCAN` so the cache is never blocked by a single `KEYS *`
    /// call.
    async fn scan_delete(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0u64;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH_SIZE)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                deleted += conn.del::<_, u64>(keys).await?;
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }

    /// Applies the CVE-mutation invalidation protocol: drop the exact
    /// detail entry plus any detail key that embeds the id (crawler results
    /// occasionally key by a compound id), then flush every cached list
    /// view. Failures are logged and swallowed — an invalidation miss must
    /// never block the mutation that triggered it. Returns whether each
    /// phase (detail, lists) completed without error, for the
    /// `cache_invalidated` push event.
    pub async fn invalidate_cve(&self, cve_id: &str) -> (bool, bool) {
        let detail_key = Self::key(CacheKind::CveDetail, cve_id);
        let mut conn = self.conn.clone();
        let mut detail_ok = match conn.del::<_, u64>(detail_key).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, cve_id, "failed to delete cached CVE detail");
                false
            }
        };

        let detail_pattern = format!("cve_detail:*{cve_id}*");
        if let Err(e) = self.scan_delete(&detail_pattern).await {
            warn!(error = %e, cve_id, "failed to scan-delete cached CVE detail variants");
            detail_ok = false;
        }

        let lists_ok = match self.scan_delete("cve_list:*").await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "failed to invalidate cached CVE list views");
                false
            }
        };

        (detail_ok, lists_ok)
    }

    /// Invalidation for a comment add/update on CVE `cve_id`: only the
    /// single detail entry is stale, list views are unaffected.
    pub async fn invalidate_cve_detail_only(&self, cve_id: &str) -> Result<()> {
        self.delete(CacheKind::CveDetail, cve_id).await
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttls_match_the_cache_contract() {
        assert_eq!(CacheKind::CveDetail.default_ttl_seconds(), 3600);
        assert_eq!(CacheKind::CveList.default_ttl_seconds(), 300);
        assert_eq!(CacheKind::CrawlerResult.default_ttl_seconds(), 86_400);
        assert_eq!(CacheKind::User.default_ttl_seconds(), 1800);
        assert_eq!(CacheKind::Stats.default_ttl_seconds(), 600);
    }

    #[test]
    fn key_includes_kind_prefix() {
        assert_eq!(
            ResponseCache::key(CacheKind::CveDetail, "CVE-2024-1"),
            "cve_detail:CVE-2024-1"
        );
    }
}
