//! Redis token storage implementation.

use crate::error::{CsrfError, CsrfResult};
use crate::record::{RequestContext, TokenRecord, TokenState};
use crate::store::{StoreStats, TokenStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

// GET the record, bail if missing or at the ceiling, otherwise increment
// use_count and stamp last_used_at/metadata in one server-side step.
// Returns 1 on a won increment, 0 otherwise.
const MARK_USED_SCRIPT: &str = r#"
local data = redis.call('GET', KEYS[1])
if not data then
    return 0
end
local rec = cjson.decode(data)
if rec.use_count >= tonumber(ARGV[1]) then
    return 0
end
rec.use_count = rec.use_count + 1
rec.last_used_at = ARGV[2]
if ARGV[3] ~= '' then
    rec.metadata = cjson.decode(ARGV[3])
end
local ttl = redis.call('TTL', KEYS[1])
if ttl > 0 then
    redis.call('SET', KEYS[1], cjson.encode(rec), 'EX', ttl)
else
    redis.call('SET', KEYS[1], cjson.encode(rec))
end
return 1
"#;

/// Redis-backed token store.
///
/// Records are stored as JSON under `{prefix}{token}` with a TTL matching
/// the record's expiry, plus a `{prefix}session:{id}` mapping for the
/// one-active-token-per-session lookup. The use-count increment runs as a
/// Lua script so the ceiling check-and-increment is atomic server-side.
///
/// # Examples
///
/// ```no_run
/// use rampart_csrf::RedisTokenStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisTokenStore::new("redis://localhost:6379", "csrf:").await?;
/// # Ok(())
/// # }
/// ```
pub struct RedisTokenStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisTokenStore {
    /// Connect to Redis and create a token store.
    pub async fn new(url: &str, prefix: impl Into<String>) -> CsrfResult<Self> {
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(CsrfError::Connection(
                "Redis URL must start with redis:// or rediss://".to_string(),
            ));
        }

        let client =
            redis::Client::open(url).map_err(|e| CsrfError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CsrfError::Connection(e.to_string()))?;

        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn token_key(&self, token: &str) -> String {
        format!("{}{}", self.prefix, token)
    }

    fn session_key(&self, session_id: &str) -> String {
        format!("{}session:{}", self.prefix, session_id)
    }

    fn remaining_ttl(record: &TokenRecord) -> i64 {
        (record.expires_at - Utc::now()).num_seconds()
    }

    /// Scan all token records under the prefix.
    ///
    /// KEYS is acceptable here for the same reason full-scan stats are:
    /// the token population is bounded by live sessions.
    async fn scan_records(&self) -> CsrfResult<Vec<TokenRecord>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.prefix);
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await?;

        let session_prefix = format!("{}session:", self.prefix);
        let mut records = Vec::new();
        for key in keys {
            if key.starts_with(&session_prefix) {
                continue;
            }
            let data: Option<String> = conn.get(&key).await?;
            if let Some(json) = data {
                let record: TokenRecord = serde_json::from_str(&json)
                    .map_err(|e| CsrfError::Deserialization(e.to_string()))?;
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn write_record(&self, record: &TokenRecord) -> CsrfResult<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)
            .map_err(|e| CsrfError::Serialization(e.to_string()))?;

        let ttl = Self::remaining_ttl(record).max(0) as u64;
        if ttl == 0 {
            return Ok(());
        }

        let _: () = conn.set_ex(self.token_key(&record.token), json, ttl).await?;
        if record.is_verifiable() {
            let _: () = conn
                .set_ex(self.session_key(&record.session_id), &record.token, ttl)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn put(&self, record: TokenRecord) -> CsrfResult<()> {
        self.write_record(&record).await
    }

    async fn get(&self, token: &str) -> CsrfResult<Option<TokenRecord>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(self.token_key(token)).await?;
        match data {
            Some(json) => {
                let record: TokenRecord = serde_json::from_str(&json)
                    .map_err(|e| CsrfError::Deserialization(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn get_by_session(&self, session_id: &str) -> CsrfResult<Option<TokenRecord>> {
        let mut conn = self.conn.clone();
        let token: Option<String> = conn.get(self.session_key(session_id)).await?;
        match token {
            Some(token) => {
                let record = self.get(&token).await?;
                Ok(record.filter(|r| r.is_verifiable()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, token: &str) -> CsrfResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.token_key(token)).await?;
        Ok(())
    }

    async fn delete_by_session(&self, session_id: &str) -> CsrfResult<()> {
        let mut conn = self.conn.clone();
        for record in self.list_by_session(session_id).await? {
            let _: () = conn.del(self.token_key(&record.token)).await?;
        }
        let _: () = conn.del(self.session_key(session_id)).await?;
        Ok(())
    }

    async fn list_by_session(&self, session_id: &str) -> CsrfResult<Vec<TokenRecord>> {
        Ok(self
            .scan_records()
            .await?
            .into_iter()
            .filter(|r| r.session_id == session_id)
            .collect())
    }

    async fn set_state(&self, token: &str, state: TokenState) -> CsrfResult<()> {
        if let Some(mut record) = self.get(token).await? {
            record.state = state;
            self.write_record(&record).await?;
            if state != TokenState::Active {
                // Drop the session mapping if it still points at this token
                let mut conn = self.conn.clone();
                let mapped: Option<String> = conn.get(self.session_key(&record.session_id)).await?;
                if mapped.as_deref() == Some(token) {
                    let _: () = conn.del(self.session_key(&record.session_id)).await?;
                }
            }
        }
        Ok(())
    }

    async fn mark_used(
        &self,
        token: &str,
        max_use_count: u32,
        context: Option<&RequestContext>,
    ) -> CsrfResult<bool> {
        let mut conn = self.conn.clone();
        let context_json = match context {
            Some(context) => serde_json::to_string(context)
                .map_err(|e| CsrfError::Serialization(e.to_string()))?,
            None => String::new(),
        };

        let script = redis::Script::new(MARK_USED_SCRIPT);
        let won: i64 = script
            .key(self.token_key(token))
            .arg(max_use_count)
            .arg(Utc::now().to_rfc3339())
            .arg(context_json)
            .invoke_async(&mut conn)
            .await?;
        Ok(won == 1)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> CsrfResult<usize> {
        // Redis evicts past-TTL keys on its own; this pass only purges
        // terminal records that still have TTL budget left.
        let mut conn = self.conn.clone();
        let mut removed = 0;
        for record in self.scan_records().await? {
            if now > record.expires_at
                || record.state == TokenState::Expired
                || record.state == TokenState::Revoked
            {
                let _: () = conn.del(self.token_key(&record.token)).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn stats(&self) -> CsrfResult<StoreStats> {
        let mut stats = StoreStats::default();
        for record in self.scan_records().await? {
            stats.total_tokens += 1;
            match record.state {
                TokenState::Active => stats.active_tokens += 1,
                TokenState::Expired => stats.expired_tokens += 1,
                TokenState::Revoked => stats.revoked_tokens += 1,
            }
        }
        Ok(stats)
    }
}
