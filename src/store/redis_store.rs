//! Redis implementation of [`CoordinationStore`].

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::Script;
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{check_ttl, CoordinationStore, WindowAdmission};
use super::scripts;
use crate::config::StoreConfig;
use crate::error::{RedlineError, Result};

/// A Redis-backed store.
///
/// Cheap to clone: clones share one multiplexed connection. Connecting is
/// attempted once, and every command is bounded by the configured response
/// timeout. Failures surface as [`RedlineError::StoreUnavailable`]; nothing is
/// retried here. A dropped connection is re-established on the next command.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    admit_script: Script,
    window_len_script: Script,
    delete_if_equals_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect using a store configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        Self::connect_with_timeouts(
            &config.url(),
            config.connection_timeout(),
            config.response_timeout(),
        )
        .await
    }

    /// Connect using a `redis://` URL and the default timeouts.
    pub async fn connect_url(url: &str) -> Result<Self> {
        let defaults = StoreConfig::default();
        Self::connect_with_timeouts(url, defaults.connection_timeout(), defaults.response_timeout())
            .await
    }

    async fn connect_with_timeouts(
        url: &str,
        connection_timeout: Duration,
        response_timeout: Duration,
    ) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| RedlineError::Config(e.to_string()))?;
        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(0)
            .set_connection_timeout(connection_timeout)
            .set_response_timeout(response_timeout);
        let conn = ConnectionManager::new_with_config(client, manager_config).await?;

        info!(
            url = %url,
            connection_timeout = ?connection_timeout,
            response_timeout = ?response_timeout,
            "Connected to Redis"
        );

        Ok(Self {
            conn,
            admit_script: Script::new(scripts::ADMIT_TO_WINDOW),
            window_len_script: Script::new(scripts::WINDOW_LEN),
            delete_if_equals_script: Script::new(scripts::DELETE_IF_EQUALS),
        })
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn admit_to_window(
        &self,
        window: &str,
        period: Duration,
        max_requests: u64,
        nonce: &str,
    ) -> Result<WindowAdmission> {
        let mut conn = self.conn.clone();
        let (admitted, in_window): (u8, u64) = self
            .admit_script
            .key(window)
            .arg(period.as_micros() as u64)
            .arg(max_requests)
            .arg(nonce)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowAdmission {
            admitted: admitted == 1,
            in_window,
        })
    }

    async fn window_len(&self, window: &str, period: Duration) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .window_len_script
            .key(window)
            .arg(period.as_micros() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let ttl_ms = check_ttl(ttl)?;
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        debug!(key = %key, acquired = reply.is_some(), "SET NX PX");
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: u64 = self
            .delete_if_equals_script
            .key(key)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn push_tail(&self, list: &str, value: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("RPUSH")
            .arg(list)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn pop_head(&self, list: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("LPOP").arg(list).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn list_len(&self, list: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = redis::cmd("LLEN").arg(list).query_async(&mut conn).await?;
        Ok(len)
    }
}
