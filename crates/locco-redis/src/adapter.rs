use async_trait::async_trait;
use locco_core::validation;
use locco_core::{LockAdapter, LoccoError, Result};
use redis::aio::{ConnectionLike, ConnectionManager};
use tracing::debug;

use crate::scripts::{EXTEND_SCRIPT, RELEASE_SCRIPT};

/// Lock adapter storing one string per key: the owner token, with a PX expiry
///
/// Creation is a single `SET NX PX`; release and extension are Lua
/// compare-and-act scripts, so every operation is atomic on the server.
/// The connection is cloned per call and never closed by the adapter.
#[derive(Clone)]
pub struct RedisAdapter<C = ConnectionManager> {
    connection: C,
}

impl<C> RedisAdapter<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    pub fn new(connection: C) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }
}

impl RedisAdapter<ConnectionManager> {
    /// Open a managed, auto-reconnecting connection to `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(LoccoError::backend)?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(LoccoError::backend)?;
        Ok(Self::new(manager))
    }
}

#[async_trait]
impl<C> LockAdapter for RedisAdapter<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn create_lock(&self, key: &str, owner_token: &str, ttl_ms: u64) -> Result<()> {
        validation::validate_lock_request(key, owner_token, ttl_ms)?;

        let mut con = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner_token)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut con)
            .await
            .map_err(LoccoError::backend)?;

        match reply {
            Some(_) => Ok(()),
            None => {
                debug!(key = %key, "Key is held, SET NX refused");
                Err(LoccoError::CreateFailed {
                    key: key.to_string(),
                })
            }
        }
    }

    async fn release_lock(&self, key: &str, owner_token: &str) -> Result<()> {
        validation::validate_owner_request(key, owner_token)?;

        let mut con = self.connection.clone();
        let deleted: i64 = RELEASE_SCRIPT
            .key(key)
            .arg(owner_token)
            .invoke_async(&mut con)
            .await
            .map_err(LoccoError::backend)?;

        if deleted == 1 {
            Ok(())
        } else {
            Err(LoccoError::ReleaseFailed {
                key: key.to_string(),
            })
        }
    }

    async fn extend_lock(&self, key: &str, owner_token: &str, ttl_ms: u64) -> Result<()> {
        validation::validate_lock_request(key, owner_token, ttl_ms)?;

        let mut con = self.connection.clone();
        let extended: i64 = EXTEND_SCRIPT
            .key(key)
            .arg(owner_token)
            .arg(ttl_ms)
            .invoke_async(&mut con)
            .await
            .map_err(LoccoError::backend)?;

        if extended == 1 {
            Ok(())
        } else {
            Err(LoccoError::ExtendFailed {
                key: key.to_string(),
            })
        }
    }

    async fn is_valid_lock(&self, key: &str, owner_token: &str) -> Result<bool> {
        validation::validate_owner_request(key, owner_token)?;

        let mut con = self.connection.clone();
        let holder: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut con)
            .await
            .map_err(LoccoError::backend)?;

        Ok(holder.as_deref() == Some(owner_token))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
