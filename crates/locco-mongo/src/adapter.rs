use async_trait::async_trait;
use locco_core::config::DEFAULT_MONGO_COLLECTION;
use locco_core::validation;
use locco_core::{LockAdapter, LoccoConfig, LoccoError, Result};
use mongodb::Client;
use mongodb::bson::DateTime;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::mongo::MongoLockStore;
use crate::store::{LockDocument, LockDocumentStore, LockFilter};

/// Where lock documents live
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MongoAdapterConfig {
    /// Database name; `None` uses the database named in the connection string
    pub database: Option<String>,
    pub collection: String,
}

impl Default for MongoAdapterConfig {
    fn default() -> Self {
        Self {
            database: None,
            collection: DEFAULT_MONGO_COLLECTION.to_string(),
        }
    }
}

impl MongoAdapterConfig {
    /// Read `mongo.database` and `mongo.collection`
    pub fn from_config(config: &LoccoConfig) -> Result<Self> {
        Ok(Self {
            database: config.mongo_database()?,
            collection: config.mongo_collection()?,
        })
    }
}

/// Lock adapter storing one document per key
///
/// Exclusivity comes from the unique index on `key`: creation upserts over
/// an expired record and a live record turns the upsert into a duplicate-key
/// error. Indexes are created on first use.
pub struct MongoAdapter<S = MongoLockStore> {
    store: S,
    indexes: OnceCell<()>,
}

impl MongoAdapter<MongoLockStore> {
    /// Adapter over `client`, storing locks where `config` says
    pub fn new(client: &Client, config: MongoAdapterConfig) -> Result<Self> {
        let database = match &config.database {
            Some(name) => client.database(name),
            None => client.default_database().ok_or_else(|| {
                LoccoError::validation(
                    "mongo.database is not set and the connection string names no database",
                )
            })?,
        };
        let collection = database.collection::<LockDocument>(&config.collection);
        Ok(Self::with_store(MongoLockStore::new(collection)))
    }

    pub fn from_config(client: &Client, config: &LoccoConfig) -> Result<Self> {
        Self::new(client, MongoAdapterConfig::from_config(config)?)
    }
}

impl<S: LockDocumentStore> MongoAdapter<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            indexes: OnceCell::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create indexes once; a failed bootstrap is retried on the next call
    async fn ensure_indexes(&self) -> Result<()> {
        self.indexes
            .get_or_try_init(|| async {
                if let Err(e) = self.store.ensure_indexes().await {
                    warn!(error = %e, "Failed to create lock indexes");
                    return Err(LoccoError::backend(e));
                }
                info!("Lock indexes ready");
                Ok(())
            })
            .await?;
        Ok(())
    }
}

fn expire_at(now: DateTime, ttl_ms: u64) -> DateTime {
    let ttl_ms = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
    DateTime::from_millis(now.timestamp_millis().saturating_add(ttl_ms))
}

#[async_trait]
impl<S: LockDocumentStore> LockAdapter for MongoAdapter<S> {
    async fn create_lock(&self, key: &str, owner_token: &str, ttl_ms: u64) -> Result<()> {
        validation::validate_lock_request(key, owner_token, ttl_ms)?;
        self.ensure_indexes().await?;

        let now = DateTime::now();
        let record = LockDocument::new(key, owner_token, expire_at(now, ttl_ms));
        match self
            .store
            .upsert_where(&LockFilter::expired(key, now), &record)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if self.store.is_uniqueness_conflict(&e) => {
                debug!(key = %key, "Live lock document exists");
                Err(LoccoError::CreateFailed {
                    key: key.to_string(),
                })
            }
            Err(e) => Err(LoccoError::backend(e)),
        }
    }

    async fn release_lock(&self, key: &str, owner_token: &str) -> Result<()> {
        validation::validate_owner_request(key, owner_token)?;
        self.ensure_indexes().await?;

        let filter = LockFilter::held_by(key, owner_token, DateTime::now());
        let deleted = self
            .store
            .delete_where(&filter)
            .await
            .map_err(LoccoError::backend)?;

        if deleted == 0 {
            return Err(LoccoError::ReleaseFailed {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    async fn extend_lock(&self, key: &str, owner_token: &str, ttl_ms: u64) -> Result<()> {
        validation::validate_lock_request(key, owner_token, ttl_ms)?;
        self.ensure_indexes().await?;

        let now = DateTime::now();
        let record = LockDocument::new(key, owner_token, expire_at(now, ttl_ms));
        let extend_failed = || LoccoError::ExtendFailed {
            key: key.to_string(),
        };
        match self
            .store
            .update_where(&LockFilter::held_by(key, owner_token, now), &record)
            .await
        {
            Ok(0) => Err(extend_failed()),
            Ok(_) => Ok(()),
            Err(e) if self.store.is_uniqueness_conflict(&e) => Err(extend_failed()),
            Err(e) => Err(LoccoError::backend(e)),
        }
    }

    async fn is_valid_lock(&self, key: &str, owner_token: &str) -> Result<bool> {
        validation::validate_owner_request(key, owner_token)?;
        self.ensure_indexes().await?;

        self.store
            .exists_where(&LockFilter::held_by(key, owner_token, DateTime::now()))
            .await
            .map_err(LoccoError::backend)
    }

    fn name(&self) -> &'static str {
        "mongo"
    }
}
